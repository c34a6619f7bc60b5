//! SQLite persistence using sqlx
//!
//! One [`Store`] backs every domain table. Queries are grouped by entity:
//! `users`, `channels`, `messages` and `tokens` (the [`TokenStore`] seam used
//! by the token codec).
//!
//! [`TokenStore`]: crate::auth::TokenStore

mod channels;
mod messages;
mod migrations;
mod tokens;
mod users;


use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

use crate::error::{Error, Result};

/// SQLite-backed store for users, channels, messages and token records
#[derive(Clone)]
pub struct Store {
    pub(super) pool: Pool<Sqlite>,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("connections", &self.pool.size())
            .finish()
    }
}

impl Store {
    /// Connect to a database URL (e.g. `sqlite:whispr.db`) and run migrations
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await?;

        debug!(url = %url, "Connected to database");
        Self::with_pool(pool).await
    }

    /// Open (or create) a database file
    pub async fn from_path(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::Internal(format!("Failed to create directory: {}", e)))?;
        }

        let url = format!("sqlite:{}?mode=rwc", path.display());
        Self::connect(&url, 5).await
    }

    /// Private in-memory database.
    ///
    /// Every pooled connection to `sqlite::memory:` opens its own database, so
    /// the pool is pinned to one connection that is never recycled.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        Self::with_pool(pool).await
    }

    async fn with_pool(pool: Pool<Sqlite>) -> Result<Self> {
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Close every pooled connection
    pub async fn close(&self) {
        self.pool.close().await;
    }
}
