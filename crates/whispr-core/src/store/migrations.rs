use super::Store;
use crate::error::{Error, Result};

const SCHEMA: &[(&str, &str)] = &[
    (
        "users",
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            username TEXT NOT NULL UNIQUE,
            nickname TEXT NOT NULL,
            password TEXT NOT NULL,
            role TEXT NOT NULL DEFAULT 'USER',
            banned BOOLEAN NOT NULL DEFAULT FALSE,
            created_at TIMESTAMP NOT NULL
        )
        "#,
    ),
    (
        "key_pairs",
        r#"
        CREATE TABLE IF NOT EXISTS key_pairs (
            user_id TEXT PRIMARY KEY,
            public_key TEXT NOT NULL,
            encrypted_private_key TEXT NOT NULL,
            FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
        )
        "#,
    ),
    (
        "tokens",
        r#"
        CREATE TABLE IF NOT EXISTS tokens (
            jti TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            created_at TIMESTAMP NOT NULL
        )
        "#,
    ),
    (
        "channels",
        r#"
        CREATE TABLE IF NOT EXISTS channels (
            id TEXT PRIMARY KEY,
            name TEXT,
            last_message_id TEXT,
            created_at TIMESTAMP NOT NULL
        )
        "#,
    ),
    (
        "channel_permissions",
        r#"
        CREATE TABLE IF NOT EXISTS channel_permissions (
            channel_id TEXT NOT NULL,
            user_id TEXT NOT NULL,
            can_read BOOLEAN NOT NULL DEFAULT TRUE,
            can_write BOOLEAN NOT NULL DEFAULT TRUE,
            PRIMARY KEY (channel_id, user_id),
            FOREIGN KEY (channel_id) REFERENCES channels(id) ON DELETE CASCADE,
            FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
        )
        "#,
    ),
    (
        "messages",
        r#"
        CREATE TABLE IF NOT EXISTS messages (
            id TEXT PRIMARY KEY,
            channel_id TEXT NOT NULL,
            user_id TEXT NOT NULL,
            created_at TIMESTAMP NOT NULL,
            edited_at TIMESTAMP,
            FOREIGN KEY (channel_id) REFERENCES channels(id) ON DELETE CASCADE,
            FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
        )
        "#,
    ),
    (
        "message_texts",
        r#"
        CREATE TABLE IF NOT EXISTS message_texts (
            message_id TEXT NOT NULL,
            target_user_id TEXT NOT NULL,
            cipher_text TEXT NOT NULL,
            encrypted_symmetric_key TEXT NOT NULL,
            PRIMARY KEY (message_id, target_user_id),
            FOREIGN KEY (message_id) REFERENCES messages(id) ON DELETE CASCADE
        )
        "#,
    ),
    (
        "idx_tokens_user",
        "CREATE INDEX IF NOT EXISTS idx_tokens_user ON tokens(user_id)",
    ),
    (
        "idx_permissions_user",
        "CREATE INDEX IF NOT EXISTS idx_permissions_user ON channel_permissions(user_id)",
    ),
    (
        "idx_messages_channel",
        "CREATE INDEX IF NOT EXISTS idx_messages_channel ON messages(channel_id, created_at)",
    ),
];

impl Store {
    /// Run database migrations
    pub(super) async fn migrate(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for (name, statement) in SCHEMA {
            sqlx::query(statement)
                .execute(&mut *tx)
                .await
                .map_err(|e| Error::Internal(format!("Migration failed ({}): {}", name, e)))?;
        }

        tx.commit().await?;
        Ok(())
    }
}
