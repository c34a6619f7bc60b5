use chrono::{DateTime, Utc};

use super::Store;
use crate::error::{Error, Result};
use crate::models::{KeyPair, Role, User, UserSummary};

#[derive(sqlx::FromRow)]
struct UserRow {
    id: String,
    username: String,
    nickname: String,
    password: String,
    role: String,
    banned: bool,
    created_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = Error;

    fn try_from(row: UserRow) -> Result<Self> {
        Ok(User {
            role: row.role.parse().map_err(Error::Internal)?,
            id: row.id,
            username: row.username,
            nickname: row.nickname,
            password: row.password,
            banned: row.banned,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(super) struct UserSummaryRow {
    pub(super) id: String,
    pub(super) username: String,
    pub(super) nickname: String,
    pub(super) public_key: Option<String>,
}

impl From<UserSummaryRow> for UserSummary {
    fn from(row: UserSummaryRow) -> Self {
        UserSummary {
            id: row.id,
            username: row.username,
            nickname: row.nickname,
            public_key: row.public_key,
        }
    }
}

const USER_COLUMNS: &str = "id, username, nickname, password, role, banned, created_at";

impl Store {
    /// Insert a user. A taken username surfaces as a unique violation.
    pub async fn create_user(&self, user: &User) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO users (id, username, nickname, password, role, banned, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&user.id)
        .bind(&user.username)
        .bind(&user.nickname)
        .bind(&user.password)
        .bind(user.role.as_str())
        .bind(user.banned)
        .bind(user.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Find a user by login name
    pub async fn find_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let row: Option<UserRow> = sqlx::query_as(&format!(
            "SELECT {} FROM users WHERE username = ?",
            USER_COLUMNS
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        row.map(User::try_from).transpose()
    }

    /// Find a user by id
    pub async fn find_user_by_id(&self, user_id: &str) -> Result<Option<User>> {
        let row: Option<UserRow> =
            sqlx::query_as(&format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS))
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;

        row.map(User::try_from).transpose()
    }

    /// Summary (with public key) of one user
    pub async fn find_user_summary(&self, user_id: &str) -> Result<Option<UserSummary>> {
        let row: Option<UserSummaryRow> = sqlx::query_as(
            r#"
            SELECT u.id, u.username, u.nickname, k.public_key
            FROM users u
            LEFT JOIN key_pairs k ON k.user_id = u.id
            WHERE u.id = ?
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(UserSummary::from))
    }

    /// Set or clear the banned flag, returning whether the user exists
    pub async fn set_user_banned(&self, user_id: &str, banned: bool) -> Result<bool> {
        let result = sqlx::query("UPDATE users SET banned = ? WHERE id = ?")
            .bind(banned)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Change a user's role, returning whether the user exists
    pub async fn set_user_role(&self, user_id: &str, role: Role) -> Result<bool> {
        let result = sqlx::query("UPDATE users SET role = ? WHERE id = ?")
            .bind(role.as_str())
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// A user's key pair, if established
    pub async fn find_key_pair(&self, user_id: &str) -> Result<Option<KeyPair>> {
        let row: Option<(String, String)> = sqlx::query_as(
            "SELECT public_key, encrypted_private_key FROM key_pairs WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(public_key, encrypted_private_key)| KeyPair {
            public_key,
            encrypted_private_key,
        }))
    }

    /// Store a user's key pair. A second pair surfaces as a unique violation.
    pub async fn create_key_pair(&self, user_id: &str, key_pair: &KeyPair) -> Result<()> {
        sqlx::query(
            "INSERT INTO key_pairs (user_id, public_key, encrypted_private_key) VALUES (?, ?, ?)",
        )
        .bind(user_id)
        .bind(&key_pair.public_key)
        .bind(&key_pair.encrypted_private_key)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Which of the given ids belong to existing users
    pub async fn existing_user_ids(&self, user_ids: &[String]) -> Result<Vec<String>> {
        let mut found = Vec::with_capacity(user_ids.len());
        for user_id in user_ids {
            let row: Option<(String,)> = sqlx::query_as("SELECT id FROM users WHERE id = ?")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;
            if let Some((id,)) = row {
                found.push(id);
            }
        }
        Ok(found)
    }
}
