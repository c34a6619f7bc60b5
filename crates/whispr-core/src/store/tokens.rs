use async_trait::async_trait;
use chrono::Utc;

use super::Store;
use crate::auth::{self, TokenError, TokenRecord, TokenStore};

fn storage_error(e: sqlx::Error) -> TokenError {
    TokenError::Storage(e.to_string())
}

#[async_trait]
impl TokenStore for Store {
    async fn create_token(&self, record: &TokenRecord) -> auth::Result<()> {
        sqlx::query("INSERT INTO tokens (jti, user_id, created_at) VALUES (?, ?, ?)")
            .bind(&record.jti)
            .bind(&record.user_id)
            .bind(Utc::now())
            .execute(&self.pool)
            .await
            .map_err(storage_error)?;
        Ok(())
    }

    async fn find_token(&self, jti: &str) -> auth::Result<Option<TokenRecord>> {
        let row: Option<(String, String)> =
            sqlx::query_as("SELECT jti, user_id FROM tokens WHERE jti = ?")
                .bind(jti)
                .fetch_optional(&self.pool)
                .await
                .map_err(storage_error)?;

        Ok(row.map(|(jti, user_id)| TokenRecord { jti, user_id }))
    }

    async fn delete_token(&self, jti: &str) -> auth::Result<bool> {
        let result = sqlx::query("DELETE FROM tokens WHERE jti = ?")
            .bind(jti)
            .execute(&self.pool)
            .await
            .map_err(storage_error)?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_tokens_for_user(&self, user_id: &str) -> auth::Result<u64> {
        let result = sqlx::query("DELETE FROM tokens WHERE user_id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(storage_error)?;
        Ok(result.rows_affected())
    }
}

impl Store {
    /// Number of live token records owned by a user
    pub async fn count_tokens_for_user(&self, user_id: &str) -> crate::error::Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM tokens WHERE user_id = ?")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
