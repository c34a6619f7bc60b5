use chrono::{DateTime, Utc};

use super::Store;
use crate::error::Result;
use crate::models::{Message, MessageContent, MessageText};

#[derive(sqlx::FromRow)]
struct MessageRow {
    id: String,
    channel_id: String,
    user_id: String,
    created_at: DateTime<Utc>,
    edited_at: Option<DateTime<Utc>>,
}

impl From<MessageRow> for Message {
    fn from(row: MessageRow) -> Self {
        Message {
            id: row.id,
            channel_id: row.channel_id,
            user_id: row.user_id,
            created_at: row.created_at,
            edited_at: row.edited_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct MessageTextRow {
    target_user_id: String,
    cipher_text: String,
    encrypted_symmetric_key: String,
}

impl From<MessageTextRow> for MessageText {
    fn from(row: MessageTextRow) -> Self {
        MessageText {
            target_user_id: row.target_user_id,
            cipher_text: row.cipher_text,
            encrypted_symmetric_key: row.encrypted_symmetric_key,
        }
    }
}

const MESSAGE_COLUMNS: &str = "id, channel_id, user_id, created_at, edited_at";

impl Store {
    /// Insert a message with its per-recipient ciphertexts and point the
    /// channel's `last_message_id` at it, all in one transaction.
    pub async fn create_message(&self, message: &Message, content: &[MessageContent]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO messages (id, channel_id, user_id, created_at, edited_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&message.id)
        .bind(&message.channel_id)
        .bind(&message.user_id)
        .bind(message.created_at)
        .bind(message.edited_at)
        .execute(&mut *tx)
        .await?;

        for text in content {
            sqlx::query(
                r#"
                INSERT OR REPLACE INTO message_texts
                    (message_id, target_user_id, cipher_text, encrypted_symmetric_key)
                VALUES (?, ?, ?, ?)
                "#,
            )
            .bind(&message.id)
            .bind(&text.target)
            .bind(&text.cipher)
            .bind(&text.encrypted_symmetric_key)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query("UPDATE channels SET last_message_id = ? WHERE id = ?")
            .bind(&message.id)
            .bind(&message.channel_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Find a message header by id
    pub async fn find_message(&self, message_id: &str) -> Result<Option<Message>> {
        let row: Option<MessageRow> = sqlx::query_as(&format!(
            "SELECT {} FROM messages WHERE id = ?",
            MESSAGE_COLUMNS
        ))
        .bind(message_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Message::from))
    }

    /// One page of a channel's messages, newest first
    pub async fn list_messages(
        &self,
        channel_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Message>> {
        let rows: Vec<MessageRow> = sqlx::query_as(&format!(
            "SELECT {} FROM messages WHERE channel_id = ? ORDER BY created_at DESC, rowid DESC LIMIT ? OFFSET ?",
            MESSAGE_COLUMNS
        ))
        .bind(channel_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Message::from).collect())
    }

    /// The ciphertext of a message addressed to one user
    pub async fn find_message_text(
        &self,
        message_id: &str,
        target_user_id: &str,
    ) -> Result<Option<MessageText>> {
        let row: Option<MessageTextRow> = sqlx::query_as(
            r#"
            SELECT target_user_id, cipher_text, encrypted_symmetric_key
            FROM message_texts
            WHERE message_id = ? AND target_user_id = ?
            "#,
        )
        .bind(message_id)
        .bind(target_user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(MessageText::from))
    }

    /// Every ciphertext of a message
    pub async fn message_texts(&self, message_id: &str) -> Result<Vec<MessageText>> {
        let rows: Vec<MessageTextRow> = sqlx::query_as(
            r#"
            SELECT target_user_id, cipher_text, encrypted_symmetric_key
            FROM message_texts
            WHERE message_id = ?
            ORDER BY target_user_id
            "#,
        )
        .bind(message_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(MessageText::from).collect())
    }

    /// Replace a message's ciphertexts and stamp the edit time
    pub async fn replace_message_content(
        &self,
        message_id: &str,
        content: &[MessageContent],
        edited_at: DateTime<Utc>,
    ) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query("UPDATE messages SET edited_at = ? WHERE id = ?")
            .bind(edited_at)
            .bind(message_id)
            .execute(&mut *tx)
            .await?;
        if updated.rows_affected() == 0 {
            return Ok(false);
        }

        sqlx::query("DELETE FROM message_texts WHERE message_id = ?")
            .bind(message_id)
            .execute(&mut *tx)
            .await?;

        for text in content {
            sqlx::query(
                r#"
                INSERT OR REPLACE INTO message_texts
                    (message_id, target_user_id, cipher_text, encrypted_symmetric_key)
                VALUES (?, ?, ?, ?)
                "#,
            )
            .bind(message_id)
            .bind(&text.target)
            .bind(&text.cipher)
            .bind(&text.encrypted_symmetric_key)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(true)
    }

    /// Delete a message and repoint the channel's `last_message_id` if needed
    pub async fn delete_message(&self, message_id: &str) -> Result<bool> {
        let Some(message) = self.find_message(message_id).await? else {
            return Ok(false);
        };

        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM message_texts WHERE message_id = ?")
            .bind(message_id)
            .execute(&mut *tx)
            .await?;

        let deleted = sqlx::query("DELETE FROM messages WHERE id = ?")
            .bind(message_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            UPDATE channels
            SET last_message_id = (
                SELECT id FROM messages WHERE channel_id = ?
                ORDER BY created_at DESC, rowid DESC LIMIT 1
            )
            WHERE id = ? AND last_message_id = ?
            "#,
        )
        .bind(&message.channel_id)
        .bind(&message.channel_id)
        .bind(message_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(deleted.rows_affected() > 0)
    }
}
