use chrono::{DateTime, Utc};

use super::users::UserSummaryRow;
use super::Store;
use crate::error::Result;
use crate::models::{Channel, ChannelPermissions, UserSummary};

#[derive(sqlx::FromRow)]
struct ChannelRow {
    id: String,
    name: Option<String>,
    last_message_id: Option<String>,
    created_at: DateTime<Utc>,
}

impl Store {
    /// Create a channel and its member permissions in one transaction
    pub async fn create_channel(
        &self,
        channel_id: &str,
        name: Option<&str>,
        created_at: DateTime<Utc>,
        members: &[(String, ChannelPermissions)],
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("INSERT INTO channels (id, name, last_message_id, created_at) VALUES (?, ?, NULL, ?)")
            .bind(channel_id)
            .bind(name)
            .bind(created_at)
            .execute(&mut *tx)
            .await?;

        for (user_id, permissions) in members {
            sqlx::query(
                r#"
                INSERT INTO channel_permissions (channel_id, user_id, can_read, can_write)
                VALUES (?, ?, ?, ?)
                "#,
            )
            .bind(channel_id)
            .bind(user_id)
            .bind(permissions.can_read)
            .bind(permissions.can_write)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Find a channel with its members
    pub async fn find_channel(&self, channel_id: &str) -> Result<Option<Channel>> {
        let row: Option<ChannelRow> = sqlx::query_as(
            "SELECT id, name, last_message_id, created_at FROM channels WHERE id = ?",
        )
        .bind(channel_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(self.hydrate_channel(row).await?)),
            None => Ok(None),
        }
    }

    /// Every channel the user holds a permission row on, most recently created first
    pub async fn channels_for_user(&self, user_id: &str) -> Result<Vec<Channel>> {
        let rows: Vec<ChannelRow> = sqlx::query_as(
            r#"
            SELECT c.id, c.name, c.last_message_id, c.created_at
            FROM channels c
            JOIN channel_permissions p ON p.channel_id = c.id
            WHERE p.user_id = ?
            ORDER BY c.created_at DESC, c.rowid DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        let mut channels = Vec::with_capacity(rows.len());
        for row in rows {
            channels.push(self.hydrate_channel(row).await?);
        }
        Ok(channels)
    }

    /// Ids of every member of a channel
    pub async fn channel_member_ids(&self, channel_id: &str) -> Result<Vec<String>> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT user_id FROM channel_permissions WHERE channel_id = ?")
                .bind(channel_id)
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    /// A user's permissions on a channel, if they are a member
    pub async fn find_channel_permissions(
        &self,
        channel_id: &str,
        user_id: &str,
    ) -> Result<Option<ChannelPermissions>> {
        let row: Option<(bool, bool)> = sqlx::query_as(
            "SELECT can_read, can_write FROM channel_permissions WHERE channel_id = ? AND user_id = ?",
        )
        .bind(channel_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(can_read, can_write)| ChannelPermissions {
            can_read,
            can_write,
        }))
    }

    async fn channel_members(&self, channel_id: &str) -> Result<Vec<UserSummary>> {
        let rows: Vec<UserSummaryRow> = sqlx::query_as(
            r#"
            SELECT u.id, u.username, u.nickname, k.public_key
            FROM channel_permissions p
            JOIN users u ON u.id = p.user_id
            LEFT JOIN key_pairs k ON k.user_id = u.id
            WHERE p.channel_id = ?
            ORDER BY u.username
            "#,
        )
        .bind(channel_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(UserSummary::from).collect())
    }

    async fn hydrate_channel(&self, row: ChannelRow) -> Result<Channel> {
        let members = self.channel_members(&row.id).await?;
        Ok(Channel {
            id: row.id,
            name: row.name,
            last_message_id: row.last_message_id,
            created_at: row.created_at,
            members,
        })
    }
}
