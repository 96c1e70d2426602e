use anyhow::{Context, Result};
use async_trait::async_trait;
use libsql::{Row, params};

use super::models::{NotificationChannel, from_millis, to_millis};
use super::repository::{LibsqlStore, bool_to_int};

#[async_trait]
pub trait ChannelRepository: Send + Sync {
    async fn insert_channel(&self, channel: &NotificationChannel) -> Result<()>;

    async fn get_channel(&self, id: &str) -> Result<Option<NotificationChannel>>;

    async fn list_channels(&self) -> Result<Vec<NotificationChannel>>;

    /// Channels alert events are delivered to
    async fn list_enabled_channels(&self) -> Result<Vec<NotificationChannel>>;

    async fn update_channel(&self, channel: &NotificationChannel) -> Result<()>;

    async fn delete_channel(&self, id: &str) -> Result<()>;
}

const CHANNEL_COLUMNS: &str = "id, name, type, config, enabled, created_at, updated_at";

fn channel_from_row(row: &Row) -> Result<NotificationChannel> {
    Ok(NotificationChannel {
        id: row.get(0)?,
        name: row.get(1)?,
        channel_type: row.get(2)?,
        config: row.get(3)?,
        enabled: row.get::<i64>(4)? != 0,
        created_at: from_millis(row.get(5)?),
        updated_at: from_millis(row.get(6)?),
    })
}

impl LibsqlStore {
    async fn query_channels(
        &self,
        sql: &str,
        params: impl libsql::params::IntoParams,
    ) -> Result<Vec<NotificationChannel>> {
        let conn = self.conn().await?;
        let mut rows = conn.query(sql, params).await?;
        let mut channels = Vec::new();
        while let Some(row) = rows.next().await? {
            channels.push(channel_from_row(&row)?);
        }
        Ok(channels)
    }
}

#[async_trait]
impl ChannelRepository for LibsqlStore {
    async fn insert_channel(&self, channel: &NotificationChannel) -> Result<()> {
        let conn = self.conn().await?;
        conn.execute(
            &format!("INSERT INTO notification_channels ({CHANNEL_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?)"),
            params![
                channel.id.clone(),
                channel.name.clone(),
                channel.channel_type.clone(),
                channel.config.clone(),
                bool_to_int(channel.enabled),
                to_millis(channel.created_at),
                to_millis(channel.updated_at)
            ],
        )
        .await
        .context("insert notification channel")?;
        Ok(())
    }

    async fn get_channel(&self, id: &str) -> Result<Option<NotificationChannel>> {
        let channels = self
            .query_channels(
                &format!("SELECT {CHANNEL_COLUMNS} FROM notification_channels WHERE id = ?"),
                params![id],
            )
            .await
            .context("get notification channel")?;
        Ok(channels.into_iter().next())
    }

    async fn list_channels(&self) -> Result<Vec<NotificationChannel>> {
        self.query_channels(
            &format!("SELECT {CHANNEL_COLUMNS} FROM notification_channels ORDER BY created_at"),
            (),
        )
        .await
        .context("list notification channels")
    }

    async fn list_enabled_channels(&self) -> Result<Vec<NotificationChannel>> {
        self.query_channels(
            &format!(
                "SELECT {CHANNEL_COLUMNS} FROM notification_channels WHERE enabled = 1 ORDER BY created_at"
            ),
            (),
        )
        .await
        .context("list enabled notification channels")
    }

    async fn update_channel(&self, channel: &NotificationChannel) -> Result<()> {
        let conn = self.conn().await?;
        conn.execute(
            "UPDATE notification_channels SET name = ?, type = ?, config = ?, enabled = ?, updated_at = ? WHERE id = ?",
            params![
                channel.name.clone(),
                channel.channel_type.clone(),
                channel.config.clone(),
                bool_to_int(channel.enabled),
                to_millis(channel.updated_at),
                channel.id.clone()
            ],
        )
        .await
        .context("update notification channel")?;
        Ok(())
    }

    async fn delete_channel(&self, id: &str) -> Result<()> {
        let conn = self.conn().await?;
        conn.execute("DELETE FROM notification_channels WHERE id = ?", params![id])
            .await
            .context("delete notification channel")?;
        Ok(())
    }
}
