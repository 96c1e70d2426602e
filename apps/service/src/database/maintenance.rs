use anyhow::{Context, Result};
use async_trait::async_trait;
use libsql::{Row, params};

use super::models::{MaintWindow, from_millis, to_millis};
use super::repository::{LibsqlStore, bool_to_int};
use crate::validation::validate_window;

#[async_trait]
pub trait MaintenanceRepository: Send + Sync {
    async fn insert_window(&self, window: &MaintWindow) -> Result<()>;

    async fn get_window(&self, id: &str) -> Result<Option<MaintWindow>>;

    /// All windows, ordered by start time
    async fn list_windows(&self) -> Result<Vec<MaintWindow>>;

    /// Enabled windows only
    async fn list_enabled_windows(&self) -> Result<Vec<MaintWindow>>;

    async fn update_window(&self, window: &MaintWindow) -> Result<()>;

    async fn delete_window(&self, id: &str) -> Result<()>;
}

const WINDOW_COLUMNS: &str =
    "id, name, description, start_time, end_time, recurrence, device_ids, enabled, created_at, updated_at";

fn window_from_row(row: &Row) -> Result<MaintWindow> {
    let device_ids: String = row.get(6)?;
    Ok(MaintWindow {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        start_time: from_millis(row.get(3)?),
        end_time: from_millis(row.get(4)?),
        recurrence: row.get(5)?,
        device_ids: serde_json::from_str(&device_ids).context("decode window device ids")?,
        enabled: row.get::<i64>(7)? != 0,
        created_at: from_millis(row.get(8)?),
        updated_at: from_millis(row.get(9)?),
    })
}

impl LibsqlStore {
    async fn query_windows(&self, sql: &str) -> Result<Vec<MaintWindow>> {
        let conn = self.conn().await?;
        let mut rows = conn.query(sql, ()).await?;
        let mut windows = Vec::new();
        while let Some(row) = rows.next().await? {
            windows.push(window_from_row(&row)?);
        }
        Ok(windows)
    }
}

#[async_trait]
impl MaintenanceRepository for LibsqlStore {
    async fn insert_window(&self, window: &MaintWindow) -> Result<()> {
        validate_window(window)?;
        let device_ids = serde_json::to_string(&window.device_ids)?;

        let conn = self.conn().await?;
        conn.execute(
            &format!("INSERT INTO maint_windows ({WINDOW_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"),
            params![
                window.id.clone(),
                window.name.clone(),
                window.description.clone(),
                to_millis(window.start_time),
                to_millis(window.end_time),
                window.recurrence.clone(),
                device_ids,
                bool_to_int(window.enabled),
                to_millis(window.created_at),
                to_millis(window.updated_at)
            ],
        )
        .await
        .context("insert maintenance window")?;
        Ok(())
    }

    async fn get_window(&self, id: &str) -> Result<Option<MaintWindow>> {
        let conn = self.conn().await?;
        let mut rows = conn
            .query(&format!("SELECT {WINDOW_COLUMNS} FROM maint_windows WHERE id = ?"), params![id])
            .await
            .context("get maintenance window")?;
        match rows.next().await? {
            Some(row) => Ok(Some(window_from_row(&row)?)),
            None => Ok(None),
        }
    }

    async fn list_windows(&self) -> Result<Vec<MaintWindow>> {
        self.query_windows(&format!("SELECT {WINDOW_COLUMNS} FROM maint_windows ORDER BY start_time"))
            .await
            .context("list maintenance windows")
    }

    async fn list_enabled_windows(&self) -> Result<Vec<MaintWindow>> {
        self.query_windows(&format!(
            "SELECT {WINDOW_COLUMNS} FROM maint_windows WHERE enabled = 1 ORDER BY start_time"
        ))
        .await
        .context("list enabled maintenance windows")
    }

    async fn update_window(&self, window: &MaintWindow) -> Result<()> {
        validate_window(window)?;
        let device_ids = serde_json::to_string(&window.device_ids)?;

        let conn = self.conn().await?;
        conn.execute(
            "UPDATE maint_windows SET name = ?, description = ?, start_time = ?, end_time = ?, recurrence = ?, device_ids = ?, enabled = ?, updated_at = ? WHERE id = ?",
            params![
                window.name.clone(),
                window.description.clone(),
                to_millis(window.start_time),
                to_millis(window.end_time),
                window.recurrence.clone(),
                device_ids,
                bool_to_int(window.enabled),
                to_millis(window.updated_at),
                window.id.clone()
            ],
        )
        .await
        .context("update maintenance window")?;
        Ok(())
    }

    async fn delete_window(&self, id: &str) -> Result<()> {
        let conn = self.conn().await?;
        conn.execute("DELETE FROM maint_windows WHERE id = ?", params![id])
            .await
            .context("delete maintenance window")?;
        Ok(())
    }
}
