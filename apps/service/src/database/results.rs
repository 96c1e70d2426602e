use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::params;

use super::models::{CheckResult, from_millis, to_millis};
use super::repository::{LibsqlStore, bool_to_int};

/// Default page size for result listings
const DEFAULT_RESULT_LIMIT: usize = 100;

#[async_trait]
pub trait ResultRepository: Send + Sync {
    /// Append a result; returns its row id
    async fn insert_result(&self, result: &CheckResult) -> Result<i64>;

    /// Most recent results for a device, newest first. A limit of 0 means 100.
    async fn list_results(&self, device_id: &str, limit: usize) -> Result<Vec<CheckResult>>;

    /// Delete results checked before `before`; returns the number deleted
    async fn delete_old_results(&self, before: DateTime<Utc>) -> Result<u64>;
}

#[async_trait]
impl ResultRepository for LibsqlStore {
    async fn insert_result(&self, result: &CheckResult) -> Result<i64> {
        let conn = self.conn().await?;
        conn.execute(
            "INSERT INTO check_results (check_id, device_id, success, latency_ms, packet_loss, error_message, checked_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
            params![
                result.check_id.clone(),
                result.device_id.clone(),
                bool_to_int(result.success),
                result.latency_ms,
                result.packet_loss,
                result.error_message.clone(),
                to_millis(result.checked_at)
            ],
        )
        .await
        .context("insert result")?;

        Ok(conn.last_insert_rowid())
    }

    async fn list_results(&self, device_id: &str, limit: usize) -> Result<Vec<CheckResult>> {
        let limit = if limit == 0 { DEFAULT_RESULT_LIMIT } else { limit };
        let conn = self.conn().await?;
        let mut rows = conn
            .query(
                "SELECT id, check_id, device_id, success, latency_ms, packet_loss, error_message, checked_at FROM check_results WHERE device_id = ? ORDER BY checked_at DESC LIMIT ?",
                params![device_id, limit as i64],
            )
            .await
            .context("list results")?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await? {
            results.push(CheckResult {
                id: Some(row.get(0)?),
                check_id: row.get(1)?,
                device_id: row.get(2)?,
                success: row.get::<i64>(3)? != 0,
                latency_ms: row.get(4)?,
                packet_loss: row.get(5)?,
                error_message: row.get(6)?,
                checked_at: from_millis(row.get(7)?),
            });
        }

        Ok(results)
    }

    async fn delete_old_results(&self, before: DateTime<Utc>) -> Result<u64> {
        let conn = self.conn().await?;
        let deleted = conn
            .execute("DELETE FROM check_results WHERE checked_at < ?", params![to_millis(before)])
            .await
            .context("delete old results")?;
        Ok(deleted)
    }
}
