use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Row, params};

use super::models::{Check, from_millis, to_millis};
use super::repository::{LibsqlStore, bool_to_int};
use crate::validation::validate_target;

#[async_trait]
pub trait CheckRepository: Send + Sync {
    /// Insert a new check; the target must be valid for its check type
    async fn insert_check(&self, check: &Check) -> Result<()>;

    /// Get a check by id
    async fn get_check(&self, id: &str) -> Result<Option<Check>>;

    /// Get the first check registered for a device
    async fn get_check_by_device(&self, device_id: &str) -> Result<Option<Check>>;

    /// All checks, oldest first
    async fn list_checks(&self) -> Result<Vec<Check>>;

    /// Enabled checks only, oldest first
    async fn list_enabled_checks(&self) -> Result<Vec<Check>>;

    /// Replace the mutable fields of a check
    async fn update_check(&self, check: &Check) -> Result<()>;

    async fn set_check_enabled(&self, id: &str, enabled: bool, at: DateTime<Utc>) -> Result<()>;

    /// Delete a check and its dependency edges
    async fn delete_check(&self, id: &str) -> Result<()>;
}

const CHECK_COLUMNS: &str =
    "id, device_id, check_type, target, interval_seconds, enabled, created_at, updated_at";

fn check_from_row(row: &Row) -> Result<Check> {
    Ok(Check {
        id: row.get(0)?,
        device_id: row.get(1)?,
        check_type: row.get(2)?,
        target: row.get(3)?,
        interval_seconds: row.get::<i64>(4)? as u64,
        enabled: row.get::<i64>(5)? != 0,
        created_at: from_millis(row.get(6)?),
        updated_at: from_millis(row.get(7)?),
    })
}

impl LibsqlStore {
    async fn query_checks(&self, sql: &str, params: impl libsql::params::IntoParams) -> Result<Vec<Check>> {
        let conn = self.conn().await?;
        let mut rows = conn.query(sql, params).await?;
        let mut checks = Vec::new();
        while let Some(row) = rows.next().await? {
            checks.push(check_from_row(&row)?);
        }
        Ok(checks)
    }
}

#[async_trait]
impl CheckRepository for LibsqlStore {
    async fn insert_check(&self, check: &Check) -> Result<()> {
        validate_target(&check.check_type, &check.target)?;

        let conn = self.conn().await?;
        conn.execute(
            &format!("INSERT INTO checks ({CHECK_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?)"),
            params![
                check.id.clone(),
                check.device_id.clone(),
                check.check_type.clone(),
                check.target.clone(),
                check.interval_seconds as i64,
                bool_to_int(check.enabled),
                to_millis(check.created_at),
                to_millis(check.updated_at)
            ],
        )
        .await
        .context("insert check")?;
        Ok(())
    }

    async fn get_check(&self, id: &str) -> Result<Option<Check>> {
        let checks = self
            .query_checks(&format!("SELECT {CHECK_COLUMNS} FROM checks WHERE id = ?"), params![id])
            .await
            .context("get check")?;
        Ok(checks.into_iter().next())
    }

    async fn get_check_by_device(&self, device_id: &str) -> Result<Option<Check>> {
        let checks = self
            .query_checks(
                &format!(
                    "SELECT {CHECK_COLUMNS} FROM checks WHERE device_id = ? ORDER BY created_at LIMIT 1"
                ),
                params![device_id],
            )
            .await
            .context("get check by device")?;
        Ok(checks.into_iter().next())
    }

    async fn list_checks(&self) -> Result<Vec<Check>> {
        self.query_checks(&format!("SELECT {CHECK_COLUMNS} FROM checks ORDER BY created_at"), ())
            .await
            .context("list checks")
    }

    async fn list_enabled_checks(&self) -> Result<Vec<Check>> {
        self.query_checks(
            &format!("SELECT {CHECK_COLUMNS} FROM checks WHERE enabled = 1 ORDER BY created_at"),
            (),
        )
        .await
        .context("list enabled checks")
    }

    async fn update_check(&self, check: &Check) -> Result<()> {
        validate_target(&check.check_type, &check.target)?;

        let conn = self.conn().await?;
        conn.execute(
            "UPDATE checks SET device_id = ?, check_type = ?, target = ?, interval_seconds = ?, enabled = ?, updated_at = ? WHERE id = ?",
            params![
                check.device_id.clone(),
                check.check_type.clone(),
                check.target.clone(),
                check.interval_seconds as i64,
                bool_to_int(check.enabled),
                to_millis(check.updated_at),
                check.id.clone()
            ],
        )
        .await
        .context("update check")?;
        Ok(())
    }

    async fn set_check_enabled(&self, id: &str, enabled: bool, at: DateTime<Utc>) -> Result<()> {
        let conn = self.conn().await?;
        conn.execute(
            "UPDATE checks SET enabled = ?, updated_at = ? WHERE id = ?",
            params![bool_to_int(enabled), to_millis(at), id],
        )
        .await
        .context("update check enabled")?;
        Ok(())
    }

    async fn delete_check(&self, id: &str) -> Result<()> {
        let conn = self.conn().await?;
        // Dependency rows go with the check via ON DELETE CASCADE
        conn.execute("DELETE FROM checks WHERE id = ?", params![id]).await.context("delete check")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::create_test_store;

    #[tokio::test]
    async fn test_insert_and_get_check() -> Result<()> {
        let (store, _dir) = create_test_store().await?;
        let check = Check::new("dev-1", "icmp", "10.0.0.1").with_id("chk-1");
        store.insert_check(&check).await?;

        let loaded = store.get_check("chk-1").await?.expect("check should exist");
        assert_eq!(loaded.device_id, "dev-1");
        assert_eq!(loaded.target, "10.0.0.1");
        assert!(loaded.enabled);

        assert!(store.get_check("missing").await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_list_enabled_checks_skips_disabled() -> Result<()> {
        let (store, _dir) = create_test_store().await?;
        store.insert_check(&Check::new("dev-1", "icmp", "10.0.0.1").with_id("chk-1")).await?;
        store.insert_check(&Check::new("dev-2", "tcp", "10.0.0.2:22").with_id("chk-2")).await?;
        store.set_check_enabled("chk-2", false, Utc::now()).await?;

        let enabled = store.list_enabled_checks().await?;
        assert_eq!(enabled.len(), 1);
        assert_eq!(enabled[0].id, "chk-1");
        assert_eq!(store.list_checks().await?.len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_insert_check_rejects_invalid_target() -> Result<()> {
        let (store, _dir) = create_test_store().await?;
        let check = Check::new("dev-1", "tcp", "no-port-here");
        assert!(store.insert_check(&check).await.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn test_get_check_by_device() -> Result<()> {
        let (store, _dir) = create_test_store().await?;
        store.insert_check(&Check::new("dev-9", "http", "http://10.0.0.9/health").with_id("chk-9")).await?;

        let found = store.get_check_by_device("dev-9").await?;
        assert_eq!(found.map(|c| c.id), Some("chk-9".to_string()));
        assert!(store.get_check_by_device("dev-0").await?.is_none());
        Ok(())
    }
}
