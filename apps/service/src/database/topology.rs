use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use libsql::params;

use super::alerts::ALERT_COLUMNS;
use super::models::{Alert, CheckDependency, Device, from_millis, to_millis};
use super::repository::LibsqlStore;

#[async_trait]
pub trait TopologyRepository: Send + Sync {
    /// Insert or replace a device record. A `None` last-seen keeps the stored value.
    async fn upsert_device(&self, device: &Device) -> Result<()>;

    async fn get_device(&self, id: &str) -> Result<Option<Device>>;

    /// Record that a device answered a probe
    async fn touch_device(&self, id: &str, at: DateTime<Utc>) -> Result<()>;

    /// Unresolved alerts of the device's parent triggered within `window`,
    /// together with the parent id. No device or no parent yields `(vec![], None)`.
    async fn get_parent_active_alerts(
        &self,
        device_id: &str,
        window: Duration,
    ) -> Result<(Vec<Alert>, Option<String>)>;

    async fn add_dependency(&self, check_id: &str, device_id: &str) -> Result<()>;

    async fn remove_dependency(&self, check_id: &str, device_id: &str) -> Result<()>;

    async fn list_dependencies(&self, check_id: &str) -> Result<Vec<CheckDependency>>;

    /// First device this check depends on that currently has an unresolved alert
    async fn is_suppressed(&self, check_id: &str) -> Result<Option<String>>;
}

#[async_trait]
impl TopologyRepository for LibsqlStore {
    async fn upsert_device(&self, device: &Device) -> Result<()> {
        let conn = self.conn().await?;
        conn.execute(
            "INSERT INTO devices (id, hostname, parent_device_id, last_seen) VALUES (?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                hostname = excluded.hostname,
                parent_device_id = excluded.parent_device_id,
                last_seen = COALESCE(excluded.last_seen, devices.last_seen)",
            params![
                device.id.clone(),
                device.hostname.clone(),
                device.parent_device_id.clone(),
                device.last_seen.map(to_millis)
            ],
        )
        .await
        .context("upsert device")?;
        Ok(())
    }

    async fn get_device(&self, id: &str) -> Result<Option<Device>> {
        let conn = self.conn().await?;
        let mut rows = conn
            .query("SELECT id, hostname, parent_device_id, last_seen FROM devices WHERE id = ?", params![id])
            .await
            .context("get device")?;

        match rows.next().await? {
            Some(row) => Ok(Some(Device {
                id: row.get(0)?,
                hostname: row.get(1)?,
                parent_device_id: row.get::<Option<String>>(2)?.filter(|p| !p.is_empty()),
                last_seen: row.get::<Option<i64>>(3)?.map(from_millis),
            })),
            None => Ok(None),
        }
    }

    async fn touch_device(&self, id: &str, at: DateTime<Utc>) -> Result<()> {
        let conn = self.conn().await?;
        conn.execute(
            "INSERT INTO devices (id, last_seen) VALUES (?, ?)
             ON CONFLICT(id) DO UPDATE SET last_seen = excluded.last_seen",
            params![id, to_millis(at)],
        )
        .await
        .context("update device last seen")?;
        Ok(())
    }

    async fn get_parent_active_alerts(
        &self,
        device_id: &str,
        window: Duration,
    ) -> Result<(Vec<Alert>, Option<String>)> {
        let Some(parent_id) = self.get_device(device_id).await?.and_then(|d| d.parent_device_id) else {
            return Ok((Vec::new(), None));
        };

        let since = Utc::now() - window;
        let alerts = self
            .query_alerts(
                &format!(
                    "SELECT {ALERT_COLUMNS} FROM alerts WHERE device_id = ? AND resolved_at IS NULL AND triggered_at >= ? ORDER BY triggered_at DESC"
                ),
                params![parent_id.clone(), to_millis(since)],
            )
            .await
            .context("get parent active alerts")?;

        Ok((alerts, Some(parent_id)))
    }

    async fn add_dependency(&self, check_id: &str, device_id: &str) -> Result<()> {
        let conn = self.conn().await?;
        conn.execute(
            "INSERT OR IGNORE INTO check_dependencies (check_id, device_id, created_at) VALUES (?, ?, ?)",
            params![check_id, device_id, to_millis(Utc::now())],
        )
        .await
        .context("add check dependency")?;
        Ok(())
    }

    async fn remove_dependency(&self, check_id: &str, device_id: &str) -> Result<()> {
        let conn = self.conn().await?;
        conn.execute(
            "DELETE FROM check_dependencies WHERE check_id = ? AND device_id = ?",
            params![check_id, device_id],
        )
        .await
        .context("remove check dependency")?;
        Ok(())
    }

    async fn list_dependencies(&self, check_id: &str) -> Result<Vec<CheckDependency>> {
        let conn = self.conn().await?;
        let mut rows = conn
            .query(
                "SELECT check_id, device_id, created_at FROM check_dependencies WHERE check_id = ? ORDER BY created_at",
                params![check_id],
            )
            .await
            .context("list check dependencies")?;

        let mut deps = Vec::new();
        while let Some(row) = rows.next().await? {
            deps.push(CheckDependency {
                check_id: row.get(0)?,
                device_id: row.get(1)?,
                created_at: from_millis(row.get(2)?),
            });
        }
        Ok(deps)
    }

    async fn is_suppressed(&self, check_id: &str) -> Result<Option<String>> {
        let conn = self.conn().await?;
        let mut rows = conn
            .query(
                "SELECT d.device_id FROM check_dependencies d
                 JOIN alerts a ON a.device_id = d.device_id
                 WHERE d.check_id = ? AND a.resolved_at IS NULL
                 ORDER BY d.created_at LIMIT 1",
                params![check_id],
            )
            .await
            .context("check suppression")?;

        match rows.next().await? {
            Some(row) => Ok(Some(row.get(0)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::alerts::AlertRepository;
    use crate::database::checks::CheckRepository;
    use crate::database::models::{Check, Severity};
    use crate::test_support::{create_test_store, sample_alert};

    #[tokio::test]
    async fn test_upsert_device_keeps_last_seen() -> Result<()> {
        let (store, _dir) = create_test_store().await?;
        let seen = Utc::now();
        store.touch_device("dev-1", seen).await?;
        store.upsert_device(&Device::new("dev-1", "switch-1").with_parent("dev-0")).await?;

        let device = store.get_device("dev-1").await?.expect("device should exist");
        assert_eq!(device.hostname, "switch-1");
        assert_eq!(device.parent_device_id.as_deref(), Some("dev-0"));
        assert_eq!(device.last_seen.map(|t| t.timestamp_millis()), Some(seen.timestamp_millis()));
        Ok(())
    }

    #[tokio::test]
    async fn test_parent_active_alerts_respects_window() -> Result<()> {
        let (store, _dir) = create_test_store().await?;
        store.upsert_device(&Device::new("router", "router")).await?;
        store.upsert_device(&Device::new("host", "host").with_parent("router")).await?;

        let mut old = sample_alert("chk-r", "router", Severity::Warning);
        old.triggered_at = Utc::now() - Duration::hours(2);
        store.insert_alert(&old).await?;

        let (alerts, parent) = store.get_parent_active_alerts("host", Duration::minutes(5)).await?;
        assert!(alerts.is_empty());
        assert_eq!(parent.as_deref(), Some("router"));

        store.insert_alert(&sample_alert("chk-r2", "router", Severity::Critical)).await?;
        let (alerts, _) = store.get_parent_active_alerts("host", Duration::minutes(5)).await?;
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].check_id, "chk-r2");
        Ok(())
    }

    #[tokio::test]
    async fn test_parent_active_alerts_without_parent() -> Result<()> {
        let (store, _dir) = create_test_store().await?;
        let (alerts, parent) = store.get_parent_active_alerts("unknown", Duration::minutes(5)).await?;
        assert!(alerts.is_empty());
        assert!(parent.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_dependencies_and_suppression() -> Result<()> {
        let (store, _dir) = create_test_store().await?;
        store.insert_check(&Check::new("app", "tcp", "10.0.0.5:443").with_id("chk-app")).await?;
        store.add_dependency("chk-app", "db").await?;
        store.add_dependency("chk-app", "db").await?;
        assert_eq!(store.list_dependencies("chk-app").await?.len(), 1);

        assert!(store.is_suppressed("chk-app").await?.is_none());

        let alert = sample_alert("chk-db", "db", Severity::Warning);
        store.insert_alert(&alert).await?;
        assert_eq!(store.is_suppressed("chk-app").await?.as_deref(), Some("db"));

        store.resolve_alert(&alert.id, Utc::now()).await?;
        assert!(store.is_suppressed("chk-app").await?.is_none());

        store.remove_dependency("chk-app", "db").await?;
        assert!(store.list_dependencies("chk-app").await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_check_cascades_dependencies() -> Result<()> {
        let (store, _dir) = create_test_store().await?;
        store.insert_check(&Check::new("app", "icmp", "10.0.0.5").with_id("chk-app")).await?;
        store.add_dependency("chk-app", "db").await?;
        store.delete_check("chk-app").await?;
        assert!(store.list_dependencies("chk-app").await?.is_empty());
        Ok(())
    }
}
