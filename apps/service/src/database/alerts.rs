use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::params::Params;
use libsql::{Row, Value, params};

use super::models::{Alert, AlertFilter, Severity, from_millis, to_millis};
use super::repository::{LibsqlStore, bool_to_int};

const DEFAULT_ALERT_LIMIT: usize = 100;

pub(crate) const ALERT_COLUMNS: &str = "id, check_id, device_id, severity, message, triggered_at, resolved_at, acknowledged_at, consecutive_failures, suppressed, suppressed_by";

#[async_trait]
pub trait AlertRepository: Send + Sync {
    async fn insert_alert(&self, alert: &Alert) -> Result<()>;

    async fn get_alert(&self, id: &str) -> Result<Option<Alert>>;

    /// The unresolved alert for a check, if any
    async fn get_active_alert(&self, check_id: &str) -> Result<Option<Alert>>;

    /// Set `resolved_at`; resolving an already-resolved alert is a no-op
    async fn resolve_alert(&self, id: &str, at: DateTime<Utc>) -> Result<()>;

    async fn acknowledge_alert(&self, id: &str, at: DateTime<Utc>) -> Result<()>;

    /// Alerts matching the filter, newest first
    async fn list_alerts(&self, filter: &AlertFilter) -> Result<Vec<Alert>>;

    /// Unresolved alerts, optionally restricted to one device
    async fn list_active_alerts(&self, device_id: Option<&str>) -> Result<Vec<Alert>>;

    /// Purge resolved alerts whose resolution is older than `before`.
    /// Unresolved alerts are never deleted, whatever their age.
    async fn delete_old_alerts(&self, before: DateTime<Utc>) -> Result<u64>;
}

pub(crate) fn alert_from_row(row: &Row) -> Result<Alert> {
    let severity: String = row.get(3)?;
    Ok(Alert {
        id: row.get(0)?,
        check_id: row.get(1)?,
        device_id: row.get(2)?,
        severity: severity.parse::<Severity>().map_err(|e| anyhow!(e))?,
        message: row.get(4)?,
        triggered_at: from_millis(row.get(5)?),
        resolved_at: row.get::<Option<i64>>(6)?.map(from_millis),
        acknowledged_at: row.get::<Option<i64>>(7)?.map(from_millis),
        consecutive_failures: row.get::<i64>(8)? as u32,
        suppressed: row.get::<i64>(9)? != 0,
        suppressed_by: row.get(10)?,
    })
}

impl LibsqlStore {
    pub(crate) async fn query_alerts(&self, sql: &str, params: impl libsql::params::IntoParams) -> Result<Vec<Alert>> {
        let conn = self.conn().await?;
        let mut rows = conn.query(sql, params).await?;
        let mut alerts = Vec::new();
        while let Some(row) = rows.next().await? {
            alerts.push(alert_from_row(&row)?);
        }
        Ok(alerts)
    }
}

#[async_trait]
impl AlertRepository for LibsqlStore {
    async fn insert_alert(&self, alert: &Alert) -> Result<()> {
        let conn = self.conn().await?;
        conn.execute(
            &format!("INSERT INTO alerts ({ALERT_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"),
            params![
                alert.id.clone(),
                alert.check_id.clone(),
                alert.device_id.clone(),
                alert.severity.as_str(),
                alert.message.clone(),
                to_millis(alert.triggered_at),
                alert.resolved_at.map(to_millis),
                alert.acknowledged_at.map(to_millis),
                alert.consecutive_failures as i64,
                bool_to_int(alert.suppressed),
                alert.suppressed_by.clone()
            ],
        )
        .await
        .context("insert alert")?;
        Ok(())
    }

    async fn get_alert(&self, id: &str) -> Result<Option<Alert>> {
        let alerts = self
            .query_alerts(&format!("SELECT {ALERT_COLUMNS} FROM alerts WHERE id = ?"), params![id])
            .await
            .context("get alert")?;
        Ok(alerts.into_iter().next())
    }

    async fn get_active_alert(&self, check_id: &str) -> Result<Option<Alert>> {
        let alerts = self
            .query_alerts(
                &format!(
                    "SELECT {ALERT_COLUMNS} FROM alerts WHERE check_id = ? AND resolved_at IS NULL ORDER BY triggered_at DESC LIMIT 1"
                ),
                params![check_id],
            )
            .await
            .context("get active alert")?;
        Ok(alerts.into_iter().next())
    }

    async fn resolve_alert(&self, id: &str, at: DateTime<Utc>) -> Result<()> {
        let conn = self.conn().await?;
        conn.execute(
            "UPDATE alerts SET resolved_at = ? WHERE id = ? AND resolved_at IS NULL",
            params![to_millis(at), id],
        )
        .await
        .context("resolve alert")?;
        Ok(())
    }

    async fn acknowledge_alert(&self, id: &str, at: DateTime<Utc>) -> Result<()> {
        let conn = self.conn().await?;
        conn.execute("UPDATE alerts SET acknowledged_at = ? WHERE id = ?", params![to_millis(at), id])
            .await
            .context("acknowledge alert")?;
        Ok(())
    }

    async fn list_alerts(&self, filter: &AlertFilter) -> Result<Vec<Alert>> {
        let mut sql = format!("SELECT {ALERT_COLUMNS} FROM alerts WHERE 1=1");
        let mut args: Vec<Value> = Vec::new();

        if let Some(device_id) = &filter.device_id {
            sql.push_str(" AND device_id = ?");
            args.push(Value::Text(device_id.clone()));
        }
        if let Some(severity) = filter.severity {
            sql.push_str(" AND severity = ?");
            args.push(Value::Text(severity.as_str().to_string()));
        }
        if filter.active_only {
            sql.push_str(" AND resolved_at IS NULL");
        }
        if let Some(suppressed) = filter.suppressed {
            sql.push_str(" AND suppressed = ?");
            args.push(Value::Integer(bool_to_int(suppressed)));
        }

        let limit = if filter.limit == 0 { DEFAULT_ALERT_LIMIT } else { filter.limit };
        sql.push_str(" ORDER BY triggered_at DESC LIMIT ?");
        args.push(Value::Integer(limit as i64));

        self.query_alerts(&sql, Params::Positional(args)).await.context("list alerts")
    }

    async fn list_active_alerts(&self, device_id: Option<&str>) -> Result<Vec<Alert>> {
        let alerts = match device_id {
            Some(device_id) => {
                self.query_alerts(
                    &format!(
                        "SELECT {ALERT_COLUMNS} FROM alerts WHERE device_id = ? AND resolved_at IS NULL ORDER BY triggered_at DESC"
                    ),
                    params![device_id],
                )
                .await
            }
            None => {
                self.query_alerts(
                    &format!(
                        "SELECT {ALERT_COLUMNS} FROM alerts WHERE resolved_at IS NULL ORDER BY triggered_at DESC"
                    ),
                    (),
                )
                .await
            }
        };
        alerts.context("list active alerts")
    }

    async fn delete_old_alerts(&self, before: DateTime<Utc>) -> Result<u64> {
        let conn = self.conn().await?;
        let deleted = conn
            .execute(
                "DELETE FROM alerts WHERE resolved_at IS NOT NULL AND resolved_at < ?",
                params![to_millis(before)],
            )
            .await
            .context("delete old alerts")?;
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{create_test_store, sample_alert};
    use chrono::Duration;

    #[tokio::test]
    async fn test_active_alert_lifecycle() -> Result<()> {
        let (store, _dir) = create_test_store().await?;
        let alert = sample_alert("chk-1", "dev-1", Severity::Warning);
        store.insert_alert(&alert).await?;

        let active = store.get_active_alert("chk-1").await?.expect("alert should be active");
        assert_eq!(active.id, alert.id);
        assert_eq!(active.severity, Severity::Warning);

        store.resolve_alert(&alert.id, Utc::now()).await?;
        assert!(store.get_active_alert("chk-1").await?.is_none());

        let resolved = store.get_alert(&alert.id).await?.expect("alert should still exist");
        assert!(resolved.resolved_at.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn test_acknowledge_alert() -> Result<()> {
        let (store, _dir) = create_test_store().await?;
        let alert = sample_alert("chk-1", "dev-1", Severity::Critical);
        store.insert_alert(&alert).await?;
        store.acknowledge_alert(&alert.id, Utc::now()).await?;

        let loaded = store.get_alert(&alert.id).await?.expect("alert should exist");
        assert!(loaded.acknowledged_at.is_some());
        assert!(loaded.is_active());
        Ok(())
    }

    #[tokio::test]
    async fn test_list_alerts_filters() -> Result<()> {
        let (store, _dir) = create_test_store().await?;
        store.insert_alert(&sample_alert("chk-1", "dev-1", Severity::Warning)).await?;
        store.insert_alert(&sample_alert("chk-2", "dev-1", Severity::Critical)).await?;

        let mut suppressed = sample_alert("chk-3", "dev-2", Severity::Warning);
        suppressed.suppressed = true;
        suppressed.suppressed_by = Some("dev-1".into());
        store.insert_alert(&suppressed).await?;

        let by_device = AlertFilter { device_id: Some("dev-1".into()), ..Default::default() };
        assert_eq!(store.list_alerts(&by_device).await?.len(), 2);

        let critical = AlertFilter { severity: Some(Severity::Critical), ..Default::default() };
        let found = store.list_alerts(&critical).await?;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].check_id, "chk-2");

        let only_suppressed = AlertFilter { suppressed: Some(true), ..Default::default() };
        let found = store.list_alerts(&only_suppressed).await?;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].suppressed_by.as_deref(), Some("dev-1"));

        let limited = AlertFilter { limit: 1, ..Default::default() };
        assert_eq!(store.list_alerts(&limited).await?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_old_alerts_keeps_unresolved() -> Result<()> {
        let (store, _dir) = create_test_store().await?;
        let long_ago = Utc::now() - Duration::days(90);

        let mut stale_open = sample_alert("chk-1", "dev-1", Severity::Critical);
        stale_open.triggered_at = long_ago;
        store.insert_alert(&stale_open).await?;

        let mut stale_resolved = sample_alert("chk-2", "dev-2", Severity::Warning);
        stale_resolved.triggered_at = long_ago;
        stale_resolved.resolved_at = Some(long_ago + Duration::hours(1));
        store.insert_alert(&stale_resolved).await?;

        let deleted = store.delete_old_alerts(Utc::now() - Duration::days(30)).await?;
        assert_eq!(deleted, 1);
        assert!(store.get_alert(&stale_open.id).await?.is_some());
        assert!(store.get_alert(&stale_resolved.id).await?.is_none());
        Ok(())
    }
}
