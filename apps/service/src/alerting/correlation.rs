use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Result;
use chrono::Duration;
use serde::Serialize;
use tracing::debug;

use crate::database::models::Alert;
use crate::database::{AlertRepository, Store, TopologyRepository};

/// Outcome of a correlation lookup for one device
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Correlation {
    pub suppressed: bool,
    pub parent_device_id: Option<String>,
}

/// A parent alert together with the child alerts it suppressed
#[derive(Debug, Clone, Serialize)]
pub struct CorrelatedGroup {
    pub parent_alert: Alert,
    pub suppressed_children: Vec<Alert>,
}

/// Decides whether a device's failure is explained by its immediate
/// parent already alerting. Grandparents are never consulted.
pub struct CorrelationEngine {
    store: Arc<dyn Store>,
    window: Duration,
}

impl CorrelationEngine {
    pub fn new(store: Arc<dyn Store>, window: Duration) -> Self {
        Self { store, window }
    }

    pub async fn check(&self, device_id: &str) -> Result<Correlation> {
        let (parent_alerts, parent_device_id) =
            self.store.get_parent_active_alerts(device_id, self.window).await?;

        if parent_alerts.is_empty() {
            debug!(device_id, "no parent alerts for correlation");
            return Ok(Correlation::default());
        }

        debug!(
            device_id,
            parent_device_id = parent_device_id.as_deref().unwrap_or_default(),
            parent_active_alerts = parent_alerts.len(),
            window_secs = self.window.num_seconds(),
            "alert correlated with parent device"
        );

        Ok(Correlation { suppressed: true, parent_device_id })
    }

    /// Active parent alerts with the active alerts they suppress. Children
    /// attach to the newest unsuppressed alert of the causing device.
    pub async fn correlated_groups(&self) -> Result<Vec<CorrelatedGroup>> {
        let active = self.store.list_active_alerts(None).await?;

        let mut seen_parents = HashSet::new();
        let mut groups = Vec::new();
        for parent in active.iter().filter(|a| !a.suppressed) {
            if !seen_parents.insert(parent.device_id.as_str()) {
                continue;
            }
            let children: Vec<Alert> = active
                .iter()
                .filter(|a| a.suppressed && a.suppressed_by.as_deref() == Some(parent.device_id.as_str()))
                .cloned()
                .collect();
            if !children.is_empty() {
                groups.push(CorrelatedGroup { parent_alert: parent.clone(), suppressed_children: children });
            }
        }
        Ok(groups)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::{Device, Severity};
    use crate::test_support::{create_test_store, sample_alert};
    use chrono::Utc;

    #[tokio::test]
    async fn test_child_suppressed_by_alerting_parent() -> Result<()> {
        let (store, _dir) = create_test_store().await?;
        store.upsert_device(&Device::new("A", "router")).await?;
        store.upsert_device(&Device::new("B", "host").with_parent("A")).await?;

        let engine = CorrelationEngine::new(store.clone(), Duration::minutes(5));
        assert_eq!(engine.check("B").await?, Correlation::default());

        let parent_alert = sample_alert("chk-a", "A", Severity::Warning);
        store.insert_alert(&parent_alert).await?;
        let result = engine.check("B").await?;
        assert!(result.suppressed);
        assert_eq!(result.parent_device_id.as_deref(), Some("A"));

        store.resolve_alert(&parent_alert.id, Utc::now()).await?;
        assert!(!engine.check("B").await?.suppressed);
        Ok(())
    }

    #[tokio::test]
    async fn test_parent_alert_outside_window() -> Result<()> {
        let (store, _dir) = create_test_store().await?;
        store.upsert_device(&Device::new("B", "host").with_parent("A")).await?;

        let mut stale = sample_alert("chk-a", "A", Severity::Critical);
        stale.triggered_at = Utc::now() - Duration::minutes(30);
        store.insert_alert(&stale).await?;

        let engine = CorrelationEngine::new(store.clone(), Duration::minutes(5));
        assert!(!engine.check("B").await?.suppressed);
        Ok(())
    }

    #[tokio::test]
    async fn test_grandparent_alone_does_not_suppress() -> Result<()> {
        let (store, _dir) = create_test_store().await?;
        store.upsert_device(&Device::new("core", "core")).await?;
        store.upsert_device(&Device::new("dist", "dist").with_parent("core")).await?;
        store.upsert_device(&Device::new("leaf", "leaf").with_parent("dist")).await?;
        store.insert_alert(&sample_alert("chk-core", "core", Severity::Critical)).await?;

        let engine = CorrelationEngine::new(store.clone(), Duration::minutes(5));
        assert!(engine.check("dist").await?.suppressed);
        assert!(!engine.check("leaf").await?.suppressed);
        Ok(())
    }

    #[tokio::test]
    async fn test_unknown_device_not_suppressed() -> Result<()> {
        let (store, _dir) = create_test_store().await?;
        let engine = CorrelationEngine::new(store.clone(), Duration::minutes(5));
        assert_eq!(engine.check("ghost").await?, Correlation::default());
        Ok(())
    }

    #[tokio::test]
    async fn test_correlated_groups() -> Result<()> {
        let (store, _dir) = create_test_store().await?;
        let parent = sample_alert("chk-a", "A", Severity::Critical);
        store.insert_alert(&parent).await?;

        for (check, device) in [("chk-b", "B"), ("chk-c", "C")] {
            let mut child = sample_alert(check, device, Severity::Warning);
            child.suppressed = true;
            child.suppressed_by = Some("A".into());
            store.insert_alert(&child).await?;
        }
        store.insert_alert(&sample_alert("chk-d", "D", Severity::Warning)).await?;

        let engine = CorrelationEngine::new(store.clone(), Duration::minutes(5));
        let groups = engine.correlated_groups().await?;
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].parent_alert.id, parent.id);
        assert_eq!(groups[0].suppressed_children.len(), 2);
        Ok(())
    }
}
