use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::correlation::CorrelationEngine;
use super::maintenance::MaintenanceEvaluator;
use crate::database::models::{Alert, Check, CheckResult, Severity};
use crate::database::{AlertRepository, Store, TopologyRepository};
use crate::events::{EventBus, TOPIC_ALERT_RESOLVED, TOPIC_ALERT_SUPPRESSED, TOPIC_ALERT_TRIGGERED};

/// Why a new alert is marked suppressed
#[derive(Debug, Clone, PartialEq)]
enum Suppression {
    Maintenance,
    Dependency(String),
    Parent(String),
}

impl Suppression {
    fn caused_by(self) -> Option<String> {
        match self {
            Suppression::Maintenance => None,
            Suppression::Dependency(device) | Suppression::Parent(device) => Some(device),
        }
    }
}

/// Per-check failure streak tracking and alert lifecycle.
///
/// The counter map lock is held for a whole `process_result` call, so the
/// active-alert lookup and the insert that follows it never interleave
/// with another check's transition.
pub struct Alerter {
    store: Arc<dyn Store>,
    bus: EventBus,
    threshold: u32,
    critical_at: u32,
    correlation: Option<CorrelationEngine>,
    maintenance: Option<MaintenanceEvaluator>,
    failures: Mutex<HashMap<String, u32>>,
}

impl Alerter {
    /// `threshold` consecutive failures raise a warning; twice that, critical
    pub fn new(store: Arc<dyn Store>, bus: EventBus, threshold: u32) -> Self {
        let threshold = threshold.max(1);
        Self {
            store,
            bus,
            threshold,
            critical_at: threshold.saturating_mul(2),
            correlation: None,
            maintenance: None,
            failures: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_correlation(mut self, correlation: CorrelationEngine) -> Self {
        self.correlation = Some(correlation);
        self
    }

    pub fn with_maintenance(mut self, maintenance: MaintenanceEvaluator) -> Self {
        self.maintenance = Some(maintenance);
        self
    }

    /// Current consecutive failure count for a check
    pub async fn failure_count(&self, check_id: &str) -> u32 {
        self.failures.lock().await.get(check_id).copied().unwrap_or(0)
    }

    pub async fn process_result(&self, check: &Check, result: &CheckResult) {
        let mut failures = self.failures.lock().await;

        if result.success {
            failures.remove(&check.id);
            self.handle_success(check).await;
        } else {
            let count = failures.entry(check.id.clone()).or_insert(0);
            *count += 1;
            let count = *count;
            self.handle_failure(check, result, count).await;
        }
    }

    async fn handle_success(&self, check: &Check) {
        let alert = match self.store.get_active_alert(&check.id).await {
            Ok(Some(alert)) => alert,
            Ok(None) => return,
            Err(e) => {
                warn!(check_id = %check.id, error = %e, "failed to get active alert");
                return;
            }
        };

        let now = Utc::now();
        if let Err(e) = self.store.resolve_alert(&alert.id, now).await {
            warn!(alert_id = %alert.id, error = %e, "failed to resolve alert");
            return;
        }

        info!(alert_id = %alert.id, check_id = %check.id, device_id = %check.device_id, "alert resolved");
        self.bus.publish_alert(TOPIC_ALERT_RESOLVED, Alert { resolved_at: Some(now), ..alert });
    }

    async fn handle_failure(&self, check: &Check, result: &CheckResult, count: u32) {
        if count < self.threshold {
            return;
        }

        let existing = match self.store.get_active_alert(&check.id).await {
            Ok(existing) => existing,
            Err(e) => {
                warn!(check_id = %check.id, error = %e, "failed to check existing alert");
                return;
            }
        };

        let critical = count >= self.critical_at;

        if let Some(existing) = existing {
            // The stored severity stays as first raised
            if critical && existing.severity != Severity::Critical {
                info!(
                    alert_id = %existing.id,
                    check_id = %check.id,
                    consecutive_failures = count,
                    "alert escalated to critical"
                );
            }
            return;
        }

        let now = Utc::now();
        let message = match result.error_message.as_deref() {
            Some(error) if !error.is_empty() => error.to_string(),
            _ => format!("check {} failed {} consecutive times", check.id, count),
        };

        let suppression = self.suppression_for(check).await;
        let alert = Alert {
            id: format!("alert-{}", Uuid::new_v4()),
            check_id: check.id.clone(),
            device_id: check.device_id.clone(),
            severity: if critical { Severity::Critical } else { Severity::Warning },
            message,
            triggered_at: now,
            resolved_at: None,
            acknowledged_at: None,
            consecutive_failures: count,
            suppressed: suppression.is_some(),
            suppressed_by: suppression.clone().and_then(Suppression::caused_by),
        };

        if let Err(e) = self.store.insert_alert(&alert).await {
            warn!(check_id = %check.id, error = %e, "failed to insert alert");
            return;
        }

        if let Some(reason) = suppression {
            info!(
                alert_id = %alert.id,
                check_id = %check.id,
                device_id = %check.device_id,
                reason = ?reason,
                "alert suppressed"
            );
            self.bus.publish_alert(TOPIC_ALERT_SUPPRESSED, alert);
            return;
        }

        warn!(
            alert_id = %alert.id,
            check_id = %check.id,
            device_id = %check.device_id,
            severity = %alert.severity,
            consecutive_failures = count,
            "alert triggered"
        );
        self.bus.publish_alert(TOPIC_ALERT_TRIGGERED, alert);
    }

    /// Maintenance first, then explicit dependencies, then topology.
    /// Lookup failures count as "not suppressed".
    async fn suppression_for(&self, check: &Check) -> Option<Suppression> {
        if let Some(maintenance) = &self.maintenance {
            match maintenance.is_device_in_window(Utc::now(), &check.device_id).await {
                Ok(true) => return Some(Suppression::Maintenance),
                Ok(false) => {}
                Err(e) => warn!(device_id = %check.device_id, error = %e, "maintenance window check failed"),
            }
        }

        match self.store.is_suppressed(&check.id).await {
            Ok(Some(device)) => return Some(Suppression::Dependency(device)),
            Ok(None) => {}
            Err(e) => warn!(check_id = %check.id, error = %e, "suppression check failed, proceeding with alert"),
        }

        if let Some(correlation) = &self.correlation {
            match correlation.check(&check.device_id).await {
                Ok(found) if found.suppressed => {
                    if let Some(parent) = found.parent_device_id {
                        return Some(Suppression::Parent(parent));
                    }
                }
                Ok(_) => {}
                Err(e) => warn!(device_id = %check.device_id, error = %e, "correlation check failed"),
            }
        }

        debug!(check_id = %check.id, "alert not suppressed");
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::{AlertFilter, Device, MaintWindow, Recurrence};
    use crate::database::{CheckRepository, LibsqlStore, MaintenanceRepository};
    use crate::events::{Event, EventPayload};
    use crate::test_support::{create_test_store, sample_alert};
    use anyhow::Result;
    use chrono::Duration;
    use tempfile::TempDir;
    use tokio::sync::broadcast;

    async fn setup(threshold: u32) -> Result<(Arc<LibsqlStore>, Alerter, broadcast::Receiver<Event>, TempDir)> {
        let (store, dir) = create_test_store().await?;
        let bus = EventBus::new();
        let rx = bus.subscribe();
        let alerter = Alerter::new(store.clone(), bus, threshold)
            .with_correlation(CorrelationEngine::new(store.clone(), Duration::minutes(5)))
            .with_maintenance(MaintenanceEvaluator::new(store.clone()));
        Ok((store, alerter, rx, dir))
    }

    fn next_alert_event(rx: &mut broadcast::Receiver<Event>) -> Option<(String, Alert)> {
        match rx.try_recv() {
            Ok(Event { topic, payload: EventPayload::Alert(alert), .. }) => Some((topic, alert)),
            _ => None,
        }
    }

    async fn fail(alerter: &Alerter, check: &Check, times: u32) {
        for _ in 0..times {
            alerter.process_result(check, &CheckResult::failure(check, "")).await;
        }
    }

    #[tokio::test]
    async fn test_escalation_threshold_saturates() -> Result<()> {
        let (_store, alerter, _rx, _dir) = setup(u32::MAX).await?;
        assert_eq!(alerter.threshold, u32::MAX);
        assert_eq!(alerter.critical_at, u32::MAX);

        let (_store, alerter, _rx, _dir) = setup(0).await?;
        assert_eq!((alerter.threshold, alerter.critical_at), (1, 2));
        Ok(())
    }

    #[tokio::test]
    async fn test_threshold_raises_single_warning() -> Result<()> {
        let (store, alerter, mut rx, _dir) = setup(3).await?;
        let check = Check::new("dev-1", "icmp", "10.0.0.1");

        fail(&alerter, &check, 2).await;
        assert!(store.get_active_alert(&check.id).await?.is_none());
        assert!(next_alert_event(&mut rx).is_none());

        fail(&alerter, &check, 1).await;
        let alert = store.get_active_alert(&check.id).await?.expect("alert after threshold");
        assert_eq!(alert.severity, Severity::Warning);
        assert_eq!(alert.consecutive_failures, 3);
        assert_eq!(alert.message, format!("check {} failed 3 consecutive times", check.id));

        let (topic, event_alert) = next_alert_event(&mut rx).expect("triggered event");
        assert_eq!(topic, TOPIC_ALERT_TRIGGERED);
        assert_eq!(event_alert.id, alert.id);

        // Crossing 2x threshold leaves the existing alert's severity alone
        fail(&alerter, &check, 4).await;
        assert_eq!(alerter.failure_count(&check.id).await, 7);
        let all = store.list_alerts(&AlertFilter::default()).await?;
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].severity, Severity::Warning);
        assert!(next_alert_event(&mut rx).is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_success_resolves_and_resets() -> Result<()> {
        let (store, alerter, mut rx, _dir) = setup(2).await?;
        let check = Check::new("dev-1", "tcp", "10.0.0.1:22");

        fail(&alerter, &check, 3).await;
        let alert = store.get_active_alert(&check.id).await?.expect("alert raised");
        let _ = next_alert_event(&mut rx);

        alerter.process_result(&check, &CheckResult::success(&check, 1.0)).await;
        assert_eq!(alerter.failure_count(&check.id).await, 0);
        assert!(store.get_active_alert(&check.id).await?.is_none());

        let (topic, resolved) = next_alert_event(&mut rx).expect("resolved event");
        assert_eq!(topic, TOPIC_ALERT_RESOLVED);
        assert_eq!(resolved.id, alert.id);
        assert!(resolved.resolved_at.is_some());

        fail(&alerter, &check, 1).await;
        assert_eq!(alerter.failure_count(&check.id).await, 1);
        assert!(store.get_active_alert(&check.id).await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_success_below_threshold_is_noop() -> Result<()> {
        let (_store, alerter, mut rx, _dir) = setup(3).await?;
        let check = Check::new("dev-1", "icmp", "10.0.0.1");

        fail(&alerter, &check, 2).await;
        alerter.process_result(&check, &CheckResult::success(&check, 1.0)).await;
        assert_eq!(alerter.failure_count(&check.id).await, 0);
        assert!(next_alert_event(&mut rx).is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_new_alert_past_double_threshold_is_critical() -> Result<()> {
        let (store, alerter, _rx, _dir) = setup(2).await?;
        let check = Check::new("dev-1", "icmp", "10.0.0.1");

        fail(&alerter, &check, 4).await;
        let first = store.get_active_alert(&check.id).await?.expect("warning raised");
        assert_eq!(first.severity, Severity::Warning);

        // Closed out of band while the streak continues
        store.resolve_alert(&first.id, Utc::now()).await?;
        fail(&alerter, &check, 1).await;

        let second = store.get_active_alert(&check.id).await?.expect("new alert");
        assert_eq!(second.severity, Severity::Critical);
        assert_eq!(second.consecutive_failures, 5);
        Ok(())
    }

    #[tokio::test]
    async fn test_probe_error_becomes_message() -> Result<()> {
        let (store, alerter, _rx, _dir) = setup(1).await?;
        let check = Check::new("dev-1", "http", "http://10.0.0.1/");
        alerter.process_result(&check, &CheckResult::failure(&check, "unexpected status 502")).await;

        let alert = store.get_active_alert(&check.id).await?.expect("alert raised");
        assert_eq!(alert.message, "unexpected status 502");
        Ok(())
    }

    #[tokio::test]
    async fn test_parent_alert_suppresses_child() -> Result<()> {
        let (store, alerter, mut rx, _dir) = setup(1).await?;
        store.upsert_device(&Device::new("A", "router")).await?;
        store.upsert_device(&Device::new("B", "host").with_parent("A")).await?;
        store.insert_alert(&sample_alert("chk-a", "A", Severity::Critical)).await?;

        let check = Check::new("B", "icmp", "10.0.0.2");
        fail(&alerter, &check, 1).await;

        let alert = store.get_active_alert(&check.id).await?.expect("alert stored");
        assert!(alert.suppressed);
        assert_eq!(alert.suppressed_by.as_deref(), Some("A"));

        let (topic, _) = next_alert_event(&mut rx).expect("suppressed event");
        assert_eq!(topic, TOPIC_ALERT_SUPPRESSED);
        Ok(())
    }

    #[tokio::test]
    async fn test_resolved_parent_does_not_suppress() -> Result<()> {
        let (store, alerter, _rx, _dir) = setup(1).await?;
        store.upsert_device(&Device::new("B", "host").with_parent("A")).await?;
        let parent = sample_alert("chk-a", "A", Severity::Critical);
        store.insert_alert(&parent).await?;
        store.resolve_alert(&parent.id, Utc::now()).await?;

        let check = Check::new("B", "icmp", "10.0.0.2");
        fail(&alerter, &check, 1).await;

        let alert = store.get_active_alert(&check.id).await?.expect("alert stored");
        assert!(!alert.suppressed);
        assert!(alert.suppressed_by.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_maintenance_takes_precedence() -> Result<()> {
        let (store, alerter, mut rx, _dir) = setup(1).await?;
        store.upsert_device(&Device::new("B", "host").with_parent("A")).await?;
        store.insert_alert(&sample_alert("chk-a", "A", Severity::Critical)).await?;

        let now = Utc::now();
        let window = MaintWindow::new(
            "firmware",
            now - Duration::minutes(10),
            now + Duration::minutes(50),
            Recurrence::Once,
            vec!["B".into()],
        );
        store.insert_window(&window).await?;

        let check = Check::new("B", "icmp", "10.0.0.2");
        fail(&alerter, &check, 1).await;

        let alert = store.get_active_alert(&check.id).await?.expect("alert stored");
        assert!(alert.suppressed);
        assert!(alert.suppressed_by.is_none());
        assert_eq!(next_alert_event(&mut rx).map(|(t, _)| t).as_deref(), Some(TOPIC_ALERT_SUPPRESSED));
        Ok(())
    }

    #[tokio::test]
    async fn test_dependency_suppression() -> Result<()> {
        let (store, alerter, _rx, _dir) = setup(1).await?;
        let check = Check::new("app", "tcp", "10.0.0.9:443");
        store.insert_check(&check).await?;
        store.add_dependency(&check.id, "db").await?;
        store.insert_alert(&sample_alert("chk-db", "db", Severity::Warning)).await?;

        fail(&alerter, &check, 1).await;
        let alert = store.get_active_alert(&check.id).await?.expect("alert stored");
        assert!(alert.suppressed);
        assert_eq!(alert.suppressed_by.as_deref(), Some("db"));
        Ok(())
    }

    #[tokio::test]
    async fn test_concurrent_results_keep_one_active_alert_per_check() -> Result<()> {
        let (store, alerter, _rx, _dir) = setup(2).await?;
        let alerter = Arc::new(alerter);
        let checks: Vec<Check> = (0..5).map(|i| Check::new(format!("dev-{i}"), "icmp", "10.0.0.1")).collect();

        let mut tasks = tokio::task::JoinSet::new();
        for round in 0..8 {
            for check in &checks {
                let alerter = alerter.clone();
                let check = check.clone();
                tasks.spawn(async move {
                    let result = if round == 5 {
                        CheckResult::success(&check, 1.0)
                    } else {
                        CheckResult::failure(&check, "timeout")
                    };
                    alerter.process_result(&check, &result).await;
                });
            }
        }
        while tasks.join_next().await.is_some() {}

        for check in &checks {
            let active = store
                .list_alerts(&AlertFilter { device_id: Some(check.device_id.clone()), active_only: true, ..Default::default() })
                .await?;
            assert!(active.len() <= 1, "check {} has {} active alerts", check.id, active.len());
        }
        Ok(())
    }
}
