use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::checker::ProbeSet;
use super::types::ProbeOutcome;
use crate::alerting::Alerter;
use crate::database::models::{Check, CheckResult};
use crate::database::{ResultRepository, Store, TopologyRepository};
use crate::events::{EventBus, MetricPoint};

/// Work the scheduler runs for every due check
#[async_trait]
pub trait CheckExecutor: Send + Sync {
    async fn execute(&self, check: Check, cancel: CancellationToken);
}

/// Probe, persist, track last-seen, feed the alerter and publish metrics.
/// A failing step is logged and the remaining steps still run.
pub struct MonitoringExecutor {
    probes: ProbeSet,
    store: Arc<dyn Store>,
    alerter: Arc<Alerter>,
    bus: EventBus,
}

impl MonitoringExecutor {
    pub fn new(probes: ProbeSet, store: Arc<dyn Store>, alerter: Arc<Alerter>, bus: EventBus) -> Self {
        Self { probes, store, alerter, bus }
    }

    async fn probe(&self, check: &Check, cancel: &CancellationToken) -> CheckResult {
        let outcome = match self.probes.get(&check.check_type) {
            Some(probe) => probe.check(cancel, &check.target).await,
            None => ProbeOutcome::down("unsupported check type"),
        };
        if let Some(error) = &outcome.error {
            debug!(check_id = %check.id, target = %check.target, error = %error, "probe failed");
        }
        outcome.into_result(check)
    }
}

/// Latency, loss and 0/1 success, named after the check type
pub fn metric_points(check: &Check, result: &CheckResult) -> Vec<MetricPoint> {
    let point = |suffix: &str, value: f64| MetricPoint {
        device_id: check.device_id.clone(),
        metric_name: format!("{}.{}", check.check_type, suffix),
        value,
        timestamp: result.checked_at,
    };
    vec![
        point("latency_ms", result.latency_ms),
        point("packet_loss", result.packet_loss),
        point("success", if result.success { 1.0 } else { 0.0 }),
    ]
}

#[async_trait]
impl CheckExecutor for MonitoringExecutor {
    async fn execute(&self, check: Check, cancel: CancellationToken) {
        let result = self.probe(&check, &cancel).await;

        if let Err(e) = self.store.insert_result(&result).await {
            warn!(check_id = %check.id, error = %e, "failed to store check result");
        }

        if result.success {
            if let Err(e) = self.store.touch_device(&check.device_id, Utc::now()).await {
                warn!(device_id = %check.device_id, error = %e, "failed to update device last seen");
            }
        }

        self.alerter.process_result(&check, &result).await;
        self.bus.publish_metrics(metric_points(&check, &result));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::Severity;
    use crate::database::AlertRepository;
    use crate::events::{EventPayload, TOPIC_METRICS_COLLECTED};
    use crate::monitoring::checker::{Probe, ProbeKind};
    use crate::test_support::create_test_store;
    use anyhow::Result;

    struct FixedProbe(ProbeOutcome);

    #[async_trait]
    impl Probe for FixedProbe {
        async fn check(&self, _cancel: &CancellationToken, _target: &str) -> ProbeOutcome {
            self.0.clone()
        }
    }

    #[test]
    fn test_metric_points_named_by_type() {
        let check = Check::new("dev-1", "tcp", "10.0.0.1:22");
        let result = CheckResult::success(&check, 7.5);
        let points = metric_points(&check, &result);

        let names: Vec<&str> = points.iter().map(|p| p.metric_name.as_str()).collect();
        assert_eq!(names, ["tcp.latency_ms", "tcp.packet_loss", "tcp.success"]);
        assert_eq!(points[0].value, 7.5);
        assert_eq!(points[2].value, 1.0);
        assert!(points.iter().all(|p| p.device_id == "dev-1"));
    }

    #[tokio::test]
    async fn test_execute_persists_alerts_and_publishes() -> Result<()> {
        let (store, _dir) = create_test_store().await?;
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        let alerter = Arc::new(Alerter::new(store.clone(), bus.clone(), 1));
        let probes = ProbeSet::default()
            .with(ProbeKind::Icmp, Arc::new(FixedProbe(ProbeOutcome::down("request timeout"))));
        let executor = MonitoringExecutor::new(probes, store.clone(), alerter, bus);

        let check = Check::new("dev-1", "icmp", "10.0.0.1");
        executor.execute(check.clone(), CancellationToken::new()).await;

        let results = store.list_results("dev-1", 0).await?;
        assert_eq!(results.len(), 1);
        assert!(!results[0].success);

        let alert = store.get_active_alert(&check.id).await?.expect("alert raised");
        assert_eq!(alert.severity, Severity::Warning);
        assert_eq!(alert.message, "request timeout");

        let mut saw_metrics = false;
        while let Ok(event) = rx.try_recv() {
            if event.topic == TOPIC_METRICS_COLLECTED {
                saw_metrics = matches!(event.payload, EventPayload::Metrics(ref p) if p.len() == 3);
            }
        }
        assert!(saw_metrics);
        Ok(())
    }

    #[tokio::test]
    async fn test_success_touches_device() -> Result<()> {
        let (store, _dir) = create_test_store().await?;
        let bus = EventBus::new();
        let alerter = Arc::new(Alerter::new(store.clone(), bus.clone(), 3));
        let probes = ProbeSet::default().with(ProbeKind::Tcp, Arc::new(FixedProbe(ProbeOutcome::up(2.0))));
        let executor = MonitoringExecutor::new(probes, store.clone(), alerter, bus);

        executor.execute(Check::new("dev-7", "tcp", "10.0.0.7:80"), CancellationToken::new()).await;

        let device = store.get_device("dev-7").await?.expect("device recorded");
        assert!(device.last_seen.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn test_unsupported_type_records_failure() -> Result<()> {
        let (store, _dir) = create_test_store().await?;
        let bus = EventBus::new();
        let alerter = Arc::new(Alerter::new(store.clone(), bus.clone(), 3));
        let executor = MonitoringExecutor::new(ProbeSet::default(), store.clone(), alerter, bus);

        executor.execute(Check::new("dev-1", "snmp", "10.0.0.1"), CancellationToken::new()).await;

        let results = store.list_results("dev-1", 0).await?;
        assert_eq!(results[0].error_message.as_deref(), Some("unsupported check type"));
        Ok(())
    }
}
