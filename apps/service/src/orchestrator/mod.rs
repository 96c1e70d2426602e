/// Orchestrator module - coordinates all components
///
/// The engine owns the lifecycle of:
/// - The monitoring scheduler and its executor
/// - The alerter, wired to correlation and maintenance suppression
/// - The notification dispatcher, fed from alert events on the bus
/// - The retention job
/// - Device discovery, which provisions a default `icmp` check
pub mod retention;

pub use retention::{CleanupReport, RetentionCleanup, RetentionPolicy};

use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{Context, Result};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::alerting::{Alerter, CorrelationEngine, MaintenanceEvaluator};
use crate::config::Config;
use crate::database::models::{Check, Device};
use crate::database::{CheckRepository, Store, TopologyRepository};
use crate::events::{
    DiscoveredDevice, Event, EventBus, EventPayload, TOPIC_ALERT_RESOLVED, TOPIC_ALERT_TRIGGERED,
    TOPIC_DEVICE_DISCOVERED,
};
use crate::monitoring::{MonitoringExecutor, MonitoringScheduler, ProbeSet};
use crate::notifications::Dispatcher;

struct Running {
    cancel: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

/// Wires every component together over one store and one event bus
pub struct Engine {
    store: Arc<dyn Store>,
    bus: EventBus,
    alerter: Arc<Alerter>,
    dispatcher: Arc<Dispatcher>,
    scheduler: MonitoringScheduler,
    retention: RetentionPolicy,
    tasks: Mutex<Option<Running>>,
}

impl Engine {
    pub fn new(config: &Config, store: Arc<dyn Store>) -> Result<Self> {
        let pulse = &config.pulse;
        let bus = EventBus::new();

        let probes = ProbeSet::standard(pulse.ping_timeout(), pulse.ping_count).context("build probes")?;
        let alerter = Arc::new(
            Alerter::new(store.clone(), bus.clone(), pulse.consecutive_failures)
                .with_correlation(CorrelationEngine::new(store.clone(), pulse.correlation_window()))
                .with_maintenance(MaintenanceEvaluator::new(store.clone())),
        );
        let executor = Arc::new(MonitoringExecutor::new(probes, store.clone(), alerter.clone(), bus.clone()));
        let scheduler =
            MonitoringScheduler::new(store.clone(), executor, pulse.check_interval(), pulse.max_workers);
        let dispatcher = Arc::new(Dispatcher::new(store.clone(), config.notifications.timeout()));
        let retention = RetentionPolicy { retention: pulse.retention(), interval: pulse.maintenance_interval() };

        Ok(Self { store, bus, alerter, dispatcher, scheduler, retention, tasks: Mutex::new(None) })
    }

    /// Start the scheduler, the retention job and the event listener.
    /// Cancelling `parent` stops everything; `stop` also waits for it.
    pub fn start(&self, parent: &CancellationToken) {
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        if tasks.is_some() {
            return;
        }

        let cancel = parent.child_token();
        self.scheduler.start(&cancel);

        let retention = RetentionCleanup::new(self.store.clone(), self.retention.clone());
        let listener = EventListener {
            store: self.store.clone(),
            dispatcher: self.dispatcher.clone(),
        };
        let handles = vec![
            retention.start_periodic_cleanup(cancel.clone()),
            listener.spawn(self.bus.subscribe(), cancel.clone()),
        ];

        info!("engine started");
        *tasks = Some(Running { cancel, handles });
    }

    /// Cancel every task and wait for in-flight work to finish
    pub async fn stop(&self) {
        let tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner).take();
        let Some(Running { cancel, handles }) = tasks else {
            return;
        };

        cancel.cancel();
        self.scheduler.stop().await;
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "engine task ended abnormally");
            }
        }
        info!("engine stopped");
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn alerter(&self) -> &Arc<Alerter> {
        &self.alerter
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn scheduler(&self) -> &MonitoringScheduler {
        &self.scheduler
    }
}

struct EventListener {
    store: Arc<dyn Store>,
    dispatcher: Arc<Dispatcher>,
}

impl EventListener {
    fn spawn(self, mut events: tokio::sync::broadcast::Receiver<Event>, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = cancel.cancelled() => break,
                    received = events.recv() => match received {
                        Ok(event) => event,
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(skipped, "event listener lagged, events dropped");
                            continue;
                        }
                        Err(RecvError::Closed) => break,
                    },
                };
                self.handle(&event).await;
            }
            debug!("event listener stopped");
        })
    }

    async fn handle(&self, event: &Event) {
        match (event.topic.as_str(), &event.payload) {
            (TOPIC_ALERT_TRIGGERED | TOPIC_ALERT_RESOLVED, _) => self.dispatcher.handle_alert_event(event).await,
            (TOPIC_DEVICE_DISCOVERED, EventPayload::DeviceDiscovered(device)) => {
                if let Err(e) = self.provision(device).await {
                    warn!(device_id = %device.id, error = %e, "failed to provision discovered device");
                }
            }
            _ => {}
        }
    }

    /// Record the device and give it a default `icmp` check when it has none
    async fn provision(&self, discovered: &DiscoveredDevice) -> Result<()> {
        let device = Device {
            id: discovered.id.clone(),
            hostname: discovered.hostname.clone(),
            parent_device_id: discovered.parent_device_id.clone(),
            last_seen: None,
        };
        self.store.upsert_device(&device).await?;

        if self.store.get_check_by_device(&device.id).await?.is_some() {
            debug!(device_id = %device.id, "device already has a check");
            return Ok(());
        }

        let check = Check::new(&device.id, "icmp", &discovered.ip_address);
        self.store.insert_check(&check).await?;
        info!(device_id = %device.id, check_id = %check.id, target = %check.target, "provisioned check for discovered device");
        Ok(())
    }
}
