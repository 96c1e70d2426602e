//! In-process event bus.
//!
//! Alert lifecycle and metric events fan out to every subscriber over a
//! broadcast channel; slow subscribers lag and drop old events rather
//! than block publishers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

use crate::database::models::Alert;

pub const TOPIC_ALERT_TRIGGERED: &str = "pulse.alert.triggered";
pub const TOPIC_ALERT_RESOLVED: &str = "pulse.alert.resolved";
pub const TOPIC_ALERT_SUPPRESSED: &str = "pulse.alert.suppressed";
pub const TOPIC_METRICS_COLLECTED: &str = "pulse.metrics.collected";
pub const TOPIC_DEVICE_DISCOVERED: &str = "recon.device.discovered";

/// Name this engine publishes under
pub const SOURCE: &str = "pulse";

const BUS_CAPACITY: usize = 256;

/// One metric sample derived from a probe outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricPoint {
    pub device_id: String,
    pub metric_name: String,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}

/// Device announced by a discovery component
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveredDevice {
    pub id: String,
    #[serde(default)]
    pub hostname: String,
    /// Address an `icmp` check can target
    pub ip_address: String,
    #[serde(default)]
    pub parent_device_id: Option<String>,
}

#[derive(Debug, Clone)]
pub enum EventPayload {
    Alert(Alert),
    Metrics(Vec<MetricPoint>),
    DeviceDiscovered(DiscoveredDevice),
}

#[derive(Debug, Clone)]
pub struct Event {
    pub topic: String,
    pub source: String,
    pub timestamp: DateTime<Utc>,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(topic: &str, payload: EventPayload) -> Self {
        Self { topic: topic.to_string(), source: SOURCE.to_string(), timestamp: Utc::now(), payload }
    }
}

#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(BUS_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: Event) {
        debug!(topic = %event.topic, "publishing event");
        // No receivers is fine
        let _ = self.tx.send(event);
    }

    pub fn publish_alert(&self, topic: &str, alert: Alert) {
        self.publish(Event::new(topic, EventPayload::Alert(alert)));
    }

    pub fn publish_metrics(&self, points: Vec<MetricPoint>) {
        self.publish(Event::new(TOPIC_METRICS_COLLECTED, EventPayload::Metrics(points)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_reaches_every_subscriber() {
        let bus = EventBus::new();
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();

        bus.publish_metrics(vec![MetricPoint {
            device_id: "d1".into(),
            metric_name: "icmp.latency_ms".into(),
            value: 1.5,
            timestamp: Utc::now(),
        }]);

        for rx in [&mut a, &mut b] {
            let event = rx.recv().await.unwrap();
            assert_eq!(event.topic, TOPIC_METRICS_COLLECTED);
            assert_eq!(event.source, SOURCE);
            assert!(matches!(event.payload, EventPayload::Metrics(ref p) if p.len() == 1));
        }
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = EventBus::new();
        bus.publish_metrics(Vec::new());
    }
}
