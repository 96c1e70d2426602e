use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use tracing::{debug, warn};

use super::{EventKind, build_notifier};
use crate::database::models::{Alert, Severity};
use crate::database::{ChannelRepository, Store};
use crate::events::{Event, EventPayload};

/// Fans alert events out to every enabled notification channel.
///
/// Channels are tried one after another; a failing channel is logged and
/// never stops delivery to the rest. There is no retry at this layer.
pub struct Dispatcher {
    store: Arc<dyn Store>,
    timeout: Duration,
}

impl Dispatcher {
    pub fn new(store: Arc<dyn Store>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    pub async fn handle_alert_event(&self, event: &Event) {
        let EventPayload::Alert(alert) = &event.payload else {
            warn!(topic = %event.topic, "unexpected payload type for alert event");
            return;
        };
        let kind = EventKind::from_topic(&event.topic);

        let channels = match self.store.list_enabled_channels().await {
            Ok(channels) => channels,
            Err(e) => {
                warn!(error = %e, "failed to load notification channels");
                return;
            }
        };

        for channel in &channels {
            let notifier = match build_notifier(channel, self.timeout) {
                Ok(Some(notifier)) => notifier,
                Ok(None) => {
                    debug!(channel_id = %channel.id, channel_type = %channel.channel_type, "skipping unsupported notifier type");
                    continue;
                }
                Err(e) => {
                    warn!(channel_id = %channel.id, channel_type = %channel.channel_type, error = %e, "failed to build notifier");
                    continue;
                }
            };

            match notifier.notify(alert, kind).await {
                Ok(()) => debug!(
                    channel_id = %channel.id,
                    channel_type = %channel.channel_type,
                    alert_id = %alert.id,
                    event_type = kind.as_str(),
                    "notification delivered"
                ),
                Err(e) => warn!(
                    channel_id = %channel.id,
                    channel_type = %channel.channel_type,
                    alert_id = %alert.id,
                    error = %e,
                    "notification delivery failed"
                ),
            }
        }
    }

    /// Deliver a synthetic alert to one channel, reporting any failure
    pub async fn send_test(&self, channel_id: &str) -> Result<()> {
        let channel = self
            .store
            .get_channel(channel_id)
            .await?
            .ok_or_else(|| anyhow!("notification channel {channel_id} not found"))?;

        let notifier = build_notifier(&channel, self.timeout)?
            .ok_or_else(|| anyhow!("channel type {} cannot deliver notifications", channel.channel_type))?;

        let alert = Alert {
            id: "test-notification".to_string(),
            check_id: "test".to_string(),
            device_id: "test".to_string(),
            severity: Severity::Warning,
            message: "Test notification".to_string(),
            triggered_at: Utc::now(),
            resolved_at: None,
            acknowledged_at: None,
            consecutive_failures: 0,
            suppressed: false,
            suppressed_by: None,
        };

        notifier
            .notify(&alert, EventKind::Triggered)
            .await
            .with_context(|| format!("send test notification via {}", channel.id))
    }
}
