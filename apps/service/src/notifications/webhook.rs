use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{EventKind, Notifier, NotifyError, WebhookConfig, http_client, post_json};
use crate::database::models::Alert;

const USER_AGENT: &str = "Pulse-Webhook/0.1";

#[derive(Serialize)]
struct WebhookPayload<'a> {
    event_type: EventKind,
    alert: &'a Alert,
    timestamp: DateTime<Utc>,
}

/// Generic JSON webhook: `{event_type, alert, timestamp}`
pub struct WebhookNotifier {
    client: reqwest::Client,
    config: WebhookConfig,
}

impl WebhookNotifier {
    pub fn new(config: WebhookConfig, timeout: Duration) -> Result<Self, NotifyError> {
        Ok(Self { client: http_client(timeout)?, config })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, alert: &Alert, kind: EventKind) -> Result<(), NotifyError> {
        let payload = WebhookPayload { event_type: kind, alert, timestamp: Utc::now() };
        let body = serde_json::to_vec(&payload)
            .map_err(|source| NotifyError::Serialize { kind: "webhook", source })?;

        post_json(
            &self.client,
            "webhook",
            USER_AGENT,
            &self.config.url,
            body,
            self.config.secret.as_deref(),
            &self.config.headers,
        )
        .await
    }

    fn kind(&self) -> &'static str {
        "webhook"
    }
}
