use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use super::{AlertmanagerConfig, EventKind, Notifier, NotifyError, http_client, post_json};
use crate::database::models::Alert;

const USER_AGENT: &str = "Pulse-Alertmanager/0.1";
const ALERT_NAME: &str = "PulseAlert";
const SOURCE: &str = "pulse";
/// `endsAt` of an alert that is still firing
const ZERO_TIME: &str = "0001-01-01T00:00:00Z";

/// Prometheus Alertmanager webhook receiver body
#[derive(Debug, Serialize)]
struct AlertmanagerPayload {
    version: &'static str,
    status: &'static str,
    alerts: Vec<AlertmanagerAlert>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AlertmanagerAlert {
    status: &'static str,
    labels: BTreeMap<&'static str, String>,
    annotations: BTreeMap<&'static str, String>,
    starts_at: String,
    ends_at: String,
    #[serde(rename = "generatorURL")]
    generator_url: String,
}

fn rfc3339(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

fn payload(alert: &Alert, kind: EventKind) -> AlertmanagerPayload {
    let status = match kind {
        EventKind::Resolved => "resolved",
        EventKind::Triggered => "firing",
    };

    let labels = BTreeMap::from([
        ("alertname", ALERT_NAME.to_string()),
        ("device_id", alert.device_id.clone()),
        ("check_id", alert.check_id.clone()),
        ("severity", alert.severity.to_string()),
        ("source", SOURCE.to_string()),
    ]);

    AlertmanagerPayload {
        version: "4",
        status,
        alerts: vec![AlertmanagerAlert {
            status,
            labels,
            annotations: BTreeMap::from([("summary", alert.message.clone())]),
            starts_at: rfc3339(alert.triggered_at),
            ends_at: alert.resolved_at.map(rfc3339).unwrap_or_else(|| ZERO_TIME.to_string()),
            generator_url: String::new(),
        }],
    }
}

/// Delivers alerts in Alertmanager webhook format
pub struct AlertmanagerNotifier {
    client: reqwest::Client,
    config: AlertmanagerConfig,
}

impl AlertmanagerNotifier {
    pub fn new(config: AlertmanagerConfig, timeout: Duration) -> Result<Self, NotifyError> {
        Ok(Self { client: http_client(timeout)?, config })
    }
}

#[async_trait]
impl Notifier for AlertmanagerNotifier {
    async fn notify(&self, alert: &Alert, kind: EventKind) -> Result<(), NotifyError> {
        let body = serde_json::to_vec(&payload(alert, kind))
            .map_err(|source| NotifyError::Serialize { kind: "alertmanager", source })?;

        post_json(
            &self.client,
            "alertmanager",
            USER_AGENT,
            &self.config.url,
            body,
            self.config.secret.as_deref(),
            &HashMap::new(),
        )
        .await
    }

    fn kind(&self) -> &'static str {
        "alertmanager"
    }
}
