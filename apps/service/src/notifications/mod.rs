//! Outbound alert notifications.
//!
//! Each enabled channel gets a [`Notifier`] built from its type tag and
//! JSON config. Types without a delivery implementation build nothing
//! and are skipped by the dispatcher.

pub mod alertmanager;
pub mod dispatcher;
pub mod signing;
pub mod webhook;

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::database::models::{Alert, NotificationChannel};

pub use alertmanager::AlertmanagerNotifier;
pub use dispatcher::Dispatcher;
pub use webhook::WebhookNotifier;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("invalid {channel_type} config: {reason}")]
    InvalidConfig { channel_type: String, reason: String },

    #[error("serialize {kind} payload: {source}")]
    Serialize {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid {kind} header {name}")]
    InvalidHeader { kind: &'static str, name: String },

    #[error("build http client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("sign {kind} payload: invalid key")]
    Signing { kind: &'static str },

    #[error("{kind} POST {url}: {source}")]
    Transport {
        kind: &'static str,
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{kind} POST {url}: status {status}")]
    Status { kind: &'static str, url: String, status: u16 },
}

/// Which alert transition a notification reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Triggered,
    Resolved,
}

impl EventKind {
    /// `*.resolved` topics are resolutions, everything else a trigger
    pub fn from_topic(topic: &str) -> Self {
        if topic.ends_with(".resolved") { EventKind::Resolved } else { EventKind::Triggered }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Triggered => "triggered",
            EventKind::Resolved => "resolved",
        }
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, alert: &Alert, kind: EventKind) -> Result<(), NotifyError>;

    /// Channel type tag this notifier serves
    fn kind(&self) -> &'static str;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebhookConfig {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlertmanagerConfig {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
}

fn parse_config<T: for<'de> Deserialize<'de>>(channel: &NotificationChannel) -> Result<T, NotifyError> {
    serde_json::from_str(&channel.config).map_err(|e| NotifyError::InvalidConfig {
        channel_type: channel.channel_type.clone(),
        reason: e.to_string(),
    })
}

fn require_url(channel: &NotificationChannel, url: &str) -> Result<(), NotifyError> {
    if url.trim().is_empty() {
        return Err(NotifyError::InvalidConfig {
            channel_type: channel.channel_type.clone(),
            reason: "url is required".to_string(),
        });
    }
    Ok(())
}

/// Build the notifier for a channel. `Ok(None)` means the type has no
/// delivery implementation (`email`, unknown tags) and should be skipped.
pub fn build_notifier(
    channel: &NotificationChannel,
    timeout: Duration,
) -> Result<Option<Box<dyn Notifier>>, NotifyError> {
    match channel.channel_type.as_str() {
        "webhook" => {
            let config: WebhookConfig = parse_config(channel)?;
            require_url(channel, &config.url)?;
            Ok(Some(Box::new(WebhookNotifier::new(config, timeout)?)))
        }
        "alertmanager" => {
            let config: AlertmanagerConfig = parse_config(channel)?;
            require_url(channel, &config.url)?;
            Ok(Some(Box::new(AlertmanagerNotifier::new(config, timeout)?)))
        }
        _ => Ok(None),
    }
}

/// POST a JSON body, signing it when a secret is set. Configured headers
/// replace defaults of the same name. Any non-2xx status is a failure.
pub(crate) async fn post_json(
    client: &reqwest::Client,
    kind: &'static str,
    user_agent: &'static str,
    url: &str,
    body: Vec<u8>,
    secret: Option<&str>,
    headers: &HashMap<String, String>,
) -> Result<(), NotifyError> {
    let mut header_map = HeaderMap::new();
    header_map.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    header_map.insert(USER_AGENT, HeaderValue::from_static(user_agent));

    if let Some(secret) = secret.filter(|s| !s.is_empty()) {
        let signature = signing::sign(secret.as_bytes(), &body).ok_or(NotifyError::Signing { kind })?;
        let invalid = || NotifyError::InvalidHeader { kind, name: signing::SIGNATURE_HEADER.to_string() };
        let name = HeaderName::from_bytes(signing::SIGNATURE_HEADER.as_bytes()).map_err(|_| invalid())?;
        let value = HeaderValue::from_str(&signature).map_err(|_| invalid())?;
        header_map.insert(name, value);
    }

    for (name, value) in headers {
        let invalid = || NotifyError::InvalidHeader { kind, name: name.clone() };
        let name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| invalid())?;
        let value = HeaderValue::from_str(value).map_err(|_| invalid())?;
        header_map.insert(name, value);
    }

    let response = client
        .post(url)
        .headers(header_map)
        .body(body)
        .send()
        .await
        .map_err(|source| NotifyError::Transport { kind, url: url.to_string(), source })?;

    let status = response.status();
    if !status.is_success() {
        return Err(NotifyError::Status { kind, url: url.to_string(), status: status.as_u16() });
    }
    Ok(())
}

pub(crate) fn http_client(timeout: Duration) -> Result<reqwest::Client, NotifyError> {
    reqwest::Client::builder().timeout(timeout).build().map_err(NotifyError::Client)
}
