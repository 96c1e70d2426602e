use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Check model - a registered monitoring target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Check {
    pub id: String,
    pub device_id: String,
    /// Probe protocol tag (`icmp`, `tcp`, `http`)
    pub check_type: String,
    pub target: String,
    pub interval_seconds: u64,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Check {
    /// Create a new enabled check with a generated id
    pub fn new(device_id: impl Into<String>, check_type: impl Into<String>, target: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: format!("chk-{}", Uuid::new_v4()),
            device_id: device_id.into(),
            check_type: check_type.into(),
            target: target.into(),
            interval_seconds: 30,
            enabled: true,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }
}

/// Outcome of one probe execution, as persisted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    pub id: Option<i64>,
    pub check_id: String,
    pub device_id: String,
    pub success: bool,
    pub latency_ms: f64,
    /// Fraction in `[0, 1]`
    pub packet_loss: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub checked_at: DateTime<Utc>,
}

impl CheckResult {
    pub fn success(check: &Check, latency_ms: f64) -> Self {
        Self {
            id: None,
            check_id: check.id.clone(),
            device_id: check.device_id.clone(),
            success: true,
            latency_ms,
            packet_loss: 0.0,
            error_message: None,
            checked_at: Utc::now(),
        }
    }

    pub fn failure(check: &Check, error: impl Into<String>) -> Self {
        Self {
            id: None,
            check_id: check.id.clone(),
            device_id: check.device_id.clone(),
            success: false,
            latency_ms: 0.0,
            packet_loss: 1.0,
            error_message: Some(error.into()),
            checked_at: Utc::now(),
        }
    }
}

/// Alert severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "warning" => Ok(Severity::Warning),
            "critical" => Ok(Severity::Critical),
            other => Err(format!("unknown severity: {other}")),
        }
    }
}

/// A single instance of an ongoing (or past) problem for one check.
///
/// `resolved_at` being set is terminal. At most one alert per check is
/// unresolved at any time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub check_id: String,
    pub device_id: String,
    pub severity: Severity,
    pub message: String,
    pub triggered_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
    pub suppressed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suppressed_by: Option<String>,
}

impl Alert {
    pub fn is_active(&self) -> bool {
        self.resolved_at.is_none()
    }
}

/// Filters for listing alerts. Unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct AlertFilter {
    pub device_id: Option<String>,
    pub severity: Option<Severity>,
    pub active_only: bool,
    pub suppressed: Option<bool>,
    /// 0 means the default of 100
    pub limit: usize,
}

/// Device record used for topology lookups and last-seen tracking
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub id: String,
    pub hostname: String,
    pub parent_device_id: Option<String>,
    pub last_seen: Option<DateTime<Utc>>,
}

impl Device {
    pub fn new(id: impl Into<String>, hostname: impl Into<String>) -> Self {
        Self { id: id.into(), hostname: hostname.into(), parent_device_id: None, last_seen: None }
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent_device_id = Some(parent.into());
        self
    }
}

/// Directed edge: `check_id` depends on `device_id`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckDependency {
    pub check_id: String,
    pub device_id: String,
    pub created_at: DateTime<Utc>,
}

/// How a maintenance window repeats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Recurrence {
    Once,
    Daily,
    Weekly,
    Monthly,
}

impl Recurrence {
    /// Parse a recurrence tag; unknown tags yield `None`
    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "once" => Some(Recurrence::Once),
            "daily" => Some(Recurrence::Daily),
            "weekly" => Some(Recurrence::Weekly),
            "monthly" => Some(Recurrence::Monthly),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Recurrence::Once => "once",
            Recurrence::Daily => "daily",
            Recurrence::Weekly => "weekly",
            Recurrence::Monthly => "monthly",
        }
    }
}

/// Scheduled maintenance window suppressing alerts for its devices.
///
/// For anything but `once`, only the time-of-day of `start_time`/`end_time`
/// matters, plus the weekday (`weekly`) or day-of-month (`monthly`) of
/// `start_time`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaintWindow {
    pub id: String,
    pub name: String,
    pub description: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Raw tag as stored; see [`Recurrence::parse`]
    pub recurrence: String,
    pub device_ids: Vec<String>,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MaintWindow {
    pub fn new(
        name: impl Into<String>,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        recurrence: Recurrence,
        device_ids: Vec<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            description: String::new(),
            start_time,
            end_time,
            recurrence: recurrence.as_str().to_string(),
            device_ids,
            enabled: true,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn covers_device(&self, device_id: &str) -> bool {
        self.device_ids.iter().any(|d| d == device_id)
    }
}

/// Configured notification delivery channel. `config` is an opaque JSON
/// blob interpreted by the notifier matching `channel_type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationChannel {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub channel_type: String,
    pub config: String,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl NotificationChannel {
    pub fn new(name: impl Into<String>, channel_type: impl Into<String>, config: impl Into<String>) -> Self {
        let now = Utc::now();
        let channel_type = channel_type.into();
        Self {
            id: format!("notif-{}-{}", channel_type, Uuid::new_v4()),
            name: name.into(),
            channel_type,
            config: config.into(),
            enabled: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// Config with `secret`/`password` values replaced by `****`, for display
    pub fn masked_config(&self) -> String {
        let Ok(Value::Object(mut raw)) = serde_json::from_str::<Value>(&self.config) else {
            return self.config.clone();
        };
        for key in ["secret", "password"] {
            if let Some(Value::String(v)) = raw.get_mut(key) {
                if !v.is_empty() {
                    *v = "****".to_string();
                }
            }
        }
        serde_json::to_string(&raw).unwrap_or_else(|_| self.config.clone())
    }
}

/// Convert a timestamp to the persisted epoch-millisecond form
pub fn to_millis(time: DateTime<Utc>) -> i64 {
    time.timestamp_millis()
}

/// Convert persisted epoch milliseconds back to a timestamp
pub fn from_millis(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or_default()
}
