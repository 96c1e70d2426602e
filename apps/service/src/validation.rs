use std::net::IpAddr;

use thiserror::Error;
use url::Url;

use crate::database::models::{MaintWindow, Recurrence};

#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("target cannot be empty")]
    EmptyTarget,

    #[error("invalid {check_type} target '{target}': {reason}")]
    InvalidTarget { check_type: String, target: String, reason: String },

    #[error("unsupported check type: {0}")]
    UnknownCheckType(String),

    #[error("invalid recurrence: {0}")]
    InvalidRecurrence(String),

    #[error("invalid maintenance window: {0}")]
    InvalidWindow(&'static str),
}

fn invalid(check_type: &str, target: &str, reason: impl Into<String>) -> ValidationError {
    ValidationError::InvalidTarget {
        check_type: check_type.to_string(),
        target: target.to_string(),
        reason: reason.into(),
    }
}

/// Validate a check target for its check type
pub fn validate_target(check_type: &str, target: &str) -> Result<(), ValidationError> {
    if target.trim().is_empty() {
        return Err(ValidationError::EmptyTarget);
    }

    match check_type {
        "icmp" => validate_icmp_target(target),
        "tcp" => validate_tcp_target(target),
        "http" => validate_http_target(target),
        other => Err(ValidationError::UnknownCheckType(other.to_string())),
    }
}

/// IP address or a plausible hostname
fn validate_icmp_target(target: &str) -> Result<(), ValidationError> {
    if target.parse::<IpAddr>().is_ok() {
        return Ok(());
    }

    if target.contains(char::is_whitespace) {
        return Err(invalid("icmp", target, "hostname cannot contain spaces"));
    }
    if target.starts_with('-') || target.ends_with('-') {
        return Err(invalid("icmp", target, "hostname cannot start or end with hyphen"));
    }
    if !target.chars().all(|c| c.is_alphanumeric() || c == '.' || c == '-') {
        return Err(invalid("icmp", target, "use an IP address or hostname"));
    }
    Ok(())
}

/// `host:port`; IPv6 hosts must be bracketed
fn validate_tcp_target(target: &str) -> Result<(), ValidationError> {
    let Some((host, port)) = target.rsplit_once(':') else {
        return Err(invalid("tcp", target, "expected host:port"));
    };

    let host = host.trim_start_matches('[').trim_end_matches(']');
    if host.is_empty() {
        return Err(invalid("tcp", target, "missing host"));
    }

    match port.parse::<u16>() {
        Ok(0) => Err(invalid("tcp", target, "port must be between 1 and 65535")),
        Ok(_) => Ok(()),
        Err(_) => Err(invalid("tcp", target, "invalid port number")),
    }
}

fn validate_http_target(target: &str) -> Result<(), ValidationError> {
    let url = Url::parse(target).map_err(|e| {
        if target.contains("://") {
            invalid("http", target, format!("invalid URL: {e}"))
        } else {
            invalid("http", target, "URL must include scheme (http:// or https://)")
        }
    })?;

    match url.scheme() {
        "http" | "https" => {}
        other => return Err(invalid("http", target, format!("unsupported scheme '{other}'"))),
    }

    if url.host_str().is_none() {
        return Err(invalid("http", target, "URL must have a host"));
    }
    Ok(())
}

/// Validate a maintenance window before it is written
pub fn validate_window(window: &MaintWindow) -> Result<(), ValidationError> {
    if window.name.trim().is_empty() {
        return Err(ValidationError::InvalidWindow("name is required"));
    }
    if Recurrence::parse(&window.recurrence).is_none() {
        return Err(ValidationError::InvalidRecurrence(window.recurrence.clone()));
    }
    if window.end_time <= window.start_time {
        return Err(ValidationError::InvalidWindow("end_time must be after start_time"));
    }
    if window.device_ids.is_empty() {
        return Err(ValidationError::InvalidWindow("at least one device_id is required"));
    }
    Ok(())
}
