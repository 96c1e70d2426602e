use serde::{Deserialize, Serialize};

use crate::database::models::{Check, CheckResult};

/// What a probe observed. Probes never fail outright; an unreachable
/// target is an outcome with `success == false` and an error message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeOutcome {
    pub success: bool,
    pub latency_ms: f64,
    /// Fraction in `[0, 1]`
    pub packet_loss: f64,
    pub error: Option<String>,
}

impl ProbeOutcome {
    pub fn up(latency_ms: f64) -> Self {
        Self { success: true, latency_ms, packet_loss: 0.0, error: None }
    }

    /// Failed probe with full loss
    pub fn down(error: impl Into<String>) -> Self {
        Self { success: false, latency_ms: 0.0, packet_loss: 1.0, error: Some(error.into()) }
    }

    /// Failed probe that still measured how long it took to fail
    pub fn down_after(latency_ms: f64, error: impl Into<String>) -> Self {
        Self { latency_ms, ..Self::down(error) }
    }

    pub fn into_result(self, check: &Check) -> CheckResult {
        let mut result = if self.success {
            CheckResult::success(check, self.latency_ms)
        } else {
            CheckResult::failure(check, self.error.unwrap_or_else(|| "check failed".to_string()))
        };
        result.latency_ms = self.latency_ms;
        result.packet_loss = self.packet_loss;
        result
    }
}
