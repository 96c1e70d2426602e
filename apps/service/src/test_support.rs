use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use tempfile::TempDir;
use uuid::Uuid;

use crate::database::models::{Alert, Severity};
use crate::database::{LibsqlStore, open_store};

/// Fresh migrated store in a temporary directory. Keep the `TempDir`
/// alive for as long as the store is used.
pub async fn create_test_store() -> Result<(Arc<LibsqlStore>, TempDir)> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("test.db");
    let store = open_store(&path.to_string_lossy(), 4).await?;
    Ok((Arc::new(store), dir))
}

/// Unresolved, unsuppressed alert triggered now
pub fn sample_alert(check_id: &str, device_id: &str, severity: Severity) -> Alert {
    Alert {
        id: Uuid::new_v4().to_string(),
        check_id: check_id.to_string(),
        device_id: device_id.to_string(),
        severity,
        message: format!("check {check_id} failed"),
        triggered_at: Utc::now(),
        resolved_at: None,
        acknowledged_at: None,
        consecutive_failures: 3,
        suppressed: false,
        suppressed_by: None,
    }
}
