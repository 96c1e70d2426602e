use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Datelike, Timelike, Utc};

use crate::database::{MaintenanceRepository, Store};
use crate::database::models::Recurrence;

/// Whether `now` falls inside a window described by `start`/`end` and a
/// recurrence tag. Unknown tags never match.
pub fn in_window(now: DateTime<Utc>, start: DateTime<Utc>, end: DateTime<Utc>, recurrence: &str) -> bool {
    match Recurrence::parse(recurrence) {
        Some(Recurrence::Once) => start <= now && now <= end,
        Some(Recurrence::Daily) => time_of_day_in_range(now, start, end),
        Some(Recurrence::Weekly) => now.weekday() == start.weekday() && time_of_day_in_range(now, start, end),
        Some(Recurrence::Monthly) => now.day() == start.day() && time_of_day_in_range(now, start, end),
        None => false,
    }
}

/// Inclusive time-of-day range check; `start > end` wraps past midnight
fn time_of_day_in_range(now: DateTime<Utc>, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
    let t = now.num_seconds_from_midnight();
    let start = start.num_seconds_from_midnight();
    let end = end.num_seconds_from_midnight();

    if start <= end { t >= start && t <= end } else { t >= start || t <= end }
}

/// Answers whether a device is inside any enabled maintenance window
pub struct MaintenanceEvaluator {
    store: Arc<dyn Store>,
}

impl MaintenanceEvaluator {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn is_device_in_window(&self, now: DateTime<Utc>, device_id: &str) -> Result<bool> {
        let windows = self.store.list_enabled_windows().await?;
        Ok(windows
            .iter()
            .filter(|w| w.enabled && w.covers_device(device_id))
            .any(|w| in_window(now, w.start_time, w.end_time, &w.recurrence)))
    }
}
