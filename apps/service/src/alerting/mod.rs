//! Alert lifecycle: failure streaks, suppression and maintenance windows.

pub mod alerter;
pub mod correlation;
pub mod maintenance;

pub use alerter::Alerter;
pub use correlation::{CorrelatedGroup, Correlation, CorrelationEngine};
pub use maintenance::{MaintenanceEvaluator, in_window};
