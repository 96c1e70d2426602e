/// Monitoring engine module - probes targets on a schedule
///
/// This module is responsible for:
/// - Probing ICMP/TCP/HTTP targets
/// - Running enabled checks with bounded concurrency
/// - Turning probe outcomes into results, alerts and metrics
pub mod checker;
pub mod executor;
pub mod scheduler;
pub mod types;

pub use checker::{Probe, ProbeKind, ProbeSet};
pub use executor::{CheckExecutor, MonitoringExecutor};
pub use scheduler::MonitoringScheduler;
pub use types::ProbeOutcome;
