//! Pulse network monitoring core: scheduled probes, alert state tracking
//! with topology and maintenance suppression, and alert notifications.

pub mod alerting;
pub mod config;
pub mod database;
pub mod events;
pub mod monitoring;
pub mod notifications;
pub mod orchestrator;
pub mod pool;
pub mod validation;

#[cfg(test)]
mod test_support;

pub use config::Config;
pub use orchestrator::Engine;
