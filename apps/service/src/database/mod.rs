//! Check store: persistence for checks, results, alerts, topology,
//! maintenance windows and notification channels.

pub mod alerts;
pub mod channels;
pub mod checks;
pub mod maintenance;
pub mod migrations;
pub mod models;
pub mod repository;
pub mod results;
pub mod topology;

pub use alerts::AlertRepository;
pub use channels::ChannelRepository;
pub use checks::CheckRepository;
pub use maintenance::MaintenanceRepository;
pub use repository::{LibsqlStore, Store};
pub use results::ResultRepository;
pub use topology::TopologyRepository;

use anyhow::{Context, Result};

use crate::pool::open_pool;

/// Initialize database with schema
pub async fn initialize_database(conn: &libsql::Connection) -> Result<()> {
    migrations::run_migrations(conn).await
}

/// Open the database file, bring its schema up to date and wrap it in a store
pub async fn open_store(path: &str, max_connections: usize) -> Result<LibsqlStore> {
    let pool = open_pool(path, max_connections).await.with_context(|| format!("open database {path}"))?;
    {
        let conn = pool.get().await.context("acquire database connection")?;
        initialize_database(&conn).await.context("run migrations")?;
    }
    tracing::info!(path, "database ready");
    Ok(LibsqlStore::new_from_pool(pool))
}
