use anyhow::{Context, Result};
use deadpool::managed::Object;

use super::alerts::AlertRepository;
use super::channels::ChannelRepository;
use super::checks::CheckRepository;
use super::maintenance::MaintenanceRepository;
use super::results::ResultRepository;
use super::topology::TopologyRepository;
use crate::pool::{LibsqlManager, LibsqlPool};

/// Everything the engine needs from persistence.
///
/// Components hold an `Arc<dyn Store>`; the store provides its own
/// concurrency safety, the engine adds no locking around these calls.
pub trait Store:
    CheckRepository
    + ResultRepository
    + AlertRepository
    + TopologyRepository
    + MaintenanceRepository
    + ChannelRepository
    + Send
    + Sync
{
}

impl<T> Store for T where
    T: CheckRepository
        + ResultRepository
        + AlertRepository
        + TopologyRepository
        + MaintenanceRepository
        + ChannelRepository
        + Send
        + Sync
{
}

/// LibSQL database implementation
pub struct LibsqlStore {
    pool: LibsqlPool,
}

impl LibsqlStore {
    /// Create a new store from a pool
    pub fn new_from_pool(pool: LibsqlPool) -> Self {
        Self { pool }
    }

    /// Get a connection from the pool
    pub(crate) async fn conn(&self) -> Result<Object<LibsqlManager>> {
        self.pool.get().await.context("acquire database connection")
    }
}

pub(crate) fn bool_to_int(value: bool) -> i64 {
    if value { 1 } else { 0 }
}
