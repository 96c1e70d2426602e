use deadpool::managed::{self, Pool, RecycleResult};
use libsql::{Connection, Database, Error as LibsqlError};

/// Milliseconds a connection waits on a locked database before failing
const BUSY_TIMEOUT_MS: u64 = 5_000;

pub struct LibsqlManager {
    database: Database,
}

impl LibsqlManager {
    pub fn new(database: Database) -> Self {
        Self { database }
    }
}

impl managed::Manager for LibsqlManager {
    type Type = Connection;
    type Error = LibsqlError;

    async fn create(&self) -> Result<Self::Type, Self::Error> {
        let conn = self.database.connect()?;
        // PRAGMAs report their new value as a row, so run them as queries
        conn.query(&format!("PRAGMA busy_timeout = {BUSY_TIMEOUT_MS}"), ()).await?;
        conn.query("PRAGMA journal_mode = WAL", ()).await?;
        conn.query("PRAGMA foreign_keys = ON", ()).await?;
        Ok(conn)
    }

    async fn recycle(
        &self,
        conn: &mut Self::Type,
        _: &managed::Metrics,
    ) -> RecycleResult<Self::Error> {
        conn.query("SELECT 1", ()).await?.next().await?;
        Ok(())
    }
}

pub type LibsqlPool = Pool<LibsqlManager>;

/// Open (or create) a local database file and wrap it in a pool
pub async fn open_pool(path: &str, max_size: usize) -> anyhow::Result<LibsqlPool> {
    let database = libsql::Builder::new_local(path).build().await?;
    let pool = Pool::builder(LibsqlManager::new(database)).max_size(max_size).build()?;
    Ok(pool)
}
