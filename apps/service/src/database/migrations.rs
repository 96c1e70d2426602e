use anyhow::Result;
use libsql::Connection;

/// Schema version - increment when making schema changes
const SCHEMA_VERSION: i64 = 4;

/// Run database migrations
///
/// The engine owns this schema; every start brings the database up to
/// `SCHEMA_VERSION` before any component touches it.
pub async fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL,
            description TEXT
        )",
        (),
    )
    .await?;

    let current_version = get_current_version(conn).await?;

    if current_version >= SCHEMA_VERSION {
        tracing::debug!(version = current_version, "database schema is up to date");
        return Ok(());
    }

    tracing::info!(from = current_version, to = SCHEMA_VERSION, "running migrations");

    if current_version < 1 {
        run_migration_v1(conn).await?;
        record_migration(conn, 1, "Create checks, results and alerts").await?;
    }

    if current_version < 2 {
        run_migration_v2(conn).await?;
        record_migration(conn, 2, "Add devices, dependencies and alert suppression").await?;
    }

    if current_version < 3 {
        run_migration_v3(conn).await?;
        record_migration(conn, 3, "Create notification channels").await?;
    }

    if current_version < 4 {
        run_migration_v4(conn).await?;
        record_migration(conn, 4, "Create maintenance windows").await?;
    }

    tracing::info!(version = SCHEMA_VERSION, "database migrations completed");
    Ok(())
}

/// Get current schema version from database
async fn get_current_version(conn: &Connection) -> Result<i64> {
    let mut rows = conn.query("SELECT MAX(version) FROM schema_migrations", ()).await?;

    if let Some(row) = rows.next().await? {
        let version: Option<i64> = row.get(0)?;
        Ok(version.unwrap_or(0))
    } else {
        Ok(0)
    }
}

/// Record that a migration was applied
async fn record_migration(conn: &Connection, version: i64, description: &str) -> Result<()> {
    let now = chrono::Utc::now().timestamp_millis();

    conn.execute(
        "INSERT INTO schema_migrations (version, applied_at, description) VALUES (?, ?, ?)",
        libsql::params![version, now, description],
    )
    .await?;

    tracing::info!(version, description, "applied migration");
    Ok(())
}

async fn execute_all(conn: &Connection, statements: &[&str]) -> Result<()> {
    for statement in statements {
        conn.execute(statement, ()).await?;
    }
    Ok(())
}

/// Migration v1: checks, check_results, alerts
async fn run_migration_v1(conn: &Connection) -> Result<()> {
    execute_all(
        conn,
        &[
            "CREATE TABLE IF NOT EXISTS checks (
                id TEXT PRIMARY KEY,
                device_id TEXT NOT NULL,
                check_type TEXT NOT NULL DEFAULT 'icmp',
                target TEXT NOT NULL,
                interval_seconds INTEGER NOT NULL DEFAULT 30,
                enabled INTEGER NOT NULL DEFAULT 1,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )",
            "CREATE INDEX IF NOT EXISTS idx_checks_device ON checks(device_id)",
            "CREATE TABLE IF NOT EXISTS check_results (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                check_id TEXT NOT NULL,
                device_id TEXT NOT NULL,
                success INTEGER NOT NULL,
                latency_ms REAL NOT NULL DEFAULT 0,
                packet_loss REAL NOT NULL DEFAULT 0,
                error_message TEXT,
                checked_at INTEGER NOT NULL
            )",
            "CREATE INDEX IF NOT EXISTS idx_results_device_time ON check_results(device_id, checked_at)",
            "CREATE INDEX IF NOT EXISTS idx_results_check_time ON check_results(check_id, checked_at)",
            "CREATE TABLE IF NOT EXISTS alerts (
                id TEXT PRIMARY KEY,
                check_id TEXT NOT NULL,
                device_id TEXT NOT NULL,
                severity TEXT NOT NULL DEFAULT 'warning',
                message TEXT NOT NULL,
                triggered_at INTEGER NOT NULL,
                resolved_at INTEGER,
                consecutive_failures INTEGER NOT NULL DEFAULT 0
            )",
            "CREATE INDEX IF NOT EXISTS idx_alerts_device ON alerts(device_id, resolved_at)",
            "CREATE INDEX IF NOT EXISTS idx_alerts_check ON alerts(check_id, resolved_at)",
        ],
    )
    .await
}

/// Migration v2: devices, check dependencies, alert acknowledgement and suppression
async fn run_migration_v2(conn: &Connection) -> Result<()> {
    execute_all(
        conn,
        &[
            "CREATE TABLE IF NOT EXISTS devices (
                id TEXT PRIMARY KEY,
                hostname TEXT NOT NULL DEFAULT '',
                parent_device_id TEXT,
                last_seen INTEGER
            )",
            "CREATE TABLE IF NOT EXISTS check_dependencies (
                check_id TEXT NOT NULL REFERENCES checks(id) ON DELETE CASCADE,
                device_id TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                PRIMARY KEY (check_id, device_id)
            )",
            "CREATE INDEX IF NOT EXISTS idx_dependencies_device ON check_dependencies(device_id)",
            "ALTER TABLE alerts ADD COLUMN acknowledged_at INTEGER",
            "ALTER TABLE alerts ADD COLUMN suppressed INTEGER NOT NULL DEFAULT 0",
            "ALTER TABLE alerts ADD COLUMN suppressed_by TEXT",
        ],
    )
    .await
}

/// Migration v3: notification channels
async fn run_migration_v3(conn: &Connection) -> Result<()> {
    execute_all(
        conn,
        &["CREATE TABLE IF NOT EXISTS notification_channels (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            type TEXT NOT NULL,
            config TEXT NOT NULL,
            enabled INTEGER NOT NULL DEFAULT 1,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )"],
    )
    .await
}

/// Migration v4: maintenance windows
async fn run_migration_v4(conn: &Connection) -> Result<()> {
    execute_all(
        conn,
        &["CREATE TABLE IF NOT EXISTS maint_windows (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            start_time INTEGER NOT NULL,
            end_time INTEGER NOT NULL,
            recurrence TEXT NOT NULL DEFAULT 'once',
            device_ids TEXT NOT NULL DEFAULT '[]',
            enabled INTEGER NOT NULL DEFAULT 1,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )"],
    )
    .await
}
