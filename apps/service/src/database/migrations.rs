use anyhow::Result;
use chrono::Utc;
use libsql::Connection;

/// Schema version - increment when making schema changes
const SCHEMA_VERSION: i32 = 1;

/// Run database migrations
///
/// Safe to call on every startup; already applied versions are skipped.
pub async fn run_migrations(conn: &Connection) -> Result<()> {
    // Create schema_migrations table first (tracks applied migrations)
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
        tracing::debug!(version = current_version, "Database schema is up to date");
        return Ok(());
    }

    tracing::info!(from = current_version, to = SCHEMA_VERSION, "Running database migrations");

    if current_version < 1 {
        run_migration_v1(conn).await?;
        record_migration(conn, 1, "Create checks table").await?;
    }

    Ok(())
}

/// Get current schema version from database
async fn get_current_version(conn: &Connection) -> Result<i32> {
    let mut rows = conn
        .query("SELECT MAX(version) FROM schema_migrations", ())
        .await?;

    if let Some(row) = rows.next().await? {
        let version: Option<i32> = row.get(0)?;
        Ok(version.unwrap_or(0))
    } else {
        Ok(0)
    }
}

/// Record that a migration was applied
async fn record_migration(conn: &Connection, version: i32, description: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO schema_migrations (version, applied_at, description) VALUES (?, ?, ?)",
        libsql::params![version, Utc::now().timestamp(), description.to_string()],
    )
    .await?;

    tracing::info!(version, description, "Applied migration");
    Ok(())
}

/// Migration v1: one row per probe
async fn run_migration_v1(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS checks (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            service TEXT NOT NULL,
            status TEXT NOT NULL CHECK (status IN ('up', 'down')),
            response_ms INTEGER NOT NULL,
            error TEXT NOT NULL DEFAULT '',
            checked_at_ms INTEGER NOT NULL
        )",
        (),
    )
    .await?;

    conn.execute("CREATE INDEX IF NOT EXISTS idx_checks_service ON checks(service)", ()).await?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_checks_service_checked ON checks(service, checked_at_ms DESC)",
        (),
    )
    .await?;

    Ok(())
}
