use anyhow::{Context, Result};
use async_trait::async_trait;
use libsql::{Connection, params};
use std::path::Path;

use super::models::StoredCheck;
use crate::monitoring::types::CheckResult;
use crate::pool::{LibsqlManager, LibsqlPool};

const CHECK_COLUMNS: &str = "id, service, status, response_ms, error, checked_at_ms";

/// Database trait for abstracting check result storage
///
/// Shared by every service loop, so implementations must tolerate
/// concurrent use.
#[async_trait]
pub trait Database: Send + Sync {
    /// Save a check result, returning its row id
    async fn save_result(&self, result: &CheckResult) -> Result<i64>;

    /// Most recent result for a service, newest `checked_at` first
    async fn latest_result(&self, service: &str) -> Result<Option<StoredCheck>>;

    /// Most recent result of every service that has one, ordered by name
    async fn all_latest(&self) -> Result<Vec<StoredCheck>>;

    /// One page of a service's history, newest first, plus the total row count
    async fn service_history(&self, service: &str, limit: u32, offset: u32) -> Result<(Vec<StoredCheck>, u64)>;

    /// Percentage of up results among the last `last` checks, 0 without history
    async fn uptime_percent(&self, service: &str, last: u32) -> Result<f64>;
}

/// LibSQL database implementation
pub struct DatabaseImpl {
    pool: LibsqlPool,
}

impl DatabaseImpl {
    /// Create a new database instance from a pool
    pub fn new_from_pool(pool: LibsqlPool) -> Self {
        Self { pool }
    }

    /// Open (or create) the database file at `path` and bring its schema up to date
    pub async fn open(path: &Path) -> Result<Self> {
        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .with_context(|| format!("opening database at {}", path.display()))?;

        let pool: LibsqlPool = deadpool::managed::Pool::builder(LibsqlManager::new(db))
            .config(deadpool::managed::PoolConfig::default())
            .build()?;

        let conn = pool.get().await?;
        apply_pragma(&conn, "journal_mode = WAL").await?;
        apply_pragma(&conn, "synchronous = NORMAL").await?;
        super::initialize_database(&conn).await?;

        Ok(Self::new_from_pool(pool))
    }

    /// Get a connection from the pool
    async fn get_conn(&self) -> Result<deadpool::managed::Object<LibsqlManager>> {
        Ok(self.pool.get().await?)
    }

    async fn query_checks(&self, sql: &str, params: impl libsql::params::IntoParams) -> Result<Vec<StoredCheck>> {
        let conn = self.get_conn().await?;
        let mut rows = conn.query(sql, params).await?;

        let mut checks = Vec::new();
        while let Some(row) = rows.next().await? {
            checks.push(StoredCheck::from_row(&row)?);
        }

        Ok(checks)
    }
}

/// Pragmas that report their new value return a row, so they go through `query`.
async fn apply_pragma(conn: &Connection, pragma: &str) -> Result<()> {
    conn.query(&format!("PRAGMA {pragma}"), ())
        .await
        .with_context(|| format!("applying pragma {pragma:?}"))?
        .next()
        .await?;
    Ok(())
}

#[async_trait]
impl Database for DatabaseImpl {
    async fn save_result(&self, result: &CheckResult) -> Result<i64> {
        let conn = self.get_conn().await?;
        let response_ms = i64::try_from(result.response_time.as_millis()).unwrap_or(i64::MAX);

        conn.execute(
            "INSERT INTO checks (service, status, response_ms, error, checked_at_ms) VALUES (?, ?, ?, ?, ?)",
            params![
                result.service_name.clone(),
                result.status.as_str(),
                response_ms,
                result.error.clone(),
                result.checked_at.timestamp_millis()
            ],
        )
        .await
        .with_context(|| format!("inserting check for {:?}", result.service_name))?;

        Ok(conn.last_insert_rowid())
    }

    async fn latest_result(&self, service: &str) -> Result<Option<StoredCheck>> {
        let sql = format!(
            "SELECT {CHECK_COLUMNS} FROM checks WHERE service = ? ORDER BY checked_at_ms DESC, id DESC LIMIT 1"
        );
        let mut checks = self
            .query_checks(&sql, params![service.to_string()])
            .await
            .with_context(|| format!("querying latest check for {service:?}"))?;

        Ok(checks.pop())
    }

    async fn all_latest(&self) -> Result<Vec<StoredCheck>> {
        let sql = format!(
            "SELECT {CHECK_COLUMNS} FROM checks AS c
             WHERE c.id = (
                 SELECT id FROM checks WHERE service = c.service
                 ORDER BY checked_at_ms DESC, id DESC LIMIT 1
             )
             ORDER BY c.service"
        );
        self.query_checks(&sql, ()).await.context("querying latest checks")
    }

    async fn service_history(&self, service: &str, limit: u32, offset: u32) -> Result<(Vec<StoredCheck>, u64)> {
        let total = {
            let conn = self.get_conn().await?;
            let mut rows = conn
                .query("SELECT COUNT(*) FROM checks WHERE service = ?", params![service.to_string()])
                .await?;
            match rows.next().await? {
                Some(row) => row.get::<u64>(0)?,
                None => 0,
            }
        };

        let sql = format!(
            "SELECT {CHECK_COLUMNS} FROM checks WHERE service = ?
             ORDER BY checked_at_ms DESC, id DESC LIMIT ? OFFSET ?"
        );
        let checks = self
            .query_checks(&sql, params![service.to_string(), i64::from(limit), i64::from(offset)])
            .await
            .with_context(|| format!("querying history for {service:?}"))?;

        Ok((checks, total))
    }

    async fn uptime_percent(&self, service: &str, last: u32) -> Result<f64> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                "SELECT COUNT(*), COALESCE(SUM(CASE WHEN status = 'up' THEN 1 ELSE 0 END), 0)
                 FROM (
                     SELECT status FROM checks WHERE service = ?
                     ORDER BY checked_at_ms DESC, id DESC LIMIT ?
                 )",
                params![service.to_string(), i64::from(last)],
            )
            .await
            .with_context(|| format!("calculating uptime for {service:?}"))?;

        let Some(row) = rows.next().await? else {
            return Ok(0.0);
        };
        let total: i64 = row.get(0)?;
        let up: i64 = row.get(1)?;

        if total == 0 {
            return Ok(0.0);
        }
        Ok(up as f64 / total as f64 * 100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitoring::types::Status;
    use chrono::{DateTime, TimeZone, Utc};
    use std::time::Duration;
    use tempfile::TempDir;

    async fn open_temp() -> (DatabaseImpl, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = DatabaseImpl::open(&dir.path().join("checks.db")).await.unwrap();
        (db, dir)
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn up(service: &str, secs: i64) -> CheckResult {
        CheckResult::up(service, at(secs), Duration::from_millis(42))
    }

    fn down(service: &str, secs: i64) -> CheckResult {
        CheckResult::down(service, at(secs), Duration::from_millis(7), "connection refused")
    }

    #[tokio::test]
    async fn test_open_enables_wal_and_reopens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checks.db");

        let db = DatabaseImpl::open(&path).await.unwrap();
        db.save_result(&up("api", 0)).await.unwrap();

        let conn = db.get_conn().await.unwrap();
        let mut rows = conn.query("PRAGMA journal_mode", ()).await.unwrap();
        let mode: String = rows.next().await.unwrap().unwrap().get(0).unwrap();
        assert_eq!(mode.to_lowercase(), "wal");
        drop(rows);
        drop(conn);
        drop(db);

        let reopened = DatabaseImpl::open(&path).await.unwrap();
        assert_eq!(reopened.latest_result("api").await.unwrap().unwrap().status, Status::Up);
    }

    #[tokio::test]
    async fn test_save_and_latest() {
        let (db, _dir) = open_temp().await;

        assert!(db.latest_result("api").await.unwrap().is_none());

        let first = db.save_result(&up("api", 0)).await.unwrap();
        let second = db.save_result(&down("api", 10)).await.unwrap();
        assert!(second > first);

        let latest = db.latest_result("api").await.unwrap().unwrap();
        assert_eq!(latest.id, second);
        assert_eq!(latest.status, Status::Down);
        assert_eq!(latest.error, "connection refused");
        assert_eq!(latest.response_ms, 7);
        assert_eq!(latest.checked_at, at(10));
    }

    #[tokio::test]
    async fn test_latest_orders_by_checked_at() {
        let (db, _dir) = open_temp().await;

        // Inserted out of order; the later probe wins regardless of row id.
        db.save_result(&down("api", 20)).await.unwrap();
        db.save_result(&up("api", 5)).await.unwrap();

        let latest = db.latest_result("api").await.unwrap().unwrap();
        assert_eq!(latest.status, Status::Down);
    }

    #[tokio::test]
    async fn test_all_latest_one_row_per_service() {
        let (db, _dir) = open_temp().await;

        db.save_result(&up("web", 0)).await.unwrap();
        db.save_result(&down("web", 1)).await.unwrap();
        db.save_result(&up("api", 0)).await.unwrap();

        let latest = db.all_latest().await.unwrap();
        let summary: Vec<_> = latest.iter().map(|c| (c.service.as_str(), c.status)).collect();
        assert_eq!(summary, [("api", Status::Up), ("web", Status::Down)]);
    }

    #[tokio::test]
    async fn test_service_history_pages() {
        let (db, _dir) = open_temp().await;

        for secs in 0..5 {
            db.save_result(&up("api", secs)).await.unwrap();
        }
        db.save_result(&up("other", 0)).await.unwrap();

        let (page, total) = db.service_history("api", 2, 1).await.unwrap();
        assert_eq!(total, 5);
        let times: Vec<_> = page.iter().map(|c| c.checked_at).collect();
        assert_eq!(times, [at(3), at(2)]);

        let (page, total) = db.service_history("missing", 10, 0).await.unwrap();
        assert!(page.is_empty());
        assert_eq!(total, 0);
    }

    #[tokio::test]
    async fn test_uptime_percent_uses_last_n() {
        let (db, _dir) = open_temp().await;

        assert_eq!(db.uptime_percent("api", 100).await.unwrap(), 0.0);

        db.save_result(&down("api", 0)).await.unwrap();
        db.save_result(&down("api", 1)).await.unwrap();
        db.save_result(&up("api", 2)).await.unwrap();
        db.save_result(&up("api", 3)).await.unwrap();

        assert_eq!(db.uptime_percent("api", 100).await.unwrap(), 50.0);
        assert_eq!(db.uptime_percent("api", 2).await.unwrap(), 100.0);
    }

    #[tokio::test]
    async fn test_reopen_keeps_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checks.db");

        {
            let db = DatabaseImpl::open(&path).await.unwrap();
            db.save_result(&up("api", 0)).await.unwrap();
        }

        let db = DatabaseImpl::open(&path).await.unwrap();
        assert!(db.latest_result("api").await.unwrap().is_some());
    }
}
