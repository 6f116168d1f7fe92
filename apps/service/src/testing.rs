//! In-memory fakes shared by unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Result, bail};
use async_trait::async_trait;
use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::alert::{AlertPayload, NotificationSender, SenderError};
use crate::database::{Database, StoredCheck};
use crate::monitoring::checker::Checker;
use crate::monitoring::types::{CheckResult, Status};

/// Check store backed by a vector, with switchable failures
#[derive(Default)]
pub struct MemoryDatabase {
    rows: Mutex<Vec<StoredCheck>>,
    pub fail_reads: AtomicBool,
    pub fail_writes: AtomicBool,
}

impl MemoryDatabase {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn rows(&self) -> Vec<StoredCheck> {
        self.rows.lock().unwrap().clone()
    }

    pub fn count(&self, service: &str) -> usize {
        self.rows.lock().unwrap().iter().filter(|c| c.service == service).count()
    }

    fn newest(rows: &[StoredCheck], service: &str) -> Option<StoredCheck> {
        rows.iter()
            .filter(|c| c.service == service)
            .max_by_key(|c| (c.checked_at, c.id))
            .cloned()
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    async fn save_result(&self, result: &CheckResult) -> Result<i64> {
        if self.fail_writes.load(Ordering::SeqCst) {
            bail!("disk I/O error");
        }
        let mut rows = self.rows.lock().unwrap();
        let id = rows.len() as i64 + 1;
        rows.push(StoredCheck {
            id,
            service: result.service_name.clone(),
            status: result.status,
            response_ms: result.response_time.as_millis() as i64,
            error: result.error.clone(),
            checked_at: result.checked_at,
        });
        Ok(id)
    }

    async fn latest_result(&self, service: &str) -> Result<Option<StoredCheck>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            bail!("database is locked");
        }
        Ok(Self::newest(&self.rows.lock().unwrap(), service))
    }

    async fn all_latest(&self) -> Result<Vec<StoredCheck>> {
        let rows = self.rows.lock().unwrap();
        let mut services: Vec<&str> = rows.iter().map(|c| c.service.as_str()).collect();
        services.sort_unstable();
        services.dedup();
        Ok(services.into_iter().filter_map(|s| Self::newest(&rows, s)).collect())
    }

    async fn service_history(&self, service: &str, limit: u32, offset: u32) -> Result<(Vec<StoredCheck>, u64)> {
        let mut checks: Vec<_> = self.rows.lock().unwrap().iter().filter(|c| c.service == service).cloned().collect();
        checks.sort_by_key(|c| std::cmp::Reverse((c.checked_at, c.id)));
        let total = checks.len() as u64;
        let page = checks.into_iter().skip(offset as usize).take(limit as usize).collect();
        Ok((page, total))
    }

    async fn uptime_percent(&self, service: &str, last: u32) -> Result<f64> {
        let (checks, _) = self.service_history(service, last, 0).await?;
        if checks.is_empty() {
            return Ok(0.0);
        }
        let up = checks.iter().filter(|c| c.status == Status::Up).count();
        Ok(up as f64 / checks.len() as f64 * 100.0)
    }
}

/// Checker that plays back a script of statuses, repeating the last one
pub struct ScriptedChecker {
    name: String,
    script: Mutex<VecDeque<Status>>,
    last: Mutex<Status>,
    calls: AtomicUsize,
}

impl ScriptedChecker {
    pub fn new(name: &str, script: &[Status]) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            script: Mutex::new(script.iter().copied().collect()),
            last: Mutex::new(script.last().copied().unwrap_or(Status::Up)),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn always(name: &str, status: Status) -> Arc<Self> {
        Self::new(name, &[status])
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Checker for ScriptedChecker {
    async fn check(&self, _cancel: &CancellationToken) -> CheckResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let status = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(*self.last.lock().unwrap());

        match status {
            Status::Up => CheckResult::up(&self.name, Utc::now(), Duration::from_millis(1)),
            Status::Down => CheckResult::down(&self.name, Utc::now(), Duration::from_millis(1), "scripted failure"),
        }
    }
}

/// Checker that only returns once cancelled
pub struct BlockingChecker {
    name: String,
    pub started: AtomicBool,
}

impl BlockingChecker {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            started: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl Checker for BlockingChecker {
    async fn check(&self, cancel: &CancellationToken) -> CheckResult {
        self.started.store(true, Ordering::SeqCst);
        cancel.cancelled().await;
        CheckResult::down(&self.name, Utc::now(), Duration::ZERO, "check cancelled")
    }
}

/// Notification sink that records every payload it is handed
pub struct RecordingSender {
    sent: Mutex<Vec<AlertPayload>>,
    fail: bool,
}

impl RecordingSender {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
            fail: false,
        })
    }

    /// Records payloads but reports every delivery as rejected
    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
            fail: true,
        })
    }

    pub fn sent(&self) -> Vec<AlertPayload> {
        self.sent.lock().unwrap().clone()
    }

    /// Wait until at least `count` payloads arrived, panicking after a second
    pub async fn wait_for(&self, count: usize) -> Vec<AlertPayload> {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
        loop {
            let sent = self.sent();
            if sent.len() >= count {
                return sent;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "expected {count} notifications, got {}",
                sent.len()
            );
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    /// Give detached sends time to run, then check the count did not move
    pub async fn assert_count_stays(&self, count: usize) {
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(self.sent().len(), count);
    }

    pub async fn assert_quiet(&self) {
        self.assert_count_stays(0).await;
    }
}

#[async_trait]
impl NotificationSender for RecordingSender {
    async fn send(&self, payload: &AlertPayload) -> Result<(), SenderError> {
        self.sent.lock().unwrap().push(payload.clone());
        if self.fail {
            return Err(SenderError::Rejected {
                status: 503,
                body: "unavailable".to_string(),
            });
        }
        Ok(())
    }
}
