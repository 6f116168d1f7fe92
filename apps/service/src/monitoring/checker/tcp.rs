use chrono::Utc;
use std::time::Instant;
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

use super::{Checker, bounded};
use crate::config::ServiceConfig;
use crate::monitoring::types::CheckResult;

/// TCP port checker
///
/// Up when a connection to `host:port` is accepted within the timeout. The
/// stream is dropped straight away.
pub struct TcpChecker {
    service: ServiceConfig,
}

impl TcpChecker {
    pub fn new(service: ServiceConfig) -> Self {
        Self { service }
    }
}

#[async_trait::async_trait]
impl Checker for TcpChecker {
    async fn check(&self, cancel: &CancellationToken) -> CheckResult {
        let checked_at = Utc::now();
        let start = Instant::now();
        let target = self.service.target.as_str();

        let outcome = bounded(cancel, self.service.timeout, TcpStream::connect(target)).await;
        let response_time = start.elapsed();

        let error = match outcome {
            Ok(Ok(_stream)) => return CheckResult::up(&self.service.name, checked_at, response_time),
            Ok(Err(e)) => e.to_string(),
            Err(interrupted) => interrupted.to_string(),
        };

        CheckResult::down(&self.service.name, checked_at, response_time, format!("dial tcp {target}: {error}"))
    }
}
