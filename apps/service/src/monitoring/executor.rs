use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::checker::Checker;
use super::types::{CheckResult, Status};
use crate::database::Database;

/// Observer invoked once per completed probe with the result and the
/// status stored before it, if any
pub type ResultCallback = Arc<dyn Fn(&CheckResult, Option<Status>) + Send + Sync>;

/// Monitoring executor - runs one probe and records its outcome
pub struct MonitoringExecutor {
    database: Arc<dyn Database>,
    on_result: Option<ResultCallback>,
}

impl MonitoringExecutor {
    pub fn new(database: Arc<dyn Database>, on_result: Option<ResultCallback>) -> Self {
        Self { database, on_result }
    }

    /// Execute a monitoring check
    ///
    /// Returns `None` when the probe was cut short by `cancel`; such a
    /// result is neither stored nor reported.
    pub async fn execute_check(
        &self,
        service_name: &str,
        checker: &dyn Checker,
        cancel: &CancellationToken,
    ) -> Option<CheckResult> {
        let previous_status = match self.database.latest_result(service_name).await {
            Ok(previous) => previous.map(|check| check.status),
            Err(e) => {
                warn!(service = service_name, error = %e, "Failed to read previous result");
                None
            }
        };

        let result = checker.check(cancel).await;
        if cancel.is_cancelled() {
            return None;
        }

        if result.is_up() {
            info!(
                service = service_name,
                status = %result.status,
                response_ms = result.response_ms(),
                "Check completed"
            );
        } else {
            info!(
                service = service_name,
                status = %result.status,
                response_ms = result.response_ms(),
                error = %result.error,
                "Check completed"
            );
        }

        if let Err(e) = self.database.save_result(&result).await {
            error!(service = service_name, error = %e, "Failed to save check result");
        }

        if let Some(on_result) = &self.on_result {
            on_result(&result, previous_status);
        }

        Some(result)
    }
}
