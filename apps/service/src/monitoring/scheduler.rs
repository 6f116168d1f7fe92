use std::sync::Arc;

use futures::future::join_all;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::checker::{Checker, CheckerFactory};
use super::executor::{MonitoringExecutor, ResultCallback};
use super::types::{CheckResult, Status};
use crate::config::ServiceConfig;
use crate::database::Database;

/// Monitoring scheduler - runs one long-lived probe loop per service
pub struct MonitoringScheduler {
    services: Vec<ServiceConfig>,
    database: Arc<dyn Database>,
    factory: Arc<dyn CheckerFactory>,
    on_result: Option<ResultCallback>,
    task_handles: Vec<JoinHandle<()>>,
}

impl MonitoringScheduler {
    pub fn new(
        services: Vec<ServiceConfig>,
        database: Arc<dyn Database>,
        factory: Arc<dyn CheckerFactory>,
    ) -> Self {
        Self {
            services,
            database,
            factory,
            on_result: None,
            task_handles: Vec::new(),
        }
    }

    /// Register the observer invoked after every completed probe.
    ///
    /// Only loops started afterwards see it.
    pub fn set_on_result<F>(&mut self, on_result: F)
    where
        F: Fn(&CheckResult, Option<Status>) + Send + Sync + 'static,
    {
        self.on_result = Some(Arc::new(on_result));
    }

    /// Spawn one loop per service and return immediately.
    ///
    /// Services whose checker cannot be built are logged and skipped.
    /// Returns the number of loops started.
    pub fn start(&mut self, cancel: CancellationToken) -> usize {
        let executor = Arc::new(MonitoringExecutor::new(self.database.clone(), self.on_result.clone()));
        let mut started = 0;

        for service in &self.services {
            let checker = match self.factory.create(service) {
                Ok(checker) => checker,
                Err(e) => {
                    error!(service = %service.name, check_type = %service.check_type, error = %e, "Failed to create checker, skipping service");
                    continue;
                }
            };

            info!(
                service = %service.name,
                check_type = %service.check_type,
                target = %service.target,
                interval = ?service.interval,
                "Starting service monitor"
            );

            let handle = tokio::spawn(run_service(service.clone(), checker, executor.clone(), cancel.clone()));
            self.task_handles.push(handle);
            started += 1;
        }

        started
    }

    /// Wait for every loop started so far to exit
    pub async fn wait(&mut self) {
        for outcome in join_all(self.task_handles.drain(..)).await {
            if let Err(e) = outcome {
                error!(error = %e, "Service monitor task failed");
            }
        }
    }
}

/// Probe immediately, then once per interval until cancelled
async fn run_service(
    service: ServiceConfig,
    checker: Arc<dyn Checker>,
    executor: Arc<MonitoringExecutor>,
    cancel: CancellationToken,
) {
    if executor.execute_check(&service.name, checker.as_ref(), &cancel).await.is_none() {
        debug!(service = %service.name, "Service monitor stopped");
        return;
    }

    // The first tick is one interval out; the immediate probe above covers t=0.
    let mut timer = interval_at(Instant::now() + service.interval, service.interval);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = timer.tick() => {
                if executor.execute_check(&service.name, checker.as_ref(), &cancel).await.is_none() {
                    break;
                }
            }
        }
    }

    debug!(service = %service.name, "Service monitor stopped");
}
