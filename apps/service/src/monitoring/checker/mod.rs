//! Probe strategies.
//!
//! Every checker resolves to a [`CheckResult`]: failures of any kind come
//! back as a down result carrying the reason, never as an `Err`.

pub mod container;
pub mod http;
pub mod ping;
pub mod tcp;

use std::error::Error as StdError;
use std::future::Future;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::types::CheckResult;
use crate::config::ServiceConfig;

pub use container::{ContainerChecker, ContainerError, ContainerRuntime, ContainerState, DockerSocketClient};
pub use http::HttpChecker;
pub use ping::{CommandError, CommandExecutor, CommandOutput, OsCommandExecutor, PingChecker};
pub use tcp::TcpChecker;

/// Type of monitoring check to perform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckType {
    Http,
    Tcp,
    Ping,
    Container,
}

impl FromStr for CheckType {
    type Err = CheckerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "http" => Ok(CheckType::Http),
            "tcp" => Ok(CheckType::Tcp),
            "ping" => Ok(CheckType::Ping),
            "container" | "docker" => Ok(CheckType::Container),
            other => Err(CheckerError::UnknownType(other.to_string())),
        }
    }
}

impl std::fmt::Display for CheckType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CheckType::Http => write!(f, "http"),
            CheckType::Tcp => write!(f, "tcp"),
            CheckType::Ping => write!(f, "ping"),
            CheckType::Container => write!(f, "container"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CheckerError {
    #[error("unknown checker type {0:?}")]
    UnknownType(String),
    #[error("building HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

/// Checker trait for different types of monitoring checks
#[async_trait::async_trait]
pub trait Checker: Send + Sync {
    /// Probe the service once.
    ///
    /// Returns within the service timeout, or promptly after `cancel` fires.
    async fn check(&self, cancel: &CancellationToken) -> CheckResult;
}

/// Builds the checker for a service descriptor
pub trait CheckerFactory: Send + Sync {
    fn create(&self, service: &ServiceConfig) -> Result<Arc<dyn Checker>, CheckerError>;
}

impl<F> CheckerFactory for F
where
    F: Fn(&ServiceConfig) -> Result<Arc<dyn Checker>, CheckerError> + Send + Sync,
{
    fn create(&self, service: &ServiceConfig) -> Result<Arc<dyn Checker>, CheckerError> {
        self(service)
    }
}

/// Factory backed by the real network, process and container-runtime checkers
#[derive(Debug, Clone)]
pub struct DefaultCheckerFactory {
    container_socket: PathBuf,
}

impl DefaultCheckerFactory {
    pub fn new(container_socket: impl Into<PathBuf>) -> Self {
        Self { container_socket: container_socket.into() }
    }
}

impl CheckerFactory for DefaultCheckerFactory {
    fn create(&self, service: &ServiceConfig) -> Result<Arc<dyn Checker>, CheckerError> {
        let checker: Arc<dyn Checker> = match service.check_type.parse::<CheckType>()? {
            CheckType::Http => Arc::new(HttpChecker::new(service.clone())?),
            CheckType::Tcp => Arc::new(TcpChecker::new(service.clone())),
            CheckType::Ping => Arc::new(PingChecker::new(service.clone())),
            CheckType::Container => Arc::new(ContainerChecker::new(
                service.clone(),
                DockerSocketClient::new(self.container_socket.clone()),
            )),
        };

        Ok(checker)
    }
}

/// Why a bounded probe step did not finish
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Interrupted {
    #[error("timed out after {0:?}")]
    TimedOut(Duration),
    #[error("check cancelled")]
    Cancelled,
}

/// Race a probe step against its timeout and the shutdown signal.
///
/// The step future is dropped when either fires, which aborts in-flight
/// sockets and kills child processes spawned with `kill_on_drop`.
pub(crate) async fn bounded<F>(
    cancel: &CancellationToken,
    limit: Duration,
    step: F,
) -> Result<F::Output, Interrupted>
where
    F: Future,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Interrupted::Cancelled),
        outcome = tokio::time::timeout(limit, step) => outcome.map_err(|_| Interrupted::TimedOut(limit)),
    }
}

/// Render an error with its source chain, `outer: inner: root`
pub(crate) fn describe(error: &(dyn StdError + 'static)) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        let cause_message = cause.to_string();
        if !message.contains(&cause_message) {
            message.push_str(": ");
            message.push_str(&cause_message);
        }
        source = cause.source();
    }
    message
}
