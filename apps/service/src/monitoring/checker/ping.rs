use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, LazyLock};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use regex::Regex;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use super::{Checker, bounded};
use crate::config::ServiceConfig;
use crate::monitoring::types::CheckResult;

static RTT_REGEX: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"time=(\d+\.?\d*)\s*ms"));

/// Captured output of a finished command
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{status}: {stderr}")]
    Failed { status: ExitStatus, stderr: String },
}

/// Runs an external program to completion
///
/// Implementations must stop the child when the returned future is dropped.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput, CommandError>;
}

/// Executor backed by real OS processes
#[derive(Debug, Default, Clone, Copy)]
pub struct OsCommandExecutor;

#[async_trait]
impl CommandExecutor for OsCommandExecutor {
    async fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput, CommandError> {
        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| CommandError::Spawn {
                program: program.to_string(),
                source,
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

        if !output.status.success() {
            return Err(CommandError::Failed {
                status: output.status,
                stderr,
            });
        }

        Ok(CommandOutput { stdout, stderr })
    }
}

/// ICMP echo checker using the system `ping` binary
///
/// Sends one echo request. On success the reported response time is the
/// round trip parsed from the command output, not the process wall time.
pub struct PingChecker {
    service: ServiceConfig,
    executor: Arc<dyn CommandExecutor>,
}

impl PingChecker {
    pub fn new(service: ServiceConfig) -> Self {
        Self::with_executor(service, Arc::new(OsCommandExecutor))
    }

    pub fn with_executor(service: ServiceConfig, executor: Arc<dyn CommandExecutor>) -> Self {
        Self { service, executor }
    }
}

#[async_trait]
impl Checker for PingChecker {
    async fn check(&self, cancel: &CancellationToken) -> CheckResult {
        let checked_at = Utc::now();
        let start = Instant::now();
        let name = self.service.name.as_str();
        let args = ping_args(&self.service.target, self.service.timeout, cfg!(target_os = "macos"));

        let outcome = bounded(cancel, self.service.timeout, self.executor.run("ping", &args)).await;

        let output = match outcome {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                let error = format!("ping {}: {e}", self.service.target);
                return CheckResult::down(name, checked_at, start.elapsed(), error);
            }
            Err(interrupted) => {
                let error = format!("ping {}: {interrupted}", self.service.target);
                return CheckResult::down(name, checked_at, start.elapsed(), error);
            }
        };

        match parse_rtt(&output.stdout) {
            Some(rtt) => CheckResult::up(name, checked_at, rtt),
            None => CheckResult::down(name, checked_at, start.elapsed(), "could not parse RTT from ping output"),
        }
    }
}

/// Arguments for a single echo request bounded by `timeout`.
///
/// The per-reply wait is given in whole seconds, rounded up, at least one.
/// macOS spells it `-t`, everything else `-W`.
fn ping_args(target: &str, timeout: Duration, macos: bool) -> Vec<String> {
    let secs = timeout.as_secs() + u64::from(timeout.subsec_nanos() > 0);
    let secs = secs.max(1).to_string();
    let wait_flag = if macos { "-t" } else { "-W" };

    vec![
        "-c".to_string(),
        "1".to_string(),
        wait_flag.to_string(),
        secs,
        target.to_string(),
    ]
}

fn parse_rtt(output: &str) -> Option<Duration> {
    let regex = RTT_REGEX.as_ref().ok()?;
    let millis: f64 = regex.captures(output)?.get(1)?.as_str().parse().ok()?;
    Duration::try_from_secs_f64(millis / 1000.0).ok()
}
