use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

/// Health state reported by a check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Up,
    Down,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Up => "up",
            Status::Down => "down",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid status {0:?}")]
pub struct ParseStatusError(String);

impl FromStr for Status {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "up" => Ok(Status::Up),
            "down" => Ok(Status::Down),
            other => Err(ParseStatusError(other.to_string())),
        }
    }
}

/// Result of a single probe against one service
///
/// Built once by a checker and never mutated afterwards. `error` is empty
/// exactly when `status` is [`Status::Up`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    /// Name of the service that was checked
    pub service_name: String,

    /// Outcome of the check
    pub status: Status,

    /// Time spent on the probe, recorded on failure as well
    pub response_time: Duration,

    /// Human-readable failure reason
    pub error: String,

    /// When the probe started
    pub checked_at: DateTime<Utc>,
}

impl CheckResult {
    /// A successful probe
    pub fn up(service_name: impl Into<String>, checked_at: DateTime<Utc>, response_time: Duration) -> Self {
        Self {
            service_name: service_name.into(),
            status: Status::Up,
            response_time,
            error: String::new(),
            checked_at,
        }
    }

    /// A failed probe
    pub fn down(
        service_name: impl Into<String>,
        checked_at: DateTime<Utc>,
        response_time: Duration,
        error: impl Into<String>,
    ) -> Self {
        let mut error = error.into();
        if error.is_empty() {
            error = "check failed".to_string();
        }

        Self {
            service_name: service_name.into(),
            status: Status::Down,
            response_time,
            error,
            checked_at,
        }
    }

    pub fn is_up(&self) -> bool {
        self.status == Status::Up
    }

    /// Response time in whole milliseconds, saturating at `u64::MAX`
    pub fn response_ms(&self) -> u64 {
        u64::try_from(self.response_time.as_millis()).unwrap_or(u64::MAX)
    }
}
