use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Serialize, Serializer};

use crate::monitoring::types::{CheckResult, Status};

/// Value of the `source` field on every notification
pub const ALERT_SOURCE: &str = "servprobe";

/// Body of a state-change notification
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertPayload {
    pub service: String,
    pub status: Status,
    pub previous_status: Status,
    pub error: String,
    pub response_time_ms: u64,
    #[serde(serialize_with = "rfc3339_seconds")]
    pub checked_at: DateTime<Utc>,
    pub source: &'static str,
}

impl AlertPayload {
    pub fn new(result: &CheckResult, previous_status: Status) -> Self {
        Self {
            service: result.service_name.clone(),
            status: result.status,
            previous_status,
            error: result.error.clone(),
            response_time_ms: result.response_ms(),
            checked_at: result.checked_at,
            source: ALERT_SOURCE,
        }
    }
}

fn rfc3339_seconds<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&value.to_rfc3339_opts(SecondsFormat::Secs, true))
}
