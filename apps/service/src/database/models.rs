use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::monitoring::types::Status;

/// A persisted check result
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredCheck {
    pub id: i64,
    pub service: String,
    pub status: Status,
    pub response_ms: i64,
    pub error: String,
    pub checked_at: DateTime<Utc>,
}

impl StoredCheck {
    pub(crate) fn from_row(row: &libsql::Row) -> Result<Self> {
        let status: String = row.get(2)?;
        let checked_at_ms: i64 = row.get(5)?;

        Ok(Self {
            id: row.get(0)?,
            service: row.get(1)?,
            status: status.parse()?,
            response_ms: row.get(3)?,
            error: row.get(4)?,
            checked_at: millis_to_timestamp(checked_at_ms)?,
        })
    }
}

pub(crate) fn millis_to_timestamp(millis: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis).ok_or_else(|| anyhow!("checked_at out of range: {millis}"))
}
