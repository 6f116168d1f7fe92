use std::collections::HashMap;
use std::io::Write;
use std::time::Duration;

use anyhow::Result;
use chrono::{SecondsFormat, Utc};
use futures::future::join_all;
use tokio_util::sync::CancellationToken;

use crate::config::ServiceConfig;
use crate::database::{Database, StoredCheck};
use crate::monitoring::{CheckResult, CheckerFactory};

/// Window used for the uptime column
const UPTIME_WINDOW: u32 = 100;

/// Probe every service once, concurrently, in configuration order
pub async fn check_once(services: &[ServiceConfig], factory: &dyn CheckerFactory) -> Vec<CheckResult> {
    let cancel = CancellationToken::new();
    join_all(services.iter().map(|service| {
        let cancel = &cancel;
        async move {
            match factory.create(service) {
                Ok(checker) => checker.check(cancel).await,
                Err(e) => CheckResult::down(&service.name, Utc::now(), Duration::ZERO, format!("creating checker: {e}")),
            }
        }
    }))
    .await
}

pub fn write_check_table(out: &mut impl Write, services: &[ServiceConfig], results: &[CheckResult]) -> Result<()> {
    let rows = services
        .iter()
        .zip(results)
        .map(|(service, result)| {
            vec![
                service.name.clone(),
                service.check_type.clone(),
                result.status.to_string(),
                format_millis(result.response_time.as_millis()),
                result.error.clone(),
            ]
        })
        .collect::<Vec<_>>();

    write_table(out, &["SERVICE", "TYPE", "STATUS", "RESPONSE", "ERROR"], &rows)
}

pub async fn write_status(out: &mut impl Write, database: &dyn Database, services: &[ServiceConfig]) -> Result<()> {
    let latest: HashMap<String, StoredCheck> = database
        .all_latest()
        .await?
        .into_iter()
        .map(|check| (check.service.clone(), check))
        .collect();

    let mut rows = Vec::with_capacity(services.len());
    for service in services {
        let row = match latest.get(&service.name) {
            Some(check) => {
                let uptime = database.uptime_percent(&service.name, UPTIME_WINDOW).await?;
                vec![
                    service.name.clone(),
                    check.status.to_string(),
                    format_millis(check.response_ms),
                    format!("{uptime:.1}%"),
                    check.checked_at.to_rfc3339_opts(SecondsFormat::Secs, true),
                ]
            }
            None => vec![
                service.name.clone(),
                "unknown".to_string(),
                "-".to_string(),
                "-".to_string(),
                "never".to_string(),
            ],
        };
        rows.push(row);
    }

    write_table(out, &["SERVICE", "STATUS", "RESPONSE", "UPTIME", "LAST CHECKED"], &rows)?;

    if latest.is_empty() {
        writeln!(out, "\nNo check history yet. Run `servprobe serve` to start monitoring.")?;
    }
    Ok(())
}

pub async fn write_history(
    out: &mut impl Write,
    database: &dyn Database,
    service: &str,
    limit: u32,
    offset: u32,
) -> Result<()> {
    let (checks, total) = database.service_history(service, limit, offset).await?;

    if total == 0 {
        writeln!(out, "No history for service {service:?}.")?;
        return Ok(());
    }

    let rows = checks
        .iter()
        .map(|check| {
            vec![
                check.checked_at.to_rfc3339_opts(SecondsFormat::Secs, true),
                check.status.to_string(),
                format_millis(check.response_ms),
                check.error.clone(),
            ]
        })
        .collect::<Vec<_>>();

    write_table(out, &["CHECKED AT", "STATUS", "RESPONSE", "ERROR"], &rows)?;

    let first = u64::from(offset) + 1;
    let last = u64::from(offset) + checks.len() as u64;
    if checks.is_empty() {
        writeln!(out, "\nNo rows past offset {offset} ({total} total).")?;
    } else {
        writeln!(out, "\nShowing {first}-{last} of {total}.")?;
    }
    Ok(())
}

fn format_millis(millis: impl std::fmt::Display) -> String {
    format!("{millis}ms")
}

/// Left-aligned columns separated by two spaces; the last column is not padded
fn write_table(out: &mut impl Write, headers: &[&str], rows: &[Vec<String>]) -> Result<()> {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let header_cells: Vec<String> = headers.iter().map(|h| h.to_string()).collect();
    for cells in std::iter::once(&header_cells).chain(rows) {
        let mut line = String::new();
        for (i, (cell, width)) in cells.iter().zip(&widths).enumerate() {
            if i + 1 == cells.len() {
                line.push_str(cell);
            } else {
                line.push_str(&format!("{cell:<width$}  "));
            }
        }
        writeln!(out, "{}", line.trim_end())?;
    }

    Ok(())
}
