use std::collections::HashMap;

use actix_web::{HttpResponse, get, web};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use servprobe::config::ServiceConfig;
use servprobe::database::StoredCheck;
use tracing::{error, warn};

use super::AppState;
use crate::error::{ApiError, Envelope};

macros_utils::routes! {
    route list_services,
    route get_service,
    route service_history,
}

/// Checks considered for `uptime_percent`
const UPTIME_WINDOW: u32 = 100;
/// Recent checks embedded in the single-service view
const RECENT_CHECKS: u32 = 10;
const DEFAULT_HISTORY_LIMIT: u32 = 50;
const MAX_HISTORY_LIMIT: u32 = 1000;

#[derive(Debug, Serialize)]
struct ServiceDetail {
    name: String,
    #[serde(rename = "type")]
    check_type: String,
    target: String,
    interval: String,
    status: String,
    response_ms: i64,
    uptime_percent: f64,
    last_checked: Option<DateTime<Utc>>,
}

impl ServiceDetail {
    fn new(service: &ServiceConfig, latest: Option<&StoredCheck>, uptime_percent: f64) -> Self {
        Self {
            name: service.name.clone(),
            check_type: service.check_type.clone(),
            target: service.target.clone(),
            interval: humantime::format_duration(service.interval).to_string(),
            status: latest.map_or_else(|| "unknown".to_string(), |check| check.status.to_string()),
            response_ms: latest.map_or(0, |check| check.response_ms),
            uptime_percent,
            last_checked: latest.map(|check| check.checked_at),
        }
    }
}

#[derive(Debug, Serialize)]
struct ServiceDetailResponse {
    #[serde(flatten)]
    detail: ServiceDetail,
    recent_checks: Vec<StoredCheck>,
}

#[derive(Debug, Serialize)]
struct HistoryResponse {
    checks: Vec<StoredCheck>,
    total: u64,
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    limit: Option<String>,
    offset: Option<String>,
}

fn internal(context: &str, service: Option<&str>, e: anyhow::Error) -> ApiError {
    error!(service, error = format!("{e:#}"), "{context} failed");
    ApiError::Internal(e)
}

/// Uptime is decoration; a failed lookup renders as zero.
async fn uptime(state: &AppState, service: &str) -> f64 {
    match state.store.uptime_percent(service, UPTIME_WINDOW).await {
        Ok(percent) => percent,
        Err(e) => {
            warn!(service, error = format!("{e:#}"), "Failed to compute uptime");
            0.0
        }
    }
}

fn parse_param(raw: Option<&str>, name: &'static str, default: u32) -> Result<u32, ApiError> {
    match raw.filter(|value| !value.is_empty()) {
        None => Ok(default),
        Some(value) => {
            let parsed: i64 = value.parse().map_err(|_| ApiError::InvalidParameter(name))?;
            if parsed < 0 {
                return Err(ApiError::InvalidParameter(name));
            }
            Ok(u32::try_from(parsed).unwrap_or(u32::MAX))
        }
    }
}

/// Every configured service with its latest status, in configuration order
#[get("/services")]
pub async fn list_services(state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let latest: HashMap<String, StoredCheck> = state
        .store
        .all_latest()
        .await
        .map_err(|e| internal("Listing latest checks", None, e))?
        .into_iter()
        .map(|check| (check.service.clone(), check))
        .collect();

    let mut details = Vec::with_capacity(state.services.len());
    for service in &state.services {
        let detail = match latest.get(&service.name) {
            Some(check) => ServiceDetail::new(service, Some(check), uptime(&state, &service.name).await),
            None => ServiceDetail::new(service, None, 0.0),
        };
        details.push(detail);
    }

    Ok(HttpResponse::Ok().json(Envelope::data(details)))
}

#[get("/services/{name}")]
pub async fn get_service(state: web::Data<AppState>, name: web::Path<String>) -> Result<HttpResponse, ApiError> {
    let name = name.into_inner();
    let service = state.service(&name).ok_or(ApiError::ServiceNotFound)?;

    let latest = state
        .store
        .latest_result(&name)
        .await
        .map_err(|e| internal("Loading latest check", Some(&name), e))?;
    let (recent_checks, _) = state
        .store
        .service_history(&name, RECENT_CHECKS, 0)
        .await
        .map_err(|e| internal("Loading service history", Some(&name), e))?;

    let detail = ServiceDetail::new(service, latest.as_ref(), uptime(&state, &name).await);

    Ok(HttpResponse::Ok().json(Envelope::data(ServiceDetailResponse { detail, recent_checks })))
}

#[get("/services/{name}/history")]
pub async fn service_history(
    state: web::Data<AppState>,
    name: web::Path<String>,
    query: web::Query<HistoryQuery>,
) -> Result<HttpResponse, ApiError> {
    let name = name.into_inner();
    if state.service(&name).is_none() {
        return Err(ApiError::ServiceNotFound);
    }

    let limit = parse_param(query.limit.as_deref(), "limit", DEFAULT_HISTORY_LIMIT)?.min(MAX_HISTORY_LIMIT);
    let offset = parse_param(query.offset.as_deref(), "offset", 0)?;

    let (checks, total) = state
        .store
        .service_history(&name, limit, offset)
        .await
        .map_err(|e| internal("Loading service history", Some(&name), e))?;

    Ok(HttpResponse::Ok().json(Envelope::data(HistoryResponse { checks, total })))
}
