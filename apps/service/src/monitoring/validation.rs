//! Service descriptor validation.
//!
//! Rejects descriptors the checkers could never probe successfully, so a
//! typo surfaces when the config is loaded instead of as a permanently
//! down service.

use url::Url;

use crate::config::ServiceConfig;
use crate::monitoring::checker::CheckType;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("target is required")]
    MissingTarget,
    #[error("invalid type {0:?} (must be http, tcp, ping, or container)")]
    UnknownType(String),
    #[error("{field} must be greater than zero")]
    ZeroDuration { field: &'static str },
    #[error("expected_status {0} is not a valid HTTP status code")]
    InvalidExpectedStatus(u16),
    #[error("invalid URL {target:?}: {reason}")]
    InvalidUrl { target: String, reason: String },
    #[error("TCP target {0:?} must be in format host:port")]
    InvalidTcpTarget(String),
    #[error("invalid host {0:?}")]
    InvalidHost(String),
    #[error("invalid container name {0:?}")]
    InvalidContainerName(String),
}

/// Validate a service descriptor against its checker type
pub fn validate_service(service: &ServiceConfig) -> Result<(), ValidationError> {
    let target = service.target.trim();
    if target.is_empty() {
        return Err(ValidationError::MissingTarget);
    }

    let check_type: CheckType = service
        .check_type
        .parse()
        .map_err(|_| ValidationError::UnknownType(service.check_type.clone()))?;

    if service.interval.is_zero() {
        return Err(ValidationError::ZeroDuration { field: "interval" });
    }
    if service.timeout.is_zero() {
        return Err(ValidationError::ZeroDuration { field: "timeout" });
    }

    match check_type {
        CheckType::Http => {
            if !(100..=599).contains(&service.expected_status) {
                return Err(ValidationError::InvalidExpectedStatus(service.expected_status));
            }
            validate_http_target(target)
        }
        CheckType::Tcp => validate_tcp_target(target),
        CheckType::Ping => validate_host(target),
        CheckType::Container => validate_container_name(target),
    }
}

/// Validate HTTP/HTTPS target
fn validate_http_target(target: &str) -> Result<(), ValidationError> {
    let invalid = |reason: String| ValidationError::InvalidUrl { target: target.to_string(), reason };

    let url = Url::parse(target).map_err(|e| invalid(e.to_string()))?;

    match url.scheme() {
        "http" | "https" => {}
        other => return Err(invalid(format!("unsupported scheme {other:?}"))),
    }

    if url.host_str().is_none_or(str::is_empty) {
        return Err(invalid("missing host".to_string()));
    }

    Ok(())
}

/// Validate TCP target
fn validate_tcp_target(target: &str) -> Result<(), ValidationError> {
    // Expected format: host:port, with IPv6 hosts in brackets
    let (host, port) = target
        .rsplit_once(':')
        .ok_or_else(|| ValidationError::InvalidTcpTarget(target.to_string()))?;

    let port: u16 = port
        .parse()
        .map_err(|_| ValidationError::InvalidTcpTarget(target.to_string()))?;
    if port == 0 {
        return Err(ValidationError::InvalidTcpTarget(target.to_string()));
    }

    let host = host.strip_prefix('[').and_then(|h| h.strip_suffix(']')).unwrap_or(host);
    if host.is_empty() {
        return Err(ValidationError::InvalidTcpTarget(target.to_string()));
    }
    validate_host(host)
}

/// Validate a bare hostname or IP address
fn validate_host(host: &str) -> Result<(), ValidationError> {
    let well_formed = !host.starts_with('-')
        && host
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | ':' | '%'));

    if well_formed {
        Ok(())
    } else {
        Err(ValidationError::InvalidHost(host.to_string()))
    }
}

/// Validate a container name or ID as accepted by the runtime API
fn validate_container_name(name: &str) -> Result<(), ValidationError> {
    let name = name.strip_prefix('/').unwrap_or(name);
    let well_formed = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'));

    if well_formed {
        Ok(())
    } else {
        Err(ValidationError::InvalidContainerName(name.to_string()))
    }
}
