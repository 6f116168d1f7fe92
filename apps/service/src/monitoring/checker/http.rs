use chrono::Utc;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::time::Instant;
use tokio_util::sync::CancellationToken;

use super::{CheckerError, Checker, bounded, describe};
use crate::config::{DEFAULT_EXPECTED_STATUS, ServiceConfig};
use crate::monitoring::types::CheckResult;

/// HTTP/HTTPS checker
///
/// Issues a single GET and compares the response status with the service's
/// expected status.
pub struct HttpChecker {
    service: ServiceConfig,
    client: reqwest::Client,
}

impl HttpChecker {
    pub fn new(service: ServiceConfig) -> Result<Self, CheckerError> {
        let client = reqwest::Client::builder().timeout(service.timeout).build()?;

        Ok(Self { service, client })
    }

    fn expected_status(&self) -> u16 {
        match self.service.expected_status {
            0 => DEFAULT_EXPECTED_STATUS,
            status => status,
        }
    }

    fn build_request(&self) -> Result<reqwest::Request, String> {
        let mut headers = HeaderMap::with_capacity(self.service.headers.len());
        for (key, value) in &self.service.headers {
            let name = HeaderName::from_bytes(key.as_bytes())
                .map_err(|e| format!("invalid header name {key:?}: {e}"))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| format!("invalid header value for {key:?}: {e}"))?;
            headers.insert(name, value);
        }

        self.client
            .get(&self.service.target)
            .headers(headers)
            .build()
            .map_err(|e| describe(&e))
    }
}

#[async_trait::async_trait]
impl Checker for HttpChecker {
    async fn check(&self, cancel: &CancellationToken) -> CheckResult {
        let checked_at = Utc::now();
        let start = Instant::now();
        let name = self.service.name.as_str();

        let request = match self.build_request() {
            Ok(request) => request,
            Err(e) => {
                return CheckResult::down(name, checked_at, start.elapsed(), format!("creating request: {e}"));
            }
        };

        let outcome = bounded(cancel, self.service.timeout, self.client.execute(request)).await;
        let response_time = start.elapsed();

        let response = match outcome {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return CheckResult::down(name, checked_at, response_time, describe(&e)),
            Err(interrupted) => {
                let error = format!("GET {}: {interrupted}", self.service.target);
                return CheckResult::down(name, checked_at, response_time, error);
            }
        };

        let expected = self.expected_status();
        let status = response.status().as_u16();
        if status != expected {
            let error = format!("expected status {expected}, got {status}");
            return CheckResult::down(name, checked_at, response_time, error);
        }

        CheckResult::up(name, checked_at, response_time)
    }
}
