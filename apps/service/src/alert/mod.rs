//! State-change alerting.
//!
//! The [`Alerter`] sits behind the scheduler's result callback and turns
//! status transitions into notifications, at most one per service per
//! cooldown window.

pub mod models;
pub mod senders;

pub use models::{ALERT_SOURCE, AlertPayload};
pub use senders::{NotificationSender, SenderError, WebhookSender};

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tracing::{debug, error, info};

use crate::monitoring::types::{CheckResult, Status};

/// What [`Alerter::notify`] did with a result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertDecision {
    /// No earlier result to compare against
    FirstCheck,
    /// Status matches the previous result
    Unchanged,
    /// Transition inside the service's cooldown window
    Suppressed,
    /// Notification handed to a background send
    Dispatched,
}

pub struct Alerter {
    sender: Arc<dyn NotificationSender>,
    cooldown: Duration,
    last_alert: Mutex<HashMap<String, Instant>>,
}

impl Alerter {
    pub fn new(sender: Arc<dyn NotificationSender>, cooldown: Duration) -> Self {
        Self {
            sender,
            cooldown,
            last_alert: Mutex::new(HashMap::new()),
        }
    }

    /// Decide whether `result` warrants a notification and dispatch it.
    ///
    /// Never blocks on delivery. The cooldown clock starts when the send is
    /// attempted, so a failed delivery still suppresses the next transition.
    /// Must be called from within a tokio runtime.
    pub fn notify(&self, result: &CheckResult, previous_status: Option<Status>) -> AlertDecision {
        let Some(previous_status) = previous_status else {
            return AlertDecision::FirstCheck;
        };
        if result.status == previous_status {
            return AlertDecision::Unchanged;
        }

        {
            let mut last_alert = self.last_alert.lock().unwrap_or_else(PoisonError::into_inner);
            let now = Instant::now();
            if let Some(last) = last_alert.get(&result.service_name) {
                if now.duration_since(*last) < self.cooldown {
                    info!(
                        service = %result.service_name,
                        status = %result.status,
                        previous = %previous_status,
                        "Alert suppressed by cooldown"
                    );
                    return AlertDecision::Suppressed;
                }
            }
            last_alert.insert(result.service_name.clone(), now);
        }

        let payload = AlertPayload::new(result, previous_status);
        let sender = Arc::clone(&self.sender);
        tokio::spawn(async move {
            match sender.send(&payload).await {
                Ok(()) => debug!(service = %payload.service, status = %payload.status, "Alert delivered"),
                Err(e) => error!(service = %payload.service, error = %e, "Failed to deliver alert"),
            }
        });

        AlertDecision::Dispatched
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingSender;
    use chrono::Utc;

    fn result(service: &str, status: Status) -> CheckResult {
        match status {
            Status::Up => CheckResult::up(service, Utc::now(), Duration::from_millis(10)),
            Status::Down => CheckResult::down(service, Utc::now(), Duration::from_millis(10), "connection refused"),
        }
    }

    fn alerter(sender: &Arc<RecordingSender>, cooldown: Duration) -> Alerter {
        Alerter::new(sender.clone(), cooldown)
    }

    #[tokio::test]
    async fn test_first_check_is_silent() {
        let sender = RecordingSender::new();
        let alerter = alerter(&sender, Duration::ZERO);

        assert_eq!(alerter.notify(&result("api", Status::Down), None), AlertDecision::FirstCheck);
        sender.assert_quiet().await;
    }

    #[tokio::test]
    async fn test_unchanged_status_is_silent() {
        let sender = RecordingSender::new();
        let alerter = alerter(&sender, Duration::ZERO);

        assert_eq!(alerter.notify(&result("api", Status::Up), Some(Status::Up)), AlertDecision::Unchanged);
        assert_eq!(
            alerter.notify(&result("api", Status::Down), Some(Status::Down)),
            AlertDecision::Unchanged
        );
        sender.assert_quiet().await;
    }

    #[tokio::test]
    async fn test_transition_sends_one_notification() {
        let sender = RecordingSender::new();
        let alerter = alerter(&sender, Duration::from_secs(3600));

        assert_eq!(alerter.notify(&result("api", Status::Down), Some(Status::Up)), AlertDecision::Dispatched);

        let sent = sender.wait_for(1).await;
        assert_eq!(sent[0].service, "api");
        assert_eq!(sent[0].status, Status::Down);
        assert_eq!(sent[0].previous_status, Status::Up);
        assert_eq!(sent[0].error, "connection refused");
        assert_eq!(sent[0].source, ALERT_SOURCE);
    }

    #[tokio::test]
    async fn test_cooldown_suppresses_repeat_transitions() {
        let sender = RecordingSender::new();
        let alerter = alerter(&sender, Duration::from_secs(3600));

        assert_eq!(alerter.notify(&result("api", Status::Down), Some(Status::Up)), AlertDecision::Dispatched);
        assert_eq!(alerter.notify(&result("api", Status::Up), Some(Status::Down)), AlertDecision::Suppressed);

        assert_eq!(sender.wait_for(1).await.len(), 1);
        sender.assert_count_stays(1).await;
    }

    #[tokio::test]
    async fn test_cooldown_is_per_service() {
        let sender = RecordingSender::new();
        let alerter = alerter(&sender, Duration::from_secs(3600));

        assert_eq!(alerter.notify(&result("api", Status::Down), Some(Status::Up)), AlertDecision::Dispatched);
        assert_eq!(alerter.notify(&result("db", Status::Down), Some(Status::Up)), AlertDecision::Dispatched);

        let mut services: Vec<_> = sender.wait_for(2).await.into_iter().map(|p| p.service).collect();
        services.sort();
        assert_eq!(services, ["api", "db"]);
    }

    #[tokio::test]
    async fn test_zero_cooldown_sends_every_transition() {
        let sender = RecordingSender::new();
        let alerter = alerter(&sender, Duration::ZERO);

        alerter.notify(&result("api", Status::Down), Some(Status::Up));
        alerter.notify(&result("api", Status::Up), Some(Status::Down));

        assert_eq!(sender.wait_for(2).await.len(), 2);
    }

    #[tokio::test]
    async fn test_cooldown_expires() {
        let sender = RecordingSender::new();
        let alerter = alerter(&sender, Duration::from_millis(30));

        alerter.notify(&result("api", Status::Down), Some(Status::Up));
        tokio::time::sleep(Duration::from_millis(60)).await;

        assert_eq!(alerter.notify(&result("api", Status::Up), Some(Status::Down)), AlertDecision::Dispatched);
        assert_eq!(sender.wait_for(2).await.len(), 2);
    }

    #[tokio::test]
    async fn test_failed_delivery_still_starts_cooldown() {
        let sender = RecordingSender::failing();
        let alerter = alerter(&sender, Duration::from_secs(3600));

        assert_eq!(alerter.notify(&result("api", Status::Down), Some(Status::Up)), AlertDecision::Dispatched);
        assert_eq!(sender.wait_for(1).await.len(), 1);

        assert_eq!(alerter.notify(&result("api", Status::Up), Some(Status::Down)), AlertDecision::Suppressed);
    }
}
