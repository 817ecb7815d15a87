//! Notification channels
//!
//! Every channel implements [`ChannelSender`] and reports a
//! [`DispatchOutcome`] instead of failing, so the dispatcher aggregates all
//! channels the same way.

pub mod email;
pub mod webhook;

use async_trait::async_trait;
use serde::Serialize;

use crate::alerts::AlertRecord;

pub use email::{EmailSender, Mailer, SmtpMailer};
pub use webhook::WebhookSender;

/// A notification delivery mechanism
#[async_trait]
pub trait ChannelSender: Send + Sync {
    /// Channel name reported in outcomes ("email", "webhook")
    fn name(&self) -> &str;

    /// Whether the channel is switched on in configuration
    fn is_enabled(&self) -> bool;

    /// Attempt delivery once. Never retried.
    async fn send(&self, alert: &AlertRecord) -> DispatchOutcome;
}

/// Result of one channel's delivery for one alert
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DispatchOutcome {
    pub channel: String,
    pub succeeded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Individual delivery attempts (one per webhook URL, one per email)
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attempts: Vec<DeliveryAttempt>,
}

impl DispatchOutcome {
    /// Outcome aggregated from individual attempts; succeeds if any did
    pub fn from_attempts(channel: impl Into<String>, attempts: Vec<DeliveryAttempt>) -> Self {
        let succeeded = attempts.iter().any(|a| a.succeeded);
        let error = if succeeded {
            None
        } else {
            let failures: Vec<&str> = attempts.iter().filter_map(|a| a.error.as_deref()).collect();
            Some(failures.join("; "))
        };
        Self {
            channel: channel.into(),
            succeeded,
            error,
            attempts,
        }
    }

    /// Failed outcome without any delivery attempt
    pub fn failed(channel: impl Into<String>, error: &ChannelError) -> Self {
        Self {
            channel: channel.into(),
            succeeded: false,
            error: Some(error.to_string()),
            attempts: Vec::new(),
        }
    }
}

/// One delivery to one target (URL or recipient list)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeliveryAttempt {
    pub target: String,
    pub succeeded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DeliveryAttempt {
    pub fn ok(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            succeeded: true,
            error: None,
        }
    }

    pub fn failed(target: impl Into<String>, error: &ChannelError) -> Self {
        Self {
            target: target.into(),
            succeeded: false,
            error: Some(error.to_string()),
        }
    }
}

/// Channel errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ChannelError {
    /// Disabled or missing required settings; expected, not a fault
    #[error("Channel unavailable: {0}")]
    Unavailable(String),

    #[error("Delivery failed: {0}")]
    Delivery(String),

    /// Settings present but unusable
    #[error("Invalid channel configuration: {0}")]
    Config(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_succeeds_if_any_attempt_did() {
        let outcome = DispatchOutcome::from_attempts(
            "webhook",
            vec![
                DeliveryAttempt::failed("http://a", &ChannelError::Delivery("500".into())),
                DeliveryAttempt::ok("http://b"),
            ],
        );
        assert!(outcome.succeeded);
        assert!(outcome.error.is_none());
        assert_eq!(outcome.attempts.len(), 2);
    }

    #[test]
    fn test_outcome_collects_failures() {
        let outcome = DispatchOutcome::from_attempts(
            "webhook",
            vec![
                DeliveryAttempt::failed("http://a", &ChannelError::Delivery("status 500".into())),
                DeliveryAttempt::failed("http://b", &ChannelError::Delivery("refused".into())),
            ],
        );
        assert!(!outcome.succeeded);
        assert_eq!(
            outcome.error.as_deref(),
            Some("Delivery failed: status 500; Delivery failed: refused")
        );
    }

    #[test]
    fn test_unavailable_outcome_serialization() {
        let outcome = DispatchOutcome::failed(
            "email",
            &ChannelError::Unavailable("email alerts disabled".into()),
        );
        let value = serde_json::to_value(&outcome).unwrap();

        assert_eq!(value["channel"], "email");
        assert_eq!(value["succeeded"], false);
        assert_eq!(value["error"], "Channel unavailable: email alerts disabled");
        assert!(value.get("attempts").is_none());
    }
}
