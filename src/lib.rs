//! Alert Relay: security alert intake and notification fan-out
//!
//! Receives structured security alerts over HTTP and delivers them to email
//! and webhook channels, suppressing bursts of similar alerts with a
//! sliding-window rate limiter.
//!
//! # Features
//!
//! - **Normalization**: required `severity`/`message`, defaults for
//!   `source`, `event_type` and `timestamp`, extra fields kept verbatim
//! - **Suppression**: at most `max_similar_alerts` per fingerprint
//!   (event type, source, severity) in any rolling window
//! - **Concurrent fan-out**: every enabled channel runs in its own task with
//!   its own timeout; one failing channel never blocks the others
//! - **Templates**: Jinja subject and body templates rendered with `minijinja`
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use alert_relay::alerts::{Dispatcher, RateLimiter, SystemClock};
//! use alert_relay::channels::{ChannelSender, WebhookSender};
//! use alert_relay::config::{RateLimitConfig, WebhookConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let webhook = WebhookSender::from_config(WebhookConfig {
//!     enabled: true,
//!     urls: vec!["http://hooks.internal/alerts".to_string()],
//!     ..Default::default()
//! })?;
//! let channels: Vec<Arc<dyn ChannelSender>> = vec![Arc::new(webhook)];
//!
//! let dispatcher = Dispatcher::new(
//!     Arc::new(RateLimiter::new(RateLimitConfig::default())),
//!     channels,
//!     Arc::new(SystemClock),
//! );
//!
//! let raw = serde_json::json!({"severity": "high", "message": "port scan"});
//! let report = dispatcher.handle(raw.as_object().cloned().unwrap_or_default()).await;
//! println!("{:?}", report.status);
//! # Ok(())
//! # }
//! ```

pub mod alerts;
pub mod api;
pub mod channels;
pub mod config;

// Re-export commonly used types
pub use alerts::{AlertRecord, DispatchReport, DispatchStatus, Dispatcher, RateLimiter};
pub use channels::{ChannelError, ChannelSender, DispatchOutcome};
pub use config::AppConfig;
