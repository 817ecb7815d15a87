//! Alert dispatch pipeline
//!
//! validate -> rate-limit -> concurrent fan-out to every enabled channel ->
//! aggregate. Channel failures are isolated and reported per channel; only
//! validation aborts the pipeline.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::{Map, Value};

use super::clock::Clock;
use super::rate_limit::RateLimiter;
use super::record::{normalize, AlertRecord};
use crate::channels::{ChannelError, ChannelSender, DispatchOutcome};

/// Terminal state of one alert's handling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchStatus {
    /// Failed validation; nothing was sent
    Rejected,
    /// Suppressed by the rate limiter; nothing was sent
    RateLimited,
    /// At least one channel delivered
    Success,
    /// Channels ran but none delivered
    DeliveredNowhere,
    /// No channel is enabled
    NoChannelsConfigured,
}

/// Result of handling one alert
#[derive(Debug, Clone, Serialize)]
pub struct DispatchReport {
    pub status: DispatchStatus,
    pub outcomes: Vec<DispatchOutcome>,
    /// Rejection reason or suppressed fingerprint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl DispatchReport {
    fn without_outcomes(status: DispatchStatus, detail: String) -> Self {
        Self {
            status,
            outcomes: Vec::new(),
            detail: Some(detail),
        }
    }
}

/// Dispatch counters since startup
#[derive(Debug, Default)]
pub struct DispatchStats {
    received: AtomicU64,
    rejected: AtomicU64,
    rate_limited: AtomicU64,
    delivered: AtomicU64,
    delivered_nowhere: AtomicU64,
    no_channels: AtomicU64,
}

/// Point-in-time copy of [`DispatchStats`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchStatsSnapshot {
    pub received: u64,
    pub rejected: u64,
    pub rate_limited: u64,
    pub delivered: u64,
    pub delivered_nowhere: u64,
    pub no_channels: u64,
}

impl DispatchStats {
    fn record(&self, status: DispatchStatus) {
        let counter = match status {
            DispatchStatus::Rejected => &self.rejected,
            DispatchStatus::RateLimited => &self.rate_limited,
            DispatchStatus::Success => &self.delivered,
            DispatchStatus::DeliveredNowhere => &self.delivered_nowhere,
            DispatchStatus::NoChannelsConfigured => &self.no_channels,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DispatchStatsSnapshot {
        DispatchStatsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            rate_limited: self.rate_limited.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            delivered_nowhere: self.delivered_nowhere.load(Ordering::Relaxed),
            no_channels: self.no_channels.load(Ordering::Relaxed),
        }
    }
}

/// Orchestrates one alert from raw input to aggregated outcome
pub struct Dispatcher {
    limiter: Arc<RateLimiter>,
    channels: Vec<Arc<dyn ChannelSender>>,
    clock: Arc<dyn Clock>,
    /// Upper bound on a single channel's send
    channel_timeout: Duration,
    stats: DispatchStats,
}

impl Dispatcher {
    pub fn new(
        limiter: Arc<RateLimiter>,
        channels: Vec<Arc<dyn ChannelSender>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            limiter,
            channels,
            clock,
            channel_timeout: Duration::from_secs(20),
            stats: DispatchStats::default(),
        }
    }

    pub fn with_channel_timeout(mut self, timeout: Duration) -> Self {
        self.channel_timeout = timeout;
        self
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub fn stats(&self) -> &DispatchStats {
        &self.stats
    }

    /// Whether a channel with this name exists and is enabled
    pub fn channel_enabled(&self, name: &str) -> bool {
        self.channels
            .iter()
            .any(|c| c.name() == name && c.is_enabled())
    }

    /// Handle one raw alert
    pub async fn handle(&self, raw: Map<String, Value>) -> DispatchReport {
        self.stats.received.fetch_add(1, Ordering::Relaxed);
        let report = self.process(raw).await;
        self.stats.record(report.status);
        report
    }

    async fn process(&self, raw: Map<String, Value>) -> DispatchReport {
        let now = self.clock.now();

        let alert = match normalize(raw, now) {
            Ok(alert) => alert,
            Err(e) => {
                tracing::info!(error = %e, "Rejected alert");
                return DispatchReport::without_outcomes(DispatchStatus::Rejected, e.to_string());
            }
        };

        let fingerprint = alert.fingerprint();
        if !self.limiter.admit(&fingerprint, now) {
            return DispatchReport::without_outcomes(
                DispatchStatus::RateLimited,
                fingerprint.to_string(),
            );
        }

        tracing::info!(
            severity = %alert.severity(),
            source = %alert.source(),
            event_type = %alert.event_type(),
            "Received alert"
        );

        let enabled: Vec<Arc<dyn ChannelSender>> = self
            .channels
            .iter()
            .filter(|c| c.is_enabled())
            .cloned()
            .collect();

        if enabled.is_empty() {
            tracing::warn!("Alert received but no notification channels are enabled");
            return DispatchReport {
                status: DispatchStatus::NoChannelsConfigured,
                outcomes: Vec::new(),
                detail: None,
            };
        }

        let outcomes = self.fan_out(enabled, Arc::new(alert)).await;
        let status = if outcomes.iter().any(|o| o.succeeded) {
            DispatchStatus::Success
        } else {
            tracing::warn!("Alert received but no notifications were sent");
            DispatchStatus::DeliveredNowhere
        };

        DispatchReport {
            status,
            outcomes,
            detail: None,
        }
    }

    /// One task per channel, each bounded by the channel timeout.
    ///
    /// A channel that panics or times out yields a failed outcome; the
    /// others still complete and are reported in channel order.
    async fn fan_out(
        &self,
        channels: Vec<Arc<dyn ChannelSender>>,
        alert: Arc<AlertRecord>,
    ) -> Vec<DispatchOutcome> {
        let names: Vec<String> = channels.iter().map(|c| c.name().to_string()).collect();

        let handles: Vec<_> = channels
            .into_iter()
            .map(|channel| {
                let alert = Arc::clone(&alert);
                let timeout = self.channel_timeout;
                tokio::spawn(async move {
                    match tokio::time::timeout(timeout, channel.send(&alert)).await {
                        Ok(outcome) => outcome,
                        Err(_) => {
                            let error = ChannelError::Delivery(format!(
                                "Channel timed out after {:?}",
                                timeout
                            ));
                            tracing::error!(channel = %channel.name(), error = %error, "Channel send timed out");
                            DispatchOutcome::failed(channel.name(), &error)
                        }
                    }
                })
            })
            .collect();

        futures::future::join_all(handles)
            .await
            .into_iter()
            .zip(names)
            .map(|(joined, name)| {
                joined.unwrap_or_else(|e| {
                    let error = ChannelError::Delivery(format!("Channel task failed: {}", e));
                    tracing::error!(channel = %name, error = %error, "Channel task aborted");
                    DispatchOutcome::failed(name, &error)
                })
            })
            .collect()
    }
}
