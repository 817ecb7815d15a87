//! Sliding-window suppression of similar alerts

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::time;

use super::clock::Clock;
use super::record::Fingerprint;
use crate::config::RateLimitConfig;

/// Per-fingerprint sliding-window counter
///
/// Each fingerprint maps to the admission times still inside the window,
/// oldest first. Prune, check and append for one fingerprint happen under
/// that entry's shard lock, so two concurrent admits can never both observe
/// room for the last slot.
pub struct RateLimiter {
    config: RateLimitConfig,
    window: chrono::Duration,
    history: DashMap<Fingerprint, VecDeque<DateTime<Utc>>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        let window = config.window();
        Self {
            config,
            window,
            history: DashMap::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Decide whether an alert with this fingerprint may proceed at `now`.
    ///
    /// Suppressed alerts are not recorded, so suppression ends as soon as
    /// the admitted alerts age out of the window.
    pub fn admit(&self, fingerprint: &Fingerprint, now: DateTime<Utc>) -> bool {
        if !self.config.enabled {
            return true;
        }

        let admitted = {
            let mut times = self.history.entry(fingerprint.clone()).or_default();
            prune(&mut times, now, self.window);

            if times.len() < self.config.max_similar_alerts {
                times.push_back(now);
                true
            } else {
                false
            }
        };

        if !admitted {
            // max_similar_alerts == 0 leaves an empty entry behind
            self.history.remove_if(fingerprint, |_, times| times.is_empty());
            tracing::info!(
                fingerprint = %fingerprint,
                max_similar_alerts = self.config.max_similar_alerts,
                window_seconds = self.config.window_seconds,
                "Rate limiting alert"
            );
        }

        admitted
    }

    /// Number of admissions for `fingerprint` still inside the window at `now`
    pub fn recent_count(&self, fingerprint: &Fingerprint, now: DateTime<Utc>) -> usize {
        self.history
            .get(fingerprint)
            .map(|times| times.iter().filter(|t| now - **t < self.window).count())
            .unwrap_or(0)
    }

    /// Prune every fingerprint and drop the ones left empty.
    ///
    /// Returns the number of fingerprints removed.
    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        let before = self.history.len();
        self.history.retain(|_, times| {
            prune(times, now, self.window);
            !times.is_empty()
        });
        before.saturating_sub(self.history.len())
    }

    /// Number of fingerprints currently holding window state
    pub fn tracked_fingerprints(&self) -> usize {
        self.history.len()
    }
}

fn prune(times: &mut VecDeque<DateTime<Utc>>, now: DateTime<Utc>, window: chrono::Duration) {
    while let Some(oldest) = times.front() {
        if now - *oldest >= window {
            times.pop_front();
        } else {
            break;
        }
    }
}

/// Background worker that periodically sweeps idle fingerprints
pub struct RateLimitSweeper {
    limiter: Arc<RateLimiter>,
    clock: Arc<dyn Clock>,
    interval: Duration,
    running: Arc<AtomicBool>,
}

impl RateLimitSweeper {
    pub fn new(limiter: Arc<RateLimiter>, clock: Arc<dyn Clock>, interval: Duration) -> Self {
        Self {
            limiter,
            clock,
            interval,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Start the background worker
    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        self.running.store(true, Ordering::SeqCst);

        tokio::spawn(async move {
            tracing::info!("Rate limit sweeper started with interval {:?}", self.interval);

            let mut interval = time::interval(self.interval);

            while self.running.load(Ordering::SeqCst) {
                interval.tick().await;

                let removed = self.limiter.sweep(self.clock.now());
                if removed > 0 {
                    tracing::debug!("Rate limit sweeper dropped {} idle fingerprints", removed);
                }
            }

            tracing::info!("Rate limit sweeper stopped");
        })
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}
