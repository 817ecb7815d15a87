//! Alert intake pipeline
//!
//! Normalizes inbound alerts, suppresses bursts of similar alerts with a
//! sliding-window limiter, and dispatches the rest to notification channels.

pub mod clock;
pub mod dispatcher;
pub mod rate_limit;
pub mod record;
pub mod template;

pub use clock::{Clock, ManualClock, SystemClock};
pub use dispatcher::{DispatchReport, DispatchStats, DispatchStatsSnapshot, DispatchStatus, Dispatcher};
pub use rate_limit::{RateLimitSweeper, RateLimiter};
pub use record::{normalize, AlertRecord, Fingerprint, ValidationError};
pub use template::Template;
