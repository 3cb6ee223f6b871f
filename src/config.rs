//! Controller configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_with::{DurationMilliSeconds, serde_as};

use crate::errors::Error;

/// Tunables for the link, the poller and the status reporting.
///
/// Every field has a default, so a partial JSON document is enough:
///
/// ```
/// use std::time::Duration;
/// use cuehall_lights::ControllerConfig;
///
/// let config = ControllerConfig::from_json(r#"{"request_timeout_ms": 2000}"#).unwrap();
/// assert_eq!(config.request_timeout, Duration::from_millis(2000));
/// assert_eq!(config.poll_interval, Duration::from_secs(5));
/// assert_eq!(config.backoff.cap, Duration::from_secs(10));
/// ```
#[serde_as]
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ControllerConfig {
    /// Upper bound for a single request/reply exchange.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "request_timeout_ms")]
    pub request_timeout: Duration,

    /// Cadence of the background poller.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "poll_interval_ms")]
    pub poll_interval: Duration,

    /// A poll younger than this is served from cache instead of asking the
    /// module again.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "poll_cache_window_ms")]
    pub poll_cache_window: Duration,

    pub backoff: BackoffConfig,

    /// Consecutive timeouts after which the link is considered broken.
    pub timeouts_before_reconnect: u32,

    /// Number of recent link transactions kept for diagnostics.
    pub history_capacity: usize,

    /// Power draw of one lit fixture, used by the summary.
    pub watts_per_light: u32,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_millis(5000),
            poll_interval: Duration::from_secs(5),
            poll_cache_window: Duration::from_secs(1),
            backoff: BackoffConfig::default(),
            timeouts_before_reconnect: 3,
            history_capacity: 100,
            watts_per_light: 12,
        }
    }
}

impl ControllerConfig {
    pub fn from_json(json: &str) -> Result<Self, Error> {
        serde_json::from_str(json).map_err(Error::JsonLoad)
    }
}

/// Exponential backoff for reconnecting to the module.
#[serde_as]
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct BackoffConfig {
    /// Delay ceiling for the first retry.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "base_ms")]
    pub base: Duration,

    /// Upper bound on any delay.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "cap_ms")]
    pub cap: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(500),
            cap: Duration::from_secs(10),
        }
    }
}

impl BackoffConfig {
    /// Longest delay allowed for the given attempt: `min(cap, base * 2^attempt)`.
    pub fn ceiling(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.min(31)).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.cap)
    }

    /// Full jitter: a uniformly random delay in `[0, ceiling(attempt)]`.
    ///
    /// Entropy comes from a v4 uuid, which is plenty for spreading retries.
    pub fn delay(&self, attempt: u32) -> Duration {
        let ceiling = self.ceiling(attempt);
        let sample = (uuid::Uuid::new_v4().as_u128() >> 64) as u64;
        let fraction = sample as f64 / u64::MAX as f64;
        ceiling.mul_f64(fraction)
    }
}
