//! Configuration for cookie state observation.

use crate::errors::{CookieError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Polling period used by the document-cookie fallback when none (or an invalid one) is supplied.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

/// Capacity of the cookie change bus. Listeners falling further behind than this re-read the cookie.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 128;

/// Options for [`CookieState::activate`](crate::state::CookieState::activate).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CookieStateOptions {
    /// If the native cookie store is not available, the fallback polls `document.cookie`
    /// at this rate. Must be positive; `None` means [`DEFAULT_POLL_INTERVAL_MS`].
    pub poll_interval_ms: Option<i64>,
}

impl CookieStateOptions {
    pub fn with_poll_interval_ms(ms: i64) -> Self {
        Self {
            poll_interval_ms: Some(ms),
        }
    }

    /// Returns the configured poll interval, or an error when it is zero or negative.
    pub fn validate(&self) -> Result<Duration> {
        match self.poll_interval_ms {
            None => Ok(Duration::from_millis(DEFAULT_POLL_INTERVAL_MS)),
            Some(ms) if ms > 0 => Ok(Duration::from_millis(ms as u64)),
            Some(ms) => Err(CookieError::InvalidConfiguration(format!(
                "poll interval must be positive, got {}ms",
                ms
            ))),
        }
    }

    /// Poll interval to actually use. Invalid values fall back to the default.
    pub fn effective_poll_interval(&self) -> Duration {
        self.validate().unwrap_or_else(|e| {
            log::warn!("{}; using {}ms", e, DEFAULT_POLL_INTERVAL_MS);
            Duration::from_millis(DEFAULT_POLL_INTERVAL_MS)
        })
    }
}
