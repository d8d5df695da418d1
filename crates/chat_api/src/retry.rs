//! Retry policy for chat requests that fail before any stream byte is read.

use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;

pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(1000);

const RETRYABLE_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];

fn transient_error_regex() -> &'static Regex {
    static CACHED: OnceLock<Regex> = OnceLock::new();
    CACHED.get_or_init(|| {
        Regex::new(
            r"(?i)rate.?limit|overloaded|service.?unavailable|upstream.?connect|connection.?refused",
        )
        .expect("retry regex must compile")
    })
}

/// Bounded exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts allowed after the first one.
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_BASE_DELAY,
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// No retries at all.
    #[must_use]
    pub fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }

    #[must_use]
    pub fn allows_retry(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }

    /// Whether an HTTP failure looks transient.
    #[must_use]
    pub fn is_retryable(status: u16, error_text: &str) -> bool {
        RETRYABLE_STATUSES.contains(&status) || transient_error_regex().is_match(error_text)
    }

    /// Backoff before retry number `attempt` (zero-based): `base_delay * 2^attempt`.
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt.min(16)))
    }
}
