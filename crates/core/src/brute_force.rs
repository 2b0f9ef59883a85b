//! Rolling-window evaluation for failed authentication attempts.

use chrono::Duration;
use serde::Serialize;

use crate::types::Timestamp;

/// Default trailing window in minutes.
pub const DEFAULT_WINDOW_MINS: i64 = 15;

/// Longest accepted trailing window (one week).
pub const MAX_WINDOW_MINS: i64 = 7 * 24 * 60;

/// Default number of failures that trips the detector.
pub const DEFAULT_THRESHOLD: u32 = 5;

/// Failure reasons recorded on `login_attempts` rows.
pub mod failure_reasons {
    pub const UNKNOWN_USER: &str = "unknown_user";
    pub const INVALID_PASSWORD: &str = "invalid_password";
    pub const ACCOUNT_INACTIVE: &str = "account_inactive";
    pub const TOO_MANY_ATTEMPTS: &str = "too_many_attempts";
}

/// Window and threshold parameters for one check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BruteForcePolicy {
    pub window: Duration,
    pub threshold: u32,
}

impl Default for BruteForcePolicy {
    fn default() -> Self {
        Self {
            window: Duration::minutes(DEFAULT_WINDOW_MINS),
            threshold: DEFAULT_THRESHOLD,
        }
    }
}

impl BruteForcePolicy {
    /// Start of the trailing window ending at `now`.
    pub fn window_start(&self, now: Timestamp) -> Timestamp {
        now - self.window
    }

    /// Evaluate a failure count against the threshold.
    pub fn evaluate(&self, count: u32) -> BruteForceCheck {
        BruteForceCheck {
            is_over: count >= self.threshold,
            count,
            remaining: self.threshold.saturating_sub(count),
        }
    }
}

/// Result of a brute-force check. The caller decides whether to block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BruteForceCheck {
    pub is_over: bool,
    pub count: u32,
    pub remaining: u32,
}
