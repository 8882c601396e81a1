// Attempt pacing for authenticated requests
//
// Every attempt, the first one included, is preceded by a delay. The
// strategy decides that delay and when the attempt budget is spent.

use std::time::Duration;

/// Default number of attempts per authenticated request
pub const MAX_ATTEMPTS: u32 = 3;

/// Status codes that invalidate the cached token and trigger a retry
pub const AUTH_FAILURE_STATUSES: [u16; 2] = [400, 401];

/// Returns true when a response status should refresh the token and retry
pub fn is_auth_failure(status: u16) -> bool {
    AUTH_FAILURE_STATUSES.contains(&status)
}

/// Pacing strategy for request attempts
pub trait RetryStrategy: Send + Sync {
    /// Delay to wait before dispatching attempt number `attempt` (zero based).
    /// Returns None once the attempt budget is spent.
    fn next_delay(&self, attempt: u32) -> Option<Duration>;

    /// Check if another attempt is allowed
    fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts()
    }

    /// Total attempts allowed, the first one included
    fn max_attempts(&self) -> u32 {
        MAX_ATTEMPTS
    }
}

/// Fixed delay before every attempt
#[derive(Debug, Clone)]
pub struct FixedDelay {
    delay: Duration,
    max_attempts: u32,
}

impl FixedDelay {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            max_attempts: MAX_ATTEMPTS,
        }
    }

    pub fn with_max_attempts(delay: Duration, max_attempts: u32) -> Self {
        Self {
            delay,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Pause applied before every attempt
    pub fn delay(&self) -> Duration {
        self.delay
    }
}

impl Default for FixedDelay {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

impl RetryStrategy for FixedDelay {
    fn next_delay(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_attempts {
            return None;
        }
        Some(self.delay)
    }

    fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}
