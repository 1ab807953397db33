use std::time::Duration;

use gnfd_types::constants::DEFAULT_MAX_ATTEMPTS;

use crate::TransferError;

/// Per-segment retry budget with exponential backoff.
///
/// Backoff is deterministic: no jitter is applied, so a given policy always
/// produces the same delay schedule.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Attempts per segment, the first try included. Must be at least 1.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_backoff: Duration,
    /// Cap on any single delay.
    pub max_backoff: Duration,
    /// Multiplier applied per retry.
    pub backoff_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(10),
            backoff_factor: 2.0,
        }
    }
}

impl RetryPolicy {
    /// A policy that never waits between attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            backoff_factor: 1.0,
        }
    }

    pub fn validate(&self) -> Result<(), TransferError> {
        if self.max_attempts == 0 {
            return Err(TransferError::InvalidConfiguration(
                "max attempts must be at least 1".into(),
            ));
        }
        if !self.backoff_factor.is_finite() || self.backoff_factor < 1.0 {
            return Err(TransferError::InvalidConfiguration(format!(
                "backoff factor must be >= 1.0, got {}",
                self.backoff_factor
            )));
        }
        Ok(())
    }

    /// Delay to wait after failed attempt number `attempt` (1-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(63) as i32;
        let secs = self.initial_backoff.as_secs_f64() * self.backoff_factor.powi(exp);
        let capped = secs.min(self.max_backoff.as_secs_f64());
        Duration::from_secs_f64(capped.max(0.0))
    }

    /// Returns `true` if another attempt is allowed after `attempt` failed
    /// with `err`.
    pub fn should_retry(&self, attempt: u32, err: &TransferError) -> bool {
        attempt < self.max_attempts && err.is_retryable()
    }
}
