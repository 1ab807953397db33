//! Fault-injection hooks for orchestrator tests.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};

use gnfd_transfer::{TransferDirection, TransferError};

/// Consulted before every attempt of every segment.
///
/// Returning an error makes the attempt fail with it, exactly as if the
/// provider had; the retry policy then applies as usual.
pub trait FaultInjector: Send + Sync {
    fn before_attempt(
        &self,
        direction: TransferDirection,
        segment: u64,
        attempt: u32,
    ) -> Option<TransferError>;
}

/// The default injector: never fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoFaults;

impl FaultInjector for NoFaults {
    fn before_attempt(&self, _: TransferDirection, _: u64, _: u32) -> Option<TransferError> {
        None
    }
}

/// Fails selected segments with a retryable network error.
#[derive(Debug)]
pub struct FailSegments {
    segments: HashSet<u64>,
    direction: Option<TransferDirection>,
    /// Attempts to fail per segment; `None` fails every attempt.
    attempts: Option<u32>,
    injected: AtomicU32,
}

impl FailSegments {
    /// Fails every attempt of the given segments, in both directions.
    pub fn always(segments: impl IntoIterator<Item = u64>) -> Self {
        Self {
            segments: segments.into_iter().collect(),
            direction: None,
            attempts: None,
            injected: AtomicU32::new(0),
        }
    }

    /// Fails only the first `attempts` attempts of the given segments.
    pub fn first_attempts(segments: impl IntoIterator<Item = u64>, attempts: u32) -> Self {
        Self {
            attempts: Some(attempts),
            ..Self::always(segments)
        }
    }

    /// Restricts injection to one direction.
    pub fn only(mut self, direction: TransferDirection) -> Self {
        self.direction = Some(direction);
        self
    }

    /// Number of failures injected so far.
    pub fn injected(&self) -> u32 {
        self.injected.load(Ordering::SeqCst)
    }
}

impl FaultInjector for FailSegments {
    fn before_attempt(
        &self,
        direction: TransferDirection,
        segment: u64,
        attempt: u32,
    ) -> Option<TransferError> {
        if self.direction.is_some_and(|d| d != direction) || !self.segments.contains(&segment) {
            return None;
        }
        if self.attempts.is_some_and(|limit| attempt > limit) {
            return None;
        }
        self.injected.fetch_add(1, Ordering::SeqCst);
        Some(TransferError::Network(format!(
            "injected fault on segment {segment} attempt {attempt}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_faults_never_fires() {
        assert!(NoFaults.before_attempt(TransferDirection::Upload, 0, 1).is_none());
    }

    #[test]
    fn always_fails_selected_segments() {
        let f = FailSegments::always([2]);
        assert!(f.before_attempt(TransferDirection::Upload, 1, 1).is_none());
        let err = f.before_attempt(TransferDirection::Download, 2, 7).unwrap();
        assert!(err.is_retryable());
        assert_eq!(f.injected(), 1);
    }

    #[test]
    fn first_attempts_then_passes() {
        let f = FailSegments::first_attempts([0], 2);
        assert!(f.before_attempt(TransferDirection::Upload, 0, 1).is_some());
        assert!(f.before_attempt(TransferDirection::Upload, 0, 2).is_some());
        assert!(f.before_attempt(TransferDirection::Upload, 0, 3).is_none());
    }

    #[test]
    fn direction_filter() {
        let f = FailSegments::always([0]).only(TransferDirection::Download);
        assert!(f.before_attempt(TransferDirection::Upload, 0, 1).is_none());
        assert!(f.before_attempt(TransferDirection::Download, 0, 1).is_some());
    }
}
