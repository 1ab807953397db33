use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use gnfd_types::TransferStatus;
use serde::Serialize;

use crate::checkpoint::TransferDirection;

/// Snapshot of a transfer's progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferProgress {
    pub transfer_id: String,
    pub direction: TransferDirection,
    pub status: TransferStatus,
    pub total_bytes: u64,
    /// Bytes known done, resumed prefix included.
    pub transferred_bytes: u64,
    /// Bytes skipped because a checkpoint already covered them.
    pub resumed_bytes: u64,
    pub segments_total: u64,
    pub segments_done: u64,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub error: String,
}

impl TransferProgress {
    /// Completion in percent, 100 for empty transfers.
    pub fn percentage(&self) -> f64 {
        if self.total_bytes == 0 {
            return 100.0;
        }
        self.transferred_bytes as f64 * 100.0 / self.total_bytes as f64
    }

    /// Bytes still outstanding.
    pub fn remaining_bytes(&self) -> u64 {
        self.total_bytes.saturating_sub(self.transferred_bytes)
    }
}

// ---------------------------------------------------------------------------
// SpeedCalculator
// ---------------------------------------------------------------------------

/// Sliding-window throughput estimate fed from segment acknowledgements.
pub struct SpeedCalculator {
    inner: Mutex<SpeedWindow>,
}

struct SpeedWindow {
    samples: VecDeque<(Instant, u64)>,
    max_samples: usize,
    window: Duration,
}

impl Default for SpeedCalculator {
    fn default() -> Self {
        Self::new(Duration::from_secs(5), 100)
    }
}

impl SpeedCalculator {
    /// Keeps at most `max_samples` samples no older than `window`.
    pub fn new(window: Duration, max_samples: usize) -> Self {
        Self {
            inner: Mutex::new(SpeedWindow {
                samples: VecDeque::new(),
                max_samples: max_samples.max(2),
                window,
            }),
        }
    }

    /// Records `bytes` completed now.
    pub fn record(&self, bytes: u64) {
        let mut w = self.inner.lock().unwrap();
        let now = Instant::now();
        w.samples.push_back((now, bytes));

        if let Some(cutoff) = now.checked_sub(w.window) {
            while w.samples.front().is_some_and(|(at, _)| *at < cutoff) {
                w.samples.pop_front();
            }
        }
        while w.samples.len() > w.max_samples {
            w.samples.pop_front();
        }
    }

    /// Average bytes per second across the window; 0.0 with fewer than two
    /// samples.
    pub fn bytes_per_second(&self) -> f64 {
        let w = self.inner.lock().unwrap();
        let (Some((first, _)), Some((last, _))) = (w.samples.front(), w.samples.back()) else {
            return 0.0;
        };
        let elapsed = last.duration_since(*first);
        if w.samples.len() < 2 || elapsed.is_zero() {
            return 0.0;
        }
        let total: u64 = w.samples.iter().map(|(_, b)| b).sum();
        total as f64 / elapsed.as_secs_f64()
    }

    /// Estimated time to move `remaining_bytes`, `None` while speed is unknown.
    pub fn eta(&self, remaining_bytes: u64) -> Option<Duration> {
        let speed = self.bytes_per_second();
        (speed > 0.0).then(|| Duration::from_secs_f64(remaining_bytes as f64 / speed))
    }

    #[cfg(test)]
    fn sample_count(&self) -> usize {
        self.inner.lock().unwrap().samples.len()
    }
}
