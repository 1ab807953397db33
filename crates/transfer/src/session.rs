use std::sync::RwLock;
use std::time::{Duration, Instant};

use gnfd_types::TransferStatus;

use crate::checkpoint::TransferDirection;
use crate::progress::TransferProgress;
use crate::segment::Segmenter;

/// Per-segment state within a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentState {
    Pending,
    Sending,
    Acked,
    Failed,
}

/// Tracks an active transfer (thread-safe).
///
/// Lives for the duration of one `put`/`download` call. Segments before the
/// resume point start out `Acked`.
pub struct TransferSession {
    inner: RwLock<SessionInner>,
}

struct SessionInner {
    id: String,
    direction: TransferDirection,
    status: TransferStatus,
    total_bytes: u64,
    resumed_bytes: u64,
    acked_bytes: u64,
    segments: Vec<SegmentState>,
    attempts: Vec<u32>,
    lengths: Vec<u64>,
    started_at: Option<Instant>,
    completed_at: Option<Instant>,
    error: String,
}

impl TransferSession {
    /// Creates a pending session for the segments of `segmenter`, with
    /// everything before `start_index` already done.
    pub fn new(direction: TransferDirection, segmenter: &Segmenter, start_index: u64) -> Self {
        let lengths: Vec<u64> = segmenter.iter().map(|s| s.len).collect();
        let segments = (0..lengths.len() as u64)
            .map(|i| {
                if i < start_index {
                    SegmentState::Acked
                } else {
                    SegmentState::Pending
                }
            })
            .collect();
        let resumed_bytes = segmenter
            .segment_at(start_index)
            .map_or(segmenter.size(), |s| s.offset);

        Self {
            inner: RwLock::new(SessionInner {
                id: uuid::Uuid::new_v4().to_string(),
                direction,
                status: TransferStatus::Pending,
                total_bytes: segmenter.size(),
                resumed_bytes,
                acked_bytes: 0,
                attempts: vec![0; lengths.len()],
                segments,
                lengths,
                started_at: None,
                completed_at: None,
                error: String::new(),
            }),
        }
    }

    /// Marks the session as in-progress.
    pub fn start(&self) {
        let mut s = self.inner.write().unwrap();
        s.status = TransferStatus::InProgress;
        s.started_at = Some(Instant::now());
    }

    /// Marks segment `index` as in flight and returns its attempt number
    /// (1-based).
    pub fn begin_attempt(&self, index: u64) -> u32 {
        let mut s = self.inner.write().unwrap();
        let i = index as usize;
        if i >= s.segments.len() {
            return 0;
        }
        s.segments[i] = SegmentState::Sending;
        s.attempts[i] += 1;
        s.attempts[i]
    }

    /// Marks segment `index` acknowledged.
    pub fn ack(&self, index: u64) {
        let mut s = self.inner.write().unwrap();
        let i = index as usize;
        if i >= s.segments.len() || s.segments[i] == SegmentState::Acked {
            return;
        }
        s.segments[i] = SegmentState::Acked;
        s.acked_bytes += s.lengths[i];
    }

    /// Marks the latest attempt of segment `index` as failed.
    pub fn fail_segment(&self, index: u64) {
        let mut s = self.inner.write().unwrap();
        if let Some(state) = s.segments.get_mut(index as usize) {
            *state = SegmentState::Failed;
        }
    }

    /// Marks the session as completed.
    pub fn complete(&self) {
        let mut s = self.inner.write().unwrap();
        s.status = TransferStatus::Completed;
        s.completed_at = Some(Instant::now());
    }

    /// Marks the session as failed with an error message.
    pub fn fail(&self, err: &str) {
        let mut s = self.inner.write().unwrap();
        s.status = TransferStatus::Failed;
        s.error = err.to_string();
        s.completed_at = Some(Instant::now());
    }

    /// Marks the session as cancelled.
    pub fn cancel(&self) {
        let mut s = self.inner.write().unwrap();
        s.status = TransferStatus::Cancelled;
        s.completed_at = Some(Instant::now());
    }

    /// Returns a snapshot of current progress.
    pub fn progress(&self) -> TransferProgress {
        let s = self.inner.read().unwrap();
        TransferProgress {
            transfer_id: s.id.clone(),
            direction: s.direction,
            status: s.status,
            total_bytes: s.total_bytes,
            transferred_bytes: s.resumed_bytes + s.acked_bytes,
            resumed_bytes: s.resumed_bytes,
            segments_total: s.segments.len() as u64,
            segments_done: s
                .segments
                .iter()
                .filter(|st| **st == SegmentState::Acked)
                .count() as u64,
            error: s.error.clone(),
        }
    }

    pub fn id(&self) -> String {
        let s = self.inner.read().unwrap();
        s.id.clone()
    }

    pub fn status(&self) -> TransferStatus {
        let s = self.inner.read().unwrap();
        s.status
    }

    /// Returns `true` if the session is pending or in-progress.
    pub fn is_active(&self) -> bool {
        self.status().is_active()
    }

    /// Returns the state of segment `index`.
    pub fn segment_state(&self, index: u64) -> Option<SegmentState> {
        let s = self.inner.read().unwrap();
        s.segments.get(index as usize).copied()
    }

    /// Attempts made so far for segment `index`.
    pub fn attempts(&self, index: u64) -> u32 {
        let s = self.inner.read().unwrap();
        s.attempts.get(index as usize).copied().unwrap_or(0)
    }

    /// Bytes acknowledged during this session, excluding any resumed prefix.
    pub fn acked_bytes(&self) -> u64 {
        let s = self.inner.read().unwrap();
        s.acked_bytes
    }

    /// Time since [`start`](Self::start), frozen once the session ends.
    pub fn elapsed(&self) -> Duration {
        let s = self.inner.read().unwrap();
        match (s.started_at, s.completed_at) {
            (Some(start), Some(end)) => end.duration_since(start),
            (Some(start), None) => start.elapsed(),
            _ => Duration::ZERO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(start_index: u64) -> TransferSession {
        let seg = Segmenter::new(10, 4).unwrap();
        TransferSession::new(TransferDirection::Upload, &seg, start_index)
    }

    #[test]
    fn new_session_is_pending() {
        let s = session(0);
        assert_eq!(s.status(), TransferStatus::Pending);
        assert!(s.is_active());
        assert_eq!(s.acked_bytes(), 0);
        assert_eq!(s.segment_state(0), Some(SegmentState::Pending));
        assert_eq!(s.segment_state(3), None);
    }

    #[test]
    fn resumed_segments_start_acked() {
        let s = session(2);
        assert_eq!(s.segment_state(1), Some(SegmentState::Acked));
        assert_eq!(s.segment_state(2), Some(SegmentState::Pending));
        let p = s.progress();
        assert_eq!(p.resumed_bytes, 8);
        assert_eq!(p.transferred_bytes, 8);
        assert_eq!(p.segments_done, 2);
    }

    #[test]
    fn segment_lifecycle() {
        let s = session(0);
        s.start();
        assert_eq!(s.begin_attempt(1), 1);
        assert_eq!(s.segment_state(1), Some(SegmentState::Sending));
        s.fail_segment(1);
        assert_eq!(s.segment_state(1), Some(SegmentState::Failed));
        assert_eq!(s.begin_attempt(1), 2);
        s.ack(1);
        assert_eq!(s.segment_state(1), Some(SegmentState::Acked));
        assert_eq!(s.attempts(1), 2);
        assert_eq!(s.acked_bytes(), 4);

        // A duplicate ack does not double count.
        s.ack(1);
        assert_eq!(s.acked_bytes(), 4);
    }

    #[test]
    fn complete_marks_completed() {
        let s = session(0);
        s.start();
        for i in 0..3 {
            s.begin_attempt(i);
            s.ack(i);
        }
        s.complete();
        assert_eq!(s.status(), TransferStatus::Completed);
        assert!(!s.is_active());
        let p = s.progress();
        assert_eq!(p.transferred_bytes, 10);
        assert_eq!(p.segments_done, 3);
    }

    #[test]
    fn fail_records_error() {
        let s = session(0);
        s.start();
        s.fail("provider unreachable");
        assert_eq!(s.status(), TransferStatus::Failed);
        assert_eq!(s.progress().error, "provider unreachable");
    }

    #[test]
    fn cancel_marks_cancelled() {
        let s = session(0);
        s.start();
        s.cancel();
        assert_eq!(s.status(), TransferStatus::Cancelled);
        assert!(!s.is_active());
    }

    #[test]
    fn ids_are_unique() {
        assert_ne!(session(0).id(), session(0).id());
    }

    #[test]
    fn concurrent_access() {
        use std::sync::Arc;
        use std::thread;

        let seg = Segmenter::new(1000, 1).unwrap();
        let session = Arc::new(TransferSession::new(TransferDirection::Download, &seg, 0));
        session.start();

        let mut handles = vec![];

        // 10 writers, 100 segments each.
        for i in 0..10u64 {
            let s = Arc::clone(&session);
            handles.push(thread::spawn(move || {
                for j in 0..100u64 {
                    let index = i * 100 + j;
                    s.begin_attempt(index);
                    s.ack(index);
                }
            }));
        }

        // 10 readers checking progress.
        for _ in 0..10 {
            let s = Arc::clone(&session);
            handles.push(thread::spawn(move || {
                for _ in 0..100 {
                    let _ = s.progress();
                    let _ = s.is_active();
                }
            }));
        }

        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(session.acked_bytes(), 1000);
        assert_eq!(session.progress().segments_done, 1000);
    }
}
