//! Per-segment attempt loop shared by both orchestrators.

use std::future::Future;
use std::time::Duration;

use gnfd_transfer::{RetryPolicy, Segment, TransferDirection, TransferError, TransferSession};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::fault::FaultInjector;
use crate::types::TransferEvent;

/// Runs the attempts of one segment under a retry policy.
pub(crate) struct SegmentRunner<'a> {
    pub direction: TransferDirection,
    pub retry: RetryPolicy,
    pub timeout: Duration,
    pub faults: &'a dyn FaultInjector,
    pub session: Option<&'a TransferSession>,
    pub events: Option<&'a mpsc::Sender<TransferEvent>>,
}

impl SegmentRunner<'_> {
    /// Calls `op` until it succeeds or the policy gives up.
    ///
    /// Every attempt first consults the fault injector and is bounded by the
    /// request timeout. Exhausted provider/network failures come back as
    /// [`TransferError::TransferAborted`]; anything else (integrity
    /// mismatch, local I/O) is returned unchanged.
    pub async fn run<T, F, Fut>(&self, segment: Segment, mut op: F) -> Result<T, TransferError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, TransferError>>,
    {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            if let Some(session) = self.session {
                session.begin_attempt(segment.index);
            }

            let result = match self
                .faults
                .before_attempt(self.direction, segment.index, attempt)
            {
                Some(err) => Err(err),
                None => match tokio::time::timeout(self.timeout, op()).await {
                    Ok(result) => result,
                    Err(_) => Err(TransferError::Timeout(self.timeout)),
                },
            };

            let err = match result {
                Ok(value) => {
                    debug!(
                        direction = %self.direction,
                        segment = segment.index,
                        attempt,
                        "segment done"
                    );
                    return Ok(value);
                }
                Err(err) => err,
            };

            if self.retry.should_retry(attempt, &err) {
                let delay = self.retry.delay_for_attempt(attempt);
                warn!(
                    direction = %self.direction,
                    segment = segment.index,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "segment attempt failed, retrying"
                );
                if let (Some(tx), Some(session)) = (self.events, self.session) {
                    let _ = tx.try_send(TransferEvent::SegmentRetry {
                        transfer_id: session.id(),
                        segment: segment.index,
                        attempt,
                        error: err.to_string(),
                    });
                }
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                continue;
            }

            if let Some(session) = self.session {
                session.fail_segment(segment.index);
            }
            return Err(match err {
                TransferError::Network(_)
                | TransferError::Timeout(_)
                | TransferError::Provider { .. } => TransferError::TransferAborted {
                    segment: segment.index,
                    offset: segment.offset,
                    attempts: attempt,
                    source: Box::new(err),
                },
                other => other,
            });
        }
    }
}
