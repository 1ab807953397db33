//! Resumable, integrity-verified object transfer primitives.
//!
//! This crate holds everything a transfer needs that does not touch the
//! network: splitting an object into segments, computing the erasure-coded
//! integrity roots the chain authorizes, persisting resume checkpoints, and
//! tracking per-segment state while orchestrators drive the I/O.

mod checkpoint;
mod integrity;
mod progress;
mod retry;
mod segment;
mod session;
mod source;
mod validation;
mod watermark;

pub use checkpoint::{
    Checkpoint, CheckpointStore, FileCheckpointStore, MemoryCheckpointStore, ResumePoint,
    TransferDirection, TransferKey, resolve_resume_point,
};
pub use integrity::{IntegrityHasher, encode_pieces, segment_checksum};
pub use progress::{SpeedCalculator, TransferProgress};
pub use retry::RetryPolicy;
pub use segment::{Segment, Segmenter, Segments};
pub use session::{SegmentState, TransferSession};
pub use source::{FileSink, FileSource, MemorySource, ObjectSource};
pub use validation::{validate_bucket_name, validate_object_name};
pub use watermark::AckWatermark;

/// Errors produced while transferring an object.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    /// Bad part size, shard counts, names or ranges. Nothing was started.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Local read/write failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Connection-level failure talking to a storage provider.
    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Non-success response from a storage provider.
    #[error("storage provider returned {status} {code}: {message}")]
    Provider {
        status: u16,
        code: String,
        message: String,
    },

    /// A persisted checkpoint cannot be trusted. Callers restart from zero.
    #[error("corrupt checkpoint at offset {offset}: {reason}")]
    CorruptCheckpoint { offset: u64, reason: String },

    /// A segment exhausted its attempt budget. The checkpoint is preserved.
    #[error("transfer aborted at segment {segment} (offset {offset}) after {attempts} attempts: {source}")]
    TransferAborted {
        segment: u64,
        offset: u64,
        attempts: u32,
        #[source]
        source: Box<TransferError>,
    },

    /// The provider rejected the payload hash. Resending cannot help.
    #[error("integrity mismatch on segment {segment}: {detail}")]
    IntegrityMismatch { segment: u64, detail: String },

    /// The chain service failed or returned unusable data.
    #[error("chain error: {0}")]
    Chain(String),

    #[error("cancelled")]
    Cancelled,
}

impl TransferError {
    /// Returns `true` for failures that may succeed when the same request
    /// is sent again.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout(_) => true,
            Self::Provider { status, .. } => *status == 408 || *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

impl From<gnfd_types::RangeError> for TransferError {
    fn from(e: gnfd_types::RangeError) -> Self {
        Self::InvalidConfiguration(e.to_string())
    }
}

impl From<reed_solomon_erasure::Error> for TransferError {
    fn from(e: reed_solomon_erasure::Error) -> Self {
        Self::InvalidConfiguration(format!("erasure coding: {e:?}"))
    }
}
