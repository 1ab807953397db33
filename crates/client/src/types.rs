use std::path::PathBuf;
use std::time::Duration;

use gnfd_transfer::{
    TransferDirection, TransferError, TransferProgress, validate_bucket_name, validate_object_name,
};
use gnfd_types::constants::CONTENT_DEFAULT;
use gnfd_types::{ByteRange, IntegrityHashSet, RedundancyParams};

/// Immutable description of one object transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferDescriptor {
    pub bucket: String,
    pub object: String,
    /// Total payload size in bytes.
    pub size: u64,
    /// Effective part size, never larger than `size` (except for empty
    /// objects, where it stays at the configured value).
    pub part_size: u64,
    pub redundancy: RedundancyParams,
    pub content_type: String,
}

impl TransferDescriptor {
    /// Validates names and clamps the part size to the object size.
    pub fn new(
        bucket: &str,
        object: &str,
        size: u64,
        part_size: u64,
        redundancy: RedundancyParams,
    ) -> Result<Self, TransferError> {
        validate_bucket_name(bucket)?;
        validate_object_name(object)?;
        if part_size == 0 {
            return Err(TransferError::InvalidConfiguration(
                "part size must be greater than zero".into(),
            ));
        }
        let part_size = if size > 0 { part_size.min(size) } else { part_size };
        Ok(Self {
            bucket: bucket.to_string(),
            object: object.to_string(),
            size,
            part_size,
            redundancy,
            content_type: CONTENT_DEFAULT.to_string(),
        })
    }

    pub fn with_content_type(mut self, content_type: &str) -> Self {
        self.content_type = content_type.to_string();
        self
    }
}

/// Events emitted while a transfer runs.
#[derive(Debug, Clone)]
pub enum TransferEvent {
    Started {
        transfer_id: String,
        direction: TransferDirection,
        total_bytes: u64,
        resume_offset: u64,
    },
    Progress {
        transfer_id: String,
        progress: TransferProgress,
        bytes_per_second: f64,
        eta: Option<Duration>,
    },
    SegmentRetry {
        transfer_id: String,
        segment: u64,
        attempt: u32,
        error: String,
    },
    CheckpointSaved {
        transfer_id: String,
        offset: u64,
    },
    Completed {
        transfer_id: String,
    },
    Failed {
        transfer_id: String,
        error: String,
    },
}

/// Result of a successful `put_object`.
#[derive(Debug, Clone)]
pub struct UploadOutcome {
    pub object_id: String,
    pub integrity: IntegrityHashSet,
    /// Segments sent by this call (resumed segments excluded).
    pub segments_sent: u64,
    /// Payload bytes sent by this call.
    pub bytes_sent: u64,
    /// Offset this call resumed from.
    pub resumed_from: u64,
    /// A checkpoint existed but could not be trusted and was discarded.
    pub restarted_from_corrupt_checkpoint: bool,
    pub progress: TransferProgress,
}

/// Result of a successful `download_to_file`.
#[derive(Debug, Clone)]
pub struct DownloadOutcome {
    pub path: PathBuf,
    /// Absolute object range written to `path`. `None` for empty objects.
    pub range: Option<ByteRange>,
    pub bytes_written: u64,
    pub segments_fetched: u64,
    pub resumed_from: u64,
    pub restarted_from_corrupt_checkpoint: bool,
    pub progress: TransferProgress,
}

/// Result of `create_object`.
#[derive(Debug, Clone)]
pub struct CreateObjectResult {
    pub tx_hash: String,
    pub integrity: IntegrityHashSet,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_clamps_part_size() {
        let mib = 1024 * 1024;
        let p = RedundancyParams::default();
        let d = TransferDescriptor::new("bucket", "obj", 20 * mib, 32 * mib, p).unwrap();
        assert_eq!(d.part_size, 20 * mib);
        assert_eq!(d.content_type, CONTENT_DEFAULT);

        let empty = TransferDescriptor::new("bucket", "obj", 0, 32 * mib, p).unwrap();
        assert_eq!(empty.part_size, 32 * mib);
    }

    #[test]
    fn descriptor_validates_names() {
        let p = RedundancyParams::default();
        assert!(TransferDescriptor::new("B", "obj", 1, 1, p).is_err());
        assert!(TransferDescriptor::new("bucket", "", 1, 1, p).is_err());
        assert!(TransferDescriptor::new("bucket", "obj", 1, 0, p).is_err());
    }
}
