//! Durable resume points for interrupted transfers.
//!
//! A checkpoint records how many bytes of a transfer are known to be done.
//! Files live under a caller-chosen directory, one per transfer key, named
//! by the first 16 bytes of the SHA-256 of the key. Writes go through a
//! temporary file and a rename so a crash never leaves a torn record.

use std::collections::HashMap;
use std::fmt;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use gnfd_types::ByteRange;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::TransferError;

const CHECKPOINT_EXT: &str = "ckpt";
const TEMP_EXT: &str = "ckpt.tmp";

/// Which way the bytes flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferDirection {
    Upload,
    Download,
}

impl fmt::Display for TransferDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Upload => f.write_str("upload"),
            Self::Download => f.write_str("download"),
        }
    }
}

/// Identity of a transfer for checkpoint purposes.
///
/// The part size is part of the identity: changing it addresses a different
/// record, so a stale checkpoint is never applied to new segment boundaries.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TransferKey {
    pub direction: TransferDirection,
    pub bucket: String,
    pub object: String,
    pub part_size: u64,
    /// Requested sub-range (downloads only).
    pub range: Option<ByteRange>,
}

impl TransferKey {
    pub fn upload(bucket: &str, object: &str, part_size: u64) -> Self {
        Self {
            direction: TransferDirection::Upload,
            bucket: bucket.to_string(),
            object: object.to_string(),
            part_size,
            range: None,
        }
    }

    pub fn download(bucket: &str, object: &str, part_size: u64, range: Option<ByteRange>) -> Self {
        Self {
            direction: TransferDirection::Download,
            bucket: bucket.to_string(),
            object: object.to_string(),
            part_size,
            range,
        }
    }

    /// Stable textual form hashed into the file name.
    pub fn canonical(&self) -> String {
        let range = match self.range {
            Some(r) => r.to_string(),
            None => "full".to_string(),
        };
        format!(
            "{}\n{}\n{}\n{}\n{}",
            self.direction, self.bucket, self.object, self.part_size, range
        )
    }

    /// 32 hex characters derived from [`canonical`](Self::canonical).
    pub fn file_stem(&self) -> String {
        let hash = Sha256::digest(self.canonical().as_bytes());
        hex::encode(&hash[..16])
    }
}

/// A persisted resume point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    pub bucket: String,
    pub object: String,
    pub part_size: u64,
    /// Length of the whole transfer (object size, or range length).
    pub total_len: u64,
    /// Bytes done, counted from the start of the transfer.
    pub offset: u64,
}

impl Checkpoint {
    pub fn new(key: &TransferKey, total_len: u64, offset: u64) -> Self {
        Self {
            bucket: key.bucket.clone(),
            object: key.object.clone(),
            part_size: key.part_size,
            total_len,
            offset,
        }
    }

    /// Checks the record against the transfer about to resume.
    ///
    /// The offset must be a whole number of parts, or exactly the total.
    pub fn validate(&self, key: &TransferKey, total_len: u64) -> Result<(), TransferError> {
        let corrupt = |reason: String| TransferError::CorruptCheckpoint {
            offset: self.offset,
            reason,
        };
        if self.bucket != key.bucket || self.object != key.object {
            return Err(corrupt(format!(
                "record belongs to {}/{}",
                self.bucket, self.object
            )));
        }
        if self.part_size != key.part_size || self.part_size == 0 {
            return Err(corrupt(format!(
                "part size {} does not match {}",
                self.part_size, key.part_size
            )));
        }
        if self.total_len != total_len {
            return Err(corrupt(format!(
                "recorded length {} does not match {total_len}",
                self.total_len
            )));
        }
        if self.offset > total_len {
            return Err(corrupt(format!("offset exceeds length {total_len}")));
        }
        if self.offset != total_len && self.offset % self.part_size != 0 {
            return Err(corrupt(format!(
                "offset is not aligned to part size {}",
                self.part_size
            )));
        }
        Ok(())
    }
}

/// Persistence for checkpoints.
///
/// Only one active transfer may use a given key at a time; stores do not
/// coordinate concurrent writers.
pub trait CheckpointStore: Send + Sync {
    /// Returns the last committed checkpoint, if any.
    ///
    /// An unreadable record yields [`TransferError::CorruptCheckpoint`].
    fn load(&self, key: &TransferKey) -> Result<Option<Checkpoint>, TransferError>;

    /// Atomically replaces the checkpoint for `key`.
    fn save(&self, key: &TransferKey, checkpoint: &Checkpoint) -> Result<(), TransferError>;

    /// Removes the checkpoint for `key`. Missing records are not an error.
    fn clear(&self, key: &TransferKey) -> Result<(), TransferError>;
}

/// Where a transfer should pick up.
#[derive(Debug)]
pub struct ResumePoint {
    /// Trusted byte offset to resume from.
    pub offset: u64,
    /// The rejected record, when a corrupt checkpoint forced a restart.
    pub discarded: Option<TransferError>,
}

/// Loads and validates the checkpoint for `key`.
///
/// Corrupt or mismatched records are cleared and reported through
/// [`ResumePoint::discarded`]; the transfer restarts from zero.
pub fn resolve_resume_point(
    store: &dyn CheckpointStore,
    key: &TransferKey,
    total_len: u64,
) -> Result<ResumePoint, TransferError> {
    let outcome = match store.load(key) {
        Ok(None) => {
            return Ok(ResumePoint {
                offset: 0,
                discarded: None,
            });
        }
        Ok(Some(cp)) => cp.validate(key, total_len).map(|()| cp.offset),
        Err(e @ TransferError::CorruptCheckpoint { .. }) => Err(e),
        Err(e) => return Err(e),
    };

    match outcome {
        Ok(offset) => {
            debug!(
                bucket = %key.bucket,
                object = %key.object,
                direction = %key.direction,
                offset,
                "resuming from checkpoint"
            );
            Ok(ResumePoint {
                offset,
                discarded: None,
            })
        }
        Err(e) => {
            warn!(
                bucket = %key.bucket,
                object = %key.object,
                direction = %key.direction,
                error = %e,
                "discarding corrupt checkpoint, restarting from zero"
            );
            store.clear(key)?;
            Ok(ResumePoint {
                offset: 0,
                discarded: Some(e),
            })
        }
    }
}

// ---------------------------------------------------------------------------
// FileCheckpointStore
// ---------------------------------------------------------------------------

/// Stores each checkpoint as a small JSON file in a directory.
#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    dir: PathBuf,
}

impl FileCheckpointStore {
    /// Opens a store rooted at `dir`, creating the directory if needed.
    pub fn new(dir: &Path) -> Result<Self, TransferError> {
        std::fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    /// Returns the store directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the checkpoint file path for `key`.
    pub fn path_for(&self, key: &TransferKey) -> PathBuf {
        self.dir
            .join(format!("{}.{CHECKPOINT_EXT}", key.file_stem()))
    }

    fn temp_path_for(&self, key: &TransferKey) -> PathBuf {
        self.dir.join(format!("{}.{TEMP_EXT}", key.file_stem()))
    }
}

impl CheckpointStore for FileCheckpointStore {
    fn load(&self, key: &TransferKey) -> Result<Option<Checkpoint>, TransferError> {
        let path = self.path_for(key);
        let data = match std::fs::read(&path) {
            Ok(d) => d,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_slice(&data)
            .map(Some)
            .map_err(|e| TransferError::CorruptCheckpoint {
                offset: 0,
                reason: format!("unreadable record {}: {e}", path.display()),
            })
    }

    fn save(&self, key: &TransferKey, checkpoint: &Checkpoint) -> Result<(), TransferError> {
        let data = serde_json::to_vec(checkpoint).map_err(std::io::Error::other)?;
        let tmp = self.temp_path_for(key);
        {
            let mut file = std::fs::File::create(&tmp)?;
            file.write_all(&data)?;
            file.sync_all()?;
        }
        std::fs::rename(&tmp, self.path_for(key))?;
        Ok(())
    }

    fn clear(&self, key: &TransferKey) -> Result<(), TransferError> {
        for path in [self.path_for(key), self.temp_path_for(key)] {
            match std::fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MemoryCheckpointStore
// ---------------------------------------------------------------------------

/// Non-durable store for callers that do not need resume across processes.
///
/// Keeps every saved offset per key so progress history can be inspected.
#[derive(Debug, Default)]
pub struct MemoryCheckpointStore {
    inner: Mutex<HashMap<TransferKey, (Checkpoint, Vec<u64>)>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every offset saved for `key`, oldest first. Empty after `clear`.
    pub fn history(&self, key: &TransferKey) -> Vec<u64> {
        let inner = self.inner.lock().unwrap();
        inner
            .get(key)
            .map(|(_, history)| history.clone())
            .unwrap_or_default()
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    fn load(&self, key: &TransferKey) -> Result<Option<Checkpoint>, TransferError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.get(key).map(|(cp, _)| cp.clone()))
    }

    fn save(&self, key: &TransferKey, checkpoint: &Checkpoint) -> Result<(), TransferError> {
        let mut inner = self.inner.lock().unwrap();
        let entry = inner
            .entry(key.clone())
            .or_insert_with(|| (checkpoint.clone(), Vec::new()));
        entry.0 = checkpoint.clone();
        entry.1.push(checkpoint.offset);
        Ok(())
    }

    fn clear(&self, key: &TransferKey) -> Result<(), TransferError> {
        let mut inner = self.inner.lock().unwrap();
        inner.remove(key);
        Ok(())
    }
}
