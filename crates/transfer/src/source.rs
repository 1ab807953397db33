//! Byte sources for uploads and the sequential sink for downloads.

use std::fs::{File, OpenOptions};
use std::io::{Cursor, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::TransferError;

/// Random-access object content.
///
/// Segments are read independently so retries always resend identical
/// bytes and parallel workers never share a cursor.
pub trait ObjectSource: Send + Sync {
    /// Total payload size in bytes.
    fn size(&self) -> u64;

    /// Reads exactly `len` bytes starting at `offset`.
    fn read_at(&self, offset: u64, len: u64) -> Result<Vec<u8>, TransferError>;

    /// Opens a sequential reader over the whole payload.
    fn reader(&self) -> Result<Box<dyn Read + Send + '_>, TransferError>;
}

fn check_bounds(size: u64, offset: u64, len: u64) -> Result<(), TransferError> {
    match offset.checked_add(len) {
        Some(end) if end <= size => Ok(()),
        _ => Err(TransferError::InvalidConfiguration(format!(
            "read of {len} bytes at {offset} exceeds source size {size}"
        ))),
    }
}

// ---------------------------------------------------------------------------
// FileSource
// ---------------------------------------------------------------------------

/// A local file, reopened for every read.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
    size: u64,
}

impl FileSource {
    /// Opens `path` and records its current size.
    pub fn open(path: &Path) -> Result<Self, TransferError> {
        let size = std::fs::metadata(path)?.len();
        Ok(Self {
            path: path.to_path_buf(),
            size,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ObjectSource for FileSource {
    fn size(&self) -> u64 {
        self.size
    }

    fn read_at(&self, offset: u64, len: u64) -> Result<Vec<u8>, TransferError> {
        check_bounds(self.size, offset, len)?;
        let mut file = File::open(&self.path)?;
        file.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; len as usize];
        // A short read means the file shrank after `open`.
        file.read_exact(&mut buf)?;
        Ok(buf)
    }

    fn reader(&self) -> Result<Box<dyn Read + Send + '_>, TransferError> {
        let file = File::open(&self.path)?;
        Ok(Box::new(std::io::BufReader::new(file).take(self.size)))
    }
}

// ---------------------------------------------------------------------------
// MemorySource
// ---------------------------------------------------------------------------

/// An in-memory payload.
#[derive(Debug, Clone)]
pub struct MemorySource {
    data: Arc<[u8]>,
}

impl MemorySource {
    pub fn new(data: impl Into<Arc<[u8]>>) -> Self {
        Self { data: data.into() }
    }
}

impl ObjectSource for MemorySource {
    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn read_at(&self, offset: u64, len: u64) -> Result<Vec<u8>, TransferError> {
        check_bounds(self.size(), offset, len)?;
        let start = offset as usize;
        Ok(self.data[start..start + len as usize].to_vec())
    }

    fn reader(&self) -> Result<Box<dyn Read + Send + '_>, TransferError> {
        Ok(Box::new(Cursor::new(&self.data[..])))
    }
}

// ---------------------------------------------------------------------------
// FileSink
// ---------------------------------------------------------------------------

/// Sequential writer for a download destination.
///
/// Bytes past the resume offset are truncated on open so a partially
/// written segment from an earlier run is never mistaken for data.
pub struct FileSink {
    path: PathBuf,
    file: File,
    written: u64,
}

impl FileSink {
    /// Opens `path` for writing from `resume_offset`.
    ///
    /// Fails with [`TransferError::CorruptCheckpoint`] if the file on disk
    /// is shorter than the offset a checkpoint claims was written.
    pub fn open(path: &Path, resume_offset: u64) -> Result<Self, TransferError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;

        let on_disk = file.metadata()?.len();
        if on_disk < resume_offset {
            return Err(TransferError::CorruptCheckpoint {
                offset: resume_offset,
                reason: format!(
                    "destination {} holds only {on_disk} bytes",
                    path.display()
                ),
            });
        }
        file.set_len(resume_offset)?;
        file.seek(SeekFrom::Start(resume_offset))?;

        Ok(Self {
            path: path.to_path_buf(),
            file,
            written: resume_offset,
        })
    }

    /// Appends a segment that must start exactly where the last one ended.
    pub fn write_segment(&mut self, offset: u64, data: &[u8]) -> Result<(), TransferError> {
        if offset != self.written {
            return Err(TransferError::InvalidConfiguration(format!(
                "out-of-order write at {offset}, expected {}",
                self.written
            )));
        }
        self.file.write_all(data)?;
        self.written += data.len() as u64;
        Ok(())
    }

    /// Flushes written bytes to stable storage.
    pub fn sync(&mut self) -> Result<(), TransferError> {
        self.file.flush()?;
        self.file.sync_data()?;
        Ok(())
    }

    /// Bytes written so far, resumed prefix included.
    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
