//! Inclusive byte ranges as carried by the HTTP `Range` header.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Errors produced when building or parsing a [`ByteRange`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RangeError {
    #[error("range start {start} is after end {end}")]
    Inverted { start: u64, end: u64 },

    #[error("range end {end} is outside an object of {size} bytes")]
    OutOfBounds { end: u64, size: u64 },

    #[error("malformed range header: {0}")]
    Malformed(String),
}

/// An inclusive byte range `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    /// Creates a range, rejecting `start > end`.
    pub fn new(start: u64, end: u64) -> Result<Self, RangeError> {
        if start > end {
            return Err(RangeError::Inverted { start, end });
        }
        Ok(Self { start, end })
    }

    /// The range covering a whole object. `None` for empty objects.
    pub fn full(size: u64) -> Option<Self> {
        if size == 0 {
            None
        } else {
            Some(Self {
                start: 0,
                end: size - 1,
            })
        }
    }

    /// Number of bytes covered.
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Always `false`: an inclusive range covers at least one byte.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Checks that the range fits in an object of `size` bytes.
    pub fn check_within(&self, size: u64) -> Result<(), RangeError> {
        if self.end >= size {
            return Err(RangeError::OutOfBounds {
                end: self.end,
                size,
            });
        }
        Ok(())
    }

    /// Sub-range starting `offset` bytes into this range, at most `len` long.
    ///
    /// Returns `None` when `offset` is past the end or `len` is zero.
    pub fn sub_range(&self, offset: u64, len: u64) -> Option<Self> {
        if offset >= self.len() || len == 0 {
            return None;
        }
        let start = self.start + offset;
        let end = (start + len - 1).min(self.end);
        Some(Self { start, end })
    }

    /// Value for the HTTP `Range` header, e.g. `bytes=0-1023`.
    pub fn header_value(&self) -> String {
        format!("bytes={}-{}", self.start, self.end)
    }

    /// Parses a `bytes=<start>-<end>` header value.
    pub fn parse_header(value: &str) -> Result<Self, RangeError> {
        let bounds = value
            .trim()
            .strip_prefix("bytes=")
            .ok_or_else(|| RangeError::Malformed(value.to_string()))?;
        let (start, end) = bounds
            .split_once('-')
            .ok_or_else(|| RangeError::Malformed(value.to_string()))?;
        let start: u64 = start
            .trim()
            .parse()
            .map_err(|_| RangeError::Malformed(value.to_string()))?;
        let end: u64 = end
            .trim()
            .parse()
            .map_err(|_| RangeError::Malformed(value.to_string()))?;
        Self::new(start, end)
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}
