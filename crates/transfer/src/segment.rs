use crate::TransferError;

/// A contiguous byte range of an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    /// Zero-based position in the object.
    pub index: u64,
    /// Byte offset of the first byte.
    pub offset: u64,
    /// Length in bytes. Equal to the part size except for the last segment.
    pub len: u64,
}

impl Segment {
    /// Offset one past the last byte.
    pub fn end(&self) -> u64 {
        self.offset + self.len
    }
}

/// Splits an object of `size` bytes into `part_size` segments.
///
/// The segmenter holds no content, only arithmetic, so iteration can be
/// restarted from any index without touching earlier segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segmenter {
    size: u64,
    part_size: u64,
}

impl Segmenter {
    /// Creates a segmenter. `part_size` must be in `1..=size`.
    pub fn new(size: u64, part_size: u64) -> Result<Self, TransferError> {
        if part_size == 0 {
            return Err(TransferError::InvalidConfiguration(
                "part size must be greater than zero".into(),
            ));
        }
        if part_size > size {
            return Err(TransferError::InvalidConfiguration(format!(
                "part size {part_size} exceeds object size {size}"
            )));
        }
        Ok(Self { size, part_size })
    }

    /// Total object size in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Configured part size in bytes.
    pub fn part_size(&self) -> u64 {
        self.part_size
    }

    /// Number of segments.
    pub fn segment_count(&self) -> u64 {
        self.size.div_ceil(self.part_size)
    }

    /// Returns the segment at `index`, or `None` past the end.
    pub fn segment_at(&self, index: u64) -> Option<Segment> {
        let offset = index.checked_mul(self.part_size)?;
        if offset >= self.size {
            return None;
        }
        Some(Segment {
            index,
            offset,
            len: (self.size - offset).min(self.part_size),
        })
    }

    /// Index of the segment starting at `offset`.
    ///
    /// Only part-aligned offsets map to a segment; the total size maps to
    /// `segment_count()` (nothing left to send).
    pub fn index_for_offset(&self, offset: u64) -> Option<u64> {
        if offset == self.size {
            return Some(self.segment_count());
        }
        if offset > self.size || offset % self.part_size != 0 {
            return None;
        }
        Some(offset / self.part_size)
    }

    /// Returns `true` if a resume at `offset` would start on a segment boundary.
    pub fn is_boundary(&self, offset: u64) -> bool {
        self.index_for_offset(offset).is_some()
    }

    /// Iterates over every segment.
    pub fn iter(&self) -> Segments {
        self.iter_from(0)
    }

    /// Iterates starting at segment `index`.
    pub fn iter_from(&self, index: u64) -> Segments {
        Segments {
            segmenter: *self,
            next: index,
        }
    }
}

/// Lazy iterator over the segments of a [`Segmenter`].
#[derive(Debug, Clone)]
pub struct Segments {
    segmenter: Segmenter,
    next: u64,
}

impl Iterator for Segments {
    type Item = Segment;

    fn next(&mut self) -> Option<Segment> {
        let seg = self.segmenter.segment_at(self.next)?;
        self.next += 1;
        Some(seg)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.segmenter.segment_count().saturating_sub(self.next) as usize;
        (left, Some(left))
    }
}

impl ExactSizeIterator for Segments {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_bad_part_size() {
        assert!(matches!(
            Segmenter::new(10, 0),
            Err(TransferError::InvalidConfiguration(_))
        ));
        assert!(matches!(
            Segmenter::new(10, 11),
            Err(TransferError::InvalidConfiguration(_))
        ));
        assert!(Segmenter::new(10, 10).is_ok());
    }

    #[test]
    fn last_segment_is_remainder() {
        let s = Segmenter::new(10, 4).unwrap();
        let segs: Vec<_> = s.iter().collect();
        assert_eq!(segs.len(), 3);
        assert_eq!(
            segs[0],
            Segment {
                index: 0,
                offset: 0,
                len: 4
            }
        );
        assert_eq!(
            segs[2],
            Segment {
                index: 2,
                offset: 8,
                len: 2
            }
        );
    }

    #[test]
    fn evenly_divisible_last_segment_is_full() {
        let s = Segmenter::new(12, 4).unwrap();
        let segs: Vec<_> = s.iter().collect();
        assert_eq!(segs.len(), 3);
        assert_eq!(segs[2].len, 4);
        assert_eq!(segs[2].end(), 12);
    }

    #[test]
    fn lengths_sum_to_size() {
        for size in [1u64, 2, 7, 100, 1023, 1024, 1025, 4096 * 3 + 17] {
            for part in [1u64, 3, 64, 1024] {
                if part > size {
                    continue;
                }
                let s = Segmenter::new(size, part).unwrap();
                let segs: Vec<_> = s.iter().collect();
                assert_eq!(segs.len() as u64, s.segment_count());
                assert_eq!(segs.iter().map(|x| x.len).sum::<u64>(), size);
                let (last, rest) = segs.split_last().unwrap();
                assert!(rest.iter().all(|x| x.len == part));
                assert!(last.len > 0 && last.len <= part);
            }
        }
    }

    #[test]
    fn restart_from_index() {
        let s = Segmenter::new(10, 4).unwrap();
        let segs: Vec<_> = s.iter_from(1).collect();
        assert_eq!(segs.len(), 2);
        assert_eq!(segs[0].index, 1);
        assert_eq!(segs[0].offset, 4);
        assert_eq!(s.iter_from(3).count(), 0);
        assert_eq!(s.iter_from(u64::MAX).count(), 0);
    }

    #[test]
    fn offset_mapping() {
        let s = Segmenter::new(10, 4).unwrap();
        assert_eq!(s.index_for_offset(0), Some(0));
        assert_eq!(s.index_for_offset(8), Some(2));
        assert_eq!(s.index_for_offset(10), Some(3));
        assert_eq!(s.index_for_offset(5), None);
        assert_eq!(s.index_for_offset(12), None);
        assert!(!s.is_boundary(6));
    }

    #[test]
    fn size_hint_is_exact() {
        let s = Segmenter::new(10, 4).unwrap();
        let mut it = s.iter();
        assert_eq!(it.len(), 3);
        it.next();
        assert_eq!(it.len(), 2);
    }
}
