use std::collections::BTreeSet;

use crate::segment::Segmenter;

/// Contiguous acknowledgement high-water mark.
///
/// Segments may complete in any order, but the offset only advances across
/// an unbroken prefix of acknowledged segments. The offset is the byte
/// offset of the first segment not yet acknowledged, or the total size once
/// everything is done.
#[derive(Debug, Clone)]
pub struct AckWatermark {
    segmenter: Segmenter,
    next_index: u64,
    early: BTreeSet<u64>,
}

impl AckWatermark {
    /// Starts tracking with every segment before `start_index` already done.
    pub fn new(segmenter: Segmenter, start_index: u64) -> Self {
        Self {
            segmenter,
            next_index: start_index.min(segmenter.segment_count()),
            early: BTreeSet::new(),
        }
    }

    /// Records an acknowledgement for segment `index`.
    ///
    /// Returns the new offset when the contiguous prefix grew, `None` when
    /// the segment is still waiting on a lower index (or was already counted).
    pub fn ack(&mut self, index: u64) -> Option<u64> {
        if index < self.next_index || index >= self.segmenter.segment_count() {
            return None;
        }
        self.early.insert(index);

        let before = self.next_index;
        while self.early.remove(&self.next_index) {
            self.next_index += 1;
        }
        (self.next_index != before).then(|| self.offset())
    }

    /// Current contiguous byte offset.
    pub fn offset(&self) -> u64 {
        self.segmenter
            .segment_at(self.next_index)
            .map_or(self.segmenter.size(), |s| s.offset)
    }

    /// Index of the lowest segment not yet acknowledged.
    pub fn next_index(&self) -> u64 {
        self.next_index
    }

    /// Returns `true` once every segment is acknowledged.
    pub fn is_complete(&self) -> bool {
        self.next_index >= self.segmenter.segment_count()
    }
}
