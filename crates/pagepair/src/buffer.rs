//! Stream buffers: ordered page queues that only ever shrink from the front.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::page::{PageImages, PageRecord, PageSummary};

/// Which input stream a page belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stream {
    Original,
    Overlay,
}

impl Stream {
    pub fn label(self) -> &'static str {
        match self {
            Self::Original => "original",
            Self::Overlay => "overlay",
        }
    }
}

/// Append-at-back, prune-at-front queue of page records.
///
/// Sequence indices are assigned by the buffer's own monotonic counter and
/// strictly increase from front to back.
#[derive(Debug)]
pub struct StreamBuffer {
    stream: Stream,
    records: VecDeque<PageRecord>,
    next_index: u64,
}

impl StreamBuffer {
    pub fn new(stream: Stream) -> Self {
        Self {
            stream,
            records: VecDeque::new(),
            next_index: 0,
        }
    }

    pub fn stream(&self) -> Stream {
        self.stream
    }

    /// Index the next pushed record will receive.
    pub fn next_index(&self) -> u64 {
        self.next_index
    }

    /// Append a normalized page and return its sequence index.
    pub fn push_back(&mut self, images: PageImages) -> u64 {
        let index = self.next_index;
        self.next_index += 1;
        self.records.push_back(PageRecord::new(index, images));
        index
    }

    /// Remove the `n` oldest records (clamped to the resident count).
    pub fn drop_prefix(&mut self, n: usize) {
        let n = n.min(self.records.len());
        self.records.drain(..n);
    }

    pub fn pop_front(&mut self) -> Option<PageRecord> {
        self.records.pop_front()
    }

    pub fn at(&self, i: usize) -> Option<&PageRecord> {
        self.records.get(i)
    }

    pub(crate) fn at_mut(&mut self, i: usize) -> Option<&mut PageRecord> {
        self.records.get_mut(i)
    }

    pub fn front(&self) -> Option<&PageRecord> {
        self.records.front()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Working position of a resident record.
    pub fn position_of(&self, sequence_index: u64) -> Option<usize> {
        self.records
            .iter()
            .position(|r| r.sequence_index() == sequence_index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PageRecord> {
        self.records.iter()
    }

    pub fn summaries(&self) -> Vec<PageSummary> {
        self.records.iter().map(PageRecord::summary).collect()
    }

    /// Drop every record and rewind the counter.
    pub fn clear(&mut self) {
        self.records.clear();
        self.next_index = 0;
    }
}
