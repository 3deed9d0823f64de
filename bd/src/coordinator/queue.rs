//! WorkQueue - FIFO holding area for admitted requests

use std::collections::VecDeque;

use crate::domain::Request;

/// Ordered, size-aware queue of admitted requests
///
/// Insertion order is dispatch priority. The running byte total is kept in
/// step with every mutation so depth and size are O(1) to report. Polls carry
/// any declared size, so the total is held wide enough that no sequence of
/// `u64` sizes can overflow it.
#[derive(Debug, Default)]
pub struct WorkQueue {
    entries: VecDeque<Request>,
    total_bytes: u128,
}

impl WorkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert at the tail
    pub fn append(&mut self, request: Request) {
        self.total_bytes += u128::from(request.byte_size());
        self.entries.push_back(request);
    }

    /// Remove and return the longest head prefix of at most `max_count`
    /// entries whose cumulative byte size fits in `max_bytes`
    ///
    /// Stops at the first entry that would overflow the cap; later, smaller
    /// entries are never pulled forward. An oversized head yields an empty
    /// prefix.
    pub fn extract_capped_prefix(&mut self, max_count: usize, max_bytes: u64) -> Vec<Request> {
        let mut taken = 0;
        let mut bytes: u64 = 0;

        for request in self.entries.iter().take(max_count) {
            let next = bytes.saturating_add(request.byte_size());
            if next > max_bytes {
                break;
            }
            bytes = next;
            taken += 1;
        }

        self.total_bytes -= u128::from(bytes);
        self.entries.drain(..taken).collect()
    }

    /// Remove and return the head entry regardless of its size
    pub fn pop_front(&mut self) -> Option<Request> {
        let request = self.entries.pop_front()?;
        self.total_bytes -= u128::from(request.byte_size());
        Some(request)
    }

    /// Remove every entry matching `predicate`, keeping survivors in order
    ///
    /// Returns the number of entries removed.
    pub fn remove_matching<F>(&mut self, mut predicate: F) -> usize
    where
        F: FnMut(&Request) -> bool,
    {
        let before = self.entries.len();
        let mut removed_bytes: u128 = 0;
        self.entries.retain(|request| {
            if predicate(request) {
                removed_bytes += u128::from(request.byte_size());
                false
            } else {
                true
            }
        });
        self.total_bytes -= removed_bytes;
        before - self.entries.len()
    }

    /// Reinsert a previously extracted batch ahead of everything queued,
    /// preserving the batch's internal order
    pub fn push_front(&mut self, batch: Vec<Request>) {
        for request in batch.into_iter().rev() {
            self.total_bytes += u128::from(request.byte_size());
            self.entries.push_front(request);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of byte sizes of everything queued, pinned at `u64::MAX`
    pub fn total_bytes(&self) -> u64 {
        u64::try_from(self.total_bytes).unwrap_or(u64::MAX)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Request> {
        self.entries.iter()
    }
}
