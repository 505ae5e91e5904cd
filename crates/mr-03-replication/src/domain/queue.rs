//! Bounded per-peer queue of fingerprints awaiting sync.

use std::collections::VecDeque;

use shared_types::Fingerprint;

/// FIFO of distinct fingerprints. A full queue drops its oldest hint; the next
/// periodic advertisement brings it back.
#[derive(Debug, Clone)]
pub struct SyncQueue {
    items: VecDeque<Fingerprint>,
    capacity: usize,
    dropped: u64,
}

impl SyncQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            items: VecDeque::new(),
            capacity: capacity.max(1),
            dropped: 0,
        }
    }

    /// Queue `fingerprint` unless already queued. Returns `true` if it was added.
    pub fn push(&mut self, fingerprint: Fingerprint) -> bool {
        if self.items.contains(&fingerprint) {
            return false;
        }
        if self.items.len() == self.capacity {
            self.items.pop_front();
            self.dropped += 1;
        }
        self.items.push_back(fingerprint);
        true
    }

    pub fn pop(&mut self) -> Option<Fingerprint> {
        self.items.pop_front()
    }

    /// Take up to `n` items from the front.
    pub fn take(&mut self, n: usize) -> Vec<Fingerprint> {
        let n = n.min(self.items.len());
        self.items.drain(..n).collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Hints lost to overflow since creation.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}
