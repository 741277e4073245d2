//! Per-watcher record of signatures that were already reported.
//!
//! Unbounded by default: entries live as long as the watcher. With a
//! capacity the oldest inserted signature is evicted first, so a signature
//! older than the last `capacity` inserts could be reported again.

use crate::types::SignatureRef;
use lru::LruCache;
use std::num::NonZeroUsize;

pub struct SeenSet {
    entries: LruCache<SignatureRef, ()>,
    capacity: Option<NonZeroUsize>,
}

impl SeenSet {
    pub fn unbounded() -> Self {
        Self {
            entries: LruCache::unbounded(),
            capacity: None,
        }
    }

    pub fn with_capacity(capacity: NonZeroUsize) -> Self {
        Self {
            entries: LruCache::new(capacity),
            capacity: Some(capacity),
        }
    }

    /// `0` means unbounded
    pub fn from_capacity(capacity: usize) -> Self {
        match NonZeroUsize::new(capacity) {
            Some(cap) => Self::with_capacity(cap),
            None => Self::unbounded(),
        }
    }

    /// Membership check; does not refresh recency
    pub fn contains(&self, signature: &SignatureRef) -> bool {
        self.entries.contains(signature)
    }

    pub fn mark_seen(&mut self, signature: SignatureRef) {
        self.entries.put(signature, ());
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity.map(NonZeroUsize::get)
    }
}

impl Default for SeenSet {
    fn default() -> Self {
        Self::unbounded()
    }
}
