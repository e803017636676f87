//! Time-windowed duplicate suppression for flooded payloads
//!
//! A fixed ring of `(hash, timestamp)` slots. Every node hears every other
//! node's broadcast, so a payload just sent or just received is ignored for
//! `ttl` to stop re-broadcast storms. A hash collision only delays a distinct
//! payload until the next periodic re-gossip.

use crate::types::Millis;
use fnv::FnvHasher;
use std::hash::Hasher;

/// Default number of remembered payloads
pub const DEFAULT_DEDUP_CAPACITY: usize = 32;

/// Default suppression window (ms)
pub const DEFAULT_DEDUP_TTL_MS: Millis = 1000;

/// 32-bit FNV-1a fold of a payload
pub fn payload_hash(bytes: &[u8]) -> u32 {
    let mut hasher = FnvHasher::default();
    hasher.write(bytes);
    let h = hasher.finish();
    (h ^ (h >> 32)) as u32
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    hash: u32,
    at: Millis,
}

/// Ring of recently seen payload hashes
#[derive(Debug, Clone)]
pub struct DedupCache {
    slots: Vec<Option<Entry>>,
    head: usize,
    ttl: Millis,
}

impl Default for DedupCache {
    fn default() -> Self {
        Self::new(DEFAULT_DEDUP_CAPACITY, DEFAULT_DEDUP_TTL_MS)
    }
}

impl DedupCache {
    /// A zero capacity is bumped to one slot
    pub fn new(capacity: usize, ttl: Millis) -> Self {
        Self {
            slots: vec![None; capacity.max(1)],
            head: 0,
            ttl,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn ttl(&self) -> Millis {
        self.ttl
    }

    /// Record `hash` at `now`, overwriting the oldest slot
    pub fn remember(&mut self, hash: u32, now: Millis) {
        self.slots[self.head] = Some(Entry { hash, at: now });
        self.head = (self.head + 1) % self.slots.len();
    }

    /// True iff a slot holds `hash` and was written less than `ttl` ago
    pub fn seen_recently(&self, hash: u32, now: Millis) -> bool {
        self.slots
            .iter()
            .flatten()
            .any(|e| e.hash == hash && now.saturating_sub(e.at) < self.ttl)
    }

    /// Check-and-remember in one step. Returns true if the payload is fresh
    /// (and is now remembered), false if it is a recent duplicate.
    pub fn admit(&mut self, bytes: &[u8], now: Millis) -> bool {
        let hash = payload_hash(bytes);
        if self.seen_recently(hash, now) {
            return false;
        }
        self.remember(hash, now);
        true
    }
}
