//! Single-tier LFU store.
//!
//! Each entry carries a frequency counter and its insertion sequence number.
//! Frequencies increment on hits only, never on a plain insert. Eviction pops
//! the minimum of the `(frequency, insertion_seq)` index: least-frequent
//! first, ties broken by oldest insertion so the order is deterministic.

use std::collections::{BTreeMap, HashMap};

use crate::cache::block::{Block, BlockKey};

/// Capacity-bounded LFU store (capacity in blocks).
#[derive(Debug, Clone)]
pub struct LfuStore {
    capacity: usize,
    block_bytes: u64,
    entries: HashMap<BlockKey, LfuEntry>,
    /// `(frequency, insertion_seq)` → key; the first entry is the victim.
    order: BTreeMap<(u64, u64), BlockKey>,
    next_seq: u64,
}

#[derive(Debug, Clone)]
struct LfuEntry {
    block: Block,
    frequency: u64,
    seq: u64,
}

impl LfuStore {
    pub fn new(capacity: usize, block_bytes: u64) -> Self {
        debug_assert!(capacity > 0, "store capacity must be positive");
        Self {
            capacity,
            block_bytes,
            entries: HashMap::with_capacity(capacity),
            order: BTreeMap::new(),
            next_seq: 0,
        }
    }

    /// Look a key up; a hit increments its frequency.
    pub fn lookup(&mut self, key: BlockKey) -> bool {
        if self.entries.contains_key(&key) {
            self.bump(key);
            true
        } else {
            false
        }
    }

    /// Insert a fresh block, evicting the minimum-frequency victim first when
    /// at capacity. New entries start at frequency 1. Inserting a present key
    /// counts as a hit: the frequency is bumped, nothing is duplicated.
    pub fn insert(&mut self, key: BlockKey, now_ms: u64) {
        if self.entries.contains_key(&key) {
            self.bump(key);
            return;
        }
        if self.entries.len() >= self.capacity {
            self.evict_one();
        }
        self.next_seq += 1;
        let seq = self.next_seq;
        self.order.insert((1, seq), key);
        self.entries.insert(
            key,
            LfuEntry {
                block: Block::new(key, self.block_bytes, now_ms),
                frequency: 1,
                seq,
            },
        );
    }

    /// Evict the least-frequently-used block, oldest insertion on ties.
    ///
    /// Panics on an empty store; callers check occupancy first.
    pub fn evict_one(&mut self) -> Block {
        assert!(!self.entries.is_empty(), "evict_one called on an empty store");
        let (_, key) = self.order.pop_first().expect("frequency index out of sync");
        let entry = self.entries.remove(&key).expect("frequency index out of sync");
        entry.block
    }

    pub fn contains(&self, key: BlockKey) -> bool {
        self.entries.contains_key(&key)
    }

    pub fn frequency(&self, key: BlockKey) -> Option<u64> {
        self.entries.get(&key).map(|e| e.frequency)
    }

    pub fn occupancy(&self) -> usize {
        self.entries.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn bump(&mut self, key: BlockKey) {
        let Some(entry) = self.entries.get_mut(&key) else {
            return;
        };
        self.order.remove(&(entry.frequency, entry.seq));
        entry.frequency += 1;
        self.order.insert((entry.frequency, entry.seq), key);
    }
}
