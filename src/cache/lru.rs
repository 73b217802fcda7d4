//! Single-tier LRU store.
//!
//! A key→entry map plus an ordered recency index keyed by a monotone stamp.
//! A hit reassigns the entry's stamp, moving it to the MRU end; eviction pops
//! the smallest stamp. Eviction order is fully determined by the access
//! history, never by hash iteration order.

use std::collections::{BTreeMap, HashMap};

use crate::cache::block::{Block, BlockKey};

/// Capacity-bounded LRU store. Capacity is counted in blocks; the byte size
/// per block is fixed upstream.
#[derive(Debug, Clone)]
pub struct LruStore {
    capacity: usize,
    block_bytes: u64,
    entries: HashMap<BlockKey, LruEntry>,
    recency: BTreeMap<u64, BlockKey>,
    tick: u64,
}

#[derive(Debug, Clone)]
struct LruEntry {
    block: Block,
    stamp: u64,
}

impl LruStore {
    /// Create a store holding at most `capacity` blocks. Zero capacities are
    /// rejected at configuration time.
    pub fn new(capacity: usize, block_bytes: u64) -> Self {
        debug_assert!(capacity > 0, "store capacity must be positive");
        Self {
            capacity,
            block_bytes,
            entries: HashMap::with_capacity(capacity),
            recency: BTreeMap::new(),
            tick: 0,
        }
    }

    /// Look a key up, refreshing its recency on a hit.
    pub fn lookup(&mut self, key: BlockKey) -> bool {
        if self.entries.contains_key(&key) {
            self.touch(key);
            true
        } else {
            false
        }
    }

    /// Insert a fresh block for `key`, evicting the LRU victim first when at
    /// capacity. Inserting a present key is a no-op promotion: the entry's
    /// recency is refreshed, nothing else changes.
    pub fn insert(&mut self, key: BlockKey, now_ms: u64) {
        if self.entries.contains_key(&key) {
            self.touch(key);
            return;
        }
        self.insert_block(Block::new(key, self.block_bytes, now_ms));
    }

    /// Insert an existing block value (tier moves preserve `created_at`).
    /// Returns the evicted victim when the insert displaced one.
    pub fn insert_block(&mut self, block: Block) -> Option<Block> {
        if self.entries.contains_key(&block.key) {
            self.touch(block.key);
            return None;
        }
        let evicted = if self.entries.len() >= self.capacity {
            Some(self.evict_one())
        } else {
            None
        };
        self.tick += 1;
        self.recency.insert(self.tick, block.key);
        self.entries.insert(
            block.key,
            LruEntry {
                block,
                stamp: self.tick,
            },
        );
        evicted
    }

    /// Remove a key, returning its block. Used for promotion out of a tier.
    pub fn remove(&mut self, key: BlockKey) -> Option<Block> {
        let entry = self.entries.remove(&key)?;
        self.recency.remove(&entry.stamp);
        Some(entry.block)
    }

    /// Evict the least-recently-used block.
    ///
    /// Calling this on an empty store is an internal invariant violation and
    /// panics; callers check occupancy first.
    pub fn evict_one(&mut self) -> Block {
        assert!(!self.entries.is_empty(), "evict_one called on an empty store");
        let (_, key) = self.recency.pop_first().expect("recency index out of sync");
        let entry = self.entries.remove(&key).expect("recency index out of sync");
        entry.block
    }

    pub fn contains(&self, key: BlockKey) -> bool {
        self.entries.contains_key(&key)
    }

    pub fn occupancy(&self) -> usize {
        self.entries.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn block_bytes(&self) -> u64 {
        self.block_bytes
    }

    pub fn used_bytes(&self) -> u64 {
        self.entries.values().map(|e| e.block.size_bytes).sum()
    }

    fn touch(&mut self, key: BlockKey) {
        let Some(entry) = self.entries.get_mut(&key) else {
            return;
        };
        self.recency.remove(&entry.stamp);
        self.tick += 1;
        entry.stamp = self.tick;
        self.recency.insert(self.tick, key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(n: u64) -> BlockKey {
        BlockKey::Content(n)
    }

    #[test]
    fn test_lookup_miss_then_hit() {
        let mut store = LruStore::new(4, 1024);
        assert!(!store.lookup(key(1)));
        store.insert(key(1), 0);
        assert!(store.lookup(key(1)));
        assert_eq!(store.occupancy(), 1);
    }

    #[test]
    fn test_eviction_takes_lru_end() {
        let mut store = LruStore::new(2, 1024);
        store.insert(key(1), 0);
        store.insert(key(2), 0);
        // Touch 1 so 2 becomes the LRU end.
        assert!(store.lookup(key(1)));
        store.insert(key(3), 1);
        assert!(store.contains(key(1)));
        assert!(!store.contains(key(2)));
        assert!(store.contains(key(3)));
    }

    #[test]
    fn test_reinsert_is_noop_promotion() {
        let mut store = LruStore::new(2, 1024);
        store.insert(key(1), 0);
        store.insert(key(2), 0);
        store.insert(key(1), 1); // refresh, not duplicate
        assert_eq!(store.occupancy(), 2);
        store.insert(key(3), 2);
        // 2 was the stale entry after 1's refresh.
        assert!(!store.contains(key(2)));
        assert!(store.contains(key(1)));
    }

    #[test]
    fn test_remove_returns_block() {
        let mut store = LruStore::new(2, 1024);
        store.insert(key(5), 7);
        let block = store.remove(key(5)).unwrap();
        assert_eq!(block.key, key(5));
        assert_eq!(block.created_at, 7);
        assert_eq!(store.occupancy(), 0);
        assert!(store.remove(key(5)).is_none());
    }

    #[test]
    #[should_panic(expected = "evict_one called on an empty store")]
    fn test_evict_one_empty_panics() {
        let mut store = LruStore::new(2, 1024);
        store.evict_one();
    }
}
