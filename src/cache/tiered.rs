//! Hierarchical two-tier store with exclusive ownership.
//!
//! L1 is small and fast, L2 larger and slower; both run LRU internally. A key
//! lives in at most one tier at a time. An L2 hit promotes the block into L1;
//! the L1 victim displaced by that promotion is demoted into L2, which may in
//! turn evict its own victim. The cascade ends there: the L2 victim is gone
//! for good. Fresh inserts land in L1 with the same cascade.

use tracing::trace;

use crate::cache::block::{Block, BlockKey};
use crate::cache::lru::LruStore;
use crate::cache::{Lookup, TierLabel};

/// Two-tier LRU cache. Promotion and demotion move the [`Block`] value, so
/// identity and `created_at` survive tier changes.
#[derive(Debug, Clone)]
pub struct TieredStore {
    l1: LruStore,
    l2: LruStore,
    block_bytes: u64,
    promotions: u64,
    demotions: u64,
    lost_blocks: u64,
}

impl TieredStore {
    pub fn new(l1_capacity: usize, l2_capacity: usize, block_bytes: u64) -> Self {
        Self {
            l1: LruStore::new(l1_capacity, block_bytes),
            l2: LruStore::new(l2_capacity, block_bytes),
            block_bytes,
            promotions: 0,
            demotions: 0,
            lost_blocks: 0,
        }
    }

    /// Look a key up across both tiers. An L2 hit reports `tier = L2` but
    /// leaves the block resident in L1 afterwards.
    pub fn lookup(&mut self, key: BlockKey) -> Lookup {
        if self.l1.lookup(key) {
            return Lookup::hit(TierLabel::L1);
        }
        if let Some(block) = self.l2.remove(key) {
            self.promotions += 1;
            self.place_in_l1(block);
            return Lookup::hit(TierLabel::L2);
        }
        Lookup::miss()
    }

    /// Insert a key. A key already resident in either tier is a no-op
    /// promotion: L1 residents get a recency refresh, L2 residents are moved
    /// up into L1. Fresh keys are inserted into L1.
    pub fn insert(&mut self, key: BlockKey, now_ms: u64) {
        if self.l1.lookup(key) {
            return;
        }
        if let Some(block) = self.l2.remove(key) {
            self.promotions += 1;
            self.place_in_l1(block);
            return;
        }
        self.place_in_l1(Block::new(key, self.block_bytes, now_ms));
    }

    /// Insert into L1, demoting the displaced L1 victim into L2. An L2
    /// eviction triggered by the demotion drops the victim entirely.
    fn place_in_l1(&mut self, block: Block) {
        if let Some(victim) = self.l1.insert_block(block) {
            self.demotions += 1;
            if let Some(lost) = self.l2.insert_block(victim) {
                self.lost_blocks += 1;
                trace!(key = ?lost.key, "block cascaded out of L2");
            }
        }
    }

    pub fn contains(&self, key: BlockKey) -> bool {
        self.l1.contains(key) || self.l2.contains(key)
    }

    pub fn in_l1(&self, key: BlockKey) -> bool {
        self.l1.contains(key)
    }

    pub fn in_l2(&self, key: BlockKey) -> bool {
        self.l2.contains(key)
    }

    pub fn l1_blocks(&self) -> usize {
        self.l1.occupancy()
    }

    pub fn l2_blocks(&self) -> usize {
        self.l2.occupancy()
    }

    pub fn occupancy(&self) -> usize {
        self.l1.occupancy() + self.l2.occupancy()
    }

    pub fn capacity(&self) -> usize {
        self.l1.capacity() + self.l2.capacity()
    }

    pub fn promotions(&self) -> u64 {
        self.promotions
    }

    pub fn demotions(&self) -> u64 {
        self.demotions
    }

    /// Blocks cascaded out of L2 entirely.
    pub fn lost_blocks(&self) -> u64 {
        self.lost_blocks
    }
}
