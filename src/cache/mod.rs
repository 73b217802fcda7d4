//! Cache stores and eviction policies.
//!
//! This module contains the core cache data structures:
//! - [`block`]: block identity, addressing, and ownership
//! - [`lru`]: single-tier LRU store
//! - [`lfu`]: single-tier LFU store
//! - [`tiered`]: hierarchical two-tier store with cascade demotion

pub mod block;
pub mod lfu;
pub mod lru;
pub mod tiered;

use serde::{Deserialize, Serialize};

use crate::cache::block::BlockKey;
use crate::cache::lfu::LfuStore;
use crate::cache::lru::LruStore;
use crate::cache::tiered::TieredStore;
use crate::config::{CacheConfig, Policy};
use crate::error::SimError;

/// Which tier served a hit. Single-tier stores always report L1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TierLabel {
    L1,
    L2,
}

/// Result of a store lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lookup {
    pub hit: bool,
    pub tier: Option<TierLabel>,
}

impl Lookup {
    pub fn hit(tier: TierLabel) -> Self {
        Self {
            hit: true,
            tier: Some(tier),
        }
    }

    pub fn miss() -> Self {
        Self {
            hit: false,
            tier: None,
        }
    }
}

/// The closed set of eviction policies. New policies are added as variants,
/// not through dynamic dispatch, so a configuration names exactly one of
/// these and every dispatch site is exhaustive.
#[derive(Debug, Clone)]
pub enum CacheStore {
    Lru(LruStore),
    Lfu(LfuStore),
    HierarchicalLru(TieredStore),
}

impl CacheStore {
    /// Look a key up in the active store, updating policy metadata.
    pub fn lookup(&mut self, key: BlockKey) -> Lookup {
        match self {
            CacheStore::Lru(store) => {
                if store.lookup(key) {
                    Lookup::hit(TierLabel::L1)
                } else {
                    Lookup::miss()
                }
            }
            CacheStore::Lfu(store) => {
                if store.lookup(key) {
                    Lookup::hit(TierLabel::L1)
                } else {
                    Lookup::miss()
                }
            }
            CacheStore::HierarchicalLru(store) => store.lookup(key),
        }
    }

    /// Insert a key at logical time `now_ms`, evicting per policy if full.
    pub fn insert(&mut self, key: BlockKey, now_ms: u64) {
        match self {
            CacheStore::Lru(store) => store.insert(key, now_ms),
            CacheStore::Lfu(store) => store.insert(key, now_ms),
            CacheStore::HierarchicalLru(store) => store.insert(key, now_ms),
        }
    }

    pub fn contains(&self, key: BlockKey) -> bool {
        match self {
            CacheStore::Lru(store) => store.contains(key),
            CacheStore::Lfu(store) => store.contains(key),
            CacheStore::HierarchicalLru(store) => store.contains(key),
        }
    }

    pub fn occupancy(&self) -> usize {
        match self {
            CacheStore::Lru(store) => store.occupancy(),
            CacheStore::Lfu(store) => store.occupancy(),
            CacheStore::HierarchicalLru(store) => store.occupancy(),
        }
    }

    pub fn capacity(&self) -> usize {
        match self {
            CacheStore::Lru(store) => store.capacity(),
            CacheStore::Lfu(store) => store.capacity(),
            CacheStore::HierarchicalLru(store) => store.capacity(),
        }
    }

    /// Blocks resident in the fast tier (total occupancy for single-tier
    /// policies).
    pub fn l1_blocks(&self) -> usize {
        match self {
            CacheStore::HierarchicalLru(store) => store.l1_blocks(),
            other => other.occupancy(),
        }
    }

    /// Blocks resident in the slow tier (zero for single-tier policies).
    pub fn l2_blocks(&self) -> usize {
        match self {
            CacheStore::HierarchicalLru(store) => store.l2_blocks(),
            _ => 0,
        }
    }
}

/// Build the store named by the configuration, resolving capacities once.
///
/// `unique_blocks` is the workload's distinct-block count, required only when
/// a `capacity_fraction` form is configured.
pub fn build_store(cfg: &CacheConfig, unique_blocks: Option<usize>) -> Result<CacheStore, SimError> {
    let block_bytes = cfg.block_bytes();
    match cfg.policy {
        Policy::Lru => {
            let capacity = cfg.resolve_capacity(unique_blocks)?;
            Ok(CacheStore::Lru(LruStore::new(capacity, block_bytes)))
        }
        Policy::Lfu => {
            let capacity = cfg.resolve_capacity(unique_blocks)?;
            Ok(CacheStore::Lfu(LfuStore::new(capacity, block_bytes)))
        }
        Policy::HierarchicalLru => {
            let l1 = cfg.resolve_l1_capacity(unique_blocks)?;
            let l2 = cfg.resolve_l2_capacity(unique_blocks)?;
            Ok(CacheStore::HierarchicalLru(TieredStore::new(l1, l2, block_bytes)))
        }
    }
}
