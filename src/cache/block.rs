//! Block identity and addressing.
//!
//! A KV block covers a fixed number of prompt tokens. Blocks are the unit of
//! cache residency and of movement between tiers: a block is owned by exactly
//! one store tier at a time, and tier moves transfer the value itself.

use serde::{Deserialize, Serialize};

use crate::workload::Request;

/// Identifies a fixed-size KV block.
///
/// Trace workloads supply content hashes (`hash_ids`), so identical prompt
/// content maps to the same key across requests and cross-request dedup is
/// possible. Synthetic workloads derive keys from sequence position, which
/// makes every block unique to its sequence; reuse then only happens when
/// the same sequence is requested again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BlockKey {
    /// Content hash from a trace record.
    Content(u64),
    /// Position-derived key for sequences without content hashes.
    Positional { sequence_id: u64, index: u32 },
}

/// A resident KV block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    /// Identity; never changes on promotion or demotion.
    pub key: BlockKey,

    /// Size in bytes, fixed per configuration
    /// (`block_size_tokens * model_kv_bytes_per_token`).
    pub size_bytes: u64,

    /// Logical time (ms) of first insertion.
    pub created_at: u64,
}

impl Block {
    pub fn new(key: BlockKey, size_bytes: u64, created_at: u64) -> Self {
        Self {
            key,
            size_bytes,
            created_at,
        }
    }
}

/// Number of blocks covering `input_length` tokens, rounding up.
pub fn blocks_for_tokens(input_length: u32, block_size_tokens: u32) -> u32 {
    input_length.div_ceil(block_size_tokens)
}

/// Ordered block keys for a request, in prefix order.
///
/// Explicit content hashes take precedence; otherwise keys are derived as
/// `(sequence_id, block_index)`. The ordering is stable and order-sensitive:
/// prefix reuse detection stops at the first miss.
pub fn block_keys_for(req: &Request, block_size_tokens: u32) -> Vec<BlockKey> {
    if !req.block_hashes.is_empty() {
        return req.block_hashes.iter().map(|&h| BlockKey::Content(h)).collect();
    }
    (0..blocks_for_tokens(req.input_length, block_size_tokens))
        .map(|index| BlockKey::Positional {
            sequence_id: req.sequence_id,
            index,
        })
        .collect()
}
