//! Runtime configuration for kv-cache-sim.
//!
//! Configuration is loaded from a JSON file or constructed programmatically.
//! All knobs live here: the eviction policy, the capacity forms, the timing
//! model rates, and the workload description. Capacity options resolve to a
//! block count exactly once, before the store is built; a run never sees an
//! unresolved capacity.

use std::path::PathBuf;

use clap::Parser;
use serde::{Deserialize, Serialize};

use crate::error::SimError;

/// Command-line arguments.
#[derive(Parser, Debug, Clone)]
#[command(name = "kv-cache-sim", about = "Discrete-event simulator for KV-cache eviction policies")]
pub struct Cli {
    /// Path to configuration file (JSON).
    #[arg(short, long, default_value = "config.json")]
    pub config: PathBuf,

    /// Override the configured eviction policy.
    #[arg(long)]
    pub policy: Option<Policy>,

    /// Emit the metrics snapshot as JSON instead of the text report.
    #[arg(long)]
    pub json: bool,

    /// Enable verbose logging.
    #[arg(short, long)]
    pub verbose: bool,
}

/// Eviction policy selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Policy {
    Lru,
    Lfu,
    HierarchicalLru,
}

impl std::fmt::Display for Policy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Policy::Lru => write!(f, "lru"),
            Policy::Lfu => write!(f, "lfu"),
            Policy::HierarchicalLru => write!(f, "hierarchical_lru"),
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Cache store configuration.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Timing model rates.
    #[serde(default)]
    pub time_model: TimeModelConfig,

    /// Workload description.
    #[serde(default)]
    pub workload: WorkloadConfig,
}

/// Cache policy and sizing.
///
/// Exactly one of the `capacity_*` forms must be set (per tier for the
/// hierarchical policy): a byte budget, a block count, or a fraction of the
/// workload's unique blocks. `capacity_fraction` requires a trace workload,
/// since only a trace has a known unique-block population.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Eviction policy.
    #[serde(default = "default_policy")]
    pub policy: Policy,

    /// Single-tier capacity in bytes.
    pub capacity_bytes: Option<u64>,

    /// Single-tier capacity in blocks.
    pub capacity_blocks: Option<u64>,

    /// Single-tier capacity as a fraction of the workload's unique blocks.
    pub capacity_fraction: Option<f64>,

    /// L1 capacity forms (hierarchical policy only).
    pub l1_capacity_bytes: Option<u64>,
    pub l1_capacity_blocks: Option<u64>,
    pub l1_capacity_fraction: Option<f64>,

    /// L2 capacity forms (hierarchical policy only).
    pub l2_capacity_bytes: Option<u64>,
    pub l2_capacity_blocks: Option<u64>,
    pub l2_capacity_fraction: Option<f64>,

    /// Tokens covered by one KV block.
    #[serde(default = "default_block_size_tokens")]
    pub block_size_tokens: u32,

    /// KV bytes per token (both K and V, all layers).
    #[serde(default = "default_kv_bytes_per_token")]
    pub model_kv_bytes_per_token: u64,
}

fn default_policy() -> Policy {
    Policy::Lru
}

fn default_block_size_tokens() -> u32 {
    512
}

fn default_kv_bytes_per_token() -> u64 {
    // block_size * n_kv_heads * head_dim * 2 bytes (FP16) * 2 (K+V), per
    // token across 40 layers of an 8-KV-head, 128-dim model.
    8 * 128 * 2 * 2 * 40
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            policy: default_policy(),
            capacity_bytes: None,
            capacity_blocks: Some(4096),
            capacity_fraction: None,
            l1_capacity_bytes: None,
            l1_capacity_blocks: None,
            l1_capacity_fraction: None,
            l2_capacity_bytes: None,
            l2_capacity_blocks: None,
            l2_capacity_fraction: None,
            block_size_tokens: default_block_size_tokens(),
            model_kv_bytes_per_token: default_kv_bytes_per_token(),
        }
    }
}

impl CacheConfig {
    /// Size of a single KV block in bytes.
    pub fn block_bytes(&self) -> u64 {
        self.block_size_tokens as u64 * self.model_kv_bytes_per_token
    }

    /// Resolve the single-tier capacity to a block count.
    pub fn resolve_capacity(&self, unique_blocks: Option<usize>) -> Result<usize, SimError> {
        resolve_capacity_triple(
            "capacity",
            self.capacity_bytes,
            self.capacity_blocks,
            self.capacity_fraction,
            self.block_bytes(),
            unique_blocks,
        )
    }

    /// Resolve the L1 capacity to a block count (hierarchical policy).
    pub fn resolve_l1_capacity(&self, unique_blocks: Option<usize>) -> Result<usize, SimError> {
        resolve_capacity_triple(
            "l1_capacity",
            self.l1_capacity_bytes,
            self.l1_capacity_blocks,
            self.l1_capacity_fraction,
            self.block_bytes(),
            unique_blocks,
        )
    }

    /// Resolve the L2 capacity to a block count (hierarchical policy).
    pub fn resolve_l2_capacity(&self, unique_blocks: Option<usize>) -> Result<usize, SimError> {
        resolve_capacity_triple(
            "l2_capacity",
            self.l2_capacity_bytes,
            self.l2_capacity_blocks,
            self.l2_capacity_fraction,
            self.block_bytes(),
            unique_blocks,
        )
    }

    pub fn validate(&self) -> Result<(), SimError> {
        if self.block_size_tokens == 0 {
            return Err(SimError::configuration("block_size_tokens must be positive"));
        }
        if self.model_kv_bytes_per_token == 0 {
            return Err(SimError::configuration("model_kv_bytes_per_token must be positive"));
        }
        Ok(())
    }
}

/// Resolve one (bytes | blocks | fraction) capacity triple to a block count.
fn resolve_capacity_triple(
    name: &str,
    bytes: Option<u64>,
    blocks: Option<u64>,
    fraction: Option<f64>,
    block_bytes: u64,
    unique_blocks: Option<usize>,
) -> Result<usize, SimError> {
    let set = bytes.is_some() as u8 + blocks.is_some() as u8 + fraction.is_some() as u8;
    if set == 0 {
        return Err(SimError::configuration(format!(
            "no {name}_bytes, {name}_blocks, or {name}_fraction configured"
        )));
    }
    if set > 1 {
        return Err(SimError::configuration(format!(
            "{name}_bytes, {name}_blocks, and {name}_fraction are mutually exclusive"
        )));
    }

    let resolved = if let Some(bytes) = bytes {
        (bytes / block_bytes) as usize
    } else if let Some(blocks) = blocks {
        blocks as usize
    } else {
        let fraction = fraction.unwrap_or(0.0);
        if !(fraction > 0.0) {
            return Err(SimError::configuration(format!(
                "{name}_fraction must be positive"
            )));
        }
        let unique = unique_blocks.ok_or_else(|| {
            SimError::configuration(format!(
                "{name}_fraction requires a trace workload with hash_ids"
            ))
        })?;
        (unique as f64 * fraction).floor() as usize
    };

    if resolved == 0 {
        return Err(SimError::configuration(format!(
            "{name} resolves to zero blocks"
        )));
    }
    Ok(resolved)
}

/// Timing model rates. Hits skip load time, never compute time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeModelConfig {
    /// Prefill compute rate over the whole prompt, in tokens per ms.
    #[serde(default = "default_compute_tokens_per_ms")]
    pub compute_tokens_per_ms: f64,

    /// Cost to fetch or recompute one missed block, in ms.
    #[serde(default = "default_load_ms_per_block")]
    pub load_ms_per_block: f64,

    /// Extra read cost per block served from L2, in ms. Zero reduces the
    /// model to the two-term compute + miss-load form.
    #[serde(default)]
    pub l2_load_ms_per_block: f64,

    /// Decode rate, in tokens per ms. Decode tokens are never block-cached.
    #[serde(default = "default_decode_tokens_per_ms")]
    pub decode_tokens_per_ms: f64,
}

fn default_compute_tokens_per_ms() -> f64 {
    1000.0
}

fn default_load_ms_per_block() -> f64 {
    1.0
}

fn default_decode_tokens_per_ms() -> f64 {
    10.0
}

impl Default for TimeModelConfig {
    fn default() -> Self {
        Self {
            compute_tokens_per_ms: default_compute_tokens_per_ms(),
            load_ms_per_block: default_load_ms_per_block(),
            l2_load_ms_per_block: 0.0,
            decode_tokens_per_ms: default_decode_tokens_per_ms(),
        }
    }
}

impl TimeModelConfig {
    pub fn validate(&self) -> Result<(), SimError> {
        if !(self.compute_tokens_per_ms > 0.0) {
            return Err(SimError::configuration("compute_tokens_per_ms must be positive"));
        }
        if !(self.decode_tokens_per_ms > 0.0) {
            return Err(SimError::configuration("decode_tokens_per_ms must be positive"));
        }
        if self.load_ms_per_block < 0.0 || self.l2_load_ms_per_block < 0.0 {
            return Err(SimError::configuration("load costs must be non-negative"));
        }
        Ok(())
    }
}

/// Workload description: a seeded synthetic generator or a JSONL trace.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkloadConfig {
    Synthetic(SyntheticConfig),
    Trace(TraceConfig),
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        WorkloadConfig::Synthetic(SyntheticConfig::default())
    }
}

/// Synthetic workload parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyntheticConfig {
    /// RNG seed; identical seeds reproduce identical request streams.
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Number of requests to generate.
    #[serde(default = "default_num_requests")]
    pub num_requests: u64,

    /// Size of the sequence population requests draw from. Zero means one
    /// sequence per request (no reuse).
    #[serde(default)]
    pub num_sequences: u64,

    /// Sequence reuse model.
    #[serde(default)]
    pub reuse: ReuseModel,

    /// Prompt length distribution.
    #[serde(default)]
    pub sequence_length: SequenceLengthSpec,

    /// Decode tokens per request.
    #[serde(default)]
    pub output_length: u32,
}

fn default_seed() -> u64 {
    1
}

fn default_num_requests() -> u64 {
    10_000
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            seed: default_seed(),
            num_requests: default_num_requests(),
            num_sequences: 1024,
            reuse: ReuseModel::default(),
            sequence_length: SequenceLengthSpec::default(),
            output_length: 0,
        }
    }
}

impl SyntheticConfig {
    /// Effective sequence population size.
    pub fn sequence_population(&self) -> u64 {
        if self.num_sequences == 0 {
            self.num_requests
        } else {
            self.num_sequences
        }
    }
}

/// How synthetic requests pick which sequence to replay.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum ReuseModel {
    /// Every sequence equally likely.
    Uniform,
    /// Zipf-like skew: smaller sequence ids are reused more often.
    Zipf { a: f64 },
}

impl Default for ReuseModel {
    fn default() -> Self {
        ReuseModel::Zipf { a: 1.2 }
    }
}

/// Prompt length distribution for synthetic requests.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "dist", rename_all = "snake_case")]
pub enum SequenceLengthSpec {
    Fixed { value: u32 },
    Uniform { low: u32, high: u32 },
    Normal { mean: f64, std: f64 },
    LogNormal { mean: f64, std: f64 },
}

impl Default for SequenceLengthSpec {
    fn default() -> Self {
        SequenceLengthSpec::Fixed { value: 2048 }
    }
}

/// Trace workload parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceConfig {
    /// Path to a JSONL trace file.
    pub path: PathBuf,
}

impl Config {
    /// Load configuration from a JSON file, falling back to defaults when the
    /// file does not exist.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if path.exists() {
            let data = std::fs::read_to_string(path)?;
            let config: Config = serde_json::from_str(&data)?;
            Ok(config)
        } else {
            tracing::warn!("Config file not found at {:?}, using defaults", path);
            Ok(Config::default())
        }
    }

    /// Validate everything that does not depend on the workload. Capacity
    /// resolution runs separately once the unique-block count is known.
    pub fn validate(&self) -> Result<(), SimError> {
        self.cache.validate()?;
        self.time_model.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let cfg = Config::default();
        assert_eq!(cfg.cache.policy, Policy::Lru);
        assert_eq!(cfg.cache.block_size_tokens, 512);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_capacity_bytes_rounds_down() {
        let mut cfg = CacheConfig::default();
        cfg.capacity_blocks = None;
        // 2.5 blocks worth of bytes → 2 blocks.
        cfg.capacity_bytes = Some(cfg.block_bytes() * 5 / 2);
        assert_eq!(cfg.resolve_capacity(None).unwrap(), 2);
    }

    #[test]
    fn test_capacity_zero_rejected() {
        let mut cfg = CacheConfig::default();
        cfg.capacity_blocks = None;
        cfg.capacity_bytes = Some(cfg.block_bytes() - 1);
        assert!(matches!(
            cfg.resolve_capacity(None),
            Err(SimError::Configuration(_))
        ));
    }

    #[test]
    fn test_capacity_forms_mutually_exclusive() {
        let mut cfg = CacheConfig::default();
        cfg.capacity_bytes = Some(1 << 30); // capacity_blocks already set by default
        assert!(matches!(
            cfg.resolve_capacity(None),
            Err(SimError::Configuration(_))
        ));
    }

    #[test]
    fn test_capacity_fraction_needs_unique_count() {
        let mut cfg = CacheConfig::default();
        cfg.capacity_blocks = None;
        cfg.capacity_fraction = Some(0.5);
        assert!(cfg.resolve_capacity(None).is_err());
        assert_eq!(cfg.resolve_capacity(Some(100)).unwrap(), 50);
    }

    #[test]
    fn test_unknown_policy_rejected_by_serde() {
        let err = serde_json::from_str::<Config>(r#"{"cache": {"policy": "arc"}}"#);
        assert!(err.is_err());
    }

    #[test]
    fn test_time_model_validation() {
        let mut cfg = TimeModelConfig::default();
        cfg.compute_tokens_per_ms = 0.0;
        assert!(cfg.validate().is_err());
    }
}
