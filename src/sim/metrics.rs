//! Metrics collection and aggregation for simulation runs.
//!
//! The collector accumulates per-access and per-request statistics during a
//! run and produces a read-only [`MetricsSnapshot`] at finalize time.
//! Percentiles are computed once, from sorted samples; nothing here is
//! incremental or approximate, so two runs over the same inputs produce
//! bit-identical snapshots.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::cache::block::BlockKey;
use crate::cache::{CacheStore, Lookup, TierLabel};
use crate::error::SimError;
use crate::sim::timing::RequestTiming;

/// One block access, consumed immediately by the collector.
#[derive(Debug, Clone, Copy)]
pub struct AccessEvent {
    pub key: BlockKey,
    pub outcome: Lookup,
    pub time_ms: u64,
}

/// Per-request record handed from the driver to the collector.
#[derive(Debug, Clone)]
pub struct RequestSummary {
    pub request_id: u64,
    pub total_blocks: u32,
    pub prefix_hit_count: u32,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub bytes_requested: u64,
    pub bytes_read: u64,
    pub bytes_written: u64,
    pub timing: RequestTiming,
    pub arrival_timestamp_ms: Option<u64>,
}

/// Where the throughput figure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThroughputSource {
    /// Real arrival timestamps drove the wall-clock span.
    Timestamp,
    /// No timestamps; derived from summed TTFT + decode time.
    Modeled,
}

impl std::fmt::Display for ThroughputSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ThroughputSource::Timestamp => write!(f, "timestamp"),
            ThroughputSource::Modeled => write!(f, "modeled"),
        }
    }
}

/// Latency distribution summary, interpolated from sorted samples.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatencyPercentiles {
    pub mean: f64,
    pub p50: f64,
    pub p95: f64,
    pub p99: f64,
    pub max: f64,
}

impl LatencyPercentiles {
    /// Compute percentiles by sorted-sample linear interpolation.
    pub fn from_samples(samples: &[f64]) -> Self {
        if samples.is_empty() {
            return Self {
                mean: 0.0,
                p50: 0.0,
                p95: 0.0,
                p99: 0.0,
                max: 0.0,
            };
        }
        let mut sorted = samples.to_vec();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let mean = sorted.iter().sum::<f64>() / sorted.len() as f64;
        Self {
            mean,
            p50: percentile_sorted(&sorted, 50.0),
            p95: percentile_sorted(&sorted, 95.0),
            p99: percentile_sorted(&sorted, 99.0),
            max: sorted[sorted.len() - 1],
        }
    }
}

/// Linear interpolation at rank `p/100 * (n-1)` over a sorted slice.
fn percentile_sorted(sorted: &[f64], p: f64) -> f64 {
    let n = sorted.len();
    if n == 1 {
        return sorted[0];
    }
    let rank = p / 100.0 * (n - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        return sorted[lo];
    }
    let frac = rank - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

/// Aggregated, read-only results of one simulation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Policy name this run used.
    pub policy: String,

    pub total_requests: u64,
    /// Requests with zero blocks; excluded from every hit-rate denominator.
    pub degenerate_requests: u64,

    // Block-level outcomes.
    pub block_hits: u64,
    pub block_misses: u64,
    /// `Σ prefix_hit_count / Σ total_blocks` across all requests.
    pub block_hit_rate: f64,
    pub l1_hits: u64,
    pub l2_hits: u64,

    // Request-level prefix outcomes.
    pub full_prefix_hits: u64,
    pub full_prefix_misses: u64,
    /// Fraction of non-degenerate requests whose entire block sequence hit.
    pub full_prefix_hit_rate: f64,
    /// Histogram of per-request prefix hit lengths (blocks).
    pub prefix_len_counts: BTreeMap<u32, u64>,

    // Final store occupancy.
    pub l1_blocks: usize,
    pub l2_blocks: usize,

    // Byte accounting (block-granular).
    pub bytes_requested: u64,
    pub bytes_read: u64,
    pub bytes_written: u64,

    /// Reuse-distance histogram. Bucket 0 counts distance 0; bucket `i >= 1`
    /// counts distances in `[2^(i-1), 2^i)`. First accesses are excluded.
    pub reuse_distance_histogram: BTreeMap<u32, u64>,

    pub ttft: LatencyPercentiles,
    pub throughput_tokens_per_s: f64,
    pub throughput_source: ThroughputSource,
}

/// Accumulates statistics during a run; finalize to get the snapshot.
#[derive(Debug, Clone)]
pub struct MetricsCollector {
    policy: String,
    total_requests: u64,
    degenerate_requests: u64,
    block_hits: u64,
    block_misses: u64,
    l1_hits: u64,
    l2_hits: u64,
    full_prefix_hits: u64,
    full_prefix_misses: u64,
    prefix_len_counts: BTreeMap<u32, u64>,
    bytes_requested: u64,
    bytes_read: u64,
    bytes_written: u64,
    ttft_samples: Vec<f64>,
    decode_ms_total: f64,
    total_tokens: u64,
    first_timestamp_ms: Option<u64>,
    last_timestamp_ms: Option<u64>,
    timestamped_tokens: u64,
    ledger: AccessLedger,
    reuse_histogram: BTreeMap<u32, u64>,
    finalized: bool,
}

impl MetricsCollector {
    pub fn new(policy: impl Into<String>) -> Self {
        Self {
            policy: policy.into(),
            total_requests: 0,
            degenerate_requests: 0,
            block_hits: 0,
            block_misses: 0,
            l1_hits: 0,
            l2_hits: 0,
            full_prefix_hits: 0,
            full_prefix_misses: 0,
            prefix_len_counts: BTreeMap::new(),
            bytes_requested: 0,
            bytes_read: 0,
            bytes_written: 0,
            ttft_samples: Vec::new(),
            decode_ms_total: 0.0,
            total_tokens: 0,
            first_timestamp_ms: None,
            last_timestamp_ms: None,
            timestamped_tokens: 0,
            ledger: AccessLedger::new(),
            reuse_histogram: BTreeMap::new(),
            finalized: false,
        }
    }

    /// Record one block access. Updates the reuse-distance ledger for every
    /// access, hit or miss.
    pub fn record_access(&mut self, event: &AccessEvent) -> Result<(), SimError> {
        self.ensure_open()?;
        if let Some(distance) = self.ledger.observe(event.key) {
            *self
                .reuse_histogram
                .entry(distance_bucket(distance))
                .or_insert(0) += 1;
        }
        if event.outcome.hit {
            self.block_hits += 1;
            match event.outcome.tier {
                Some(TierLabel::L2) => self.l2_hits += 1,
                _ => self.l1_hits += 1,
            }
        } else {
            self.block_misses += 1;
        }
        Ok(())
    }

    /// Record one completed request.
    pub fn record_request(&mut self, summary: &RequestSummary) -> Result<(), SimError> {
        self.ensure_open()?;
        self.total_requests += 1;
        self.total_tokens += summary.input_tokens as u64 + summary.output_tokens as u64;
        self.bytes_requested += summary.bytes_requested;
        self.bytes_read += summary.bytes_read;
        self.bytes_written += summary.bytes_written;
        self.ttft_samples.push(summary.timing.ttft_ms);
        self.decode_ms_total += summary.timing.decode_ms;

        if let Some(ts) = summary.arrival_timestamp_ms {
            if self.first_timestamp_ms.is_none() {
                self.first_timestamp_ms = Some(ts);
            }
            self.last_timestamp_ms = Some(ts);
            self.timestamped_tokens += summary.input_tokens as u64 + summary.output_tokens as u64;
        }

        if summary.total_blocks == 0 {
            self.degenerate_requests += 1;
            return Ok(());
        }

        *self
            .prefix_len_counts
            .entry(summary.prefix_hit_count)
            .or_insert(0) += 1;
        if summary.prefix_hit_count == summary.total_blocks {
            self.full_prefix_hits += 1;
        } else {
            self.full_prefix_misses += 1;
        }
        Ok(())
    }

    /// Finalize the run and produce the snapshot. Idempotent: repeated calls
    /// yield identical values. After the first call, recording fails with a
    /// state error.
    pub fn finalize(&mut self, store: &CacheStore) -> MetricsSnapshot {
        self.finalized = true;

        let block_total = self.block_hits + self.block_misses;
        let block_hit_rate = if block_total > 0 {
            self.block_hits as f64 / block_total as f64
        } else {
            0.0
        };

        let prefix_requests = self.full_prefix_hits + self.full_prefix_misses;
        let full_prefix_hit_rate = if prefix_requests > 0 {
            self.full_prefix_hits as f64 / prefix_requests as f64
        } else {
            0.0
        };

        let (throughput_tokens_per_s, throughput_source) = self.throughput();

        MetricsSnapshot {
            policy: self.policy.clone(),
            total_requests: self.total_requests,
            degenerate_requests: self.degenerate_requests,
            block_hits: self.block_hits,
            block_misses: self.block_misses,
            block_hit_rate,
            l1_hits: self.l1_hits,
            l2_hits: self.l2_hits,
            full_prefix_hits: self.full_prefix_hits,
            full_prefix_misses: self.full_prefix_misses,
            full_prefix_hit_rate,
            prefix_len_counts: self.prefix_len_counts.clone(),
            l1_blocks: store.l1_blocks(),
            l2_blocks: store.l2_blocks(),
            bytes_requested: self.bytes_requested,
            bytes_read: self.bytes_read,
            bytes_written: self.bytes_written,
            reuse_distance_histogram: self.reuse_histogram.clone(),
            ttft: LatencyPercentiles::from_samples(&self.ttft_samples),
            throughput_tokens_per_s,
            throughput_source,
        }
    }

    fn throughput(&self) -> (f64, ThroughputSource) {
        if let (Some(first), Some(last)) = (self.first_timestamp_ms, self.last_timestamp_ms) {
            if last > first && self.timestamped_tokens > 0 {
                let span_s = (last - first) as f64 / 1000.0;
                return (
                    self.timestamped_tokens as f64 / span_s,
                    ThroughputSource::Timestamp,
                );
            }
        }
        let total_ms: f64 = self.ttft_samples.iter().sum::<f64>() + self.decode_ms_total;
        if total_ms > 0.0 {
            (
                self.total_tokens as f64 / (total_ms / 1000.0),
                ThroughputSource::Modeled,
            )
        } else {
            (0.0, ThroughputSource::Modeled)
        }
    }

    fn ensure_open(&self) -> Result<(), SimError> {
        if self.finalized {
            return Err(SimError::state(
                "metrics collector is finalized; no further samples accepted",
            ));
        }
        Ok(())
    }
}

/// Bucket exponent for a reuse distance: 0 for distance 0, otherwise the
/// position of the highest set bit plus one, so bucket `i` covers
/// `[2^(i-1), 2^i)`.
fn distance_bucket(distance: u64) -> u32 {
    if distance == 0 {
        0
    } else {
        64 - distance.leading_zeros()
    }
}

/// Reuse-distance ledger: Olken's algorithm. Keeps each key's latest access
/// position in a Fenwick tree, so the number of distinct keys accessed since
/// a key's previous access is a range sum, with no scan over resident
/// blocks.
#[derive(Debug, Clone)]
struct AccessLedger {
    last_pos: HashMap<BlockKey, usize>,
    tree: FenwickTree,
}

impl AccessLedger {
    fn new() -> Self {
        Self {
            last_pos: HashMap::new(),
            tree: FenwickTree::new(),
        }
    }

    /// Record an access, returning the reuse distance (the number of
    /// distinct keys accessed since this key's previous access), or `None`
    /// for a first access.
    fn observe(&mut self, key: BlockKey) -> Option<u64> {
        self.tree.push();
        let pos = self.tree.len();
        let distance = self.last_pos.get(&key).copied().map(|prev| {
            let between = self.tree.range(prev + 1, pos - 1);
            self.tree.add(prev, -1);
            between as u64
        });
        self.tree.add(pos, 1);
        self.last_pos.insert(key, pos);
        distance
    }
}

/// Growable 1-based Fenwick (binary indexed) tree over i64 counts.
#[derive(Debug, Clone)]
struct FenwickTree {
    tree: Vec<i64>,
}

impl FenwickTree {
    fn new() -> Self {
        Self { tree: vec![0] }
    }

    fn len(&self) -> usize {
        self.tree.len() - 1
    }

    /// Append a zero-valued position at the end.
    fn push(&mut self) {
        let i = self.tree.len();
        let lowbit = i & i.wrapping_neg();
        // A new node covers (i - lowbit, i]; seed it with the existing sum
        // over that range so later point updates stay consistent.
        let seed = self.prefix(i - 1) - self.prefix(i - lowbit);
        self.tree.push(seed);
    }

    fn add(&mut self, mut pos: usize, delta: i64) {
        while pos < self.tree.len() {
            self.tree[pos] += delta;
            pos += pos & pos.wrapping_neg();
        }
    }

    fn prefix(&self, mut pos: usize) -> i64 {
        let mut sum = 0;
        while pos > 0 {
            sum += self.tree[pos];
            pos -= pos & pos.wrapping_neg();
        }
        sum
    }

    fn range(&self, lo: usize, hi: usize) -> i64 {
        if lo > hi {
            return 0;
        }
        self.prefix(hi) - self.prefix(lo - 1)
    }
}
