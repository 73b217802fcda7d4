//! Timing model: converts block outcomes into latency estimates.
//!
//! Decoupled from cache internals so policies are compared on identical cost
//! assumptions. The incentive for caching is that hits skip load time, not
//! compute time: every prompt token is attended to regardless of residency,
//! but only missed blocks pay the fetch/recompute cost.

use serde::{Deserialize, Serialize};

use crate::cache::{Lookup, TierLabel};
use crate::config::TimeModelConfig;

/// Per-request cost estimate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RequestTiming {
    /// Time to first token: prompt compute plus miss/L2 load costs.
    pub ttft_ms: f64,
    /// Decode time for the request's output tokens.
    pub decode_ms: f64,
}

impl RequestTiming {
    pub fn total_ms(&self) -> f64 {
        self.ttft_ms + self.decode_ms
    }
}

/// The cost model. Stateless; all rates come from configuration.
#[derive(Debug, Clone)]
pub struct TimingModel {
    cfg: TimeModelConfig,
}

impl TimingModel {
    pub fn new(cfg: TimeModelConfig) -> Self {
        Self { cfg }
    }

    /// Estimate the cost of one request from its ordered block outcomes.
    ///
    /// `TTFT = total_tokens / compute_rate
    ///       + misses * load_ms_per_block
    ///       + l2_hits * l2_load_ms_per_block`
    ///
    /// A zero-length prompt yields TTFT = 0: the degenerate case, not an
    /// error.
    pub fn estimate(&self, input_tokens: u32, outcomes: &[Lookup], output_tokens: u32) -> RequestTiming {
        let misses = outcomes.iter().filter(|o| !o.hit).count() as f64;
        let l2_hits = outcomes
            .iter()
            .filter(|o| o.tier == Some(TierLabel::L2))
            .count() as f64;

        let ttft_ms = if input_tokens == 0 {
            0.0
        } else {
            input_tokens as f64 / self.cfg.compute_tokens_per_ms
                + misses * self.cfg.load_ms_per_block
                + l2_hits * self.cfg.l2_load_ms_per_block
        };

        let decode_ms = output_tokens as f64 / self.cfg.decode_tokens_per_ms;

        RequestTiming { ttft_ms, decode_ms }
    }
}
