//! The discrete-event simulation driver.
//!
//! Consumes the ordered request stream, maps each request onto block keys,
//! queries the active store under prefix-hit semantics, and feeds the timing
//! model and metrics collector. Strictly single-threaded: requests are
//! processed one at a time in arrival order, and elapsed time is computed,
//! never waited for.
//!
//! Prefix-hit rule: block keys are probed from position 0; the first miss
//! ends the hit prefix, and every later block in the request is written as a
//! miss even if it is individually resident. KV blocks past a divergence
//! point cannot be reused: the downstream attention context differs even
//! when the content hash matches.

use tracing::{debug, info};

use crate::cache::block::{block_keys_for, blocks_for_tokens};
use crate::cache::{CacheStore, Lookup};
use crate::config::Config;
use crate::error::SimError;
use crate::sim::clock::SimClock;
use crate::sim::metrics::{AccessEvent, MetricsCollector, MetricsSnapshot, RequestSummary};
use crate::sim::timing::TimingModel;
use crate::workload::{Request, RequestSource};

/// Drives one simulation run: one store, one collector, one request stream.
/// Comparing policies means one driver per policy over a replayed stream.
pub struct SimulationDriver {
    block_size_tokens: u32,
    block_bytes: u64,
    store: CacheStore,
    timing: TimingModel,
    metrics: MetricsCollector,
    clock: SimClock,
}

impl SimulationDriver {
    pub fn new(config: &Config, store: CacheStore) -> Self {
        let metrics = MetricsCollector::new(config.cache.policy.to_string());
        Self {
            block_size_tokens: config.cache.block_size_tokens,
            block_bytes: config.cache.block_bytes(),
            store,
            timing: TimingModel::new(config.time_model.clone()),
            metrics,
            clock: SimClock::new(),
        }
    }

    /// Consume the full request stream and return the finalized snapshot.
    ///
    /// Any error aborts the run; partial metrics are discarded with the
    /// driver, never reported as valid.
    pub fn run(mut self, source: &dyn RequestSource) -> Result<MetricsSnapshot, SimError> {
        let mut processed = 0u64;
        for request in source.iter() {
            self.handle_request(&request)?;
            processed += 1;
        }
        info!(
            requests = processed,
            occupancy = self.store.occupancy(),
            "simulation complete"
        );
        Ok(self.metrics.finalize(&self.store))
    }

    fn handle_request(&mut self, req: &Request) -> Result<(), SimError> {
        self.validate(req)?;

        match req.arrival_timestamp_ms {
            Some(ts) => self.clock.advance_to_ms(ts),
            // Synthetic arrivals are assigned monotonically.
            None => self.clock.advance_by_ms(1),
        }
        let now_ms = self.clock.now_ms();

        let keys = block_keys_for(req, self.block_size_tokens);
        let total_blocks = keys.len() as u32;

        let mut outcomes = Vec::with_capacity(keys.len());
        let mut prefix_active = true;
        let mut prefix_hit_count = 0u32;

        for &key in &keys {
            let outcome = if prefix_active {
                let result = self.store.lookup(key);
                if result.hit {
                    prefix_hit_count += 1;
                } else {
                    // First miss: the block is written, and the rest of the
                    // request is treated as misses without further lookups.
                    prefix_active = false;
                    self.store.insert(key, now_ms);
                }
                result
            } else {
                self.store.insert(key, now_ms);
                Lookup::miss()
            };
            self.metrics.record_access(&AccessEvent {
                key,
                outcome,
                time_ms: now_ms,
            })?;
            outcomes.push(outcome);
        }

        let timing = self.timing.estimate(req.input_length, &outcomes, req.output_length);
        let miss_count = total_blocks - prefix_hit_count;
        let summary = RequestSummary {
            request_id: req.request_id,
            total_blocks,
            prefix_hit_count,
            input_tokens: req.input_length,
            output_tokens: req.output_length,
            bytes_requested: total_blocks as u64 * self.block_bytes,
            bytes_read: prefix_hit_count as u64 * self.block_bytes,
            bytes_written: miss_count as u64 * self.block_bytes,
            timing,
            arrival_timestamp_ms: req.arrival_timestamp_ms,
        };
        self.metrics.record_request(&summary)?;

        debug!(
            request_id = req.request_id,
            total_blocks,
            prefix_hit_count,
            ttft_ms = timing.ttft_ms,
            "request processed"
        );
        Ok(())
    }

    /// Input-contract checks. A violation fails the whole run; dropping
    /// requests would bias comparisons between policy runs.
    fn validate(&self, req: &Request) -> Result<(), SimError> {
        if !req.block_hashes.is_empty() {
            let expected = blocks_for_tokens(req.input_length, self.block_size_tokens);
            if req.block_hashes.len() as u32 != expected {
                return Err(SimError::malformed(
                    req.request_id,
                    format!(
                        "{} block hashes inconsistent with input_length {} (expected {})",
                        req.block_hashes.len(),
                        req.input_length,
                        expected
                    ),
                ));
            }
        }
        Ok(())
    }
}
