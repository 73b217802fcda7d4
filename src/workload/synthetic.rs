//! Seeded synthetic workload generator.
//!
//! Requests draw a sequence id from a reuse pool (uniform or zipf-skewed) and
//! a prompt length from a configured distribution. Generation is lazy and
//! restarts from the seed on every iteration, so replays are bit-identical.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::{ReuseModel, SequenceLengthSpec, SyntheticConfig};
use crate::workload::{Request, RequestSource, RequestType};

const MIN_SEQUENCE_LENGTH: u32 = 1;
const MAX_SEQUENCE_LENGTH: u32 = 131_072;

/// Synthetic workload. Iterating re-seeds the RNG, so the same configuration
/// always produces the same request stream.
#[derive(Debug, Clone)]
pub struct SyntheticWorkload {
    cfg: SyntheticConfig,
}

impl SyntheticWorkload {
    pub fn new(cfg: SyntheticConfig) -> Self {
        Self { cfg }
    }
}

impl RequestSource for SyntheticWorkload {
    fn iter(&self) -> Box<dyn Iterator<Item = Request> + '_> {
        let mut rng = StdRng::seed_from_u64(self.cfg.seed);
        let sampler = SequenceSampler::new(&self.cfg);
        let cfg = self.cfg.clone();
        Box::new((0..cfg.num_requests).map(move |i| Request {
            request_id: i,
            sequence_id: sampler.sample(&mut rng),
            arrival_timestamp_ms: None,
            input_length: sample_length(&cfg.sequence_length, &mut rng),
            output_length: cfg.output_length,
            request_type: RequestType::Prefill,
            block_hashes: Vec::new(),
        }))
    }
}

/// Draws sequence ids according to the reuse model.
#[derive(Debug, Clone)]
struct SequenceSampler {
    population: u64,
    /// Cumulative zipf weights, empty for uniform reuse.
    cumulative: Vec<f64>,
}

impl SequenceSampler {
    fn new(cfg: &SyntheticConfig) -> Self {
        let population = cfg.sequence_population().max(1);
        let cumulative = match cfg.reuse {
            ReuseModel::Uniform => Vec::new(),
            ReuseModel::Zipf { a } => {
                // Weight 1/k^a for sequence id k-1: smaller ids reused more.
                let mut total = 0.0;
                (1..=population)
                    .map(|k| {
                        total += (k as f64).powf(-a);
                        total
                    })
                    .collect()
            }
        };
        Self {
            population,
            cumulative,
        }
    }

    fn sample(&self, rng: &mut StdRng) -> u64 {
        if self.cumulative.is_empty() {
            return rng.gen_range(0..self.population);
        }
        let total = self.cumulative[self.cumulative.len() - 1];
        let u = rng.gen::<f64>() * total;
        self.cumulative.partition_point(|&c| c < u) as u64
    }
}

fn sample_length(spec: &SequenceLengthSpec, rng: &mut StdRng) -> u32 {
    let value = match *spec {
        SequenceLengthSpec::Fixed { value } => value as f64,
        SequenceLengthSpec::Uniform { low, high } => {
            let high = high.max(low);
            rng.gen_range(low..=high) as f64
        }
        SequenceLengthSpec::Normal { mean, std } => mean + std * sample_standard_normal(rng),
        SequenceLengthSpec::LogNormal { mean, std } => {
            (mean + std * sample_standard_normal(rng)).exp()
        }
    };
    (value as i64)
        .clamp(MIN_SEQUENCE_LENGTH as i64, MAX_SEQUENCE_LENGTH as i64) as u32
}

/// Box-Muller transform over two uniforms.
fn sample_standard_normal(rng: &mut StdRng) -> f64 {
    let u1: f64 = rng.gen_range(f64::MIN_POSITIVE..1.0);
    let u2: f64 = rng.gen::<f64>();
    (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()
}
