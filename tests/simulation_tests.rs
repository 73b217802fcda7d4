//! End-to-end simulation tests: prefix-hit semantics, determinism, and the
//! full driver → store → timing → metrics pipeline.

use std::io::Write;

use kv_cache_sim::cache::build_store;
use kv_cache_sim::config::{Config, Policy, ReuseModel, SequenceLengthSpec, SyntheticConfig};
use kv_cache_sim::error::SimError;
use kv_cache_sim::sim::driver::SimulationDriver;
use kv_cache_sim::sim::metrics::{MetricsSnapshot, ThroughputSource};
use kv_cache_sim::workload::synthetic::SyntheticWorkload;
use kv_cache_sim::workload::trace::TraceWorkload;
use kv_cache_sim::workload::{InMemorySource, Request, RequestSource, RequestType};

fn lru_config(capacity_blocks: u64) -> Config {
    let mut config = Config::default();
    config.cache.policy = Policy::Lru;
    config.cache.capacity_blocks = Some(capacity_blocks);
    config
}

fn hashed_request(id: u64, hashes: &[u64]) -> Request {
    Request {
        request_id: id,
        sequence_id: id,
        arrival_timestamp_ms: None,
        input_length: hashes.len() as u32 * 512,
        output_length: 0,
        request_type: RequestType::Prefill,
        block_hashes: hashes.to_vec(),
    }
}

fn run(config: &Config, source: &dyn RequestSource) -> Result<MetricsSnapshot, SimError> {
    let store = build_store(&config.cache, None).unwrap();
    SimulationDriver::new(config, store).run(source)
}

#[test]
fn test_stop_at_first_miss_marks_suffix_as_misses() {
    let config = lru_config(8);
    // Blocks 13 and 14 are resident when request 2 arrives, but its miss at
    // block 12 makes them misses anyway.
    let source = InMemorySource::from(vec![
        hashed_request(0, &[10, 11]),
        hashed_request(1, &[13, 14]),
        hashed_request(2, &[10, 11, 12, 13, 14]),
    ]);
    let snapshot = run(&config, &source).unwrap();
    assert_eq!(snapshot.block_hits, 2);
    assert_eq!(snapshot.block_misses, 7);
    assert_eq!(snapshot.full_prefix_hits, 0);
    assert_eq!(snapshot.prefix_len_counts.get(&2), Some(&1));
}

#[test]
fn test_shared_prefix_scenario_lru_capacity_3() {
    // Four requests share a 2-block prefix and diverge at block 3, capacity
    // 3, LRU: request 1 is all-miss; every later request hits the shared
    // prefix and misses its divergent block, which evicts the previous
    // divergent block.
    let config = lru_config(3);
    let source = InMemorySource::from(vec![
        hashed_request(0, &[100, 101, 200]),
        hashed_request(1, &[100, 101, 201]),
        hashed_request(2, &[100, 101, 202]),
        hashed_request(3, &[100, 101, 203]),
    ]);
    let snapshot = run(&config, &source).unwrap();
    assert_eq!(snapshot.block_hits, 6);
    assert_eq!(snapshot.block_misses, 6);
    assert!((snapshot.block_hit_rate - 0.5).abs() < 1e-12);
    assert_eq!(snapshot.full_prefix_hits, 0);
    assert_eq!(snapshot.prefix_len_counts.get(&0), Some(&1));
    assert_eq!(snapshot.prefix_len_counts.get(&2), Some(&3));
    assert_eq!(snapshot.l1_blocks, 3);
    assert_eq!(snapshot.l2_blocks, 0);
}

#[test]
fn test_full_prefix_hit_rate_formula() {
    // Documented formula: fraction of non-degenerate requests whose entire
    // block sequence hit.
    let config = lru_config(8);
    let source = InMemorySource::from(vec![
        hashed_request(0, &[1, 2]),
        hashed_request(1, &[1, 2]),
        hashed_request(2, &[1, 2]),
        hashed_request(3, &[1, 3]),
    ]);
    let snapshot = run(&config, &source).unwrap();
    assert_eq!(snapshot.full_prefix_hits, 2);
    assert_eq!(snapshot.full_prefix_misses, 2);
    assert!((snapshot.full_prefix_hit_rate - 0.5).abs() < 1e-12);
    // Block-level aggregate uses the position-weighted formula.
    assert_eq!(snapshot.block_hits, 5);
    assert_eq!(snapshot.block_misses, 3);
    assert!((snapshot.block_hit_rate - 5.0 / 8.0).abs() < 1e-12);
}

#[test]
fn test_degenerate_request_has_no_cache_interaction() {
    let config = lru_config(8);
    let mut degenerate = hashed_request(0, &[]);
    degenerate.input_length = 0;
    let source = InMemorySource::from(vec![degenerate, hashed_request(1, &[1, 2])]);
    let snapshot = run(&config, &source).unwrap();
    assert_eq!(snapshot.total_requests, 2);
    assert_eq!(snapshot.degenerate_requests, 1);
    // Only the real request contributes block accesses and prefix counts.
    assert_eq!(snapshot.block_hits + snapshot.block_misses, 2);
    assert_eq!(snapshot.full_prefix_hits + snapshot.full_prefix_misses, 1);
    // The degenerate request contributes a TTFT sample of exactly zero.
    assert!(snapshot.ttft.max > 0.0);
}

#[test]
fn test_replay_yields_bit_identical_snapshots() {
    let mut config = lru_config(64);
    config.workload = kv_cache_sim::config::WorkloadConfig::Synthetic(SyntheticConfig {
        seed: 42,
        num_requests: 500,
        num_sequences: 32,
        reuse: ReuseModel::Zipf { a: 1.2 },
        sequence_length: SequenceLengthSpec::Uniform {
            low: 256,
            high: 8192,
        },
        output_length: 64,
    });
    let workload = match &config.workload {
        kv_cache_sim::config::WorkloadConfig::Synthetic(s) => SyntheticWorkload::new(s.clone()),
        _ => unreachable!(),
    };

    let first = run(&config, &workload).unwrap();
    let second = run(&config, &workload).unwrap();
    assert_eq!(first, second);
    assert!(first.block_hits > 0, "zipf reuse should produce some hits");
}

#[test]
fn test_policies_run_same_workload_independently() {
    let workload = SyntheticWorkload::new(SyntheticConfig {
        seed: 9,
        num_requests: 300,
        num_sequences: 24,
        reuse: ReuseModel::Zipf { a: 1.3 },
        sequence_length: SequenceLengthSpec::Fixed { value: 2048 },
        output_length: 0,
    });

    let mut lru = lru_config(32);
    lru.cache.policy = Policy::Lru;
    let mut lfu = lru_config(32);
    lfu.cache.policy = Policy::Lfu;

    let lru_snapshot = run(&lru, &workload).unwrap();
    let lfu_snapshot = run(&lfu, &workload).unwrap();

    // Same workload, same denominators; only policy-driven outcomes differ.
    assert_eq!(lru_snapshot.total_requests, lfu_snapshot.total_requests);
    assert_eq!(
        lru_snapshot.block_hits + lru_snapshot.block_misses,
        lfu_snapshot.block_hits + lfu_snapshot.block_misses
    );
}

#[test]
fn test_hierarchical_promotion_and_l2_read_cost() {
    let mut config = Config::default();
    config.cache.policy = Policy::HierarchicalLru;
    config.cache.capacity_blocks = None;
    config.cache.l1_capacity_blocks = Some(2);
    config.cache.l2_capacity_blocks = Some(2);
    config.time_model.compute_tokens_per_ms = 512.0;
    config.time_model.load_ms_per_block = 2.0;
    config.time_model.l2_load_ms_per_block = 0.5;

    let source = InMemorySource::from(vec![
        hashed_request(0, &[1, 2]), // misses, fills L1
        hashed_request(1, &[3, 4]), // misses, demotes 1 and 2 into L2
        hashed_request(2, &[1, 2]), // both hit from L2 and promote
    ]);
    let snapshot = run(&config, &source).unwrap();

    assert_eq!(snapshot.block_misses, 4);
    assert_eq!(snapshot.l1_hits, 0);
    assert_eq!(snapshot.l2_hits, 2);
    assert_eq!(snapshot.full_prefix_hits, 1);
    assert_eq!(snapshot.l1_blocks, 2);
    assert_eq!(snapshot.l2_blocks, 2);

    // Requests 0 and 1: 2 ms compute + two 2 ms miss loads = 6 ms. Request
    // 2: 2 ms compute + two 0.5 ms L2 reads = 3 ms, no miss loads.
    assert!((snapshot.ttft.max - 6.0).abs() < 1e-12);
    assert!((snapshot.ttft.p50 - 6.0).abs() < 1e-12);
    assert_eq!(snapshot.prefix_len_counts.get(&2), Some(&1));
}

#[test]
fn test_timestamped_workload_selects_timestamp_throughput() {
    let config = lru_config(8);
    let mut a = hashed_request(0, &[1, 2]);
    a.arrival_timestamp_ms = Some(10_000);
    let mut b = hashed_request(1, &[1, 2]);
    b.arrival_timestamp_ms = Some(12_000);
    let source = InMemorySource::from(vec![a, b]);
    let snapshot = run(&config, &source).unwrap();
    assert_eq!(snapshot.throughput_source, ThroughputSource::Timestamp);
    // 2048 tokens over 2 seconds.
    assert!((snapshot.throughput_tokens_per_s - 1024.0).abs() < 1e-9);
}

#[test]
fn test_malformed_request_aborts_run() {
    let config = lru_config(8);
    let mut bad = hashed_request(1, &[1, 2, 3]);
    bad.input_length = 512; // expects 1 block, carries 3 hashes
    let source = InMemorySource::from(vec![hashed_request(0, &[9]), bad]);
    let result = run(&config, &source);
    assert!(matches!(
        result,
        Err(SimError::MalformedRequest { request_id: 1, .. })
    ));
}

#[test]
fn test_trace_workload_end_to_end_with_fraction_capacity() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    let lines = [
        r#"{"timestamp": 1000, "input_length": 1024, "output_length": 0, "hash_ids": [1, 2]}"#,
        r#"{"timestamp": 2000, "input_length": 1024, "output_length": 0, "hash_ids": [1, 2]}"#,
        r#"{"timestamp": 3000, "input_length": 1024, "output_length": 0, "hash_ids": [3, 4]}"#,
    ];
    for line in lines {
        writeln!(file, "{line}").unwrap();
    }
    let workload = TraceWorkload::load(file.path()).unwrap();
    assert_eq!(workload.unique_blocks(), 4);

    let mut config = Config::default();
    config.cache.capacity_blocks = None;
    config.cache.capacity_fraction = Some(0.5);

    let store = build_store(&config.cache, Some(workload.unique_blocks())).unwrap();
    assert_eq!(store.capacity(), 2);

    let snapshot = SimulationDriver::new(&config, store).run(&workload).unwrap();
    assert_eq!(snapshot.total_requests, 3);
    // Request 2 replays request 1's blocks fully.
    assert_eq!(snapshot.block_hits, 2);
    assert_eq!(snapshot.full_prefix_hits, 1);
    assert_eq!(snapshot.throughput_source, ThroughputSource::Timestamp);
}

#[test]
fn test_reuse_distance_histogram_populated() {
    let config = lru_config(16);
    let source = InMemorySource::from(vec![
        hashed_request(0, &[1, 2, 3, 4]),
        hashed_request(1, &[1, 2, 3, 4]),
    ]);
    let snapshot = run(&config, &source).unwrap();
    // Each of the 4 keys re-accessed with 3 distinct keys between → bucket 2.
    assert_eq!(snapshot.reuse_distance_histogram.get(&2), Some(&4));
}
