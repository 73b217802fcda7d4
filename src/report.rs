//! Rendering of a finalized [`MetricsSnapshot`].
//!
//! The core makes no assumption about serialization format; this module is
//! the thin presentation layer the binary uses.

use crate::sim::metrics::MetricsSnapshot;

/// Render the snapshot as a human-readable report.
pub fn render_text(s: &MetricsSnapshot) -> String {
    let mut out = String::new();
    out.push_str("KV Cache Simulation Report\n");
    out.push_str(&format!("Policy: {}\n", s.policy));
    out.push_str(&format!(
        "Total requests: {} ({} degenerate)\n",
        s.total_requests, s.degenerate_requests
    ));
    out.push_str(&format!(
        "Block hits/misses: {}/{} (hit rate {:.4})\n",
        s.block_hits, s.block_misses, s.block_hit_rate
    ));
    if s.l2_hits > 0 || s.l2_blocks > 0 {
        out.push_str(&format!("  L1 hits: {}  L2 hits: {}\n", s.l1_hits, s.l2_hits));
    }
    out.push_str(&format!(
        "Full-prefix hits/misses: {}/{} (hit rate {:.4})\n",
        s.full_prefix_hits, s.full_prefix_misses, s.full_prefix_hit_rate
    ));
    out.push_str(&format!(
        "Resident blocks: L1={} L2={}\n",
        s.l1_blocks, s.l2_blocks
    ));
    out.push_str(&format!(
        "Bytes requested/read/written: {}/{}/{}\n",
        s.bytes_requested, s.bytes_read, s.bytes_written
    ));
    out.push_str(&format!(
        "TTFT (ms): mean={:.2} p50={:.2} p95={:.2} p99={:.2} max={:.2}\n",
        s.ttft.mean, s.ttft.p50, s.ttft.p95, s.ttft.p99, s.ttft.max
    ));
    out.push_str(&format!(
        "Throughput (tokens/s): {:.2} ({})\n",
        s.throughput_tokens_per_s, s.throughput_source
    ));
    if !s.reuse_distance_histogram.is_empty() {
        out.push_str("Reuse distance histogram:\n");
        for (&bucket, &count) in &s.reuse_distance_histogram {
            out.push_str(&format!("  {} {}\n", bucket_range(bucket), count));
        }
    }
    out
}

/// Render the snapshot as pretty-printed JSON.
pub fn render_json(s: &MetricsSnapshot) -> serde_json::Result<String> {
    serde_json::to_string_pretty(s)
}

fn bucket_range(bucket: u32) -> String {
    if bucket == 0 {
        "[0]".to_string()
    } else {
        format!("[{}, {})", 1u64 << (bucket - 1), 1u64 << bucket)
    }
}
