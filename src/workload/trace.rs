//! JSONL trace workload loader.
//!
//! Each line is a JSON object with `timestamp` (ms), `input_length`,
//! `output_length`, and `hash_ids`, the content hashes of the prompt's
//! blocks in prefix order. Lines that fail to parse as JSON are skipped with
//! a warning; records that parse but violate the input contract (negative
//! lengths) fail the load, since silently dropping them would bias
//! comparisons.

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use serde::Deserialize;
use tracing::warn;

use crate::error::SimError;
use crate::workload::{InMemorySource, Request, RequestSource, RequestType};

#[derive(Debug, Deserialize)]
struct TraceRecord {
    #[serde(default)]
    timestamp: Option<i64>,
    #[serde(default)]
    input_length: i64,
    #[serde(default)]
    output_length: i64,
    #[serde(default)]
    hash_ids: Option<serde_json::Value>,
}

/// A trace workload, fully materialized at load time.
#[derive(Debug, Clone)]
pub struct TraceWorkload {
    source: InMemorySource,
}

impl TraceWorkload {
    /// Load a JSONL trace file.
    pub fn load(path: &Path) -> Result<Self, SimError> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);

        let mut requests = Vec::new();
        let mut decode_errors = 0usize;

        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record: TraceRecord = match serde_json::from_str(&line) {
                Ok(record) => record,
                Err(_) => {
                    decode_errors += 1;
                    continue;
                }
            };
            let request_id = requests.len() as u64;
            requests.push(Self::into_request(record, request_id)?);
        }

        if decode_errors > 0 {
            warn!(
                skipped = decode_errors,
                path = %path.display(),
                "skipped malformed JSONL lines"
            );
        }

        Ok(Self {
            source: InMemorySource::new(requests),
        })
    }

    fn into_request(record: TraceRecord, request_id: u64) -> Result<Request, SimError> {
        if record.input_length < 0 || record.output_length < 0 {
            return Err(SimError::malformed(request_id, "negative length"));
        }
        let block_hashes = normalize_hash_ids(record.hash_ids.as_ref());
        Ok(Request {
            request_id,
            sequence_id: block_hashes.first().copied().unwrap_or(request_id),
            arrival_timestamp_ms: record.timestamp.filter(|&t| t > 0).map(|t| t as u64),
            input_length: record.input_length as u32,
            output_length: record.output_length as u32,
            request_type: RequestType::Prefill,
            block_hashes,
        })
    }

    /// Number of distinct content hashes across the whole trace. Used to
    /// resolve `capacity_fraction` options.
    pub fn unique_blocks(&self) -> usize {
        let mut unique = HashSet::new();
        for request in self.source.requests() {
            unique.extend(request.block_hashes.iter().copied());
        }
        unique.len()
    }

    pub fn len(&self) -> usize {
        self.source.len()
    }

    pub fn is_empty(&self) -> bool {
        self.source.is_empty()
    }
}

impl RequestSource for TraceWorkload {
    fn iter(&self) -> Box<dyn Iterator<Item = Request> + '_> {
        self.source.iter()
    }
}

/// `hash_ids` may be a list or a single scalar.
fn normalize_hash_ids(value: Option<&serde_json::Value>) -> Vec<u64> {
    match value {
        None => Vec::new(),
        Some(serde_json::Value::Array(items)) => {
            items.iter().filter_map(|v| v.as_u64()).collect()
        }
        Some(value) => value.as_u64().into_iter().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_trace(lines: &[&str]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        for line in lines {
            writeln!(file, "{line}").unwrap();
        }
        file
    }

    #[test]
    fn test_load_basic_trace() {
        let file = write_trace(&[
            r#"{"timestamp": 1000, "input_length": 1024, "output_length": 128, "hash_ids": [11, 22]}"#,
            r#"{"timestamp": 2000, "input_length": 512, "output_length": 0, "hash_ids": [11]}"#,
        ]);
        let trace = TraceWorkload::load(file.path()).unwrap();
        assert_eq!(trace.len(), 2);
        let requests: Vec<_> = trace.iter().collect();
        assert_eq!(requests[0].block_hashes, vec![11, 22]);
        assert_eq!(requests[0].arrival_timestamp_ms, Some(1000));
        assert_eq!(requests[0].sequence_id, 11);
        assert_eq!(requests[1].output_length, 0);
        assert_eq!(trace.unique_blocks(), 2);
    }

    #[test]
    fn test_malformed_json_lines_skipped() {
        let file = write_trace(&[
            r#"{"input_length": 512, "hash_ids": [1]}"#,
            "not json at all",
            r#"{"input_length": 512, "hash_ids": [2]}"#,
        ]);
        let trace = TraceWorkload::load(file.path()).unwrap();
        assert_eq!(trace.len(), 2);
    }

    #[test]
    fn test_negative_length_is_fatal() {
        let file = write_trace(&[r#"{"input_length": -5, "hash_ids": [1]}"#]);
        let err = TraceWorkload::load(file.path());
        assert!(matches!(err, Err(SimError::MalformedRequest { .. })));
    }

    #[test]
    fn test_scalar_hash_id_normalized() {
        let file = write_trace(&[r#"{"input_length": 256, "hash_ids": 7}"#]);
        let trace = TraceWorkload::load(file.path()).unwrap();
        let requests: Vec<_> = trace.iter().collect();
        assert_eq!(requests[0].block_hashes, vec![7]);
    }

    #[test]
    fn test_zero_timestamp_means_untimestamped() {
        let file = write_trace(&[r#"{"timestamp": 0, "input_length": 512, "hash_ids": [1]}"#]);
        let trace = TraceWorkload::load(file.path()).unwrap();
        let requests: Vec<_> = trace.iter().collect();
        assert_eq!(requests[0].arrival_timestamp_ms, None);
    }
}
