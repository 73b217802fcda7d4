//! Request model and workload sources.
//!
//! A workload is a finite, time-ordered sequence of [`Request`] records. The
//! [`RequestSource`] abstraction makes it restartable: each call to `iter`
//! replays the stream from the start, so the same workload can be run
//! against multiple policies and produce identical inputs every time.

pub mod synthetic;
pub mod trace;

use serde::{Deserialize, Serialize};

/// One simulated inference call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    /// Unique request identifier (position in the stream).
    pub request_id: u64,

    /// Sequence (conversation) this request belongs to.
    pub sequence_id: u64,

    /// Arrival time in trace milliseconds. Absent for synthetic workloads;
    /// the driver then assigns monotone arrivals.
    #[serde(default)]
    pub arrival_timestamp_ms: Option<u64>,

    /// Prompt length in tokens.
    pub input_length: u32,

    /// Decode length in tokens (0 for pure prefill).
    #[serde(default)]
    pub output_length: u32,

    /// Request kind.
    #[serde(default)]
    pub request_type: RequestType,

    /// Content hashes of the prompt's blocks, in prefix order. Empty means
    /// block keys are derived from `(sequence_id, block_index)`.
    #[serde(default)]
    pub block_hashes: Vec<u64>,
}

/// Inference request kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestType {
    #[default]
    Prefill,
    Decode,
}

/// A finite, restartable stream of requests.
pub trait RequestSource {
    /// Iterate the workload from the start. Every call yields the same
    /// sequence, in the same order.
    fn iter(&self) -> Box<dyn Iterator<Item = Request> + '_>;
}

/// A workload held fully in memory. Used by the trace loader and by tests.
#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    requests: Vec<Request>,
}

impl InMemorySource {
    pub fn new(requests: Vec<Request>) -> Self {
        Self { requests }
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    pub fn requests(&self) -> &[Request] {
        &self.requests
    }
}

impl From<Vec<Request>> for InMemorySource {
    fn from(requests: Vec<Request>) -> Self {
        Self::new(requests)
    }
}

impl RequestSource for InMemorySource {
    fn iter(&self) -> Box<dyn Iterator<Item = Request> + '_> {
        Box::new(self.requests.iter().cloned())
    }
}
