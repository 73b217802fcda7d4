//! Error types for the simulator core.
//!
//! Every failure is fatal for the run: the simulator either consumes the full
//! request stream or aborts without emitting a snapshot. There is no retry
//! path anywhere: all operations are deterministic, so retrying would
//! reproduce the same failure.

use thiserror::Error;

/// Errors surfaced by the simulator core.
#[derive(Error, Debug)]
pub enum SimError {
    /// Invalid configuration, detected before the simulation starts.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// A request in the stream violates the input contract. The whole run
    /// fails; skipping requests would bias comparisons between policy runs.
    #[error("malformed request {request_id}: {reason}")]
    MalformedRequest { request_id: u64, reason: String },

    /// Internal invariant violation, e.g. mutating a finalized collector.
    #[error("state error: {0}")]
    State(String),

    /// Workload I/O failure while reading a trace file.
    #[error("failed to read workload: {0}")]
    Io(#[from] std::io::Error),
}

impl SimError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        SimError::Configuration(msg.into())
    }

    pub fn malformed(request_id: u64, reason: impl Into<String>) -> Self {
        SimError::MalformedRequest {
            request_id,
            reason: reason.into(),
        }
    }

    pub fn state(msg: impl Into<String>) -> Self {
        SimError::State(msg.into())
    }
}
