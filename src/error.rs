//! Gateway error taxonomy.
//!
//! Initialization errors unwind fully inside the failing call and are
//! returned to the caller; this subsystem never exits the process. Runtime
//! errors (exhaustion, connection breakage) are scoped to a single request
//! and never abort another in-flight request or the owning worker.

use thiserror::Error;

/// Errors surfaced by the multiplexing core.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Configuration is outside the representable range.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A multi-stage initialization step failed. Everything built before
    /// the failing step has already been released.
    #[error("initialization failed at {stage}: {reason}")]
    Init { stage: &'static str, reason: String },

    /// A bounded resource ran out. Recoverable: the caller should reject
    /// or defer the request, not retry in a loop.
    #[error("{resource} exhausted")]
    Exhausted { resource: &'static str },

    /// Backend connection is broken and the reconnect attempt failed.
    /// Scoped to the requesting call.
    #[error("connection to location '{location}' failed: {source}")]
    Connection {
        location: String,
        #[source]
        source: std::io::Error,
    },

    /// Lookup index outside the valid range. Indicates a caller bug.
    #[error("{what} {index} out of range 0..{len}")]
    Range {
        what: &'static str,
        index: usize,
        len: usize,
    },

    /// Lookup target is absent: already claimed, torn down, or never
    /// initialized.
    #[error("{what} {index} is absent")]
    Missing { what: &'static str, index: usize },
}

/// Result type for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;
