//! Context registry: one-time init, identity assignment, teardown.
//!
//! # Responsibilities
//! - Compute the effective per-worker slot capacity (next power of two)
//! - Build the connection matrix once and distribute one row per Context
//! - Hand each worker a unique identity, exactly once
//!
//! # Design Decisions
//! - The identity counter's mutex is the only lock in the subsystem, taken
//!   only at startup; steady-state request paths are lock-free
//! - Init failure at any step releases everything built so far before
//!   returning; no partial registry ever escapes
//! - Contexts transfer out by value, so a worker's steady-state access has
//!   no indirection through the registry

use std::sync::Mutex;

use crate::config::GatewayConfig;
use crate::error::{GatewayError, GatewayResult};
use crate::mux::context::Context;
use crate::mux::matrix::ConnectionMatrix;

/// Unique identity of one worker, assigned exactly once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorkerId(u16);

impl WorkerId {
    pub fn new(id: u16) -> Self {
        Self(id)
    }

    pub fn as_u16(&self) -> u16 {
        self.0
    }

    pub fn as_usize(&self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for WorkerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "worker-{}", self.0)
    }
}

/// Owns every worker Context until its worker claims it.
#[derive(Debug)]
pub struct ContextRegistry {
    worker_count: u16,
    capacity: u16,
    /// Monotonic identity counter; never exceeds `worker_count`.
    worker_id_counter: Mutex<u16>,
    /// One entry per worker; `None` once claimed or torn down.
    contexts: Vec<Mutex<Option<Context>>>,
}

impl ContextRegistry {
    /// Build the whole fleet's multiplexing state from configuration.
    ///
    /// Rounds the requested capacity up to a power of two, builds the
    /// connection matrix once, then assembles one Context per worker with
    /// `request_offset = 1 + capacity * worker`. Any failure drops the
    /// already-built Contexts and the undistributed matrix before
    /// returning.
    pub fn init(config: &GatewayConfig) -> GatewayResult<Self> {
        if config.workers == 0 {
            return Err(GatewayError::Config("worker count must be at least 1".into()));
        }
        let capacity = effective_capacity(config.request_capacity)?;

        // The fleet's id range is [1, 1 + capacity * workers); FastCGI
        // request ids are 16-bit, so the top of the range must fit.
        let top = 1u32 + capacity as u32 * config.workers as u32;
        if top - 1 > u16::MAX as u32 {
            return Err(GatewayError::Config(format!(
                "capacity {} x {} workers exceeds the 16-bit request-id space",
                capacity, config.workers
            )));
        }

        let mut matrix = ConnectionMatrix::build(config, config.workers)?;

        let mut contexts = Vec::with_capacity(config.workers as usize);
        for worker in 0..config.workers {
            let worker_id = WorkerId::new(worker);
            let row = matrix
                .claim_row(worker_id)
                .map_err(|e| GatewayError::Init {
                    stage: "context",
                    reason: e.to_string(),
                })?;
            let offset = 1 + capacity * worker;
            contexts.push(Mutex::new(Some(Context::new(
                row, worker_id, offset, capacity,
            ))));
        }
        // All rows are distributed; the matrix shell is released here.
        debug_assert_eq!(matrix.remaining(), 0);

        tracing::info!(
            workers = config.workers,
            capacity,
            locations = config.locations.len(),
            "context registry initialized"
        );

        Ok(Self {
            worker_count: config.workers,
            capacity,
            worker_id_counter: Mutex::new(0),
            contexts,
        })
    }

    pub fn worker_count(&self) -> u16 {
        self.worker_count
    }

    /// Effective per-worker slot capacity (power of two).
    pub fn capacity(&self) -> u16 {
        self.capacity
    }

    /// Issue the next worker identity. Safe under concurrent calls from
    /// every worker at startup; fails once all identities are out.
    pub fn assign_worker_id(&self) -> GatewayResult<WorkerId> {
        let mut counter = self
            .worker_id_counter
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if *counter >= self.worker_count {
            return Err(GatewayError::Exhausted {
                resource: "worker ids",
            });
        }
        let id = WorkerId::new(*counter);
        *counter += 1;
        Ok(id)
    }

    /// Transfer exclusive ownership of a worker's Context. A second claim
    /// for the same identity fails: the Context is already live on its
    /// worker.
    pub fn claim(&self, worker_id: WorkerId) -> GatewayResult<Context> {
        let entry = self
            .contexts
            .get(worker_id.as_usize())
            .ok_or(GatewayError::Range {
                what: "worker id",
                index: worker_id.as_usize(),
                len: self.contexts.len(),
            })?;
        entry
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
            .ok_or(GatewayError::Missing {
                what: "context",
                index: worker_id.as_usize(),
            })
    }

    /// Release every unclaimed Context. Idempotent; claimed Contexts are
    /// released by their workers when they exit.
    pub fn teardown(&mut self) {
        for entry in &self.contexts {
            entry
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .take();
        }
        tracing::debug!("context registry torn down");
    }
}

/// Round the requested per-worker capacity up to the next power of two,
/// rejecting values that would leave the 16-bit id space.
fn effective_capacity(requested: u32) -> GatewayResult<u16> {
    if requested == 0 {
        return Err(GatewayError::Config(
            "request capacity must be at least 1".into(),
        ));
    }
    // Checked: a request above 2^31 has no u32 power-of-two ceiling.
    match requested.checked_next_power_of_two() {
        Some(effective) if effective < 65536 => Ok(effective as u16),
        _ => Err(GatewayError::Config(format!(
            "request capacity {} rounds up past the 16-bit request-id limit",
            requested
        ))),
    }
}
