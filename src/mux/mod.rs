//! Request-multiplexing core.
//!
//! # Data Flow
//! ```text
//! Startup:
//!     GatewayConfig
//!         → registry.rs (capacity check, one-time matrix build)
//!         → matrix.rs (one connection per (location, worker), row-major)
//!         → context.rs (one Context per worker, one matrix row each)
//!
//! Per worker, per request:
//!     begin_request → slots.rs (unique id, O(1) allocate)
//!         → matrix row (dedicated connection, redial if broken)
//!         → chunk.rs (pooled body buffers)
//!         → end_request / abort_request (release slot, recycle chunks)
//! ```
//!
//! # Design Decisions
//! - Shared-nothing steady state: each worker touches only its own Context
//! - The startup identity counter is the subsystem's only lock
//! - Slot-id ranges are disjoint per worker by construction, so ids are
//!   fleet-unique without negotiation

pub mod chunk;
pub mod context;
pub mod matrix;
pub mod registry;
pub mod slots;

pub use chunk::{Chunk, ChunkBufferPool};
pub use context::Context;
pub use matrix::{ConnectionMatrix, ConnectionRow, LocationId};
pub use registry::{ContextRegistry, WorkerId};
pub use slots::{RequestSlotTable, SlotId, SlotState};
