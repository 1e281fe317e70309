//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! ConnectionMatrix cell
//!     → upstream.rs (endpoint, dial policy, state machine)
//!     → Transport handed to the FastCGI record codec layered above
//!
//! Connection States:
//!     Disconnected → Connecting → Connected
//!     Connected → Broken (I/O failure)
//!     Broken → Connecting (next use)
//! ```
//!
//! # Design Decisions
//! - No I/O at construction; dialing is a worker-driven policy choice
//! - A broken connection is redialed lazily, never inside teardown
//! - TCP and Unix-socket endpoints behind one handle type

pub mod upstream;

pub use upstream::{ConnectionState, Endpoint, Transport, UpstreamConnection};
