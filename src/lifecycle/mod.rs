//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (main.rs):
//!     Load config → Validate → ContextRegistry::init → Spawn workers
//!
//! Shutdown (shutdown.rs):
//!     SIGINT received → broadcast → workers drop their Contexts → Exit
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then the registry, then workers
//! - Shutdown is a broadcast; each worker releases its own partition
//! - Teardown is RAII: slots, then connection row, then buffer pool

pub mod shutdown;

pub use shutdown::Shutdown;
