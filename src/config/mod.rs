//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → GatewayConfig (validated, immutable)
//!     → consumed once by ContextRegistry::init
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; the registry is built from it exactly once
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use schema::DialPolicy;
pub use schema::GatewayConfig;
pub use schema::LocationConfig;
