//! FastCGI Gateway Multiplexing Core Library

pub mod config;
pub mod error;
pub mod lifecycle;
pub mod mux;
pub mod net;
pub mod worker;

pub use config::GatewayConfig;
pub use error::{GatewayError, GatewayResult};
pub use lifecycle::Shutdown;
pub use mux::ContextRegistry;
pub use worker::Worker;
