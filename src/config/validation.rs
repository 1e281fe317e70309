//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (worker count, request capacity bounds)
//! - Check location names are unique and endpoints parseable
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::fmt;

use crate::config::schema::GatewayConfig;
use crate::net::upstream::Endpoint;

/// A single semantic validation failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// `workers` is zero.
    NoWorkers,
    /// No upstream locations configured.
    NoLocations,
    /// `request_capacity` is zero.
    ZeroCapacity,
    /// Rounding `request_capacity` up to a power of two leaves the 16-bit
    /// request-id space.
    CapacityTooLarge { requested: u32 },
    /// Two locations share a name.
    DuplicateLocation(String),
    /// A location address is neither "host:port" nor "unix:/path".
    InvalidEndpoint { location: String, address: String },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::NoWorkers => write!(f, "workers must be at least 1"),
            ValidationError::NoLocations => write!(f, "at least one location is required"),
            ValidationError::ZeroCapacity => write!(f, "request_capacity must be at least 1"),
            ValidationError::CapacityTooLarge { requested } => write!(
                f,
                "request_capacity {} rounds up past the 16-bit request-id limit",
                requested
            ),
            ValidationError::DuplicateLocation(name) => {
                write!(f, "duplicate location name '{}'", name)
            }
            ValidationError::InvalidEndpoint { location, address } => {
                write!(f, "location '{}' has invalid address '{}'", location, address)
            }
        }
    }
}

/// Validate a configuration, collecting every error found.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.workers == 0 {
        errors.push(ValidationError::NoWorkers);
    }

    if config.request_capacity == 0 {
        errors.push(ValidationError::ZeroCapacity);
    } else if config
        .request_capacity
        .checked_next_power_of_two()
        .map_or(true, |c| c >= 65536)
    {
        errors.push(ValidationError::CapacityTooLarge {
            requested: config.request_capacity,
        });
    }

    if config.locations.is_empty() {
        errors.push(ValidationError::NoLocations);
    }

    let mut seen = HashSet::new();
    for location in &config.locations {
        if !seen.insert(location.name.as_str()) {
            errors.push(ValidationError::DuplicateLocation(location.name.clone()));
        }
        if Endpoint::parse(&location.address).is_none() {
            errors.push(ValidationError::InvalidEndpoint {
                location: location.name.clone(),
                address: location.address.clone(),
            });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
