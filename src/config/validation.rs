//! Static configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (intervals > 0, thresholds > 0, addresses parse)
//!
//! # Design Decisions
//! - Returns all validation errors, not just the first
//! - Dynamic configuration is not validated here: per-component errors are
//!   reported by the builder and only disable the affected component

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::ProxyConfig;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("entry point {name:?} has invalid address {address:?}")]
    InvalidAddress { name: String, address: String },

    #[error("entry point {0:?} allows zero connections")]
    NoConnections(String),

    #[error("admin API bind address {0:?} is invalid")]
    InvalidApiAddress(String),

    #[error("health_check.{0} must be greater than zero")]
    HealthCheck(&'static str),

    #[error("backoff: {0}")]
    Backoff(&'static str),
}

/// Validate a static configuration.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    for (name, entry_point) in &config.entry_points {
        if entry_point.address.parse::<SocketAddr>().is_err() {
            errors.push(ValidationError::InvalidAddress {
                name: name.clone(),
                address: entry_point.address.clone(),
            });
        }
        if entry_point.max_connections == 0 {
            errors.push(ValidationError::NoConnections(name.clone()));
        }
    }

    if config.api.enabled && config.api.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidApiAddress(config.api.bind_address.clone()));
    }

    let health = &config.health_check;
    if health.enabled {
        if health.interval_secs == 0 {
            errors.push(ValidationError::HealthCheck("interval_secs"));
        }
        if health.timeout_secs == 0 {
            errors.push(ValidationError::HealthCheck("timeout_secs"));
        }
        if health.healthy_threshold == 0 {
            errors.push(ValidationError::HealthCheck("healthy_threshold"));
        }
        if health.unhealthy_threshold == 0 {
            errors.push(ValidationError::HealthCheck("unhealthy_threshold"));
        }
    }

    let backoff = &config.backoff;
    if backoff.initial_interval_ms == 0 {
        errors.push(ValidationError::Backoff("initial_interval_ms must be greater than zero"));
    }
    if backoff.initial_interval_ms > backoff.max_interval_ms {
        errors.push(ValidationError::Backoff("initial_interval_ms exceeds max_interval_ms"));
    }
    if !(backoff.multiplier >= 1.0) {
        errors.push(ValidationError::Backoff("multiplier must be at least 1.0"));
    }
    if !(0.0..1.0).contains(&backoff.randomization_factor) {
        errors.push(ValidationError::Backoff("randomization_factor must be in [0, 1)"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
