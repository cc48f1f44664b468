//! Configuration validation.
//!
//! Serde handles syntax; this checks values. All problems are reported, not
//! just the first.

use std::net::SocketAddr;

use axum::http::HeaderValue;
use thiserror::Error;

use crate::config::schema::ServiceConfig;
use crate::transform::is_valid_global_name;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("listener.bind_address {0:?} is not a socket address")]
    BindAddress(String),

    #[error("transform.global_name {0:?} is not an identifier path")]
    GlobalName(String),

    #[error("transform.max_source_bytes must be greater than zero")]
    MaxSourceBytes,

    #[error("timeouts.request_secs must be greater than zero")]
    RequestTimeout,

    #[error("response.allow_origin {0:?} is not a valid header value")]
    AllowOrigin(String),

    #[error("observability.metrics_address {0:?} is not a socket address")]
    MetricsAddress(String),
}

/// Validate a deserialized configuration.
pub fn validate_config(config: &ServiceConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BindAddress(
            config.listener.bind_address.clone(),
        ));
    }
    if !is_valid_global_name(&config.transform.global_name) {
        errors.push(ValidationError::GlobalName(
            config.transform.global_name.clone(),
        ));
    }
    if config.transform.max_source_bytes == 0 {
        errors.push(ValidationError::MaxSourceBytes);
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::RequestTimeout);
    }
    if HeaderValue::from_str(&config.response.allow_origin).is_err() {
        errors.push(ValidationError::AllowOrigin(
            config.response.allow_origin.clone(),
        ));
    }
    if config.observability.metrics_enabled
        && config
            .observability
            .metrics_address
            .parse::<SocketAddr>()
            .is_err()
    {
        errors.push(ValidationError::MetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
