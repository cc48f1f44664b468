//! Configuration schema definitions.
//!
//! Every section has defaults matching the service's historical constants, so
//! an empty file (or no file at all) yields the stock behaviour.

use serde::{Deserialize, Serialize};

use crate::transform::{Format, TransformOptions, DEFAULT_GLOBAL_NAME};

/// Default `s-maxage`: 28 days.
pub const DEFAULT_SHARED_MAX_AGE_SECS: u64 = 2_419_200;

/// Default cap on the decoded `src` value, in bytes.
pub const DEFAULT_MAX_SOURCE_BYTES: usize = 60 * 1024;

/// Root configuration for the transform service.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServiceConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Transform options applied to every request.
    pub transform: TransformConfig,

    /// Response header settings.
    pub response: ResponseConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:3001").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3001".to_string(),
        }
    }
}

/// Transform configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TransformConfig {
    /// Output format: "iife", "cjs" or "esm".
    pub format: Format,

    /// Global the IIFE result is assigned to. Empty for a bare IIFE.
    pub global_name: String,

    /// Strip whitespace from the output.
    pub minify: bool,

    /// Largest accepted `src` value in bytes. The HTTP stack refuses URIs
    /// longer than 65534 bytes, so larger values never take effect.
    pub max_source_bytes: usize,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            format: Format::Iife,
            global_name: DEFAULT_GLOBAL_NAME.to_string(),
            minify: false,
            max_source_bytes: DEFAULT_MAX_SOURCE_BYTES,
        }
    }
}

impl TransformConfig {
    /// Options handed to the transformer.
    pub fn options(&self) -> TransformOptions {
        TransformOptions {
            format: self.format,
            global_name: self.global_name.clone(),
            minify: self.minify,
        }
    }
}

/// Response header configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ResponseConfig {
    /// `s-maxage` value for shared caches, in seconds.
    pub shared_max_age_secs: u64,

    /// `Access-Control-Allow-Origin` value.
    pub allow_origin: String,
}

impl Default for ResponseConfig {
    fn default() -> Self {
        Self {
            shared_max_age_secs: DEFAULT_SHARED_MAX_AGE_SECS,
            allow_origin: "*".to_string(),
        }
    }
}

impl ResponseConfig {
    /// Value of the `Cache-Control` header on successful responses.
    pub fn cache_control(&self) -> String {
        format!("s-maxage={}", self.shared_max_age_secs)
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable the Prometheus metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
