//! HTTP service that wraps submitted JavaScript into an IIFE.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod transform;

pub use config::schema::ServiceConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use transform::{SwcTransformer, TransformOptions, Transformer};
