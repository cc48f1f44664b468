//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware, handler)
//!     → request.rs (request ID, `src` extraction)
//!     → transform subsystem (blocking pool)
//!     → response.rs (headers, diagnostics)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::{first_query_value, MakeRequestUuidV4, SRC_PARAM, X_REQUEST_ID};
pub use response::ResponseHeaders;
pub use server::{AppState, HttpServer, ServerError};
