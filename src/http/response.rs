//! Response framing.
//!
//! # Responsibilities
//! - Attach caching, CORS and content-type headers to transformed code
//! - Map transform failures to a plain-text diagnostic response
//!
//! # Design Decisions
//! - Header values are built once at startup from validated config
//! - Failures carry CORS so browser callers can read the diagnostics, but
//!   never `Cache-Control`

use axum::http::header::{
    InvalidHeaderValue, ACCESS_CONTROL_ALLOW_ORIGIN, CACHE_CONTROL, CONTENT_TYPE,
};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::config::ResponseConfig;
use crate::transform::TransformError;

pub const JAVASCRIPT: &str = "application/javascript";
pub const TEXT_PLAIN: &str = "text/plain; charset=utf-8";

/// Pre-built header values shared by every response.
#[derive(Debug, Clone)]
pub struct ResponseHeaders {
    cache_control: HeaderValue,
    allow_origin: HeaderValue,
}

impl ResponseHeaders {
    pub fn from_config(config: &ResponseConfig) -> Result<Self, InvalidHeaderValue> {
        Ok(Self {
            cache_control: HeaderValue::from_str(&config.cache_control())?,
            allow_origin: HeaderValue::from_str(&config.allow_origin)?,
        })
    }

    /// 200 with the transformed code.
    pub fn javascript(&self, code: Vec<u8>) -> Response {
        (
            [
                (CACHE_CONTROL, self.cache_control.clone()),
                (ACCESS_CONTROL_ALLOW_ORIGIN, self.allow_origin.clone()),
                (CONTENT_TYPE, HeaderValue::from_static(JAVASCRIPT)),
            ],
            code,
        )
            .into_response()
    }

    /// 500 with one diagnostic per line.
    pub fn transform_failure(&self, error: &TransformError) -> Response {
        self.failure(StatusCode::INTERNAL_SERVER_ERROR, error.report())
    }

    /// 500 for a transform task that never produced a result.
    pub fn internal_error(&self) -> Response {
        self.failure(
            StatusCode::INTERNAL_SERVER_ERROR,
            "<stdin>: error: transform did not complete\n".to_string(),
        )
    }

    fn failure(&self, status: StatusCode, body: String) -> Response {
        (
            status,
            [
                (ACCESS_CONTROL_ALLOW_ORIGIN, self.allow_origin.clone()),
                (CONTENT_TYPE, HeaderValue::from_static(TEXT_PLAIN)),
            ],
            body,
        )
            .into_response()
    }
}

/// Empty-bodied status response.
pub fn empty(status: StatusCode) -> Response {
    status.into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::Diagnostic;

    fn headers() -> ResponseHeaders {
        ResponseHeaders::from_config(&ResponseConfig::default()).unwrap()
    }

    #[test]
    fn test_javascript_headers() {
        let response = headers().javascript(b"var exports = 1;".to_vec());
        assert_eq!(response.status(), StatusCode::OK);
        let h = response.headers();
        assert_eq!(h[CACHE_CONTROL], "s-maxage=2419200");
        assert_eq!(h[ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert_eq!(h[CONTENT_TYPE], JAVASCRIPT);
    }

    #[test]
    fn test_failure_has_no_cache_control() {
        let error = TransformError::Syntax(vec![Diagnostic {
            line: 1,
            column: 1,
            message: "Unexpected token".into(),
        }]);
        let response = headers().transform_failure(&error);
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(response.headers().get(CACHE_CONTROL).is_none());
        assert_eq!(response.headers()[CONTENT_TYPE], TEXT_PLAIN);
    }

    #[test]
    fn test_empty_response_has_no_headers() {
        let response = empty(StatusCode::BAD_REQUEST);
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(response.headers().get(CONTENT_TYPE).is_none());
    }
}
