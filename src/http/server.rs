//! HTTP server setup and the transform handler.
//!
//! # Responsibilities
//! - Create the Axum Router routing every path and method to one handler
//! - Wire up middleware (request ID, tracing, timeout)
//! - Bind server to listener and shut down gracefully
//! - Validate `src`, run the transform off the async runtime, frame the reply

use axum::{
    extract::{RawQuery, State},
    http::{HeaderMap, HeaderName, StatusCode},
    response::Response,
    routing::any,
    Router,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::ServiceConfig;
use crate::http::request::{first_query_value, request_id, MakeRequestUuidV4, SRC_PARAM, X_REQUEST_ID};
use crate::http::response::{empty, ResponseHeaders};
use crate::observability::metrics;
use crate::transform::{SwcTransformer, TransformOptions, Transformer};

/// Errors raised while constructing or running the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("invalid response header value: {0}")]
    Header(#[from] axum::http::header::InvalidHeaderValue),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Application state injected into the handler.
#[derive(Clone)]
pub struct AppState {
    pub transformer: Arc<dyn Transformer>,
    pub options: Arc<TransformOptions>,
    pub max_source_bytes: usize,
    pub headers: Arc<ResponseHeaders>,
}

/// HTTP server for the transform service.
///
/// Owns its router; nothing is registered globally, so a server can be built
/// and exercised in-process without a listener.
pub struct HttpServer {
    router: Router,
    config: ServiceConfig,
}

impl HttpServer {
    /// Create a server backed by the swc transformer.
    pub fn new(config: ServiceConfig) -> Result<Self, ServerError> {
        Self::with_transformer(config, Arc::new(SwcTransformer))
    }

    /// Create a server with a custom transformer.
    pub fn with_transformer(
        config: ServiceConfig,
        transformer: Arc<dyn Transformer>,
    ) -> Result<Self, ServerError> {
        let state = AppState {
            transformer,
            options: Arc::new(config.transform.options()),
            max_source_bytes: config.transform.max_source_bytes,
            headers: Arc::new(ResponseHeaders::from_config(&config.response)?),
        };

        let router = Self::build_router(&config, state);
        Ok(Self { router, config })
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &ServiceConfig, state: AppState) -> Router {
        let x_request_id = HeaderName::from_static(X_REQUEST_ID);

        Router::new()
            .route("/{*path}", any(transform_handler))
            .route("/", any(transform_handler))
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuidV4))
                    .layer(TraceLayer::new_for_http())
                    .layer(PropagateRequestIdLayer::new(x_request_id))
                    .layer(TimeoutLayer::new(Duration::from_secs(
                        config.timeouts.request_secs,
                    ))),
            )
    }

    /// A clone of the router, for serving or in-process calls.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server until the shutdown signal fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), ServerError> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            format = %self.config.transform.format,
            global_name = %self.config.transform.global_name,
            "HTTP server starting"
        );

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Transform the first `src` query value and return it as JavaScript.
async fn transform_handler(
    State(state): State<AppState>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
) -> Response {
    let start_time = Instant::now();
    let request_id = request_id(&headers);

    let Some(source) = first_query_value(query.as_deref(), SRC_PARAM) else {
        tracing::debug!(request_id = %request_id, "Missing src parameter");
        metrics::record_transform("missing_src", start_time);
        return empty(StatusCode::BAD_REQUEST);
    };

    let source_len = source.len();
    if source_len > state.max_source_bytes {
        tracing::warn!(
            request_id = %request_id,
            source_len,
            limit = state.max_source_bytes,
            "Source exceeds size limit"
        );
        metrics::record_transform("too_large", start_time);
        return empty(StatusCode::PAYLOAD_TOO_LARGE);
    }

    let transformer = Arc::clone(&state.transformer);
    let options = Arc::clone(&state.options);
    let result =
        tokio::task::spawn_blocking(move || transformer.transform(&source, &options)).await;

    match result {
        Ok(Ok(code)) => {
            tracing::debug!(
                request_id = %request_id,
                source_len,
                output_len = code.len(),
                elapsed_ms = start_time.elapsed().as_millis() as u64,
                "Transformed source"
            );
            metrics::record_transform("ok", start_time);
            state.headers.javascript(code)
        }
        Ok(Err(error)) => {
            tracing::warn!(
                request_id = %request_id,
                source_len,
                kind = error.kind(),
                error = %error,
                "Transform failed"
            );
            metrics::record_transform(error.kind(), start_time);
            state.headers.transform_failure(&error)
        }
        Err(join_error) => {
            tracing::error!(
                request_id = %request_id,
                error = %join_error,
                "Transform task did not complete"
            );
            metrics::record_transform("internal_error", start_time);
            state.headers.internal_error()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Method, Request};
    use std::sync::Mutex;
    use tower::ServiceExt;

    use crate::transform::TransformError;

    /// Records its inputs and echoes the source back.
    #[derive(Default)]
    struct EchoTransformer {
        calls: Mutex<Vec<String>>,
    }

    impl Transformer for EchoTransformer {
        fn transform(&self, source: &str, _options: &TransformOptions) -> Result<Vec<u8>, TransformError> {
            self.calls.lock().unwrap().push(source.to_string());
            Ok(format!("/*{}*/", source).into_bytes())
        }
    }

    fn echo_server() -> (Router, Arc<EchoTransformer>) {
        let echo = Arc::new(EchoTransformer::default());
        let server = HttpServer::with_transformer(ServiceConfig::default(), echo.clone()).unwrap();
        (server.router(), echo)
    }

    async fn call(router: Router, method: Method, uri: &str) -> (StatusCode, HeaderMap, Vec<u8>) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        let response = router.oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, headers, body.to_vec())
    }

    #[tokio::test]
    async fn test_missing_src_is_bad_request() {
        let (router, echo) = echo_server();
        let (status, headers, body) = call(router, Method::GET, "/").await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.is_empty());
        assert!(headers.get(header::CACHE_CONTROL).is_none());
        assert!(echo.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_success_headers() {
        let (router, _) = echo_server();
        let (status, headers, body) = call(router, Method::GET, "/?src=abc").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers[header::CACHE_CONTROL], "s-maxage=2419200");
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert_eq!(headers[header::CONTENT_TYPE], "application/javascript");
        assert!(headers.contains_key(X_REQUEST_ID));
        assert_eq!(body, b"/*abc*/");
    }

    #[tokio::test]
    async fn test_only_first_src_is_used() {
        let (router, echo) = echo_server();
        let (status, _, _) = call(router, Method::GET, "/?src=first&src=second").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(*echo.calls.lock().unwrap(), vec!["first".to_string()]);
    }

    #[tokio::test]
    async fn test_any_path_and_method() {
        let (router, echo) = echo_server();
        let (status, _, _) = call(router.clone(), Method::POST, "/api/esbuild-transform?src=a").await;
        assert_eq!(status, StatusCode::OK);
        let (status, _, _) = call(router, Method::PUT, "/deep/nested/path?src=b").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(echo.calls.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_empty_src_is_transformed() {
        let (router, echo) = echo_server();
        let (status, _, _) = call(router, Method::GET, "/?src=").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(*echo.calls.lock().unwrap(), vec![String::new()]);
    }

    #[tokio::test]
    async fn test_oversized_src_is_rejected() {
        let echo = Arc::new(EchoTransformer::default());
        let mut config = ServiceConfig::default();
        config.transform.max_source_bytes = 4;
        let router = HttpServer::with_transformer(config, echo.clone()).unwrap().router();

        let (status, _, body) = call(router, Method::GET, "/?src=12345").await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert!(body.is_empty());
        assert!(echo.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_syntax_error_is_server_error_with_diagnostics() {
        let router = HttpServer::new(ServiceConfig::default()).unwrap().router();
        let (status, headers, body) = call(router, Method::GET, "/?src=let%20%3D%3B").await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(headers.get(header::CACHE_CONTROL).is_none());
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        let body = String::from_utf8(body).unwrap();
        assert!(body.starts_with("<stdin>:1:"), "got: {body}");
        assert!(body.contains("error:"));
    }

    #[test]
    fn test_invalid_header_config_is_rejected() {
        let mut config = ServiceConfig::default();
        config.response.allow_origin = "bad\nvalue".into();
        assert!(matches!(HttpServer::new(config), Err(ServerError::Header(_))));
    }
}
