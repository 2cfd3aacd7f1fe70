//! HTTP ingress.
//!
//! Routes:
//!
//! - `POST /v1/provision` (and the unversioned `POST /provision`) validates
//!   the body, publishes it and answers `202 Accepted`.
//! - `GET /v1/health` answers `200 OK` with the body `OK`.
//!
//! Unknown routes answer `404` with the error envelope. Every response
//! carries the standard security and version headers. A panicking handler
//! is answered with `500 INTERNAL_ERROR` instead of dropping the connection.

use std::any::Any;
use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, Request};
use axum::http::header::{CACHE_CONTROL, X_CONTENT_TYPE_OPTIONS, X_FRAME_OPTIONS};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::envelope::{API_VERSION, ErrorResponse};
use crate::publisher::Publisher;
use crate::queue::Queue;
use crate::validation::RequestValidator;

mod cors;
mod handlers;

pub use cors::{AllowedOrigins, InvalidOrigin, PREFLIGHT_MAX_AGE, cors_layer};
pub use handlers::{health, not_found, provision};

/// Largest request body accepted, in bytes.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Primary correlation header.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Correlation header set by AWS load balancers, used as a fallback.
pub const TRACE_ID_HEADER: &str = "x-amzn-trace-id";

/// Header advertising the API version.
pub const API_VERSION_HEADER: &str = "x-api-version";

/// Shared state handed to every handler.
#[derive(Debug)]
pub struct ApiState<Q> {
    publisher: Publisher<Q>,
    validator: RequestValidator,
    allowed_origins: AllowedOrigins,
}

impl<Q: Queue> ApiState<Q> {
    /// Builds state from an explicit publisher and validator.
    #[must_use]
    pub const fn new(publisher: Publisher<Q>, validator: RequestValidator) -> Self {
        Self {
            publisher,
            validator,
            allowed_origins: AllowedOrigins::Any,
        }
    }

    /// Restricts browser access to `origins`.
    #[must_use]
    pub fn with_allowed_origins(mut self, origins: AllowedOrigins) -> Self {
        self.allowed_origins = origins;
        self
    }

    /// Builds state publishing to `queue` with the default validator.
    #[must_use]
    pub const fn for_queue(queue: Q) -> Self {
        Self::new(Publisher::new(queue), RequestValidator::new())
    }

    /// Publisher used by the provision handler.
    #[must_use]
    pub const fn publisher(&self) -> &Publisher<Q> {
        &self.publisher
    }

    /// Validator used by the provision handler.
    #[must_use]
    pub const fn validator(&self) -> &RequestValidator {
        &self.validator
    }

    /// Origins allowed by the CORS layer.
    #[must_use]
    pub const fn allowed_origins(&self) -> &AllowedOrigins {
        &self.allowed_origins
    }
}

/// Builds the application router.
pub fn router<Q>(state: ApiState<Q>) -> Router
where
    Q: Queue + 'static,
{
    let cors = cors_layer(state.allowed_origins());
    Router::new()
        .route("/v1/provision", post(provision::<Q>))
        .route("/provision", post(provision::<Q>))
        .route("/v1/health", get(health))
        .fallback(not_found)
        .with_state(Arc::new(state))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(CatchPanicLayer::custom(
            |panic: Box<dyn Any + Send + 'static>| recover_panic(&*panic),
        ))
        .layer(cors)
        .layer(middleware::from_fn(standard_headers))
        .layer(TraceLayer::new_for_http())
}

/// Extracts the correlation identifier from request headers.
///
/// Returns an empty string when neither header carries a printable value.
#[must_use]
pub fn request_id(headers: &HeaderMap) -> String {
    [REQUEST_ID_HEADER, TRACE_ID_HEADER]
        .iter()
        .filter_map(|name| headers.get(*name))
        .filter_map(|value| value.to_str().ok())
        .map(str::trim)
        .find(|value| !value.is_empty())
        .map(str::to_owned)
        .unwrap_or_default()
}

/// Marks a response produced by [`recover_panic`] so that
/// [`standard_headers`] can attach the request identifier.
#[derive(Clone, Copy, Debug)]
struct PanicRecovered;

fn recover_panic(panic: &(dyn Any + Send)) -> Response {
    let detail = panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("non-string panic payload");
    error!(panic = detail, "request handler panicked");

    let mut response = (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse::internal(String::new())),
    )
        .into_response();
    response.extensions_mut().insert(PanicRecovered);
    response
}

async fn standard_headers(request: Request, next: Next) -> Response {
    let correlation_id = request_id(request.headers());
    let echoed_id = request.headers().get(REQUEST_ID_HEADER).cloned();
    let mut response = next.run(request).await;
    if response.extensions().get::<PanicRecovered>().is_some() {
        response = (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse::internal(correlation_id)),
        )
            .into_response();
    }

    let headers = response.headers_mut();
    headers.insert(X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
    headers.insert(X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    headers.insert(
        CACHE_CONTROL,
        HeaderValue::from_static("no-store, no-cache, must-revalidate"),
    );
    headers.insert(
        HeaderName::from_static(API_VERSION_HEADER),
        HeaderValue::from_static(API_VERSION),
    );
    if let Some(value) = echoed_id {
        headers.insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
    }
    response
}
