//! Route handlers.

use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::extract::rejection::BytesRejection;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use tracing::{Instrument, error, info_span, warn};

use super::{ApiState, request_id};
use crate::envelope::{AcceptedResponse, ApiResponse, ErrorResponse};
use crate::queue::Queue;

/// `POST /v1/provision`: validate, publish, acknowledge.
///
/// The body is read as raw bytes so that decoding failures, including
/// bodies above [`MAX_BODY_BYTES`](super::MAX_BODY_BYTES), are reported in the
/// error envelope rather than by the extractor.
pub async fn provision<Q>(
    State(state): State<Arc<ApiState<Q>>>,
    headers: HeaderMap,
    payload: Result<Bytes, BytesRejection>,
) -> Response
where
    Q: Queue + 'static,
{
    let request_id = request_id(&headers);
    let span = info_span!("provision", request_id = %request_id);

    async move {
        let body = match payload {
            Ok(bytes) => bytes,
            Err(rejection) => return unreadable_body(request_id, &rejection),
        };
        let request = match state.validator().validate(&body) {
            Ok(request) => request,
            Err(rejection) => {
                warn!(
                    code = rejection.code(),
                    details = rejection.details().len(),
                    error = %rejection,
                    "provisioning request rejected"
                );
                return (
                    StatusCode::BAD_REQUEST,
                    Json(ErrorResponse::from_rejection(request_id, rejection)),
                )
                    .into_response();
            }
        };

        if let Err(err) = state.publisher().publish(&request).await {
            error!(resource_id = %request.id, error = %err, "failed to publish provisioning request");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::internal(request_id)),
            )
                .into_response();
        }

        let accepted = AcceptedResponse::queued(request.id);
        (
            StatusCode::ACCEPTED,
            Json(ApiResponse::success(accepted, request_id)),
        )
            .into_response()
    }
    .instrument(span)
    .await
}

fn unreadable_body(request_id: String, rejection: &BytesRejection) -> Response {
    warn!(status = %rejection.status(), error = %rejection.body_text(), "request body rejected");
    if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return (
            StatusCode::PAYLOAD_TOO_LARGE,
            Json(ErrorResponse::payload_too_large(request_id)),
        )
            .into_response();
    }
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse::invalid_json(request_id)),
    )
        .into_response()
}

/// `GET /v1/health`.
pub async fn health() -> &'static str {
    "OK"
}

/// Fallback for unknown routes.
pub async fn not_found(headers: HeaderMap) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse::not_found(request_id(&headers))),
    )
        .into_response()
}
