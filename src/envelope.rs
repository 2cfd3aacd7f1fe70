//! Uniform response envelopes for every API payload.
//!
//! Successful responses are wrapped in [`ApiResponse`]; failures use
//! [`ErrorResponse`]. Both carry the request identifier taken from the
//! inbound request headers. Building an envelope never fails.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::validation::{FieldError, INVALID_JSON, RequestRejection, VALIDATION_ERROR};

/// API version reported in `meta.apiVersion` and the `X-API-Version` header.
pub const API_VERSION: &str = "v1";

/// Error code for unexpected server-side failures.
pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";

/// Error code for unknown routes.
pub const NOT_FOUND: &str = "NOT_FOUND";

/// Error code for bodies above the accepted size.
pub const PAYLOAD_TOO_LARGE: &str = "PAYLOAD_TOO_LARGE";

/// Metadata attached to every successful response.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMeta {
    /// Correlation identifier from the inbound request, empty when absent.
    pub request_id: String,
    /// RFC 3339 UTC timestamp with second precision.
    pub timestamp: String,
    /// API version string.
    pub api_version: String,
}

impl ResponseMeta {
    /// Builds metadata stamped with the given instant.
    #[must_use]
    pub fn at(request_id: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            request_id: request_id.into(),
            timestamp: timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
            api_version: API_VERSION.to_owned(),
        }
    }
}

/// Envelope wrapping a successful payload.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ApiResponse<T> {
    /// Always `true` for this envelope.
    pub success: bool,
    /// Wrapped payload; `null` when there is nothing to return.
    pub data: Option<T>,
    /// Correlation and version metadata.
    pub meta: ResponseMeta,
}

impl<T: Serialize> ApiResponse<T> {
    /// Wraps `data`, stamping the current time.
    #[must_use]
    pub fn success(data: T, request_id: impl Into<String>) -> Self {
        Self::at(Some(data), request_id, Utc::now())
    }

    /// Builds an envelope with an explicit timestamp.
    #[must_use]
    pub fn at(data: Option<T>, request_id: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            success: true,
            data,
            meta: ResponseMeta::at(request_id, timestamp),
        }
    }
}

/// Payload returned with `202 Accepted` once a request has been queued.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptedResponse {
    /// Human-readable confirmation.
    pub message: String,
    /// Identifier of the queued provisioning request.
    pub resource_id: String,
    /// Acceptance state, always `accepted`.
    pub status: String,
}

impl AcceptedResponse {
    /// Confirmation for the request with the given identifier.
    #[must_use]
    pub fn queued(resource_id: impl Into<String>) -> Self {
        Self {
            message: String::from("Provisioning request accepted for processing"),
            resource_id: resource_id.into(),
            status: String::from("accepted"),
        }
    }
}

/// Envelope describing a failed request.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    /// Machine-readable error code.
    pub code: String,
    /// Human-readable summary.
    pub message: String,
    /// Correlation identifier; omitted when empty.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub request_id: String,
    /// Per-field validation failures; omitted when empty.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<FieldError>,
}

impl ErrorResponse {
    /// Builds an error envelope without field details.
    #[must_use]
    pub fn new(
        code: impl Into<String>,
        message: impl Into<String>,
        request_id: impl Into<String>,
    ) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            request_id: request_id.into(),
            details: Vec::new(),
        }
    }

    /// Envelope for a body that could not be decoded.
    #[must_use]
    pub fn invalid_json(request_id: impl Into<String>) -> Self {
        Self::new(INVALID_JSON, "Invalid JSON in request body", request_id)
    }

    /// Envelope listing every field validation failure.
    #[must_use]
    pub fn validation(request_id: impl Into<String>, details: Vec<FieldError>) -> Self {
        Self {
            details,
            ..Self::new(VALIDATION_ERROR, "Request validation failed", request_id)
        }
    }

    /// Envelope for a failure the client cannot fix.
    #[must_use]
    pub fn internal(request_id: impl Into<String>) -> Self {
        Self::new(INTERNAL_ERROR, "Failed to process request", request_id)
    }

    /// Envelope for a body exceeding the size limit.
    #[must_use]
    pub fn payload_too_large(request_id: impl Into<String>) -> Self {
        Self::new(PAYLOAD_TOO_LARGE, "Request body too large", request_id)
    }

    /// Envelope for an unknown route.
    #[must_use]
    pub fn not_found(request_id: impl Into<String>) -> Self {
        Self::new(NOT_FOUND, "Resource not found", request_id)
    }

    /// Translates a validator rejection.
    #[must_use]
    pub fn from_rejection(request_id: impl Into<String>, rejection: RequestRejection) -> Self {
        match rejection {
            RequestRejection::InvalidPayload { .. } => Self::invalid_json(request_id),
            RequestRejection::ValidationFailed(details) => Self::validation(request_id, details),
        }
    }
}
