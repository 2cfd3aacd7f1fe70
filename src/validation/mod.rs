//! Request decoding and field validation.
//!
//! [`RequestValidator`] turns raw request bytes into a [`ProvisioningRequest`]
//! or a [`RequestRejection`]. Decoding failures and field failures are
//! distinct rejections. Field validation never stops at the first problem:
//! every field is checked and every violation is reported, in declaration
//! order.

use std::fmt::Display;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{
    CloudProvider, ProvisioningRequest, ProvisioningStatus, ResourceType, canonical_list,
};

/// Error code reported when the payload cannot be decoded.
pub const INVALID_JSON: &str = "INVALID_JSON";

/// Error code reported when one or more fields fail validation.
pub const VALIDATION_ERROR: &str = "VALIDATION_ERROR";

/// Character limits applied to free-text fields.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ValidationLimits {
    /// Maximum length of `id`.
    pub max_id_chars: usize,
    /// Maximum length of `specification`.
    pub max_specification_chars: usize,
    /// Maximum length of `requested_by`.
    pub max_requested_by_chars: usize,
}

impl ValidationLimits {
    /// Limits used by the public API.
    pub const DEFAULT: Self = Self {
        max_id_chars: 100,
        max_specification_chars: 1000,
        max_requested_by_chars: 100,
    };
}

impl Default for ValidationLimits {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// A single field-level validation failure.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct FieldError {
    /// Wire name of the offending field.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
    /// Submitted value, when one was present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl FieldError {
    fn required(field: &str, value: Option<String>) -> Self {
        Self {
            field: field.to_owned(),
            message: format!("{field} is required"),
            value,
        }
    }

    fn too_long(field: &str, max_chars: usize, value: String) -> Self {
        Self {
            field: field.to_owned(),
            message: format!("{field} must be at most {max_chars} characters"),
            value: Some(value),
        }
    }

    fn not_one_of(field: &str, allowed: &str, value: String) -> Self {
        Self {
            field: field.to_owned(),
            message: format!("{field} must be one of: {allowed}"),
            value: Some(value),
        }
    }
}

/// Reasons a request is turned away before it reaches the publisher.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum RequestRejection {
    /// The body is not a JSON object with string-typed fields.
    #[error("invalid JSON in request body: {message}")]
    InvalidPayload {
        /// Decoder error message.
        message: String,
    },
    /// The body decoded but at least one field is missing or invalid.
    #[error("request validation failed with {} field error(s)", .0.len())]
    ValidationFailed(Vec<FieldError>),
}

impl RequestRejection {
    /// Returns the machine-readable error code for the rejection.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidPayload { .. } => INVALID_JSON,
            Self::ValidationFailed(_) => VALIDATION_ERROR,
        }
    }

    /// Returns the field errors, empty for decoding failures.
    #[must_use]
    pub fn details(&self) -> &[FieldError] {
        match self {
            Self::InvalidPayload { .. } => &[],
            Self::ValidationFailed(errors) => errors,
        }
    }
}

/// Loosely-typed shape used for decoding so absent fields can be reported
/// alongside invalid ones.
#[derive(Debug, Default, Deserialize)]
struct RawRequest {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    resource_type: Option<String>,
    #[serde(default)]
    cloud_provider: Option<String>,
    #[serde(default)]
    specification: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    requested_by: Option<String>,
}

/// Immutable validator injected into the HTTP layer and the consumer.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct RequestValidator {
    limits: ValidationLimits,
}

impl RequestValidator {
    /// Creates a validator using [`ValidationLimits::DEFAULT`].
    #[must_use]
    pub const fn new() -> Self {
        Self::with_limits(ValidationLimits::DEFAULT)
    }

    /// Creates a validator with explicit limits.
    #[must_use]
    pub const fn with_limits(limits: ValidationLimits) -> Self {
        Self { limits }
    }

    /// Returns the limits in force.
    #[must_use]
    pub const fn limits(&self) -> ValidationLimits {
        self.limits
    }

    /// Decodes and validates a raw request body.
    ///
    /// # Errors
    ///
    /// Returns [`RequestRejection::InvalidPayload`] when the bytes are not a
    /// JSON object whose fields are strings, and
    /// [`RequestRejection::ValidationFailed`] listing every invalid field
    /// otherwise.
    pub fn validate(&self, raw: &[u8]) -> Result<ProvisioningRequest, RequestRejection> {
        let value = serde_json::from_slice::<serde_json::Value>(raw).map_err(invalid_payload)?;
        if !value.is_object() {
            return Err(RequestRejection::InvalidPayload {
                message: String::from("expected a JSON object"),
            });
        }
        let decoded = serde_json::from_value::<RawRequest>(value).map_err(invalid_payload)?;
        self.validate_fields(decoded)
    }

    fn validate_fields(&self, raw: RawRequest) -> Result<ProvisioningRequest, RequestRejection> {
        let mut errors = Vec::new();

        let id = text_field(&mut errors, "id", raw.id, self.limits.max_id_chars);
        let resource_type =
            enum_field(&mut errors, "resource_type", raw.resource_type, ResourceType::ALL);
        let cloud_provider = enum_field(
            &mut errors,
            "cloud_provider",
            raw.cloud_provider,
            CloudProvider::ALL,
        );
        let specification = text_field(
            &mut errors,
            "specification",
            raw.specification,
            self.limits.max_specification_chars,
        );
        let status = enum_field(&mut errors, "status", raw.status, ProvisioningStatus::ALL);
        let requested_by = text_field(
            &mut errors,
            "requested_by",
            raw.requested_by,
            self.limits.max_requested_by_chars,
        );

        if let (
            Some(id),
            Some(resource_type),
            Some(cloud_provider),
            Some(specification),
            Some(status),
            Some(requested_by),
        ) = (
            id,
            resource_type,
            cloud_provider,
            specification,
            status,
            requested_by,
        ) {
            return Ok(ProvisioningRequest {
                id,
                resource_type,
                cloud_provider,
                specification,
                status,
                requested_by,
            });
        }

        Err(RequestRejection::ValidationFailed(errors))
    }
}

fn invalid_payload(err: serde_json::Error) -> RequestRejection {
    RequestRejection::InvalidPayload {
        message: err.to_string(),
    }
}

fn text_field(
    errors: &mut Vec<FieldError>,
    field: &str,
    value: Option<String>,
    max_chars: usize,
) -> Option<String> {
    match value {
        None => {
            errors.push(FieldError::required(field, None));
            None
        }
        Some(text) if text.is_empty() => {
            errors.push(FieldError::required(field, Some(text)));
            None
        }
        Some(text) if text.chars().count() > max_chars => {
            errors.push(FieldError::too_long(field, max_chars, text));
            None
        }
        Some(text) => Some(text),
    }
}

fn enum_field<T>(
    errors: &mut Vec<FieldError>,
    field: &str,
    value: Option<String>,
    allowed: &[T],
) -> Option<T>
where
    T: Copy + Display + FromStr,
{
    match value {
        None => {
            errors.push(FieldError::required(field, None));
            None
        }
        Some(text) if text.is_empty() => {
            errors.push(FieldError::required(field, Some(text)));
            None
        }
        Some(text) => match text.parse::<T>() {
            Ok(parsed) => Some(parsed),
            Err(_) => {
                errors.push(FieldError::not_one_of(
                    field,
                    &canonical_list(allowed),
                    text,
                ));
                None
            }
        },
    }
}

#[cfg(test)]
mod tests;
