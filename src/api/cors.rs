//! Cross-origin access for browser clients.

use std::str::FromStr;
use std::time::Duration;

use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderName, HeaderValue, Method};
use thiserror::Error;
use tower_http::cors::{AllowOrigin, CorsLayer};

use super::{API_VERSION_HEADER, REQUEST_ID_HEADER};

/// How long browsers may cache a preflight answer.
pub const PREFLIGHT_MAX_AGE: Duration = Duration::from_secs(86_400);

/// Origins allowed to call the API from a browser.
///
/// Parsed from a comma-separated list. A `*` entry allows every origin; the
/// caller's origin is then echoed back so credentials stay usable.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub enum AllowedOrigins {
    /// Any origin.
    #[default]
    Any,
    /// Exactly these origins.
    List(Vec<HeaderValue>),
}

/// Raised for a list entry that is not a `scheme://host[:port]` origin.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("'{0}' is not a valid origin")]
pub struct InvalidOrigin(pub String);

impl FromStr for AllowedOrigins {
    type Err = InvalidOrigin;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let entries: Vec<&str> = value
            .split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .collect();
        if entries.is_empty() || entries.contains(&"*") {
            return Ok(Self::Any);
        }

        entries
            .into_iter()
            .map(|entry| {
                if !entry.contains("://") {
                    return Err(InvalidOrigin(entry.to_owned()));
                }
                HeaderValue::from_str(entry).map_err(|_| InvalidOrigin(entry.to_owned()))
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Self::List)
    }
}

/// Builds the CORS layer for `origins`.
#[must_use]
pub fn cors_layer(origins: &AllowedOrigins) -> CorsLayer {
    let allow_origin = match origins {
        AllowedOrigins::Any => AllowOrigin::mirror_request(),
        AllowedOrigins::List(list) => AllowOrigin::list(list.iter().cloned()),
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            AUTHORIZATION,
            CONTENT_TYPE,
            HeaderName::from_static(REQUEST_ID_HEADER),
        ])
        .expose_headers([
            HeaderName::from_static(REQUEST_ID_HEADER),
            HeaderName::from_static(API_VERSION_HEADER),
        ])
        .max_age(PREFLIGHT_MAX_AGE)
}
