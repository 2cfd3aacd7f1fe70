//! Startup parameter lookup.
//!
//! Deployments publish the queue URL under a well-known parameter key rather
//! than baking it into configuration. [`resolve_queue_url`] prefers an
//! explicitly configured URL and falls back to the parameter store.

use std::future::Future;
use std::pin::Pin;

use aws_sdk_ssm::Client;
use aws_sdk_ssm::error::DisplayErrorContext;
use aws_sdk_ssm::operation::get_parameter::GetParameterError;
use thiserror::Error;
use tracing::info;

/// Parameter key holding the provisioning queue URL.
pub const QUEUE_URL_PARAMETER: &str = "/INTERNAL_DEVELOPER_PLATFORM/PROVISIONER_QUEUE_URL";

/// Errors raised while reading parameters.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ParameterError {
    /// The store could not be queried.
    #[error("failed to read parameter {key}: {message}")]
    Lookup {
        /// Parameter key.
        key: String,
        /// Error reported by the store.
        message: String,
    },
    /// The parameter does not exist or has no value.
    #[error("parameter {key} is not set")]
    Missing {
        /// Parameter key.
        key: String,
    },
}

/// Future returned by [`ParameterStore::get_parameter`].
pub type ParameterFuture<'a> =
    Pin<Box<dyn Future<Output = Result<Option<String>, ParameterError>> + Send + 'a>>;

/// Read-only key/value store consulted during startup.
pub trait ParameterStore: Send + Sync {
    /// Returns the value stored under `key`, or `None` when it does not exist.
    fn get_parameter<'a>(&'a self, key: &'a str) -> ParameterFuture<'a>;
}

/// AWS Systems Manager Parameter Store adapter.
#[derive(Clone, Debug)]
pub struct SsmParameterStore {
    client: Client,
}

impl SsmParameterStore {
    /// Wraps an existing client.
    #[must_use]
    pub const fn new(client: Client) -> Self {
        Self { client }
    }

    /// Builds a client from shared AWS configuration.
    #[must_use]
    pub fn from_sdk_config(config: &aws_config::SdkConfig) -> Self {
        Self::new(Client::new(config))
    }
}

impl ParameterStore for SsmParameterStore {
    fn get_parameter<'a>(&'a self, key: &'a str) -> ParameterFuture<'a> {
        Box::pin(async move {
            let result = self
                .client
                .get_parameter()
                .name(key)
                .with_decryption(true)
                .send()
                .await;
            match result {
                Ok(output) => Ok(output
                    .parameter()
                    .and_then(|parameter| parameter.value())
                    .map(str::to_owned)),
                Err(err)
                    if err
                        .as_service_error()
                        .is_some_and(GetParameterError::is_parameter_not_found) =>
                {
                    Ok(None)
                }
                Err(err) => Err(ParameterError::Lookup {
                    key: key.to_owned(),
                    message: DisplayErrorContext(&err).to_string(),
                }),
            }
        })
    }
}

/// Returns `configured` when set, otherwise the value stored under `key`.
///
/// # Errors
///
/// Returns [`ParameterError::Missing`] when neither source yields a
/// non-empty URL and [`ParameterError::Lookup`] when the store fails.
pub async fn resolve_queue_url<S>(
    configured: Option<&str>,
    key: &str,
    store: &S,
) -> Result<String, ParameterError>
where
    S: ParameterStore + ?Sized,
{
    if let Some(url) = configured.filter(|url| !url.trim().is_empty()) {
        return Ok(url.to_owned());
    }

    let value = store.get_parameter(key).await?;
    match value {
        Some(url) if !url.trim().is_empty() => {
            info!(parameter = key, "resolved queue URL from parameter store");
            Ok(url)
        }
        _ => Err(ParameterError::Missing {
            key: key.to_owned(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::StaticParameters;
    use rstest::rstest;

    const URL: &str = "https://sqs.eu-west-1.amazonaws.com/123/provisioner";

    #[tokio::test]
    async fn configured_url_wins_without_lookup() {
        let store = StaticParameters::failing();

        let url = resolve_queue_url(Some(URL), QUEUE_URL_PARAMETER, &store)
            .await
            .expect("configured URL");

        assert_eq!(url, URL);
        assert_eq!(store.lookups(), 0);
    }

    #[tokio::test]
    async fn falls_back_to_parameter_store() {
        let store = StaticParameters::with(&[(QUEUE_URL_PARAMETER, URL)]);

        let url = resolve_queue_url(Some("  "), QUEUE_URL_PARAMETER, &store)
            .await
            .expect("stored URL");

        assert_eq!(url, URL);
        assert_eq!(store.lookups(), 1);
    }

    #[rstest]
    #[case(&[])]
    #[case(&[(QUEUE_URL_PARAMETER, "")])]
    #[tokio::test]
    async fn absent_or_blank_parameter_is_missing(#[case] entries: &[(&str, &str)]) {
        let store = StaticParameters::with(entries);

        let err = resolve_queue_url(None, QUEUE_URL_PARAMETER, &store)
            .await
            .expect_err("no URL anywhere");

        assert_eq!(
            err,
            ParameterError::Missing {
                key: QUEUE_URL_PARAMETER.to_owned()
            }
        );
    }

    #[tokio::test]
    async fn store_failure_is_propagated() {
        let store = StaticParameters::failing();

        let err = resolve_queue_url(None, QUEUE_URL_PARAMETER, &store)
            .await
            .expect_err("lookup fails");

        assert!(matches!(err, ParameterError::Lookup { .. }), "{err}");
    }
}
