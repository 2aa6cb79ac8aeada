//! Plumbing shared by every provider client.

use std::time::Duration;

use reqwest::{Client, Response, Url};
use serde::de::DeserializeOwned;

use crate::error::ProviderError;

pub(crate) fn build_client(timeout_secs: u64, user_agent: &str) -> Result<Client, ProviderError> {
    let client = Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .connect_timeout(Duration::from_secs(10))
        .user_agent(user_agent)
        .build()?;
    Ok(client)
}

/// Parse a provider base URL, forcing exactly one trailing slash so that
/// joined paths append to it instead of replacing its last segment.
pub(crate) fn parse_base_url(base_url: &str) -> Result<Url, ProviderError> {
    let normalised = format!("{}/", base_url.trim_end_matches('/'));
    Url::parse(&normalised).map_err(|e| ProviderError::InvalidBaseUrl {
        url: base_url.to_owned(),
        reason: e.to_string(),
    })
}

/// Append path segments to `base`, percent-encoding each one.
pub(crate) fn endpoint(base: &Url, segments: &[&str]) -> Url {
    let mut url = base.clone();
    if let Ok(mut path) = url.path_segments_mut() {
        path.pop_if_empty();
        path.extend(segments);
    }
    url
}

/// Fail with [`ProviderError::UpstreamStatus`] unless the status is 2xx.
pub(crate) fn ensure_success(
    provider: &'static str,
    response: Response,
) -> Result<Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(ProviderError::UpstreamStatus {
            provider,
            status: status.as_u16(),
        })
    }
}

pub(crate) fn decode<T: DeserializeOwned>(body: &str, context: &str) -> Result<T, ProviderError> {
    serde_json::from_str(body).map_err(|source| ProviderError::Deserialize {
        context: context.to_owned(),
        source,
    })
}
