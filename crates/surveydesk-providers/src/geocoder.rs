//! Postcode geocoding via postcodes.io.
//!
//! postcodes.io wraps every reply in `{"status": <code>, "result": ...}` and
//! reports unknown postcodes through that embedded status (alongside an HTTP
//! 404), so the envelope is inspected before the HTTP status.

use reqwest::{Client, Url};
use serde::Deserialize;

use crate::error::ProviderError;
use crate::http::{build_client, decode, endpoint, parse_base_url};
use crate::types::{Coordinates, GeocodeResult, JobLocation};

const DEFAULT_BASE_URL: &str = "https://api.postcodes.io/";

/// Provenance recorded on geocoded jobs.
pub const GEOCODER_SOURCE: &str = "postcodes.io";

#[derive(Debug, Deserialize)]
struct Envelope {
    status: u16,
    #[serde(default)]
    result: Option<PostcodeRecord>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PostcodeRecord {
    postcode: String,
    latitude: Option<f64>,
    longitude: Option<f64>,
}

/// Canonical postcode form: all whitespace removed, upper-cased.
#[must_use]
pub fn normalize_postcode(postcode: &str) -> String {
    postcode
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_uppercase()
}

pub struct GeocoderClient {
    client: Client,
    base_url: Url,
}

impl GeocoderClient {
    /// Creates a client pointed at the public postcodes.io API.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Http`] if the `reqwest::Client` cannot be built.
    pub fn new(timeout_secs: u64, user_agent: &str) -> Result<Self, ProviderError> {
        Self::with_base_url(timeout_secs, user_agent, DEFAULT_BASE_URL)
    }

    /// Creates a client with a custom base URL (mock servers in tests).
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Http`] if the `reqwest::Client` cannot be built,
    /// or [`ProviderError::InvalidBaseUrl`] if `base_url` does not parse.
    pub fn with_base_url(
        timeout_secs: u64,
        user_agent: &str,
        base_url: &str,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            client: build_client(timeout_secs, user_agent)?,
            base_url: parse_base_url(base_url)?,
        })
    }

    /// Looks up the job's postcode and returns its coordinates.
    ///
    /// The raw postcode is sent as entered; the returned postcode is the
    /// provider's canonical form passed through [`normalize_postcode`].
    ///
    /// # Errors
    ///
    /// - [`ProviderError::MissingInput`] if the job has no postcode.
    /// - [`ProviderError::InvalidPostcode`] if the provider's embedded status
    ///   is not 200.
    /// - [`ProviderError::IncompleteResponse`] if the postcode has no coordinates.
    /// - [`ProviderError::UpstreamStatus`] if the body is not an envelope and
    ///   the HTTP status is not 2xx.
    /// - [`ProviderError::Http`] / [`ProviderError::Deserialize`] on transport
    ///   or parse failure.
    pub async fn geocode(&self, job: &JobLocation) -> Result<GeocodeResult, ProviderError> {
        let postcode = job.postcode().ok_or(ProviderError::MissingInput("postcode"))?;
        let url = endpoint(&self.base_url, &["postcodes", postcode]);

        let response = self.client.get(url).send().await?;
        let http_status = response.status();
        let body = response.text().await?;

        let envelope: Envelope = match decode(&body, "postcodes.io lookup") {
            Ok(envelope) => envelope,
            Err(_) if !http_status.is_success() => {
                return Err(ProviderError::UpstreamStatus {
                    provider: GEOCODER_SOURCE,
                    status: http_status.as_u16(),
                })
            }
            Err(e) => return Err(e),
        };

        if envelope.status != 200 {
            return Err(ProviderError::InvalidPostcode {
                postcode: postcode.to_owned(),
                reason: envelope
                    .error
                    .unwrap_or_else(|| format!("lookup status {}", envelope.status)),
            });
        }

        let record = envelope.result.ok_or(ProviderError::IncompleteResponse {
            provider: GEOCODER_SOURCE,
            field: "result",
        })?;
        let (Some(latitude), Some(longitude)) = (record.latitude, record.longitude) else {
            return Err(ProviderError::IncompleteResponse {
                provider: GEOCODER_SOURCE,
                field: "coordinates",
            });
        };

        tracing::debug!(
            postcode = %record.postcode,
            latitude,
            longitude,
            "postcode geocoded"
        );

        Ok(GeocodeResult {
            coordinates: Coordinates {
                latitude,
                longitude,
            },
            postcode_normalised: normalize_postcode(&record.postcode),
            source: GEOCODER_SOURCE,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_whitespace_and_uppercases() {
        assert_eq!(normalize_postcode("sw1a 2aa"), "SW1A2AA");
        assert_eq!(normalize_postcode(" ec1a\t1bb "), "EC1A1BB");
    }

    #[tokio::test]
    async fn missing_postcode_fails_before_any_request() {
        // Port 9 (discard) is never contacted: the precondition fails first.
        let client = GeocoderClient::with_base_url(5, "surveydesk-test/0.1", "http://127.0.0.1:9")
            .expect("client");
        let job = JobLocation {
            postcode: None,
            coordinates: None,
        };
        let err = client.geocode(&job).await.unwrap_err();
        assert!(matches!(err, ProviderError::MissingInput("postcode")));
    }
}
