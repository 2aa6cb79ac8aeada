//! Energy performance certificate search against the EPC open data registry.

use reqwest::header::ACCEPT;
use reqwest::{Client, Url};
use serde::Deserialize;
use serde_json::Value;
use surveydesk_core::{EpcCertificate, EpcCredentials};

use crate::error::ProviderError;
use crate::http::{build_client, decode, endpoint, ensure_success, parse_base_url};
use crate::types::JobLocation;

const DEFAULT_BASE_URL: &str = "https://epc.opendatacommunities.org/";
const PROVIDER: &str = "EPC registry";

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    rows: Vec<Value>,
}

pub struct EpcClient {
    client: Client,
    base_url: Url,
    credentials: Option<EpcCredentials>,
}

impl EpcClient {
    /// Creates a client pointed at the public registry.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Http`] if the `reqwest::Client` cannot be built.
    pub fn new(
        credentials: Option<EpcCredentials>,
        timeout_secs: u64,
        user_agent: &str,
    ) -> Result<Self, ProviderError> {
        Self::with_base_url(credentials, timeout_secs, user_agent, DEFAULT_BASE_URL)
    }

    /// Creates a client with a custom base URL (mock servers in tests).
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Http`] if the `reqwest::Client` cannot be built,
    /// or [`ProviderError::InvalidBaseUrl`] if `base_url` does not parse.
    pub fn with_base_url(
        credentials: Option<EpcCredentials>,
        timeout_secs: u64,
        user_agent: &str,
        base_url: &str,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            client: build_client(timeout_secs, user_agent)?,
            base_url: parse_base_url(base_url)?,
            credentials,
        })
    }

    /// Whether both halves of the registry credentials are configured.
    #[must_use]
    pub fn has_credentials(&self) -> bool {
        self.credentials.is_some()
    }

    /// Searches certificates registered at the job's postcode.
    ///
    /// Returns every row in registry order. Rows lacking an address, rating
    /// or inspection date are skipped with a warning. An empty reply is an
    /// empty list, not an error.
    ///
    /// # Errors
    ///
    /// - [`ProviderError::MissingInput`] if the job has no postcode.
    /// - [`ProviderError::MissingCredentials`] if credentials are absent; no
    ///   request is made in that case.
    /// - [`ProviderError::UpstreamStatus`] on a non-2xx reply.
    /// - [`ProviderError::Http`] / [`ProviderError::Deserialize`] on transport
    ///   or parse failure.
    pub async fn search_by_postcode(
        &self,
        job: &JobLocation,
    ) -> Result<Vec<EpcCertificate>, ProviderError> {
        let postcode = job.postcode().ok_or(ProviderError::MissingInput("postcode"))?;
        let credentials = self
            .credentials
            .as_ref()
            .ok_or(ProviderError::MissingCredentials { provider: PROVIDER })?;

        let mut url = endpoint(&self.base_url, &["api", "v1", "domestic", "search"]);
        url.query_pairs_mut().append_pair("postcode", postcode);

        let response = self
            .client
            .get(url)
            .basic_auth(&credentials.username, Some(&credentials.api_key))
            .header(ACCEPT, "application/json")
            .send()
            .await?;
        let body = ensure_success(PROVIDER, response)?.text().await?;

        // The registry answers a postcode with no certificates with an empty body.
        if body.trim().is_empty() {
            return Ok(Vec::new());
        }

        let parsed: SearchResponse = decode(&body, "EPC domestic search")?;
        let total = parsed.rows.len();
        let certificates: Vec<EpcCertificate> = parsed
            .rows
            .into_iter()
            .enumerate()
            .filter_map(|(i, row)| match serde_json::from_value::<EpcCertificate>(row) {
                Ok(cert) => Some(cert),
                Err(e) => {
                    tracing::warn!(row = i, error = %e, "skipping malformed EPC row");
                    None
                }
            })
            .collect();

        tracing::debug!(
            rows = total,
            kept = certificates.len(),
            "EPC search complete"
        );
        Ok(certificates)
    }
}
