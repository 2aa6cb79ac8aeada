//! Street-level crime data from data.police.uk.

use reqwest::{Client, Url};
use surveydesk_core::{summarize_crime_categories, CrimeSummary};

use crate::error::ProviderError;
use crate::http::{build_client, decode, endpoint, ensure_success, parse_base_url};
use crate::types::{CrimeIncident, JobLocation};

const DEFAULT_BASE_URL: &str = "https://data.police.uk/";
const PROVIDER: &str = "police.uk";

pub struct PoliceClient {
    client: Client,
    base_url: Url,
}

impl PoliceClient {
    /// # Errors
    ///
    /// Returns [`ProviderError::Http`] if the `reqwest::Client` cannot be built.
    pub fn new(timeout_secs: u64, user_agent: &str) -> Result<Self, ProviderError> {
        Self::with_base_url(timeout_secs, user_agent, DEFAULT_BASE_URL)
    }

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

    /// Fetches the crimes recorded at the job's coordinates for the latest
    /// month the force has published.
    ///
    /// # Errors
    ///
    /// - [`ProviderError::PreconditionFailed`] if the job is not geocoded; no
    ///   request is made in that case.
    /// - [`ProviderError::UpstreamStatus`] on a non-2xx reply.
    /// - [`ProviderError::Http`] / [`ProviderError::Deserialize`] on transport
    ///   or parse failure.
    pub async fn crimes_at_location(
        &self,
        job: &JobLocation,
    ) -> Result<Vec<CrimeIncident>, ProviderError> {
        let coordinates = job.coordinates.ok_or(ProviderError::PreconditionFailed(
            "job must be geocoded before running crime summary",
        ))?;

        let url = endpoint(&self.base_url, &["api", "crimes-at-location"]);
        let response = self
            .client
            .get(url)
            .query(&[
                ("lat", coordinates.latitude),
                ("lng", coordinates.longitude),
            ])
            .send()
            .await?;
        let body = ensure_success(PROVIDER, response)?.text().await?;

        let incidents: Vec<CrimeIncident> = decode(&body, "police.uk crimes-at-location")?;
        tracing::debug!(count = incidents.len(), "crime records fetched");
        Ok(incidents)
    }

    /// Fetches crimes at the job's location and reduces them to a summary.
    ///
    /// # Errors
    ///
    /// Same as [`PoliceClient::crimes_at_location`].
    pub async fn crime_summary(&self, job: &JobLocation) -> Result<CrimeSummary, ProviderError> {
        let incidents = self.crimes_at_location(job).await?;
        Ok(summarize_crime_categories(
            incidents.iter().map(|i| i.category.as_str()),
        ))
    }
}
