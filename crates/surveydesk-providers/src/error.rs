use thiserror::Error;

/// Errors returned by the provider adapters.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The job lacks an input the provider needs, such as a postcode.
    #[error("{0} is required for this check")]
    MissingInput(&'static str),

    /// The job has not reached the state this provider depends on.
    #[error("{0}")]
    PreconditionFailed(&'static str),

    /// The provider needs secrets that are not configured.
    #[error("{provider} API credentials are not configured")]
    MissingCredentials { provider: &'static str },

    /// The geocoder rejected the postcode.
    #[error("invalid postcode '{postcode}': {reason}")]
    InvalidPostcode { postcode: String, reason: String },

    /// The provider answered with a non-success HTTP status.
    #[error("{provider} returned HTTP {status}")]
    UpstreamStatus { provider: &'static str, status: u16 },

    /// The provider answered successfully but left out a required field.
    #[error("{provider} response is missing {field}")]
    IncompleteResponse {
        provider: &'static str,
        field: &'static str,
    },

    /// Network, TLS or timeout failure from the underlying HTTP client.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The response body could not be deserialized into the expected type.
    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid base URL '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },
}
