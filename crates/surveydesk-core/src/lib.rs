pub mod app_config;
pub mod config;
pub mod disambiguation;
pub mod domain;
pub mod payload;
pub mod rate_limit;
pub mod summary;

use thiserror::Error;

pub use app_config::{AppConfig, EpcCredentials, Environment};
pub use config::{load_app_config, load_app_config_from_env};
pub use disambiguation::{
    CandidateSet, Selection, SelectionError, SelectionWorkflow, WorkflowState,
};
pub use domain::{FindingStatus, JobStatus, JobType, SourceCategory, SourceMode};
pub use payload::{
    AssistedEvidence, CategoryCount, CrimeSummary, EpcCertificate, FindingPayload,
    EPC_OPEN_DATA_API, POLICE_CRIME,
};
pub use rate_limit::{FixedWindow, RateLimitPolicy};
pub use summary::summarize_crime_categories;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid {kind}: {value}")]
    InvalidEnum { kind: &'static str, value: String },

    #[error("payload for {source_slug} does not match its schema: {source}")]
    PayloadSchema {
        source_slug: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },
}
