//! Concrete schemas for finding payloads.
//!
//! The finding store keeps payloads as untyped JSONB. Each known source slug
//! still has exactly one Rust shape here. Payloads are built from it before
//! they are written, and findings read back for the API are parsed against it
//! so a row that has drifted is logged.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::CoreError;

/// Slug of the EPC open data registry source.
pub const EPC_OPEN_DATA_API: &str = "EPC_OPEN_DATA_API";
/// Slug of the police.uk area crime source.
pub const POLICE_CRIME: &str = "POLICE_CRIME";

/// One energy performance certificate row as returned by the registry.
///
/// Only the fields the workflow relies on are typed. Everything else the
/// registry sends is kept in `extra` so a selected certificate is persisted
/// exactly as it was offered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpcCertificate {
    pub address: String,
    #[serde(rename = "current-energy-rating")]
    pub current_energy_rating: String,
    #[serde(rename = "inspection-date")]
    pub inspection_date: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryCount {
    pub name: String,
    pub count: usize,
}

/// Area crime figures reduced from raw incident records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrimeSummary {
    pub period: String,
    pub total_crimes: usize,
    pub top_categories: Vec<CategoryCount>,
    pub disclaimer: String,
}

/// Record of a manual research step on an assisted source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssistedEvidence {
    pub evidence_url: Option<String>,
    pub note: Option<String>,
    pub recorded_by: String,
    pub recorded_at: DateTime<Utc>,
}

/// A finding payload, discriminated by the source that produced it.
#[derive(Debug, Clone, PartialEq)]
pub enum FindingPayload {
    EpcCertificate(EpcCertificate),
    CrimeSummary(CrimeSummary),
    Assisted(AssistedEvidence),
}

impl FindingPayload {
    /// Serialize to the JSON value stored in `job_findings.structured_json`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::PayloadSchema`] if serialization fails, which only
    /// happens for non-string map keys inside `extra`.
    pub fn to_value(&self) -> Result<Value, CoreError> {
        let (slug, result) = match self {
            FindingPayload::EpcCertificate(cert) => (EPC_OPEN_DATA_API, serde_json::to_value(cert)),
            FindingPayload::CrimeSummary(summary) => (POLICE_CRIME, serde_json::to_value(summary)),
            FindingPayload::Assisted(evidence) => ("assisted", serde_json::to_value(evidence)),
        };
        result.map_err(|source| CoreError::PayloadSchema {
            source_slug: slug.to_string(),
            source,
        })
    }

    /// Parse a stored payload using the schema registered for `source_slug`.
    ///
    /// Slugs without an automated adapter carry [`AssistedEvidence`].
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::PayloadSchema`] when the JSON does not match.
    pub fn from_stored(source_slug: &str, value: Value) -> Result<Self, CoreError> {
        let parsed = match source_slug {
            EPC_OPEN_DATA_API => serde_json::from_value(value).map(FindingPayload::EpcCertificate),
            POLICE_CRIME => serde_json::from_value(value).map(FindingPayload::CrimeSummary),
            _ => serde_json::from_value(value).map(FindingPayload::Assisted),
        };
        parsed.map_err(|source| CoreError::PayloadSchema {
            source_slug: source_slug.to_string(),
            source,
        })
    }
}
