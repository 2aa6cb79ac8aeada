//! Provider inputs and provider-shaped results.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// The parts of a job that providers are allowed to see.
#[derive(Debug, Clone, PartialEq)]
pub struct JobLocation {
    pub postcode: Option<String>,
    /// Present only once the job has been geocoded.
    pub coordinates: Option<Coordinates>,
}

impl JobLocation {
    /// The postcode, trimmed, if it has any content.
    #[must_use]
    pub fn postcode(&self) -> Option<&str> {
        self.postcode
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
    }
}

/// Normalized output of a successful postcode lookup.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeocodeResult {
    pub coordinates: Coordinates,
    /// Whitespace stripped, upper-cased.
    pub postcode_normalised: String,
    pub source: &'static str,
}

/// One street-level crime record from police.uk.
///
/// Only `category` is required; the rest is kept for logging and future use.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CrimeIncident {
    pub category: String,
    #[serde(default)]
    pub month: Option<String>,
    #[serde(default)]
    pub persistent_id: Option<String>,
    #[serde(default)]
    pub location_type: Option<String>,
}
