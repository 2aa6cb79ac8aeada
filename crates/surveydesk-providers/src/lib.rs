//! HTTP adapters for the external public-data providers.
//!
//! Each adapter turns a job's location into one provider call and parses the
//! reply into a typed result. Adapters never persist anything; callers decide
//! what becomes a finding.

pub mod epc;
pub mod error;
pub mod geocoder;
mod http;
pub mod police;
pub mod types;

pub use epc::EpcClient;
pub use error::ProviderError;
pub use geocoder::{normalize_postcode, GeocoderClient};
pub use police::PoliceClient;
pub use types::{Coordinates, CrimeIncident, GeocodeResult, JobLocation};
