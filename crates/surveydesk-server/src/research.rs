//! Research orchestration: authorize, gate, call a provider, persist.
//!
//! Every provider-backed operation runs the same sequence. The job is loaded
//! and checked against the actor's organisation first, so neither a missing
//! job nor a foreign one spends quota. The per-actor provider quota is then
//! consumed, the provider's own preconditions are checked, the provider is
//! called, and the normalized result is written in one statement. A failure
//! at any step leaves stored state as it was.

use chrono::Utc;
use surveydesk_core::{
    AssistedEvidence, EpcCertificate, FindingPayload, FindingStatus, JobType, RateLimitPolicy,
    Selection, SelectionError, SourceMode, WorkflowState, EPC_OPEN_DATA_API, POLICE_CRIME,
};
use surveydesk_db::{Admission, DbError, FindingRow, GeocodeUpdate, JobRow};
use surveydesk_providers::{
    Coordinates, EpcClient, GeocoderClient, JobLocation, PoliceClient, ProviderError,
};
use thiserror::Error;
use uuid::Uuid;

use crate::api::{ApiError, AppState};
use crate::middleware::Actor;

pub const ACTION_GEOCODE: &str = "geocode";
pub const ACTION_EPC_CHECK: &str = "epc_check";
pub const ACTION_CRIME_SUMMARY: &str = "crime_summary";

/// The provider clients shared by every request.
pub struct Providers {
    pub geocoder: GeocoderClient,
    pub epc: EpcClient,
    pub police: PoliceClient,
}

#[derive(Debug, Error)]
pub enum ResearchError {
    #[error("not authorized for this job")]
    Unauthorized,
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("rate limit exceeded for {action}; try again later")]
    RateLimited { action: &'static str },
    #[error("{0} is required for this check")]
    MissingInput(&'static str),
    #[error("{0}")]
    PreconditionFailed(String),
    #[error("{0} credentials are not configured")]
    MissingCredentials(&'static str),
    #[error("invalid postcode '{postcode}': {reason}")]
    InvalidPostcode { postcode: String, reason: String },
    #[error("provider request failed: {0}")]
    Provider(ProviderError),
    #[error("{0}")]
    Validation(String),
    #[error("no certificate selection is pending for this job")]
    NoPendingSelection,
    #[error(transparent)]
    InvalidSelection(#[from] SelectionError),
    #[error("database error: {0}")]
    Database(DbError),
}

impl From<ProviderError> for ResearchError {
    fn from(error: ProviderError) -> Self {
        match error {
            ProviderError::MissingInput(field) => ResearchError::MissingInput(field),
            ProviderError::PreconditionFailed(message) => {
                ResearchError::PreconditionFailed(message.to_owned())
            }
            ProviderError::MissingCredentials { provider } => {
                ResearchError::MissingCredentials(provider)
            }
            ProviderError::InvalidPostcode { postcode, reason } => {
                ResearchError::InvalidPostcode { postcode, reason }
            }
            other => ResearchError::Provider(other),
        }
    }
}

impl From<DbError> for ResearchError {
    fn from(error: DbError) -> Self {
        match error {
            DbError::NotFound => ResearchError::NotFound("job"),
            DbError::InvalidTransition { from, to, .. } => {
                ResearchError::PreconditionFailed(format!("job cannot move from {from} to {to}"))
            }
            other => ResearchError::Database(other),
        }
    }
}

impl ResearchError {
    /// Stable machine-readable code used in the API error envelope.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            ResearchError::Unauthorized => "unauthorized",
            ResearchError::NotFound(_) => "not_found",
            ResearchError::RateLimited { .. } => "rate_limited",
            ResearchError::MissingInput(_) => "missing_input",
            ResearchError::PreconditionFailed(_) => "precondition_failed",
            ResearchError::MissingCredentials(_) => "missing_credentials",
            ResearchError::InvalidPostcode { .. } => "invalid_postcode",
            ResearchError::Provider(_) => "provider_error",
            ResearchError::Validation(_) => "validation_error",
            ResearchError::NoPendingSelection => "no_pending_selection",
            ResearchError::InvalidSelection(_) => "invalid_selection",
            ResearchError::Database(_) => "internal_error",
        }
    }

    pub fn into_api_error(self, request_id: String) -> ApiError {
        let message = match &self {
            ResearchError::Database(e) => {
                tracing::error!(error = %e, "database query failed");
                "database query failed".to_string()
            }
            other => other.to_string(),
        };
        ApiError::new(request_id, self.code(), message)
    }
}

/// Candidates returned by a certificate run, awaiting the actor's choice.
#[derive(Debug)]
pub struct CertificateOffer {
    pub state: WorkflowState,
    pub candidates: Vec<EpcCertificate>,
}

fn location_of(job: &JobRow) -> JobLocation {
    JobLocation {
        postcode: Some(job.postcode.clone()),
        coordinates: match (job.lat, job.lon) {
            (Some(latitude), Some(longitude)) => Some(Coordinates {
                latitude,
                longitude,
            }),
            _ => None,
        },
    }
}

/// Load a job the actor's organisation owns.
///
/// # Errors
///
/// [`ResearchError::NotFound`] if no such job exists, or
/// [`ResearchError::Unauthorized`] if another organisation owns it.
pub async fn authorize_job(
    state: &AppState,
    actor: &Actor,
    job_id: Uuid,
) -> Result<JobRow, ResearchError> {
    let job = surveydesk_db::get_job(&state.pool, job_id)
        .await?
        .ok_or(ResearchError::NotFound("job"))?;

    if job.org_id != actor.org_id {
        tracing::warn!(
            job_id = %job_id,
            actor_id = %actor.actor_id,
            "actor attempted to access a job outside their organisation"
        );
        return Err(ResearchError::Unauthorized);
    }
    Ok(job)
}

async fn consume_quota(
    state: &AppState,
    actor: &Actor,
    action: &'static str,
    policy: &RateLimitPolicy,
) -> Result<(), ResearchError> {
    let admission = surveydesk_db::check_and_consume(
        &state.pool,
        &actor.actor_id,
        action,
        policy,
        Utc::now(),
    )
    .await?;

    match admission {
        Admission::Allowed { used } => {
            tracing::debug!(actor_id = %actor.actor_id, action, used, "provider quota consumed");
            Ok(())
        }
        Admission::RateLimited => {
            tracing::warn!(actor_id = %actor.actor_id, action, "provider rate limit exceeded");
            Err(ResearchError::RateLimited { action })
        }
    }
}

fn log_provider_failure(job_id: Uuid, source: &str, error: &ProviderError) {
    tracing::warn!(job_id = %job_id, source, error = %error, "provider call failed");
}

/// Look up the job's postcode and store coordinates on the job.
///
/// # Errors
///
/// Authorization, quota, provider and database failures; see [`ResearchError`].
pub async fn geocode_job(
    state: &AppState,
    actor: &Actor,
    job_id: Uuid,
) -> Result<JobRow, ResearchError> {
    let job = authorize_job(state, actor, job_id).await?;
    consume_quota(state, actor, ACTION_GEOCODE, &state.provider_policy).await?;

    let result = state
        .providers
        .geocoder
        .geocode(&location_of(&job))
        .await
        .inspect_err(|e| log_provider_failure(job_id, ACTION_GEOCODE, e))?;

    let updated = surveydesk_db::record_geocode(
        &state.pool,
        job_id,
        &GeocodeUpdate {
            latitude: result.coordinates.latitude,
            longitude: result.coordinates.longitude,
            postcode_normalised: &result.postcode_normalised,
            source: result.source,
            geocoded_at: Utc::now(),
        },
    )
    .await?;

    tracing::info!(job_id = %job_id, postcode = %result.postcode_normalised, "job geocoded");
    Ok(updated)
}

/// Search certificates for the job's postcode and hold them for selection.
///
/// Nothing is persisted here, even for a single match.
///
/// # Errors
///
/// Authorization, quota, provider and database failures; see [`ResearchError`].
pub async fn run_certificate_check(
    state: &AppState,
    actor: &Actor,
    job_id: Uuid,
) -> Result<CertificateOffer, ResearchError> {
    let job = authorize_job(state, actor, job_id).await?;
    consume_quota(state, actor, ACTION_EPC_CHECK, &state.provider_policy).await?;

    let candidates = state
        .providers
        .epc
        .search_by_postcode(&location_of(&job))
        .await
        .inspect_err(|e| log_provider_failure(job_id, EPC_OPEN_DATA_API, e))?;

    let workflow_state = state
        .selections
        .offer(&actor.actor_id, job_id, candidates.clone())
        .await?;

    tracing::info!(
        job_id = %job_id,
        candidates = candidates.len(),
        "certificate candidates offered"
    );
    Ok(CertificateOffer {
        state: workflow_state,
        candidates,
    })
}

/// Commit one held certificate candidate as the job's EPC finding.
///
/// # Errors
///
/// [`ResearchError::NoPendingSelection`] if no candidates are held,
/// [`ResearchError::InvalidSelection`] for a bad choice, plus authorization
/// and database failures.
pub async fn select_certificate(
    state: &AppState,
    actor: &Actor,
    job_id: Uuid,
    selection: Selection<EpcCertificate>,
) -> Result<FindingRow, ResearchError> {
    authorize_job(state, actor, job_id).await?;

    let claim = state
        .selections
        .claim(&actor.actor_id, job_id, selection)
        .await?
        .ok_or(ResearchError::NoPendingSelection)?;

    let stored = surveydesk_db::upsert_finding(
        &state.pool,
        job_id,
        EPC_OPEN_DATA_API,
        FindingStatus::Complete,
        &FindingPayload::EpcCertificate(claim.certificate.clone()),
        Utc::now(),
    )
    .await;
    let finding = match stored {
        Ok(finding) => finding,
        Err(e) => {
            state.selections.restore(&actor.actor_id, job_id, claim).await;
            return Err(e.into());
        }
    };

    tracing::info!(job_id = %job_id, source = EPC_OPEN_DATA_API, "certificate selection committed");
    Ok(finding)
}

/// Candidates still awaiting the actor's choice for this job.
///
/// # Errors
///
/// [`ResearchError::NoPendingSelection`] if nothing is held, plus
/// authorization and database failures.
pub async fn pending_certificates(
    state: &AppState,
    actor: &Actor,
    job_id: Uuid,
) -> Result<CertificateOffer, ResearchError> {
    authorize_job(state, actor, job_id).await?;
    let candidates = state
        .selections
        .pending(&actor.actor_id, job_id)
        .await
        .ok_or(ResearchError::NoPendingSelection)?;
    Ok(CertificateOffer {
        state: WorkflowState::AwaitingSelection,
        candidates,
    })
}

/// Discard held certificate candidates without writing anything.
///
/// # Errors
///
/// [`ResearchError::NoPendingSelection`] if nothing was held, plus
/// authorization and database failures.
pub async fn cancel_certificate_selection(
    state: &AppState,
    actor: &Actor,
    job_id: Uuid,
) -> Result<(), ResearchError> {
    authorize_job(state, actor, job_id).await?;
    if state.selections.cancel(&actor.actor_id, job_id).await {
        Ok(())
    } else {
        Err(ResearchError::NoPendingSelection)
    }
}

/// Fetch crimes around the job, summarize them and store the summary.
///
/// # Errors
///
/// Authorization, quota, provider and database failures; see [`ResearchError`].
pub async fn run_crime_summary(
    state: &AppState,
    actor: &Actor,
    job_id: Uuid,
) -> Result<FindingRow, ResearchError> {
    let job = authorize_job(state, actor, job_id).await?;
    consume_quota(state, actor, ACTION_CRIME_SUMMARY, &state.provider_policy).await?;

    let summary = state
        .providers
        .police
        .crime_summary(&location_of(&job))
        .await
        .inspect_err(|e| log_provider_failure(job_id, POLICE_CRIME, e))?;

    let total = summary.total_crimes;
    let finding = surveydesk_db::upsert_finding(
        &state.pool,
        job_id,
        POLICE_CRIME,
        FindingStatus::Complete,
        &FindingPayload::CrimeSummary(summary),
        Utc::now(),
    )
    .await?;

    tracing::info!(job_id = %job_id, source = POLICE_CRIME, total_crimes = total, "crime summary stored");
    Ok(finding)
}

/// Evidence supplied by the actor for a manual research step.
#[derive(Debug, Default)]
pub struct AssistedStep {
    pub evidence_url: Option<String>,
    pub note: Option<String>,
}

/// Record that a manual step on an assisted source was carried out.
///
/// # Errors
///
/// [`ResearchError::NotFound`] for an unknown source,
/// [`ResearchError::Validation`] if the source is automated or does not apply
/// to the job's type, plus authorization and database failures.
pub async fn record_assisted_step(
    state: &AppState,
    actor: &Actor,
    job_id: Uuid,
    source_slug: &str,
    step: AssistedStep,
) -> Result<FindingRow, ResearchError> {
    let job = authorize_job(state, actor, job_id).await?;
    let source = surveydesk_db::get_source_by_slug(&state.pool, source_slug)
        .await?
        .ok_or(ResearchError::NotFound("source"))?;

    if source.mode != SourceMode::Assisted.as_str() {
        return Err(ResearchError::Validation(format!(
            "{source_slug} is not an assisted source"
        )));
    }
    let job_type: JobType = job
        .job_type
        .parse()
        .map_err(|e: surveydesk_core::CoreError| ResearchError::Database(e.into()))?;
    if !source.applies_to(job_type) {
        return Err(ResearchError::Validation(format!(
            "{source_slug} does not apply to {job_type} jobs"
        )));
    }

    let evidence = AssistedEvidence {
        evidence_url: step.evidence_url,
        note: step.note,
        recorded_by: actor.actor_id.clone(),
        recorded_at: Utc::now(),
    };
    let finding = surveydesk_db::upsert_finding(
        &state.pool,
        job_id,
        source_slug,
        FindingStatus::Complete,
        &FindingPayload::Assisted(evidence),
        Utc::now(),
    )
    .await?;

    tracing::info!(job_id = %job_id, source = source_slug, "assisted step recorded");
    Ok(finding)
}
