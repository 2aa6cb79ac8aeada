//! Provider-backed research checks and the certificate selection flow.

use axum::{
    extract::{Path, State},
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use surveydesk_core::{EpcCertificate, Selection, WorkflowState};
use uuid::Uuid;

use crate::middleware::{Actor, RequestId};
use crate::research::{self, AssistedStep, ResearchError};

use super::jobs::{FindingItem, JobItem};
use super::{ApiError, ApiResponse, AppState};

#[derive(Debug, Serialize)]
pub(super) struct CertificateOfferData {
    state: WorkflowState,
    candidates: Vec<EpcCertificate>,
}

/// Exactly one of `index` or `record` identifies the chosen candidate.
#[derive(Debug, Deserialize)]
pub(super) struct SelectCertificateRequest {
    pub index: Option<usize>,
    pub record: Option<EpcCertificate>,
}

#[derive(Debug, Deserialize, Default)]
pub(super) struct AssistedStepRequest {
    pub evidence_url: Option<String>,
    pub note: Option<String>,
}

#[derive(Debug, Serialize)]
pub(super) struct CancelledData {
    cancelled: bool,
}

pub(super) async fn geocode_job(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(actor): Extension<Actor>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<ApiResponse<JobItem>>, ApiError> {
    match research::geocode_job(&state, &actor, job_id).await {
        Ok(job) => Ok(ApiResponse::new(JobItem::from(job), req_id.0)),
        Err(e) => Err(e.into_api_error(req_id.0)),
    }
}

pub(super) async fn run_certificate_check(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(actor): Extension<Actor>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<ApiResponse<CertificateOfferData>>, ApiError> {
    match research::run_certificate_check(&state, &actor, job_id).await {
        Ok(offer) => Ok(ApiResponse::new(
            CertificateOfferData {
                state: offer.state,
                candidates: offer.candidates,
            },
            req_id.0,
        )),
        Err(e) => Err(e.into_api_error(req_id.0)),
    }
}

pub(super) async fn pending_certificates(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(actor): Extension<Actor>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<ApiResponse<CertificateOfferData>>, ApiError> {
    match research::pending_certificates(&state, &actor, job_id).await {
        Ok(offer) => Ok(ApiResponse::new(
            CertificateOfferData {
                state: offer.state,
                candidates: offer.candidates,
            },
            req_id.0,
        )),
        Err(e) => Err(e.into_api_error(req_id.0)),
    }
}

pub(super) async fn select_certificate(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(actor): Extension<Actor>,
    Path(job_id): Path<Uuid>,
    Json(body): Json<SelectCertificateRequest>,
) -> Result<Json<ApiResponse<FindingItem>>, ApiError> {
    let selection = match (body.index, body.record) {
        (Some(index), None) => Selection::Index(index),
        (None, Some(record)) => Selection::Record(record),
        _ => {
            return Err(ResearchError::Validation(
                "provide exactly one of index or record".to_string(),
            )
            .into_api_error(req_id.0))
        }
    };

    match research::select_certificate(&state, &actor, job_id, selection).await {
        Ok(finding) => Ok(ApiResponse::new(FindingItem::from(finding), req_id.0)),
        Err(e) => Err(e.into_api_error(req_id.0)),
    }
}

pub(super) async fn cancel_certificate_selection(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(actor): Extension<Actor>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<ApiResponse<CancelledData>>, ApiError> {
    match research::cancel_certificate_selection(&state, &actor, job_id).await {
        Ok(()) => Ok(ApiResponse::new(CancelledData { cancelled: true }, req_id.0)),
        Err(e) => Err(e.into_api_error(req_id.0)),
    }
}

pub(super) async fn run_crime_summary(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(actor): Extension<Actor>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<ApiResponse<FindingItem>>, ApiError> {
    match research::run_crime_summary(&state, &actor, job_id).await {
        Ok(finding) => Ok(ApiResponse::new(FindingItem::from(finding), req_id.0)),
        Err(e) => Err(e.into_api_error(req_id.0)),
    }
}

pub(super) async fn record_assisted_step(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(actor): Extension<Actor>,
    Path((job_id, source_slug)): Path<(Uuid, String)>,
    body: Option<Json<AssistedStepRequest>>,
) -> Result<Json<ApiResponse<FindingItem>>, ApiError> {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let step = AssistedStep {
        evidence_url: body.evidence_url.filter(|s| !s.trim().is_empty()),
        note: body.note.filter(|s| !s.trim().is_empty()),
    };

    match research::record_assisted_step(&state, &actor, job_id, &source_slug, step).await {
        Ok(finding) => Ok(ApiResponse::new(FindingItem::from(finding), req_id.0)),
        Err(e) => Err(e.into_api_error(req_id.0)),
    }
}
