use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use surveydesk_core::{JobStatus, JobType};
use surveydesk_db::{FindingRow, JobRow, NewJob};
use uuid::Uuid;

use crate::middleware::{Actor, RequestId};
use crate::research::{authorize_job, ResearchError};

use super::{normalize_limit, ApiError, ApiResponse, AppState};

const RECENT_JOBS: i64 = 5;

#[derive(Debug, Deserialize)]
pub(super) struct ListJobsQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub(super) struct CreateJobRequest {
    pub job_type: JobType,
    pub address_line1: String,
    pub town: Option<String>,
    pub postcode: String,
    pub client_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct UpdateStatusRequest {
    pub status: JobStatus,
}

#[derive(Debug, Serialize)]
pub(super) struct JobItem {
    job_id: Uuid,
    job_type: String,
    status: String,
    address_line1: String,
    town: Option<String>,
    postcode: String,
    postcode_normalised: Option<String>,
    client_name: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    geocode_source: Option<String>,
    geocoded_at: Option<DateTime<Utc>>,
    created_by: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<JobRow> for JobItem {
    fn from(job: JobRow) -> Self {
        Self {
            job_id: job.id,
            job_type: job.job_type,
            status: job.status,
            address_line1: job.address_line1,
            town: job.town,
            postcode: job.postcode,
            postcode_normalised: job.postcode_normalised,
            client_name: job.client_name,
            latitude: job.lat,
            longitude: job.lon,
            geocode_source: job.geocode_source,
            geocoded_at: job.geocoded_at,
            created_by: job.created_by,
            created_at: job.created_at,
            updated_at: job.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub(super) struct FindingItem {
    source_slug: String,
    status: String,
    payload: serde_json::Value,
    executed_at: DateTime<Utc>,
}

impl From<FindingRow> for FindingItem {
    fn from(finding: FindingRow) -> Self {
        Self {
            source_slug: finding.source_slug,
            status: finding.status,
            payload: finding.structured_json,
            executed_at: finding.executed_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub(super) struct JobDetail {
    #[serde(flatten)]
    job: JobItem,
    findings: Vec<FindingItem>,
}

#[derive(Debug, Serialize)]
pub(super) struct DashboardData {
    active_jobs: i64,
    completed_jobs: i64,
    total_jobs: i64,
    recent_jobs: Vec<JobItem>,
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

pub(super) async fn create_job(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(actor): Extension<Actor>,
    Json(body): Json<CreateJobRequest>,
) -> Result<(StatusCode, Json<ApiResponse<JobItem>>), ApiError> {
    let address_line1 = body.address_line1.trim();
    if address_line1.is_empty() {
        return Err(ApiError::new(req_id.0, "validation_error", "address is required"));
    }
    let postcode = body.postcode.trim();
    if postcode.is_empty() {
        return Err(ApiError::new(req_id.0, "validation_error", "postcode is required"));
    }

    let job = surveydesk_db::create_job(
        &state.pool,
        &NewJob {
            org_id: &actor.org_id,
            created_by: &actor.actor_id,
            job_type: body.job_type,
            address_line1,
            town: non_blank(body.town.as_deref()),
            postcode,
            client_name: non_blank(body.client_name.as_deref()),
        },
    )
    .await
    .map_err(|e| ResearchError::from(e).into_api_error(req_id.0.clone()))?;

    tracing::info!(job_id = %job.id, actor_id = %actor.actor_id, "job created");
    Ok((
        StatusCode::CREATED,
        ApiResponse::new(JobItem::from(job), req_id.0),
    ))
}

pub(super) async fn list_jobs(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(actor): Extension<Actor>,
    Query(query): Query<ListJobsQuery>,
) -> Result<Json<ApiResponse<Vec<JobItem>>>, ApiError> {
    let jobs = surveydesk_db::list_jobs_for_org(&state.pool, &actor.org_id, normalize_limit(query.limit))
        .await
        .map_err(|e| ResearchError::from(e).into_api_error(req_id.0.clone()))?;

    Ok(ApiResponse::new(
        jobs.into_iter().map(JobItem::from).collect(),
        req_id.0,
    ))
}

async fn load_findings(state: &AppState, job_id: Uuid) -> Result<Vec<FindingItem>, ResearchError> {
    let rows = surveydesk_db::list_findings_for_job(&state.pool, job_id).await?;
    for row in &rows {
        if let Err(e) = row.payload() {
            tracing::warn!(
                job_id = %job_id,
                source = %row.source_slug,
                error = %e,
                "stored finding does not match its schema"
            );
        }
    }
    Ok(rows.into_iter().map(FindingItem::from).collect())
}

pub(super) async fn get_job(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(actor): Extension<Actor>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<ApiResponse<JobDetail>>, ApiError> {
    let result = async {
        let job = authorize_job(&state, &actor, job_id).await?;
        let findings = load_findings(&state, job_id).await?;
        Ok::<_, ResearchError>(JobDetail {
            job: job.into(),
            findings,
        })
    }
    .await;

    result
        .map(|detail| ApiResponse::new(detail, req_id.0.clone()))
        .map_err(|e| e.into_api_error(req_id.0))
}

pub(super) async fn list_findings(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(actor): Extension<Actor>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<ApiResponse<Vec<FindingItem>>>, ApiError> {
    let result = async {
        authorize_job(&state, &actor, job_id).await?;
        load_findings(&state, job_id).await
    }
    .await;

    result
        .map(|findings| ApiResponse::new(findings, req_id.0.clone()))
        .map_err(|e| e.into_api_error(req_id.0))
}

pub(super) async fn update_job_status(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(actor): Extension<Actor>,
    Path(job_id): Path<Uuid>,
    Json(body): Json<UpdateStatusRequest>,
) -> Result<Json<ApiResponse<JobItem>>, ApiError> {
    let result = async {
        authorize_job(&state, &actor, job_id).await?;
        let job = surveydesk_db::transition_job_status(&state.pool, job_id, body.status).await?;
        tracing::info!(job_id = %job_id, status = %body.status, "job status updated");
        Ok::<_, ResearchError>(job)
    }
    .await;

    result
        .map(|job| ApiResponse::new(JobItem::from(job), req_id.0.clone()))
        .map_err(|e| e.into_api_error(req_id.0))
}

pub(super) async fn dashboard(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(actor): Extension<Actor>,
) -> Result<Json<ApiResponse<DashboardData>>, ApiError> {
    let result = async {
        let counts = surveydesk_db::job_dashboard_stats(&state.pool, &actor.org_id).await?;
        let recent =
            surveydesk_db::list_jobs_for_org(&state.pool, &actor.org_id, RECENT_JOBS).await?;
        Ok::<_, ResearchError>(DashboardData {
            active_jobs: counts.active_jobs,
            completed_jobs: counts.completed_jobs,
            total_jobs: counts.total_jobs,
            recent_jobs: recent.into_iter().map(JobItem::from).collect(),
        })
    }
    .await;

    result
        .map(|data| ApiResponse::new(data, req_id.0.clone()))
        .map_err(|e| e.into_api_error(req_id.0))
}
