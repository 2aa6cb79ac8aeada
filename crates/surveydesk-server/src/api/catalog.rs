use axum::{
    extract::{Query, State},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use surveydesk_core::JobType;

use crate::middleware::{Actor, RequestId};
use crate::research::ResearchError;

use super::{ApiError, ApiResponse, AppState};

#[derive(Debug, Deserialize)]
pub(super) struct SourcesQuery {
    pub job_type: Option<String>,
}

#[derive(Debug, Serialize)]
pub(super) struct SourceItem {
    slug: String,
    name: String,
    category: String,
    mode: String,
    url: String,
    enabled_for: Vec<String>,
}

#[derive(Debug, Serialize)]
pub(super) struct PortalItem {
    label: String,
    authority_name: Option<String>,
    url: String,
    created_at: DateTime<Utc>,
}

pub(super) async fn list_sources(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<SourcesQuery>,
) -> Result<Json<ApiResponse<Vec<SourceItem>>>, ApiError> {
    let job_type = match query.job_type.as_deref().map(str::parse::<JobType>) {
        None => None,
        Some(Ok(job_type)) => Some(job_type),
        Some(Err(e)) => return Err(ApiError::new(req_id.0, "validation_error", e.to_string())),
    };

    let rows = surveydesk_db::list_sources(&state.pool, job_type)
        .await
        .map_err(|e| ResearchError::from(e).into_api_error(req_id.0.clone()))?;

    let data = rows
        .into_iter()
        .map(|row| SourceItem {
            slug: row.slug,
            name: row.name,
            category: row.category,
            mode: row.mode,
            url: row.url,
            enabled_for: row.enabled_for,
        })
        .collect();

    Ok(ApiResponse::new(data, req_id.0))
}

pub(super) async fn list_portals(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(actor): Extension<Actor>,
) -> Result<Json<ApiResponse<Vec<PortalItem>>>, ApiError> {
    let rows = surveydesk_db::list_portals_for_org(&state.pool, &actor.org_id)
        .await
        .map_err(|e| ResearchError::from(e).into_api_error(req_id.0.clone()))?;

    let data = rows
        .into_iter()
        .map(|row| PortalItem {
            label: row.label,
            authority_name: row.authority_name,
            url: row.url,
            created_at: row.created_at,
        })
        .collect();

    Ok(ApiResponse::new(data, req_id.0))
}
