mod catalog;
mod checks;
mod jobs;

use axum::{
    extract::State,
    http::{header, HeaderName, Method, StatusCode},
    response::IntoResponse,
    routing::{get, patch, post},
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use std::sync::Arc;
use surveydesk_core::RateLimitPolicy;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::middleware::{
    enforce_rate_limit, request_id, require_actor, AuthState, RateLimitState, RequestId,
};
use crate::research::Providers;
use crate::selections::SelectionRegistry;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub providers: Arc<Providers>,
    pub selections: SelectionRegistry,
    /// Per-actor quota applied to each provider-backed action.
    pub provider_policy: RateLimitPolicy,
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub data: T,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
pub struct ResponseMeta {
    pub request_id: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: ErrorBody,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
struct HealthData {
    status: &'static str,
    database: &'static str,
}

impl ResponseMeta {
    pub(super) fn new(request_id: String) -> Self {
        Self {
            request_id,
            timestamp: Utc::now(),
        }
    }
}

impl<T: Serialize> ApiResponse<T> {
    pub(super) fn new(data: T, request_id: String) -> Json<Self> {
        Json(Self {
            data,
            meta: ResponseMeta::new(request_id),
        })
    }
}

impl ApiError {
    pub fn new(
        request_id: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            error: ErrorBody {
                code: code.into(),
                message: message.into(),
            },
            meta: ResponseMeta::new(request_id.into()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = match self.error.code.as_str() {
            "not_found" => StatusCode::NOT_FOUND,
            "unauthorized" => StatusCode::UNAUTHORIZED,
            "bad_request" | "validation_error" | "missing_input" | "invalid_postcode"
            | "invalid_selection" => StatusCode::BAD_REQUEST,
            "conflict" | "precondition_failed" | "no_pending_selection" => StatusCode::CONFLICT,
            "rate_limited" => StatusCode::TOO_MANY_REQUESTS,
            "provider_error" => StatusCode::BAD_GATEWAY,
            "missing_credentials" => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(self)).into_response()
    }
}

pub(super) fn normalize_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(50).clamp(1, 200)
}

fn build_cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static("x-request-id"),
            HeaderName::from_static("x-actor-id"),
            HeaderName::from_static("x-org-id"),
        ])
}

fn protected_router(auth: AuthState, rate_limit: RateLimitState) -> Router<AppState> {
    Router::new()
        .route("/api/v1/jobs", get(jobs::list_jobs).post(jobs::create_job))
        .route("/api/v1/jobs/{job_id}", get(jobs::get_job))
        .route("/api/v1/jobs/{job_id}/status", patch(jobs::update_job_status))
        .route("/api/v1/jobs/{job_id}/findings", get(jobs::list_findings))
        .route("/api/v1/jobs/{job_id}/geocode", post(checks::geocode_job))
        .route("/api/v1/jobs/{job_id}/checks/epc", post(checks::run_certificate_check))
        .route(
            "/api/v1/jobs/{job_id}/checks/epc/selection",
            get(checks::pending_certificates)
                .post(checks::select_certificate)
                .delete(checks::cancel_certificate_selection),
        )
        .route("/api/v1/jobs/{job_id}/checks/crime", post(checks::run_crime_summary))
        .route(
            "/api/v1/jobs/{job_id}/checks/assisted/{source_slug}",
            post(checks::record_assisted_step),
        )
        .route("/api/v1/dashboard", get(jobs::dashboard))
        .route("/api/v1/sources", get(catalog::list_sources))
        .route("/api/v1/portals", get(catalog::list_portals))
        .layer(
            ServiceBuilder::new()
                .layer(axum::middleware::from_fn_with_state(auth, require_actor))
                .layer(axum::middleware::from_fn_with_state(
                    rate_limit,
                    enforce_rate_limit,
                )),
        )
}

pub fn build_app(state: AppState, auth: AuthState, rate_limit: RateLimitState) -> Router {
    let public_routes = Router::new().route("/api/v1/health", get(health));

    Router::new()
        .merge(public_routes)
        .merge(protected_router(auth, rate_limit))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(build_cors())
                .layer(axum::middleware::from_fn(request_id)),
        )
        .with_state(state)
}

async fn health(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> impl IntoResponse {
    let meta = ResponseMeta::new(req_id.0);

    match surveydesk_db::health_check(&state.pool).await {
        Ok(()) => (
            StatusCode::OK,
            Json(ApiResponse {
                data: HealthData {
                    status: "ok",
                    database: "ok",
                },
                meta,
            }),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "health check: database unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ApiResponse {
                    data: HealthData {
                        status: "degraded",
                        database: "unavailable",
                    },
                    meta,
                }),
            )
        }
    }
}

pub fn api_rate_limit_state(requests_per_minute: usize) -> RateLimitState {
    let limit = u32::try_from(requests_per_minute).unwrap_or(u32::MAX);
    RateLimitState::new(RateLimitPolicy::from_secs(limit, 60))
}
