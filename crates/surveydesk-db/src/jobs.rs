//! Database operations for the `jobs` table.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use surveydesk_core::{JobStatus, JobType};
use uuid::Uuid;

use crate::DbError;

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// A row from the `jobs` table.
///
/// `lat`, `lon`, `geocode_source` and `geocoded_at` are all `Some` or all
/// `None`; the table's CHECK constraint enforces it.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct JobRow {
    pub id: Uuid,
    pub org_id: String,
    pub created_by: String,
    pub job_type: String,
    pub status: String,
    pub address_line1: String,
    pub town: Option<String>,
    pub postcode: String,
    pub postcode_normalised: Option<String>,
    pub client_name: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub geocode_source: Option<String>,
    pub geocoded_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for [`create_job`]. Fields are stored as given; callers validate.
#[derive(Debug, Clone)]
pub struct NewJob<'a> {
    pub org_id: &'a str,
    pub created_by: &'a str,
    pub job_type: JobType,
    pub address_line1: &'a str,
    pub town: Option<&'a str>,
    pub postcode: &'a str,
    pub client_name: Option<&'a str>,
}

/// Result of a successful postcode lookup, applied to a job in one statement.
#[derive(Debug, Clone)]
pub struct GeocodeUpdate<'a> {
    pub latitude: f64,
    pub longitude: f64,
    pub postcode_normalised: &'a str,
    pub source: &'a str,
    pub geocoded_at: DateTime<Utc>,
}

/// Per-organisation job counts for the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::FromRow)]
pub struct JobCounts {
    pub active_jobs: i64,
    pub completed_jobs: i64,
    pub total_jobs: i64,
}

const JOB_COLUMNS: &str = "id, org_id, created_by, job_type, status, address_line1, town, \
     postcode, postcode_normalised, client_name, lat, lon, geocode_source, geocoded_at, \
     created_at, updated_at";

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

/// Inserts a new job in `NOT_STARTED` status and returns it.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn create_job(pool: &PgPool, job: &NewJob<'_>) -> Result<JobRow, DbError> {
    let row = sqlx::query_as::<_, JobRow>(&format!(
        "INSERT INTO jobs (id, org_id, created_by, job_type, status, address_line1, town, \
                           postcode, client_name) \
         VALUES ($1, $2, $3, $4, 'NOT_STARTED', $5, $6, $7, $8) \
         RETURNING {JOB_COLUMNS}"
    ))
    .bind(Uuid::new_v4())
    .bind(job.org_id)
    .bind(job.created_by)
    .bind(job.job_type.as_str())
    .bind(job.address_line1)
    .bind(job.town)
    .bind(job.postcode)
    .bind(job.client_name)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// Returns a job by id regardless of organisation, or `None` if absent.
///
/// Organisation scoping is the caller's responsibility so that it can tell
/// "not yours" apart from "does not exist".
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_job(pool: &PgPool, job_id: Uuid) -> Result<Option<JobRow>, DbError> {
    let row = sqlx::query_as::<_, JobRow>(&format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = $1"))
        .bind(job_id)
        .fetch_optional(pool)
        .await?;

    Ok(row)
}

/// Returns an organisation's jobs, newest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_jobs_for_org(
    pool: &PgPool,
    org_id: &str,
    limit: i64,
) -> Result<Vec<JobRow>, DbError> {
    let rows = sqlx::query_as::<_, JobRow>(&format!(
        "SELECT {JOB_COLUMNS} FROM jobs \
         WHERE org_id = $1 \
         ORDER BY created_at DESC, id \
         LIMIT $2"
    ))
    .bind(org_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Writes coordinates, normalised postcode and provenance in one statement.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the job does not exist, or
/// [`DbError::Sqlx`] if the update fails.
pub async fn record_geocode(
    pool: &PgPool,
    job_id: Uuid,
    update: &GeocodeUpdate<'_>,
) -> Result<JobRow, DbError> {
    let row = sqlx::query_as::<_, JobRow>(&format!(
        "UPDATE jobs \
         SET lat = $2, lon = $3, postcode_normalised = $4, geocode_source = $5, \
             geocoded_at = $6, updated_at = NOW() \
         WHERE id = $1 \
         RETURNING {JOB_COLUMNS}"
    ))
    .bind(job_id)
    .bind(update.latitude)
    .bind(update.longitude)
    .bind(update.postcode_normalised)
    .bind(update.source)
    .bind(update.geocoded_at)
    .fetch_optional(pool)
    .await?;

    row.ok_or(DbError::NotFound)
}

/// Moves a job to `to` if its current status allows it.
///
/// The update is guarded on the set of statuses that may precede `to`, so
/// two concurrent transitions cannot both apply.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the job does not exist,
/// [`DbError::InvalidTransition`] if its current status does not permit the
/// move, or [`DbError::Sqlx`] if a query fails.
pub async fn transition_job_status(
    pool: &PgPool,
    job_id: Uuid,
    to: JobStatus,
) -> Result<JobRow, DbError> {
    let allowed_from: Vec<&str> = [
        JobStatus::NotStarted,
        JobStatus::InProgress,
        JobStatus::Complete,
    ]
    .into_iter()
    .filter(|from| from.can_transition_to(to))
    .map(JobStatus::as_str)
    .collect();

    let updated = sqlx::query_as::<_, JobRow>(&format!(
        "UPDATE jobs \
         SET status = $2, updated_at = NOW() \
         WHERE id = $1 AND status = ANY($3) \
         RETURNING {JOB_COLUMNS}"
    ))
    .bind(job_id)
    .bind(to.as_str())
    .bind(&allowed_from[..])
    .fetch_optional(pool)
    .await?;

    if let Some(row) = updated {
        return Ok(row);
    }

    let current: Option<String> = sqlx::query_scalar("SELECT status FROM jobs WHERE id = $1")
        .bind(job_id)
        .fetch_optional(pool)
        .await?;

    match current {
        None => Err(DbError::NotFound),
        Some(status) => Err(DbError::InvalidTransition {
            job_id,
            from: status.parse()?,
            to,
        }),
    }
}

/// Counts an organisation's jobs by status.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn job_dashboard_stats(pool: &PgPool, org_id: &str) -> Result<JobCounts, DbError> {
    let counts = sqlx::query_as::<_, JobCounts>(
        "SELECT COUNT(*) FILTER (WHERE status = 'IN_PROGRESS') AS active_jobs, \
                COUNT(*) FILTER (WHERE status = 'COMPLETE') AS completed_jobs, \
                COUNT(*) AS total_jobs \
         FROM jobs \
         WHERE org_id = $1",
    )
    .bind(org_id)
    .fetch_one(pool)
    .await?;

    Ok(counts)
}
