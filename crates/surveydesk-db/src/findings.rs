//! The finding store: one row per (job, source), replaced wholesale on every run.

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::PgPool;
use surveydesk_core::{FindingPayload, FindingStatus};
use uuid::Uuid;

use crate::DbError;

/// A row from the `job_findings` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct FindingRow {
    pub id: i64,
    pub job_id: Uuid,
    pub source_slug: String,
    pub status: String,
    pub structured_json: Value,
    pub executed_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FindingRow {
    /// Parse the stored JSON with the schema registered for this row's source.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Core`] if the stored payload does not match.
    pub fn payload(&self) -> Result<FindingPayload, DbError> {
        Ok(FindingPayload::from_stored(
            &self.source_slug,
            self.structured_json.clone(),
        )?)
    }
}

/// Creates or replaces the finding for `(job_id, source_slug)`.
///
/// A single `INSERT ... ON CONFLICT DO UPDATE`, so concurrent runs of the same
/// source against the same job serialize on the unique key and the last
/// writer's payload wins. Status, payload and `executed_at` are always
/// replaced together.
///
/// # Errors
///
/// Returns [`DbError::Core`] if the payload cannot be serialized, or
/// [`DbError::Sqlx`] if the upsert fails (including an unknown job or source).
pub async fn upsert_finding(
    pool: &PgPool,
    job_id: Uuid,
    source_slug: &str,
    status: FindingStatus,
    payload: &FindingPayload,
    executed_at: DateTime<Utc>,
) -> Result<FindingRow, DbError> {
    let structured_json = payload.to_value()?;

    let row = sqlx::query_as::<_, FindingRow>(
        "INSERT INTO job_findings (job_id, source_slug, status, structured_json, executed_at) \
         VALUES ($1, $2, $3, $4, $5) \
         ON CONFLICT (job_id, source_slug) DO UPDATE SET \
             status = EXCLUDED.status, \
             structured_json = EXCLUDED.structured_json, \
             executed_at = EXCLUDED.executed_at, \
             updated_at = NOW() \
         RETURNING id, job_id, source_slug, status, structured_json, executed_at, \
                   created_at, updated_at",
    )
    .bind(job_id)
    .bind(source_slug)
    .bind(status.as_str())
    .bind(&structured_json)
    .bind(executed_at)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// Returns every finding recorded for a job, ordered by source slug.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_findings_for_job(pool: &PgPool, job_id: Uuid) -> Result<Vec<FindingRow>, DbError> {
    let rows = sqlx::query_as::<_, FindingRow>(
        "SELECT id, job_id, source_slug, status, structured_json, executed_at, \
                created_at, updated_at \
         FROM job_findings \
         WHERE job_id = $1 \
         ORDER BY source_slug",
    )
    .bind(job_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
