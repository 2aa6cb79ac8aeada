//! Read access to the `sources` catalog.

use sqlx::PgPool;
use surveydesk_core::JobType;

use crate::DbError;

/// A row from the `sources` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SourceRow {
    pub slug: String,
    pub name: String,
    pub category: String,
    pub mode: String,
    pub url: String,
    /// Job types this source applies to; empty means all.
    pub enabled_for: Vec<String>,
}

impl SourceRow {
    #[must_use]
    pub fn applies_to(&self, job_type: JobType) -> bool {
        self.enabled_for.is_empty() || self.enabled_for.iter().any(|t| t == job_type.as_str())
    }
}

/// Lists catalog entries by display name, optionally only those that apply
/// to `job_type`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_sources(
    pool: &PgPool,
    job_type: Option<JobType>,
) -> Result<Vec<SourceRow>, DbError> {
    let rows = sqlx::query_as::<_, SourceRow>(
        "SELECT slug, name, category, mode, url, enabled_for \
         FROM sources \
         WHERE $1::text IS NULL \
            OR cardinality(enabled_for) = 0 \
            OR $1 = ANY(enabled_for) \
         ORDER BY name",
    )
    .bind(job_type.map(JobType::as_str))
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Returns one catalog entry by slug, or `None` if not found.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_source_by_slug(pool: &PgPool, slug: &str) -> Result<Option<SourceRow>, DbError> {
    let row = sqlx::query_as::<_, SourceRow>(
        "SELECT slug, name, category, mode, url, enabled_for FROM sources WHERE slug = $1",
    )
    .bind(slug)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(enabled_for: &[&str]) -> SourceRow {
        SourceRow {
            slug: "RADON_UK".to_string(),
            name: "UK Radon Maps".to_string(),
            category: "INDICATIVE".to_string(),
            mode: "ASSISTED".to_string(),
            url: "https://www.ukradon.org/information/ukmaps".to_string(),
            enabled_for: enabled_for.iter().map(ToString::to_string).collect(),
        }
    }

    #[test]
    fn empty_enabled_for_applies_to_every_job_type() {
        let s = source(&[]);
        assert!(s.applies_to(JobType::Survey));
        assert!(s.applies_to(JobType::Development));
    }

    #[test]
    fn enabled_for_restricts_job_types() {
        let s = source(&["SURVEY", "VALUATION"]);
        assert!(s.applies_to(JobType::Valuation));
        assert!(!s.applies_to(JobType::Development));
    }
}
