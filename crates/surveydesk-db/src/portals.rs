use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::DbError;

/// A row from the `portal_configs` table: an organisation's link to a local
/// authority planning or GIS portal.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PortalConfigRow {
    pub id: i64,
    pub org_id: String,
    pub label: String,
    pub authority_name: Option<String>,
    pub url: String,
    pub created_at: DateTime<Utc>,
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_portals_for_org(
    pool: &PgPool,
    org_id: &str,
) -> Result<Vec<PortalConfigRow>, DbError> {
    let rows = sqlx::query_as::<_, PortalConfigRow>(
        "SELECT id, org_id, label, authority_name, url, created_at \
         FROM portal_configs \
         WHERE org_id = $1 \
         ORDER BY label",
    )
    .bind(org_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
