//! Per-(actor, action) fixed-window counters for provider calls.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use surveydesk_core::RateLimitPolicy;

use crate::DbError;

/// Outcome of [`check_and_consume`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The call was counted; `used` is the count within the current window.
    Allowed { used: u32 },
    /// The quota for the current window is spent. Nothing was written.
    RateLimited,
}

impl Admission {
    #[must_use]
    pub fn is_allowed(self) -> bool {
        matches!(self, Admission::Allowed { .. })
    }
}

/// Count one call by `actor_id` for `action` at `now`, or refuse it.
///
/// The whole check runs as one `INSERT ... ON CONFLICT DO UPDATE ... WHERE`:
/// a missing counter is created at 1, an elapsed window is reset to 1, a
/// counter below the limit is incremented, and a spent counter matches no
/// row so nothing is updated and nothing is returned. Postgres holds the row
/// lock across the conflict check and the update, so concurrent calls for
/// the same key cannot both slip under the limit.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the statement fails.
pub async fn check_and_consume(
    pool: &PgPool,
    actor_id: &str,
    action: &str,
    policy: &RateLimitPolicy,
    now: DateTime<Utc>,
) -> Result<Admission, DbError> {
    let limit = i32::try_from(policy.limit).unwrap_or(i32::MAX);

    let count: Option<i32> = sqlx::query_scalar(
        "INSERT INTO rate_limits (actor_id, action, count, window_started_at) \
         VALUES ($1, $2, 1, $3) \
         ON CONFLICT (actor_id, action) DO UPDATE SET \
             count = CASE \
                 WHEN $3 - rate_limits.window_started_at >= $5::bigint * INTERVAL '1 second' THEN 1 \
                 ELSE rate_limits.count + 1 \
             END, \
             window_started_at = CASE \
                 WHEN $3 - rate_limits.window_started_at >= $5::bigint * INTERVAL '1 second' THEN $3 \
                 ELSE rate_limits.window_started_at \
             END \
         WHERE $3 - rate_limits.window_started_at >= $5::bigint * INTERVAL '1 second' \
            OR rate_limits.count < $4 \
         RETURNING count",
    )
    .bind(actor_id)
    .bind(action)
    .bind(now)
    .bind(limit)
    .bind(policy.window_secs())
    .fetch_optional(pool)
    .await?;

    Ok(match count {
        Some(used) => Admission::Allowed {
            used: u32::try_from(used).unwrap_or(0),
        },
        None => Admission::RateLimited,
    })
}
