//! Fixed-window quota policy.
//!
//! The same rule is applied in two places: in memory by the API middleware
//! and atomically in SQL by `surveydesk_db::rate_limits` for per-actor
//! provider quotas. Bursts straddling a window boundary are accepted.

use chrono::{DateTime, TimeDelta, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    /// Requests allowed per window. Always at least 1.
    pub limit: u32,
    pub window: TimeDelta,
}

impl RateLimitPolicy {
    #[must_use]
    pub fn new(limit: u32, window: TimeDelta) -> Self {
        Self {
            limit: limit.max(1),
            window,
        }
    }

    #[must_use]
    pub fn from_secs(limit: u32, window_secs: u64) -> Self {
        let secs = i64::try_from(window_secs).unwrap_or(i64::MAX);
        Self::new(limit, TimeDelta::try_seconds(secs).unwrap_or(TimeDelta::MAX))
    }

    /// Window length in whole seconds, as bound into SQL.
    #[must_use]
    pub fn window_secs(&self) -> i64 {
        self.window.num_seconds()
    }
}

/// Counter state for one (actor, action) key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedWindow {
    pub count: u32,
    pub started_at: DateTime<Utc>,
}

impl FixedWindow {
    /// A fresh window holding the request that created it.
    #[must_use]
    pub fn opened_at(now: DateTime<Utc>) -> Self {
        Self {
            count: 1,
            started_at: now,
        }
    }

    /// Account for one request at `now`.
    ///
    /// Returns `false` and leaves the window untouched when the quota is
    /// spent. Otherwise rolls the window over if it has elapsed, or
    /// increments the count, and returns `true`.
    pub fn admit(&mut self, policy: &RateLimitPolicy, now: DateTime<Utc>) -> bool {
        if self.has_elapsed(policy, now) {
            *self = Self::opened_at(now);
            return true;
        }
        if self.count >= policy.limit {
            return false;
        }
        self.count += 1;
        true
    }

    /// Whether the window is over at `now`, so its count no longer applies.
    #[must_use]
    pub fn has_elapsed(&self, policy: &RateLimitPolicy, now: DateTime<Utc>) -> bool {
        now - self.started_at >= policy.window
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()
    }

    #[test]
    fn allows_limit_then_rejects() {
        let policy = RateLimitPolicy::from_secs(5, 3600);
        let mut window = FixedWindow::opened_at(t0());
        for i in 1..5 {
            assert!(window.admit(&policy, t0() + TimeDelta::seconds(i)));
        }
        assert_eq!(window.count, 5);

        let before = window;
        assert!(!window.admit(&policy, t0() + TimeDelta::seconds(10)));
        assert_eq!(window, before, "a rejected request must not change the counter");
    }

    #[test]
    fn rolls_over_once_window_elapses() {
        let policy = RateLimitPolicy::from_secs(2, 60);
        let mut window = FixedWindow::opened_at(t0());
        assert!(window.admit(&policy, t0() + TimeDelta::seconds(1)));
        assert!(!window.admit(&policy, t0() + TimeDelta::seconds(59)));

        let later = t0() + TimeDelta::seconds(60);
        assert!(window.admit(&policy, later));
        assert_eq!(window, FixedWindow::opened_at(later));
        assert!(!window.has_elapsed(&policy, later + TimeDelta::seconds(59)));
        assert!(window.has_elapsed(&policy, later + TimeDelta::seconds(60)));
    }

    #[test]
    fn zero_limit_is_raised_to_one() {
        let policy = RateLimitPolicy::from_secs(0, 60);
        assert_eq!(policy.limit, 1);
        assert_eq!(policy.window_secs(), 60);
    }
}
