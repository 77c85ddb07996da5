//! Per-key rate limit state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The quota state tracked for a single key within one window.
///
/// This is a plain value: stores hand out independent copies, and a
/// decrement produces a new value rather than mutating in place, so
/// concurrent readers holding stale copies are unaffected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitState {
    /// Total requests allowed per window; fixed at creation
    pub limit: u32,
    /// Requests left in the current window, in `0..=limit`
    pub remaining: u32,
    /// Whether this quota applies across all routes for the key
    pub global: bool,
    /// When the current window ends
    pub reset_at: DateTime<Utc>,
}

impl RateLimitState {
    /// Create a fresh full-quota state for a new window.
    pub fn new(limit: u32, global: bool, reset_at: DateTime<Utc>) -> Self {
        Self {
            limit,
            remaining: limit,
            global,
            reset_at,
        }
    }

    /// Return a copy of this state with `remaining` reduced by one,
    /// saturating at zero. All other fields are unchanged.
    pub fn decremented(&self) -> Self {
        Self {
            remaining: self.remaining.saturating_sub(1),
            ..*self
        }
    }

    /// Whether the window had ended as of `now`.
    ///
    /// An expired state is stale: it must be replaced by a fresh
    /// full-quota state, never decremented or treated as a denial.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.reset_at
    }

    /// Whether the quota was exhausted as of `now`.
    ///
    /// A state is exceeded only while its window is still open; an
    /// exhausted state whose window has also ended is merely stale.
    pub fn is_exceeded_at(&self, now: DateTime<Utc>) -> bool {
        !self.is_expired_at(now) && self.remaining == 0
    }

    /// Whether the window has ended, evaluated against the wall clock.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Whether the quota is exhausted, evaluated against the wall clock.
    pub fn is_exceeded(&self) -> bool {
        self.is_exceeded_at(Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn in_one_hour() -> DateTime<Utc> {
        Utc::now() + Duration::hours(1)
    }

    #[test]
    fn test_new_state_has_full_quota() {
        let state = RateLimitState::new(100, true, in_one_hour());
        assert_eq!(state.limit, 100);
        assert_eq!(state.remaining, 100);
        assert!(state.global);
    }

    #[test]
    fn test_decremented_returns_independent_copy() {
        let state = RateLimitState::new(5, false, in_one_hour());
        let next = state.decremented();

        assert_eq!(next.remaining, 4);
        assert_eq!(state.remaining, 5);
        assert_eq!(next.limit, state.limit);
        assert_eq!(next.reset_at, state.reset_at);
    }

    #[test]
    fn test_decremented_saturates_at_zero() {
        let mut state = RateLimitState::new(1, false, in_one_hour());
        state = state.decremented();
        assert_eq!(state.remaining, 0);

        state = state.decremented();
        assert_eq!(state.remaining, 0);
    }

    #[test]
    fn test_expiry_predicate() {
        let now = Utc::now();
        let state = RateLimitState::new(10, false, now + Duration::minutes(1));

        assert!(!state.is_expired_at(now));
        assert!(state.is_expired_at(now + Duration::minutes(1)));
        assert!(state.is_expired_at(now + Duration::minutes(2)));
    }

    #[test]
    fn test_exceeded_requires_open_window() {
        let now = Utc::now();
        let mut state = RateLimitState::new(1, false, now + Duration::minutes(1));
        state = state.decremented();

        assert!(state.is_exceeded_at(now));
    }

    #[test]
    fn test_exhausted_but_expired_is_stale_not_exceeded() {
        let now = Utc::now();
        let mut state = RateLimitState::new(1, false, now + Duration::minutes(1));
        state = state.decremented();

        // Past the window end, exhaustion no longer denies.
        assert!(!state.is_exceeded_at(now + Duration::minutes(2)));
        assert!(state.is_expired_at(now + Duration::minutes(2)));
    }
}
