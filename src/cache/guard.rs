//! Process-wide rate-limit cooldown.

/// Cooldown applied after the upstream answers 403 or 429.
pub const RATE_LIMIT_COOLDOWN_MS: i64 = 15 * 60 * 1000;

/// Cooldown window, in Unix milliseconds. `until` only ever moves forward.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RateLimitGuard {
    until: i64,
}

impl RateLimitGuard {
    pub fn until(&self) -> i64 {
        self.until
    }

    pub fn is_cooling_down(&self, now_ms: i64) -> bool {
        now_ms < self.until
    }

    /// Start (or extend) the cooldown from `now_ms` and return the new deadline.
    pub fn trip(&mut self, now_ms: i64) -> i64 {
        self.observe(now_ms.saturating_add(RATE_LIMIT_COOLDOWN_MS));
        self.until
    }

    /// Merge a deadline seen elsewhere, such as the persisted store.
    pub fn observe(&mut self, until: i64) {
        self.until = self.until.max(until);
    }
}
