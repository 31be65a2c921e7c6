//! In-process cache tier and rate-limit state.
//!
//! `ProcessState` is the only state shared between requests. It is owned by `AppState`
//! so tests can build isolated instances.

pub mod fallback;
pub mod guard;

pub use fallback::load_fallback_repos;
pub use guard::RateLimitGuard;

use tokio::sync::RwLock;

use crate::models::CachedPayload;

/// Time-to-live of the memory and persisted payload caches.
pub const CACHE_TTL_MS: i64 = 15 * 60 * 1000;

/// Whether something stored at `stored_at` is still younger than `ttl_ms`.
///
/// A timestamp in the future is treated as stale.
pub fn is_fresh(stored_at: i64, now_ms: i64, ttl_ms: i64) -> bool {
    stored_at <= now_ms && now_ms - stored_at < ttl_ms
}

#[derive(Debug, Clone)]
struct MemoryEntry {
    payload: CachedPayload,
    stored_at: i64,
}

/// Memory cache plus the rate-limit guard.
#[derive(Debug, Default)]
pub struct ProcessState {
    memory: RwLock<Option<MemoryEntry>>,
    guard: RwLock<RateLimitGuard>,
}

impl ProcessState {
    pub fn new() -> Self {
        Self::default()
    }

    /// The memory payload if it is younger than the cache TTL.
    pub async fn fresh_payload(&self, now_ms: i64) -> Option<CachedPayload> {
        let memory = self.memory.read().await;
        memory
            .as_ref()
            .filter(|entry| is_fresh(entry.stored_at, now_ms, CACHE_TTL_MS))
            .map(|entry| entry.payload.clone())
    }

    pub async fn store_payload(&self, payload: CachedPayload, now_ms: i64) {
        *self.memory.write().await = Some(MemoryEntry {
            payload,
            stored_at: now_ms,
        });
    }

    pub async fn is_cooling_down(&self, now_ms: i64) -> bool {
        self.guard.read().await.is_cooling_down(now_ms)
    }

    /// Merge the persisted cooldown deadline into the in-process guard.
    pub async fn observe_rate_limit(&self, until: i64) {
        self.guard.write().await.observe(until);
    }

    /// Start the cooldown and return the deadline to persist.
    pub async fn trip_rate_limit(&self, now_ms: i64) -> i64 {
        self.guard.write().await.trip(now_ms)
    }

    pub async fn rate_limited_until(&self) -> i64 {
        self.guard.read().await.until()
    }
}
