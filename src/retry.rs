//! Bounded retry for upstream calls that may answer "not ready yet".

use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Pause between attempts
    pub delay: Duration,
}

impl RetryPolicy {
    pub const fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }

    /// Commit statistics are generated lazily upstream; three tries two seconds apart.
    pub const fn commit_stats() -> Self {
        Self::fixed(3, Duration::from_secs(2))
    }

    /// Run `op` until `should_retry` returns false or attempts run out.
    ///
    /// Always returns the last outcome, so the caller sees "still pending" if every
    /// attempt was pending.
    pub async fn run<T, F, Fut>(&self, mut op: F, should_retry: impl Fn(&T) -> bool) -> T
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = T>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            let outcome = op().await;
            if attempt >= max_attempts || !should_retry(&outcome) {
                return outcome;
            }

            tracing::debug!(
                attempt,
                max_attempts,
                delay_ms = self.delay.as_millis() as u64,
                "retrying pending upstream call"
            );
            attempt += 1;
            tokio::time::sleep(self.delay).await;
        }
    }
}
