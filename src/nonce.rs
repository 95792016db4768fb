//! Single-use nonce registry for replay protection.
//!
//! A nonce is consumed by the first proof that verifies over it; any later
//! proof carrying the same nonce is refused. The registry is process-local
//! and non-persistent by design.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// How often the background sweep evicts expired nonces.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// In-process set of consumed nonces with time-based eviction.
///
/// `try_reserve` is atomic per key, so concurrent proofs over the same nonce
/// resolve to exactly one winner. Construction spawns the sweep task, so a
/// registry must be created within a Tokio runtime; the sweep stops on
/// [`close`](NonceRegistry::close) or drop.
pub struct NonceRegistry {
    entries: Arc<DashMap<String, i64>>,
    sweeper: CancellationToken,
}

impl NonceRegistry {
    pub fn new() -> Self {
        let entries: Arc<DashMap<String, i64>> = Arc::new(DashMap::new());
        let sweeper = CancellationToken::new();
        let task_entries = Arc::clone(&entries);
        let token = sweeper.clone();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(SWEEP_INTERVAL);
            tick.tick().await;
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tick.tick() => {
                        let removed = sweep(&task_entries);
                        if removed > 0 {
                            tracing::debug!(removed, "swept expired nonces");
                        }
                    }
                }
            }
        });
        Self { entries, sweeper }
    }

    /// Reserves a nonce until `expires_at_ms` (epoch milliseconds).
    ///
    /// Returns `true` iff the nonce was not present; the caller now owns it.
    pub fn try_reserve(&self, nonce: &str, expires_at_ms: i64) -> bool {
        match self.entries.entry(nonce.to_string()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(vacant) => {
                vacant.insert(expires_at_ms);
                true
            }
        }
    }

    /// Evicts nonces whose expiry has passed. Returns the number removed.
    pub fn sweep(&self) -> usize {
        sweep(&self.entries)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Stops the background sweep.
    pub fn close(&self) {
        self.sweeper.cancel();
    }
}

impl Default for NonceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for NonceRegistry {
    fn drop(&mut self) {
        self.sweeper.cancel();
    }
}

fn sweep(entries: &DashMap<String, i64>) -> usize {
    let now = chrono::Utc::now().timestamp_millis();
    let before = entries.len();
    entries.retain(|_, expires_at_ms| *expires_at_ms > now);
    before - entries.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn far_future() -> i64 {
        chrono::Utc::now().timestamp_millis() + 60_000
    }

    #[tokio::test]
    async fn test_reserve_is_one_shot() {
        let registry = NonceRegistry::new();
        assert!(registry.try_reserve("n1", far_future()));
        assert!(!registry.try_reserve("n1", far_future()));
        registry.close();
    }

    #[tokio::test]
    async fn test_independent_nonces() {
        let registry = NonceRegistry::new();
        assert!(registry.try_reserve("a", far_future()));
        assert!(registry.try_reserve("b", far_future()));
        registry.close();
    }

    #[tokio::test]
    async fn test_sweep_frees_expired() {
        let registry = NonceRegistry::new();
        let past = chrono::Utc::now().timestamp_millis() - 1;
        assert!(registry.try_reserve("stale", past));
        assert!(registry.try_reserve("fresh", far_future()));
        assert_eq!(registry.sweep(), 1);
        assert_eq!(registry.len(), 1);
        // The swept nonce is reusable; the live one still is not.
        assert!(registry.try_reserve("stale", far_future()));
        assert!(!registry.try_reserve("fresh", far_future()));
        registry.close();
    }

    #[tokio::test]
    async fn test_concurrent_reserve_has_one_winner() {
        let registry = Arc::new(NonceRegistry::new());
        let mut tasks = Vec::new();
        for _ in 0..16 {
            let registry = Arc::clone(&registry);
            tasks.push(tokio::spawn(async move {
                registry.try_reserve("contested", far_future())
            }));
        }
        let mut winners = 0;
        for task in tasks {
            if task.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
        registry.close();
    }
}
