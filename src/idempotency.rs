//! Idempotent response caching.
//!
//! A client that sets an `Idempotency-Key` header gets the stored response
//! back on retries of the same canonical request, without paying twice. The
//! store interface is the minimum `get`/`set` surface so operators can back
//! it with a shared store; the async signature is part of the contract.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use crate::types::StoredResponse;

/// Default lifetime of a cached response.
pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);
/// How often the background sweep evicts expired entries.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(300);

/// Pluggable idempotency store.
///
/// Entries bind `key -> request_hash`; the gate replays only when the same
/// hash is presented under the same key, and answers 409 otherwise. Expired
/// entries must read as missing.
#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    async fn get(&self, key: &str) -> Option<StoredResponse>;
    async fn set(&self, key: &str, response: StoredResponse);
}

/// In-memory store with TTL eviction, the default backing.
///
/// Construction spawns the sweep task, so the store must be created within a
/// Tokio runtime; the sweep stops on [`close`](InMemoryIdempotencyStore::close)
/// or drop.
pub struct InMemoryIdempotencyStore {
    entries: Arc<DashMap<String, (StoredResponse, Instant)>>,
    ttl: Duration,
    sweeper: CancellationToken,
}

impl InMemoryIdempotencyStore {
    pub fn new(ttl: Duration) -> Self {
        let entries: Arc<DashMap<String, (StoredResponse, Instant)>> = Arc::new(DashMap::new());
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
                            tracing::debug!(removed, "swept expired idempotency entries");
                        }
                    }
                }
            }
        });
        Self {
            entries,
            ttl,
            sweeper,
        }
    }

    /// Evicts expired entries. Returns the number removed.
    pub fn sweep(&self) -> usize {
        sweep(&self.entries)
    }

    /// Stops the background sweep.
    pub fn close(&self) {
        self.sweeper.cancel();
    }
}

impl Default for InMemoryIdempotencyStore {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

impl Drop for InMemoryIdempotencyStore {
    fn drop(&mut self) {
        self.sweeper.cancel();
    }
}

fn sweep(entries: &DashMap<String, (StoredResponse, Instant)>) -> usize {
    let now = Instant::now();
    let before = entries.len();
    entries.retain(|_, (_, expires_at)| *expires_at > now);
    before - entries.len()
}

#[async_trait]
impl IdempotencyStore for InMemoryIdempotencyStore {
    async fn get(&self, key: &str) -> Option<StoredResponse> {
        let expired = match self.entries.get(key) {
            None => return None,
            Some(entry) => {
                let (response, expires_at) = entry.value();
                if *expires_at > Instant::now() {
                    return Some(response.clone());
                }
                true
            }
        };
        // Expired reads as missing; drop it eagerly rather than waiting for
        // the sweep.
        if expired {
            self.entries.remove(key);
        }
        None
    }

    async fn set(&self, key: &str, response: StoredResponse) {
        self.entries
            .insert(key.to_string(), (response, Instant::now() + self.ttl));
    }
}
