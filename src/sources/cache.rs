//! TTL cache for provider fetches, shared across resolution calls.
//!
//! Concurrent misses on the same key collapse into one fetch: the first caller
//! fetches, later callers subscribe to a `watch` channel and receive the same
//! result. If the fetching call is cancelled its slot is released and a
//! waiter takes over. Failed fetches are handed to current waiters but never
//! stored.

use crate::error::CollectionError;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::debug;

/// Values fetched from one provider.
pub type CachedValues = Arc<BTreeMap<String, String>>;

type FetchOutcome = Option<Result<CachedValues, CollectionError>>;

enum Slot {
    Ready {
        values: CachedValues,
        expires_at: Instant,
    },
    Pending {
        id: u64,
        rx: watch::Receiver<FetchOutcome>,
    },
}

#[derive(Default)]
struct CacheState {
    slots: HashMap<String, Slot>,
    next_id: u64,
    stats: CacheStats,
}

/// Counters since the cache was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Callers that waited on another caller's in-flight fetch.
    pub coalesced: u64,
    /// Live (unexpired) entries at the time of the call.
    pub entries: usize,
}

pub struct ProviderCache {
    ttl: Duration,
    state: Mutex<CacheState>,
}

impl std::fmt::Debug for ProviderCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderCache")
            .field("ttl", &self.ttl)
            .field("stats", &self.stats())
            .finish()
    }
}

enum Step {
    Hit(CachedValues),
    Wait(watch::Receiver<FetchOutcome>),
    Fetch(u64, watch::Sender<FetchOutcome>),
}

/// Releases a pending slot if the fetch never completed.
struct PendingGuard<'a> {
    cache: &'a ProviderCache,
    key: &'a str,
    id: u64,
    armed: bool,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.cache.release(self.key, self.id);
        }
    }
}

impl ProviderCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            state: Mutex::new(CacheState::default()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Return the cached values for `key`, or run `fetch` once for all
    /// concurrent callers.
    pub async fn get_or_fetch<F, Fut>(&self, key: &str, fetch: F) -> Result<CachedValues, CollectionError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<BTreeMap<String, String>, CollectionError>>,
    {
        let mut fetch = Some(fetch);
        loop {
            match self.next_step(key) {
                Step::Hit(values) => return Ok(values),
                Step::Wait(mut rx) => {
                    // Err means the fetcher went away without a result; try again.
                    let outcome = match rx.wait_for(Option::is_some).await {
                        Ok(outcome) => outcome.clone(),
                        Err(_) => None,
                    };
                    if let Some(result) = outcome {
                        return result;
                    }
                }
                Step::Fetch(id, tx) => {
                    let Some(fetch) = fetch.take() else {
                        // A caller runs its fetch at most once.
                        return Err(CollectionError::Fetch {
                            name: key.to_string(),
                            reason: "fetch was cancelled".to_string(),
                        });
                    };
                    let mut guard = PendingGuard {
                        cache: self,
                        key,
                        id,
                        armed: true,
                    };
                    let result = fetch().await.map(Arc::new);
                    guard.armed = false;
                    self.complete(key, id, &result);
                    // Receivers may all be gone; that is fine.
                    let _ = tx.send(Some(result.clone()));
                    return result;
                }
            }
        }
    }

    fn next_step(&self, key: &str) -> Step {
        let mut guard = self.lock();
        let state = &mut *guard;
        let now = Instant::now();
        match state.slots.get(key) {
            Some(Slot::Ready { values, expires_at }) if *expires_at > now => {
                let values = values.clone();
                state.stats.hits += 1;
                debug!(key = %key, "Provider cache hit");
                return Step::Hit(values);
            }
            Some(Slot::Pending { rx, .. }) => {
                let rx = rx.clone();
                state.stats.coalesced += 1;
                debug!(key = %key, "Waiting on in-flight provider fetch");
                return Step::Wait(rx);
            }
            _ => {}
        }

        let id = state.next_id;
        state.next_id += 1;
        let (tx, rx) = watch::channel(None);
        state.slots.insert(key.to_string(), Slot::Pending { id, rx });
        state.stats.misses += 1;
        debug!(key = %key, "Provider cache miss");
        Step::Fetch(id, tx)
    }

    fn complete(&self, key: &str, id: u64, result: &Result<CachedValues, CollectionError>) {
        let mut state = self.lock();
        if !matches!(state.slots.get(key), Some(Slot::Pending { id: current, .. }) if *current == id) {
            return;
        }
        match result {
            Ok(values) => {
                state.slots.insert(
                    key.to_string(),
                    Slot::Ready {
                        values: values.clone(),
                        expires_at: Instant::now() + self.ttl,
                    },
                );
            }
            Err(_) => {
                state.slots.remove(key);
            }
        }
    }

    fn release(&self, key: &str, id: u64) {
        let mut state = self.lock();
        if matches!(state.slots.get(key), Some(Slot::Pending { id: current, .. }) if *current == id) {
            state.slots.remove(key);
            debug!(key = %key, "Released cancelled provider fetch");
        }
    }

    /// Drop one entry.
    pub fn invalidate(&self, key: &str) {
        let mut state = self.lock();
        if matches!(state.slots.get(key), Some(Slot::Ready { .. })) {
            state.slots.remove(key);
        }
    }

    /// Drop every ready entry. In-flight fetches are left alone.
    pub fn clear(&self) {
        self.lock()
            .slots
            .retain(|_, slot| matches!(slot, Slot::Pending { .. }));
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.lock();
        let now = Instant::now();
        let entries = state
            .slots
            .values()
            .filter(|s| matches!(s, Slot::Ready { expires_at, .. } if *expires_at > now))
            .count();
        CacheStats {
            entries,
            ..state.stats
        }
    }
}
