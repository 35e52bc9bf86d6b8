//! Per-provider call statistics and a circuit breaker.
//!
//! After `failure_threshold` consecutive failures a provider's circuit opens
//! and calls are rejected without reaching it. Once `open_for` has passed the
//! next call goes through half-open: success closes the circuit, failure
//! opens it again.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    #[default]
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProviderStats {
    pub calls: u64,
    pub failures: u64,
    /// Calls refused while the circuit was open.
    pub rejected: u64,
    pub total_time: Duration,
    pub state: CircuitState,
}

#[derive(Default)]
struct Entry {
    stats: ProviderStats,
    consecutive: u32,
    opened_at: Option<Instant>,
}

pub struct ProviderHealth {
    failure_threshold: u32,
    open_for: Duration,
    entries: Mutex<HashMap<String, Entry>>,
}

impl std::fmt::Debug for ProviderHealth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderHealth")
            .field("failure_threshold", &self.failure_threshold)
            .field("open_for", &self.open_for)
            .finish_non_exhaustive()
    }
}

impl Default for ProviderHealth {
    fn default() -> Self {
        Self::new(5, Duration::from_secs(60))
    }
}

impl ProviderHealth {
    pub fn new(failure_threshold: u32, open_for: Duration) -> Self {
        Self {
            failure_threshold: failure_threshold.max(1),
            open_for,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Whether a call to `name` may go ahead. Moves an expired open circuit
    /// to half-open; counts a rejection otherwise.
    pub fn allow(&self, name: &str) -> bool {
        let mut entries = self.lock();
        let entry = entries.entry(name.to_string()).or_default();
        if entry.stats.state != CircuitState::Open {
            return true;
        }
        if entry.opened_at.is_none_or(|at| at.elapsed() >= self.open_for) {
            info!(provider = %name, "Circuit half-open, trying provider again");
            entry.stats.state = CircuitState::HalfOpen;
            return true;
        }
        entry.stats.rejected += 1;
        false
    }

    /// Record the outcome of one call that `allow` let through.
    pub fn record(&self, name: &str, elapsed: Duration, ok: bool) {
        let mut entries = self.lock();
        let entry = entries.entry(name.to_string()).or_default();
        entry.stats.calls += 1;
        entry.stats.total_time += elapsed;

        if ok {
            if entry.stats.state != CircuitState::Closed {
                info!(provider = %name, "Circuit closed");
            }
            entry.consecutive = 0;
            entry.opened_at = None;
            entry.stats.state = CircuitState::Closed;
            return;
        }

        entry.stats.failures += 1;
        entry.consecutive += 1;
        if entry.stats.state == CircuitState::HalfOpen || entry.consecutive >= self.failure_threshold {
            if entry.stats.state != CircuitState::Open {
                warn!(
                    provider = %name,
                    failures = entry.consecutive,
                    open_for_secs = self.open_for.as_secs(),
                    "Circuit opened"
                );
            }
            entry.stats.state = CircuitState::Open;
            entry.opened_at = Some(Instant::now());
        }
    }

    pub fn state(&self, name: &str) -> CircuitState {
        self.lock().get(name).map(|e| e.stats.state).unwrap_or_default()
    }

    pub fn stats(&self, name: &str) -> Option<ProviderStats> {
        self.lock().get(name).map(|e| e.stats)
    }

    pub fn snapshot(&self) -> BTreeMap<String, ProviderStats> {
        self.lock().iter().map(|(k, e)| (k.clone(), e.stats)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MS: Duration = Duration::from_millis(1);

    #[test]
    fn test_opens_after_threshold() {
        let health = ProviderHealth::new(3, Duration::from_secs(60));
        for _ in 0..2 {
            assert!(health.allow("vault"));
            health.record("vault", MS, false);
        }
        assert_eq!(health.state("vault"), CircuitState::Closed);

        assert!(health.allow("vault"));
        health.record("vault", MS, false);
        assert_eq!(health.state("vault"), CircuitState::Open);
        assert!(!health.allow("vault"));
        assert!(!health.allow("vault"));

        let stats = health.stats("vault").unwrap();
        assert_eq!(stats.calls, 3);
        assert_eq!(stats.failures, 3);
        assert_eq!(stats.rejected, 2);
        assert_eq!(stats.total_time, 3 * MS);
        assert_eq!(health.state("other"), CircuitState::Closed);
    }

    #[test]
    fn test_success_resets_count() {
        let health = ProviderHealth::new(2, Duration::from_secs(60));
        health.record("vault", MS, false);
        health.record("vault", MS, true);
        health.record("vault", MS, false);
        assert_eq!(health.state("vault"), CircuitState::Closed);
    }

    #[test]
    fn test_half_open_recovery() {
        let health = ProviderHealth::new(1, Duration::ZERO);
        health.record("vault", MS, false);
        assert_eq!(health.state("vault"), CircuitState::Open);

        // Timeout already passed: one trial call, which fails and reopens.
        assert!(health.allow("vault"));
        assert_eq!(health.state("vault"), CircuitState::HalfOpen);
        health.record("vault", MS, false);
        assert_eq!(health.state("vault"), CircuitState::Open);

        assert!(health.allow("vault"));
        health.record("vault", MS, true);
        assert_eq!(health.state("vault"), CircuitState::Closed);
        assert_eq!(health.snapshot()["vault"].failures, 2);
    }
}
