//! Timing of one resolution and its provider calls.
//!
//! [`PerformanceSla`] sets the expected wall time for three kinds of load. A
//! cold start made at least one real provider call. A cached load was served
//! entirely from the provider cache. A warm load touched no provider at all.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One provider's part in a resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderTiming {
    pub provider: String,
    pub elapsed: Duration,
    /// Served without calling the provider.
    pub cache_hit: bool,
    pub ok: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResolveMetrics {
    pub total: Duration,
    pub providers: Vec<ProviderTiming>,
}

impl ResolveMetrics {
    pub fn cache_hits(&self) -> usize {
        self.providers.iter().filter(|t| t.cache_hit).count()
    }

    pub fn cache_misses(&self) -> usize {
        self.providers.iter().filter(|t| !t.cache_hit).count()
    }

    /// Calls that reached a provider.
    pub fn provider_calls(&self) -> usize {
        self.cache_misses()
    }

    pub fn provider_time(&self, provider: &str) -> Duration {
        self.providers
            .iter()
            .filter(|t| t.provider == provider)
            .map(|t| t.elapsed)
            .sum()
    }
}

/// Wall-time thresholds, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceSla {
    pub enabled: bool,
    pub cold_start_ms: u64,
    pub warm_load_ms: u64,
    pub cached_ms: u64,
}

impl Default for PerformanceSla {
    fn default() -> Self {
        Self {
            enabled: true,
            cold_start_ms: 500,
            warm_load_ms: 50,
            cached_ms: 5,
        }
    }
}

impl PerformanceSla {
    /// A message when `metrics` exceeds the threshold for its kind of load.
    pub fn check(&self, metrics: &ResolveMetrics) -> Option<String> {
        if !self.enabled || metrics.total.is_zero() {
            return None;
        }

        let (load_type, threshold) = if metrics.cache_misses() > 0 {
            ("cold start", self.cold_start_ms)
        } else if metrics.cache_hits() > 0 {
            ("cached", self.cached_ms)
        } else {
            ("warm load", self.warm_load_ms)
        };

        let took_ms = metrics.total.as_secs_f64() * 1000.0;
        (took_ms > threshold as f64).then(|| {
            format!(
                "Performance SLA violation: {} load took {:.2}ms (threshold: {}ms)",
                load_type, took_ms, threshold
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timing(cache_hit: bool) -> ProviderTiming {
        ProviderTiming {
            provider: "vault".to_string(),
            elapsed: Duration::from_millis(3),
            cache_hit,
            ok: true,
        }
    }

    fn metrics(total_ms: u64, providers: Vec<ProviderTiming>) -> ResolveMetrics {
        ResolveMetrics {
            total: Duration::from_millis(total_ms),
            providers,
        }
    }

    #[test]
    fn test_load_type_thresholds() {
        let sla = PerformanceSla::default();
        assert_eq!(sla.check(&metrics(400, vec![timing(false)])), None);
        assert_eq!(
            sla.check(&metrics(600, vec![timing(false), timing(true)])).unwrap(),
            "Performance SLA violation: cold start load took 600.00ms (threshold: 500ms)"
        );
        assert_eq!(
            sla.check(&metrics(8, vec![timing(true)])).unwrap(),
            "Performance SLA violation: cached load took 8.00ms (threshold: 5ms)"
        );
        assert!(sla.check(&metrics(60, Vec::new())).unwrap().starts_with("Performance SLA violation: warm load"));
    }

    #[test]
    fn test_disabled_or_untimed() {
        let off = PerformanceSla {
            enabled: false,
            ..Default::default()
        };
        assert_eq!(off.check(&metrics(10_000, Vec::new())), None);
        assert_eq!(PerformanceSla::default().check(&ResolveMetrics::default()), None);
    }

    #[test]
    fn test_counters() {
        let m = metrics(1, vec![timing(true), timing(false), timing(false)]);
        assert_eq!(m.cache_hits(), 1);
        assert_eq!(m.provider_calls(), 2);
        assert_eq!(m.provider_time("vault"), Duration::from_millis(9));
        assert_eq!(m.provider_time("aws"), Duration::ZERO);
    }
}
