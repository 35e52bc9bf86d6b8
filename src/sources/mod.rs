//! Source collection.
//!
//! Each tier is gathered into a [`Contribution`]. Providers are fetched
//! concurrently, files and secret directories on the blocking pool, and every
//! attempt goes through the failure-policy table. Provider calls are timed
//! and pass a per-provider circuit breaker when one is configured.

mod cache;
mod files;
mod health;
mod provider;

pub use cache::{CacheStats, CachedValues, ProviderCache};
pub use files::{DotenvFile, FileSource, SecretsDir, parse_dotenv};
pub use health::{CircuitState, ProviderHealth, ProviderStats};
pub use provider::{
    Capabilities, JsonFileProvider, Provider, ProviderError, ProviderResult, SecretMetadata,
    StaticProvider,
};

use crate::error::CollectionError;
use crate::failure::FailurePolicies;
use crate::metrics::ProviderTiming;
use crate::precedence::Contribution;
use crate::types::{Origin, SourceId};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tokio::task::JoinSet;
use tracing::{debug, info};

/// The process environment, captured once per resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvSnapshot {
    vars: BTreeMap<String, String>,
}

impl EnvSnapshot {
    /// Read the current process environment. Non-UTF-8 entries are skipped.
    pub fn capture() -> Self {
        Self {
            vars: std::env::vars_os()
                .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
                .collect(),
        }
    }

    pub fn from_map<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: vars.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }

    /// Keep only variables whose name starts with `prefix`.
    pub fn with_prefix(mut self, prefix: &str) -> Self {
        self.vars.retain(|k, _| k.starts_with(prefix));
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn contribution(&self) -> Contribution {
        Contribution::new(Origin::new(SourceId::System), self.vars.clone())
    }
}

/// Load file sources in order, each on the blocking pool.
pub async fn collect_files(
    sources: &[(SourceId, Arc<dyn FileSource>)],
    policies: &FailurePolicies,
    warnings: &mut Vec<String>,
) -> Result<Vec<Contribution>, CollectionError> {
    let mut out = Vec::with_capacity(sources.len());
    for (tier, source) in sources {
        let name = source.name();
        let loader = Arc::clone(source);
        let result = tokio::task::spawn_blocking(move || loader.load())
            .await
            .unwrap_or_else(|e| {
                Err(CollectionError::Fetch {
                    name: name.clone(),
                    reason: e.to_string(),
                })
            });
        if let Some(values) = policies.apply(result, warnings)? {
            debug!(source = %name, tier = %tier, keys = values.len(), "Collected file source");
            out.push(Contribution::new(Origin::new(*tier), values));
        }
    }
    Ok(out)
}

/// What [`collect_providers`] gathered: contributions in provider-list
/// order and one timing per provider that finished.
#[derive(Debug, Default)]
pub struct ProviderCollection {
    pub contributions: Vec<Contribution>,
    pub timings: Vec<ProviderTiming>,
}

/// Fetch every provider concurrently.
///
/// `keys` are the names to ask for when a provider cannot enumerate its
/// values. All tasks finish before any policy is applied, so one failing
/// provider never discards another's result unseen. Contributions come back
/// in provider-list order.
pub async fn collect_providers(
    providers: &[Arc<dyn Provider>],
    keys: &[String],
    cache: Option<&Arc<ProviderCache>>,
    health: Option<&Arc<ProviderHealth>>,
    policies: &FailurePolicies,
    warnings: &mut Vec<String>,
) -> Result<ProviderCollection, CollectionError> {
    let mut set = JoinSet::new();
    for (index, provider) in providers.iter().enumerate() {
        let provider = Arc::clone(provider);
        let keys = keys.to_vec();
        let cache = cache.cloned();
        let health = health.cloned();
        set.spawn(async move { (index, fetch_provider(provider, keys, cache, health).await) });
    }

    let mut results: Vec<Option<Result<BTreeMap<String, String>, CollectionError>>> =
        (0..providers.len()).map(|_| None).collect();
    let mut timings: Vec<Option<ProviderTiming>> = (0..providers.len()).map(|_| None).collect();
    while let Some(joined) = set.join_next().await {
        if let Ok((index, (timing, result))) = joined {
            debug!(
                provider = %timing.provider,
                elapsed_ms = timing.elapsed.as_secs_f64() * 1000.0,
                cache_hit = timing.cache_hit,
                ok = timing.ok,
                "Provider call finished"
            );
            timings[index] = Some(timing);
            results[index] = Some(result);
        }
    }

    let mut collection = ProviderCollection {
        contributions: Vec::with_capacity(providers.len()),
        timings: timings.into_iter().flatten().collect(),
    };
    let mut first_failure = None;
    for (provider, result) in providers.iter().zip(results) {
        let result = result.unwrap_or_else(|| {
            Err(CollectionError::Fetch {
                name: provider.name().to_string(),
                reason: "fetch task aborted".to_string(),
            })
        });
        match policies.apply(result, warnings) {
            Ok(Some(values)) => {
                info!(provider = %provider.name(), keys = values.len(), "Collected provider values");
                collection.contributions.push(Contribution::new(
                    Origin::with_provider(SourceId::CloudProvider, provider.name()),
                    values,
                ));
            }
            Ok(None) => {}
            Err(err) => {
                first_failure.get_or_insert(err);
            }
        }
    }

    match first_failure {
        Some(err) => Err(err),
        None => Ok(collection),
    }
}

/// Serve from the cache when possible; reach the provider only on a miss.
async fn fetch_provider(
    provider: Arc<dyn Provider>,
    keys: Vec<String>,
    cache: Option<Arc<ProviderCache>>,
    health: Option<Arc<ProviderHealth>>,
) -> (ProviderTiming, Result<BTreeMap<String, String>, CollectionError>) {
    let started = Instant::now();
    let called = AtomicBool::new(false);
    let health = health.as_deref();

    let result = match cache {
        Some(cache) if provider.capabilities().cacheable => {
            let cache_key = format!("{}|{}", provider.name(), keys.join(","));
            let (target, wanted, called) = (provider.as_ref(), keys.as_slice(), &called);
            cache
                .get_or_fetch(&cache_key, move || guarded_fetch(target, wanted, health, called))
                .await
                .map(|values| values.as_ref().clone())
        }
        _ => guarded_fetch(provider.as_ref(), &keys, health, &called).await,
    };

    let timing = ProviderTiming {
        provider: provider.name().to_string(),
        elapsed: started.elapsed(),
        cache_hit: !called.load(Ordering::Relaxed),
        ok: result.is_ok(),
    };
    (timing, result)
}

/// One real call: circuit check, availability, then the fetch itself.
async fn guarded_fetch(
    provider: &dyn Provider,
    keys: &[String],
    health: Option<&ProviderHealth>,
    called: &AtomicBool,
) -> Result<BTreeMap<String, String>, CollectionError> {
    called.store(true, Ordering::Relaxed);
    let name = provider.name();
    if let Some(health) = health {
        if !health.allow(name) {
            debug!(provider = %name, "Circuit open, skipping provider");
            return Err(CollectionError::CircuitOpen {
                name: name.to_string(),
            });
        }
    }

    let started = Instant::now();
    let result = if provider.is_available().await {
        fetch_values(provider, keys).await
    } else {
        Err(CollectionError::Unavailable {
            name: name.to_string(),
        })
    };
    if let Some(health) = health {
        health.record(name, started.elapsed(), result.is_ok());
    }
    result
}

async fn fetch_values(
    provider: &dyn Provider,
    keys: &[String],
) -> Result<BTreeMap<String, String>, CollectionError> {
    let fetch_err = |e: ProviderError| CollectionError::Fetch {
        name: provider.name().to_string(),
        reason: e.to_string(),
    };

    if let Some(all) = provider.get_all().await.map_err(fetch_err)? {
        return Ok(all);
    }
    if provider.capabilities().batch {
        return provider.get_many(keys).await.map_err(fetch_err);
    }
    let mut out = BTreeMap::new();
    for key in keys {
        if let Some(value) = provider.get(key).await.map_err(fetch_err)? {
            out.insert(key.clone(), value);
        }
    }
    Ok(out)
}
