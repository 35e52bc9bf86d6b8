//! Resolution entry point.
//!
//! A [`Resolver`] holds everything one run needs. Each call to
//! [`Resolver::resolve`] builds its own snapshot and audit trail; the only
//! state shared between calls is the optional provider cache.

use crate::audit::AuditTrail;
use crate::cast::cast_entry;
use crate::config::Settings;
use crate::crypto::{Cipher, CipherTool, ExternalCipher};
use crate::detect::Runtime;
use crate::error::{ResolveError, Result};
use crate::expand::expand_merged;
use crate::failure::FailurePolicies;
use crate::mask::SecretClassifier;
use crate::metrics::{PerformanceSla, ResolveMetrics};
use crate::policy::Policy;
use crate::precedence::{Contribution, merge};
use crate::schema::Schema;
use crate::snapshot::{ConfigSnapshot, ResolvedValue};
use crate::sources::{
    DotenvFile, EnvSnapshot, FileSource, JsonFileProvider, Provider, ProviderCache,
    ProviderHealth, SecretMetadata, SecretsDir, collect_files, collect_providers,
};
use crate::types::{Origin, SourceId};
use crate::validate::ValidationRules;
use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Output of a successful resolution.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub snapshot: ConfigSnapshot,
    pub audit: AuditTrail,
    /// Non-fatal findings: failed sources under `warn`, unknown or deprecated keys.
    pub warnings: Vec<String>,
    /// Wall time and per-provider timings of this call.
    pub metrics: ResolveMetrics,
}

impl Resolution {
    /// Map schema field names to their resolved values.
    pub fn resolve_for_fields(&self, field_names: &[&str]) -> BTreeMap<String, ResolvedValue> {
        self.snapshot.resolve_for_fields(field_names)
    }
}

/// Configures and runs resolutions.
#[derive(Clone)]
pub struct Resolver {
    schema: Schema,
    env: Option<String>,
    base_file: Option<PathBuf>,
    env_file_pattern: Option<String>,
    extra_files: Vec<(SourceId, Arc<dyn FileSource>)>,
    secrets_dirs: Vec<PathBuf>,
    system: Option<EnvSnapshot>,
    capture_system: bool,
    env_prefix: Option<String>,
    providers: Vec<Arc<dyn Provider>>,
    cache: Option<Arc<ProviderCache>>,
    health: Option<Arc<ProviderHealth>>,
    sla: PerformanceSla,
    failure_policies: FailurePolicies,
    custom_secrets: Vec<String>,
    rules: ValidationRules,
    policy: Option<Policy>,
    expand: bool,
    timeout: Option<Duration>,
    ci: bool,
    cipher: Option<(Arc<dyn Cipher>, Option<String>)>,
}

impl fmt::Debug for Resolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let providers: Vec<&str> = self.providers.iter().map(|p| p.name()).collect();
        f.debug_struct("Resolver")
            .field("env", &self.env)
            .field("base_file", &self.base_file)
            .field("secrets_dirs", &self.secrets_dirs)
            .field("providers", &providers)
            .field("expand", &self.expand)
            .field("timeout", &self.timeout)
            .field("ci", &self.ci)
            .finish_non_exhaustive()
    }
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new()
    }
}

impl Resolver {
    /// A resolver with no files, no providers and the live process environment.
    pub fn new() -> Self {
        Self {
            schema: Schema::default(),
            env: None,
            base_file: None,
            env_file_pattern: None,
            extra_files: Vec::new(),
            secrets_dirs: Vec::new(),
            system: None,
            capture_system: true,
            env_prefix: None,
            providers: Vec::new(),
            cache: None,
            health: None,
            sla: PerformanceSla::default(),
            failure_policies: FailurePolicies::default(),
            custom_secrets: Vec::new(),
            rules: ValidationRules::default(),
            policy: None,
            expand: true,
            timeout: None,
            ci: false,
            cipher: None,
        }
    }

    pub fn schema(mut self, schema: Schema) -> Self {
        self.schema = schema;
        self
    }

    /// Environment name; enables the `{base}.{env}` file.
    pub fn env(mut self, env: impl Into<String>) -> Self {
        self.env = Some(env.into());
        self
    }

    pub fn base_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_file = Some(path.into());
        self
    }

    /// Path pattern for the env-specific file, with `{base}` and `{env}`
    /// placeholders. Defaults to `{base}.{env}`.
    pub fn env_file_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.env_file_pattern = Some(pattern.into());
        self
    }

    /// Add another file source at `tier`, after the built-in dotenv files.
    pub fn file_source(mut self, tier: SourceId, source: Arc<dyn FileSource>) -> Self {
        self.extra_files.push((tier, source));
        self
    }

    pub fn secrets_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.secrets_dirs.push(dir.into());
        self
    }

    /// Use `env` instead of the live process environment.
    pub fn system_env(mut self, env: EnvSnapshot) -> Self {
        self.system = Some(env);
        self.capture_system = true;
        self
    }

    /// Leave the system tier out entirely.
    pub fn without_system_env(mut self) -> Self {
        self.system = None;
        self.capture_system = false;
        self
    }

    pub fn env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = Some(prefix.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn Provider>) -> Self {
        self.providers.push(provider);
        self
    }

    /// Share a provider cache across calls (and across resolvers).
    pub fn cache(mut self, cache: Arc<ProviderCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Track provider calls and trip a circuit breaker on repeated failures.
    /// Shared across calls like the cache.
    pub fn health(mut self, health: Arc<ProviderHealth>) -> Self {
        self.health = Some(health);
        self
    }

    pub fn sla(mut self, sla: PerformanceSla) -> Self {
        self.sla = sla;
        self
    }

    pub fn failure_policies(mut self, policies: FailurePolicies) -> Self {
        self.failure_policies = policies;
        self
    }

    pub fn secret_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.custom_secrets.extend(keys.into_iter().map(Into::into));
        self
    }

    pub fn rules(mut self, rules: ValidationRules) -> Self {
        self.rules = rules;
        self
    }

    pub fn policy(mut self, policy: Policy) -> Self {
        self.policy = Some(policy);
        self
    }

    pub fn expand(mut self, expand: bool) -> Self {
        self.expand = expand;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// CI mode: remote providers are not consulted.
    pub fn ci(mut self, ci: bool) -> Self {
        self.ci = ci;
        self
    }

    /// Decrypt the dotenv files with `cipher`.
    pub fn cipher(mut self, cipher: Arc<dyn Cipher>, key: Option<String>) -> Self {
        self.cipher = Some((cipher, key));
        self
    }

    /// Build a resolver from loaded settings, on the detected runtime.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Self::from_settings_in(settings, &Runtime::detect())
    }

    /// Build a resolver from loaded settings.
    ///
    /// Reads the schema and policy files named in the settings. JSON-file
    /// providers are registered in the order listed, skipping those whose
    /// `when` platform is not in `runtime`.
    pub fn from_settings_in(settings: &Settings, runtime: &Runtime) -> Result<Self> {
        let schema = settings
            .load_schema()
            .map_err(|e| ResolveError::config(format!("{:#}", e)))?;

        let mut rules = ValidationRules::new().strict(settings.strict);
        rules.strict_fails = settings.strict_fails;
        for key in &settings.required {
            rules = rules.require(key.clone());
        }
        for key in &settings.deprecated {
            rules = rules.deprecate(key.clone());
        }
        for (key, pattern) in &settings.patterns {
            rules = rules.pattern(key.clone(), pattern.clone());
        }

        let mut resolver = Self::new()
            .schema(schema)
            .base_file(settings.base_file.clone())
            .failure_policies(settings.failure.clone())
            .secret_keys(settings.secrets.iter().cloned())
            .rules(rules)
            .expand(settings.expand)
            .ci(settings.ci || (settings.detect_ci && runtime.ci))
            .sla(settings.sla);
        debug!(platforms = ?runtime.platforms(), ci = resolver.ci, "Runtime detected");

        resolver.env = settings.env.clone();
        resolver.env_file_pattern = Some(settings.env_file.clone());
        resolver.env_prefix = settings.env_prefix.clone();
        resolver.secrets_dirs = settings.secrets_dirs.clone();

        if let Some(path) = &settings.policy {
            resolver.policy = Some(Policy::from_file(path)?);
        }
        if let Some(seconds) = settings.timeout_seconds {
            resolver.timeout = Some(Duration::from_secs(seconds));
        }
        if settings.cache.enabled {
            resolver.cache = Some(Arc::new(ProviderCache::new(Duration::from_secs(
                settings.cache.ttl_seconds,
            ))));
        }
        if settings.circuit_breaker.enabled {
            resolver.health = Some(Arc::new(ProviderHealth::new(
                settings.circuit_breaker.failure_threshold,
                Duration::from_secs(settings.circuit_breaker.open_seconds),
            )));
        }
        if let Some(encryption) = &settings.encryption {
            let tool: CipherTool = encryption.tool.parse().map_err(ResolveError::config)?;
            resolver.cipher = Some((Arc::new(ExternalCipher::new(tool)), encryption.key.clone()));
        }
        for provider in &settings.providers {
            if let Some(platform) = provider.when {
                if !runtime.is(platform) {
                    debug!(provider = %provider.name, platform = %platform, "Platform not detected, provider skipped");
                    continue;
                }
            }
            resolver.providers.push(Arc::new(JsonFileProvider::new(
                provider.name.clone(),
                provider.path.clone(),
            )));
        }

        Ok(resolver)
    }

    pub fn providers(&self) -> &[Arc<dyn Provider>] {
        &self.providers
    }

    /// Run one resolution, bounded by the configured timeout.
    ///
    /// On timeout every in-flight provider fetch is dropped and the call
    /// fails as a whole.
    pub async fn resolve(&self) -> Result<Resolution> {
        match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, self.run()).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(timeout_ms = limit.as_millis() as u64, "Resolution timed out");
                    Err(ResolveError::Timeout(limit))
                }
            },
            None => self.run().await,
        }
    }

    /// Keys worth asking a non-enumerable provider for.
    fn wanted_keys(&self) -> Vec<String> {
        let mut keys: BTreeSet<String> = self.schema.field_keys();
        keys.extend(self.rules.required.iter().cloned());
        keys.extend(self.rules.rules.keys().cloned());
        keys.extend(self.rules.patterns.keys().cloned());
        if let Some(policy) = &self.policy {
            keys.extend(policy.referenced_keys());
        }
        keys.into_iter().collect()
    }

    fn file_sources(&self) -> Vec<(SourceId, Arc<dyn FileSource>)> {
        let dotenv = |path: PathBuf| -> Arc<dyn FileSource> {
            let file = DotenvFile::new(path);
            match &self.cipher {
                Some((cipher, key)) => Arc::new(file.encrypted(Arc::clone(cipher), key.clone())),
                None => Arc::new(file),
            }
        };

        let mut sources = Vec::new();
        if let Some(base) = &self.base_file {
            sources.push((SourceId::BaseFile, dotenv(base.clone())));
            if let Some(env) = &self.env {
                let path = match &self.env_file_pattern {
                    Some(pattern) => PathBuf::from(
                        pattern
                            .replace("{base}", &base.to_string_lossy())
                            .replace("{env}", env),
                    ),
                    None => DotenvFile::env_specific_path(base, env),
                };
                sources.push((SourceId::EnvSpecificFile, dotenv(path)));
            }
        }
        if !self.secrets_dirs.is_empty() {
            sources.push((
                SourceId::ContainerSecret,
                Arc::new(SecretsDir::new(self.secrets_dirs.clone())) as Arc<dyn FileSource>,
            ));
        }
        sources.extend(self.extra_files.iter().cloned());
        sources
    }

    fn system_contribution(&self) -> Option<Contribution> {
        if !self.capture_system {
            return None;
        }
        let env = self.system.clone().unwrap_or_else(EnvSnapshot::capture);
        let env = match &self.env_prefix {
            Some(prefix) => env.with_prefix(prefix),
            None => env,
        };
        Some(env.contribution())
    }

    async fn run(&self) -> Result<Resolution> {
        let started = Instant::now();
        let classifier = SecretClassifier::new().with_custom(self.custom_secrets.iter().cloned());
        let mut warnings = Vec::new();
        let mut metrics = ResolveMetrics::default();

        // Collect
        let defaults = self.schema.defaults();
        let mut contributions = vec![Contribution::new(
            Origin::new(SourceId::SchemaDefault),
            defaults
                .iter()
                .map(|(k, v)| (k.clone(), v.to_raw_string()))
                .collect(),
        )];
        contributions
            .extend(collect_files(&self.file_sources(), &self.failure_policies, &mut warnings).await?);
        contributions.extend(self.system_contribution());

        if self.ci {
            if !self.providers.is_empty() {
                info!(skipped = self.providers.len(), "CI mode, skipping remote providers");
            }
        } else if !self.providers.is_empty() {
            let keys = self.wanted_keys();
            let collected = collect_providers(
                &self.providers,
                &keys,
                self.cache.as_ref(),
                self.health.as_ref(),
                &self.failure_policies,
                &mut warnings,
            )
            .await?;
            contributions.extend(collected.contributions);
            metrics.providers = collected.timings;
        }

        // Merge and expand
        let mut merged = merge(&contributions);
        if self.expand {
            expand_merged(&mut merged)?;
        }

        // Cast
        let declared = self.schema.declared_types();
        let mut values = BTreeMap::new();
        for (key, entry) in merged {
            let ty = declared.get(&key).copied();
            // An untouched schema default keeps its declared form.
            let value = match defaults.get(&key) {
                Some(default)
                    if entry.origin.source == SourceId::SchemaDefault
                        && entry.raw == default.to_raw_string()
                        && ty.is_none_or(|t| default.matches(t)) =>
                {
                    default.clone()
                }
                _ => cast_entry(&key, &entry.raw, ty, &classifier)?,
            };
            let masked = classifier.is_secret(&key);
            values.insert(
                key.clone(),
                ResolvedValue {
                    key,
                    value,
                    origin: entry.origin,
                    masked,
                    shadowed: entry.shadowed,
                },
            );
        }
        let snapshot = ConfigSnapshot::new(values, declared, classifier, Utc::now());

        // Validate
        let metadata = self.ttl_metadata(&snapshot).await;
        warnings.extend(
            self.rules
                .validate(&snapshot, &self.schema, self.policy.as_ref(), &metadata)?,
        );

        let audit = AuditTrail::from_snapshot(&snapshot);
        metrics.total = started.elapsed();
        info!(
            keys = snapshot.len(),
            masked = audit.summary().masked_variables,
            warnings = warnings.len(),
            elapsed_ms = metrics.total.as_secs_f64() * 1000.0,
            cache_hits = metrics.cache_hits(),
            provider_calls = metrics.provider_calls(),
            "Resolved configuration"
        );
        if let Some(violation) = self.sla.check(&metrics) {
            warn!("{}", violation);
        }

        Ok(Resolution {
            snapshot,
            audit,
            warnings,
            metrics,
        })
    }

    /// Metadata for keys under a TTL rule, from the provider that supplied them.
    async fn ttl_metadata(&self, snapshot: &ConfigSnapshot) -> BTreeMap<String, SecretMetadata> {
        let mut out = BTreeMap::new();
        let Some(policy) = &self.policy else {
            return out;
        };

        for key in policy.ttl.keys() {
            let Some(resolved) = snapshot.get(key) else {
                continue;
            };
            let Some(name) = resolved.origin.provider.as_deref() else {
                continue;
            };
            let Some(provider) = self.providers.iter().find(|p| p.name() == name) else {
                continue;
            };
            if !provider.capabilities().metadata {
                continue;
            }
            match provider.get_metadata(key).await {
                Ok(Some(metadata)) => {
                    out.insert(key.clone(), metadata);
                }
                Ok(None) => {}
                Err(e) => {
                    debug!(key = %key, provider = %name, error = %e, "Metadata lookup failed");
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CollectionError, ExpansionError};
    use crate::failure::FailurePolicy;
    use crate::schema::FieldDescriptor;
    use crate::sources::StaticProvider;
    use crate::types::{TypedValue, ValueType};

    fn resolver() -> Resolver {
        Resolver::new().system_env(EnvSnapshot::default())
    }

    #[tokio::test]
    async fn test_typed_default_kept() {
        let schema = Schema::new()
            .field(FieldDescriptor::new("port").typed(ValueType::Int).with_default(8080i64))
            .field(FieldDescriptor::new("hosts").typed(ValueType::List).with_default(vec!["a", "b"]))
            .field(FieldDescriptor::new("name").with_default("svc"));
        let resolution = resolver().schema(schema).resolve().await.unwrap();

        let snapshot = &resolution.snapshot;
        assert_eq!(snapshot.value("PORT"), Some(&TypedValue::Int(8080)));
        assert_eq!(snapshot.value("HOSTS"), Some(&TypedValue::from(vec!["a", "b"])));
        assert_eq!(snapshot.value("NAME"), Some(&TypedValue::Str("svc".into())));
        assert_eq!(snapshot.get("PORT").unwrap().origin.source, SourceId::SchemaDefault);
    }

    #[tokio::test]
    async fn test_higher_tier_overrides_default() {
        let schema =
            Schema::new().field(FieldDescriptor::new("port").typed(ValueType::Int).with_default(8080i64));
        let resolution = Resolver::new()
            .system_env(EnvSnapshot::from_map([("PORT", "0x10")]))
            .schema(schema)
            .resolve()
            .await
            .unwrap();

        let port = resolution.snapshot.get("PORT").unwrap();
        assert_eq!(port.value, TypedValue::Int(16));
        assert_eq!(port.origin.source, SourceId::System);
        assert_eq!(port.shadowed, vec![Origin::new(SourceId::SchemaDefault)]);
    }

    #[tokio::test]
    async fn test_provider_wins_and_is_named() {
        let resolution = Resolver::new()
            .system_env(EnvSnapshot::from_map([("DB_PASSWORD", "from-env")]))
            .provider(Arc::new(StaticProvider::new("vault").with_value("DB_PASSWORD", "from-vault")))
            .resolve()
            .await
            .unwrap();

        let resolved = resolution.snapshot.get("DB_PASSWORD").unwrap();
        assert_eq!(resolved.origin, Origin::with_provider(SourceId::CloudProvider, "vault"));
        assert!(resolved.masked);
        assert_eq!(resolution.audit.get("DB_PASSWORD").unwrap().provider.as_deref(), Some("vault"));
    }

    #[tokio::test]
    async fn test_ci_skips_providers() {
        let resolution = resolver()
            .provider(Arc::new(StaticProvider::new("azure").unavailable()))
            .ci(true)
            .resolve()
            .await
            .unwrap();
        assert!(resolution.snapshot.is_empty());
        assert!(resolution.warnings.is_empty());
    }

    #[tokio::test]
    async fn test_failing_provider_aborts() {
        let err = resolver()
            .provider(Arc::new(StaticProvider::new("azure").unavailable()))
            .resolve()
            .await
            .unwrap_err();
        assert!(matches!(err, ResolveError::Collection(CollectionError::Unavailable { .. })));
        assert_eq!(err.exit_code(), 2);
    }

    #[tokio::test]
    async fn test_expansion_can_be_disabled() {
        let env = EnvSnapshot::from_map([("A", "${B}"), ("B", "${A}")]);
        let err = Resolver::new().system_env(env.clone()).resolve().await.unwrap_err();
        assert!(matches!(err, ResolveError::Expansion(ExpansionError::Cycle { .. })));

        let resolution = Resolver::new().system_env(env).expand(false).resolve().await.unwrap();
        assert_eq!(resolution.snapshot.value("A"), Some(&TypedValue::Str("${B}".into())));
    }

    #[tokio::test]
    async fn test_ttl_metadata_feeds_policy() {
        let provider = StaticProvider::new("vault")
            .with_value("DB_PASSWORD", "hunter2-long")
            .with_metadata("DB_PASSWORD", SecretMetadata::with_ttl(7200));
        let err = resolver()
            .provider(Arc::new(provider))
            .policy(Policy::new().ttl("DB_PASSWORD", 3600))
            .resolve()
            .await
            .unwrap_err();
        assert!(matches!(err, ResolveError::Policy(_)));
        assert!(!err.to_string().contains("hunter2"));
    }

    #[tokio::test]
    async fn test_resolve_for_fields() {
        let resolution = Resolver::new()
            .system_env(EnvSnapshot::from_map([("DATABASE_URL", "postgres://db")]))
            .resolve()
            .await
            .unwrap();
        let fields = resolution.resolve_for_fields(&["databaseUrl", "missing"]);
        assert_eq!(fields.len(), 1);
        assert_eq!(fields["databaseUrl"].key, "DATABASE_URL");
    }

    #[tokio::test]
    async fn test_breaker_shared_across_calls() {
        let health = Arc::new(ProviderHealth::new(1, Duration::from_secs(60)));
        let resolver = resolver()
            .provider(Arc::new(StaticProvider::new("vault").unavailable()))
            .failure_policies(FailurePolicies::new(FailurePolicy::Warn))
            .health(Arc::clone(&health));

        let first = resolver.resolve().await.unwrap();
        assert_eq!(first.warnings, vec!["source 'vault' is not available"]);
        let second = resolver.resolve().await.unwrap();
        assert_eq!(
            second.warnings,
            vec!["source 'vault' skipped: circuit open after repeated failures"]
        );
        assert!(!second.metrics.providers[0].ok);
        assert_eq!(health.stats("vault").unwrap().rejected, 1);
    }
}
