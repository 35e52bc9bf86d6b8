//! Settings structures for a resolution run.

use crate::detect::Platform;
use crate::failure::FailurePolicies;
use crate::metrics::PerformanceSla;
use crate::schema::Schema;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Top-level settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Environment name; selects the env-specific dotenv file.
    #[serde(default)]
    pub env: Option<String>,

    /// Base dotenv file. The env-specific file sits beside it as `{base}.{env}`.
    #[serde(default = "default_base_file")]
    pub base_file: PathBuf,

    /// Env-specific file path; `{base}` and `{env}` are substituted.
    #[serde(default = "default_env_file")]
    pub env_file: String,

    /// Decrypt dotenv files before parsing.
    #[serde(default)]
    pub encryption: Option<EncryptionSettings>,

    /// Mounted secret directories, read in order.
    #[serde(default = "default_secrets_dirs")]
    pub secrets_dirs: Vec<PathBuf>,

    /// Only process variables with this prefix feed the system tier.
    #[serde(default)]
    pub env_prefix: Option<String>,

    /// Expand `${VAR}` placeholders.
    #[serde(default = "default_true")]
    pub expand: bool,

    #[serde(default)]
    pub strict: bool,

    /// Unknown keys fail the run instead of warning.
    #[serde(default)]
    pub strict_fails: bool,

    /// Extra key names to treat as secret.
    #[serde(default)]
    pub secrets: Vec<String>,

    #[serde(default)]
    pub required: Vec<String>,

    #[serde(default)]
    pub deprecated: Vec<String>,

    /// Key to regex; values must match from the start.
    #[serde(default)]
    pub patterns: BTreeMap<String, String>,

    /// Inline field descriptors.
    #[serde(default)]
    pub schema: Schema,

    /// Field descriptors in a separate YAML or JSON file, appended to `schema`.
    #[serde(default)]
    pub schema_file: Option<PathBuf>,

    #[serde(default)]
    pub policy: Option<PathBuf>,

    #[serde(default)]
    pub failure: FailurePolicies,

    #[serde(default)]
    pub cache: CacheSettings,

    /// Limit for the whole resolution call.
    #[serde(default)]
    pub timeout_seconds: Option<u64>,

    /// Skip every remote provider.
    #[serde(default)]
    pub ci: bool,

    /// Turn on `ci` when a CI runner is detected.
    #[serde(default)]
    pub detect_ci: bool,

    #[serde(default)]
    pub circuit_breaker: CircuitBreakerSettings,

    /// Wall-time thresholds; a violation is logged as a warning.
    #[serde(default)]
    pub sla: PerformanceSla,

    #[serde(default)]
    pub providers: Vec<ProviderSettings>,
}

fn default_base_file() -> PathBuf {
    PathBuf::from(".env")
}

fn default_env_file() -> String {
    "{base}.{env}".to_string()
}

fn default_secrets_dirs() -> Vec<PathBuf> {
    vec![PathBuf::from("/run/secrets"), PathBuf::from("/etc/secrets")]
}

fn default_true() -> bool {
    true
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            env: None,
            base_file: default_base_file(),
            env_file: default_env_file(),
            encryption: None,
            secrets_dirs: default_secrets_dirs(),
            env_prefix: None,
            expand: true,
            strict: false,
            strict_fails: false,
            secrets: Vec::new(),
            required: Vec::new(),
            deprecated: Vec::new(),
            patterns: BTreeMap::new(),
            schema: Schema::default(),
            schema_file: None,
            policy: None,
            failure: FailurePolicies::default(),
            cache: CacheSettings::default(),
            timeout_seconds: None,
            ci: false,
            detect_ci: false,
            circuit_breaker: CircuitBreakerSettings::default(),
            sla: PerformanceSla::default(),
            providers: Vec::new(),
        }
    }
}

impl Settings {
    /// Load settings from a single YAML file, on top of the defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file {}", path.display()))?;
        let overlay: serde_json::Value = serde_yaml::from_str(&content)
            .with_context(|| format!("Invalid settings file {}", path.display()))?;
        let merged = super::merge::deep_merge(serde_json::to_value(Self::default())?, overlay);
        Ok(serde_json::from_value(merged)?)
    }

    /// The full schema: inline fields followed by those in `schema_file`.
    pub fn load_schema(&self) -> Result<Schema> {
        let mut schema = self.schema.clone();
        if let Some(path) = &self.schema_file {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read schema file {}", path.display()))?;
            let extra: Schema = serde_yaml::from_str(&content)
                .with_context(|| format!("Invalid schema file {}", path.display()))?;
            schema.fields.extend(extra.fields);
        }
        Ok(schema)
    }
}

/// Which external tool decrypts dotenv files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptionSettings {
    /// `age` or `gpg`.
    pub tool: String,

    /// Identity file (age) or passphrase (gpg).
    #[serde(default)]
    pub key: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_cache_ttl")]
    pub ttl_seconds: u64,
}

fn default_cache_ttl() -> u64 {
    300
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_seconds: default_cache_ttl(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerSettings {
    pub enabled: bool,
    /// Consecutive failures before a provider is skipped.
    pub failure_threshold: u32,
    pub open_seconds: u64,
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            failure_threshold: 5,
            open_seconds: 60,
        }
    }
}

/// A JSON-file backed provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderSettings {
    pub name: String,
    pub path: PathBuf,
    /// Only register the provider when this platform is detected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when: Option<Platform>,
}
