//! Remote value providers.
//!
//! A provider is anything that can hand back raw string values by key: a cloud
//! secret store, a JSON dump of one, or an in-memory map. The resolver only
//! sees this trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// What a provider supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    /// `get_many` is a single round trip.
    pub batch: bool,
    /// Values may be kept in a shared cache.
    pub cacheable: bool,
    pub rotatable: bool,
    pub watchable: bool,
    /// `get_metadata` returns real data.
    pub metadata: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            batch: true,
            cacheable: true,
            rotatable: false,
            watchable: false,
            metadata: false,
        }
    }
}

/// Metadata about one secret.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretMetadata {
    /// Time-to-live in seconds.
    #[serde(default)]
    pub ttl: Option<u64>,
    #[serde(default)]
    pub rotatable: bool,
    /// RFC 3339 timestamp of the last rotation.
    #[serde(default)]
    pub last_rotated: Option<String>,
    #[serde(default)]
    pub expires_at: Option<String>,
}

impl SecretMetadata {
    pub fn with_ttl(ttl: u64) -> Self {
        Self {
            ttl: Some(ttl),
            ..Default::default()
        }
    }
}

/// Errors raised by provider implementations.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("provider not available: {0}")]
    NotAvailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid provider data: {0}")]
    Parse(String),

    #[error("provider error: {0}")]
    Other(String),
}

pub type ProviderResult<T> = Result<T, ProviderError>;

/// Source of raw values for the cloud_provider tier.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Identity used for failure-policy lookup and provenance.
    fn name(&self) -> &str;

    fn capabilities(&self) -> Capabilities {
        Capabilities::default()
    }

    async fn is_available(&self) -> bool {
        true
    }

    async fn get(&self, key: &str) -> ProviderResult<Option<String>>;

    /// Fetch several keys. Missing keys are omitted.
    async fn get_many(&self, keys: &[String]) -> ProviderResult<BTreeMap<String, String>> {
        let mut out = BTreeMap::new();
        for key in keys {
            if let Some(value) = self.get(key).await? {
                out.insert(key.clone(), value);
            }
        }
        Ok(out)
    }

    /// Every value the provider holds, or `None` when it cannot enumerate.
    async fn get_all(&self) -> ProviderResult<Option<BTreeMap<String, String>>> {
        Ok(None)
    }

    async fn get_metadata(&self, _key: &str) -> ProviderResult<Option<SecretMetadata>> {
        Ok(None)
    }
}

/// In-memory provider.
#[derive(Debug, Clone, Default)]
pub struct StaticProvider {
    name: String,
    values: BTreeMap<String, String>,
    metadata: BTreeMap<String, SecretMetadata>,
    available: bool,
    enumerable: bool,
    cacheable: bool,
}

impl StaticProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            available: true,
            enumerable: true,
            cacheable: true,
            ..Default::default()
        }
    }

    pub fn with_value(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn with_values<I, K, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.values
            .extend(values.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, metadata: SecretMetadata) -> Self {
        self.metadata.insert(key.into(), metadata);
        self
    }

    /// Make `is_available` return false.
    pub fn unavailable(mut self) -> Self {
        self.available = false;
        self
    }

    /// Make `get_all` return `None`, forcing keyed lookups.
    pub fn keyed_only(mut self) -> Self {
        self.enumerable = false;
        self
    }

    pub fn uncacheable(mut self) -> Self {
        self.cacheable = false;
        self
    }
}

#[async_trait]
impl Provider for StaticProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            cacheable: self.cacheable,
            metadata: !self.metadata.is_empty(),
            ..Default::default()
        }
    }

    async fn is_available(&self) -> bool {
        self.available
    }

    async fn get(&self, key: &str) -> ProviderResult<Option<String>> {
        Ok(self.values.get(key).cloned())
    }

    async fn get_all(&self) -> ProviderResult<Option<BTreeMap<String, String>>> {
        Ok(self.enumerable.then(|| self.values.clone()))
    }

    async fn get_metadata(&self, key: &str) -> ProviderResult<Option<SecretMetadata>> {
        Ok(self.metadata.get(key).cloned())
    }
}

/// Provider backed by a JSON file.
///
/// The file is either a flat object of values, or an object with `values`
/// and optional `metadata` members:
///
/// ```json
/// { "values": { "DB_PASSWORD": "..." }, "metadata": { "DB_PASSWORD": { "ttl": 3600 } } }
/// ```
///
/// Non-string values are stored in their JSON text form. The file is re-read
/// on every fetch.
#[derive(Debug, Clone)]
pub struct JsonFileProvider {
    name: String,
    path: PathBuf,
}

#[derive(Debug, Default)]
struct JsonFileContents {
    values: BTreeMap<String, String>,
    metadata: BTreeMap<String, SecretMetadata>,
}

impl JsonFileProvider {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> ProviderResult<JsonFileContents> {
        let text = tokio::fs::read_to_string(&self.path).await?;
        let root: serde_json::Value =
            serde_json::from_str(&text).map_err(|e| ProviderError::Parse(e.to_string()))?;
        let serde_json::Value::Object(mut object) = root else {
            return Err(ProviderError::Parse("expected a JSON object".to_string()));
        };

        let nested = matches!(object.get("values"), Some(serde_json::Value::Object(_)));
        let (values, metadata) = if nested {
            let values = object.remove("values").unwrap_or_default();
            let metadata = object.remove("metadata").unwrap_or_default();
            (values, metadata)
        } else {
            (serde_json::Value::Object(object), serde_json::Value::Null)
        };

        let values = match values {
            serde_json::Value::Object(map) => map
                .into_iter()
                .map(|(k, v)| {
                    let raw = match v {
                        serde_json::Value::String(s) => s,
                        other => other.to_string(),
                    };
                    (k, raw)
                })
                .collect(),
            _ => BTreeMap::new(),
        };
        let metadata = if metadata.is_null() {
            BTreeMap::new()
        } else {
            serde_json::from_value(metadata).map_err(|e| ProviderError::Parse(e.to_string()))?
        };

        Ok(JsonFileContents { values, metadata })
    }
}

#[async_trait]
impl Provider for JsonFileProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            metadata: true,
            ..Default::default()
        }
    }

    async fn is_available(&self) -> bool {
        tokio::fs::metadata(&self.path)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false)
    }

    async fn get(&self, key: &str) -> ProviderResult<Option<String>> {
        Ok(self.load().await?.values.remove(key))
    }

    async fn get_many(&self, keys: &[String]) -> ProviderResult<BTreeMap<String, String>> {
        let mut values = self.load().await?.values;
        Ok(keys
            .iter()
            .filter_map(|k| values.remove_entry(k))
            .collect())
    }

    async fn get_all(&self) -> ProviderResult<Option<BTreeMap<String, String>>> {
        Ok(Some(self.load().await?.values))
    }

    async fn get_metadata(&self, key: &str) -> ProviderResult<Option<SecretMetadata>> {
        Ok(self.load().await?.metadata.remove(key))
    }
}
