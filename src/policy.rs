//! Policy-as-code: organisational rules applied after validation.

use crate::error::PolicyError;
use crate::snapshot::ConfigSnapshot;
use crate::sources::SecretMetadata;
use crate::types::SourceId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::debug;

/// Required, forbidden, source-pinned and TTL-bounded keys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Policy {
    pub require: BTreeSet<String>,
    pub forbid: BTreeSet<String>,
    /// Keys that must resolve from a specific tier.
    pub sources: BTreeMap<String, SourceId>,
    /// Maximum secret TTL in seconds, checked against provider metadata.
    pub ttl: BTreeMap<String, u64>,
}

impl Policy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn require(mut self, key: impl Into<String>) -> Self {
        self.require.insert(key.into());
        self
    }

    pub fn forbid(mut self, key: impl Into<String>) -> Self {
        self.forbid.insert(key.into());
        self
    }

    pub fn source(mut self, key: impl Into<String>, source: SourceId) -> Self {
        self.sources.insert(key.into(), source);
        self
    }

    pub fn ttl(mut self, key: impl Into<String>, seconds: u64) -> Self {
        self.ttl.insert(key.into(), seconds);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.require.is_empty()
            && self.forbid.is_empty()
            && self.sources.is_empty()
            && self.ttl.is_empty()
    }

    /// Load a policy from a YAML (`.yaml`/`.yml`) or JSON file.
    pub fn from_file(path: &Path) -> Result<Self, PolicyError> {
        let load_err = |reason: String| PolicyError::Load {
            path: path.display().to_string(),
            reason,
        };
        let content = std::fs::read_to_string(path).map_err(|e| load_err(e.to_string()))?;
        let is_yaml = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("yaml") || e.eq_ignore_ascii_case("yml"))
            .unwrap_or(false);

        let policy = if is_yaml {
            serde_yaml::from_str(&content).map_err(|e| load_err(e.to_string()))?
        } else {
            serde_json::from_str(&content).map_err(|e| load_err(e.to_string()))?
        };
        Ok(policy)
    }

    pub fn from_value(value: serde_json::Value) -> Result<Self, PolicyError> {
        serde_json::from_value(value).map_err(|e| PolicyError::Load {
            path: "<inline>".to_string(),
            reason: e.to_string(),
        })
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Keys this policy expects a provider to be asked for.
    pub fn referenced_keys(&self) -> BTreeSet<String> {
        self.require
            .iter()
            .chain(self.sources.keys())
            .chain(self.ttl.keys())
            .cloned()
            .collect()
    }

    /// Check the snapshot against every rule, collecting all violations.
    ///
    /// `metadata` holds provider metadata for keys named in the TTL table;
    /// a key without metadata skips its TTL check.
    pub fn check(
        &self,
        snapshot: &ConfigSnapshot,
        metadata: &BTreeMap<String, SecretMetadata>,
    ) -> Result<(), PolicyError> {
        let mut violations = Vec::new();

        let missing: Vec<&str> = self
            .require
            .iter()
            .filter(|k| !snapshot.contains(k))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            violations.push(format!("Missing required variables: {}", missing.join(", ")));
        }

        let present: Vec<&str> = self
            .forbid
            .iter()
            .filter(|k| snapshot.contains(k))
            .map(String::as_str)
            .collect();
        if !present.is_empty() {
            violations.push(format!("Forbidden variables present: {}", present.join(", ")));
        }

        for (key, required) in &self.sources {
            if let Some(resolved) = snapshot.get(key) {
                if resolved.origin.source != *required {
                    violations.push(format!(
                        "Variable '{}' must come from '{}', but came from '{}'",
                        key, required, resolved.origin.source
                    ));
                }
            }
        }

        for (key, max_ttl) in &self.ttl {
            if !snapshot.contains(key) {
                continue;
            }
            match metadata.get(key).and_then(|m| m.ttl) {
                Some(ttl) if ttl > *max_ttl => violations.push(format!(
                    "Variable '{}' has TTL {}s, exceeding the allowed {}s",
                    key, ttl, max_ttl
                )),
                Some(_) => {}
                None => debug!(key = %key, "No TTL metadata available, skipping TTL check"),
            }
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(PolicyError::Violations { violations })
        }
    }
}
