//! Drift detection between a resolved configuration and a baseline.
//!
//! The diff itself never fails on secret changes; [`DiffPolicy`] decides
//! afterwards whether a given drift is acceptable.

use crate::error::DiffError;
use crate::mask::{MASK, SecretClassifier, mask_value};
use crate::types::TypedValue;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

/// A value as shown in a diff. Secret values are never carried.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffValue {
    Value(TypedValue),
    Redacted,
}

impl fmt::Display for DiffValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiffValue::Value(v) => write!(f, "{}", v),
            DiffValue::Redacted => f.write_str("<redacted>"),
        }
    }
}

/// Old and new value of a changed key.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValueChange {
    pub old: DiffValue,
    pub new: DiffValue,
}

/// Change flags for one secret key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SecretChange {
    pub added: bool,
    pub removed: bool,
    pub changed: bool,
}

/// Difference between a current configuration and a baseline.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DiffResult {
    /// Keys only in the current configuration.
    pub added: BTreeMap<String, DiffValue>,
    /// Keys only in the baseline.
    pub removed: BTreeMap<String, DiffValue>,
    /// Keys in both whose values differ.
    pub changed: BTreeMap<String, ValueChange>,
    /// Flags for every secret key that appears above.
    pub secrets: BTreeMap<String, SecretChange>,
}

impl DiffResult {
    pub fn has_changes(&self) -> bool {
        !self.added.is_empty() || !self.removed.is_empty() || !self.changed.is_empty()
    }

    pub fn total_changes(&self) -> usize {
        self.added.len() + self.removed.len() + self.changed.len()
    }

    pub fn added_secrets(&self) -> Vec<String> {
        self.secret_keys(|c| c.added)
    }

    pub fn removed_secrets(&self) -> Vec<String> {
        self.secret_keys(|c| c.removed)
    }

    pub fn changed_secrets(&self) -> Vec<String> {
        self.secret_keys(|c| c.changed)
    }

    fn secret_keys(&self, pick: impl Fn(&SecretChange) -> bool) -> Vec<String> {
        self.secrets
            .iter()
            .filter(|(_, c)| pick(c))
            .map(|(k, _)| k.clone())
            .collect()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl fmt::Display for DiffResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.has_changes() {
            writeln!(f, "No differences found.")?;
            return Ok(());
        }

        if !self.added.is_empty() {
            writeln!(f, "Added ({}):", self.added.len())?;
            for (key, value) in &self.added {
                writeln!(f, "  + {} = {}", key, value)?;
            }
        }
        if !self.removed.is_empty() {
            writeln!(f, "Removed ({}):", self.removed.len())?;
            for (key, value) in &self.removed {
                writeln!(f, "  - {} = {}", key, value)?;
            }
        }
        if !self.changed.is_empty() {
            writeln!(f, "Changed ({}):", self.changed.len())?;
            for (key, change) in &self.changed {
                writeln!(f, "  ~ {}: {} -> {}", key, change.old, change.new)?;
            }
        }

        writeln!(f)?;
        writeln!(f, "Summary: {} total changes", self.total_changes())?;
        let secret_count = self.secrets.len();
        if secret_count > 0 {
            writeln!(f, "Secrets affected: {}", secret_count)?;
        }
        Ok(())
    }
}

/// Compare `current` against `baseline`.
///
/// A secret whose baseline value is already masked (exported from a safe
/// view) is compared by masked form on both sides.
pub fn diff(
    current: &BTreeMap<String, TypedValue>,
    baseline: &BTreeMap<String, TypedValue>,
    classifier: &SecretClassifier,
) -> DiffResult {
    let mut result = DiffResult::default();
    let shown = |key: &str, value: &TypedValue| {
        if classifier.is_secret(key) {
            DiffValue::Redacted
        } else {
            DiffValue::Value(value.clone())
        }
    };

    for (key, value) in current {
        match baseline.get(key) {
            None => {
                result.added.insert(key.clone(), shown(key, value));
                if classifier.is_secret(key) {
                    result.secrets.entry(key.clone()).or_default().added = true;
                }
            }
            Some(old) => {
                let secret = classifier.is_secret(key);
                let equal = if secret && is_masked(old) {
                    mask_value(&value.to_raw_string()) == old.to_raw_string()
                } else {
                    value.structurally_equal(old)
                };
                if !equal {
                    result.changed.insert(
                        key.clone(),
                        ValueChange {
                            old: shown(key, old),
                            new: shown(key, value),
                        },
                    );
                    if secret {
                        result.secrets.entry(key.clone()).or_default().changed = true;
                    }
                }
            }
        }
    }

    for (key, value) in baseline {
        if !current.contains_key(key) {
            result.removed.insert(key.clone(), shown(key, value));
            if classifier.is_secret(key) {
                result.secrets.entry(key.clone()).or_default().removed = true;
            }
        }
    }

    result
}

fn is_masked(value: &TypedValue) -> bool {
    value.as_str().is_some_and(|s| s.starts_with(MASK))
}

/// Which secret drifts are treated as failures.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiffPolicy {
    /// Fail when any secret was added, removed or changed.
    pub deny_secret_changes: bool,
    /// Fail when a new secret appeared.
    pub deny_added_secrets: bool,
}

impl DiffPolicy {
    pub fn enforce(&self, result: &DiffResult) -> Result<(), DiffError> {
        if self.deny_secret_changes && !result.secrets.is_empty() {
            return Err(DiffError::SecretChanges {
                keys: result.secrets.keys().cloned().collect(),
            });
        }
        if self.deny_added_secrets {
            let added = result.added_secrets();
            if !added.is_empty() {
                return Err(DiffError::AddedSecrets { keys: added });
            }
        }
        Ok(())
    }
}

/// Read a baseline written by `export`: a JSON or YAML object of key to value.
pub fn load_baseline(path: &Path) -> Result<BTreeMap<String, TypedValue>, DiffError> {
    let baseline_err = |reason: String| DiffError::Baseline {
        path: path.display().to_string(),
        reason,
    };
    let content = std::fs::read_to_string(path).map_err(|e| baseline_err(e.to_string()))?;
    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));

    if is_json {
        serde_json::from_str(&content).map_err(|e| baseline_err(e.to_string()))
    } else {
        serde_yaml::from_str(&content).map_err(|e| baseline_err(e.to_string()))
    }
}
