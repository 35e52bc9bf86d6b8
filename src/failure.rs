//! Per-source failure policies.
//!
//! Every collection attempt is passed through [`FailurePolicies::apply`]:
//! `fail` aborts the resolution, `warn` records a warning and continues with
//! an empty contribution, `fallback` continues silently.

use crate::error::CollectionError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};

/// What to do when a source cannot be collected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    Fail,
    #[default]
    Warn,
    Fallback,
}

impl FailurePolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            FailurePolicy::Fail => "fail",
            FailurePolicy::Warn => "warn",
            FailurePolicy::Fallback => "fallback",
        }
    }
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fail" => Ok(FailurePolicy::Fail),
            "warn" => Ok(FailurePolicy::Warn),
            "fallback" => Ok(FailurePolicy::Fallback),
            _ => Err(format!("Unknown failure policy '{}'", s)),
        }
    }
}

/// Policy table keyed by source or provider name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailurePolicies {
    #[serde(default)]
    pub table: BTreeMap<String, FailurePolicy>,
    #[serde(default)]
    pub default: FailurePolicy,
}

impl Default for FailurePolicies {
    fn default() -> Self {
        Self::default_table()
    }
}

impl FailurePolicies {
    /// An empty table; every source gets `default`.
    pub fn new(default: FailurePolicy) -> Self {
        Self {
            table: BTreeMap::new(),
            default,
        }
    }

    /// The built-in table for common sources.
    pub fn default_table() -> Self {
        Self::new(FailurePolicy::Warn)
            .with("azure", FailurePolicy::Fail)
            .with("aws", FailurePolicy::Fallback)
            .with("filesystem", FailurePolicy::Warn)
            .with("docker", FailurePolicy::Warn)
            .with("kubernetes", FailurePolicy::Warn)
    }

    pub fn with(mut self, name: impl Into<String>, policy: FailurePolicy) -> Self {
        self.table.insert(name.into().to_lowercase(), policy);
        self
    }

    /// Look up the policy for a source.
    ///
    /// Exact name first, then a substring match in either direction (so
    /// `azure-keyvault` finds `azure`), then the default.
    pub fn policy_for(&self, name: &str) -> FailurePolicy {
        let lower = name.to_lowercase();
        if let Some(policy) = self.table.get(&lower) {
            return *policy;
        }
        self.table
            .iter()
            .find(|(key, _)| {
                let key = key.to_lowercase();
                lower.contains(&key) || key.contains(&lower)
            })
            .map(|(_, policy)| *policy)
            .unwrap_or(self.default)
    }

    /// Interpret one collection result.
    ///
    /// Returns `Ok(None)` when the failure was absorbed; a warning is pushed
    /// for `warn`. Only `fail` hands the error back.
    pub fn apply<T>(
        &self,
        result: Result<T, CollectionError>,
        warnings: &mut Vec<String>,
    ) -> Result<Option<T>, CollectionError> {
        let err = match result {
            Ok(value) => return Ok(Some(value)),
            Err(err) => err,
        };
        let name = err.source_name().to_string();
        match self.policy_for(&name) {
            FailurePolicy::Fail => Err(err),
            FailurePolicy::Warn => {
                warn!(source = %name, error = %err, "Source failed, continuing without it");
                warnings.push(err.to_string());
                Ok(None)
            }
            FailurePolicy::Fallback => {
                debug!(source = %name, error = %err, "Source failed, falling back");
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fetch_error(name: &str) -> CollectionError {
        CollectionError::Fetch {
            name: name.to_string(),
            reason: "timeout".to_string(),
        }
    }

    #[test]
    fn test_default_table_lookup() {
        let policies = FailurePolicies::default_table();
        assert_eq!(policies.policy_for("azure"), FailurePolicy::Fail);
        assert_eq!(policies.policy_for("AzureKeyVaultProvider"), FailurePolicy::Fail);
        assert_eq!(policies.policy_for("aws-secrets-manager"), FailurePolicy::Fallback);
        assert_eq!(policies.policy_for("docker"), FailurePolicy::Warn);
        assert_eq!(policies.policy_for("vault"), FailurePolicy::Warn);
    }

    #[test]
    fn test_reverse_substring_match() {
        let policies = FailurePolicies::new(FailurePolicy::Fallback)
            .with("gcp-secret-manager", FailurePolicy::Fail);
        assert_eq!(policies.policy_for("gcp"), FailurePolicy::Fail);
        assert_eq!(policies.policy_for("other"), FailurePolicy::Fallback);
    }

    #[test]
    fn test_apply_fail_returns_error() {
        let policies = FailurePolicies::default_table();
        let mut warnings = Vec::new();
        let result: Result<Option<()>, _> = policies.apply(Err(fetch_error("azure")), &mut warnings);
        assert_eq!(result, Err(fetch_error("azure")));
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_apply_warn_records_warning() {
        let policies = FailurePolicies::default_table();
        let mut warnings = Vec::new();
        let result: Result<Option<()>, _> = policies.apply(Err(fetch_error("vault")), &mut warnings);
        assert_eq!(result, Ok(None));
        assert_eq!(warnings, vec!["source 'vault' failed: timeout"]);
    }

    #[test]
    fn test_apply_fallback_is_silent() {
        let policies = FailurePolicies::default_table();
        let mut warnings = Vec::new();
        let result: Result<Option<()>, _> = policies.apply(Err(fetch_error("aws")), &mut warnings);
        assert_eq!(result, Ok(None));
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_apply_success_passes_through() {
        let mut warnings = Vec::new();
        let result = FailurePolicies::default_table().apply(Ok(7), &mut warnings);
        assert_eq!(result, Ok(Some(7)));
    }

    #[test]
    fn test_parse_policy() {
        assert_eq!("FAIL".parse::<FailurePolicy>(), Ok(FailurePolicy::Fail));
        assert!("explode".parse::<FailurePolicy>().is_err());
    }
}
