//! Multi-stage validation of a resolved snapshot.
//!
//! Stages run in a fixed order: required, strict, deprecated, rule, pattern,
//! policy. Each stage gathers every violation before failing, so one error
//! names all offending keys of that stage.

use crate::error::{ResolveError, Result, ValidationError};
use crate::policy::Policy;
use crate::schema::Schema;
use crate::snapshot::ConfigSnapshot;
use crate::sources::SecretMetadata;
use crate::types::TypedValue;
use regex_lite::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use tracing::warn;

type Predicate = dyn Fn(&TypedValue) -> std::result::Result<bool, String> + Send + Sync;

/// Per-key predicate over a typed value.
#[derive(Clone)]
pub struct Rule {
    predicate: Arc<Predicate>,
}

impl Rule {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&TypedValue) -> bool + Send + Sync + 'static,
    {
        Self {
            predicate: Arc::new(move |v| Ok(f(v))),
        }
    }

    /// A predicate that can fail. Its error is reported as a rule violation.
    pub fn fallible<F, E>(f: F) -> Self
    where
        F: Fn(&TypedValue) -> std::result::Result<bool, E> + Send + Sync + 'static,
        E: fmt::Display,
    {
        Self {
            predicate: Arc::new(move |v| f(v).map_err(|e| e.to_string())),
        }
    }

    pub fn check(&self, value: &TypedValue) -> std::result::Result<bool, String> {
        (self.predicate)(value)
    }
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Rule(..)")
    }
}

/// Everything the validator checks beyond the schema.
#[derive(Debug, Clone, Default)]
pub struct ValidationRules {
    /// Keys required in addition to the schema's required fields.
    pub required: BTreeSet<String>,
    /// Report keys the schema does not know about.
    pub strict: bool,
    /// Turn the strict warning into an error.
    pub strict_fails: bool,
    pub deprecated: BTreeSet<String>,
    pub rules: BTreeMap<String, Rule>,
    /// Regex per key, matched from the start of the value.
    pub patterns: BTreeMap<String, String>,
}

impl ValidationRules {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn require(mut self, key: impl Into<String>) -> Self {
        self.required.insert(key.into());
        self
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn deprecate(mut self, key: impl Into<String>) -> Self {
        self.deprecated.insert(key.into());
        self
    }

    pub fn rule(mut self, key: impl Into<String>, rule: Rule) -> Self {
        self.rules.insert(key.into(), rule);
        self
    }

    pub fn pattern(mut self, key: impl Into<String>, pattern: impl Into<String>) -> Self {
        self.patterns.insert(key.into(), pattern.into());
        self
    }

    /// Compile every pattern, anchored at the start of the value.
    fn compiled_patterns(&self) -> Result<Vec<(&str, Regex)>> {
        self.patterns
            .iter()
            .map(|(key, pattern)| {
                Regex::new(&format!("^(?:{})", pattern))
                    .map(|re| (key.as_str(), re))
                    .map_err(|e| {
                        ResolveError::config(format!("invalid pattern for {}: {}", key, e))
                    })
            })
            .collect()
    }

    /// Run every stage. Returns the warnings produced along the way.
    pub fn validate(
        &self,
        snapshot: &ConfigSnapshot,
        schema: &Schema,
        policy: Option<&Policy>,
        metadata: &BTreeMap<String, SecretMetadata>,
    ) -> Result<Vec<String>> {
        let classifier = snapshot.classifier();
        let mut warnings = Vec::new();

        // Required
        let required: BTreeSet<String> = schema
            .required_keys()
            .into_iter()
            .chain(self.required.iter().cloned())
            .collect();
        let missing: Vec<String> = required
            .into_iter()
            .filter(|k| snapshot.value(k).is_none_or(TypedValue::is_empty_value))
            .collect();
        if !missing.is_empty() {
            return Err(ValidationError::MissingRequired { keys: missing }.into());
        }

        // Strict
        if self.strict {
            let known: BTreeSet<String> = schema
                .known_keys()
                .into_iter()
                .chain(self.required.iter().cloned())
                .collect();
            let unknown: Vec<String> = snapshot
                .keys()
                .filter(|k| !known.contains(*k))
                .map(str::to_string)
                .collect();
            if !unknown.is_empty() {
                if self.strict_fails {
                    return Err(ValidationError::UnknownKeys { keys: unknown }.into());
                }
                let message = format!("Unknown variables found: {}", unknown.join(", "));
                warn!(count = unknown.len(), "{}", message);
                warnings.push(message);
            }
        }

        // Deprecated
        for key in &self.deprecated {
            if snapshot.contains(key) {
                let message = format!("Deprecated variable in use: {}", key);
                warn!(key = %key, "Deprecated variable in use");
                warnings.push(message);
            }
        }

        // Rule
        let mut violations = Vec::new();
        for (key, rule) in &self.rules {
            let Some(value) = snapshot.value(key) else {
                continue;
            };
            let shown = classifier.preview(key, &value.to_raw_string());
            match rule.check(value) {
                Ok(true) => {}
                Ok(false) => violations.push(format!("{}='{}' failed validation", key, shown)),
                // The predicate's own message may quote a secret value.
                Err(_) if classifier.is_secret(key) => {
                    violations.push(format!("{}='{}' raised an error in validation", key, shown))
                }
                Err(reason) => violations.push(format!(
                    "{}='{}' raised an error in validation: {}",
                    key, shown, reason
                )),
            }
        }
        if !violations.is_empty() {
            return Err(ValidationError::Rule { violations }.into());
        }

        // Pattern
        for (key, re) in self.compiled_patterns()? {
            let Some(value) = snapshot.value(key) else {
                continue;
            };
            if value.is_empty_value() {
                continue;
            }
            let raw = value.to_raw_string();
            if !re.is_match(&raw) {
                violations.push(format!(
                    "{}='{}' does not match pattern '{}'",
                    key,
                    classifier.preview(key, &raw),
                    self.patterns[key]
                ));
            }
        }
        if !violations.is_empty() {
            return Err(ValidationError::Pattern { violations }.into());
        }

        // Policy
        if let Some(policy) = policy {
            policy.check(snapshot, metadata)?;
        }

        Ok(warnings)
    }
}
