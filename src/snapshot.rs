//! Resolved configuration snapshot and its safe views.

use crate::error::{ResolveError, Result};
use crate::format::OutputFormat;
use crate::mask::SecretClassifier;
use crate::types::{Origin, TypedValue, ValueType};
use chrono::{DateTime, Utc};
use heck::ToShoutySnakeCase;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// The final value of one key.
#[derive(Clone, PartialEq)]
pub struct ResolvedValue {
    pub key: String,
    pub value: TypedValue,
    pub origin: Origin,
    /// Whether the key is classified secret and masked in every derived view.
    pub masked: bool,
    /// Lower-priority origins that also defined the key, lowest first.
    pub shadowed: Vec<Origin>,
}

impl fmt::Debug for ResolvedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("ResolvedValue");
        s.field("key", &self.key);
        if self.masked {
            s.field("value", &"<masked>");
        } else {
            s.field("value", &self.value);
        }
        s.field("origin", &self.origin)
            .field("masked", &self.masked)
            .field("shadowed", &self.shadowed)
            .finish()
    }
}

/// Immutable, key-ordered result of one resolution.
#[derive(Debug, Clone)]
pub struct ConfigSnapshot {
    values: BTreeMap<String, ResolvedValue>,
    declared_types: BTreeMap<String, ValueType>,
    classifier: SecretClassifier,
    resolved_at: DateTime<Utc>,
}

/// Provenance report for one key.
#[derive(Debug, Clone, Serialize)]
pub struct Explanation {
    pub key: String,
    pub value: TypedValue,
    pub origin: Origin,
    pub shadowed: Vec<Origin>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub declared_type: Option<ValueType>,
    pub secret: bool,
}

impl fmt::Display for Explanation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.key)?;
        writeln!(f, "  value:  {}", self.value)?;
        writeln!(f, "  source: {}", self.origin)?;
        if let Some(ty) = self.declared_type {
            writeln!(f, "  type:   {}", ty)?;
        }
        writeln!(f, "  secret: {}", if self.secret { "yes (masked)" } else { "no" })?;
        if !self.shadowed.is_empty() {
            writeln!(f, "  overrides:")?;
            for origin in self.shadowed.iter().rev() {
                writeln!(f, "    - {}", origin)?;
            }
        }
        Ok(())
    }
}

impl ConfigSnapshot {
    pub(crate) fn new(
        values: BTreeMap<String, ResolvedValue>,
        declared_types: BTreeMap<String, ValueType>,
        classifier: SecretClassifier,
        resolved_at: DateTime<Utc>,
    ) -> Self {
        Self {
            values,
            declared_types,
            classifier,
            resolved_at,
        }
    }

    pub fn get(&self, key: &str) -> Option<&ResolvedValue> {
        self.values.get(key)
    }

    /// Typed value of a key, unmasked.
    pub fn value(&self, key: &str) -> Option<&TypedValue> {
        self.values.get(key).map(|v| &v.value)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResolvedValue> {
        self.values.values()
    }

    pub fn resolved_at(&self) -> DateTime<Utc> {
        self.resolved_at
    }

    pub fn classifier(&self) -> &SecretClassifier {
        &self.classifier
    }

    pub fn declared_type(&self, key: &str) -> Option<ValueType> {
        self.declared_types.get(key).copied()
    }

    /// Key to typed value map, unmasked. Used for drift comparison.
    pub fn to_values(&self) -> BTreeMap<String, TypedValue> {
        self.values
            .iter()
            .map(|(k, v)| (k.clone(), v.value.clone()))
            .collect()
    }

    /// Every secret value replaced by its masked form.
    pub fn safe_view(&self) -> BTreeMap<String, TypedValue> {
        self.values
            .iter()
            .map(|(k, v)| {
                let shown = if v.masked {
                    TypedValue::Str(crate::mask::mask_value(&v.value.to_raw_string()))
                } else {
                    v.value.clone()
                };
                (k.clone(), shown)
            })
            .collect()
    }

    /// Serialize the snapshot. The masked view is used unless `unmask` is set.
    pub fn export(&self, format: OutputFormat, unmask: bool) -> Result<String> {
        let view = if unmask {
            self.to_values()
        } else {
            self.safe_view()
        };
        match format {
            OutputFormat::Json => serde_json::to_string_pretty(&view)
                .map_err(|e| ResolveError::config(format!("JSON export failed: {}", e))),
            OutputFormat::Yaml => serde_yaml::to_string(&view)
                .map_err(|e| ResolveError::config(format!("YAML export failed: {}", e))),
            OutputFormat::Pretty => Ok(crate::format::format_snapshot_pretty(self, unmask)),
        }
    }

    /// Explain where a key's value came from.
    pub fn explain(&self, key: &str) -> Option<Explanation> {
        let resolved = self.values.get(key)?;
        Some(Explanation {
            key: resolved.key.clone(),
            value: self.classifier.safe_value(key, &resolved.value),
            origin: resolved.origin.clone(),
            shadowed: resolved.shadowed.clone(),
            declared_type: self.declared_type(key),
            secret: resolved.masked,
        })
    }

    /// Look up resolved values for schema field names.
    ///
    /// Field names match keys case-insensitively: first exactly, then by their
    /// SHOUTY_SNAKE_CASE form, then by a case-insensitive scan. Fields with no
    /// matching key are left out.
    pub fn resolve_for_fields(&self, field_names: &[&str]) -> BTreeMap<String, ResolvedValue> {
        let mut out = BTreeMap::new();
        for &name in field_names {
            let found = self
                .values
                .get(name)
                .or_else(|| self.values.get(&name.to_shouty_snake_case()))
                .or_else(|| {
                    self.values
                        .iter()
                        .find(|(k, _)| k.eq_ignore_ascii_case(name))
                        .map(|(_, v)| v)
                });
            if let Some(resolved) = found {
                out.insert(name.to_string(), resolved.clone());
            }
        }
        out
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::types::SourceId;

    pub(crate) fn sample() -> ConfigSnapshot {
        let classifier = SecretClassifier::new();
        let mut values = BTreeMap::new();
        for (key, value, source) in [
            ("PORT", TypedValue::Int(9000), SourceId::EnvSpecificFile),
            ("API_KEY", TypedValue::Str("sk-live-abcdef9876".into()), SourceId::System),
            ("DATABASE_URL", TypedValue::Str("postgres://db".into()), SourceId::BaseFile),
        ] {
            values.insert(
                key.to_string(),
                ResolvedValue {
                    key: key.to_string(),
                    masked: classifier.is_secret(key),
                    value,
                    origin: Origin::new(source),
                    shadowed: if key == "PORT" {
                        vec![Origin::new(SourceId::BaseFile)]
                    } else {
                        vec![]
                    },
                },
            );
        }
        ConfigSnapshot::new(
            values,
            BTreeMap::from([("PORT".to_string(), ValueType::Int)]),
            classifier,
            Utc::now(),
        )
    }

    #[test]
    fn test_safe_view_masks_secrets_only() {
        let view = sample().safe_view();
        assert_eq!(view["API_KEY"], TypedValue::Str("****9876".into()));
        assert_eq!(view["PORT"], TypedValue::Int(9000));
        assert_eq!(view["DATABASE_URL"], TypedValue::Str("postgres://db".into()));
    }

    #[test]
    fn test_export_is_masked_by_default() {
        let snapshot = sample();
        let json = snapshot.export(OutputFormat::Json, false).unwrap();
        assert!(!json.contains("sk-live-abcdef9876"));
        assert!(json.contains("\"PORT\": 9000"));

        let yaml = snapshot.export(OutputFormat::Yaml, false).unwrap();
        assert!(!yaml.contains("sk-live-abcdef9876"));

        let unmasked = snapshot.export(OutputFormat::Json, true).unwrap();
        assert!(unmasked.contains("sk-live-abcdef9876"));
    }

    #[test]
    fn test_debug_does_not_print_secret() {
        let snapshot = sample();
        let debug = format!("{:?}", snapshot.get("API_KEY").unwrap());
        assert!(!debug.contains("sk-live-abcdef9876"));
    }

    #[test]
    fn test_explain() {
        let explanation = sample().explain("PORT").unwrap();
        assert_eq!(explanation.origin.source, SourceId::EnvSpecificFile);
        assert_eq!(explanation.shadowed, vec![Origin::new(SourceId::BaseFile)]);
        assert_eq!(explanation.declared_type, Some(ValueType::Int));
        assert!(!explanation.secret);

        let secret = sample().explain("API_KEY").unwrap();
        assert!(secret.secret);
        assert!(!secret.to_string().contains("sk-live"));
    }

    #[test]
    fn test_resolve_for_fields_case_insensitive() {
        let fields = sample().resolve_for_fields(&["port", "database_url", "databaseUrl", "missing"]);
        assert_eq!(fields["port"].value, TypedValue::Int(9000));
        assert_eq!(fields["database_url"].key, "DATABASE_URL");
        assert_eq!(fields["databaseUrl"].key, "DATABASE_URL");
        assert!(!fields.contains_key("missing"));
    }
}
