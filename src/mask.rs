//! Secret classification and masking.
//!
//! Classification depends on the key name alone plus an explicit registry of
//! custom secret names, so the same key is always treated the same way.

use crate::types::TypedValue;
use std::collections::BTreeSet;

/// Name fragments that mark a key as secret (case-insensitive substring).
pub const SECRET_MARKERS: &[&str] = &[
    "secret",
    "key",
    "token",
    "password",
    "pwd",
    "credential",
    "auth",
];

/// Replacement for short values and prefix for long ones.
pub const MASK: &str = "****";

/// Number of trailing characters left visible on long values.
pub const VISIBLE_SUFFIX: usize = 4;

/// Decides which keys are secrets.
#[derive(Debug, Clone, Default)]
pub struct SecretClassifier {
    custom: BTreeSet<String>,
}

impl SecretClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register additional secret key names (matched case-insensitively).
    pub fn with_custom<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.custom
            .extend(keys.into_iter().map(|k| k.as_ref().to_lowercase()));
        self
    }

    pub fn custom_secrets(&self) -> impl Iterator<Item = &str> {
        self.custom.iter().map(String::as_str)
    }

    pub fn is_secret(&self, key: &str) -> bool {
        let lower = key.to_lowercase();
        self.custom.contains(&lower)
            || SECRET_MARKERS.iter().any(|m| lower.contains(m))
    }

    /// Masked form of `value` when `key` is secret, otherwise the value itself.
    pub fn safe_value(&self, key: &str, value: &TypedValue) -> TypedValue {
        if self.is_secret(key) {
            TypedValue::Str(mask_value(&value.to_raw_string()))
        } else {
            value.clone()
        }
    }

    /// String preview of a value for messages, masked when the key is secret.
    pub fn preview(&self, key: &str, raw: &str) -> String {
        if self.is_secret(key) {
            mask_value(raw)
        } else {
            raw.to_string()
        }
    }
}

/// Mask a secret value.
///
/// Values of four characters or fewer become [`MASK`]; longer values keep
/// their last four characters behind a fixed-width prefix, so the mask does
/// not reveal the value's length.
pub fn mask_value(value: &str) -> String {
    let count = value.chars().count();
    if count <= VISIBLE_SUFFIX {
        return MASK.to_string();
    }
    let suffix: String = value.chars().skip(count - VISIBLE_SUFFIX).collect();
    format!("{}{}", MASK, suffix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_markers() {
        let classifier = SecretClassifier::new();
        for key in [
            "API_KEY",
            "DB_PASSWORD",
            "github_token",
            "CLIENT_SECRET",
            "MYSQL_PWD",
            "AWS_CREDENTIALS",
            "OAUTH_URL",
            "stripe-apikey",
        ] {
            assert!(classifier.is_secret(key), "{} should be secret", key);
        }
        for key in ["PORT", "DEBUG", "DATABASE_HOST", "LOG_LEVEL"] {
            assert!(!classifier.is_secret(key), "{} should not be secret", key);
        }
    }

    #[test]
    fn test_custom_registry() {
        let classifier = SecretClassifier::new().with_custom(["database_url"]);
        assert!(classifier.is_secret("DATABASE_URL"));
        assert!(!classifier.is_secret("DATABASE_HOST"));
    }

    #[test]
    fn test_mask_short_values_fully() {
        assert_eq!(mask_value("1234"), "****");
        assert_eq!(mask_value("ab"), "****");
        assert_eq!(mask_value(""), "****");
    }

    #[test]
    fn test_mask_long_values_keep_suffix() {
        let masked = mask_value("secret12345");
        assert!(masked.ends_with("2345"));
        assert!(masked.starts_with(MASK));
        assert!(!masked.contains("secret"));
    }

    #[test]
    fn test_mask_multibyte() {
        assert_eq!(mask_value("pässwörd"), "****wörd");
    }

    #[test]
    fn test_safe_value_passes_non_secrets() {
        let classifier = SecretClassifier::new();
        assert_eq!(
            classifier.safe_value("PORT", &TypedValue::Int(8080)),
            TypedValue::Int(8080)
        );
        assert_eq!(
            classifier.safe_value("API_KEY", &TypedValue::Str("sk-abcdef123".into())),
            TypedValue::Str("****f123".into())
        );
    }
}
