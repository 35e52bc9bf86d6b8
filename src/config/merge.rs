//! Field-by-field merging of settings layers.
//!
//! A higher tier overrides only the fields it names. Lists replace, they are
//! never concatenated.

use serde_json::Value;

/// Merge `overlay` onto `base`.
///
/// - Objects merge recursively, overlay keys winning
/// - A `null` overlay keeps the base value (the field was not specified)
/// - Anything else in the overlay replaces the base outright
///
/// # Example
/// ```
/// use serde_json::json;
/// use strata_env::config::deep_merge;
///
/// let defaults = json!({
///     "cache": { "enabled": true, "ttl_seconds": 300 },
///     "secrets_dirs": ["/run/secrets", "/etc/secrets"]
/// });
/// let project = json!({
///     "cache": { "ttl_seconds": 60 },
///     "secrets_dirs": ["/mnt/secrets"]
/// });
/// let merged = deep_merge(defaults, project);
/// assert_eq!(merged["cache"]["enabled"], json!(true));
/// assert_eq!(merged["cache"]["ttl_seconds"], json!(60));
/// assert_eq!(merged["secrets_dirs"], json!(["/mnt/secrets"]));
/// ```
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut fields), Value::Object(overrides)) => {
            for (key, value) in overrides {
                let merged = match fields.remove(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => value,
                };
                fields.insert(key, merged);
            }
            Value::Object(fields)
        }
        (base, Value::Null) => base,
        (_, overlay) => overlay,
    }
}

/// Merge layers lowest tier first.
pub fn deep_merge_all(layers: impl IntoIterator<Item = Value>) -> Value {
    layers.into_iter().fold(Value::Null, deep_merge)
}
