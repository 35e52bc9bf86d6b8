//! Core value and provenance types shared across the resolution pipeline.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Precedence tier of a configuration source, lowest priority first.
///
/// The discriminant is the tier index; a higher index wins during merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceId {
    /// Schema defaults (lowest priority)
    #[serde(alias = "schema_defaults", alias = "default")]
    SchemaDefault = 0,
    /// Base `.env` file
    #[serde(alias = "file")]
    BaseFile = 1,
    /// Environment-specific file (`.env.{env}`)
    #[serde(alias = "env_specific", alias = "file.env")]
    EnvSpecificFile = 2,
    /// Mounted container secrets (Docker, Kubernetes)
    #[serde(alias = "docker_k8s", alias = "docker", alias = "kubernetes")]
    ContainerSecret = 3,
    /// Process environment
    System = 4,
    /// Remote secret stores (highest priority)
    #[serde(alias = "cloud_providers", alias = "cloud")]
    CloudProvider = 5,
}

impl SourceId {
    /// All tiers in merge order (lowest to highest).
    pub const ALL: [SourceId; 6] = [
        SourceId::SchemaDefault,
        SourceId::BaseFile,
        SourceId::EnvSpecificFile,
        SourceId::ContainerSecret,
        SourceId::System,
        SourceId::CloudProvider,
    ];

    pub fn tier(self) -> u8 {
        self as u8
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SourceId::SchemaDefault => "schema_default",
            SourceId::BaseFile => "base_file",
            SourceId::EnvSpecificFile => "env_specific_file",
            SourceId::ContainerSecret => "container_secret",
            SourceId::System => "system",
            SourceId::CloudProvider => "cloud_provider",
        }
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "schema_default" | "schema_defaults" | "default" => Ok(SourceId::SchemaDefault),
            "base_file" | "file" => Ok(SourceId::BaseFile),
            "env_specific_file" | "env_specific" | "file.env" => Ok(SourceId::EnvSpecificFile),
            "container_secret" | "docker_k8s" | "docker" | "kubernetes" => {
                Ok(SourceId::ContainerSecret)
            }
            "system" => Ok(SourceId::System),
            "cloud_provider" | "cloud_providers" | "cloud" => Ok(SourceId::CloudProvider),
            _ => Err(format!("Unknown source '{}'", s)),
        }
    }
}

/// Where a value came from: tier plus the concrete provider or file within it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Origin {
    pub source: SourceId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
}

impl Origin {
    pub fn new(source: SourceId) -> Self {
        Self {
            source,
            provider: None,
        }
    }

    pub fn with_provider(source: SourceId, provider: impl Into<String>) -> Self {
        Self {
            source,
            provider: Some(provider.into()),
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.provider {
            Some(provider) => write!(f, "{} ({})", self.source, provider),
            None => write!(f, "{}", self.source),
        }
    }
}

/// Declared target type of a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    #[serde(alias = "string")]
    Str,
    #[serde(alias = "integer")]
    Int,
    Float,
    #[serde(alias = "boolean")]
    Bool,
    List,
}

impl ValueType {
    pub fn as_str(self) -> &'static str {
        match self {
            ValueType::Str => "str",
            ValueType::Int => "int",
            ValueType::Float => "float",
            ValueType::Bool => "bool",
            ValueType::List => "list",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ValueType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "str" | "string" => Ok(ValueType::Str),
            "int" | "integer" => Ok(ValueType::Int),
            "float" => Ok(ValueType::Float),
            "bool" | "boolean" => Ok(ValueType::Bool),
            "list" => Ok(ValueType::List),
            _ => Err(format!(
                "Invalid type '{}'. Valid options: str, int, float, bool, list",
                s
            )),
        }
    }
}

/// A typed configuration value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TypedValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<TypedValue>),
    Map(BTreeMap<String, TypedValue>),
}

impl TypedValue {
    /// Render the value the way it would appear in a dotenv file.
    ///
    /// Lists and maps render as JSON so they cast back to the same structure.
    pub fn to_raw_string(&self) -> String {
        match self {
            TypedValue::Null => String::new(),
            TypedValue::Bool(b) => b.to_string(),
            TypedValue::Int(i) => i.to_string(),
            TypedValue::Float(f) => f.to_string(),
            TypedValue::Str(s) => s.clone(),
            TypedValue::List(_) | TypedValue::Map(_) => {
                serde_json::to_string(self).unwrap_or_default()
            }
        }
    }

    /// Whether the value already has the shape of `ty`.
    pub fn matches(&self, ty: ValueType) -> bool {
        matches!(
            (self, ty),
            (TypedValue::Str(_), ValueType::Str)
                | (TypedValue::Int(_), ValueType::Int)
                | (TypedValue::Float(_), ValueType::Float)
                | (TypedValue::Bool(_), ValueType::Bool)
                | (TypedValue::List(_), ValueType::List)
        )
    }

    /// Null or a blank string.
    pub fn is_empty_value(&self) -> bool {
        match self {
            TypedValue::Null => true,
            TypedValue::Str(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            TypedValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            TypedValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            TypedValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            TypedValue::Null => "null",
            TypedValue::Bool(_) => "bool",
            TypedValue::Int(_) => "int",
            TypedValue::Float(_) => "float",
            TypedValue::Str(_) => "str",
            TypedValue::List(_) => "list",
            TypedValue::Map(_) => "map",
        }
    }

    /// Structural equality: scalars by value, lists and maps element-wise.
    ///
    /// Numbers compare across int/float with a small tolerance, so a baseline
    /// read back from JSON (`8080.0`) equals a resolved `8080`.
    pub fn structurally_equal(&self, other: &TypedValue) -> bool {
        match (self, other) {
            (TypedValue::List(a), TypedValue::List(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.structurally_equal(y))
            }
            (TypedValue::Map(a), TypedValue::Map(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .all(|(k, v)| b.get(k).is_some_and(|w| v.structurally_equal(w)))
            }
            (TypedValue::Float(a), TypedValue::Float(b)) => {
                (a.is_nan() && b.is_nan()) || a == b || (a - b).abs() < 1e-10
            }
            (TypedValue::Int(a), TypedValue::Float(b)) | (TypedValue::Float(b), TypedValue::Int(a)) => {
                (*a as f64 - b).abs() < 1e-10
            }
            _ => self == other,
        }
    }
}

impl fmt::Display for TypedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_raw_string())
    }
}

impl From<serde_json::Value> for TypedValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => TypedValue::Null,
            serde_json::Value::Bool(b) => TypedValue::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => TypedValue::Int(i),
                None => TypedValue::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => TypedValue::Str(s),
            serde_json::Value::Array(items) => {
                TypedValue::List(items.into_iter().map(TypedValue::from).collect())
            }
            serde_json::Value::Object(map) => TypedValue::Map(
                map.into_iter()
                    .map(|(k, v)| (k, TypedValue::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<&str> for TypedValue {
    fn from(value: &str) -> Self {
        TypedValue::Str(value.to_string())
    }
}

impl From<String> for TypedValue {
    fn from(value: String) -> Self {
        TypedValue::Str(value)
    }
}

impl From<i64> for TypedValue {
    fn from(value: i64) -> Self {
        TypedValue::Int(value)
    }
}

impl From<f64> for TypedValue {
    fn from(value: f64) -> Self {
        TypedValue::Float(value)
    }
}

impl From<bool> for TypedValue {
    fn from(value: bool) -> Self {
        TypedValue::Bool(value)
    }
}

impl<T: Into<TypedValue>> From<Vec<T>> for TypedValue {
    fn from(items: Vec<T>) -> Self {
        TypedValue::List(items.into_iter().map(Into::into).collect())
    }
}
