//! Explicit field descriptors supplied by the schema collaborator.
//!
//! Field names are matched to source keys through SHOUTY_SNAKE_CASE, so a
//! field `database_url` (or `databaseUrl`) reads the key `DATABASE_URL`.

use crate::types::{TypedValue, ValueType};
use heck::ToShoutySnakeCase;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Description of one configuration field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,

    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub value_type: Option<ValueType>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<TypedValue>,

    #[serde(default)]
    pub required: bool,
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value_type: None,
            default: None,
            required: false,
        }
    }

    pub fn typed(mut self, value_type: ValueType) -> Self {
        self.value_type = Some(value_type);
        self
    }

    pub fn with_default(mut self, default: impl Into<TypedValue>) -> Self {
        self.default = Some(default.into());
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Source key this field reads from.
    pub fn key(&self) -> String {
        self.name.to_shouty_snake_case()
    }
}

/// Ordered list of field descriptors.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Schema {
    pub fields: Vec<FieldDescriptor>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, field: FieldDescriptor) -> Self {
        self.fields.push(field);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Find the descriptor for a source key.
    pub fn get(&self, key: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.key() == key)
    }

    pub fn required_keys(&self) -> BTreeSet<String> {
        self.fields
            .iter()
            .filter(|f| f.required)
            .map(FieldDescriptor::key)
            .collect()
    }

    pub fn declared_types(&self) -> BTreeMap<String, ValueType> {
        self.fields
            .iter()
            .filter_map(|f| f.value_type.map(|t| (f.key(), t)))
            .collect()
    }

    pub fn defaults(&self) -> BTreeMap<String, TypedValue> {
        self.fields
            .iter()
            .filter_map(|f| f.default.clone().map(|d| (f.key(), d)))
            .collect()
    }

    /// Keys of every descriptor, including bare ones.
    pub fn field_keys(&self) -> BTreeSet<String> {
        self.fields.iter().map(FieldDescriptor::key).collect()
    }

    /// Keys the schema says something about: required, typed, or defaulted.
    /// A bare descriptor (name only) does not count.
    pub fn known_keys(&self) -> BTreeSet<String> {
        self.fields
            .iter()
            .filter(|f| f.required || f.value_type.is_some() || f.default.is_some())
            .map(FieldDescriptor::key)
            .collect()
    }
}
