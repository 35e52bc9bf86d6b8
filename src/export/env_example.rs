//! `.env.example` generation from a schema.

use crate::mask::SecretClassifier;
use crate::schema::{FieldDescriptor, Schema};
use crate::types::ValueType;

/// Render an example dotenv file.
///
/// Required fields come first, then optional ones, each group sorted by key.
/// Defaults are filled in for optional non-secret fields only.
pub fn generate_env_example(schema: &Schema, classifier: &SecretClassifier) -> String {
    let mut required: Vec<&FieldDescriptor> = schema.fields.iter().filter(|f| f.required).collect();
    let mut optional: Vec<&FieldDescriptor> = schema.fields.iter().filter(|f| !f.required).collect();
    required.sort_by_key(|f| f.key());
    optional.sort_by_key(|f| f.key());

    let mut lines = vec![
        "# Environment Configuration".to_string(),
        "# Copy this file to .env and fill in your values".to_string(),
        String::new(),
    ];

    if !required.is_empty() {
        lines.push("# Required variables".to_string());
        lines.extend(required.iter().map(|f| example_line(f, "")));
        lines.push(String::new());
    }

    if !optional.is_empty() {
        lines.push("# Optional variables".to_string());
        for field in optional {
            let key = field.key();
            let default = match &field.default {
                Some(value) if !classifier.is_secret(&key) => crate::format::format_value(value),
                _ => String::new(),
            };
            lines.push(example_line(field, &default));
        }
        lines.push(String::new());
    }

    lines.join("\n")
}

fn example_line(field: &FieldDescriptor, value: &str) -> String {
    let ty = field.value_type.unwrap_or(ValueType::Str);
    format!("{}={}  # {}", field.key(), value, ty)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_groups_and_defaults() {
        let schema = Schema::new()
            .field(FieldDescriptor::new("port").typed(ValueType::Int).with_default(8080i64))
            .field(FieldDescriptor::new("database_url").required())
            .field(FieldDescriptor::new("api_key").with_default("sk-default-123"))
            .field(FieldDescriptor::new("hosts").typed(ValueType::List).with_default(vec!["a", "b"]));
        let text = generate_env_example(&schema, &SecretClassifier::new());

        let expected = "\
# Environment Configuration
# Copy this file to .env and fill in your values

# Required variables
DATABASE_URL=  # str

# Optional variables
API_KEY=  # str
HOSTS=a,b  # list
PORT=8080  # int
";
        assert_eq!(text, expected);
    }

    #[test]
    fn test_empty_schema_has_header_only() {
        let text = generate_env_example(&Schema::new(), &SecretClassifier::new());
        assert!(text.starts_with("# Environment Configuration"));
        assert!(!text.contains("Required"));
    }
}
