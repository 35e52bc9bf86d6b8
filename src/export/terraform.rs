//! Terraform variable files.

use super::ExportOptions;
use crate::snapshot::ConfigSnapshot;
use crate::types::TypedValue;
use std::collections::BTreeMap;

/// Render a `.tfvars` file. Secret keys become comments to be filled in by hand.
pub fn export_tfvars(snapshot: &ConfigSnapshot, options: &ExportOptions) -> String {
    let mut lines = vec![
        "# Terraform variables".to_string(),
        "# Generated by strata-env".to_string(),
        String::new(),
    ];
    for resolved in snapshot.iter() {
        if resolved.masked && !options.unmask {
            lines.push(format!("# {} = \"<sensitive>\"  # Set this value manually", resolved.key));
        } else {
            lines.push(format!("{} = {}", resolved.key, hcl_value(&resolved.value)));
        }
    }
    lines.push(String::new());
    lines.join("\n")
}

/// Render a `.tfvars.json` file. Secret keys are left out unless unmasked.
pub fn export_tfvars_json(snapshot: &ConfigSnapshot, options: &ExportOptions) -> serde_json::Result<String> {
    let values: BTreeMap<&str, &TypedValue> = snapshot
        .iter()
        .filter(|r| options.unmask || !r.masked)
        .map(|r| (r.key.as_str(), &r.value))
        .collect();
    serde_json::to_string_pretty(&values)
}

fn hcl_value(value: &TypedValue) -> String {
    match value {
        TypedValue::Null => "null".to_string(),
        TypedValue::Bool(b) => b.to_string(),
        TypedValue::Int(i) => i.to_string(),
        TypedValue::Float(f) => f.to_string(),
        TypedValue::Str(s) => hcl_string(s),
        TypedValue::List(items) => format!(
            "[{}]",
            items.iter().map(hcl_value).collect::<Vec<_>>().join(", ")
        ),
        TypedValue::Map(map) => format!(
            "{{ {} }}",
            map.iter()
                .map(|(k, v)| format!("{} = {}", hcl_string(k), hcl_value(v)))
                .collect::<Vec<_>>()
                .join(", ")
        ),
    }
}

fn hcl_string(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}
