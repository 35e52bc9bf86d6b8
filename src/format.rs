//! Output formatting for snapshots and explanations.

use crate::snapshot::ConfigSnapshot;
use crate::types::TypedValue;

/// Output format for resolved configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    Json,
    Yaml,
    #[default]
    Pretty,
}

impl OutputFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "json" => Some(OutputFormat::Json),
            "yaml" | "yml" => Some(OutputFormat::Yaml),
            "pretty" | "text" => Some(OutputFormat::Pretty),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Yaml => "yaml",
            OutputFormat::Pretty => "pretty",
        }
    }
}

/// Human-readable listing: one line per key with its value and source.
///
/// Secrets are masked unless `unmask` is set.
pub fn format_snapshot_pretty(snapshot: &ConfigSnapshot, unmask: bool) -> String {
    let mut out = String::new();
    out.push_str(&format!("# Configuration ({} keys)\n\n", snapshot.len()));

    let width = snapshot.keys().map(str::len).max().unwrap_or(0);
    for resolved in snapshot.iter() {
        let shown = if resolved.masked && !unmask {
            crate::mask::mask_value(&resolved.value.to_raw_string())
        } else {
            format_value(&resolved.value)
        };
        let marker = if resolved.masked { " [secret]" } else { "" };
        out.push_str(&format!(
            "{:width$} = {}  ({}){}\n",
            resolved.key,
            shown,
            resolved.origin,
            marker,
            width = width
        ));
    }
    out
}

/// Render a value for text output. Lists print as comma-separated items.
pub fn format_value(value: &TypedValue) -> String {
    match value {
        TypedValue::List(items) => items
            .iter()
            .map(format_value)
            .collect::<Vec<_>>()
            .join(","),
        other => other.to_raw_string(),
    }
}
