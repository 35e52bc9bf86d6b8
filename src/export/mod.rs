//! Exporters for resolved configuration.
//!
//! Every exporter masks secret values (or leaves them out) unless the caller
//! asks for them unmasked.

mod env_example;
mod kubernetes;
mod terraform;

pub use env_example::generate_env_example;
pub use kubernetes::{export_configmap, export_kubernetes, export_secret};
pub use terraform::{export_tfvars, export_tfvars_json};

use crate::error::{ResolveError, Result};
use crate::format::OutputFormat;
use crate::snapshot::ConfigSnapshot;

/// Export target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Yaml,
    Kubernetes,
    Tfvars,
    TfvarsJson,
}

impl ExportFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "json" => Some(ExportFormat::Json),
            "yaml" | "yml" => Some(ExportFormat::Yaml),
            "k8s" | "kubernetes" => Some(ExportFormat::Kubernetes),
            "tfvars" | "terraform" => Some(ExportFormat::Tfvars),
            "tfvars-json" | "tfvars.json" => Some(ExportFormat::TfvarsJson),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Yaml => "yaml",
            ExportFormat::Kubernetes => "k8s",
            ExportFormat::Tfvars => "tfvars",
            ExportFormat::TfvarsJson => "tfvars-json",
        }
    }

    /// Guess the format from an output path; JSON when nothing matches.
    pub fn from_path(path: &std::path::Path) -> Self {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_lowercase();
        if name.ends_with(".tfvars.json") {
            ExportFormat::TfvarsJson
        } else if name.ends_with(".tfvars") {
            ExportFormat::Tfvars
        } else if name.ends_with(".yaml") || name.ends_with(".yml") {
            ExportFormat::Yaml
        } else {
            ExportFormat::Json
        }
    }
}

/// Exporter settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportOptions {
    /// Emit real secret values.
    pub unmask: bool,
    pub configmap_name: String,
    pub secret_name: String,
    pub namespace: Option<String>,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            unmask: false,
            configmap_name: "app-config".to_string(),
            secret_name: "app-secrets".to_string(),
            namespace: None,
        }
    }
}

/// Render `snapshot` in `format`.
pub fn render(snapshot: &ConfigSnapshot, format: ExportFormat, options: &ExportOptions) -> Result<String> {
    match format {
        ExportFormat::Json => snapshot.export(OutputFormat::Json, options.unmask),
        ExportFormat::Yaml => snapshot.export(OutputFormat::Yaml, options.unmask),
        ExportFormat::Kubernetes => export_kubernetes(snapshot, options)
            .map_err(|e| ResolveError::config(format!("Kubernetes export failed: {}", e))),
        ExportFormat::Tfvars => Ok(export_tfvars(snapshot, options)),
        ExportFormat::TfvarsJson => export_tfvars_json(snapshot, options)
            .map_err(|e| ResolveError::config(format!("tfvars export failed: {}", e))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::tests::sample;
    use std::path::Path;

    #[test]
    fn test_format_parsing() {
        assert_eq!(ExportFormat::from_str("K8S"), Some(ExportFormat::Kubernetes));
        assert_eq!(ExportFormat::from_str("yml"), Some(ExportFormat::Yaml));
        assert_eq!(ExportFormat::from_str("toml"), None);
        assert_eq!(
            ExportFormat::from_path(Path::new("out/prod.tfvars.json")),
            ExportFormat::TfvarsJson
        );
        assert_eq!(ExportFormat::from_path(Path::new("prod.tfvars")), ExportFormat::Tfvars);
        assert_eq!(ExportFormat::from_path(Path::new("baseline")), ExportFormat::Json);
    }

    #[test]
    fn test_render_masks_by_default() {
        let snapshot = sample();
        for format in [
            ExportFormat::Json,
            ExportFormat::Yaml,
            ExportFormat::Kubernetes,
            ExportFormat::Tfvars,
            ExportFormat::TfvarsJson,
        ] {
            let out = render(&snapshot, format, &ExportOptions::default()).unwrap();
            assert!(!out.contains("sk-live-abcdef9876"), "{} leaked a secret", format.as_str());
        }
    }
}
