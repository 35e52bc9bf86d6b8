//! Export subcommand for strata-env CLI
//!
//! Writes the resolved configuration as JSON, YAML, Kubernetes manifests or
//! Terraform variables.

use crate::export::{ExportFormat, ExportOptions};
use clap::Args;
use std::path::PathBuf;

/// Arguments for the export subcommand
#[derive(Args, Debug)]
pub struct ExportArgs {
    /// Output file path (default: stdout)
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// json, yaml, k8s, tfvars or tfvars-json (guessed from the output name otherwise)
    #[arg(short, long, value_name = "FORMAT")]
    pub format: Option<String>,

    /// Write real secret values
    #[arg(long)]
    pub unmask: bool,

    /// Kubernetes namespace for k8s manifests
    #[arg(long)]
    pub namespace: Option<String>,

    /// Name prefix for k8s manifests (`<name>-config`, `<name>-secrets`)
    #[arg(long, default_value = "app")]
    pub name: String,
}

impl ExportArgs {
    /// Explicit format first, then the output file name, then JSON.
    pub fn export_format(&self) -> Result<ExportFormat, String> {
        match &self.format {
            Some(name) => ExportFormat::from_str(name).ok_or_else(|| {
                format!(
                    "Invalid format '{}'. Valid options: json, yaml, k8s, tfvars, tfvars-json",
                    name
                )
            }),
            None => Ok(self
                .output
                .as_deref()
                .map(ExportFormat::from_path)
                .unwrap_or(ExportFormat::Json)),
        }
    }

    pub fn options(&self) -> ExportOptions {
        ExportOptions {
            unmask: self.unmask,
            configmap_name: format!("{}-config", self.name),
            secret_name: format!("{}-secrets", self.name),
            namespace: self.namespace.clone(),
        }
    }
}
