//! CLI command definitions for strata-env
//!
//! This module defines the CLI structure using clap's derive macros.
//! The main entry point is the `Cli` struct which contains subcommands.

pub mod crypt;
pub mod diff;
pub mod export;

use crate::config::Settings;
use clap::{Args, Parser, Subcommand};
use crypt::{DecryptArgs, EncryptArgs};
use diff::DiffArgs;
use export::ExportArgs;
use std::path::PathBuf;

/// Layered configuration resolver for environment variables and secrets
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to settings file (replaces project and user settings)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Environment name; loads `<path>.<env>` over the base file
    #[arg(short, long, global = true)]
    pub env: Option<String>,

    /// Base dotenv file (overrides settings)
    #[arg(short, long, global = true)]
    pub path: Option<PathBuf>,

    /// Schema file with field descriptors
    #[arg(long, global = true)]
    pub schema: Option<PathBuf>,

    /// Policy file (YAML or JSON)
    #[arg(long, global = true)]
    pub policy: Option<PathBuf>,

    /// Warn about keys the schema does not know
    #[arg(long, global = true)]
    pub strict: bool,

    /// CI mode: skip remote providers
    #[arg(long, global = true)]
    pub ci: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Logging output: 0/off, 1/stdout, 2/stderr (default), or filename
    #[arg(short, long, default_value = "2", global = true)]
    pub log: String,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Flags override loaded settings.
    pub fn apply_to(&self, settings: &mut Settings) {
        if let Some(env) = &self.env {
            settings.env = Some(env.clone());
        }
        if let Some(path) = &self.path {
            settings.base_file = path.clone();
        }
        if let Some(schema) = &self.schema {
            settings.schema_file = Some(schema.clone());
        }
        if let Some(policy) = &self.policy {
            settings.policy = Some(policy.clone());
        }
        if self.strict {
            settings.strict = true;
        }
        if self.ci {
            settings.ci = true;
        }
    }
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Resolve and print the configuration (secrets masked)
    Show(ShowArgs),

    /// Resolve and validate; prints warnings and exits non-zero on failure
    Validate,

    /// Print where every key came from
    Audit(AuditArgs),

    /// Compare the resolved configuration with a baseline file
    Diff(DiffArgs),

    /// Explain how one key was resolved
    Explain(ExplainArgs),

    /// Write the resolved configuration to a file or stdout
    Export(ExportArgs),

    /// Generate a .env.example from the schema
    GenerateExample(GenerateExampleArgs),

    /// Encrypt a dotenv file with age or gpg
    Encrypt(EncryptArgs),

    /// Decrypt a dotenv file with age or gpg
    Decrypt(DecryptArgs),

    /// Show the detected runtime platforms and suggested secret providers
    Detect(DetectArgs),
}

#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Output format: pretty (default), json, or yaml
    #[arg(short, long, default_value = "pretty", value_name = "FORMAT")]
    pub format: String,

    /// Print secret values in clear
    #[arg(long)]
    pub unmask: bool,
}

#[derive(Args, Debug)]
pub struct AuditArgs {
    /// Print counts per source instead of every entry
    #[arg(long)]
    pub summary: bool,
}

#[derive(Args, Debug)]
pub struct ExplainArgs {
    /// Variable name
    pub key: String,

    /// Print as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct DetectArgs {
    /// Print as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct GenerateExampleArgs {
    /// Output file path (default: stdout)
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,
}
