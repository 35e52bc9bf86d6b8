//! `diff` subcommand: drift against a baseline export.

use crate::diff::{DiffPolicy, DiffResult};
use clap::{Args, ValueEnum};
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct DiffArgs {
    /// Baseline file written by `export` (JSON or YAML)
    #[arg(value_name = "FILE")]
    pub baseline: PathBuf,

    #[arg(short, long, value_enum, default_value_t = DiffFormat::Text)]
    pub format: DiffFormat,

    /// Fail when any secret was added, removed or changed
    #[arg(long)]
    pub deny_secret_changes: bool,

    /// Fail when a secret appears that the baseline does not have
    #[arg(long)]
    pub deny_added_secrets: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum DiffFormat {
    /// Per-key report
    #[default]
    Text,
    Json,
    /// One line of counts
    Summary,
}

impl DiffFormat {
    pub fn render(self, result: &DiffResult) -> serde_json::Result<String> {
        Ok(match self {
            DiffFormat::Text => result.to_string(),
            DiffFormat::Json => result.to_json()?,
            DiffFormat::Summary => format!(
                "Added: {}, Removed: {}, Changed: {}, Secrets affected: {}",
                result.added.len(),
                result.removed.len(),
                result.changed.len(),
                result.secrets.len()
            ),
        })
    }
}

impl DiffArgs {
    pub fn policy(&self) -> DiffPolicy {
        DiffPolicy {
            deny_secret_changes: self.deny_secret_changes,
            deny_added_secrets: self.deny_added_secrets,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::diff;
    use crate::mask::SecretClassifier;
    use crate::types::TypedValue;
    use clap::Parser;
    use std::collections::BTreeMap;

    #[derive(Parser)]
    struct Wrapper {
        #[command(flatten)]
        args: DiffArgs,
    }

    fn values(pairs: &[(&str, i64)]) -> BTreeMap<String, TypedValue> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), TypedValue::Int(*v)))
            .collect()
    }

    #[test]
    fn test_flags_parse() {
        let parsed = Wrapper::parse_from(["diff", "base.json", "-f", "summary", "--deny-added-secrets"]);
        assert_eq!(parsed.args.format, DiffFormat::Summary);
        assert_eq!(
            parsed.args.policy(),
            DiffPolicy {
                deny_secret_changes: false,
                deny_added_secrets: true,
            }
        );
        assert!(Wrapper::try_parse_from(["diff", "base.json", "-f", "xml"]).is_err());
    }

    #[test]
    fn test_summary_line() {
        let result = diff(
            &values(&[("A", 1), ("B", 2), ("SECRET_TOKEN", 5)]),
            &values(&[("A", 1), ("C", 3)]),
            &SecretClassifier::new(),
        );
        assert_eq!(
            DiffFormat::Summary.render(&result).unwrap(),
            "Added: 2, Removed: 1, Changed: 0, Secrets affected: 1"
        );
        let json = DiffFormat::Json.render(&result).unwrap();
        assert!(json.contains("\"SECRET_TOKEN\""));
        assert!(!json.contains(": 5"));
    }
}
