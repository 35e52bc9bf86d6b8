//! Error taxonomy for resolution, validation and drift checks.
//!
//! Each pipeline stage owns one error type. They are unified under
//! [`ResolveError`], which also maps to a stable [`ErrorCode`] and a process
//! exit code for the CLI boundary.

use crate::types::ValueType;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// Error codes for programmatic error handling.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Source errors
    CollectionFailed,

    // Pipeline errors
    ExpansionCycle,
    MalformedReference,
    CastFailed,
    MissingRequired,
    UnknownKeys,
    RuleFailed,
    PatternMismatch,
    PolicyViolation,

    // Drift errors
    BaselineUnreadable,
    SecretDrift,

    // Internal errors
    Timeout,
    ConfigError,
}

impl ErrorCode {
    /// Exit code used by the CLI: 2 for configuration/file problems, 1 otherwise.
    pub fn exit_code(self) -> i32 {
        match self {
            ErrorCode::CollectionFailed | ErrorCode::ConfigError | ErrorCode::BaselineUnreadable => 2,
            _ => 1,
        }
    }
}

/// Failure while collecting one source's contribution.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CollectionError {
    #[error("source '{name}' is not available")]
    Unavailable { name: String },

    #[error("source '{name}' failed: {reason}")]
    Fetch { name: String, reason: String },

    #[error("source '{name}' could not read {path}: {reason}")]
    Read {
        name: String,
        path: String,
        reason: String,
    },

    #[error("source '{name}' could not be decrypted with {tool}: {reason}")]
    Decrypt {
        name: String,
        tool: String,
        reason: String,
    },

    #[error("source '{name}' skipped: circuit open after repeated failures")]
    CircuitOpen { name: String },
}

impl CollectionError {
    /// Name of the source or provider that failed.
    pub fn source_name(&self) -> &str {
        match self {
            CollectionError::Unavailable { name }
            | CollectionError::Fetch { name, .. }
            | CollectionError::Read { name, .. }
            | CollectionError::Decrypt { name, .. }
            | CollectionError::CircuitOpen { name } => name,
        }
    }
}

/// Placeholder expansion failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExpansionError {
    #[error("circular reference detected for variable {key}: {}", .path.join(" -> "))]
    Cycle { key: String, path: Vec<String> },

    #[error("malformed reference in {key}: {reason}")]
    Malformed { key: String, reason: String },
}

/// Type conversion failure. `value` is already masked for secret keys.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("cannot cast {key}='{value}' to {expected}: {reason}")]
pub struct CastError {
    pub key: String,
    pub expected: ValueType,
    pub value: String,
    pub reason: String,
}

/// Aggregated failure of one validation stage.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("missing required variables: {}", .keys.join(", "))]
    MissingRequired { keys: Vec<String> },

    #[error("unknown variables found: {}", .keys.join(", "))]
    UnknownKeys { keys: Vec<String> },

    #[error("rule validation failed: {}", .violations.join("; "))]
    Rule { violations: Vec<String> },

    #[error("pattern validation failed: {}", .violations.join("; "))]
    Pattern { violations: Vec<String> },
}

/// Policy-as-code failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PolicyError {
    #[error("policy violations: {}", .violations.join("; "))]
    Violations { violations: Vec<String> },

    #[error("cannot load policy {path}: {reason}")]
    Load { path: String, reason: String },
}

/// Drift comparison failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DiffError {
    #[error("cannot read baseline {path}: {reason}")]
    Baseline { path: String, reason: String },

    #[error("secret changes detected: {}", .keys.join(", "))]
    SecretChanges { keys: Vec<String> },

    #[error("secrets added: {}", .keys.join(", "))]
    AddedSecrets { keys: Vec<String> },
}

/// Any terminal failure of a resolution call.
#[derive(Error, Debug, Clone)]
pub enum ResolveError {
    #[error(transparent)]
    Collection(#[from] CollectionError),

    #[error(transparent)]
    Expansion(#[from] ExpansionError),

    #[error(transparent)]
    Cast(#[from] CastError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Policy(#[from] PolicyError),

    #[error(transparent)]
    Diff(#[from] DiffError),

    #[error("resolution timed out after {}s", .0.as_secs_f64())]
    Timeout(Duration),

    #[error("configuration error: {0}")]
    Config(String),
}

impl ResolveError {
    pub fn config(message: impl Into<String>) -> Self {
        ResolveError::Config(message.into())
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            ResolveError::Collection(_) => ErrorCode::CollectionFailed,
            ResolveError::Expansion(ExpansionError::Cycle { .. }) => ErrorCode::ExpansionCycle,
            ResolveError::Expansion(ExpansionError::Malformed { .. }) => {
                ErrorCode::MalformedReference
            }
            ResolveError::Cast(_) => ErrorCode::CastFailed,
            ResolveError::Validation(ValidationError::MissingRequired { .. }) => {
                ErrorCode::MissingRequired
            }
            ResolveError::Validation(ValidationError::UnknownKeys { .. }) => ErrorCode::UnknownKeys,
            ResolveError::Validation(ValidationError::Rule { .. }) => ErrorCode::RuleFailed,
            ResolveError::Validation(ValidationError::Pattern { .. }) => ErrorCode::PatternMismatch,
            ResolveError::Policy(PolicyError::Violations { .. }) => ErrorCode::PolicyViolation,
            ResolveError::Policy(PolicyError::Load { .. }) => ErrorCode::ConfigError,
            ResolveError::Diff(DiffError::Baseline { .. }) => ErrorCode::BaselineUnreadable,
            ResolveError::Diff(_) => ErrorCode::SecretDrift,
            ResolveError::Timeout(_) => ErrorCode::Timeout,
            ResolveError::Config(_) => ErrorCode::ConfigError,
        }
    }

    pub fn exit_code(&self) -> i32 {
        self.code().exit_code()
    }
}

/// Structured error for machine-readable CLI output.
#[derive(Debug, Serialize)]
pub struct ErrorReport {
    pub code: ErrorCode,
    pub message: String,
}

impl From<&ResolveError> for ErrorReport {
    fn from(err: &ResolveError) -> Self {
        Self {
            code: err.code(),
            message: err.to_string(),
        }
    }
}

/// Result type for resolution operations.
pub type Result<T> = std::result::Result<T, ResolveError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        let collection = ResolveError::from(CollectionError::Unavailable {
            name: "azure".into(),
        });
        assert_eq!(collection.exit_code(), 2);
        assert_eq!(ResolveError::config("bad yaml").exit_code(), 2);

        let missing = ResolveError::from(ValidationError::MissingRequired {
            keys: vec!["A".into()],
        });
        assert_eq!(missing.exit_code(), 1);
        assert_eq!(missing.code(), ErrorCode::MissingRequired);
    }

    #[test]
    fn test_cycle_message_names_path() {
        let err = ExpansionError::Cycle {
            key: "VAR_A".into(),
            path: vec!["VAR_A".into(), "VAR_B".into(), "VAR_A".into()],
        };
        assert_eq!(
            err.to_string(),
            "circular reference detected for variable VAR_A: VAR_A -> VAR_B -> VAR_A"
        );
    }

    #[test]
    fn test_error_report_serializes_code() {
        let err = ResolveError::from(PolicyError::Violations {
            violations: vec!["Forbidden variables present: DEBUG".into()],
        });
        let json = serde_json::to_value(ErrorReport::from(&err)).unwrap();
        assert_eq!(json["code"], "POLICY_VIOLATION");
    }
}
