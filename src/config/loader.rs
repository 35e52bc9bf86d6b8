//! Settings loader with tier-based merging.
//!
//! Loads settings from multiple tiers and merges them field-by-field.

use super::merge::deep_merge_all;
use super::types::Settings;
use anyhow::{Context, Result};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment variable naming an explicit settings file.
pub const CONFIG_PATH_VAR: &str = "STRATA_ENV_CONFIG_PATH";

/// Settings tier priority (lowest to highest).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConfigTier {
    /// Built-in defaults (lowest priority)
    Defaults = 0,
    /// `./strata-env.yaml`
    Project = 1,
    /// `<config dir>/strata-env/config.yaml`
    User = 2,
    /// `STRATA_ENV_*` variables (highest priority)
    Environment = 3,
}

impl std::fmt::Display for ConfigTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigTier::Defaults => write!(f, "defaults"),
            ConfigTier::Project => write!(f, "project"),
            ConfigTier::User => write!(f, "user"),
            ConfigTier::Environment => write!(f, "environment"),
        }
    }
}

/// Settings file location for each tier.
#[derive(Debug, Clone)]
pub struct ConfigPaths {
    pub project_file: Option<PathBuf>,
    pub user_file: Option<PathBuf>,
}

impl Default for ConfigPaths {
    fn default() -> Self {
        Self::discover()
    }
}

impl ConfigPaths {
    /// The standard locations: the working directory and the platform config dir.
    pub fn discover() -> Self {
        Self {
            project_file: Some(PathBuf::from("strata-env.yaml")),
            user_file: dirs::config_dir().map(|d| d.join("strata-env").join("config.yaml")),
        }
    }

    /// Create paths with explicit files.
    pub fn with_files(project_file: Option<PathBuf>, user_file: Option<PathBuf>) -> Self {
        Self {
            project_file,
            user_file,
        }
    }
}

/// Settings loader that handles tier-based merging.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    pub paths: ConfigPaths,
    settings: Settings,
    /// Files that contributed, lowest tier first.
    loaded_from: Vec<(ConfigTier, PathBuf)>,
}

impl ConfigLoader {
    /// Load settings from all tiers, honouring `STRATA_ENV_CONFIG_PATH` and
    /// the `STRATA_ENV_*` overrides from the process environment.
    pub fn load() -> Result<Self> {
        match std::env::var(CONFIG_PATH_VAR) {
            Ok(explicit) => Self::load_explicit(Path::new(&explicit), |k| std::env::var(k).ok()),
            Err(_) => Self::load_with_paths(ConfigPaths::discover(), |k| std::env::var(k).ok()),
        }
    }

    /// Load defaults plus one explicit file; the project and user tiers are skipped.
    pub fn load_explicit<F>(path: &Path, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let paths = ConfigPaths::with_files(Some(path.to_path_buf()), None);
        if !path.exists() {
            anyhow::bail!("Settings file not found: {}", path.display());
        }
        Self::load_with_paths(paths, env)
    }

    /// Load settings with explicit tier files. `env` looks up override variables.
    pub fn load_with_paths<F>(paths: ConfigPaths, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut layers: Vec<Value> = vec![serde_json::to_value(Settings::default())?];
        let mut loaded_from = Vec::new();

        for (tier, file) in [
            (ConfigTier::Project, paths.project_file.as_ref()),
            (ConfigTier::User, paths.user_file.as_ref()),
        ] {
            let Some(file) = file.filter(|f| f.exists()) else {
                continue;
            };
            let content = std::fs::read_to_string(file)
                .with_context(|| format!("Failed to read settings file {}", file.display()))?;
            let value: Value = serde_yaml::from_str(&content)
                .with_context(|| format!("Invalid settings file {}", file.display()))?;
            debug!(tier = %tier, path = %file.display(), "Loaded settings tier");
            layers.push(value);
            loaded_from.push((tier, file.clone()));
        }

        let merged = deep_merge_all(layers);
        let mut settings: Settings =
            serde_json::from_value(merged).context("Settings do not match the expected shape")?;

        Self::apply_env_overrides(&mut settings, env)?;

        Ok(Self {
            paths,
            settings,
            loaded_from,
        })
    }

    /// Apply `STRATA_ENV_*` overrides.
    fn apply_env_overrides<F>(settings: &mut Settings, env: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(name) = env("STRATA_ENV_ENV") {
            settings.env = Some(name);
        }

        if let Some(base) = env("STRATA_ENV_BASE_FILE") {
            settings.base_file = PathBuf::from(base);
        }

        if let Some(policy) = env("STRATA_ENV_POLICY") {
            settings.policy = Some(PathBuf::from(policy));
        }

        if let Some(timeout) = env("STRATA_ENV_TIMEOUT_SECONDS") {
            let seconds = timeout
                .trim()
                .parse::<u64>()
                .with_context(|| format!("STRATA_ENV_TIMEOUT_SECONDS is not a number: {}", timeout))?;
            settings.timeout_seconds = Some(seconds);
        }

        if let Some(ci) = env("STRATA_ENV_CI") {
            settings.ci = matches!(ci.trim().to_lowercase().as_str(), "1" | "true" | "yes");
        }

        if let Some(detect) = env("STRATA_ENV_DETECT_CI") {
            settings.detect_ci = matches!(detect.trim().to_lowercase().as_str(), "1" | "true" | "yes");
        }

        Ok(())
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    pub fn into_settings(self) -> Settings {
        self.settings
    }

    /// Settings files that were read, lowest tier first.
    pub fn loaded_from(&self) -> &[(ConfigTier, PathBuf)] {
        &self.loaded_from
    }
}
