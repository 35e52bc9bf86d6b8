//! Settings for a resolution run.
//!
//! Settings come from four tiers with field-by-field YAML merging:
//! 1. **Defaults** - built into [`Settings::default`]
//! 2. **Project** - `./strata-env.yaml`
//! 3. **User** - `<config dir>/strata-env/config.yaml`
//! 4. **Environment** - `STRATA_ENV_*` variables
//!
//! ## Environment Variables
//! - `STRATA_ENV_CONFIG_PATH` - Explicit settings file (replaces project and user tiers)
//! - `STRATA_ENV_ENV` - Environment name
//! - `STRATA_ENV_BASE_FILE` - Base dotenv file
//! - `STRATA_ENV_POLICY` - Policy file
//! - `STRATA_ENV_TIMEOUT_SECONDS` - Resolution timeout
//! - `STRATA_ENV_CI` - Skip remote providers (`1`, `true`, `yes`)

mod loader;
mod merge;
mod types;

pub use loader::{CONFIG_PATH_VAR, ConfigLoader, ConfigPaths, ConfigTier};
pub use merge::{deep_merge, deep_merge_all};
pub use types::*;
