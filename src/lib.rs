//! strata-env library
//!
//! Resolves configuration from layered sources (schema defaults, dotenv
//! files, mounted secrets, the process environment and remote providers)
//! into one typed, validated snapshot with per-key provenance. Secret values
//! are masked in every derived view.
//!
//! ```no_run
//! use strata_env::resolver::Resolver;
//! use strata_env::schema::{FieldDescriptor, Schema};
//! use strata_env::types::ValueType;
//!
//! # async fn run() -> strata_env::error::Result<()> {
//! let schema = Schema::new()
//!     .field(FieldDescriptor::new("port").typed(ValueType::Int).with_default(8080i64))
//!     .field(FieldDescriptor::new("database_url").required());
//! let resolution = Resolver::new()
//!     .schema(schema)
//!     .base_file(".env")
//!     .env("prod")
//!     .resolve()
//!     .await?;
//! println!("{}", resolution.snapshot.export(Default::default(), false)?);
//! # Ok(())
//! # }
//! ```

pub mod audit;
pub mod cast;
pub mod cli;
pub mod config;
pub mod crypto;
pub mod detect;
pub mod diff;
pub mod error;
pub mod expand;
pub mod export;
pub mod failure;
pub mod format;
pub mod logging;
pub mod mask;
pub mod metrics;
pub mod policy;
pub mod precedence;
pub mod resolver;
pub mod schema;
pub mod snapshot;
pub mod sources;
pub mod types;
pub mod validate;
