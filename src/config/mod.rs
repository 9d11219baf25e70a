//! Pipeline Configuration Module
//!
//! Describes the stage chain as TOML, rejecting keys the schema does not
//! know, and resolves the API credential from the environment.
//!
//! ## Loading Order
//!
//! 1. `--config <path>` command-line flag
//! 2. `VISION_PIPELINE_CONFIG` environment variable (path to TOML file)
//! 3. `pipeline.toml` in the current working directory
//! 4. Built-in demo chain
//!
//! ## Usage
//!
//! ```ignore
//! let (config, source) = PipelineConfig::load(cli.config.as_deref())?;
//! let api_key = config::credential_from_env()?;
//! let specs = config.stage_specs_with_credential(&api_key);
//! ```

mod credentials;
pub mod defaults;
mod pipeline_config;
pub mod validation;

pub use credentials::{credential_from_env, resolve_credential};
pub use pipeline_config::*;
