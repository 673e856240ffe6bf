//! `vendorscope-config`: run configuration.
//!
//! Provides:
//! - Typed config schema (target vendor, site list, browser, timeouts, output, logging)
//! - YAML loading
//! - `${ENV_VAR}` substitution
//! - Default value application
//! - Validation with field-path messages

pub mod defaults;
pub mod env;
pub mod io;
pub mod schema;
pub mod validation;

pub use defaults::apply_all_defaults;
pub use env::{resolve_env_vars, resolve_env_vars_with, MissingEnvVarError};
pub use io::{config_file_path, load_config_value, parse_config_value, CONFIG_FILE_NAME};
pub use schema::{BrowserConfig, LoggingConfig, OutputConfig, TimeoutsConfig, VendorScopeConfig};
pub use validation::{validate, ConfigValidationError, ValidationReport};

use anyhow::{bail, Context, Result};
use serde_json::Value;
use std::path::Path;

/// A config that passed validation, with the warnings it raised.
///
/// Warnings are returned rather than logged because the log level is only
/// known once the config has been merged with the command line.
#[derive(Debug)]
pub struct PreparedConfig {
    pub config: VendorScopeConfig,
    pub warnings: Vec<ConfigValidationError>,
}

/// Load, apply env substitution, apply defaults, and validate a config file.
///
/// Validation errors are fatal.
pub async fn load_and_prepare(path: &Path) -> Result<PreparedConfig> {
    let value = load_config_value(path).await?;
    prepare(value)
}

/// The in-memory half of [`load_and_prepare`].
pub fn prepare(value: Value) -> Result<PreparedConfig> {
    let value = resolve_env_vars(&value).context("Failed to resolve env vars in config")?;

    let config: VendorScopeConfig =
        serde_json::from_value(value).context("Failed to deserialize config after processing")?;

    let config = apply_all_defaults(config);

    let report = validate(&config);
    if !report.is_valid() {
        let details: Vec<String> = report.errors.iter().map(ToString::to_string).collect();
        bail!("Invalid configuration:\n  {}", details.join("\n  "));
    }

    Ok(PreparedConfig {
        config,
        warnings: report.warnings,
    })
}
