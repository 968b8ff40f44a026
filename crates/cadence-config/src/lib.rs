// SPDX-FileCopyrightText: 2026 Cadence Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration system for the Cadence follow-up engine.
//!
//! Provides TOML configuration parsing with strict validation (`deny_unknown_fields`),
//! XDG file hierarchy lookup, environment variable overrides, and diagnostic
//! error rendering with typo suggestions.
//!
//! # Usage
//!
//! ```no_run
//! use cadence_config::load_and_validate;
//!
//! let config = load_and_validate().expect("config errors");
//! println!("window: {}..{}", config.compliance.start_hour, config.compliance.end_hour);
//! ```

pub mod diagnostic;
pub mod loader;
pub mod model;
pub mod validation;

use std::path::{Path, PathBuf};

pub use diagnostic::{ConfigError, render_errors};
pub use loader::{load_config, load_config_from_path, load_config_from_str};
pub use model::CadenceConfig;

/// Load configuration from the XDG hierarchy and validate it.
///
/// Returns either a valid `CadenceConfig` or every diagnostic found.
pub fn load_and_validate() -> Result<CadenceConfig, Vec<ConfigError>> {
    finish(loader::load_config(), collect_toml_sources)
}

/// Load configuration from an explicit file path (plus env overrides) and validate it.
pub fn load_and_validate_path(path: &Path) -> Result<CadenceConfig, Vec<ConfigError>> {
    finish(loader::load_config_from_path(path), || {
        read_source(path.to_path_buf()).into_iter().collect()
    })
}

/// Load configuration from a TOML string and validate it.
///
/// Useful for testing and explicit configuration.
pub fn load_and_validate_str(toml_content: &str) -> Result<CadenceConfig, Vec<ConfigError>> {
    finish(loader::load_config_from_str(toml_content), || {
        vec![("<inline>".to_string(), toml_content.to_string())]
    })
}

/// The effective configuration as TOML, with secrets redacted.
pub fn render_effective(config: &CadenceConfig) -> Result<String, toml::ser::Error> {
    let mut redacted = config.clone();
    if redacted.twilio.auth_token.is_some() {
        redacted.twilio.auth_token = Some("<redacted>".to_string());
    }
    toml::to_string_pretty(&redacted)
}

fn finish(
    loaded: Result<CadenceConfig, figment::Error>,
    sources: impl FnOnce() -> Vec<(String, String)>,
) -> Result<CadenceConfig, Vec<ConfigError>> {
    match loaded {
        Ok(config) => {
            validation::validate_config(&config)?;
            Ok(config)
        }
        Err(err) => Err(diagnostic::figment_to_config_errors(err, &sources())),
    }
}

/// Collect TOML source file contents for error span resolution.
fn collect_toml_sources() -> Vec<(String, String)> {
    let local = std::env::current_dir()
        .map(|d| d.join("cadence.toml"))
        .unwrap_or_else(|_| PathBuf::from("cadence.toml"));
    let user = dirs::config_dir().map(|d| d.join("cadence/cadence.toml"));
    let system = Some(PathBuf::from("/etc/cadence/cadence.toml"));

    std::iter::once(Some(local))
        .chain([user, system])
        .flatten()
        .filter_map(read_source)
        .collect()
}

fn read_source(path: PathBuf) -> Option<(String, String)> {
    std::fs::read_to_string(&path)
        .ok()
        .map(|content| (path.display().to_string(), content))
}
