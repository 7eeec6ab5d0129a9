//! Settings loading from disk and environment.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::Settings;
use crate::config::validation::{validate_settings, ValidationError};

pub const ENV_DATABASE_URL: &str = "ROUTE_CONTROL_DATABASE_URL";
pub const ENV_BIND_ADDRESS: &str = "ROUTE_CONTROL_BIND_ADDRESS";
pub const ENV_REFRESH_INTERVAL: &str = "ROUTE_CONTROL_REFRESH_INTERVAL_SECS";

/// Error type for settings loading.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("{name} is not a valid value: '{value}'")]
    Env { name: &'static str, value: String },

    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load settings from an optional TOML file, apply env overrides, validate.
///
/// With no path the defaults are used.
pub fn load_settings(path: Option<&Path>) -> Result<Settings, SettingsError> {
    let settings = match path {
        Some(path) => parse_settings(&fs::read_to_string(path)?)?,
        None => Settings::default(),
    };
    finish(settings, |name| std::env::var(name).ok())
}

/// Parse a TOML document without touching the environment.
pub fn parse_settings(content: &str) -> Result<Settings, SettingsError> {
    Ok(toml::from_str(content)?)
}

/// Apply overrides from `lookup` and validate.
pub(crate) fn finish<F>(mut settings: Settings, lookup: F) -> Result<Settings, SettingsError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(url) = lookup(ENV_DATABASE_URL) {
        settings.database.url = url;
    }
    if let Some(address) = lookup(ENV_BIND_ADDRESS) {
        settings.admin.bind_address = address;
    }
    if let Some(raw) = lookup(ENV_REFRESH_INTERVAL) {
        settings.refresh.interval_secs = raw.trim().parse().map_err(|_| SettingsError::Env {
            name: ENV_REFRESH_INTERVAL,
            value: raw.clone(),
        })?;
    }

    validate_settings(&settings).map_err(SettingsError::Validation)?;
    Ok(settings)
}
