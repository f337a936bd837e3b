//! Helper functions for settings operations.

use std::str::FromStr;

use crate::core::config::data::Config;

use super::error::SettingError;

/// Load the configuration, apply `f` and save it back.
pub fn mutate_config<F>(f: F) -> Result<(), SettingError>
where
    F: FnOnce(&mut Config) -> Result<(), SettingError>,
{
    let mut config = Config::load().map_err(|e| SettingError::ConfigError(e.to_string()))?;
    f(&mut config)?;
    config
        .save()
        .map_err(|e| SettingError::ConfigError(e.to_string()))
}

/// Parse a boolean value from user input.
///
/// Accepts: on/off, true/false, yes/no (case-insensitive).
pub fn parse_bool(input: &str) -> Option<bool> {
    match input.to_lowercase().as_str() {
        "on" | "true" | "yes" | "1" => Some(true),
        "off" | "false" | "no" | "0" => Some(false),
        _ => None,
    }
}

/// Format a boolean value for display.
pub fn format_bool(value: bool) -> &'static str {
    if value {
        "on"
    } else {
        "off"
    }
}

/// Parse a number for `key`, naming the expected form on failure.
pub fn parse_number<T: FromStr>(
    key: &'static str,
    input: &str,
    expected: &'static str,
) -> Result<T, SettingError> {
    input.trim().parse().map_err(|_| SettingError::InvalidValue {
        key,
        input: input.to_string(),
        expected,
    })
}

pub fn success_set(key: &str, value: &str) -> String {
    format!("✅ Set {key} to: {value}")
}
