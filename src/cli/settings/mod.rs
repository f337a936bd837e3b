//! Settings management for CLI set/unset commands.
//!
//! Each configuration key has a handler: boolean keys (`search`,
//! `arxiv-full-text`) parse on/off, value keys parse and validate their
//! argument. Handlers work on an in-memory [`Config`]; [`set`] and [`unset`]
//! load and save the file around them.

pub mod error;
pub mod handlers;
pub mod helpers;
pub mod registry;

pub use error::SettingError;
pub use registry::SettingRegistry;

use crate::core::config::data::Config;
use helpers::mutate_config;

/// Trait for handling a configuration setting.
pub trait SettingHandler: Send + Sync {
    /// Returns the configuration key this handler manages.
    fn key(&self) -> &'static str;

    /// Set the configuration value from the arguments after the key.
    ///
    /// # Returns
    /// A success message to display, or an error.
    fn set(&self, args: &[String], config: &mut Config) -> Result<String, SettingError>;

    /// Clear the value so the default applies again.
    fn unset(&self, config: &mut Config) -> String;
}

pub fn apply_set(
    registry: &SettingRegistry,
    key: &str,
    args: &[String],
    config: &mut Config,
) -> Result<String, SettingError> {
    let handler = registry
        .get(key)
        .ok_or_else(|| SettingError::UnknownKey(key.to_string()))?;
    handler.set(args, config)
}

pub fn apply_unset(
    registry: &SettingRegistry,
    key: &str,
    config: &mut Config,
) -> Result<String, SettingError> {
    let handler = registry
        .get(key)
        .ok_or_else(|| SettingError::UnknownKey(key.to_string()))?;
    Ok(handler.unset(config))
}

/// `refchat set KEY VALUE...`
pub fn set(key: &str, args: &[String]) -> Result<String, SettingError> {
    let registry = SettingRegistry::new();
    let mut message = String::new();
    mutate_config(|config| {
        message = apply_set(&registry, key, args, config)?;
        Ok(())
    })?;
    Ok(message)
}

/// `refchat unset KEY`
pub fn unset(key: &str) -> Result<String, SettingError> {
    let registry = SettingRegistry::new();
    let mut message = String::new();
    mutate_config(|config| {
        message = apply_unset(&registry, key, config)?;
        Ok(())
    })?;
    Ok(message)
}
