//! Configuration module for solr-gateway
//!
//! Handles loading and validating settings from YAML files and environment variables.

mod settings;

pub use settings::*;

use anyhow::Result;
use once_cell::sync::OnceCell;
use std::path::Path;

/// Global settings instance
static SETTINGS: OnceCell<Settings> = OnceCell::new();

/// Install `settings` as the process-wide configuration
pub fn init(settings: Settings) -> Result<()> {
    settings.validate()?;
    SETTINGS
        .set(settings)
        .map_err(|_| anyhow::anyhow!("Settings already initialized"))?;
    Ok(())
}

/// Initialize global settings from a file, applying environment overrides
pub fn init_from_file<P: AsRef<Path>>(path: P) -> Result<()> {
    let mut settings = Settings::from_file(path)?;
    settings.merge_env();
    init(settings)
}

/// Initialize global settings with defaults and environment overrides
pub fn init_default() -> Result<()> {
    let mut settings = Settings::default();
    settings.merge_env();
    init(settings)
}

/// Get a reference to the global settings
///
/// # Panics
///
/// Panics if none of the `init` functions was called.
pub fn get() -> &'static Settings {
    SETTINGS.get().expect("Settings not initialized")
}

/// Check if settings have been initialized
pub fn is_initialized() -> bool {
    SETTINGS.get().is_some()
}
