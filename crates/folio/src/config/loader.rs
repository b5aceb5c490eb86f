//! Configuration loading.

use std::path::PathBuf;

use super::{ConfigError, Settings};

/// Options for loading settings.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Explicit config file path (overrides auto-discovery).
    pub config_path: Option<PathBuf>,
}

/// Load settings according to the options.
///
/// An explicit path must exist and parse. Without one, prefer discovery is
/// used and any problem falls back to defaults with env overrides.
pub async fn load_settings_with_options(options: &LoadOptions) -> Result<Settings, ConfigError> {
    if let Some(ref config_path) = options.config_path {
        tracing::debug!("Loading config from {}", config_path.display());
        return Settings::load_from_path(config_path).await;
    }

    Ok(Settings::load().await)
}
