use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Deserialize;

use gridcal_provider_sheets::SheetsConfig;

#[derive(Debug, Deserialize)]
pub struct Config {
    /// Database file; defaults to the platform data directory.
    pub db_path: Option<PathBuf>,

    /// Surface calls allowed per minute.
    #[serde(default = "default_quota")]
    pub quota_per_minute: usize,

    /// Weeks of instances generated for new recurring series.
    #[serde(default = "default_horizon_weeks")]
    pub horizon_weeks: u32,

    /// Weekly pages kept ahead during sync.
    #[serde(default = "default_future_weeks")]
    pub future_weeks: u32,

    /// Name of the template page duplicated for new weeks.
    #[serde(default = "default_template_page")]
    pub template_page: String,

    /// Spreadsheet surface credentials; without this section, commands
    /// that touch the external grid are unavailable.
    #[serde(default)]
    pub sheets: Option<SheetsConfig>,
}

fn default_quota() -> usize {
    gridcal_core::rate_limit::DEFAULT_QUOTA_PER_MINUTE
}

fn default_horizon_weeks() -> u32 {
    gridcal_core::recurrence::DEFAULT_HORIZON_WEEKS
}

fn default_future_weeks() -> u32 {
    gridcal_core::reconcile::DEFAULT_FUTURE_WEEKS
}

fn default_template_page() -> String {
    gridcal_core::reconcile::DEFAULT_TEMPLATE_PAGE.to_string()
}

/// Config file at ~/.config/gridcal/config.toml
pub fn config_path() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .context("Could not determine config directory")?
        .join("gridcal");
    Ok(config_dir.join("config.toml"))
}

/// Load the config file, falling back to defaults when it is absent.
pub fn load() -> Result<Config> {
    let path = config_path()?;
    let raw = match std::fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(e).with_context(|| format!("Failed to read {}", path.display())),
    };
    toml::from_str(&raw).with_context(|| format!("Invalid config at {}", path.display()))
}

/// Resolve the database path, creating parent directories.
pub fn database_path(config: &Config) -> Result<PathBuf> {
    let path = match &config.db_path {
        Some(path) => path.clone(),
        None => dirs::data_dir()
            .context("Could not determine data directory")?
            .join("gridcal")
            .join("gridcal.db"),
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    Ok(path)
}
