//! Settings read by the orchestrator at the start of every cycle.

use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;

use super::config::Config;
use crate::core::provider::Provider;

/// Per-cycle view of the user's settings.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub enabled_providers: Vec<Provider>,
    pub warning_limit_usd: f64,
    pub upper_limit_usd: f64,
    pub target_currency: String,
    pub refresh_interval_minutes: u64,
    pub alert_on_total: bool,
}

impl Settings {
    #[must_use]
    pub fn is_enabled(&self, provider: Provider) -> bool {
        self.enabled_providers.contains(&provider)
    }

    #[must_use]
    pub const fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_minutes.saturating_mul(60))
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for Settings {
    fn from(config: &Config) -> Self {
        Self {
            enabled_providers: config.enabled_providers(),
            warning_limit_usd: config.spending.warning_limit_usd,
            upper_limit_usd: config.spending.upper_limit_usd,
            target_currency: config.spending.target_currency.to_uppercase(),
            refresh_interval_minutes: config.general.refresh_interval_minutes,
            alert_on_total: config.spending.alert_on_total,
        }
    }
}

/// Source of the current settings.
pub trait SettingsSource: Send + Sync {
    fn current(&self) -> Settings;
}

/// Fixed settings.
#[derive(Debug, Clone, Default)]
pub struct StaticSettings(pub Settings);

impl SettingsSource for StaticSettings {
    fn current(&self) -> Settings {
        self.0.clone()
    }
}

/// Settings re-read from the config file on every call.
///
/// A file that fails to parse or validate is logged and the last good
/// settings are returned instead.
#[derive(Debug)]
pub struct FileSettings {
    path: PathBuf,
    last_good: Mutex<Settings>,
    refresh_override: Option<u64>,
}

impl FileSettings {
    /// Start from `initial` and reload from `path` on each read.
    #[must_use]
    pub fn new(path: PathBuf, initial: Settings) -> Self {
        Self {
            path,
            last_good: Mutex::new(initial),
            refresh_override: None,
        }
    }

    /// Pin the refresh interval regardless of the file.
    #[must_use]
    pub fn with_refresh_interval(mut self, minutes: Option<u64>) -> Self {
        self.refresh_override = minutes;
        self
    }

    fn reload(&self) -> crate::error::Result<Settings> {
        let mut config = Config::load_from(&self.path)?;
        config.apply_env_overrides()?;
        if let Some(minutes) = self.refresh_override {
            config.general.refresh_interval_minutes = minutes;
        }
        config.validate()?;
        Ok(Settings::from(&config))
    }
}

impl SettingsSource for FileSettings {
    fn current(&self) -> Settings {
        let mut last_good = self.last_good.lock().unwrap_or_else(PoisonError::into_inner);
        match self.reload() {
            Ok(settings) => {
                if *last_good != settings {
                    tracing::info!(path = %self.path.display(), "Settings changed");
                }
                last_good.clone_from(&settings);
                settings
            }
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Config reload failed, keeping previous settings"
                );
                last_good.clone()
            }
        }
    }
}
