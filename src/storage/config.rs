//! Configuration file loading and management.
//!
//! Loads configuration from:
//! - Linux: `~/.config/spendbar/config.toml`
//! - macOS: `~/Library/Application Support/com.spendbar.spendbar/config.toml`
//! - Windows: `%APPDATA%/spendbar/config/config.toml`
//!
//! ## Precedence
//!
//! Settings are resolved with the following precedence (highest first):
//! 1. CLI flags
//! 2. Environment variables
//! 3. Config file
//! 4. Built-in defaults
//!
//! ## Environment Variables
//!
//! - `SPENDBAR_CONFIG`: Override config file path
//! - `SPENDBAR_PROVIDERS`: Comma-separated enabled providers (e.g., "cursor,claude")
//! - `SPENDBAR_CURRENCY`: Display currency code
//! - `SPENDBAR_WARNING_LIMIT`: Warning limit in USD
//! - `SPENDBAR_UPPER_LIMIT`: Upper limit in USD
//! - `SPENDBAR_REFRESH_MINUTES`: Poll interval in minutes

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::AppPaths;
use crate::core::currency::{DEFAULT_RATES_URL, is_valid_code};
use crate::core::http::DEFAULT_TIMEOUT;
use crate::core::logging::LogLevel;
use crate::core::provider::Provider;
use crate::error::{Result, SpendError};

// =============================================================================
// Environment Variables
// =============================================================================

/// Override config file path.
pub const ENV_CONFIG: &str = "SPENDBAR_CONFIG";
/// Comma-separated enabled providers.
pub const ENV_PROVIDERS: &str = "SPENDBAR_PROVIDERS";
/// Display currency.
pub const ENV_CURRENCY: &str = "SPENDBAR_CURRENCY";
/// Warning limit in USD.
pub const ENV_WARNING_LIMIT: &str = "SPENDBAR_WARNING_LIMIT";
/// Upper limit in USD.
pub const ENV_UPPER_LIMIT: &str = "SPENDBAR_UPPER_LIMIT";
/// Poll interval in minutes.
pub const ENV_REFRESH_MINUTES: &str = "SPENDBAR_REFRESH_MINUTES";

// =============================================================================
// File Model
// =============================================================================

/// Application configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,
    pub providers: ProvidersConfig,
    pub spending: SpendingConfig,
    pub exchange_rates: ExchangeRatesConfig,
}

/// General application settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Minutes between refresh cycles.
    pub refresh_interval_minutes: u64,
    /// Timeout for network requests in seconds.
    pub timeout_seconds: u64,
    /// Default log level (error, warn, info, debug, trace).
    pub log_level: Option<String>,
}

/// Provider selection and overrides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    /// Providers polled each cycle.
    pub enabled: Vec<String>,
    pub cursor: ProviderSettings,
    pub claude: ProviderSettings,
}

/// Settings for a specific provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    /// Custom API base URL (if different from default).
    pub api_base: Option<String>,
}

/// Limits and display currency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpendingConfig {
    /// Warning limit in USD. Zero disables it.
    pub warning_limit_usd: f64,
    /// Upper limit in USD. Zero disables it.
    pub upper_limit_usd: f64,
    /// ISO 4217 display currency.
    pub target_currency: String,
    /// Also alert on the cross-provider total.
    pub alert_on_total: bool,
}

/// Exchange rate feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExchangeRatesConfig {
    pub url: String,
    pub refresh_interval_minutes: u64,
    pub max_age_hours: u64,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            refresh_interval_minutes: 5,
            timeout_seconds: DEFAULT_TIMEOUT.as_secs(),
            log_level: None,
        }
    }
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            enabled: Provider::ALL
                .iter()
                .map(|p| p.cli_name().to_string())
                .collect(),
            cursor: ProviderSettings::default(),
            claude: ProviderSettings::default(),
        }
    }
}

impl Default for SpendingConfig {
    fn default() -> Self {
        Self {
            warning_limit_usd: 200.0,
            upper_limit_usd: 1000.0,
            target_currency: "USD".to_string(),
            alert_on_total: false,
        }
    }
}

impl Default for ExchangeRatesConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_RATES_URL.to_string(),
            refresh_interval_minutes: 240,
            max_age_hours: 24,
        }
    }
}

// =============================================================================
// Loading
// =============================================================================

impl Config {
    /// Load from the resolved config path with environment overrides applied.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but is invalid, or an override or
    /// the final configuration fails validation.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::config_path())?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific path.
    ///
    /// Returns default config if the file doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns `ConfigParse` if the file exists but is not valid TOML for
    /// this schema.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(?path, "Config file not found, using defaults");
            return Ok(Self::default());
        }

        tracing::debug!(?path, "Loading config file");
        let content = fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| SpendError::ConfigParse {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// Save configuration to a specific path.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or file cannot be written.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| SpendError::Config(format!("Failed to serialize config: {e}")))?;

        fs::write(path, content)?;
        tracing::debug!(?path, "Config file saved");
        Ok(())
    }

    /// Config file path, honoring `SPENDBAR_CONFIG`.
    #[must_use]
    pub fn config_path() -> PathBuf {
        std::env::var(ENV_CONFIG)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .map_or_else(|| AppPaths::new().config_file(), PathBuf::from)
    }

    /// Apply `SPENDBAR_*` environment overrides.
    ///
    /// # Errors
    ///
    /// Returns `ConfigInvalid` for an override that does not parse.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary lookup.
    ///
    /// # Errors
    ///
    /// Returns `ConfigInvalid` for an override that does not parse.
    pub fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(list) = get(ENV_PROVIDERS) {
            self.providers.enabled = list
                .split(',')
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Some(currency) = get(ENV_CURRENCY) {
            self.spending.target_currency = currency.to_uppercase();
        }
        if let Some(raw) = get(ENV_WARNING_LIMIT) {
            self.spending.warning_limit_usd = parse_override(ENV_WARNING_LIMIT, &raw)?;
        }
        if let Some(raw) = get(ENV_UPPER_LIMIT) {
            self.spending.upper_limit_usd = parse_override(ENV_UPPER_LIMIT, &raw)?;
        }
        if let Some(raw) = get(ENV_REFRESH_MINUTES) {
            self.general.refresh_interval_minutes = parse_override(ENV_REFRESH_MINUTES, &raw)?;
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Validation
    // -------------------------------------------------------------------------

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigInvalid` naming the first offending key.
    pub fn validate(&self) -> Result<()> {
        let valid_providers = Provider::ALL
            .iter()
            .map(|provider| provider.cli_name())
            .collect::<Vec<_>>()
            .join(", ");

        for name in &self.providers.enabled {
            Provider::from_cli_name(name).map_err(|_| {
                invalid(
                    "providers.enabled",
                    name,
                    format!("unknown provider, valid providers: {valid_providers}"),
                )
            })?;
        }

        if self.general.refresh_interval_minutes == 0 {
            return Err(invalid(
                "general.refresh_interval_minutes",
                "0",
                "must be at least 1 minute",
            ));
        }

        if self.general.timeout_seconds == 0 || self.general.timeout_seconds > 300 {
            return Err(invalid(
                "general.timeout_seconds",
                &self.general.timeout_seconds.to_string(),
                "must be between 1 and 300 seconds",
            ));
        }

        if let Some(level) = &self.general.log_level
            && LogLevel::from_arg(level).is_none()
        {
            return Err(invalid(
                "general.log_level",
                level,
                "expected one of error, warn, info, debug, trace",
            ));
        }

        if !is_valid_code(&self.spending.target_currency) {
            return Err(invalid(
                "spending.target_currency",
                &self.spending.target_currency,
                "expected a three-letter currency code",
            ));
        }

        let warning = self.spending.warning_limit_usd;
        let upper = self.spending.upper_limit_usd;
        for (key, value) in [
            ("spending.warning_limit_usd", warning),
            ("spending.upper_limit_usd", upper),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(invalid(key, &value.to_string(), "must be zero or positive"));
            }
        }
        if warning > 0.0 && upper > 0.0 && warning > upper {
            return Err(invalid(
                "spending.warning_limit_usd",
                &warning.to_string(),
                format!("must not exceed the upper limit ({upper})"),
            ));
        }

        if self.exchange_rates.refresh_interval_minutes == 0 {
            return Err(invalid(
                "exchange_rates.refresh_interval_minutes",
                "0",
                "must be at least 1 minute",
            ));
        }
        if self.exchange_rates.max_age_hours == 0 {
            return Err(invalid(
                "exchange_rates.max_age_hours",
                "0",
                "must be at least 1 hour",
            ));
        }

        Ok(())
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    /// Enabled providers, deduplicated, in configured order. Unknown names
    /// are skipped; `validate` reports them.
    #[must_use]
    pub fn enabled_providers(&self) -> Vec<Provider> {
        let mut out = Vec::new();
        for provider in self
            .providers
            .enabled
            .iter()
            .filter_map(|name| Provider::from_cli_name(name).ok())
        {
            if !out.contains(&provider) {
                out.push(provider);
            }
        }
        out
    }

    #[must_use]
    pub fn api_base(&self, provider: Provider) -> Option<&str> {
        let settings = match provider {
            Provider::Cursor => &self.providers.cursor,
            Provider::Claude => &self.providers.claude,
        };
        settings.api_base.as_deref()
    }

    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.general.timeout_seconds)
    }

    #[must_use]
    pub fn log_level(&self) -> Option<LogLevel> {
        self.general.log_level.as_deref().and_then(LogLevel::from_arg)
    }

    #[must_use]
    pub const fn rates_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.exchange_rates.refresh_interval_minutes * 60)
    }

    #[must_use]
    pub const fn rates_max_age(&self) -> Duration {
        Duration::from_secs(self.exchange_rates.max_age_hours * 60 * 60)
    }
}

fn parse_override<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.parse()
        .map_err(|_| invalid(key, raw, "could not be parsed"))
}

fn invalid(key: &str, value: &str, message: impl Into<String>) -> SpendError {
    SpendError::ConfigInvalid {
        key: key.to_string(),
        value: value.to_string(),
        message: message.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.general.refresh_interval_minutes, 5);
        assert_eq!(config.timeout(), Duration::from_secs(30));
        assert_eq!(config.enabled_providers(), Provider::ALL.to_vec());
        assert_eq!(config.spending.target_currency, "USD");
        assert!(!config.spending.alert_on_total);
    }

    #[test]
    fn load_missing_file_returns_default() {
        let config = Config::load_from(Path::new("/nonexistent/path/config.toml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn load_valid_toml() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[general]
refresh_interval_minutes = 10
log_level = "debug"

[providers]
enabled = ["cursor"]

[providers.cursor]
api_base = "http://localhost:9000"

[spending]
warning_limit_usd = 50.0
upper_limit_usd = 80.0
target_currency = "EUR"
alert_on_total = true
"#
        )
        .unwrap();

        let config = Config::load_from(file.path()).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.general.refresh_interval_minutes, 10);
        assert_eq!(config.log_level(), Some(LogLevel::Debug));
        assert_eq!(config.enabled_providers(), vec![Provider::Cursor]);
        assert_eq!(config.api_base(Provider::Cursor), Some("http://localhost:9000"));
        assert_eq!(config.api_base(Provider::Claude), None);
        assert_eq!(config.spending.target_currency, "EUR");
        assert!(config.spending.alert_on_total);
        // untouched sections keep defaults
        assert_eq!(config.exchange_rates, ExchangeRatesConfig::default());
    }

    #[test]
    fn load_invalid_toml_returns_parse_error() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[general\nrefresh_interval_minutes = ").unwrap();
        let err = Config::load_from(file.path()).unwrap_err();
        assert!(matches!(err, SpendError::ConfigParse { .. }));
    }

    #[test]
    fn roundtrip_save_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut config = Config::default();
        config.spending.warning_limit_usd = 12.5;
        config.providers.claude.api_base = Some("http://127.0.0.1:1".to_string());
        config.save_to(&path).unwrap();

        assert_eq!(Config::load_from(&path).unwrap(), config);
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let config: Config = toml::from_str(
            r#"
[general]
timeout_seconds = 12
future_flag = true

[spending]
target_currency = "GBP"
"#,
        )
        .unwrap();
        assert_eq!(config.general.timeout_seconds, 12);
        assert_eq!(config.spending.target_currency, "GBP");
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = Config::default();
        config
            .apply_overrides_from(lookup(&[
                (ENV_PROVIDERS, "Claude, ,cursor"),
                (ENV_CURRENCY, "eur"),
                (ENV_WARNING_LIMIT, "25"),
                (ENV_UPPER_LIMIT, "75.5"),
                (ENV_REFRESH_MINUTES, "15"),
            ]))
            .unwrap();

        assert_eq!(
            config.enabled_providers(),
            vec![Provider::Claude, Provider::Cursor]
        );
        assert_eq!(config.spending.target_currency, "EUR");
        assert!((config.spending.warning_limit_usd - 25.0).abs() < f64::EPSILON);
        assert!((config.spending.upper_limit_usd - 75.5).abs() < f64::EPSILON);
        assert_eq!(config.general.refresh_interval_minutes, 15);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn blank_env_values_are_ignored() {
        let mut config = Config::default();
        config
            .apply_overrides_from(lookup(&[(ENV_CURRENCY, "  "), (ENV_PROVIDERS, "")]))
            .unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn unparsable_override_names_the_key() {
        let mut config = Config::default();
        let err = config
            .apply_overrides_from(lookup(&[(ENV_REFRESH_MINUTES, "soon")]))
            .unwrap_err();
        assert!(matches!(
            err,
            SpendError::ConfigInvalid { ref key, ref value, .. }
                if key == ENV_REFRESH_MINUTES && value == "soon"
        ));
    }

    #[test]
    fn validate_rejects_unknown_provider() {
        let mut config = Config::default();
        config.providers.enabled = vec!["codex".to_string()];
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("codex"));
    }

    #[test]
    fn validate_rejects_bad_currency() {
        let mut config = Config::default();
        config.spending.target_currency = "EURO".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_inverted_or_negative_limits() {
        let mut config = Config::default();
        config.spending.warning_limit_usd = 500.0;
        config.spending.upper_limit_usd = 100.0;
        assert!(config.validate().is_err());

        config.spending.warning_limit_usd = -1.0;
        assert!(config.validate().is_err());

        // a disabled upper limit does not constrain the warning limit
        config.spending.warning_limit_usd = 500.0;
        config.spending.upper_limit_usd = 0.0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_boundary_timeout() {
        let mut config = Config::default();
        config.general.timeout_seconds = 1;
        assert!(config.validate().is_ok());

        config.general.timeout_seconds = 300;
        assert!(config.validate().is_ok());

        config.general.timeout_seconds = 301;
        assert!(config.validate().is_err());

        config.general.timeout_seconds = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_intervals_and_bad_log_level() {
        let mut config = Config::default();
        config.general.refresh_interval_minutes = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.exchange_rates.max_age_hours = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.general.log_level = Some("chatty".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn duplicate_providers_are_collapsed() {
        let mut config = Config::default();
        config.providers.enabled = vec!["cursor".into(), "CURSOR".into()];
        assert_eq!(config.enabled_providers(), vec![Provider::Cursor]);
    }

    #[test]
    fn durations_are_derived() {
        let config = Config::default();
        assert_eq!(config.rates_refresh_interval(), Duration::from_secs(240 * 60));
        assert_eq!(config.rates_max_age(), Duration::from_secs(24 * 3600));
    }
}
