//! Storage for configuration and settings.

pub mod config;
pub mod paths;
pub mod settings;

pub use config::{
    Config, ENV_CONFIG, ENV_CURRENCY, ENV_PROVIDERS, ENV_REFRESH_MINUTES, ENV_UPPER_LIMIT,
    ENV_WARNING_LIMIT,
};
pub use paths::AppPaths;
pub use settings::{FileSettings, Settings, SettingsSource, StaticSettings};
