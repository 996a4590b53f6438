//! CLI argument parsing and command dispatch.

pub mod args;
pub mod convert;
pub mod login;
pub mod output;
pub mod refresh;
pub mod run;

use std::sync::Arc;

pub use args::{Cli, Commands, OutputFormat};
pub use output::OutputOptions;

use crate::core::aggregator::SpendingAggregator;
use crate::core::credentials::{CredentialStore, KeyringCredentialStore};
use crate::core::currency::ExchangeRateClient;
use crate::core::http::build_client;
use crate::core::notifications::TracingNotificationSink;
use crate::core::orchestrator::Orchestrator;
use crate::error::Result;
use crate::providers::ProviderRegistry;
use crate::storage::config::Config;
use crate::storage::settings::{FileSettings, Settings};

/// Everything a command needs, wired from the loaded config.
#[derive(Debug)]
pub struct App {
    pub config: Config,
    pub orchestrator: Arc<Orchestrator>,
    pub rates: ExchangeRateClient,
}

impl App {
    /// Wire production collaborators: keyring credentials, live config
    /// reload and HTTP clients for every provider.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn build(config: Config, refresh_override: Option<u64>) -> Result<Self> {
        Self::with_credentials(
            config,
            refresh_override,
            Arc::new(KeyringCredentialStore::default()),
        )
    }

    /// Same as [`Self::build`] with a caller-provided credential store.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn with_credentials(
        mut config: Config,
        refresh_override: Option<u64>,
        credentials: Arc<dyn CredentialStore>,
    ) -> Result<Self> {
        if let Some(minutes) = refresh_override {
            config.general.refresh_interval_minutes = minutes;
        }

        let http = build_client(config.timeout())?;
        let registry = ProviderRegistry::production(&http, |p| config.api_base(p));
        let settings = FileSettings::new(Config::config_path(), Settings::from(&config))
            .with_refresh_interval(refresh_override);

        let orchestrator = Orchestrator::new(
            Arc::new(SpendingAggregator::new()),
            credentials,
            Arc::new(settings),
            Arc::new(TracingNotificationSink),
            registry,
        );
        let rates = ExchangeRateClient::new(http, config.exchange_rates.url.clone());

        Ok(Self {
            config,
            orchestrator: Arc::new(orchestrator),
            rates,
        })
    }
}
