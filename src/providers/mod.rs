//! Vendor billing clients.
//!
//! Each provider has its own submodule implementing [`ProviderClient`]. The
//! orchestrator only ever sees trait objects from a [`ProviderRegistry`].

pub mod claude;
pub mod cursor;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;

use crate::core::models::{
    ProviderMonthlyInvoice, ProviderTeamInfo, ProviderUsageData, ProviderUserInfo,
};
pub use crate::core::provider::Provider;
use crate::error::Result;

pub use claude::ClaudeClient;
pub use cursor::CursorClient;

/// Authenticated billing API for one vendor.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    fn provider(&self) -> Provider;

    /// # Errors
    ///
    /// `NoTeamFound` when the account has no team; otherwise the classified
    /// HTTP error.
    async fn fetch_team_info(&self, credential: &str) -> Result<ProviderTeamInfo>;

    /// # Errors
    ///
    /// `Unauthorized` for an expired credential; otherwise the classified
    /// HTTP error.
    async fn fetch_user_info(&self, credential: &str) -> Result<ProviderUserInfo>;

    /// Invoice for a calendar month (1-12).
    ///
    /// # Errors
    ///
    /// The classified HTTP error, or `Decoding` for a malformed invoice.
    async fn fetch_monthly_invoice(
        &self,
        credential: &str,
        month: u32,
        year: i32,
        team_id: Option<i64>,
    ) -> Result<ProviderMonthlyInvoice>;

    /// # Errors
    ///
    /// The classified HTTP error.
    async fn fetch_usage_data(&self, credential: &str) -> Result<ProviderUsageData>;

    /// Whether the credential can fetch user info. Every error is `false`.
    async fn validate_credential(&self, credential: &str) -> bool {
        match self.fetch_user_info(credential).await {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!(provider = %self.provider(), error = %e, "Credential rejected");
                false
            }
        }
    }
}

/// Build the production client for a provider.
///
/// `api_base` overrides the vendor's default base URL.
#[must_use]
pub fn client_for(
    provider: Provider,
    http: Client,
    api_base: Option<&str>,
) -> Arc<dyn ProviderClient> {
    let base = api_base.unwrap_or_else(|| provider.default_api_base());
    match provider {
        Provider::Cursor => Arc::new(CursorClient::new(http, base)),
        Provider::Claude => Arc::new(ClaudeClient::new(http, base)),
    }
}

/// Provider clients keyed by provider.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    clients: HashMap<Provider, Arc<dyn ProviderClient>>,
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut providers: Vec<_> = self.clients.keys().collect();
        providers.sort();
        f.debug_struct("ProviderRegistry")
            .field("providers", &providers)
            .finish()
    }
}

impl ProviderRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with a production client for every provider.
    ///
    /// `api_base` returns the base URL override for a provider, if any.
    #[must_use]
    pub fn production<'a>(http: &Client, api_base: impl Fn(Provider) -> Option<&'a str>) -> Self {
        let mut registry = Self::new();
        for provider in Provider::ALL {
            registry.register(client_for(*provider, http.clone(), api_base(*provider)));
        }
        registry
    }

    /// Register a client, replacing any previous one for the same provider.
    pub fn register(&mut self, client: Arc<dyn ProviderClient>) {
        self.clients.insert(client.provider(), client);
    }

    #[must_use]
    pub fn get(&self, provider: Provider) -> Option<Arc<dyn ProviderClient>> {
        self.clients.get(&provider).cloned()
    }

    #[must_use]
    pub fn providers(&self) -> Vec<Provider> {
        let mut providers: Vec<_> = self.clients.keys().copied().collect();
        providers.sort();
        providers
    }
}
