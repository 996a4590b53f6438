//! Core data models, spending state and the refresh machinery.

pub mod aggregator;
pub mod credentials;
pub mod currency;
pub mod http;
pub mod logging;
pub mod models;
pub mod notifications;
pub mod orchestrator;
pub mod provider;
pub mod resilience;
pub mod transform;

pub use aggregator::{SpendingAggregator, SpendingSnapshot};
pub use credentials::{CredentialStore, InMemoryCredentialStore, KeyringCredentialStore};
pub use currency::{ExchangeRateClient, ExchangeRateTable, convert, currency_symbol};
pub use models::{
    ConnectionStatus, ConvertedAmount, ProviderInvoiceItem, ProviderMonthlyInvoice,
    ProviderSession, ProviderSpendingData, ProviderTeamInfo, ProviderUsageData, ProviderUserInfo,
};
pub use notifications::{
    AlertKind, AlertScope, NotificationLimitState, NotificationSink, TracingNotificationSink,
};
pub use orchestrator::{
    CycleReport, FiredAlert, Orchestrator, RefreshPhase, RefreshReport, RefreshStatus,
};
pub use provider::Provider;
pub use resilience::{HealthState, ResilienceHealth, RetryExecutor, RetryPolicy};
