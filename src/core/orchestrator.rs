//! Refresh cycle orchestration.
//!
//! For every enabled provider with a stored credential the orchestrator runs
//! an auth phase (team and user info) and a fetch phase (invoice and usage)
//! through that provider's [`RetryExecutor`], writes the results into the
//! [`SpendingAggregator`], then evaluates spending thresholds once all
//! providers have finished.
//!
//! Each provider has its own refresh lock and cancellation token. A trigger
//! that arrives while a cycle is in flight waits for it and reuses its
//! outcome. A cancelled cycle never writes to the aggregator.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Datelike, Utc};
use futures::future::join_all;
use serde::Serialize;
use tokio::sync::{Notify, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::aggregator::SpendingAggregator;
use super::credentials::CredentialStore;
use super::currency::{ExchangeRateClient, ExchangeRateTable};
use super::models::{ConnectionStatus, ProviderMonthlyInvoice};
use super::notifications::{AlertKind, AlertScope, NotificationLimitState, NotificationSink};
use super::provider::Provider;
use super::resilience::{ResilienceHealth, RetryExecutor, RetryPolicy};
use crate::error::{Result, SpendError};
use crate::providers::{ProviderClient, ProviderRegistry};
use crate::storage::settings::{Settings, SettingsSource};

/// Back-off used when a rate limit carries no retry-after hint.
const DEFAULT_RATE_LIMIT_BACKOFF: Duration = Duration::from_secs(60);

// =============================================================================
// Reports
// =============================================================================

/// Where a provider's refresh currently is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RefreshPhase {
    #[default]
    Idle,
    Authenticating,
    Fetching,
    Succeeded,
    Failed,
}

/// How a provider's refresh ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "result")]
pub enum RefreshStatus {
    Succeeded,
    Failed { message: String },
    RateLimited { until: DateTime<Utc> },
    NotLoggedIn,
    Disabled,
    Cancelled,
}

/// Outcome of one provider refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshReport {
    pub provider: Provider,
    pub status: RefreshStatus,
    /// True when this trigger reused an in-flight cycle's outcome.
    pub coalesced: bool,
}

impl RefreshReport {
    const fn new(provider: Provider, status: RefreshStatus) -> Self {
        Self {
            provider,
            status,
            coalesced: false,
        }
    }

    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self.status, RefreshStatus::Succeeded)
    }
}

/// A threshold alert delivered to the sink.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FiredAlert {
    #[serde(skip)]
    pub scope: AlertScope,
    pub scope_label: String,
    pub kind: AlertKind,
    pub spending: f64,
    pub limit: f64,
    pub currency: String,
}

/// Outcome of a full cycle over every enabled provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleReport {
    pub reports: Vec<RefreshReport>,
    pub alerts: Vec<FiredAlert>,
}

// =============================================================================
// Orchestrator
// =============================================================================

/// Drives refresh cycles for all providers.
pub struct Orchestrator {
    aggregator: Arc<SpendingAggregator>,
    credentials: Arc<dyn CredentialStore>,
    settings: Arc<dyn SettingsSource>,
    sink: Arc<dyn NotificationSink>,
    registry: ProviderRegistry,
    executors: HashMap<Provider, RetryExecutor>,
    rates: RwLock<ExchangeRateTable>,
    limits: Mutex<NotificationLimitState>,
    last_enabled: Mutex<Vec<Provider>>,
    refresh_locks: HashMap<Provider, tokio::sync::Mutex<Option<RefreshReport>>>,
    phases: Mutex<HashMap<Provider, RefreshPhase>>,
    root_token: CancellationToken,
    provider_tokens: Mutex<HashMap<Provider, CancellationToken>>,
    trigger: Notify,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("registry", &self.registry)
            .field("cancelled", &self.root_token.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Create an orchestrator with the default retry policy.
    #[must_use]
    pub fn new(
        aggregator: Arc<SpendingAggregator>,
        credentials: Arc<dyn CredentialStore>,
        settings: Arc<dyn SettingsSource>,
        sink: Arc<dyn NotificationSink>,
        registry: ProviderRegistry,
    ) -> Self {
        let root_token = CancellationToken::new();
        let provider_tokens = Provider::ALL
            .iter()
            .map(|p| (*p, root_token.child_token()))
            .collect();
        let refresh_locks = Provider::ALL
            .iter()
            .map(|p| (*p, tokio::sync::Mutex::new(None)))
            .collect();

        Self {
            aggregator,
            credentials,
            settings,
            sink,
            registry,
            executors: executors_for(&RetryPolicy::default()),
            rates: RwLock::new(ExchangeRateTable::default()),
            limits: Mutex::new(NotificationLimitState::new()),
            last_enabled: Mutex::new(Vec::new()),
            refresh_locks,
            phases: Mutex::new(HashMap::new()),
            root_token,
            provider_tokens: Mutex::new(provider_tokens),
            trigger: Notify::new(),
        }
    }

    /// Replace the retry policy for every provider.
    #[must_use]
    pub fn with_retry_policy(mut self, policy: &RetryPolicy) -> Self {
        self.executors = executors_for(policy);
        self
    }

    #[must_use]
    pub fn aggregator(&self) -> &Arc<SpendingAggregator> {
        &self.aggregator
    }

    /// Settings as they read right now.
    #[must_use]
    pub fn settings(&self) -> Settings {
        self.settings.current()
    }

    /// Current refresh phase of a provider.
    #[must_use]
    pub fn phase(&self, provider: Provider) -> RefreshPhase {
        lock(&self.phases)
            .get(&provider)
            .copied()
            .unwrap_or_default()
    }

    /// Retry health for a provider.
    #[must_use]
    pub fn health(&self, provider: Provider) -> Option<ResilienceHealth> {
        self.executors.get(&provider).map(RetryExecutor::health)
    }

    // -------------------------------------------------------------------------
    // Cycles
    // -------------------------------------------------------------------------

    /// Refresh every enabled provider concurrently, then evaluate thresholds.
    pub async fn refresh_all(self: &Arc<Self>) -> CycleReport {
        let settings = self.settings.current();
        for provider in self.dropped_providers(&settings) {
            self.disable_provider(provider).await;
        }
        let rates = self.rates.read().await.rates_by_code.clone();
        self.aggregator
            .set_limits(
                settings.warning_limit_usd,
                settings.upper_limit_usd,
                &rates,
                &settings.target_currency,
            )
            .await;

        let handles: Vec<JoinHandle<RefreshReport>> = settings
            .enabled_providers
            .iter()
            .map(|&provider| {
                let this = Arc::clone(self);
                tokio::spawn(async move { this.refresh_provider(provider).await })
            })
            .collect();

        let reports: Vec<RefreshReport> = join_all(handles)
            .await
            .into_iter()
            .filter_map(|joined| match joined {
                Ok(report) => Some(report),
                Err(e) => {
                    tracing::error!(error = %e, "Provider refresh task failed");
                    None
                }
            })
            .collect();

        let alerts = if self.root_token.is_cancelled() {
            Vec::new()
        } else {
            self.evaluate_thresholds(&settings).await
        };

        tracing::info!(
            providers = reports.len(),
            succeeded = reports.iter().filter(|r| r.is_success()).count(),
            alerts = alerts.len(),
            "Refresh cycle complete"
        );

        CycleReport { reports, alerts }
    }

    /// Providers enabled last cycle that `settings` no longer enables.
    fn dropped_providers(&self, settings: &Settings) -> Vec<Provider> {
        let mut last = lock(&self.last_enabled);
        let dropped = last
            .iter()
            .copied()
            .filter(|p| !settings.is_enabled(*p))
            .collect();
        last.clone_from(&settings.enabled_providers);
        dropped
    }

    /// Refresh one provider, coalescing with a cycle already in flight.
    pub async fn refresh_provider(&self, provider: Provider) -> RefreshReport {
        let Some(refresh_lock) = self.refresh_locks.get(&provider) else {
            return RefreshReport::new(provider, RefreshStatus::Disabled);
        };

        let mut guard = if let Ok(guard) = refresh_lock.try_lock() {
            guard
        } else {
            tracing::debug!(provider = %provider, "Refresh in flight, waiting for its outcome");
            let finished = refresh_lock.lock().await;
            let mut report = finished
                .clone()
                .unwrap_or_else(|| RefreshReport::new(provider, RefreshStatus::Cancelled));
            report.coalesced = true;
            return report;
        };

        let report = self.run_cycle(provider).await;
        *guard = Some(report.clone());
        report
    }

    /// Refresh one provider after any cycle in flight has finished, never
    /// reusing its outcome.
    async fn refresh_provider_now(&self, provider: Provider) -> RefreshReport {
        let Some(refresh_lock) = self.refresh_locks.get(&provider) else {
            return RefreshReport::new(provider, RefreshStatus::Disabled);
        };
        let mut guard = refresh_lock.lock().await;
        let report = self.run_cycle(provider).await;
        *guard = Some(report.clone());
        report
    }

    async fn run_cycle(&self, provider: Provider) -> RefreshReport {
        let settings = self.settings.current();
        if !settings.is_enabled(provider) {
            return RefreshReport::new(provider, RefreshStatus::Disabled);
        }
        let Some(client) = self.registry.get(provider) else {
            tracing::warn!(provider = %provider, "No client registered");
            return RefreshReport::new(provider, RefreshStatus::Disabled);
        };

        let token = self.token(provider);
        if token.is_cancelled() {
            return RefreshReport::new(provider, RefreshStatus::Cancelled);
        }

        let credential = match self.credentials.get(provider) {
            Ok(Some(credential)) => credential,
            Ok(None) => {
                self.aggregator
                    .set_status(provider, ConnectionStatus::Disconnected)
                    .await;
                return RefreshReport::new(provider, RefreshStatus::NotLoggedIn);
            }
            Err(e) => {
                tracing::warn!(provider = %provider, error = %e, "Credential lookup failed");
                let message = e.status_message();
                self.aggregator.set_error(provider, message.clone()).await;
                return RefreshReport::new(provider, RefreshStatus::Failed { message });
            }
        };

        tokio::select! {
            biased;
            () = token.cancelled() => {
                tracing::info!(provider = %provider, "Refresh cancelled");
                self.set_phase(provider, RefreshPhase::Idle);
                RefreshReport::new(provider, RefreshStatus::Cancelled)
            }
            report = self.fetch_all(provider, client.as_ref(), &credential, &settings, &token) => report,
        }
    }

    async fn fetch_all(
        &self,
        provider: Provider,
        client: &dyn ProviderClient,
        credential: &str,
        settings: &Settings,
        token: &CancellationToken,
    ) -> RefreshReport {
        let cancelled = || RefreshReport::new(provider, RefreshStatus::Cancelled);
        let Some(executor) = self.executors.get(&provider) else {
            return RefreshReport::new(provider, RefreshStatus::Disabled);
        };

        let previous = self
            .aggregator
            .spending(provider)
            .await
            .map(|data| data.connection_status)
            .unwrap_or_default();
        if token.is_cancelled() {
            return cancelled();
        }
        self.aggregator
            .set_status(provider, previous.refreshing())
            .await;

        // Auth phase
        self.set_phase(provider, RefreshPhase::Authenticating);
        let (team, user) = tokio::join!(
            executor.execute("fetch_team_info", || client.fetch_team_info(credential)),
            executor.execute("fetch_user_info", || client.fetch_user_info(credential)),
        );
        if token.is_cancelled() {
            return cancelled();
        }

        let team = match team {
            Ok(team) => Some(team),
            Err(SpendError::NoTeamFound { .. }) => {
                tracing::debug!(provider = %provider, "Account has no team");
                None
            }
            Err(SpendError::Unauthorized { .. }) => return self.unauthorized(provider).await,
            Err(e) => {
                tracing::warn!(provider = %provider, error = %e, "Team lookup failed, continuing");
                None
            }
        };
        let user = match user {
            Ok(user) => user,
            Err(e) => return self.fail(provider, &e).await,
        };

        let team_id = team.as_ref().map(|t| t.id).or(user.team_id);
        self.aggregator
            .update_session(
                provider,
                team_id,
                team.map(|t| t.name),
                Some(user.email),
            )
            .await;

        // Fetch phase
        self.set_phase(provider, RefreshPhase::Fetching);
        let now = Utc::now();
        let (invoice, usage) = tokio::join!(
            executor.execute("fetch_monthly_invoice", || {
                client.fetch_monthly_invoice(credential, now.month(), now.year(), team_id)
            }),
            executor.execute("fetch_usage_data", || client.fetch_usage_data(credential)),
        );
        if token.is_cancelled() {
            return cancelled();
        }

        match usage {
            Ok(usage) => self.aggregator.update_usage(provider, usage).await,
            Err(SpendError::Unauthorized { .. }) => return self.unauthorized(provider).await,
            Err(e) => {
                tracing::warn!(provider = %provider, error = %e, "Usage fetch failed, continuing");
            }
        }

        match invoice {
            Ok(invoice) => self.succeed(provider, &invoice, settings).await,
            Err(e) => self.fail(provider, &e).await,
        }
    }

    async fn succeed(
        &self,
        provider: Provider,
        invoice: &ProviderMonthlyInvoice,
        settings: &Settings,
    ) -> RefreshReport {
        let rates = self.rates.read().await.rates_by_code.clone();
        self.aggregator
            .update_spending(provider, invoice, &rates, &settings.target_currency)
            .await;
        self.aggregator
            .set_status(provider, ConnectionStatus::Connected)
            .await;
        self.set_phase(provider, RefreshPhase::Succeeded);

        tracing::info!(
            provider = %provider,
            spending_usd = invoice.total_usd(),
            month = invoice.month,
            year = invoice.year,
            "Provider refreshed"
        );
        RefreshReport::new(provider, RefreshStatus::Succeeded)
    }

    async fn fail(&self, provider: Provider, err: &SpendError) -> RefreshReport {
        if matches!(err, SpendError::Unauthorized { .. }) {
            return self.unauthorized(provider).await;
        }
        self.set_phase(provider, RefreshPhase::Failed);

        if let SpendError::RateLimited { retry_after, .. } = err {
            let wait = retry_after.unwrap_or(DEFAULT_RATE_LIMIT_BACKOFF);
            let until = Utc::now()
                + chrono::Duration::from_std(wait).unwrap_or_else(|_| chrono::Duration::minutes(1));
            tracing::warn!(provider = %provider, %until, "Rate limited");
            self.aggregator
                .set_status(provider, ConnectionStatus::RateLimited { until })
                .await;
            return RefreshReport::new(provider, RefreshStatus::RateLimited { until });
        }

        tracing::warn!(
            provider = %provider,
            error = %err,
            code = err.error_code(),
            "Provider refresh failed"
        );
        let message = err.status_message();
        self.aggregator.set_error(provider, message.clone()).await;
        RefreshReport::new(provider, RefreshStatus::Failed { message })
    }

    async fn unauthorized(&self, provider: Provider) -> RefreshReport {
        self.set_phase(provider, RefreshPhase::Failed);
        let message = SpendError::Unauthorized { provider }.status_message();
        tracing::warn!(provider = %provider, "Credential rejected, session deactivated");
        self.aggregator.deactivate_session(provider).await;
        self.aggregator.set_error(provider, message.clone()).await;
        RefreshReport::new(provider, RefreshStatus::Failed { message })
    }

    // -------------------------------------------------------------------------
    // Thresholds
    // -------------------------------------------------------------------------

    /// Compare fresh totals against the limits and notify the sink.
    ///
    /// Limits are compared in USD; the sink receives display-currency amounts.
    async fn evaluate_thresholds(&self, settings: &Settings) -> Vec<FiredAlert> {
        let table = self.rates.read().await.clone();
        let snapshot = self.aggregator.snapshot().await;

        let mut crossed = Vec::new();
        {
            let mut limits = lock(&self.limits);
            for data in snapshot.providers.values() {
                if !settings.is_enabled(data.provider) || !data.contributes_to_total() {
                    continue;
                }
                let spend = data.spending_usd.unwrap_or(0.0);
                let scope = AlertScope::Provider(data.provider);
                if let Some(kind) = limits.evaluate(
                    scope,
                    spend,
                    settings.warning_limit_usd,
                    settings.upper_limit_usd,
                ) {
                    crossed.push((scope, kind, spend));
                }
            }

            if settings.alert_on_total {
                let total = snapshot.total_usd();
                if let Some(kind) = limits.evaluate(
                    AlertScope::Total,
                    total,
                    settings.warning_limit_usd,
                    settings.upper_limit_usd,
                ) {
                    crossed.push((AlertScope::Total, kind, total));
                }
            }
        }

        crossed
            .into_iter()
            .map(|(scope, kind, spend_usd)| {
                let limit_usd = match kind {
                    AlertKind::Warning => settings.warning_limit_usd,
                    AlertKind::Upper => settings.upper_limit_usd,
                };
                let (spending, currency) =
                    table.from_usd_or_fallback(spend_usd, &settings.target_currency);
                let (limit, _) = table.from_usd_or_fallback(limit_usd, &currency);

                tracing::info!(scope = %scope, ?kind, spending, limit, %currency, "Spending limit reached");
                self.sink.notify(kind, scope, spending, limit, &currency);

                FiredAlert {
                    scope,
                    scope_label: scope.to_string(),
                    kind,
                    spending,
                    limit,
                    currency,
                }
            })
            .collect()
    }

    /// Clear every "already notified" flag.
    pub fn reset_notifications(&self) {
        lock(&self.limits).reset_all();
    }

    // -------------------------------------------------------------------------
    // Login
    // -------------------------------------------------------------------------

    /// Accept a credential from the login flow.
    ///
    /// Validates and stores it, then cancels any cycle still running with the
    /// old credential. A fresh session with cleared alert flags follows, and
    /// the returned report comes from a new refresh, never a coalesced one.
    ///
    /// # Errors
    ///
    /// `Unauthorized` when the provider rejects the credential, or a
    /// credential store error.
    pub async fn on_login_success(
        &self,
        provider: Provider,
        credential: &str,
    ) -> Result<RefreshReport> {
        let client = self
            .registry
            .get(provider)
            .ok_or_else(|| SpendError::InvalidProvider(provider.cli_name().to_string()))?;

        let credential = credential.trim();
        if credential.is_empty() || !client.validate_credential(credential).await {
            self.on_login_failure(provider, "credential was rejected").await;
            return Err(SpendError::Unauthorized { provider });
        }

        self.credentials.set(provider, credential)?;
        // A cycle still running holds the old credential.
        self.cancel_in_flight(provider).await;
        self.aggregator.start_session(provider).await;
        lock(&self.limits).reset(AlertScope::Provider(provider));
        tracing::info!(provider = %provider, "Logged in");

        Ok(self.refresh_provider_now(provider).await)
    }

    /// Record a failed login attempt.
    pub async fn on_login_failure(&self, provider: Provider, error: &str) {
        tracing::warn!(provider = %provider, error, "Login failed");
        self.aggregator
            .set_error(provider, format!("Login failed: {error}"))
            .await;
    }

    /// Forget the credential and all state for a provider.
    ///
    /// # Errors
    ///
    /// Returns a credential store error if the credential cannot be deleted.
    pub async fn logout(&self, provider: Provider) -> Result<()> {
        self.cancel_in_flight(provider).await;
        self.credentials.delete(provider)?;
        self.aggregator.end_session(provider).await;
        lock(&self.limits).reset(AlertScope::Provider(provider));
        tracing::info!(provider = %provider, "Logged out");
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Cancellation
    // -------------------------------------------------------------------------

    /// Cancel any in-flight refresh, drop the provider's spend and mark it
    /// disconnected.
    pub async fn disable_provider(&self, provider: Provider) {
        self.cancel_in_flight(provider).await;
        self.aggregator.clear_spending(provider).await;
        tracing::info!(provider = %provider, "Provider disabled");
    }

    async fn cancel_in_flight(&self, provider: Provider) {
        self.token(provider).cancel();
        if let Some(refresh_lock) = self.refresh_locks.get(&provider) {
            // Wait for the cancelled cycle to unwind before re-arming.
            let _guard = refresh_lock.lock().await;
            lock(&self.provider_tokens).insert(provider, self.root_token.child_token());
        }
    }

    /// Cancel everything. Later refreshes report `Cancelled`.
    pub fn shutdown(&self) {
        tracing::info!("Shutting down orchestrator");
        self.root_token.cancel();
        self.trigger.notify_one();
    }

    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.root_token.is_cancelled()
    }

    fn token(&self, provider: Provider) -> CancellationToken {
        lock(&self.provider_tokens)
            .entry(provider)
            .or_insert_with(|| self.root_token.child_token())
            .clone()
    }

    fn set_phase(&self, provider: Provider, phase: RefreshPhase) {
        let previous = lock(&self.phases).insert(provider, phase);
        if previous != Some(phase) {
            tracing::trace!(provider = %provider, ?phase, "Refresh phase");
        }
    }

    // -------------------------------------------------------------------------
    // Exchange rates
    // -------------------------------------------------------------------------

    /// Install a rate table and reconvert display amounts.
    pub async fn set_exchange_rates(&self, table: ExchangeRateTable) {
        let target = self.settings.current().target_currency;
        let rates = table.rates_by_code.clone();
        *self.rates.write().await = table;
        self.aggregator
            .refresh_display_currency(&rates, &target)
            .await;
    }

    #[must_use]
    pub async fn exchange_rates(&self) -> ExchangeRateTable {
        self.rates.read().await.clone()
    }

    /// Fetch fresh rates, keeping the current table on failure.
    ///
    /// # Errors
    ///
    /// Returns the fetch error after logging it; the previous table stays
    /// in place.
    pub async fn refresh_exchange_rates(
        &self,
        client: &ExchangeRateClient,
        max_age: Duration,
    ) -> Result<()> {
        match client.fetch().await {
            Ok(table) => {
                tracing::debug!(currencies = table.rates_by_code.len(), "Exchange rates updated");
                self.set_exchange_rates(table).await;
                Ok(())
            }
            Err(e) => {
                let stale = self.rates.read().await.is_stale(Utc::now(), max_age);
                tracing::warn!(error = %e, stale, "Exchange rate refresh failed, keeping previous rates");
                Err(e)
            }
        }
    }

    /// Refresh exchange rates on their own interval until shutdown.
    pub fn spawn_rate_refresher(
        self: &Arc<Self>,
        client: ExchangeRateClient,
        interval: Duration,
        max_age: Duration,
    ) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    () = this.root_token.cancelled() => break,
                    _ = ticker.tick() => {
                        let _ = this.refresh_exchange_rates(&client, max_age).await;
                    }
                }
            }
        })
    }

    // -------------------------------------------------------------------------
    // Polling loop
    // -------------------------------------------------------------------------

    /// Request an immediate cycle from a running [`Self::run`] loop.
    pub fn trigger_refresh(&self) {
        self.trigger.notify_one();
    }

    /// Run cycles on the configured interval until shutdown.
    ///
    /// `on_cycle` is called after every cycle. The interval is re-read from
    /// settings after each cycle.
    pub async fn run(self: &Arc<Self>, mut on_cycle: impl FnMut(&CycleReport) + Send) {
        let mut period = self.settings.current().refresh_interval();
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = self.root_token.cancelled() => break,
                _ = ticker.tick() => {}
                () = self.trigger.notified() => {
                    tracing::debug!("Manual refresh triggered");
                }
            }
            if self.root_token.is_cancelled() {
                break;
            }

            let report = self.refresh_all().await;
            on_cycle(&report);

            let next = self.settings.current().refresh_interval();
            if next != period && !next.is_zero() {
                tracing::info!(minutes = next.as_secs() / 60, "Refresh interval changed");
                period = next;
                ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            }
        }
        tracing::debug!("Polling loop stopped");
    }
}

fn executors_for(policy: &RetryPolicy) -> HashMap<Provider, RetryExecutor> {
    Provider::ALL
        .iter()
        .map(|p| (*p, RetryExecutor::new(policy.clone())))
        .collect()
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
