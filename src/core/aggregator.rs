//! Spending aggregator and session store.
//!
//! Single writer (the orchestrator), many readers. State sits behind a tokio
//! `RwLock`; every mutation publishes a fresh [`SpendingSnapshot`] on a
//! `watch` channel so renderers can follow changes without polling.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{RwLock, watch};

use super::currency::{BASE_CURRENCY, convert};
use super::models::{
    ConnectionStatus, ConvertedAmount, ProviderMonthlyInvoice, ProviderSession,
    ProviderSpendingData, ProviderUsageData,
};
use super::provider::Provider;

/// Point-in-time copy of everything the aggregator holds.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpendingSnapshot {
    pub providers: BTreeMap<Provider, ProviderSpendingData>,
    pub sessions: BTreeMap<Provider, ProviderSession>,
    pub generated_at: Option<DateTime<Utc>>,
}

impl SpendingSnapshot {
    /// Sum of contributing providers in USD.
    #[must_use]
    pub fn total_usd(&self) -> f64 {
        self.providers
            .values()
            .filter(|data| data.contributes_to_total())
            .filter_map(|data| data.spending_usd)
            .sum()
    }
}

#[derive(Debug, Default)]
struct State {
    spending: BTreeMap<Provider, ProviderSpendingData>,
    sessions: BTreeMap<Provider, ProviderSession>,
    warning_limit_usd: f64,
    upper_limit_usd: f64,
}

impl State {
    fn entry(&mut self, provider: Provider) -> &mut ProviderSpendingData {
        let (warning, upper) = (self.warning_limit_usd, self.upper_limit_usd);
        self.spending.entry(provider).or_insert_with(|| {
            let mut data = ProviderSpendingData::new(provider);
            data.warning_limit_in_display_currency = warning;
            data.upper_limit_in_display_currency = upper;
            data
        })
    }

    fn snapshot(&self) -> SpendingSnapshot {
        SpendingSnapshot {
            providers: self.spending.clone(),
            sessions: self.sessions.clone(),
            generated_at: Some(Utc::now()),
        }
    }
}

/// Holds per-provider spending, status and sessions.
#[derive(Debug)]
pub struct SpendingAggregator {
    state: RwLock<State>,
    tx: watch::Sender<SpendingSnapshot>,
}

impl Default for SpendingAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl SpendingAggregator {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(SpendingSnapshot::default());
        Self {
            state: RwLock::new(State::default()),
            tx,
        }
    }

    /// Subscribe to snapshots published after each mutation.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SpendingSnapshot> {
        self.tx.subscribe()
    }

    fn publish(&self, state: &State) {
        self.tx.send_replace(state.snapshot());
    }

    // -------------------------------------------------------------------------
    // Spending
    // -------------------------------------------------------------------------

    /// Record a fetched invoice and convert it to the display currency.
    pub async fn update_spending(
        &self,
        provider: Provider,
        invoice: &ProviderMonthlyInvoice,
        rates: &HashMap<String, f64>,
        target_currency: &str,
    ) {
        let mut state = self.state.write().await;
        let data = state.entry(provider);
        let usd = invoice.total_usd();
        data.spending_usd = Some(usd);
        data.latest_invoice = Some(invoice.clone());
        data.last_updated = Some(Utc::now());
        apply_display_currency(data, rates, target_currency);

        tracing::debug!(
            provider = %provider,
            spending_usd = usd,
            items = invoice.items.len(),
            "Spending updated"
        );
        self.publish(&state);
    }

    pub async fn update_usage(&self, provider: Provider, usage: ProviderUsageData) {
        let mut state = self.state.write().await;
        let data = state.entry(provider);
        data.usage_data = Some(usage);
        data.last_updated = Some(Utc::now());
        self.publish(&state);
    }

    /// Drop fetched spend and mark the provider disconnected. The session is
    /// kept.
    pub async fn clear_spending(&self, provider: Provider) {
        let mut state = self.state.write().await;
        state.spending.remove(&provider);
        state.entry(provider).connection_status = ConnectionStatus::Disconnected;
        self.publish(&state);
    }

    /// Set the connection status; leaving an error state clears the last error.
    pub async fn set_status(&self, provider: Provider, status: ConnectionStatus) {
        let mut state = self.state.write().await;
        let data = state.entry(provider);
        if matches!(status, ConnectionStatus::Connected) {
            data.last_error = None;
        }
        data.connection_status = status;
        self.publish(&state);
    }

    pub async fn set_error(&self, provider: Provider, message: impl Into<String>) {
        let message = message.into();
        let mut state = self.state.write().await;
        let data = state.entry(provider);
        data.last_error = Some(message.clone());
        data.connection_status = ConnectionStatus::Error { message };
        self.publish(&state);
    }

    /// Store limits (given in USD) and convert them for every provider.
    pub async fn set_limits(
        &self,
        warning_usd: f64,
        upper_usd: f64,
        rates: &HashMap<String, f64>,
        target_currency: &str,
    ) {
        let mut state = self.state.write().await;
        state.warning_limit_usd = warning_usd;
        state.upper_limit_usd = upper_usd;
        for data in state.spending.values_mut() {
            apply_limits(data, warning_usd, upper_usd, rates, target_currency);
        }
        self.publish(&state);
    }

    /// Reconvert every provider after a rate table or currency change.
    pub async fn refresh_display_currency(
        &self,
        rates: &HashMap<String, f64>,
        target_currency: &str,
    ) {
        let mut state = self.state.write().await;
        let (warning, upper) = (state.warning_limit_usd, state.upper_limit_usd);
        for data in state.spending.values_mut() {
            apply_display_currency(data, rates, target_currency);
            apply_limits(data, warning, upper, rates, target_currency);
        }
        self.publish(&state);
    }

    /// Cross-provider total in `target_currency`, or USD when unavailable.
    ///
    /// Providers without spend data or in an error state contribute nothing.
    pub async fn total_spending_converted(
        &self,
        target_currency: &str,
        rates: &HashMap<String, f64>,
    ) -> ConvertedAmount {
        let total_usd = {
            let state = self.state.read().await;
            state
                .spending
                .values()
                .filter(|data| data.contributes_to_total())
                .filter_map(|data| data.spending_usd)
                .sum::<f64>()
        };

        convert(total_usd, BASE_CURRENCY, target_currency, rates).map_or_else(
            || ConvertedAmount {
                amount: total_usd,
                currency: BASE_CURRENCY.to_string(),
            },
            |amount| ConvertedAmount {
                amount,
                currency: target_currency.to_uppercase(),
            },
        )
    }

    // -------------------------------------------------------------------------
    // Sessions
    // -------------------------------------------------------------------------

    /// Begin a fresh active session, replacing any previous one.
    pub async fn start_session(&self, provider: Provider) {
        let mut state = self.state.write().await;
        state.sessions.insert(provider, ProviderSession::new(provider));
        tracing::info!(provider = %provider, "Session started");
        self.publish(&state);
    }

    /// Update identity facts on the session, creating it if needed.
    pub async fn update_session(
        &self,
        provider: Provider,
        team_id: Option<i64>,
        team_name: Option<String>,
        user_email: Option<String>,
    ) {
        let mut state = self.state.write().await;
        let session = state
            .sessions
            .entry(provider)
            .or_insert_with(|| ProviderSession::new(provider));
        if team_id.is_some() {
            session.team_id = team_id;
            session.team_name = team_name;
        }
        if user_email.is_some() {
            session.user_email = user_email;
        }
        session.is_active = true;
        session.last_updated = Utc::now();
        self.publish(&state);
    }

    pub async fn deactivate_session(&self, provider: Provider) {
        let mut state = self.state.write().await;
        if let Some(session) = state.sessions.get_mut(&provider) {
            session.is_active = false;
            session.last_updated = Utc::now();
            tracing::info!(provider = %provider, "Session deactivated");
        }
        self.publish(&state);
    }

    /// Remove the session and all spending data for a provider.
    pub async fn end_session(&self, provider: Provider) {
        let mut state = self.state.write().await;
        state.sessions.remove(&provider);
        state.spending.remove(&provider);
        tracing::info!(provider = %provider, "Session ended");
        self.publish(&state);
    }

    pub async fn clear_all(&self) {
        let mut state = self.state.write().await;
        state.sessions.clear();
        state.spending.clear();
        self.publish(&state);
    }

    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    pub async fn spending(&self, provider: Provider) -> Option<ProviderSpendingData> {
        self.state.read().await.spending.get(&provider).cloned()
    }

    pub async fn session(&self, provider: Provider) -> Option<ProviderSession> {
        self.state.read().await.sessions.get(&provider).cloned()
    }

    pub async fn snapshot(&self) -> SpendingSnapshot {
        self.state.read().await.snapshot()
    }
}

fn apply_display_currency(
    data: &mut ProviderSpendingData,
    rates: &HashMap<String, f64>,
    target_currency: &str,
) {
    let Some(usd) = data.spending_usd else {
        data.spending_in_display_currency = None;
        return;
    };
    match convert(usd, BASE_CURRENCY, target_currency, rates) {
        Some(amount) => {
            data.spending_in_display_currency = Some(amount);
            data.display_currency = target_currency.to_uppercase();
        }
        None => {
            tracing::debug!(
                provider = %data.provider,
                target = target_currency,
                "No rate for display currency, showing USD"
            );
            data.spending_in_display_currency = Some(usd);
            data.display_currency = BASE_CURRENCY.to_string();
        }
    }
}

fn apply_limits(
    data: &mut ProviderSpendingData,
    warning_usd: f64,
    upper_usd: f64,
    rates: &HashMap<String, f64>,
    target_currency: &str,
) {
    let currency = if data.spending_usd.is_some() {
        data.display_currency.clone()
    } else {
        target_currency.to_uppercase()
    };
    let (warning, upper) = match (
        convert(warning_usd, BASE_CURRENCY, &currency, rates),
        convert(upper_usd, BASE_CURRENCY, &currency, rates),
    ) {
        (Some(w), Some(u)) => (w, u),
        _ => (warning_usd, upper_usd),
    };
    data.warning_limit_in_display_currency = warning;
    data.upper_limit_in_display_currency = upper;
}
