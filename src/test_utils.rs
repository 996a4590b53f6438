//! Test utilities for spendbar.
//!
//! Provides data factories, a scripted [`ProviderClient`], a recording
//! notification sink and assertion macros shared by unit and integration
//! tests.
//!
//! # Usage
//!
//! ```rust,ignore
//! use spendbar::test_utils::*;
//!
//! let client = ScriptedProviderClient::healthy(Provider::Cursor, 4000);
//! let harness = TestHarness::new(vec![Arc::new(client)], Settings::default());
//! let report = harness.orchestrator.refresh_all().await;
//! ```

use std::collections::{HashMap, VecDeque};
use std::fs;
use std::io::{self, Write as IoWrite};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Datelike, TimeDelta, Utc};

use crate::core::aggregator::SpendingAggregator;
use crate::core::credentials::InMemoryCredentialStore;
use crate::core::models::{
    ProviderInvoiceItem, ProviderMonthlyInvoice, ProviderTeamInfo, ProviderUsageData,
    ProviderUserInfo,
};
use crate::core::notifications::{AlertKind, AlertScope, NotificationSink};
use crate::core::orchestrator::Orchestrator;
use crate::core::provider::Provider;
use crate::core::resilience::RetryPolicy;
use crate::error::{Result, SpendError};
use crate::providers::{ProviderClient, ProviderRegistry};
use crate::storage::settings::{Settings, SettingsSource};

// =============================================================================
// Test Data Factories
// =============================================================================

/// Invoice for the current month with a single line of `cents`.
#[must_use]
pub fn make_test_invoice(provider: Provider, cents: i64) -> ProviderMonthlyInvoice {
    let now = Utc::now();
    ProviderMonthlyInvoice {
        items: vec![ProviderInvoiceItem {
            amount_cents: cents,
            description: "usage-based requests".to_string(),
            provider,
        }],
        pricing_plan_description: Some("Pro".to_string()),
        provider,
        month: now.month(),
        year: now.year(),
    }
}

#[must_use]
pub fn make_test_user(provider: Provider, email: &str) -> ProviderUserInfo {
    ProviderUserInfo {
        email: email.to_string(),
        team_id: None,
        provider,
    }
}

#[must_use]
pub fn make_test_team(provider: Provider, id: i64, name: &str) -> ProviderTeamInfo {
    ProviderTeamInfo {
        id,
        name: name.to_string(),
        provider,
    }
}

/// Usage counters with a 500-request cap, period started ten days ago.
#[must_use]
pub fn make_test_usage(provider: Provider, current: u64) -> ProviderUsageData {
    ProviderUsageData {
        current_requests: current,
        total_requests: current,
        max_requests: Some(500),
        period_start: Utc::now() - TimeDelta::days(10),
        provider,
    }
}

/// Settings with the given providers enabled and the default limits.
#[must_use]
pub fn make_test_settings(providers: &[Provider]) -> Settings {
    Settings {
        enabled_providers: providers.to_vec(),
        ..Settings::default()
    }
}

/// Retry policy with millisecond delays so retries stay fast in tests.
#[must_use]
pub fn make_fast_retry_policy() -> RetryPolicy {
    RetryPolicy {
        max_retries: 2,
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
        ..RetryPolicy::default()
    }
}

/// Sample config TOML.
#[must_use]
pub fn make_test_config_toml() -> String {
    r#"[general]
refresh_interval_minutes = 10
timeout_seconds = 20
log_level = "info"

[providers]
enabled = ["cursor", "claude"]

[spending]
warning_limit_usd = 150.0
upper_limit_usd = 400.0
target_currency = "EUR"
alert_on_total = true
"#
    .to_string()
}

// =============================================================================
// Scripted provider client
// =============================================================================

type Fallback<T> = Box<dyn Fn() -> Result<T> + Send + Sync>;

/// Per-operation script: queued results first, then the fallback forever.
struct Script<T> {
    queue: Mutex<VecDeque<Result<T>>>,
    fallback: Fallback<T>,
}

impl<T> Script<T> {
    fn new(fallback: impl Fn() -> Result<T> + Send + Sync + 'static) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            fallback: Box::new(fallback),
        }
    }

    fn next(&self) -> Result<T> {
        let queued = self
            .queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        queued.unwrap_or_else(|| (self.fallback)())
    }

    fn push(&self, result: Result<T>) {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(result);
    }
}

/// A [`ProviderClient`] that replays scripted results and counts calls.
pub struct ScriptedProviderClient {
    provider: Provider,
    team: Script<ProviderTeamInfo>,
    user: Script<ProviderUserInfo>,
    invoice: Script<ProviderMonthlyInvoice>,
    usage: Script<ProviderUsageData>,
    delay: Option<Duration>,
    calls: Mutex<HashMap<&'static str, u32>>,
    credentials_seen: Mutex<Vec<String>>,
}

impl std::fmt::Debug for ScriptedProviderClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedProviderClient")
            .field("provider", &self.provider)
            .field("delay", &self.delay)
            .finish_non_exhaustive()
    }
}

impl ScriptedProviderClient {
    /// Every call succeeds: no team, one user, an invoice of `cents`.
    #[must_use]
    pub fn healthy(provider: Provider, cents: i64) -> Self {
        Self {
            provider,
            team: Script::new(move || Err(SpendError::NoTeamFound { provider })),
            user: Script::new(move || Ok(make_test_user(provider, "dev@example.com"))),
            invoice: Script::new(move || Ok(make_test_invoice(provider, cents))),
            usage: Script::new(move || Ok(make_test_usage(provider, 42))),
            delay: None,
            calls: Mutex::new(HashMap::new()),
            credentials_seen: Mutex::new(Vec::new()),
        }
    }

    /// Every call fails with `Unauthorized`.
    #[must_use]
    pub fn unauthorized(provider: Provider) -> Self {
        let unauthorized = move || SpendError::Unauthorized { provider };
        Self {
            team: Script::new(move || Err(unauthorized())),
            user: Script::new(move || Err(unauthorized())),
            invoice: Script::new(move || Err(unauthorized())),
            usage: Script::new(move || Err(unauthorized())),
            ..Self::healthy(provider, 0)
        }
    }

    /// Report a team on every call.
    #[must_use]
    pub fn with_team(mut self, id: i64, name: &str) -> Self {
        let provider = self.provider;
        let name = name.to_string();
        self.team = Script::new(move || Ok(make_test_team(provider, id, &name)));
        self
    }

    /// Make every invoice call fail with the error built by `err`.
    #[must_use]
    pub fn failing_invoice(
        mut self,
        err: impl Fn(Provider) -> SpendError + Send + Sync + 'static,
    ) -> Self {
        let provider = self.provider;
        self.invoice = Script::new(move || Err(err(provider)));
        self
    }

    /// Make every user call fail with the error built by `err`.
    #[must_use]
    pub fn failing_user(mut self, err: impl Fn(Provider) -> SpendError + Send + Sync + 'static) -> Self {
        let provider = self.provider;
        self.user = Script::new(move || Err(err(provider)));
        self
    }

    /// Sleep before answering every call.
    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Queue a one-off invoice result ahead of the fallback.
    pub fn queue_invoice(&self, result: Result<ProviderMonthlyInvoice>) {
        self.invoice.push(result);
    }

    /// Queue a one-off user result ahead of the fallback.
    pub fn queue_user(&self, result: Result<ProviderUserInfo>) {
        self.user.push(result);
    }

    /// How many times `operation` was called.
    #[must_use]
    pub fn calls(&self, operation: &str) -> u32 {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(operation)
            .copied()
            .unwrap_or(0)
    }

    /// Credentials passed to the client, in call order.
    #[must_use]
    pub fn credentials_seen(&self) -> Vec<String> {
        self.credentials_seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn record(&self, operation: &'static str, credential: &str) {
        *self
            .calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(operation)
            .or_insert(0) += 1;
        self.credentials_seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(credential.to_string());
    }

    /// Answer after the configured delay. The result is taken when the call
    /// starts, so a call cancelled mid-delay still consumes queued results.
    async fn answer<T>(&self, result: Result<T>) -> Result<T> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        result
    }
}

#[async_trait]
impl ProviderClient for ScriptedProviderClient {
    fn provider(&self) -> Provider {
        self.provider
    }

    async fn fetch_team_info(&self, credential: &str) -> Result<ProviderTeamInfo> {
        self.record("fetch_team_info", credential);
        self.answer(self.team.next()).await
    }

    async fn fetch_user_info(&self, credential: &str) -> Result<ProviderUserInfo> {
        self.record("fetch_user_info", credential);
        self.answer(self.user.next()).await
    }

    async fn fetch_monthly_invoice(
        &self,
        credential: &str,
        _month: u32,
        _year: i32,
        _team_id: Option<i64>,
    ) -> Result<ProviderMonthlyInvoice> {
        self.record("fetch_monthly_invoice", credential);
        self.answer(self.invoice.next()).await
    }

    async fn fetch_usage_data(&self, credential: &str) -> Result<ProviderUsageData> {
        self.record("fetch_usage_data", credential);
        self.answer(self.usage.next()).await
    }
}

// =============================================================================
// Recording notification sink
// =============================================================================

/// One alert captured by [`RecordingNotificationSink`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedAlert {
    pub kind: AlertKind,
    pub scope: AlertScope,
    pub spending: f64,
    pub limit: f64,
    pub currency: String,
}

/// Sink that keeps every alert for later assertions.
#[derive(Debug, Default)]
pub struct RecordingNotificationSink {
    alerts: Mutex<Vec<RecordedAlert>>,
}

impl RecordingNotificationSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn alerts(&self) -> Vec<RecordedAlert> {
        self.alerts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn push(&self, kind: AlertKind, scope: AlertScope, spending: f64, limit: f64, currency: &str) {
        self.alerts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(RecordedAlert {
                kind,
                scope,
                spending,
                limit,
                currency: currency.to_string(),
            });
    }
}

impl NotificationSink for RecordingNotificationSink {
    fn show_warning(&self, scope: AlertScope, spending: f64, limit: f64, currency: &str) {
        self.push(AlertKind::Warning, scope, spending, limit, currency);
    }

    fn show_upper(&self, scope: AlertScope, spending: f64, limit: f64, currency: &str) {
        self.push(AlertKind::Upper, scope, spending, limit, currency);
    }
}

// =============================================================================
// Orchestrator harness
// =============================================================================

/// Settings that a test can change between cycles.
#[derive(Debug, Default)]
pub struct MutableSettings(Mutex<Settings>);

impl MutableSettings {
    #[must_use]
    pub fn new(settings: Settings) -> Self {
        Self(Mutex::new(settings))
    }

    pub fn update(&self, change: impl FnOnce(&mut Settings)) {
        change(&mut self.0.lock().unwrap_or_else(PoisonError::into_inner));
    }
}

impl SettingsSource for MutableSettings {
    fn current(&self) -> Settings {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

/// An orchestrator wired to in-memory collaborators.
///
/// Every client's provider gets a stored credential `"<provider>-token"`.
pub struct TestHarness {
    pub orchestrator: Arc<Orchestrator>,
    pub aggregator: Arc<SpendingAggregator>,
    pub credentials: Arc<InMemoryCredentialStore>,
    pub settings: Arc<MutableSettings>,
    pub sink: Arc<RecordingNotificationSink>,
}

impl TestHarness {
    #[must_use]
    pub fn new(clients: Vec<Arc<dyn ProviderClient>>, settings: Settings) -> Self {
        let mut registry = ProviderRegistry::new();
        let mut entries = Vec::new();
        for client in clients {
            let provider = client.provider();
            entries.push((provider, format!("{}-token", provider.cli_name())));
            registry.register(client);
        }

        let aggregator = Arc::new(SpendingAggregator::new());
        let credentials = Arc::new(InMemoryCredentialStore::with(entries));
        let settings = Arc::new(MutableSettings::new(settings));
        let sink = Arc::new(RecordingNotificationSink::new());
        let orchestrator = Orchestrator::new(
            Arc::clone(&aggregator),
            credentials.clone(),
            settings.clone(),
            sink.clone(),
            registry,
        )
        .with_retry_policy(&make_fast_retry_policy());

        Self {
            orchestrator: Arc::new(orchestrator),
            aggregator,
            credentials,
            settings,
            sink,
        }
    }
}

// =============================================================================
// Temp Directory Utilities
// =============================================================================

/// A temporary directory for tests with automatic cleanup.
pub struct TestDir {
    inner: tempfile::TempDir,
}

impl TestDir {
    /// Create a new isolated temporary directory.
    ///
    /// # Panics
    ///
    /// Panics if the temporary directory cannot be created.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: tempfile::tempdir().expect("Failed to create temp directory"),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        self.inner.path()
    }

    /// Create a file with the given content, creating parent directories.
    ///
    /// # Panics
    ///
    /// Panics if the file cannot be created or written.
    pub fn create_file(&self, name: &str, content: &str) {
        let path = self.inner.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent directories");
        }
        let mut file = fs::File::create(&path).expect("Failed to create test file");
        file.write_all(content.as_bytes())
            .expect("Failed to write test file");
    }

    /// Read a file from the temporary directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read.
    pub fn read_file(&self, name: &str) -> io::Result<String> {
        fs::read_to_string(self.inner.path().join(name))
    }

    #[must_use]
    pub fn file_path(&self, name: &str) -> PathBuf {
        self.inner.path().join(name)
    }
}

impl Default for TestDir {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Assertion Macros
// =============================================================================

/// Assert that a string contains a substring.
#[macro_export]
macro_rules! assert_contains {
    ($haystack:expr, $needle:expr) => {
        let haystack = $haystack;
        let needle = $needle;
        assert!(
            haystack.contains(needle),
            "Expected string to contain {:?}\n\nActual string:\n{:?}",
            needle,
            haystack
        );
    };
}

/// Assert that a string does NOT contain a substring.
#[macro_export]
macro_rules! assert_not_contains {
    ($haystack:expr, $needle:expr) => {
        let haystack = $haystack;
        let needle = $needle;
        assert!(
            !haystack.contains(needle),
            "Expected string NOT to contain {:?}\n\nActual string:\n{:?}",
            needle,
            haystack
        );
    };
}

/// Assert that a string is valid JSON.
#[macro_export]
macro_rules! assert_json_valid {
    ($json:expr) => {
        let json = $json;
        if let Err(e) = serde_json::from_str::<serde_json::Value>(json) {
            panic!(
                "Expected valid JSON, but parsing failed: {}\n\nJSON string:\n{}",
                e, json
            );
        }
    };
}

/// Assert that a string carries no ANSI escape sequences.
#[macro_export]
macro_rules! assert_no_ansi_codes {
    ($text:expr) => {
        let text = $text;
        assert!(
            !$crate::test_utils::has_ansi_codes(text),
            "Expected no ANSI codes\n\nActual string:\n{:?}",
            text
        );
    };
}

/// Assert approximate floating point equality.
///
/// ```rust,ignore
/// use spendbar::assert_float_eq;
///
/// assert_float_eq!(40.0, 40.0000001);
/// assert_float_eq!(40.0, 40.05, 0.1);
/// ```
#[macro_export]
macro_rules! assert_float_eq {
    ($left:expr, $right:expr) => {
        $crate::assert_float_eq!($left, $right, 1e-9)
    };
    ($left:expr, $right:expr, $epsilon:expr) => {
        let left: f64 = $left;
        let right: f64 = $right;
        let epsilon: f64 = $epsilon;
        assert!(
            (left - right).abs() < epsilon,
            "Float equality assertion failed: {} != {} (epsilon: {})",
            left,
            right,
            epsilon
        );
    };
}

// =============================================================================
// Test Helpers
// =============================================================================

/// Check if a string contains ANSI escape sequences.
#[must_use]
pub fn has_ansi_codes(text: &str) -> bool {
    text.contains('\x1b')
}

// =============================================================================
// Tests for Test Utilities
// =============================================================================
