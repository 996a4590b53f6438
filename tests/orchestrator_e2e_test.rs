//! End-to-end refresh cycles with the real provider clients against mock
//! vendor servers.

mod common;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use wiremock::MockServer;

use spendbar::core::aggregator::SpendingAggregator;
use spendbar::core::credentials::{CredentialStore, InMemoryCredentialStore};
use spendbar::core::currency::ExchangeRateTable;
use spendbar::core::notifications::{AlertKind, AlertScope};
use spendbar::core::orchestrator::{Orchestrator, RefreshStatus};
use spendbar::providers::{Provider, ProviderRegistry};
use spendbar::storage::settings::{Settings, StaticSettings};
use spendbar::test_utils::{RecordingNotificationSink, make_fast_retry_policy};

use common::fixtures::{
    mount_claude_healthy, mount_claude_unauthorized, mount_cursor_healthy, test_http,
};
use common::logger::TestLogger;

struct Env {
    orchestrator: Arc<Orchestrator>,
    aggregator: Arc<SpendingAggregator>,
    credentials: Arc<InMemoryCredentialStore>,
    sink: Arc<RecordingNotificationSink>,
}

fn settings(warning: f64, upper: f64, currency: &str) -> Settings {
    Settings {
        enabled_providers: vec![Provider::Cursor, Provider::Claude],
        warning_limit_usd: warning,
        upper_limit_usd: upper,
        target_currency: currency.to_string(),
        refresh_interval_minutes: 5,
        alert_on_total: true,
    }
}

fn build(cursor: &MockServer, claude: &MockServer, settings: Settings) -> Env {
    let cursor_uri = cursor.uri();
    let claude_uri = claude.uri();
    let registry = ProviderRegistry::production(&test_http(), |provider| match provider {
        Provider::Cursor => Some(cursor_uri.as_str()),
        Provider::Claude => Some(claude_uri.as_str()),
    });

    let aggregator = Arc::new(SpendingAggregator::new());
    let credentials = Arc::new(InMemoryCredentialStore::with([
        (Provider::Cursor, "cursor-session".to_string()),
        (Provider::Claude, "claude-oauth".to_string()),
    ]));
    let sink = Arc::new(RecordingNotificationSink::new());
    let orchestrator = Orchestrator::new(
        Arc::clone(&aggregator),
        credentials.clone(),
        Arc::new(StaticSettings(settings)),
        sink.clone(),
        registry,
    )
    .with_retry_policy(&make_fast_retry_policy());

    Env {
        orchestrator: Arc::new(orchestrator),
        aggregator,
        credentials,
        sink,
    }
}

#[tokio::test]
async fn expired_provider_does_not_hide_healthy_spend() {
    let log = TestLogger::new("expired_provider_does_not_hide_healthy_spend");
    let cursor = MockServer::start().await;
    let claude = MockServer::start().await;
    mount_cursor_healthy(&cursor, &[4000]).await;
    mount_claude_unauthorized(&claude).await;

    let env = build(&cursor, &claude, settings(500.0, 1000.0, "USD"));

    log.phase("execute");
    let cycle = env.orchestrator.refresh_all().await;

    log.phase("verify");
    let by_provider: HashMap<_, _> = cycle
        .reports
        .iter()
        .map(|r| (r.provider, r.status.clone()))
        .collect();
    assert_eq!(by_provider[&Provider::Cursor], RefreshStatus::Succeeded);
    assert!(matches!(
        by_provider[&Provider::Claude],
        RefreshStatus::Failed { .. }
    ));

    let snapshot = env.aggregator.snapshot().await;
    assert!((snapshot.total_usd() - 40.0).abs() < 1e-9);
    assert!(snapshot.providers[&Provider::Cursor].connection_status.is_connected());
    assert!(snapshot.providers[&Provider::Claude].connection_status.is_error());

    let claude_session = env.aggregator.session(Provider::Claude).await;
    assert!(claude_session.is_none_or(|s| !s.is_active));

    // The rejected credential is kept so a later login can replace it.
    assert!(env.credentials.get(Provider::Claude).unwrap().is_some());
    assert!(cycle.alerts.is_empty());
    log.finish_ok();
}

#[tokio::test]
async fn both_providers_sum_and_session_is_populated() {
    let cursor = MockServer::start().await;
    let claude = MockServer::start().await;
    mount_cursor_healthy(&cursor, &[1500, 2500]).await;
    mount_claude_healthy(&claude, 1000.0).await;

    let env = build(&cursor, &claude, settings(500.0, 1000.0, "USD"));
    let cycle = env.orchestrator.refresh_all().await;

    assert!(cycle.reports.iter().all(|r| r.is_success()));
    let snapshot = env.aggregator.snapshot().await;
    assert!((snapshot.total_usd() - 50.0).abs() < 1e-9);

    let session = env.aggregator.session(Provider::Cursor).await.unwrap();
    assert!(session.is_active);
    assert_eq!(session.user_email.as_deref(), Some("dev@example.com"));
    assert_eq!(session.team_id, None);

    let usage = snapshot.providers[&Provider::Claude]
        .usage_data
        .clone()
        .unwrap();
    assert_eq!(usage.current_requests, 12);
}

#[tokio::test]
async fn crossing_limits_alerts_per_provider_and_total() {
    let cursor = MockServer::start().await;
    let claude = MockServer::start().await;
    mount_cursor_healthy(&cursor, &[4000]).await;
    mount_claude_healthy(&claude, 1000.0).await;

    // Cursor $40 crosses the $30 warning; the $50 total does too.
    let env = build(&cursor, &claude, settings(30.0, 100.0, "USD"));
    let cycle = env.orchestrator.refresh_all().await;

    let alerts = env.sink.alerts();
    assert_eq!(alerts.len(), 2);
    assert!(alerts.iter().any(|a| a.scope == AlertScope::Provider(Provider::Cursor)
        && a.kind == AlertKind::Warning));
    assert!(
        alerts
            .iter()
            .any(|a| a.scope == AlertScope::Total && (a.spending - 50.0).abs() < 1e-9)
    );
    assert_eq!(cycle.alerts.len(), 2);

    // Same spend next cycle: already notified.
    env.orchestrator.refresh_all().await;
    assert_eq!(env.sink.alerts().len(), 2);
}

#[tokio::test]
async fn alerts_use_display_currency() {
    let cursor = MockServer::start().await;
    let claude = MockServer::start().await;
    mount_cursor_healthy(&cursor, &[4000]).await;
    mount_claude_unauthorized(&claude).await;

    let env = build(&cursor, &claude, settings(30.0, 100.0, "EUR"));
    env.orchestrator
        .set_exchange_rates(ExchangeRateTable::new(
            HashMap::from([("USD".to_string(), 1.0), ("EUR".to_string(), 0.5)]),
            Utc::now(),
        ))
        .await;

    env.orchestrator.refresh_all().await;

    let alerts = env.sink.alerts();
    let cursor_alert = alerts
        .iter()
        .find(|a| a.scope == AlertScope::Provider(Provider::Cursor))
        .unwrap();
    assert_eq!(cursor_alert.currency, "EUR");
    assert!((cursor_alert.spending - 20.0).abs() < 1e-9);
    assert!((cursor_alert.limit - 15.0).abs() < 1e-9);

    let data = env.aggregator.spending(Provider::Cursor).await.unwrap();
    assert_eq!(data.display_currency, "EUR");
    assert!((data.spending_in_display_currency.unwrap() - 20.0).abs() < 1e-9);
}

#[tokio::test]
async fn logout_clears_provider_after_real_refresh() {
    let cursor = MockServer::start().await;
    let claude = MockServer::start().await;
    mount_cursor_healthy(&cursor, &[4000]).await;
    mount_claude_healthy(&claude, 0.0).await;

    let env = build(&cursor, &claude, settings(500.0, 1000.0, "USD"));
    env.orchestrator.refresh_all().await;
    env.orchestrator.logout(Provider::Cursor).await.unwrap();

    assert!(env.credentials.get(Provider::Cursor).unwrap().is_none());
    let cycle = env.orchestrator.refresh_all().await;
    let cursor_report = cycle
        .reports
        .iter()
        .find(|r| r.provider == Provider::Cursor)
        .unwrap();
    assert_eq!(cursor_report.status, RefreshStatus::NotLoggedIn);
    let snapshot = env.aggregator.snapshot().await;
    assert!(snapshot.total_usd().abs() < 1e-9);
}
