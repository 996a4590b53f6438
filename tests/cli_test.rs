//! CLI tests against the compiled binary.
//!
//! Every invocation points `SPENDBAR_CONFIG` at a scratch path so the
//! developer's own config and environment never leak in.

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::json;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

use spendbar::test_utils::TestDir;

mod common;

use common::logger::TestLogger;

// =============================================================================
// Test Helpers
// =============================================================================

#[allow(deprecated)]
fn spendbar_cmd(dir: &TestDir) -> Command {
    let mut cmd = Command::cargo_bin("spendbar").expect("spendbar binary");
    cmd.env("SPENDBAR_CONFIG", dir.file_path("config.toml"))
        .env("NO_COLOR", "1")
        .env_remove("SPENDBAR_TOKEN")
        .env_remove("SPENDBAR_PROVIDERS")
        .env_remove("SPENDBAR_CURRENCY")
        .env_remove("SPENDBAR_WARNING_LIMIT")
        .env_remove("SPENDBAR_UPPER_LIMIT")
        .env_remove("SPENDBAR_REFRESH_MINUTES")
        .env_remove("RUST_LOG");
    cmd
}

// =============================================================================
// Basic Invocation
// =============================================================================

#[test]
fn help_lists_commands() {
    let dir = TestDir::new();
    spendbar_cmd(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("refresh"))
        .stdout(predicate::str::contains("login"))
        .stdout(predicate::str::contains("convert"));
}

#[test]
fn no_command_prints_quickstart() {
    let dir = TestDir::new();
    spendbar_cmd(&dir)
        .assert()
        .success()
        .stdout(predicate::str::contains("QUICK START"));
}

#[test]
fn version_flag() {
    let dir = TestDir::new();
    spendbar_cmd(&dir)
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

// =============================================================================
// Errors and exit codes
// =============================================================================

#[test]
fn unknown_provider_exits_with_parse_error() {
    let log = TestLogger::new("unknown_provider_exits_with_parse_error");
    let dir = TestDir::new();

    log.phase("execute");
    let output = spendbar_cmd(&dir)
        .args(["logout", "copilot"])
        .output()
        .expect("run spendbar");

    log.phase("verify");
    assert_eq!(output.status.code(), Some(3));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("copilot"), "stderr: {stderr}");
    log.finish_ok();
}

#[test]
fn malformed_config_is_reported() {
    let dir = TestDir::new();
    dir.create_file("config.toml", "[general\nrefresh_interval_minutes = ");

    spendbar_cmd(&dir)
        .args(["convert", "1", "--to", "USD"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("Error ["));
}

#[test]
fn invalid_currency_code_is_rejected() {
    let dir = TestDir::new();
    spendbar_cmd(&dir)
        .args(["convert", "10", "--to", "dollars"])
        .assert()
        .code(3);
}

#[test]
fn zero_interval_is_rejected() {
    let dir = TestDir::new();
    spendbar_cmd(&dir)
        .args(["run", "--interval-minutes", "0"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("greater than 0"));
}

// =============================================================================
// convert
// =============================================================================

#[test]
fn same_currency_conversion_needs_no_network() {
    let dir = TestDir::new();
    spendbar_cmd(&dir)
        .args(["convert", "10", "--from", "USD", "--to", "usd"])
        .assert()
        .success()
        .stdout(predicate::str::contains("$10.00 = $10.00"));
}

#[test]
fn json_conversion_is_enveloped() {
    let dir = TestDir::new();
    let output = spendbar_cmd(&dir)
        .args(["--json", "convert", "10", "--to", "USD"])
        .output()
        .expect("run spendbar");

    assert!(output.status.success());
    let value: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("stdout is JSON");
    assert_eq!(value["command"], "convert");
    assert_eq!(value["data"]["currency"], "USD");
    assert_eq!(value["data"]["amount"], 10.0);
}

#[tokio::test(flavor = "multi_thread")]
async fn conversion_uses_configured_rate_feed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "result": "success",
            "base_code": "USD",
            "rates": { "USD": 1.0, "EUR": 0.5 }
        })))
        .mount(&server)
        .await;

    let dir = TestDir::new();
    dir.create_file(
        "config.toml",
        &format!("[exchange_rates]\nurl = \"{}/latest/USD\"\n", server.uri()),
    );

    spendbar_cmd(&dir)
        .args(["convert", "10", "--to", "EUR"])
        .assert()
        .success()
        .stdout(predicate::str::contains("$10.00 = €5.00"));
}
