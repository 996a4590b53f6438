//! Vendor response bodies and mock server helpers.
#![allow(dead_code)]

use std::time::Duration;

use reqwest::Client;
use serde_json::{Value, json};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use spendbar::core::http::build_client;

/// HTTP client with a short timeout for mock servers.
#[must_use]
pub fn test_http() -> Client {
    build_client(Duration::from_secs(5)).expect("client build")
}

// =============================================================================
// Cursor
// =============================================================================

#[must_use]
pub fn cursor_teams_json(teams: &[(i64, &str)]) -> Value {
    json!({
        "teams": teams
            .iter()
            .map(|(id, name)| json!({ "id": id, "name": name, "role": "member" }))
            .collect::<Vec<_>>()
    })
}

#[must_use]
pub fn cursor_me_json(email: &str) -> Value {
    json!({ "email": email, "name": "Dev", "sub": "user_01" })
}

/// Invoice with one line per amount plus an informational line without cents.
#[must_use]
pub fn cursor_invoice_json(cents: &[i64]) -> Value {
    let mut items: Vec<Value> = cents
        .iter()
        .map(|c| json!({ "description": format!("{c} usage-based requests"), "cents": c }))
        .collect();
    items.push(json!({ "description": "Included in Pro" }));
    json!({
        "items": items,
        "pricingDescription": { "description": "Pro", "id": "pro" }
    })
}

#[must_use]
pub fn cursor_usage_json() -> Value {
    json!({
        "gpt-4": { "numRequests": 120, "numRequestsTotal": 140, "maxRequestUsage": 500 },
        "gpt-3.5-turbo": { "numRequests": 3, "numRequestsTotal": 3, "maxRequestUsage": null },
        "startOfMonth": "2026-10-01T00:00:00.000Z"
    })
}

/// Mount every Cursor endpoint with healthy responses.
pub async fn mount_cursor_healthy(server: &MockServer, cents: &[i64]) {
    Mock::given(method("POST"))
        .and(path("/api/dashboard/teams"))
        .respond_with(ResponseTemplate::new(200).set_body_json(cursor_teams_json(&[])))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/auth/me"))
        .respond_with(ResponseTemplate::new(200).set_body_json(cursor_me_json("dev@example.com")))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/dashboard/get-monthly-invoice"))
        .respond_with(ResponseTemplate::new(200).set_body_json(cursor_invoice_json(cents)))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/usage"))
        .respond_with(ResponseTemplate::new(200).set_body_json(cursor_usage_json()))
        .mount(server)
        .await;
}

// =============================================================================
// Claude
// =============================================================================

#[must_use]
pub fn claude_profile_json(email: &str, organization_type: &str) -> Value {
    json!({
        "account": { "uuid": "acc-1", "email_address": email, "full_name": "Dev" },
        "organization": {
            "uuid": "3f2a9c1e-7b4d-4e2a-9c1f-5d6e7f8a9b0c",
            "name": "Acme",
            "organization_type": organization_type
        }
    })
}

#[must_use]
pub fn claude_usage_json(used_cents: f64) -> Value {
    json!({
        "five_hour": { "utilization": 12.0, "resets_at": "2026-10-18T15:00:00Z" },
        "seven_day": { "utilization": 0.4, "resets_at": "2026-10-22T00:00:00Z" },
        "extra_usage": {
            "is_enabled": true,
            "monthly_limit": 5000.0,
            "used_credits": used_cents
        }
    })
}

/// Mount the Claude OAuth endpoints with healthy responses.
pub async fn mount_claude_healthy(server: &MockServer, used_cents: f64) {
    Mock::given(method("GET"))
        .and(path("/api/oauth/profile"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(claude_profile_json("dev@example.com", "claude_pro")),
        )
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/oauth/usage"))
        .respond_with(ResponseTemplate::new(200).set_body_json(claude_usage_json(used_cents)))
        .mount(server)
        .await;
}

/// Every Claude endpoint answers 401.
pub async fn mount_claude_unauthorized(server: &MockServer) {
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({
                "type": "error",
                "error": { "type": "authentication_error", "message": "OAuth token has expired" }
            })),
        )
        .mount(server)
        .await;
}
