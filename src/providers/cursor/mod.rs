//! Cursor provider implementation.
//!
//! Authenticates with the `WorkosCursorSessionToken` session cookie against
//! the dashboard API:
//! - `POST /api/dashboard/teams`
//! - `GET /api/auth/me`
//! - `POST /api/dashboard/get-monthly-invoice`
//! - `GET /api/usage`

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::{ACCEPT, COOKIE};
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};

use super::ProviderClient;
use crate::core::http::{EndpointKind, send_json};
use crate::core::models::{
    ProviderMonthlyInvoice, ProviderTeamInfo, ProviderUsageData, ProviderUserInfo,
};
use crate::core::provider::Provider;
use crate::core::transform::{
    RawInvoiceLine, RawTeam, transform_invoice, transform_team_info, transform_usage,
    transform_user_info,
};
use crate::error::Result;

/// Session cookie name.
const SESSION_COOKIE: &str = "WorkosCursorSessionToken";

/// Usage bucket that carries the premium request allowance.
const PREMIUM_MODEL: &str = "gpt-4";

// =============================================================================
// Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
struct TeamsResponse {
    #[serde(default)]
    teams: Vec<TeamEntry>,
}

#[derive(Debug, Deserialize)]
struct TeamEntry {
    id: i64,
    name: String,
}

#[derive(Debug, Deserialize)]
struct MeResponse {
    email: Option<String>,
    #[serde(default, rename = "teamId")]
    team_id: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InvoiceRequest {
    month: u32,
    year: i32,
    include_usage_events: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    team_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InvoiceResponse {
    #[serde(default)]
    items: Vec<InvoiceEntry>,
    pricing_description: Option<PricingDescription>,
}

#[derive(Debug, Deserialize)]
struct InvoiceEntry {
    /// Absent on informational lines.
    cents: Option<i64>,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct PricingDescription {
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModelUsage {
    #[serde(default)]
    num_requests: u64,
    #[serde(default)]
    num_requests_total: u64,
    max_request_usage: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageResponse {
    start_of_month: Option<String>,
    #[serde(flatten)]
    models: HashMap<String, serde_json::Value>,
}

// =============================================================================
// Client
// =============================================================================

/// Cursor dashboard API client.
#[derive(Debug, Clone)]
pub struct CursorClient {
    http: Client,
    base_url: String,
}

impl CursorClient {
    #[must_use]
    pub fn new(http: Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn authed(&self, request: RequestBuilder, credential: &str) -> RequestBuilder {
        request
            .header(COOKIE, format!("{SESSION_COOKIE}={credential}"))
            .header(ACCEPT, "application/json")
    }
}

#[async_trait]
impl ProviderClient for CursorClient {
    fn provider(&self) -> Provider {
        Provider::Cursor
    }

    async fn fetch_team_info(&self, credential: &str) -> Result<ProviderTeamInfo> {
        let request = self.authed(
            self.http
                .post(self.url("/api/dashboard/teams"))
                .json(&serde_json::json!({})),
            credential,
        );
        let response: TeamsResponse = send_json(Provider::Cursor, EndpointKind::Data, request).await?;

        let teams: Vec<RawTeam> = response
            .teams
            .into_iter()
            .map(|t| RawTeam {
                id: t.id,
                name: t.name,
            })
            .collect();
        transform_team_info(Provider::Cursor, &teams)
    }

    async fn fetch_user_info(&self, credential: &str) -> Result<ProviderUserInfo> {
        let request = self.authed(self.http.get(self.url("/api/auth/me")), credential);
        let me: MeResponse = send_json(Provider::Cursor, EndpointKind::Auth, request).await?;
        transform_user_info(Provider::Cursor, me.email, me.team_id)
    }

    async fn fetch_monthly_invoice(
        &self,
        credential: &str,
        month: u32,
        year: i32,
        team_id: Option<i64>,
    ) -> Result<ProviderMonthlyInvoice> {
        let body = InvoiceRequest {
            month,
            year,
            include_usage_events: false,
            team_id,
        };
        let request = self.authed(
            self.http
                .post(self.url("/api/dashboard/get-monthly-invoice"))
                .json(&body),
            credential,
        );
        let response: InvoiceResponse =
            send_json(Provider::Cursor, EndpointKind::Data, request).await?;

        let lines = response
            .items
            .into_iter()
            .filter_map(|item| {
                item.cents.map(|cents| RawInvoiceLine {
                    cents,
                    description: item.description,
                })
            })
            .collect();
        let plan = response.pricing_description.and_then(|p| p.description);

        transform_invoice(Provider::Cursor, month, year, lines, plan)
    }

    async fn fetch_usage_data(&self, credential: &str) -> Result<ProviderUsageData> {
        let request = self.authed(self.http.get(self.url("/api/usage")), credential);
        let response: UsageResponse =
            send_json(Provider::Cursor, EndpointKind::Data, request).await?;

        let models: HashMap<String, ModelUsage> = response
            .models
            .into_iter()
            .filter_map(|(name, value)| {
                serde_json::from_value::<ModelUsage>(value)
                    .ok()
                    .map(|usage| (name, usage))
            })
            .collect();

        let (current, total, max) = models.get(PREMIUM_MODEL).map_or_else(
            || {
                let current = models.values().map(|m| m.num_requests).sum();
                let total = models.values().map(|m| m.num_requests_total).sum();
                let max = models.values().filter_map(|m| m.max_request_usage).max();
                (current, total, max)
            },
            |premium| {
                (
                    premium.num_requests,
                    premium.num_requests_total,
                    premium.max_request_usage,
                )
            },
        );

        Ok(transform_usage(
            Provider::Cursor,
            current,
            total,
            max,
            response.start_of_month.as_deref(),
            Utc::now(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invoice_request_uses_camel_case() {
        let body = InvoiceRequest {
            month: 3,
            year: 2026,
            include_usage_events: false,
            team_id: Some(42),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["includeUsageEvents"], false);
        assert_eq!(json["teamId"], 42);

        let solo = InvoiceRequest {
            team_id: None,
            ..body
        };
        assert!(serde_json::to_value(&solo).unwrap().get("teamId").is_none());
    }

    #[test]
    fn usage_response_separates_models() {
        let json = r#"{
            "gpt-4": {"numRequests": 120, "numRequestsTotal": 150, "maxRequestUsage": 500},
            "gpt-3.5-turbo": {"numRequests": 3, "numRequestsTotal": 3, "maxRequestUsage": null},
            "startOfMonth": "2026-03-01T00:00:00.000Z"
        }"#;
        let parsed: UsageResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.start_of_month.as_deref(), Some("2026-03-01T00:00:00.000Z"));
        assert_eq!(parsed.models.len(), 2);
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let client = CursorClient::new(Client::new(), "http://localhost:8080/");
        assert_eq!(client.url("/api/usage"), "http://localhost:8080/api/usage");
    }
}
