//! Claude (Anthropic) provider implementation.
//!
//! Uses the OAuth API with a bearer token:
//! - `GET /api/oauth/profile` for account and organization
//! - `GET /api/oauth/usage` for window utilization and extra usage credits
//!
//! There is no invoice endpoint. The monthly invoice is the extra usage
//! consumed in the current billing period; subscription fees are not visible
//! through OAuth.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;

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

/// Beta header required by the OAuth endpoints.
const OAUTH_BETA: &str = "oauth-2025-04-20";

/// Length of the weekly usage window in days.
const WEEK_DAYS: i64 = 7;

// =============================================================================
// Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
struct ProfileResponse {
    account: Option<ProfileAccount>,
    organization: Option<ProfileOrganization>,
}

#[derive(Debug, Deserialize)]
struct ProfileAccount {
    #[serde(alias = "email_address")]
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProfileOrganization {
    uuid: Option<String>,
    name: Option<String>,
    organization_type: Option<String>,
}

impl ProfileOrganization {
    fn is_team(&self) -> bool {
        self.organization_type
            .as_deref()
            .is_some_and(|t| t.to_lowercase().contains("team"))
    }

    /// Numeric id derived from the first 60 bits of the organization UUID.
    fn numeric_id(&self) -> Option<i64> {
        let hex: String = self
            .uuid
            .as_deref()?
            .chars()
            .filter(char::is_ascii_hexdigit)
            .take(15)
            .collect();
        if hex.len() < 15 {
            return None;
        }
        i64::from_str_radix(&hex, 16).ok()
    }
}

#[derive(Debug, Deserialize)]
struct UsageResponse {
    five_hour: Option<UsageWindow>,
    seven_day: Option<UsageWindow>,
    extra_usage: Option<ExtraUsage>,
}

#[derive(Debug, Deserialize)]
struct UsageWindow {
    utilization: Option<f64>,
    resets_at: Option<String>,
}

impl UsageWindow {
    /// Utilization as a whole percentage. The API reports either a ratio or
    /// a percentage.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn percent(&self) -> u64 {
        let raw = self.utilization.unwrap_or(0.0).max(0.0);
        let pct = if raw > 1.0 { raw } else { raw * 100.0 };
        pct.round() as u64
    }
}

#[derive(Debug, Deserialize)]
struct ExtraUsage {
    is_enabled: Option<bool>,
    /// Cents.
    used_credits: Option<f64>,
    /// Cents.
    monthly_limit: Option<f64>,
}

// =============================================================================
// Client
// =============================================================================

/// Anthropic OAuth API client.
#[derive(Debug, Clone)]
pub struct ClaudeClient {
    http: Client,
    base_url: String,
}

impl ClaudeClient {
    #[must_use]
    pub fn new(http: Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn get(&self, path: &str, credential: &str) -> RequestBuilder {
        self.http
            .get(format!("{}{path}", self.base_url))
            .header(AUTHORIZATION, format!("Bearer {credential}"))
            .header(ACCEPT, "application/json")
            .header("anthropic-beta", OAUTH_BETA)
    }

    async fn profile(&self, credential: &str) -> Result<ProfileResponse> {
        send_json(
            Provider::Claude,
            EndpointKind::Auth,
            self.get("/api/oauth/profile", credential),
        )
        .await
    }

    async fn usage(&self, credential: &str) -> Result<UsageResponse> {
        send_json(
            Provider::Claude,
            EndpointKind::Data,
            self.get("/api/oauth/usage", credential),
        )
        .await
    }
}

#[async_trait]
impl ProviderClient for ClaudeClient {
    fn provider(&self) -> Provider {
        Provider::Claude
    }

    async fn fetch_team_info(&self, credential: &str) -> Result<ProviderTeamInfo> {
        let profile = self.profile(credential).await?;
        let teams: Vec<RawTeam> = profile
            .organization
            .filter(ProfileOrganization::is_team)
            .and_then(|org| {
                let id = org.numeric_id()?;
                Some(RawTeam {
                    id,
                    name: org.name.unwrap_or_else(|| "Team".to_string()),
                })
            })
            .into_iter()
            .collect();
        transform_team_info(Provider::Claude, &teams)
    }

    async fn fetch_user_info(&self, credential: &str) -> Result<ProviderUserInfo> {
        let profile = self.profile(credential).await?;
        let team_id = profile
            .organization
            .as_ref()
            .filter(|org| org.is_team())
            .and_then(ProfileOrganization::numeric_id);
        let email = profile.account.and_then(|a| a.email);
        transform_user_info(Provider::Claude, email, team_id)
    }

    async fn fetch_monthly_invoice(
        &self,
        credential: &str,
        month: u32,
        year: i32,
        _team_id: Option<i64>,
    ) -> Result<ProviderMonthlyInvoice> {
        let usage = self.usage(credential).await?;

        let mut lines = Vec::new();
        let mut plan = None;
        if let Some(extra) = usage.extra_usage.filter(|e| e.is_enabled == Some(true)) {
            #[allow(clippy::cast_possible_truncation)]
            let cents = extra.used_credits.unwrap_or(0.0).round() as i64;
            lines.push(RawInvoiceLine {
                cents,
                description: "Extra usage".to_string(),
            });
            plan = extra
                .monthly_limit
                .map(|limit| format!("Extra usage, ${:.2} monthly limit", limit / 100.0));
        }

        transform_invoice(Provider::Claude, month, year, lines, plan)
    }

    async fn fetch_usage_data(&self, credential: &str) -> Result<ProviderUsageData> {
        let usage = self.usage(credential).await?;

        let current = usage.five_hour.as_ref().map_or(0, UsageWindow::percent);
        let total = usage.seven_day.as_ref().map_or(current, UsageWindow::percent);
        let period_start = usage
            .seven_day
            .as_ref()
            .and_then(|w| w.resets_at.as_deref())
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|reset| {
                (reset.with_timezone(&Utc) - chrono::Duration::days(WEEK_DAYS)).to_rfc3339()
            });

        Ok(transform_usage(
            Provider::Claude,
            current,
            total,
            Some(100),
            period_start.as_deref(),
            Utc::now(),
        ))
    }
}
