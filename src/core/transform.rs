//! Raw response to domain record mapping.
//!
//! Provider clients decode their vendor-specific JSON into small raw structs
//! and hand the pieces to these functions. Nothing here performs I/O.

use chrono::{DateTime, NaiveDate, Utc};

use super::models::{
    ProviderInvoiceItem, ProviderMonthlyInvoice, ProviderTeamInfo, ProviderUsageData,
    ProviderUserInfo,
};
use super::provider::Provider;
use crate::error::{Result, SpendError};

/// A team entry as listed by a provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTeam {
    pub id: i64,
    pub name: String,
}

/// An invoice line as listed by a provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawInvoiceLine {
    pub cents: i64,
    pub description: String,
}

/// Pick the first listed team.
///
/// # Errors
///
/// `NoTeamFound` when the list is empty.
pub fn transform_team_info(provider: Provider, teams: &[RawTeam]) -> Result<ProviderTeamInfo> {
    let team = teams.first().ok_or(SpendError::NoTeamFound { provider })?;
    Ok(ProviderTeamInfo {
        id: team.id,
        name: team.name.clone(),
        provider,
    })
}

/// Build user info, rejecting a blank email.
///
/// # Errors
///
/// `Decoding` when the provider returned no usable email.
pub fn transform_user_info(
    provider: Provider,
    email: Option<String>,
    team_id: Option<i64>,
) -> Result<ProviderUserInfo> {
    let email = email
        .map(|e| e.trim().to_string())
        .filter(|e| !e.is_empty())
        .ok_or_else(|| SpendError::Decoding {
            provider,
            message: "user response has no email".to_string(),
            status_code: None,
        })?;

    Ok(ProviderUserInfo {
        email,
        team_id,
        provider,
    })
}

/// Build a monthly invoice. An empty line list is a valid zero-spend month.
///
/// # Errors
///
/// `Decoding` for negative line amounts or an out-of-range month.
pub fn transform_invoice(
    provider: Provider,
    month: u32,
    year: i32,
    lines: Vec<RawInvoiceLine>,
    pricing_plan_description: Option<String>,
) -> Result<ProviderMonthlyInvoice> {
    if !(1..=12).contains(&month) {
        return Err(SpendError::Decoding {
            provider,
            message: format!("invoice month {month} out of range"),
            status_code: None,
        });
    }

    let items = lines
        .into_iter()
        .map(|line| {
            if line.cents < 0 {
                return Err(SpendError::Decoding {
                    provider,
                    message: format!(
                        "negative amount {} for invoice item '{}'",
                        line.cents, line.description
                    ),
                    status_code: None,
                });
            }
            Ok(ProviderInvoiceItem {
                amount_cents: line.cents,
                description: line.description,
                provider,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(ProviderMonthlyInvoice {
        items,
        pricing_plan_description: pricing_plan_description.filter(|d| !d.trim().is_empty()),
        provider,
        month,
        year,
    })
}

/// Build usage counters. A missing or unparsable period start becomes `now`.
#[must_use]
pub fn transform_usage(
    provider: Provider,
    current_requests: u64,
    total_requests: u64,
    max_requests: Option<u64>,
    period_start: Option<&str>,
    now: DateTime<Utc>,
) -> ProviderUsageData {
    let period_start = period_start.and_then(parse_timestamp).unwrap_or_else(|| {
        tracing::debug!(%provider, "usage period start missing or unparsable, using now");
        now
    });

    ProviderUsageData {
        current_requests,
        total_requests,
        max_requests,
        period_start,
        provider,
    }
}

/// Parse an RFC 3339 timestamp or a bare `YYYY-MM-DD` date.
#[must_use]
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}
