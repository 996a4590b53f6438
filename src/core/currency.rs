//! Currency conversion against a USD-pivoted rate table.
//!
//! Provider invoices are always in USD. Display amounts are converted with
//! whatever rates are on hand; when a rate is missing the caller falls back
//! to USD rather than failing the refresh.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::http::{EndpointKind, send_json};
use super::provider::Provider;
use crate::error::Result;

/// Pivot currency of every rate table.
pub const BASE_CURRENCY: &str = "USD";

/// Default rate feed. Returns `{"base": "USD", "rates": {...}}`.
pub const DEFAULT_RATES_URL: &str = "https://open.er-api.com/v6/latest/USD";

/// Default maximum age before a table counts as stale.
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(24 * 60 * 60);

/// Convert `amount` between two currency codes.
///
/// Codes are compared case-insensitively. Returns `None` when either side
/// has no rate; converting a code to itself always succeeds.
#[must_use]
pub fn convert(amount: f64, from: &str, to: &str, rates: &HashMap<String, f64>) -> Option<f64> {
    let from = from.trim().to_uppercase();
    let to = to.trim().to_uppercase();
    if from == to {
        return Some(amount);
    }

    let from_rate = rate_for(&from, rates)?;
    let to_rate = rate_for(&to, rates)?;
    if from_rate <= 0.0 {
        return None;
    }
    Some(amount / from_rate * to_rate)
}

fn rate_for(code: &str, rates: &HashMap<String, f64>) -> Option<f64> {
    if code == BASE_CURRENCY {
        return Some(1.0);
    }
    rates
        .get(code)
        .or_else(|| {
            rates
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(code))
                .map(|(_, v)| v)
        })
        .copied()
        .filter(|r| r.is_finite())
}

/// Display symbol for a currency code, or the code itself.
#[must_use]
pub fn currency_symbol(code: &str) -> &str {
    match code.to_uppercase().as_str() {
        "USD" | "CAD" | "AUD" | "NZD" | "SGD" | "HKD" | "MXN" => "$",
        "EUR" => "€",
        "GBP" => "£",
        "JPY" | "CNY" => "¥",
        "INR" => "₹",
        "KRW" => "₩",
        "CHF" => "CHF ",
        "BRL" => "R$",
        "SEK" | "NOK" | "DKK" => "kr ",
        _ => code,
    }
}

/// Whether `code` looks like an ISO 4217 code.
#[must_use]
pub fn is_valid_code(code: &str) -> bool {
    code.len() == 3 && code.chars().all(|c| c.is_ascii_alphabetic())
}

// =============================================================================
// Rate table
// =============================================================================

/// Rates keyed by upper-case code, each expressed as units per USD.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeRateTable {
    pub rates_by_code: HashMap<String, f64>,
    pub last_updated: Option<DateTime<Utc>>,
}

impl ExchangeRateTable {
    #[must_use]
    pub fn new(rates: HashMap<String, f64>, last_updated: DateTime<Utc>) -> Self {
        let rates_by_code = rates
            .into_iter()
            .map(|(code, rate)| (code.to_uppercase(), rate))
            .collect();
        Self {
            rates_by_code,
            last_updated: Some(last_updated),
        }
    }

    /// True when the table was never loaded or is older than `max_age`.
    #[must_use]
    pub fn is_stale(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        let Some(updated) = self.last_updated else {
            return true;
        };
        let max_age = chrono::Duration::from_std(max_age).unwrap_or(chrono::Duration::MAX);
        now.signed_duration_since(updated) > max_age
    }

    #[must_use]
    pub fn convert(&self, amount: f64, from: &str, to: &str) -> Option<f64> {
        convert(amount, from, to, &self.rates_by_code)
    }

    /// Convert from USD, falling back to the USD amount when `target` is unknown.
    ///
    /// Returns the amount and the currency it is actually expressed in.
    #[must_use]
    pub fn from_usd_or_fallback(&self, amount_usd: f64, target: &str) -> (f64, String) {
        self.convert(amount_usd, BASE_CURRENCY, target).map_or_else(
            || (amount_usd, BASE_CURRENCY.to_string()),
            |converted| (converted, target.to_uppercase()),
        )
    }
}

// =============================================================================
// Rate client
// =============================================================================

#[derive(Debug, Deserialize)]
struct RatesResponse {
    #[serde(default, alias = "base_code")]
    base: Option<String>,
    rates: HashMap<String, f64>,
}

/// Fetches exchange rates from a JSON feed.
#[derive(Debug, Clone)]
pub struct ExchangeRateClient {
    http: Client,
    url: String,
}

impl ExchangeRateClient {
    #[must_use]
    pub fn new(http: Client, url: impl Into<String>) -> Self {
        Self {
            http,
            url: url.into(),
        }
    }

    /// Fetch the latest table, rebasing to USD if the feed uses another base.
    ///
    /// # Errors
    ///
    /// Classified HTTP errors from the feed, or `Decoding` when the feed's
    /// base has no rate.
    pub async fn fetch(&self) -> Result<ExchangeRateTable> {
        // Rate feeds have no provider of their own; errors are attributed to
        // the first provider so they share the HTTP taxonomy.
        let attribution = Provider::ALL[0];
        let response: RatesResponse = send_json(
            attribution,
            EndpointKind::Data,
            self.http.get(&self.url),
        )
        .await?;

        let base = response
            .base
            .unwrap_or_else(|| BASE_CURRENCY.to_string())
            .to_uppercase();
        let rates = rebase_to_usd(&base, response.rates).ok_or_else(|| {
            crate::error::SpendError::Decoding {
                provider: attribution,
                message: format!("rate feed has no USD rate for base {base}"),
                status_code: None,
            }
        })?;

        tracing::debug!(count = rates.len(), base = %base, "Exchange rates fetched");
        Ok(ExchangeRateTable::new(rates, Utc::now()))
    }
}

fn rebase_to_usd(base: &str, rates: HashMap<String, f64>) -> Option<HashMap<String, f64>> {
    if base == BASE_CURRENCY {
        return Some(rates);
    }
    let usd_per_base = rates
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(BASE_CURRENCY))
        .map(|(_, v)| *v)
        .filter(|v| *v > 0.0)?;
    let mut rebased: HashMap<String, f64> = rates
        .into_iter()
        .map(|(code, rate)| (code.to_uppercase(), rate / usd_per_base))
        .collect();
    rebased.insert(base.to_string(), 1.0 / usd_per_base);
    Some(rebased)
}
