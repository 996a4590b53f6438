//! Vendor-neutral domain records.
//!
//! Provider clients produce these through the transform functions; the
//! aggregator stores them and the CLI renders them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::provider::Provider;

// =============================================================================
// Identity
// =============================================================================

/// A team the account belongs to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProviderTeamInfo {
    pub id: i64,
    pub name: String,
    pub provider: Provider,
}

/// The signed-in user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProviderUserInfo {
    pub email: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub team_id: Option<i64>,

    pub provider: Provider,
}

// =============================================================================
// Invoice
// =============================================================================

/// One line of a monthly invoice.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProviderInvoiceItem {
    /// Amount in cents, never negative.
    pub amount_cents: i64,
    pub description: String,
    pub provider: Provider,
}

/// A month of billed usage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProviderMonthlyInvoice {
    pub items: Vec<ProviderInvoiceItem>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub pricing_plan_description: Option<String>,

    pub provider: Provider,

    /// Calendar month, 1-12.
    pub month: u32,

    pub year: i32,
}

impl ProviderMonthlyInvoice {
    /// Sum of all item amounts in cents. Zero for an empty invoice.
    #[must_use]
    pub fn total_cents(&self) -> i64 {
        self.items.iter().map(|item| item.amount_cents).sum()
    }

    /// Total spend in USD.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn total_usd(&self) -> f64 {
        self.total_cents() as f64 / 100.0
    }
}

// =============================================================================
// Usage
// =============================================================================

/// Request counters for the current billing period.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProviderUsageData {
    pub current_requests: u64,
    pub total_requests: u64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_requests: Option<u64>,

    pub period_start: DateTime<Utc>,
    pub provider: Provider,
}

impl ProviderUsageData {
    /// Share of the request allowance consumed, 0-100.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn used_percent(&self) -> Option<f64> {
        self.max_requests
            .filter(|max| *max > 0)
            .map(|max| (self.current_requests as f64 / max as f64) * 100.0)
    }
}

// =============================================================================
// Session
// =============================================================================

/// Login state for one provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProviderSession {
    pub provider: Provider,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub team_id: Option<i64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub team_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_email: Option<String>,

    pub is_active: bool,
    pub last_updated: DateTime<Utc>,
}

impl ProviderSession {
    /// A fresh, active session with no identity facts yet.
    #[must_use]
    pub fn new(provider: Provider) -> Self {
        Self {
            provider,
            team_id: None,
            team_name: None,
            user_email: None,
            is_active: true,
            last_updated: Utc::now(),
        }
    }
}

// =============================================================================
// Connection Status
// =============================================================================

/// Connection state machine for a provider.
///
/// `Disconnected -> Connecting -> (Connected | Error | RateLimited)`, then
/// `Connected -> Syncing -> (Connected | Error | RateLimited)` on later
/// refreshes.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Syncing,
    Error {
        message: String,
    },
    RateLimited {
        until: DateTime<Utc>,
    },
}

impl ConnectionStatus {
    /// Status to show while a refresh is in flight.
    #[must_use]
    pub const fn refreshing(&self) -> Self {
        match self {
            Self::Connected | Self::Syncing => Self::Syncing,
            _ => Self::Connecting,
        }
    }

    #[must_use]
    pub const fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    #[must_use]
    pub const fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }

    /// Short label for status lines.
    #[must_use]
    pub fn label(&self) -> String {
        match self {
            Self::Disconnected => "disconnected".to_string(),
            Self::Connecting => "connecting".to_string(),
            Self::Connected => "connected".to_string(),
            Self::Syncing => "syncing".to_string(),
            Self::Error { message } => format!("error: {message}"),
            Self::RateLimited { until } => {
                format!("rate limited until {}", until.format("%H:%M:%S UTC"))
            }
        }
    }
}

// =============================================================================
// Spending read model
// =============================================================================

/// Per-provider read model consumed by renderers and threshold logic.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProviderSpendingData {
    pub provider: Provider,

    /// `None` until an invoice has been fetched.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spending_usd: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub spending_in_display_currency: Option<f64>,

    /// Currency of the `*_display_currency` fields (USD when conversion failed).
    pub display_currency: String,

    pub connection_status: ConnectionStatus,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_invoice: Option<ProviderMonthlyInvoice>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage_data: Option<ProviderUsageData>,

    pub warning_limit_in_display_currency: f64,
    pub upper_limit_in_display_currency: f64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
}

impl ProviderSpendingData {
    /// Empty record for a provider with nothing fetched yet.
    #[must_use]
    pub fn new(provider: Provider) -> Self {
        Self {
            provider,
            spending_usd: None,
            spending_in_display_currency: None,
            display_currency: "USD".to_string(),
            connection_status: ConnectionStatus::Disconnected,
            last_error: None,
            latest_invoice: None,
            usage_data: None,
            warning_limit_in_display_currency: 0.0,
            upper_limit_in_display_currency: 0.0,
            last_updated: None,
        }
    }

    /// Whether this provider counts toward the cross-provider total.
    #[must_use]
    pub const fn contributes_to_total(&self) -> bool {
        self.spending_usd.is_some() && !self.connection_status.is_error()
    }
}

/// An amount tagged with the currency it is expressed in.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConvertedAmount {
    pub amount: f64,
    pub currency: String,
}
