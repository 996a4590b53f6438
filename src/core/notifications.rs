//! Spending threshold alerts.
//!
//! Each scope (a provider or the cross-provider total) has a "notified" flag
//! per limit. A limit fires once when spend reaches it and re-arms only when
//! spend drops back below it, on a new login, or on explicit reset.

use std::collections::HashMap;
use std::fmt;

use serde::Serialize;

use super::currency::currency_symbol;
use super::provider::Provider;

/// What an alert is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlertScope {
    Provider(Provider),
    Total,
}

impl fmt::Display for AlertScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Provider(p) => write!(f, "{p}"),
            Self::Total => f.write_str("Total"),
        }
    }
}

/// Which limit was crossed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertKind {
    Warning,
    Upper,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Flags {
    warning: bool,
    upper: bool,
}

/// Per-scope "already notified" flags.
#[derive(Debug, Default)]
pub struct NotificationLimitState {
    flags: HashMap<AlertScope, Flags>,
}

impl NotificationLimitState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluate `spend` against the limits and update the flags.
    ///
    /// The upper limit wins when both are crossed in one step and marks the
    /// warning as notified too. A limit at or below zero is disabled.
    pub fn evaluate(
        &mut self,
        scope: AlertScope,
        spend: f64,
        warning_limit: f64,
        upper_limit: f64,
    ) -> Option<AlertKind> {
        let flags = self.flags.entry(scope).or_default();
        let warning_enabled = warning_limit > 0.0;
        let upper_enabled = upper_limit > 0.0;

        if !warning_enabled || spend < warning_limit {
            flags.warning = false;
        }
        if !upper_enabled || spend < upper_limit {
            flags.upper = false;
        }

        if upper_enabled && spend >= upper_limit && !flags.upper {
            flags.upper = true;
            if warning_enabled && spend >= warning_limit {
                flags.warning = true;
            }
            return Some(AlertKind::Upper);
        }
        if warning_enabled && spend >= warning_limit && !flags.warning {
            flags.warning = true;
            return Some(AlertKind::Warning);
        }
        None
    }

    #[must_use]
    pub fn is_notified(&self, scope: AlertScope, kind: AlertKind) -> bool {
        self.flags.get(&scope).is_some_and(|f| match kind {
            AlertKind::Warning => f.warning,
            AlertKind::Upper => f.upper,
        })
    }

    pub fn reset(&mut self, scope: AlertScope) {
        self.flags.remove(&scope);
    }

    pub fn reset_all(&mut self) {
        self.flags.clear();
    }
}

// =============================================================================
// Sink
// =============================================================================

/// Receives threshold alerts. Amounts are in `currency`.
pub trait NotificationSink: Send + Sync {
    fn show_warning(&self, scope: AlertScope, spending: f64, limit: f64, currency: &str);
    fn show_upper(&self, scope: AlertScope, spending: f64, limit: f64, currency: &str);

    fn notify(&self, kind: AlertKind, scope: AlertScope, spending: f64, limit: f64, currency: &str) {
        match kind {
            AlertKind::Warning => self.show_warning(scope, spending, limit, currency),
            AlertKind::Upper => self.show_upper(scope, spending, limit, currency),
        }
    }
}

/// Emits alerts as `warn` log events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotificationSink;

impl NotificationSink for TracingNotificationSink {
    fn show_warning(&self, scope: AlertScope, spending: f64, limit: f64, currency: &str) {
        let symbol = currency_symbol(currency);
        tracing::warn!(
            scope = %scope,
            spending,
            limit,
            currency,
            "{scope} spending {symbol}{spending:.2} reached the warning limit of {symbol}{limit:.2}"
        );
    }

    fn show_upper(&self, scope: AlertScope, spending: f64, limit: f64, currency: &str) {
        let symbol = currency_symbol(currency);
        tracing::warn!(
            scope = %scope,
            spending,
            limit,
            currency,
            "{scope} spending {symbol}{spending:.2} reached the upper limit of {symbol}{limit:.2}"
        );
    }
}
