//! Number formatting utilities.

use crate::core::currency::currency_symbol;

/// Format a percentage without decimals.
#[must_use]
pub fn format_percent(value: f64) -> String {
    format!("{value:.0}%")
}

/// Format an amount with its currency symbol, e.g. `€12.50`.
///
/// Codes without a known symbol are suffixed instead: `12.50 PLN`.
#[must_use]
pub fn format_money(amount: f64, currency: &str) -> String {
    let symbol = currency_symbol(currency);
    if symbol == currency {
        format!("{amount:.2} {}", currency.to_uppercase())
    } else {
        format!("{symbol}{amount:.2}")
    }
}
