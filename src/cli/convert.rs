//! `convert` command.

use super::output::{OutputOptions, render_conversion};
use crate::core::currency::{ExchangeRateClient, ExchangeRateTable, is_valid_code};
use crate::core::models::ConvertedAmount;
use crate::error::{Result, SpendError};

/// Convert an amount using the live rate feed.
///
/// Same-currency conversions never touch the network.
///
/// # Errors
///
/// `ConfigInvalid` for a malformed code, a feed error, or `Config` when the
/// feed has no rate for either code.
pub async fn execute(
    rates: &ExchangeRateClient,
    amount: f64,
    from: &str,
    to: &str,
    opts: OutputOptions,
) -> Result<()> {
    let from = normalize_code("from", from)?;
    let to = normalize_code("to", to)?;

    let table = if from == to {
        ExchangeRateTable::default()
    } else {
        rates.fetch().await?
    };

    let converted = table
        .convert(amount, &from, &to)
        .ok_or_else(|| SpendError::Config(format!("no exchange rate for {from} -> {to}")))?;

    let result = ConvertedAmount {
        amount: converted,
        currency: to,
    };
    println!("{}", render_conversion(amount, &from, &result, opts)?);
    Ok(())
}

fn normalize_code(key: &str, code: &str) -> Result<String> {
    let code = code.trim();
    if !is_valid_code(code) {
        return Err(SpendError::ConfigInvalid {
            key: key.to_string(),
            value: code.to_string(),
            message: "expected a three-letter currency code".to_string(),
        });
    }
    Ok(code.to_uppercase())
}
