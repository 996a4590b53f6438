//! One-shot refresh of every enabled provider.

use super::App;
use super::output::OutputOptions;
use super::run::render_cycle;
use crate::core::currency::BASE_CURRENCY;
use crate::core::orchestrator::RefreshStatus;
use crate::error::{Result, SpendError};

/// Refresh once, print the result.
///
/// # Errors
///
/// `NotLoggedIn` when no enabled provider has a credential, or a rendering
/// error.
pub async fn execute(app: &App, opts: OutputOptions) -> Result<()> {
    let target = app.orchestrator.settings().target_currency.to_uppercase();
    if target != BASE_CURRENCY {
        // Failure keeps USD amounts; it is already logged.
        let _ = app
            .orchestrator
            .refresh_exchange_rates(&app.rates, app.config.rates_max_age())
            .await;
    }

    let cycle = app.orchestrator.refresh_all().await;

    if let Some(first) = cycle.reports.first()
        && cycle
            .reports
            .iter()
            .all(|r| r.status == RefreshStatus::NotLoggedIn)
    {
        return Err(SpendError::NotLoggedIn {
            provider: first.provider,
        });
    }

    println!("{}", render_cycle(&app.orchestrator, &cycle, opts).await?);
    Ok(())
}
