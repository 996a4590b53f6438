//! Continuous polling mode.
//!
//! Runs refresh cycles on the configured interval, prints each result and
//! stops cleanly on Ctrl+C.

use std::sync::Arc;

use tokio::sync::mpsc;

use super::App;
use super::args::RunArgs;
use super::output::{OutputOptions, render_refresh};
use crate::core::orchestrator::{CycleReport, Orchestrator};
use crate::error::Result;

/// Render `cycle` with the total in the currency the settings name now.
pub(super) async fn render_cycle(
    orchestrator: &Orchestrator,
    cycle: &CycleReport,
    opts: OutputOptions,
) -> Result<String> {
    let target = orchestrator.settings().target_currency.to_uppercase();
    let aggregator = orchestrator.aggregator();
    let snapshot = aggregator.snapshot().await;
    let rates = orchestrator.exchange_rates().await;
    let total = aggregator
        .total_spending_converted(&target, &rates.rates_by_code)
        .await;
    render_refresh(&snapshot, &total, cycle, opts)
}

/// Poll until interrupted.
///
/// # Errors
///
/// Returns an error for an invalid interval or if rendering fails.
pub async fn execute(app: &App, args: &RunArgs, opts: OutputOptions) -> Result<()> {
    args.validate()?;
    let orchestrator = Arc::clone(&app.orchestrator);
    let max_age = app.config.rates_max_age();

    let _ = orchestrator
        .refresh_exchange_rates(&app.rates, max_age)
        .await;
    let rate_task = orchestrator.spawn_rate_refresher(
        app.rates.clone(),
        app.config.rates_refresh_interval(),
        max_age,
    );

    // Ctrl+C handler for clean shutdown.
    {
        let orchestrator = Arc::clone(&orchestrator);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                orchestrator.shutdown();
            }
        });
    }

    let (tx, mut rx) = mpsc::unbounded_channel::<CycleReport>();
    let renderer = {
        let orchestrator = Arc::clone(&orchestrator);
        tokio::spawn(async move {
            while let Some(cycle) = rx.recv().await {
                println!("{}", render_cycle(&orchestrator, &cycle, opts).await?);
            }
            Ok::<(), crate::error::SpendError>(())
        })
    };

    tracing::info!(
        minutes = app.config.general.refresh_interval_minutes,
        "Polling started"
    );
    orchestrator
        .run(move |cycle| {
            let _ = tx.send(cycle.clone());
        })
        .await;

    let _ = rate_task.await;
    match renderer.await {
        Ok(result) => result,
        Err(e) => {
            tracing::error!(error = %e, "Renderer task failed");
            Ok(())
        }
    }
}
