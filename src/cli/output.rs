//! Rendering of spending snapshots and cycle results.
//!
//! Human output is a short colored table; JSON output wraps the payload in a
//! `{ "command", "generatedAt", "data" }` envelope.

use chrono::{DateTime, Utc};
use colored::Colorize;
use serde::Serialize;

use super::args::OutputFormat;
use crate::core::aggregator::SpendingSnapshot;
use crate::core::models::{ConnectionStatus, ConvertedAmount, ProviderSpendingData};
use crate::core::orchestrator::CycleReport;
use crate::error::Result;
use crate::util::format::{format_money, format_percent};
use crate::util::time::{format_countdown, format_relative_time};

/// Rendering options shared by every command.
#[derive(Debug, Clone, Copy)]
pub struct OutputOptions {
    pub format: OutputFormat,
    pub pretty: bool,
    pub color: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Envelope<'a, T: Serialize> {
    command: &'a str,
    generated_at: DateTime<Utc>,
    data: &'a T,
}

/// Serialize `data` inside the JSON envelope.
///
/// # Errors
///
/// Returns a JSON error if serialization fails.
pub fn render_json<T: Serialize>(command: &str, data: &T, pretty: bool) -> Result<String> {
    let envelope = Envelope {
        command,
        generated_at: Utc::now(),
        data,
    };
    Ok(if pretty {
        serde_json::to_string_pretty(&envelope)?
    } else {
        serde_json::to_string(&envelope)?
    })
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshOutput<'a> {
    snapshot: &'a SpendingSnapshot,
    total: &'a ConvertedAmount,
    cycle: &'a CycleReport,
}

/// Render the outcome of a refresh cycle.
///
/// # Errors
///
/// Returns a JSON error if serialization fails.
pub fn render_refresh(
    snapshot: &SpendingSnapshot,
    total: &ConvertedAmount,
    cycle: &CycleReport,
    opts: OutputOptions,
) -> Result<String> {
    match opts.format {
        OutputFormat::Json => render_json(
            "refresh",
            &RefreshOutput {
                snapshot,
                total,
                cycle,
            },
            opts.pretty,
        ),
        OutputFormat::Human => Ok(render_human(snapshot, total, cycle, opts.color, Utc::now())),
    }
}

/// Human-readable table of providers, the total and any alerts.
#[must_use]
pub fn render_human(
    snapshot: &SpendingSnapshot,
    total: &ConvertedAmount,
    cycle: &CycleReport,
    color: bool,
    now: DateTime<Utc>,
) -> String {
    colored::control::set_override(color);
    let mut out = String::new();

    if snapshot.providers.is_empty() {
        out.push_str("No providers configured. Run `spendbar login <provider>` to start.\n");
    }

    for data in snapshot.providers.values() {
        out.push_str(&provider_line(data, now));
        out.push('\n');
        if let Some(session) = snapshot.sessions.get(&data.provider)
            && let Some(email) = &session.user_email
        {
            let team = session
                .team_name
                .as_deref()
                .map(|t| format!(" ({t})"))
                .unwrap_or_default();
            out.push_str(&format!("    {}{}\n", email.dimmed(), team.dimmed()));
        }
    }

    out.push_str(&format!(
        "{} {}\n",
        "Total".bold(),
        format_money(total.amount, &total.currency).bold()
    ));

    for alert in &cycle.alerts {
        let line = format!(
            "! {} spending {} reached the {} limit of {}",
            alert.scope_label,
            format_money(alert.spending, &alert.currency),
            match alert.kind {
                crate::core::notifications::AlertKind::Warning => "warning",
                crate::core::notifications::AlertKind::Upper => "upper",
            },
            format_money(alert.limit, &alert.currency),
        );
        out.push_str(&format!("{}\n", line.red().bold()));
    }

    colored::control::unset_override();
    out
}

fn provider_line(data: &ProviderSpendingData, now: DateTime<Utc>) -> String {
    let name = format!("{:<8}", data.provider.display_name()).bold();
    let amount = match (data.spending_in_display_currency, data.spending_usd) {
        (Some(amount), _) => format_money(amount, &data.display_currency),
        (None, Some(usd)) => format_money(usd, "USD"),
        (None, None) => "-".to_string(),
    };

    let amount = if data.upper_limit_in_display_currency > 0.0
        && data.spending_in_display_currency.unwrap_or(0.0) >= data.upper_limit_in_display_currency
    {
        amount.red().to_string()
    } else if data.warning_limit_in_display_currency > 0.0
        && data.spending_in_display_currency.unwrap_or(0.0)
            >= data.warning_limit_in_display_currency
    {
        amount.yellow().to_string()
    } else {
        amount.green().to_string()
    };

    let usage = data
        .usage_data
        .as_ref()
        .and_then(crate::core::models::ProviderUsageData::used_percent)
        .map(|p| format!("  {} of requests", format_percent(p)))
        .unwrap_or_default();

    let updated = data
        .last_updated
        .map(|t| format!("  updated {}", format_relative_time(t, now)))
        .unwrap_or_default();

    format!(
        "{name} {amount:>12}  {}{usage}{}",
        status_label(&data.connection_status, now),
        updated.dimmed()
    )
}

fn status_label(status: &ConnectionStatus, now: DateTime<Utc>) -> String {
    match status {
        ConnectionStatus::Connected => "connected".green().to_string(),
        ConnectionStatus::Connecting | ConnectionStatus::Syncing => {
            status.label().cyan().to_string()
        }
        ConnectionStatus::Disconnected => "not logged in".dimmed().to_string(),
        ConnectionStatus::Error { message } => format!("error: {message}").red().to_string(),
        ConnectionStatus::RateLimited { until } => {
            format!("rate limited, retry {}", format_countdown(*until, now))
                .yellow()
                .to_string()
        }
    }
}

/// Render a currency conversion.
///
/// # Errors
///
/// Returns a JSON error if serialization fails.
pub fn render_conversion(
    amount: f64,
    from: &str,
    converted: &ConvertedAmount,
    opts: OutputOptions,
) -> Result<String> {
    match opts.format {
        OutputFormat::Json => render_json("convert", converted, opts.pretty),
        OutputFormat::Human => Ok(format!(
            "{} = {}",
            format_money(amount, from),
            format_money(converted.amount, &converted.currency)
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::notifications::{AlertKind, AlertScope};
    use crate::core::orchestrator::FiredAlert;
    use crate::core::provider::Provider;
    use crate::{assert_contains, assert_json_valid, assert_no_ansi_codes};

    fn snapshot() -> SpendingSnapshot {
        let mut cursor = ProviderSpendingData::new(Provider::Cursor);
        cursor.spending_usd = Some(40.0);
        cursor.spending_in_display_currency = Some(40.0);
        cursor.connection_status = ConnectionStatus::Connected;

        let mut claude = ProviderSpendingData::new(Provider::Claude);
        claude.connection_status = ConnectionStatus::Error {
            message: "Session expired".into(),
        };

        let mut snapshot = SpendingSnapshot::default();
        snapshot.providers.insert(Provider::Cursor, cursor);
        snapshot.providers.insert(Provider::Claude, claude);
        snapshot
    }

    fn total() -> ConvertedAmount {
        ConvertedAmount {
            amount: 40.0,
            currency: "USD".into(),
        }
    }

    #[test]
    fn human_output_lists_providers_and_total() {
        let out = render_human(&snapshot(), &total(), &CycleReport::default(), false, Utc::now());
        assert_no_ansi_codes!(&out);
        assert_contains!(&out, "Cursor");
        assert_contains!(&out, "$40.00");
        assert_contains!(&out, "error: Session expired");
        assert_contains!(&out, "Total $40.00");
    }

    #[test]
    fn human_output_shows_alerts() {
        let cycle = CycleReport {
            reports: Vec::new(),
            alerts: vec![FiredAlert {
                scope: AlertScope::Provider(Provider::Cursor),
                scope_label: "Cursor".into(),
                kind: AlertKind::Warning,
                spending: 250.0,
                limit: 200.0,
                currency: "USD".into(),
            }],
        };
        let out = render_human(&snapshot(), &total(), &cycle, false, Utc::now());
        assert_contains!(&out, "Cursor spending $250.00 reached the warning limit of $200.00");
    }

    #[test]
    fn json_output_is_enveloped() {
        let opts = OutputOptions {
            format: OutputFormat::Json,
            pretty: false,
            color: false,
        };
        let out = render_refresh(&snapshot(), &total(), &CycleReport::default(), opts).unwrap();
        assert_json_valid!(&out);
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["command"], "refresh");
        assert_eq!(value["data"]["total"]["amount"], 40.0);
    }

    #[test]
    fn conversion_human() {
        let opts = OutputOptions {
            format: OutputFormat::Human,
            pretty: false,
            color: false,
        };
        let converted = ConvertedAmount {
            amount: 9.2,
            currency: "EUR".into(),
        };
        assert_eq!(
            render_conversion(10.0, "USD", &converted, opts).unwrap(),
            "$10.00 = €9.20"
        );
    }
}
