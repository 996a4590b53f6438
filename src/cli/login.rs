//! `login` and `logout` commands.

use std::io::{BufRead, IsTerminal};

use serde::Serialize;

use super::App;
use super::args::{LoginArgs, OutputFormat, ProviderArg};
use super::output::{OutputOptions, render_json};
use crate::core::orchestrator::{RefreshReport, RefreshStatus};
use crate::core::provider::Provider;
use crate::error::{Result, SpendError};

/// Validate and store a credential, then refresh the provider.
///
/// # Errors
///
/// `InvalidProvider`, `Unauthorized` when the provider rejects the
/// credential, or a credential store error.
pub async fn login(app: &App, args: &LoginArgs, opts: OutputOptions) -> Result<()> {
    let provider = args.target.provider()?;
    let credential = match args.token.as_deref() {
        Some(token) => token.to_string(),
        None => read_credential(provider, std::io::stdin().lock())?,
    };

    let report = app.orchestrator.on_login_success(provider, &credential).await?;
    println!("{}", render_login(provider, &report, opts)?);
    Ok(())
}

/// Forget a provider's credential and data.
///
/// # Errors
///
/// `InvalidProvider` or a credential store error.
pub async fn logout(app: &App, arg: &ProviderArg, opts: OutputOptions) -> Result<()> {
    let provider = arg.provider()?;
    app.orchestrator.logout(provider).await?;

    match opts.format {
        OutputFormat::Json => {
            #[derive(Serialize)]
            struct LoggedOut {
                provider: Provider,
            }
            println!(
                "{}",
                render_json("logout", &LoggedOut { provider }, opts.pretty)?
            );
        }
        OutputFormat::Human => println!("Logged out of {}.", provider.display_name()),
    }
    Ok(())
}

/// Read one credential line, prompting when stdin is a terminal.
fn read_credential(provider: Provider, mut input: impl BufRead) -> Result<String> {
    if std::io::stdin().is_terminal() {
        eprintln!(
            "Paste your {} credential (sign in at {}):",
            provider.display_name(),
            provider.login_url()
        );
    }

    let mut line = String::new();
    input.read_line(&mut line)?;
    let credential = line.trim();
    if credential.is_empty() {
        return Err(SpendError::Config(format!(
            "no credential provided for {provider}"
        )));
    }
    Ok(credential.to_string())
}

fn render_login(provider: Provider, report: &RefreshReport, opts: OutputOptions) -> Result<String> {
    if opts.format == OutputFormat::Json {
        return render_json("login", report, opts.pretty);
    }

    let detail = match &report.status {
        RefreshStatus::Succeeded => "spending refreshed".to_string(),
        RefreshStatus::Failed { message } => format!("first refresh failed: {message}"),
        RefreshStatus::RateLimited { until } => {
            format!("rate limited until {}", until.format("%H:%M UTC"))
        }
        RefreshStatus::NotLoggedIn | RefreshStatus::Disabled => {
            "provider is disabled in config".to_string()
        }
        RefreshStatus::Cancelled => "refresh cancelled".to_string(),
    };
    Ok(format!("Logged in to {} ({detail}).", provider.display_name()))
}
