//! spendbar - AI coding assistant spend tracker
//!
//! CLI entry point.

#![forbid(unsafe_code)]
#![warn(clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

use clap::Parser;
use std::process::ExitCode;

use spendbar::cli::{App, Cli, Commands, OutputOptions};
use spendbar::core::logging::{self, LogLevel, LogSettings};
use spendbar::storage::Config;
use spendbar::util::env::should_use_color;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Config errors are reported after logging is up.
    let config = Config::load();
    let config_level = config.as_ref().ok().and_then(Config::log_level);
    let cli_level = cli.log_level.as_deref().and_then(LogLevel::from_arg);
    logging::init(&LogSettings::resolve(
        cli_level,
        cli.json_output,
        cli.verbose,
        config_level,
    ));

    let opts = OutputOptions {
        format: cli.effective_format(),
        pretty: cli.pretty,
        color: should_use_color(cli.no_color),
    };

    let result = match config {
        Ok(config) => run(cli, config, opts).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(code = e.error_code(), "{e}");
            eprintln!("Error [{}]: {e}", e.error_code());
            ExitCode::from(e.exit_code() as u8)
        }
    }
}

async fn run(cli: Cli, config: Config, opts: OutputOptions) -> spendbar::Result<()> {
    match cli.command {
        None => {
            print_quickstart();
            Ok(())
        }

        Some(Commands::Convert(args)) => {
            let app = App::build(config, None)?;
            spendbar::cli::convert::execute(&app.rates, args.amount, &args.from, &args.to, opts)
                .await
        }

        Some(Commands::Refresh) => {
            let app = App::build(config, None)?;
            spendbar::cli::refresh::execute(&app, opts).await
        }

        Some(Commands::Run(args)) => {
            let app = App::build(config, args.interval_minutes)?;
            spendbar::cli::run::execute(&app, &args, opts).await
        }

        Some(Commands::Login(args)) => {
            let app = App::build(config, None)?;
            spendbar::cli::login::login(&app, &args, opts).await
        }

        Some(Commands::Logout(arg)) => {
            let app = App::build(config, None)?;
            spendbar::cli::login::logout(&app, &arg, opts).await
        }
    }
}

/// Print quickstart help when no command is given.
fn print_quickstart() {
    println!(
        r"spendbar - AI coding assistant spend tracker

Tracks monthly Cursor and Claude spending and warns when limits are reached.

USAGE:
    spendbar [OPTIONS] <COMMAND>

COMMANDS:
    run             Poll providers until interrupted
    refresh         Refresh once and print spending
    login           Store a credential for a provider
    logout          Forget a provider's credential
    convert         Convert an amount between currencies

QUICK START:
    spendbar login cursor            # Paste your session token
    spendbar refresh                 # Show this month's spending
    spendbar run --interval-minutes 10
    spendbar convert 25 --to EUR

For more help: spendbar --help
"
    );
    println!("Version: {}", env!("CARGO_PKG_VERSION"));
}
