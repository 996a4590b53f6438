//! CLI argument definitions using clap.

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::core::provider::Provider;
use crate::error::Result;

/// Track monthly spending on AI coding assistants.
#[derive(Parser, Debug)]
#[command(name = "spendbar")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    // === Global flags ===
    /// Output format
    #[arg(long, value_enum, default_value = "human", global = true)]
    pub format: OutputFormat,

    /// Shorthand for --format json
    #[arg(long, global = true)]
    pub json: bool,

    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pub pretty: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Log level
    #[arg(long, value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Emit JSONL logs to stderr
    #[arg(long, global = true)]
    pub json_output: bool,

    /// Verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

impl Cli {
    /// Resolve the effective output format.
    #[must_use]
    pub fn effective_format(&self) -> OutputFormat {
        if self.json {
            OutputFormat::Json
        } else {
            self.format
        }
    }
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Poll providers on an interval until interrupted
    Run(RunArgs),

    /// Refresh every enabled provider once and print spending
    Refresh,

    /// Store a credential for a provider
    Login(LoginArgs),

    /// Forget a provider's credential and data
    Logout(ProviderArg),

    /// Convert an amount between currencies
    Convert(ConvertArgs),
}

/// Arguments for the `run` command.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Minutes between refreshes (overrides config)
    #[arg(long, value_name = "MINUTES")]
    pub interval_minutes: Option<u64>,
}

impl RunArgs {
    /// Validate argument combinations.
    ///
    /// # Errors
    ///
    /// `Config` when the interval is zero.
    pub fn validate(&self) -> Result<()> {
        if self.interval_minutes == Some(0) {
            return Err(crate::error::SpendError::Config(
                "Refresh interval must be greater than 0 minutes".to_string(),
            ));
        }
        Ok(())
    }
}

/// A single provider name.
#[derive(Args, Debug)]
pub struct ProviderArg {
    /// Provider (cursor or claude)
    #[arg(value_name = "PROVIDER")]
    pub provider: String,
}

impl ProviderArg {
    /// Parse the provider name.
    ///
    /// # Errors
    ///
    /// `InvalidProvider` for an unknown name.
    pub fn provider(&self) -> Result<Provider> {
        Provider::from_cli_name(&self.provider)
    }
}

/// Arguments for the `login` command.
#[derive(Args, Debug)]
pub struct LoginArgs {
    #[command(flatten)]
    pub target: ProviderArg,

    /// Credential to store; read from stdin when omitted
    #[arg(long, env = "SPENDBAR_TOKEN", hide_env_values = true)]
    pub token: Option<String>,
}

/// Arguments for the `convert` command.
#[derive(Args, Debug)]
pub struct ConvertArgs {
    /// Amount to convert
    #[arg(allow_negative_numbers = true)]
    pub amount: f64,

    /// Source currency code
    #[arg(long, default_value = "USD")]
    pub from: String,

    /// Target currency code
    #[arg(long)]
    pub to: String,
}

/// Output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable output
    #[default]
    Human,
    /// JSON output
    Json,
}
