//! Diagnostic logging to stderr or a file.
//!
//! Level resolution: `--log-level`, then `SPENDBAR_LOG`, then the config
//! file, then `warn`. `RUST_LOG` replaces the whole filter when set.

use std::fs::OpenOptions;
use std::path::PathBuf;

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

pub const LOG_LEVEL_ENV: &str = "SPENDBAR_LOG";
pub const LOG_FORMAT_ENV: &str = "SPENDBAR_LOG_FORMAT";
pub const LOG_FILE_ENV: &str = "SPENDBAR_LOG_FILE";

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable logs.
    #[default]
    Human,
    /// JSON logs (one event per line).
    Json,
    /// Compact logs (single line, terse).
    Compact,
}

impl LogFormat {
    /// Parse from string (case-insensitive).
    #[must_use]
    pub fn from_arg(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "human" | "pretty" => Some(Self::Human),
            "json" | "jsonl" => Some(Self::Json),
            "compact" => Some(Self::Compact),
            _ => None,
        }
    }
}

/// Diagnostic verbosity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    #[default]
    Warn,
    Error,
}

impl LogLevel {
    #[must_use]
    pub fn from_arg(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "trace" => Some(Self::Trace),
            "verbose" | "debug" => Some(Self::Debug),
            "info" => Some(Self::Info),
            "warn" | "warning" => Some(Self::Warn),
            "error" | "critical" => Some(Self::Error),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_filter(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Level from `SPENDBAR_LOG`.
#[must_use]
pub fn level_from_env() -> Option<LogLevel> {
    non_empty_env(LOG_LEVEL_ENV).and_then(|v| LogLevel::from_arg(&v))
}

/// Format from `SPENDBAR_LOG_FORMAT`.
#[must_use]
pub fn format_from_env() -> Option<LogFormat> {
    non_empty_env(LOG_FORMAT_ENV).and_then(|v| LogFormat::from_arg(&v))
}

/// File from `SPENDBAR_LOG_FILE`.
#[must_use]
pub fn file_from_env() -> Option<PathBuf> {
    non_empty_env(LOG_FILE_ENV).map(PathBuf::from)
}

/// Resolved logging options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogSettings {
    pub level: LogLevel,
    pub format: LogFormat,
    pub file: Option<PathBuf>,
}

impl LogSettings {
    /// Combine CLI flags, environment and the configured level.
    ///
    /// `verbose` raises the default level to `debug` but never overrides an
    /// explicit choice.
    #[must_use]
    pub fn resolve(
        cli_level: Option<LogLevel>,
        json_output: bool,
        verbose: bool,
        config_level: Option<LogLevel>,
    ) -> Self {
        let explicit = cli_level.or_else(level_from_env).or(config_level);
        let level = match explicit {
            Some(level) => level,
            None if verbose => LogLevel::Debug,
            None => LogLevel::default(),
        };
        let format = if json_output {
            LogFormat::Json
        } else {
            format_from_env().unwrap_or_default()
        };
        Self {
            level,
            format,
            file: file_from_env(),
        }
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(format!("spendbar={}", self.level.as_filter())))
    }
}

/// Install the global subscriber. A second call is a no-op.
pub fn init(settings: &LogSettings) {
    let file = settings.file.as_ref().and_then(|path| {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .ok()
    });
    let writer = file.map_or_else(
        || BoxMakeWriter::new(std::io::stderr),
        BoxMakeWriter::new,
    );
    let filter = settings.filter();

    let installed = match settings.format {
        LogFormat::Json => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .with_writer(writer)
            .with_span_events(FmtSpan::CLOSE)
            .try_init(),
        LogFormat::Compact => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .compact()
            .with_writer(writer)
            .with_target(true)
            .try_init(),
        LogFormat::Human => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(writer)
            .with_target(false)
            .try_init(),
    };

    if installed.is_ok() {
        tracing::debug!(
            level = settings.level.as_filter(),
            format = ?settings.format,
            "Logging initialized"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static ENV_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

    #[allow(unsafe_code)]
    fn with_env_var(key: &str, value: Option<&str>, f: impl FnOnce()) {
        let _guard = ENV_LOCK
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let prior = std::env::var(key).ok();
        unsafe {
            match value {
                Some(v) => std::env::set_var(key, v),
                None => std::env::remove_var(key),
            }
        }
        f();
        unsafe {
            match prior {
                Some(val) => std::env::set_var(key, val),
                None => std::env::remove_var(key),
            }
        }
    }

    #[test]
    fn level_parsing_accepts_aliases() {
        assert_eq!(LogLevel::from_arg("WARNING"), Some(LogLevel::Warn));
        assert_eq!(LogLevel::from_arg("verbose"), Some(LogLevel::Debug));
        assert_eq!(LogLevel::from_arg("loud"), None);
        assert_eq!(LogFormat::from_arg("jsonl"), Some(LogFormat::Json));
    }

    #[test]
    fn env_level_is_read() {
        with_env_var(LOG_LEVEL_ENV, Some("trace"), || {
            assert_eq!(level_from_env(), Some(LogLevel::Trace));
        });
        with_env_var(LOG_LEVEL_ENV, Some("  "), || {
            assert_eq!(level_from_env(), None);
        });
    }

    #[test]
    fn cli_level_beats_env_and_config() {
        with_env_var(LOG_LEVEL_ENV, Some("error"), || {
            let s = LogSettings::resolve(Some(LogLevel::Info), false, false, Some(LogLevel::Trace));
            assert_eq!(s.level, LogLevel::Info);

            let s = LogSettings::resolve(None, false, false, Some(LogLevel::Trace));
            assert_eq!(s.level, LogLevel::Error);
        });
    }

    #[test]
    fn verbose_only_raises_default() {
        with_env_var(LOG_LEVEL_ENV, None, || {
            assert_eq!(
                LogSettings::resolve(None, false, true, None).level,
                LogLevel::Debug
            );
            assert_eq!(
                LogSettings::resolve(None, false, true, Some(LogLevel::Error)).level,
                LogLevel::Error
            );
        });
    }

    #[test]
    fn json_output_forces_json_format() {
        let s = LogSettings::resolve(None, true, false, None);
        assert_eq!(s.format, LogFormat::Json);
    }
}
