//! Error types for spendbar.
//!
//! Uses `thiserror` for structured error types that map to exit codes.
//!
//! ## Error Taxonomy
//!
//! Provider calls fail with one of a small set of variants that the retry
//! layer classifies:
//! - **Authentication**: `Unauthorized` (credential invalid or expired)
//! - **Provider**: `NoTeamFound`, `RateLimited`, `ServiceUnavailable`,
//!   `ServerError`, `Decoding`
//! - **Network**: `Network` (unclassified HTTP failure) and `Transport`
//!   (timeout, DNS, refused or dropped connections)
//!
//! The remaining variants cover configuration, credential storage and local
//! I/O. Each error has a stable error code (e.g., `SPEND-A001`).

use std::time::Duration;
use thiserror::Error;

use crate::core::provider::Provider;

// =============================================================================
// Error Categories
// =============================================================================

/// High-level error categories for classification and routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Credential invalid, expired or missing.
    Authentication,
    /// Transport failures and unclassified HTTP errors.
    Network,
    /// Config parse errors, invalid values.
    Configuration,
    /// Vendor-side conditions (rate limits, outages, contract changes).
    Provider,
    /// Keyring and other local environment problems.
    Environment,
    /// Bugs, unexpected state, unclassified.
    Internal,
}

impl ErrorCategory {
    /// Returns a human-readable description of the category.
    #[must_use]
    pub const fn description(&self) -> &'static str {
        match self {
            Self::Authentication => "Authentication error",
            Self::Network => "Network error",
            Self::Configuration => "Configuration error",
            Self::Provider => "Provider error",
            Self::Environment => "Environment error",
            Self::Internal => "Internal error",
        }
    }

    /// Returns a short code prefix for this category.
    #[must_use]
    pub const fn code_prefix(&self) -> &'static str {
        match self {
            Self::Authentication => "A",
            Self::Network => "N",
            Self::Configuration => "C",
            Self::Provider => "P",
            Self::Environment => "E",
            Self::Internal => "X",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description())
    }
}

// =============================================================================
// Transport failure kinds
// =============================================================================

/// What went wrong below the HTTP layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    Timeout,
    Dns,
    ConnectionRefused,
    ConnectionLost,
    Offline,
    Tls,
    Other,
}

impl TransportKind {
    /// Whether a retry has a realistic chance of succeeding.
    #[must_use]
    pub const fn is_transient(self) -> bool {
        matches!(
            self,
            Self::Timeout | Self::Dns | Self::ConnectionRefused | Self::ConnectionLost | Self::Offline
        )
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Dns => "DNS failure",
            Self::ConnectionRefused => "connection refused",
            Self::ConnectionLost => "connection lost",
            Self::Offline => "offline",
            Self::Tls => "TLS error",
            Self::Other => "transport error",
        }
    }
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

// =============================================================================
// Exit Codes
// =============================================================================

/// Process exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitCode {
    /// Success
    Success = 0,
    /// Unexpected failure
    GeneralError = 1,
    /// Authentication required or rejected
    AuthRequired = 2,
    /// Config or parse errors
    ParseError = 3,
    /// Timeout
    Timeout = 4,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as Self
    }
}

/// Main error type for spendbar operations.
#[derive(Error, Debug)]
pub enum SpendError {
    // ==========================================================================
    // Provider call errors
    // ==========================================================================
    /// Credential is invalid or the session expired.
    #[error("{provider}: session expired or credential rejected")]
    Unauthorized { provider: Provider },

    /// The account has no team. Routine for individual plans.
    #[error("{provider}: no team found for this account")]
    NoTeamFound { provider: Provider },

    /// Rate limited by provider.
    #[error("{provider}: rate limited: {message}")]
    RateLimited {
        provider: Provider,
        retry_after: Option<Duration>,
        message: String,
    },

    /// Provider returned 503.
    #[error("{provider}: service unavailable: {message}")]
    ServiceUnavailable { provider: Provider, message: String },

    /// Provider returned a 5xx other than 503.
    #[error("{provider}: server error (HTTP {status_code})")]
    ServerError {
        provider: Provider,
        status_code: u16,
        message: String,
    },

    /// Unclassified HTTP failure, carrying the raw body for diagnostics.
    #[error("{provider}: network error{}: {message}", fmt_status(.status_code))]
    Network {
        provider: Provider,
        message: String,
        status_code: Option<u16>,
    },

    /// Response could not be decoded into the expected shape.
    #[error("{provider}: unexpected response{}: {message}", fmt_status(.status_code))]
    Decoding {
        provider: Provider,
        message: String,
        status_code: Option<u16>,
    },

    /// Failure below HTTP (timeout, DNS, connection).
    #[error("{provider}: {kind}: {message}")]
    Transport {
        provider: Provider,
        kind: TransportKind,
        message: String,
    },

    /// The refresh was cancelled (provider disabled or shutdown).
    #[error("{provider}: refresh cancelled")]
    Cancelled { provider: Provider },

    // ==========================================================================
    // Configuration errors
    // ==========================================================================
    /// Error parsing configuration file.
    #[error("config parse error at {path}: {message}")]
    ConfigParse { path: String, message: String },

    /// Invalid value in configuration.
    #[error("invalid config value for '{key}': {message}")]
    ConfigInvalid {
        key: String,
        value: String,
        message: String,
    },

    /// Generic configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Invalid provider name.
    #[error("invalid provider: {0}")]
    InvalidProvider(String),

    // ==========================================================================
    // Environment errors
    // ==========================================================================
    /// Credential store (OS keyring) failure.
    #[error("credential store error: {0}")]
    CredentialStore(String),

    /// No credential stored for the provider.
    #[error("not logged in to {provider}")]
    NotLoggedIn { provider: Provider },

    // ==========================================================================
    // Internal errors
    // ==========================================================================
    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Catch-all for other errors.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[allow(clippy::ref_option)]
fn fmt_status(status: &Option<u16>) -> String {
    status.map_or_else(String::new, |code| format!(" (HTTP {code})"))
}

impl SpendError {
    /// Map error to a process exit code.
    #[must_use]
    pub const fn exit_code(&self) -> ExitCode {
        match self {
            Self::Unauthorized { .. } | Self::NotLoggedIn { .. } => ExitCode::AuthRequired,

            Self::ConfigParse { .. }
            | Self::ConfigInvalid { .. }
            | Self::Config(_)
            | Self::InvalidProvider(_)
            | Self::Decoding { .. } => ExitCode::ParseError,

            Self::Transport {
                kind: TransportKind::Timeout,
                ..
            } => ExitCode::Timeout,

            Self::NoTeamFound { .. }
            | Self::RateLimited { .. }
            | Self::ServiceUnavailable { .. }
            | Self::ServerError { .. }
            | Self::Network { .. }
            | Self::Transport { .. }
            | Self::Cancelled { .. }
            | Self::CredentialStore(_)
            | Self::Io(_)
            | Self::Json(_)
            | Self::Other(_) => ExitCode::GeneralError,
        }
    }

    /// Returns the error category for classification and routing.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::Unauthorized { .. } | Self::NotLoggedIn { .. } => ErrorCategory::Authentication,

            Self::Network { .. } | Self::Transport { .. } => ErrorCategory::Network,

            Self::ConfigParse { .. }
            | Self::ConfigInvalid { .. }
            | Self::Config(_)
            | Self::InvalidProvider(_) => ErrorCategory::Configuration,

            Self::NoTeamFound { .. }
            | Self::RateLimited { .. }
            | Self::ServiceUnavailable { .. }
            | Self::ServerError { .. }
            | Self::Decoding { .. } => ErrorCategory::Provider,

            Self::CredentialStore(_) => ErrorCategory::Environment,

            Self::Cancelled { .. } | Self::Io(_) | Self::Json(_) | Self::Other(_) => {
                ErrorCategory::Internal
            }
        }
    }

    /// Returns a stable error code for programmatic handling.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::Unauthorized { .. } => "SPEND-A001",
            Self::NotLoggedIn { .. } => "SPEND-A002",

            Self::Transport { .. } => "SPEND-N001",
            Self::Network { .. } => "SPEND-N099",

            Self::ConfigParse { .. } => "SPEND-C001",
            Self::ConfigInvalid { .. } => "SPEND-C002",
            Self::Config(_) => "SPEND-C003",
            Self::InvalidProvider(_) => "SPEND-C010",

            Self::RateLimited { .. } => "SPEND-P001",
            Self::ServiceUnavailable { .. } => "SPEND-P002",
            Self::ServerError { .. } => "SPEND-P003",
            Self::NoTeamFound { .. } => "SPEND-P010",
            Self::Decoding { .. } => "SPEND-P020",

            Self::CredentialStore(_) => "SPEND-E001",

            Self::Cancelled { .. } => "SPEND-X001",
            Self::Io(_) => "SPEND-X002",
            Self::Json(_) => "SPEND-X003",
            Self::Other(_) => "SPEND-X099",
        }
    }

    /// HTTP status attached to this error, if any.
    #[must_use]
    pub const fn status_code(&self) -> Option<u16> {
        match self {
            Self::Unauthorized { .. } => Some(401),
            Self::RateLimited { .. } => Some(429),
            Self::ServiceUnavailable { .. } => Some(503),
            Self::ServerError { status_code, .. } => Some(*status_code),
            Self::Network { status_code, .. } | Self::Decoding { status_code, .. } => *status_code,
            _ => None,
        }
    }

    /// Returns the retry-after hint if this error specifies one.
    #[must_use]
    pub const fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Returns the provider if this error is provider-specific.
    #[must_use]
    pub const fn provider(&self) -> Option<Provider> {
        match self {
            Self::Unauthorized { provider }
            | Self::NoTeamFound { provider }
            | Self::RateLimited { provider, .. }
            | Self::ServiceUnavailable { provider, .. }
            | Self::ServerError { provider, .. }
            | Self::Network { provider, .. }
            | Self::Decoding { provider, .. }
            | Self::Transport { provider, .. }
            | Self::Cancelled { provider }
            | Self::NotLoggedIn { provider } => Some(*provider),
            _ => None,
        }
    }

    /// Short message suitable for a connection status line.
    #[must_use]
    pub fn status_message(&self) -> String {
        match self {
            Self::Unauthorized { .. } => "Session expired, please log in again".to_string(),
            Self::RateLimited { .. } => "Rate limited by provider".to_string(),
            Self::ServiceUnavailable { .. } => "Service temporarily unavailable".to_string(),
            Self::ServerError { status_code, .. } => format!("Server error (HTTP {status_code})"),
            Self::Transport { kind, .. } => format!("Network problem: {kind}"),
            Self::Decoding { .. } => "Unexpected response from provider".to_string(),
            other => other.to_string(),
        }
    }
}

/// Result type alias for spendbar operations.
pub type Result<T> = std::result::Result<T, SpendError>;

// =============================================================================
// Tests
// =============================================================================
