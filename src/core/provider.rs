//! Provider identities and static metadata.
//!
//! Every tracked vendor is a variant of [`Provider`]. Metadata is fixed at
//! compile time; per-user state lives in the aggregator.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SpendError};

// =============================================================================
// Provider Enum
// =============================================================================

/// Supported billing providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Cursor,
    Claude,
}

impl Provider {
    /// All providers in display order.
    pub const ALL: &'static [Self] = &[Self::Cursor, Self::Claude];

    /// CLI / config name for this provider.
    #[must_use]
    pub const fn cli_name(self) -> &'static str {
        match self {
            Self::Cursor => "cursor",
            Self::Claude => "claude",
        }
    }

    /// Display name for human output.
    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::Cursor => "Cursor",
            Self::Claude => "Claude",
        }
    }

    /// Parse from CLI argument.
    pub fn from_cli_name(name: &str) -> Result<Self> {
        let lower = name.trim().to_lowercase();
        Self::ALL
            .iter()
            .find(|p| p.cli_name() == lower)
            .copied()
            .ok_or_else(|| SpendError::InvalidProvider(name.to_string()))
    }

    /// Whether the provider has a team listing endpoint.
    #[must_use]
    pub const fn supports_teams(self) -> bool {
        matches!(self, Self::Cursor)
    }

    /// Account name under which the credential is stored in the keyring.
    #[must_use]
    pub const fn credential_key(self) -> &'static str {
        match self {
            Self::Cursor => "cursor-session-token",
            Self::Claude => "claude-oauth-token",
        }
    }

    /// Production API base URL.
    #[must_use]
    pub const fn default_api_base(self) -> &'static str {
        match self {
            Self::Cursor => "https://www.cursor.com",
            Self::Claude => "https://api.anthropic.com",
        }
    }

    /// Where the user signs in to obtain a credential.
    #[must_use]
    pub const fn login_url(self) -> &'static str {
        match self {
            Self::Cursor => "https://authenticator.cursor.sh/",
            Self::Claude => "https://claude.ai/login",
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

impl std::str::FromStr for Provider {
    type Err = SpendError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_cli_name(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_from_cli_name() {
        assert_eq!(Provider::from_cli_name("cursor").unwrap(), Provider::Cursor);
        assert_eq!(Provider::from_cli_name("CLAUDE").unwrap(), Provider::Claude);
        assert_eq!(Provider::from_cli_name(" claude ").unwrap(), Provider::Claude);
        assert!(matches!(
            Provider::from_cli_name("codex"),
            Err(SpendError::InvalidProvider(name)) if name == "codex"
        ));
    }

    #[test]
    fn cli_names_round_trip() {
        for provider in Provider::ALL {
            assert_eq!(Provider::from_cli_name(provider.cli_name()).unwrap(), *provider);
        }
    }

    #[test]
    fn only_cursor_supports_teams() {
        assert!(Provider::Cursor.supports_teams());
        assert!(!Provider::Claude.supports_teams());
    }

    #[test]
    fn credential_keys_are_distinct() {
        assert_ne!(
            Provider::Cursor.credential_key(),
            Provider::Claude.credential_key()
        );
    }

    #[test]
    fn serde_uses_lowercase_names() {
        let json = serde_json::to_string(&Provider::Cursor).unwrap();
        assert_eq!(json, "\"cursor\"");
        let parsed: Provider = serde_json::from_str("\"claude\"").unwrap();
        assert_eq!(parsed, Provider::Claude);
    }
}
