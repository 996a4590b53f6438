//! Credential storage.
//!
//! Credentials are opaque strings (session cookie or OAuth token) keyed by
//! provider. The OS keyring is the production store; tests use memory.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use super::provider::Provider;
use crate::error::{Result, SpendError};

/// Keyring service name.
pub const KEYRING_SERVICE: &str = "spendbar";

/// Storage for per-provider credentials.
pub trait CredentialStore: Send + Sync {
    /// Stored credential, or `None` when absent.
    ///
    /// # Errors
    ///
    /// Returns `CredentialStore` when the backing store cannot be read.
    fn get(&self, provider: Provider) -> Result<Option<String>>;

    /// # Errors
    ///
    /// Returns `CredentialStore` when the backing store rejects the write.
    fn set(&self, provider: Provider, credential: &str) -> Result<()>;

    /// Delete the credential. Deleting a missing credential is not an error.
    ///
    /// # Errors
    ///
    /// Returns `CredentialStore` when the backing store rejects the delete.
    fn delete(&self, provider: Provider) -> Result<()>;
}

// =============================================================================
// Keyring
// =============================================================================

/// OS keyring backed store.
#[derive(Debug, Clone)]
pub struct KeyringCredentialStore {
    service: String,
}

impl Default for KeyringCredentialStore {
    fn default() -> Self {
        Self::new(KEYRING_SERVICE)
    }
}

impl KeyringCredentialStore {
    #[must_use]
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self, provider: Provider) -> Result<keyring::Entry> {
        keyring::Entry::new(&self.service, provider.credential_key())
            .map_err(|e| SpendError::CredentialStore(format!("Keyring error: {e}")))
    }
}

impl CredentialStore for KeyringCredentialStore {
    fn get(&self, provider: Provider) -> Result<Option<String>> {
        match self.entry(provider)?.get_password() {
            Ok(secret) if secret.trim().is_empty() => Ok(None),
            Ok(secret) => Ok(Some(secret)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(SpendError::CredentialStore(format!(
                "Failed to read {provider} credential: {e}"
            ))),
        }
    }

    fn set(&self, provider: Provider, credential: &str) -> Result<()> {
        self.entry(provider)?
            .set_password(credential)
            .map_err(|e| SpendError::CredentialStore(format!("Failed to store {provider} credential: {e}")))
    }

    fn delete(&self, provider: Provider) -> Result<()> {
        match self.entry(provider)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(SpendError::CredentialStore(format!(
                "Failed to delete {provider} credential: {e}"
            ))),
        }
    }
}

// =============================================================================
// In-memory
// =============================================================================

/// Process-local store.
#[derive(Debug, Default)]
pub struct InMemoryCredentialStore {
    secrets: Mutex<HashMap<Provider, String>>,
}

impl InMemoryCredentialStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with credentials.
    #[must_use]
    pub fn with(entries: impl IntoIterator<Item = (Provider, String)>) -> Self {
        Self {
            secrets: Mutex::new(entries.into_iter().collect()),
        }
    }
}

impl CredentialStore for InMemoryCredentialStore {
    fn get(&self, provider: Provider) -> Result<Option<String>> {
        let secrets = self.secrets.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(secrets.get(&provider).cloned())
    }

    fn set(&self, provider: Provider, credential: &str) -> Result<()> {
        let mut secrets = self.secrets.lock().unwrap_or_else(PoisonError::into_inner);
        secrets.insert(provider, credential.to_string());
        Ok(())
    }

    fn delete(&self, provider: Provider) -> Result<()> {
        let mut secrets = self.secrets.lock().unwrap_or_else(PoisonError::into_inner);
        secrets.remove(&provider);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_round_trip() {
        let store = InMemoryCredentialStore::new();
        assert_eq!(store.get(Provider::Cursor).unwrap(), None);

        store.set(Provider::Cursor, "session-abc").unwrap();
        assert_eq!(
            store.get(Provider::Cursor).unwrap().as_deref(),
            Some("session-abc")
        );
        assert_eq!(store.get(Provider::Claude).unwrap(), None);

        store.delete(Provider::Cursor).unwrap();
        assert_eq!(store.get(Provider::Cursor).unwrap(), None);
        store.delete(Provider::Cursor).unwrap();
    }

    #[test]
    fn memory_store_prepopulated() {
        let store = InMemoryCredentialStore::with([(Provider::Claude, "tok".to_string())]);
        assert_eq!(store.get(Provider::Claude).unwrap().as_deref(), Some("tok"));
    }
}
