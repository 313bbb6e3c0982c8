//! Secure platform credential storage.
//!
//! [`KeyringStore`] reads and writes secrets in the OS keychain (macOS
//! Keychain, Windows Credential Manager, Linux kernel keyutils) through the
//! `keyring` crate.  Entries are keyed by `(service, identity)`, so an
//! identity must be configured before the store can be consulted.

use thiserror::Error;

use super::credential::Credential;

// ---------------------------------------------------------------------------
// StoreError
// ---------------------------------------------------------------------------

/// Why the secure store could not produce a credential.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no stored credential")]
    NotFound,

    #[error("credential store unavailable: {0}")]
    Unavailable(String),

    #[error("access to credential store denied: {0}")]
    Denied(String),
}

impl From<keyring::Error> for StoreError {
    fn from(err: keyring::Error) -> Self {
        match err {
            keyring::Error::NoEntry => StoreError::NotFound,
            keyring::Error::NoStorageAccess(e) => StoreError::Denied(e.to_string()),
            other => StoreError::Unavailable(other.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// SecureStore trait
// ---------------------------------------------------------------------------

/// A place credentials can be looked up without asking the user.
pub trait SecureStore: Send + Sync {
    /// Look up the credential for `identity` (`None` when no identity is
    /// configured).
    fn load(&self, identity: Option<&str>) -> Result<Credential, StoreError>;
}

// ---------------------------------------------------------------------------
// KeyringStore
// ---------------------------------------------------------------------------

/// OS keychain backed [`SecureStore`].
pub struct KeyringStore {
    service: String,
}

impl KeyringStore {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self, identity: &str) -> Result<keyring::Entry, StoreError> {
        Ok(keyring::Entry::new(&self.service, identity)?)
    }

    /// Store `credential` so later sessions can start without a prompt.
    pub fn save(&self, credential: &Credential) -> Result<(), StoreError> {
        self.entry(credential.identity())?
            .set_password(credential.secret())?;
        log::info!(
            "auth: stored secret for {:?} in keychain service {:?}",
            credential.identity(),
            self.service
        );
        Ok(())
    }
}

impl SecureStore for KeyringStore {
    fn load(&self, identity: Option<&str>) -> Result<Credential, StoreError> {
        let identity = identity
            .ok_or_else(|| StoreError::Unavailable("no identity configured".into()))?;
        let secret = self.entry(identity)?.get_password()?;
        Ok(Credential::new(identity, secret))
    }
}

// ---------------------------------------------------------------------------
// NoSecureStore
// ---------------------------------------------------------------------------

/// Used when the keychain is disabled in the config; always unavailable.
pub struct NoSecureStore;

impl SecureStore for NoSecureStore {
    fn load(&self, _identity: Option<&str>) -> Result<Credential, StoreError> {
        Err(StoreError::Unavailable("secure store disabled".into()))
    }
}
