//! Credential acquisition: secure store first, interactive entry second.
//!
//! Mirrors the wrapping style of a fallback chain: the store is asked first
//! and any failure short of a usable credential (`NotFound`, `Unavailable`,
//! `Denied`) drops through to the [`Prompter`].  Only when the prompt is
//! cancelled or left blank does acquisition fail.

use super::credential::Credential;
use super::prompt::Prompter;
use super::store::{SecureStore, StoreError};
use super::AuthError;

/// Obtains exactly one [`Credential`] per call; nothing is cached.
pub struct CredentialAcquirer {
    store: Box<dyn SecureStore>,
    prompter: Box<dyn Prompter>,
    identity: Option<String>,
    default_identity: String,
}

impl CredentialAcquirer {
    /// * `identity`: configured identity used for the store lookup and as
    ///   the prompt default.
    /// * `default_identity`: prompt default when no identity is configured.
    pub fn new(
        store: Box<dyn SecureStore>,
        prompter: Box<dyn Prompter>,
        identity: Option<String>,
        default_identity: impl Into<String>,
    ) -> Self {
        Self {
            store,
            prompter,
            identity,
            default_identity: default_identity.into(),
        }
    }

    /// Acquire a credential.
    ///
    /// # Errors
    ///
    /// [`AuthError::CredentialUnavailable`] when the store has nothing and the
    /// interactive entry was cancelled, left blank, or failed.
    pub fn acquire(&self) -> Result<Credential, AuthError> {
        match self.store.load(self.identity.as_deref()) {
            Ok(credential) => {
                log::info!(
                    "auth: using stored credential for {:?}",
                    credential.identity()
                );
                return Ok(credential);
            }
            Err(StoreError::NotFound) => {
                log::info!("auth: no stored credential, asking interactively");
            }
            Err(e) => {
                log::warn!("auth: {e}; asking interactively");
            }
        }

        self.prompt()
    }

    fn prompt(&self) -> Result<Credential, AuthError> {
        let default = self
            .identity
            .as_deref()
            .unwrap_or(self.default_identity.as_str());

        let identity = self
            .prompter
            .identity(default)
            .map_err(|e| AuthError::CredentialUnavailable(format!("prompt failed: {e}")))?
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AuthError::CredentialUnavailable("identity required".into()))?;

        let secret = self
            .prompter
            .secret(&identity)
            .map_err(|e| AuthError::CredentialUnavailable(format!("prompt failed: {e}")))?
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AuthError::CredentialUnavailable("secret required".into()))?;

        Ok(Credential::new(identity, secret))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::TOKEN_PREFIX;
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    // -----------------------------------------------------------------------
    // Test doubles
    // -----------------------------------------------------------------------

    enum StoreMode {
        Has(&'static str, &'static str),
        Missing,
        Unavailable,
        Denied,
    }

    struct FakeStore(StoreMode);

    impl SecureStore for FakeStore {
        fn load(&self, _identity: Option<&str>) -> Result<Credential, StoreError> {
            match self.0 {
                StoreMode::Has(id, secret) => Ok(Credential::new(id, secret)),
                StoreMode::Missing => Err(StoreError::NotFound),
                StoreMode::Unavailable => Err(StoreError::Unavailable("no keychain".into())),
                StoreMode::Denied => Err(StoreError::Denied("user refused".into())),
            }
        }
    }

    /// Scripted answers; counts how often it was asked.
    struct ScriptedPrompter {
        identity: Option<&'static str>,
        secret: Option<&'static str>,
        asked: Arc<AtomicUsize>,
        seen_default: Arc<std::sync::Mutex<String>>,
    }

    impl ScriptedPrompter {
        fn new(identity: Option<&'static str>, secret: Option<&'static str>) -> Self {
            Self {
                identity,
                secret,
                asked: Arc::new(AtomicUsize::new(0)),
                seen_default: Arc::default(),
            }
        }
    }

    impl Prompter for ScriptedPrompter {
        fn identity(&self, default: &str) -> io::Result<Option<String>> {
            self.asked.fetch_add(1, Ordering::SeqCst);
            *self.seen_default.lock().unwrap() = default.to_string();
            Ok(self.identity.map(str::to_string))
        }

        fn secret(&self, _identity: &str) -> io::Result<Option<String>> {
            self.asked.fetch_add(1, Ordering::SeqCst);
            Ok(self.secret.map(str::to_string))
        }
    }

    struct BrokenPrompter;

    impl Prompter for BrokenPrompter {
        fn identity(&self, _default: &str) -> io::Result<Option<String>> {
            Err(io::Error::new(io::ErrorKind::Other, "no tty"))
        }
        fn secret(&self, _identity: &str) -> io::Result<Option<String>> {
            Err(io::Error::new(io::ErrorKind::Other, "no tty"))
        }
    }

    fn acquirer(store: StoreMode, prompter: ScriptedPrompter) -> CredentialAcquirer {
        CredentialAcquirer::new(
            Box::new(FakeStore(store)),
            Box::new(prompter),
            None,
            "technician",
        )
    }

    // -----------------------------------------------------------------------
    // Tests
    // -----------------------------------------------------------------------

    #[test]
    fn fallback_to_prompt_yields_expected_token() {
        let acq = acquirer(
            StoreMode::Unavailable,
            ScriptedPrompter::new(Some("tech"), Some("pw1")),
        );
        let credential = acq.acquire().expect("credential");
        let token = credential.negotiation_token();

        let expected = format!("{TOKEN_PREFIX}{}", STANDARD.encode("tech:pw1"));
        assert_eq!(token, expected);
    }

    #[test]
    fn stored_credential_skips_prompt() {
        let prompter = ScriptedPrompter::new(Some("x"), Some("y"));
        let asked = Arc::clone(&prompter.asked);
        let acq = acquirer(StoreMode::Has("tech", "stored"), prompter);

        let credential = acq.acquire().expect("credential");
        assert_eq!(credential.secret(), "stored");
        assert_eq!(asked.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn missing_and_denied_both_fall_back() {
        for mode in [StoreMode::Missing, StoreMode::Denied] {
            let acq = acquirer(mode, ScriptedPrompter::new(Some("tech"), Some("pw1")));
            assert_eq!(acq.acquire().expect("credential").identity(), "tech");
        }
    }

    #[test]
    fn cancelled_identity_is_unavailable() {
        let acq = acquirer(StoreMode::Missing, ScriptedPrompter::new(None, Some("pw1")));
        let err = acq.acquire().unwrap_err();
        assert!(matches!(err, AuthError::CredentialUnavailable(ref m) if m.contains("identity")));
    }

    #[test]
    fn blank_secret_is_unavailable() {
        let acq = acquirer(StoreMode::Missing, ScriptedPrompter::new(Some("tech"), Some("")));
        let err = acq.acquire().unwrap_err();
        assert!(matches!(err, AuthError::CredentialUnavailable(ref m) if m.contains("secret")));
    }

    #[test]
    fn prompt_io_error_is_unavailable() {
        let acq = CredentialAcquirer::new(
            Box::new(FakeStore(StoreMode::Missing)),
            Box::new(BrokenPrompter),
            None,
            "technician",
        );
        assert!(matches!(
            acq.acquire(),
            Err(AuthError::CredentialUnavailable(_))
        ));
    }

    #[test]
    fn configured_identity_is_offered_as_default() {
        let prompter = ScriptedPrompter::new(Some("anna"), Some("pw"));
        let seen = Arc::clone(&prompter.seen_default);
        let acq = CredentialAcquirer::new(
            Box::new(FakeStore(StoreMode::Missing)),
            Box::new(prompter),
            Some("anna".into()),
            "technician",
        );
        acq.acquire().expect("credential");
        assert_eq!(*seen.lock().unwrap(), "anna");
    }

    #[test]
    fn each_call_acquires_again() {
        let prompter = ScriptedPrompter::new(Some("tech"), Some("pw1"));
        let asked = Arc::clone(&prompter.asked);
        let acq = acquirer(StoreMode::Missing, prompter);

        acq.acquire().expect("first");
        acq.acquire().expect("second");
        assert_eq!(asked.load(Ordering::SeqCst), 4);
    }
}
