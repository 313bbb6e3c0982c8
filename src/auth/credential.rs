//! The sender's (identity, secret) pair and its handshake encoding.

use std::fmt;

use base64::{engine::general_purpose::STANDARD, Engine as _};

/// Prefix of the connection-negotiation token.
pub const TOKEN_PREFIX: &str = "basic-auth-";

/// An opaque (identity, secret) pair.
///
/// Acquired once per session start and consumed by the handshake.  `Debug`
/// output never contains the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    identity: String,
    secret: String,
}

impl Credential {
    pub fn new(identity: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            secret: secret.into(),
        }
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }

    /// Encode as `basic-auth-<base64(identity:secret)>` for the
    /// `Sec-WebSocket-Protocol` header.
    ///
    /// ```
    /// use babelcast::auth::Credential;
    ///
    /// let token = Credential::new("tech", "pw1").negotiation_token();
    /// assert_eq!(token, "basic-auth-dGVjaDpwdzE=");
    /// ```
    pub fn negotiation_token(&self) -> String {
        let raw = format!("{}:{}", self.identity, self.secret);
        format!("{TOKEN_PREFIX}{}", STANDARD.encode(raw))
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("identity", &self.identity)
            .field("secret", &"<redacted>")
            .finish()
    }
}
