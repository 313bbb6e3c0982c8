//! Sender authentication.
//!
//! This module provides:
//! * [`Credential`]: the (identity, secret) pair and its negotiation token.
//! * [`SecureStore`] / [`KeyringStore`]: OS keychain lookup.
//! * [`Prompter`] / [`TerminalPrompter`]: interactive fallback.
//! * [`CredentialAcquirer`]: store first, prompt second.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use babelcast::auth::{CredentialAcquirer, KeyringStore, TerminalPrompter};
//!
//! let acquirer = CredentialAcquirer::new(
//!     Box::new(KeyringStore::new("babelcast")),
//!     Box::new(TerminalPrompter),
//!     Some("technician".into()),
//!     "technician",
//! );
//! let credential = acquirer.acquire().unwrap();
//! let token = credential.negotiation_token(); // "basic-auth-…"
//! # drop(token);
//! ```

pub mod acquirer;
pub mod credential;
pub mod prompt;
pub mod store;

pub use acquirer::CredentialAcquirer;
pub use credential::{Credential, TOKEN_PREFIX};
pub use prompt::{Prompter, TerminalPrompter};
pub use store::{KeyringStore, NoSecureStore, SecureStore, StoreError};

use thiserror::Error;

/// Errors surfaced by credential acquisition.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Neither the secure store nor the interactive prompt produced a
    /// credential.
    #[error("credential unavailable: {0}")]
    CredentialUnavailable(String),
}
