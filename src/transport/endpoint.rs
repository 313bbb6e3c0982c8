//! Endpoint addressing: who connects where.
//!
//! | Role | Path |
//! |------|------|
//! | Sender | `{prefix}/technician` |
//! | Receiver | `{prefix}/stream/{channel}` |

use std::fmt;
use std::str::FromStr;

use crate::config::ServerConfig;

use super::TransportError;

// ---------------------------------------------------------------------------
// ChannelKey
// ---------------------------------------------------------------------------

/// A validated channel key (e.g. a language code).
///
/// Only ASCII alphanumerics, `-` and `_` are accepted so a key can be
/// spliced into a URL path as-is.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChannelKey(String);

impl ChannelKey {
    pub fn new(key: impl Into<String>) -> Result<Self, TransportError> {
        let key = key.into();
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if valid {
            Ok(Self(key))
        } else {
            Err(TransportError::InvalidChannelKey(key))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for ChannelKey {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl fmt::Display for ChannelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Role
// ---------------------------------------------------------------------------

/// Which side of the relay a connection serves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Role {
    /// The single technician streaming microphone audio.
    Sender,
    /// A listener subscribed to one channel.
    Receiver(ChannelKey),
}

impl Role {
    /// Path below the WebSocket prefix.
    pub fn path(&self) -> String {
        match self {
            Role::Sender => "/technician".to_string(),
            Role::Receiver(channel) => format!("/stream/{channel}"),
        }
    }
}

/// Build the absolute endpoint URL for `role`.
///
/// ```
/// use babelcast::config::ServerConfig;
/// use babelcast::transport::{endpoint_url, ChannelKey, Role};
///
/// let server = ServerConfig::default();
/// assert_eq!(endpoint_url(&server, &Role::Sender), "ws://localhost:8000/ws/technician");
///
/// let en = Role::Receiver(ChannelKey::new("en").unwrap());
/// assert_eq!(endpoint_url(&server, &en), "ws://localhost:8000/ws/stream/en");
/// ```
pub fn endpoint_url(server: &ServerConfig, role: &Role) -> String {
    let base = server.url.trim_end_matches('/');
    let prefix = server.ws_prefix.trim_matches('/');
    if prefix.is_empty() {
        format!("{base}{}", role.path())
    } else {
        format!("{base}/{prefix}{}", role.path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_key_accepts_language_codes() {
        for key in ["de", "en", "pt-BR", "zh_hans", "x1"] {
            assert!(ChannelKey::new(key).is_ok(), "{key} should be valid");
        }
    }

    #[test]
    fn channel_key_rejects_path_tricks() {
        for key in ["", "../admin", "en/extra", "a b", "de?x=1"] {
            assert!(
                matches!(ChannelKey::new(key), Err(TransportError::InvalidChannelKey(_))),
                "{key:?} should be rejected"
            );
        }
    }

    #[test]
    fn url_tolerates_stray_slashes() {
        let server = ServerConfig {
            url: "wss://relay.example.org/".into(),
            ws_prefix: "/ws/".into(),
            wire_protocol: "pcm-f32le".into(),
        };
        assert_eq!(
            endpoint_url(&server, &Role::Sender),
            "wss://relay.example.org/ws/technician"
        );
    }

    #[test]
    fn url_without_prefix() {
        let server = ServerConfig {
            url: "ws://10.0.0.2:9000".into(),
            ws_prefix: String::new(),
            wire_protocol: "pcm-f32le".into(),
        };
        let role = Role::Receiver("ru".parse().unwrap());
        assert_eq!(endpoint_url(&server, &role), "ws://10.0.0.2:9000/stream/ru");
    }

    #[test]
    fn same_inputs_same_url() {
        let server = ServerConfig::default();
        let role = Role::Receiver(ChannelKey::new("de").unwrap());
        assert_eq!(endpoint_url(&server, &role), endpoint_url(&server, &role));
    }
}
