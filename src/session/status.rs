//! Session state machine and the shared status board.
//!
//! [`SessionStatus`] is the coarse phase a sender or listener is in.
//! [`StatusBoard`] carries it plus the counters and last error the CLI
//! reports; [`SharedStatus`] is the `Arc<Mutex<…>>` handle every component
//! writes through.

use std::sync::{Arc, Mutex, PoisonError};

use crate::transport::ChannelKey;

// ---------------------------------------------------------------------------
// SessionStatus
// ---------------------------------------------------------------------------

/// Phases of a sender or listener session.
///
/// ```text
/// Idle ──send──▶ Acquiring ──credential──▶ Connecting ──open──▶ Streaming
///      ──join──────────────────────────▶ Connecting ──open──▶ Listening
/// Streaming / Listening ──stop / close──▶ Stopped
/// any state ──failure──▶ Error
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionStatus {
    #[default]
    Idle,
    /// Looking up or prompting for the sender credential.
    Acquiring,
    /// Handshake with the relay in progress.
    Connecting,
    /// Microphone audio is flowing to the relay.
    Streaming,
    /// Receiving and playing one channel.
    Listening,
    Stopped,
    /// The last attempt failed; see [`StatusBoard::error_message`].
    Error,
}

impl SessionStatus {
    /// `true` while a session holds a connection or is opening one.
    ///
    /// ```
    /// use babelcast::session::SessionStatus;
    ///
    /// assert!(!SessionStatus::Idle.is_active());
    /// assert!(SessionStatus::Connecting.is_active());
    /// assert!(SessionStatus::Streaming.is_active());
    /// assert!(SessionStatus::Listening.is_active());
    /// assert!(!SessionStatus::Stopped.is_active());
    /// assert!(!SessionStatus::Error.is_active());
    /// ```
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            SessionStatus::Acquiring
                | SessionStatus::Connecting
                | SessionStatus::Streaming
                | SessionStatus::Listening
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            SessionStatus::Idle => "Idle",
            SessionStatus::Acquiring => "Acquiring credential",
            SessionStatus::Connecting => "Connecting",
            SessionStatus::Streaming => "Streaming",
            SessionStatus::Listening => "Listening",
            SessionStatus::Stopped => "Stopped",
            SessionStatus::Error => "Error",
        }
    }
}

// ---------------------------------------------------------------------------
// StatusBoard
// ---------------------------------------------------------------------------

/// What the CLI shows about the running session.
#[derive(Debug, Default)]
pub struct StatusBoard {
    pub status: SessionStatus,

    /// Channel currently joined (listener only).
    pub channel: Option<ChannelKey>,

    /// User-facing message for `status == Error`.
    pub error_message: Option<String>,

    pub blocks_sent: u64,
    pub blocks_received: u64,
    pub blocks_dropped: u64,
}

impl StatusBoard {
    pub fn set(&mut self, status: SessionStatus) {
        self.status = status;
        if status != SessionStatus::Error {
            self.error_message = None;
        }
    }

    pub fn fail(&mut self, message: impl Into<String>) {
        let message = message.into();
        log::error!("session: {message}");
        self.status = SessionStatus::Error;
        self.error_message = Some(message);
    }

    /// One line for the terminal.
    pub fn summary(&self) -> String {
        let mut line = self.status.label().to_string();
        if let Some(channel) = &self.channel {
            line.push_str(&format!(" [{channel}]"));
        }
        if let Some(message) = &self.error_message {
            line.push_str(&format!(": {message}"));
        }
        line
    }
}

// ---------------------------------------------------------------------------
// SharedStatus
// ---------------------------------------------------------------------------

/// Thread-safe handle to [`StatusBoard`].  Never hold the lock across
/// `.await`.
pub type SharedStatus = Arc<Mutex<StatusBoard>>;

pub fn new_shared_status() -> SharedStatus {
    Arc::new(Mutex::new(StatusBoard::default()))
}

/// Run `f` on the board.  A poisoned lock is recovered: the board only holds
/// plain values.
pub fn update_status<R>(status: &SharedStatus, f: impl FnOnce(&mut StatusBoard) -> R) -> R {
    let mut board = status.lock().unwrap_or_else(PoisonError::into_inner);
    f(&mut board)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_board_is_idle() {
        let board = StatusBoard::default();
        assert_eq!(board.status, SessionStatus::Idle);
        assert!(board.channel.is_none());
        assert!(board.error_message.is_none());
    }

    #[test]
    fn fail_records_message_and_set_clears_it() {
        let mut board = StatusBoard::default();
        board.fail("connection rejected: relay answered 401");
        assert_eq!(board.status, SessionStatus::Error);
        assert_eq!(board.summary(), "Error: connection rejected: relay answered 401");

        board.set(SessionStatus::Connecting);
        assert!(board.error_message.is_none());
    }

    #[test]
    fn summary_includes_channel() {
        let mut board = StatusBoard::default();
        board.set(SessionStatus::Listening);
        board.channel = Some(ChannelKey::new("en").unwrap());
        assert_eq!(board.summary(), "Listening [en]");
    }

    #[test]
    fn shared_status_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SharedStatus>();
    }

    #[test]
    fn update_is_visible_through_clones() {
        let status = new_shared_status();
        let other = Arc::clone(&status);
        update_status(&status, |b| b.blocks_sent = 3);
        assert_eq!(update_status(&other, |b| b.blocks_sent), 3);
    }
}
