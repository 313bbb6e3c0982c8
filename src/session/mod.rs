//! Session lifecycles: the sender's capture pipeline and the listener's
//! join / leave / switch coordination.
//!
//! # Flow
//!
//! ```text
//! sender:   acquire credential ─▶ open microphone ─▶ connect /technician
//!             └─▶ CapturePipeline::run  (blocks → transport until stop/close)
//!
//! listener: ListenerCoordinator::join(ch) ─▶ connect /stream/{ch} + open output
//!             └─▶ tokio task: select!{ stop, PlaybackEvent, transport.recv }
//!           leave / switch_to await the task before returning
//! ```

pub mod listener;
pub mod sender;
pub mod status;

pub use listener::{ListenerCoordinator, SessionContext};
pub use sender::{open_microphone, run_sender, CapturePipeline, CaptureState};
pub use status::{new_shared_status, update_status, SessionStatus, SharedStatus, StatusBoard};

use thiserror::Error;

use crate::audio::CaptureError;
use crate::auth::AuthError;
use crate::playback::PlaybackError;
use crate::transport::{ChannelKey, TransportError};

/// Anything that can end a session attempt.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Playback(#[from] PlaybackError),

    /// A different channel is joined; leave it (or switch) first.
    #[error("already listening to channel {0}")]
    AlreadyJoined(ChannelKey),

    #[error("session task failed: {0}")]
    Task(String),
}

/// Convert `err`, mark the board as failed and hand the error back.
pub(crate) fn record_failure<E: Into<SessionError>>(
    status: &SharedStatus,
    err: E,
) -> SessionError {
    let err = err.into();
    update_status(status, |b| b.fail(err.to_string()));
    err
}
