//! The output-device seam the scheduler drives.

use cpal::SampleFormat;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::audio::{BlockError, SampleBlock};

/// Identifies one scheduled block for completion tracking.
pub type BlockId = u64;

/// Notifications from an output device back to its session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackEvent {
    /// The device no longer needs more lead time for this block; the next one
    /// may be scheduled.
    BlockConsumed(BlockId),
}

/// Sending half handed to an output so it can report [`PlaybackEvent`]s.
pub type PlaybackEventSender = mpsc::UnboundedSender<PlaybackEvent>;

// ---------------------------------------------------------------------------
// PlaybackError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum PlaybackError {
    /// A received payload was not a valid block.  Only that block is lost.
    #[error("playback decode failure: {0}")]
    DecodeFailure(#[from] BlockError),

    #[error("output device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("unsupported output sample format: {0:?}")]
    UnsupportedFormat(SampleFormat),

    #[error("failed to build output stream: {0}")]
    BuildStream(String),

    #[error("failed to start output stream: {0}")]
    PlayStream(String),

    #[error("output is disconnected")]
    Disconnected,
}

// ---------------------------------------------------------------------------
// AudioOutput / OutputFactory
// ---------------------------------------------------------------------------

/// An output device with its own monotonic clock.
///
/// Times are seconds on the device clock, starting at zero when the output
/// was opened.
pub trait AudioOutput: Send {
    fn current_time(&self) -> f64;

    /// Play `block` starting at `start`.  The device reports
    /// [`PlaybackEvent::BlockConsumed`] with `id` once the next block may go.
    fn schedule(&mut self, id: BlockId, block: SampleBlock, start: f64)
        -> Result<(), PlaybackError>;

    /// Forget every block that has not started playing yet.
    fn cancel_pending(&mut self);

    /// Release the device.  Idempotent.
    fn disconnect(&mut self);
}

/// Opens one output per listening session.
pub trait OutputFactory: Send + Sync {
    fn open(
        &self,
        stream_rate: u32,
        events: PlaybackEventSender,
    ) -> Result<Box<dyn AudioOutput>, PlaybackError>;
}
