//! Listener-side playback: wire payload → decode → bounded queue →
//! gapless schedule on an output device.
//!
//! # Pipeline
//!
//! ```text
//! Transport::recv ─▶ PlaybackScheduler::on_block_arrived
//!                      └─▶ BlockQueue ─▶ advance() ─▶ AudioOutput::schedule
//! AudioOutput ──PlaybackEvent::BlockConsumed──▶ PlaybackScheduler::on_event
//! ```
//!
//! [`CpalOutput`] renders on a sound card; anything implementing
//! [`AudioOutput`] can stand in for it.

pub mod device;
pub mod output;
pub mod queue;
pub mod scheduler;

#[cfg(test)]
pub(crate) mod mock;

pub use device::{CpalOutput, CpalOutputFactory};
pub use output::{
    AudioOutput, BlockId, OutputFactory, PlaybackError, PlaybackEvent, PlaybackEventSender,
};
pub use queue::BlockQueue;
pub use scheduler::PlaybackScheduler;
