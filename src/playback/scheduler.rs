//! Gapless scheduling of received blocks onto an output timeline.
//!
//! # Algorithm
//!
//! ```text
//! on_block_arrived(bytes) ─▶ decode ─▶ queue.push ─▶ advance()
//!
//! advance():
//!   while nothing is in flight and the queue has a block B:
//!     start = max(output.now, next_play_time)
//!     output.schedule(B, start)
//!     next_play_time = start + len(B) / rate
//!
//! on_event(BlockConsumed(id)) ─▶ clear in-flight ─▶ advance()
//! ```
//!
//! At most one block is in flight at a time.  `next_play_time` moves as soon
//! as a block is scheduled, so a block arriving while its predecessor still
//! plays lands exactly at the predecessor's end; a block arriving after the
//! device ran dry starts "now" and the timeline resumes from there.

use crate::audio::SampleBlock;
use crate::config::PlaybackConfig;

use super::output::{AudioOutput, BlockId, PlaybackError, PlaybackEvent};
use super::queue::BlockQueue;

/// Per-session playback state.  Owned by exactly one session task.
pub struct PlaybackScheduler {
    output: Box<dyn AudioOutput>,
    queue: BlockQueue,
    sample_rate: u32,
    next_play_time: f64,
    in_flight: Option<BlockId>,
    next_id: BlockId,
    scheduled_blocks: u64,
    decode_failures: u64,
    connected: bool,
}

impl PlaybackScheduler {
    pub fn new(output: Box<dyn AudioOutput>, sample_rate: u32, config: &PlaybackConfig) -> Self {
        Self {
            output,
            queue: BlockQueue::new(config.max_queued_blocks, config.overflow),
            sample_rate,
            next_play_time: 0.0,
            in_flight: None,
            next_id: 0,
            scheduled_blocks: 0,
            decode_failures: 0,
            connected: true,
        }
    }

    /// Feed one wire payload.
    ///
    /// A malformed payload is logged and dropped; the session carries on.
    /// Errors are output-device failures only.
    pub fn on_block_arrived(&mut self, bytes: &[u8]) -> Result<(), PlaybackError> {
        match SampleBlock::from_wire(bytes, self.sample_rate) {
            Ok(block) => self.enqueue(block),
            Err(e) => {
                self.decode_failures += 1;
                log::warn!(
                    "playback: {} ({} bytes dropped)",
                    PlaybackError::DecodeFailure(e),
                    bytes.len()
                );
                Ok(())
            }
        }
    }

    /// Queue an already-decoded block and try to schedule.
    pub fn enqueue(&mut self, block: SampleBlock) -> Result<(), PlaybackError> {
        if let Some(dropped) = self.queue.push(block) {
            log::warn!(
                "playback: queue full ({} blocks), dropped {} samples (total dropped {})",
                self.queue.capacity(),
                dropped.len(),
                self.queue.dropped()
            );
        }
        self.advance()
    }

    /// Schedule the head of the queue if nothing is in flight.
    ///
    /// Idempotent: calling it while a block is in flight, or with an empty
    /// queue, does nothing.
    pub fn advance(&mut self) -> Result<(), PlaybackError> {
        if !self.connected {
            return Ok(());
        }

        while self.in_flight.is_none() {
            let Some(block) = self.queue.pop() else {
                return Ok(());
            };
            if block.is_empty() {
                continue;
            }

            let duration = block.duration_secs();
            let start = self.output.current_time().max(self.next_play_time);
            let id = self.next_id;
            self.next_id += 1;

            self.output.schedule(id, block, start)?;
            self.next_play_time = start + duration;
            self.in_flight = Some(id);
            self.scheduled_blocks += 1;
            log::trace!("playback: block {id} at {start:.4}s for {duration:.4}s");
        }
        Ok(())
    }

    /// Handle a notification from the output device.
    pub fn on_event(&mut self, event: PlaybackEvent) -> Result<(), PlaybackError> {
        match event {
            PlaybackEvent::BlockConsumed(id) if self.in_flight == Some(id) => {
                self.in_flight = None;
                self.advance()
            }
            PlaybackEvent::BlockConsumed(id) => {
                log::debug!("playback: ignoring stale completion for block {id}");
                Ok(())
            }
        }
    }

    /// Drain the queue, cancel audio that has not started and rewind the
    /// timeline.
    pub fn reset(&mut self) {
        self.queue.clear();
        self.output.cancel_pending();
        self.in_flight = None;
        self.next_play_time = 0.0;
    }

    /// [`reset`](Self::reset) and release the output device.  Idempotent.
    pub fn shutdown(&mut self) {
        if !self.connected {
            return;
        }
        self.reset();
        self.output.disconnect();
        self.connected = false;
        log::debug!(
            "playback: output released after {} blocks ({} dropped, {} malformed)",
            self.scheduled_blocks,
            self.queue.dropped(),
            self.decode_failures
        );
    }

    pub fn next_play_time(&self) -> f64 {
        self.next_play_time
    }

    /// `true` while a block is scheduled and not yet reported consumed.
    pub fn is_scheduling(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn scheduled_blocks(&self) -> u64 {
        self.scheduled_blocks
    }

    pub fn dropped_blocks(&self) -> u64 {
        self.queue.dropped()
    }

    pub fn decode_failures(&self) -> u64 {
        self.decode_failures
    }
}

impl Drop for PlaybackScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
