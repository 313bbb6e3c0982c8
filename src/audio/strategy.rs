//! Capture extraction strategies.
//!
//! Both strategies split capture into two halves:
//!
//! * a [`SampleSink`] that the cpal real-time callback calls with the
//!   channel-0 samples of every hardware buffer, and
//! * a [`CaptureStrategy`] that the sender session polls for finished
//!   [`SampleBlock`]s.
//!
//! ```text
//!              ┌──────────── OffThread ────────────┐
//! cpal thread  │ sink: Vec<f32> ──move──▶ mpsc ────┼──▶ next_block()
//!              └───────────────────────────────────┘
//!              ┌──────────── InThread ─────────────┐
//! cpal thread  │ sink: push_slice ─▶ RingBuffer ◀──┼── tick: take_exact(4096)
//!              └───────────────────────────────────┘
//! ```
//!
//! The strategy is chosen once at startup by [`CaptureStrategyKind::probe`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cpal::SampleFormat;
use tokio::sync::mpsc;
use tokio::time::{Interval, MissedTickBehavior};

use super::block::SampleBlock;
use super::buffer::{new_shared_buffer, SharedSampleBuffer};
use super::resample::resample_linear;
use crate::config::StrategyPreference;

/// Callback invoked on the real-time audio thread with one hardware buffer's
/// worth of mono samples.
pub type SampleSink = Box<dyn FnMut(Vec<f32>) + Send + 'static>;

/// Ring capacity of the in-thread strategy, in blocks.
const IN_THREAD_RING_BLOCKS: usize = 8;

// ---------------------------------------------------------------------------
// CaptureStrategyKind
// ---------------------------------------------------------------------------

/// The two extraction mechanisms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureStrategyKind {
    /// Blocks are cut on the real-time thread and moved to the session
    /// through a one-way channel.  Block size follows the hardware buffer.
    OffThread,
    /// The real-time thread only appends to a ring buffer; the session task
    /// extracts fixed-size blocks on a periodic tick.
    InThread,
}

impl CaptureStrategyKind {
    /// Pick a strategy for a device delivering `format` samples.
    ///
    /// Off-thread extraction needs samples the real-time thread can forward
    /// as-is, so it is only chosen for native `f32` devices unless forced.
    ///
    /// ```
    /// use babelcast::audio::CaptureStrategyKind;
    /// use babelcast::config::StrategyPreference;
    /// use cpal::SampleFormat;
    ///
    /// assert_eq!(
    ///     CaptureStrategyKind::probe(SampleFormat::F32, StrategyPreference::Auto),
    ///     CaptureStrategyKind::OffThread,
    /// );
    /// assert_eq!(
    ///     CaptureStrategyKind::probe(SampleFormat::I16, StrategyPreference::Auto),
    ///     CaptureStrategyKind::InThread,
    /// );
    /// ```
    pub fn probe(format: SampleFormat, preference: StrategyPreference) -> Self {
        match preference {
            StrategyPreference::OffThread => Self::OffThread,
            StrategyPreference::InThread => Self::InThread,
            StrategyPreference::Auto if format == SampleFormat::F32 => Self::OffThread,
            StrategyPreference::Auto => Self::InThread,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::OffThread => "off-thread",
            Self::InThread => "in-thread",
        }
    }
}

// ---------------------------------------------------------------------------
// CaptureStrategy
// ---------------------------------------------------------------------------

/// Session-side half of a capture strategy.
#[async_trait]
pub trait CaptureStrategy: Send {
    fn kind(&self) -> CaptureStrategyKind;

    /// Wait for the next block, already converted to the stream rate.
    ///
    /// Returns `None` once the real-time half is gone and nothing is left.
    /// Must be cancel-safe: it is raced against transport events.
    async fn next_block(&mut self) -> Option<SampleBlock>;

    /// Throw away whatever was captured but not yet returned.
    fn discard_pending(&mut self);
}

/// Build the strategy selected by `kind` together with its real-time sink.
pub fn build_strategy(
    kind: CaptureStrategyKind,
    block_size: usize,
    device_rate: u32,
    stream_rate: u32,
) -> (Box<dyn CaptureStrategy>, SampleSink) {
    match kind {
        CaptureStrategyKind::OffThread => {
            let (strategy, sink) = OffThreadCapture::new(device_rate, stream_rate);
            (Box::new(strategy), sink)
        }
        CaptureStrategyKind::InThread => {
            let (strategy, sink) = InThreadCapture::new(block_size, device_rate, stream_rate);
            (Box::new(strategy), sink)
        }
    }
}

// ---------------------------------------------------------------------------
// OffThreadCapture
// ---------------------------------------------------------------------------

/// Forwards each hardware buffer as one block.  The `Vec` allocated on the
/// real-time thread is the same allocation that reaches the transport.
pub struct OffThreadCapture {
    rx: mpsc::UnboundedReceiver<Vec<f32>>,
    device_rate: u32,
    stream_rate: u32,
}

impl OffThreadCapture {
    pub fn new(device_rate: u32, stream_rate: u32) -> (Self, SampleSink) {
        let (tx, rx) = mpsc::unbounded_channel::<Vec<f32>>();

        let sink: SampleSink = Box::new(move |samples: Vec<f32>| {
            if samples.is_empty() {
                return;
            }
            // Receiver dropped means the session is tearing down.
            let _ = tx.send(samples);
        });

        (
            Self {
                rx,
                device_rate,
                stream_rate,
            },
            sink,
        )
    }
}

#[async_trait]
impl CaptureStrategy for OffThreadCapture {
    fn kind(&self) -> CaptureStrategyKind {
        CaptureStrategyKind::OffThread
    }

    async fn next_block(&mut self) -> Option<SampleBlock> {
        loop {
            let samples = self.rx.recv().await?;
            if samples.is_empty() {
                continue;
            }
            let samples = resample_linear(samples, self.device_rate, self.stream_rate);
            return Some(SampleBlock::new(samples, self.stream_rate));
        }
    }

    fn discard_pending(&mut self) {
        while self.rx.try_recv().is_ok() {}
    }
}

// ---------------------------------------------------------------------------
// InThreadCapture
// ---------------------------------------------------------------------------

/// Extracts fixed-size blocks from a shared ring buffer on a periodic tick.
pub struct InThreadCapture {
    buffer: SharedSampleBuffer,
    block_size: usize,
    device_rate: u32,
    stream_rate: u32,
    period: Duration,
    // Created on first poll: an Interval needs a running runtime.
    tick: Option<Interval>,
}

impl InThreadCapture {
    pub fn new(block_size: usize, device_rate: u32, stream_rate: u32) -> (Self, SampleSink) {
        let block_size = block_size.max(1);
        let buffer = new_shared_buffer(block_size * IN_THREAD_RING_BLOCKS);

        let writer = Arc::clone(&buffer);
        let sink: SampleSink = Box::new(move |samples: Vec<f32>| {
            if let Ok(mut buf) = writer.lock() {
                buf.push_slice(&samples);
            }
        });

        // Poll at twice the block rate so a full block never waits long.
        let block_secs = block_size as f64 / device_rate.max(1) as f64;
        let period = Duration::from_secs_f64((block_secs / 2.0).max(0.005));

        (
            Self {
                buffer,
                block_size,
                device_rate,
                stream_rate,
                period,
                tick: None,
            },
            sink,
        )
    }

    fn take_block(&self) -> Option<Vec<f32>> {
        let mut buf = self
            .buffer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        buf.take_exact(self.block_size)
    }

    /// The sink holds the only other reference; once it is dropped with the
    /// stream no more samples can arrive.
    fn source_closed(&self) -> bool {
        Arc::strong_count(&self.buffer) == 1
    }
}

#[async_trait]
impl CaptureStrategy for InThreadCapture {
    fn kind(&self) -> CaptureStrategyKind {
        CaptureStrategyKind::InThread
    }

    async fn next_block(&mut self) -> Option<SampleBlock> {
        loop {
            if let Some(samples) = self.take_block() {
                let samples = resample_linear(samples, self.device_rate, self.stream_rate);
                return Some(SampleBlock::new(samples, self.stream_rate));
            }
            if self.source_closed() {
                return None;
            }

            let period = self.period;
            let tick = self.tick.get_or_insert_with(|| {
                let mut interval = tokio::time::interval(period);
                interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                interval
            });
            tick.tick().await;
        }
    }

    fn discard_pending(&mut self) {
        let mut buf = self
            .buffer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        buf.clear();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forced_preferences_win_over_probe() {
        assert_eq!(
            CaptureStrategyKind::probe(SampleFormat::F32, StrategyPreference::InThread),
            CaptureStrategyKind::InThread
        );
        assert_eq!(
            CaptureStrategyKind::probe(SampleFormat::U16, StrategyPreference::OffThread),
            CaptureStrategyKind::OffThread
        );
    }

    #[test]
    fn build_strategy_matches_kind() {
        let (s, _sink) = build_strategy(CaptureStrategyKind::InThread, 4096, 48_000, 48_000);
        assert_eq!(s.kind(), CaptureStrategyKind::InThread);
        let (s, _sink) = build_strategy(CaptureStrategyKind::OffThread, 4096, 48_000, 48_000);
        assert_eq!(s.kind(), CaptureStrategyKind::OffThread);
    }

    #[tokio::test]
    async fn off_thread_forwards_variable_blocks_in_order() {
        let (mut strategy, mut sink) = OffThreadCapture::new(48_000, 48_000);

        let feeder = std::thread::spawn(move || {
            sink(vec![0.1, 0.2, 0.3]);
            sink(Vec::new());
            sink(vec![0.4]);
        });
        feeder.join().expect("feeder thread");

        let first = strategy.next_block().await.expect("first block");
        assert_eq!(first.samples(), &[0.1, 0.2, 0.3]);
        let second = strategy.next_block().await.expect("second block");
        assert_eq!(second.samples(), &[0.4]);

        // sink dropped with the thread → source ended
        assert!(strategy.next_block().await.is_none());
    }

    #[tokio::test]
    async fn off_thread_resamples_to_stream_rate() {
        let (mut strategy, mut sink) = OffThreadCapture::new(24_000, 48_000);
        sink(vec![0.5; 100]);
        let block = strategy.next_block().await.expect("block");
        assert_eq!(block.len(), 200);
        assert_eq!(block.sample_rate(), 48_000);
    }

    #[tokio::test]
    async fn off_thread_discard_pending_drops_backlog() {
        let (mut strategy, mut sink) = OffThreadCapture::new(48_000, 48_000);
        sink(vec![0.1; 8]);
        sink(vec![0.2; 8]);
        strategy.discard_pending();
        sink(vec![0.3; 8]);

        let block = strategy.next_block().await.expect("block");
        assert_eq!(block.samples(), &[0.3; 8]);
    }

    #[tokio::test(start_paused = true)]
    async fn in_thread_emits_fixed_size_blocks() {
        let (mut strategy, mut sink) = InThreadCapture::new(4, 48_000, 48_000);

        sink(vec![1.0, 2.0, 3.0]);
        sink(vec![4.0, 5.0]);
        sink(vec![6.0, 7.0, 8.0, 9.0]);

        let a = strategy.next_block().await.expect("block a");
        let b = strategy.next_block().await.expect("block b");
        assert_eq!(a.samples(), &[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(b.samples(), &[5.0, 6.0, 7.0, 8.0]);

        // one sample left over; closing the source ends the stream without it
        drop(sink);
        assert!(strategy.next_block().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn in_thread_waits_for_a_full_block() {
        let (mut strategy, mut sink) = InThreadCapture::new(4, 48_000, 48_000);
        sink(vec![1.0, 2.0]);

        let pending = tokio::time::timeout(Duration::from_millis(50), strategy.next_block()).await;
        assert!(pending.is_err(), "half a block must not be emitted");

        sink(vec![3.0, 4.0]);
        let block = strategy.next_block().await.expect("block");
        assert_eq!(block.samples(), &[1.0, 2.0, 3.0, 4.0]);
    }

    #[tokio::test(start_paused = true)]
    async fn in_thread_discard_pending_clears_ring() {
        let (mut strategy, mut sink) = InThreadCapture::new(2, 48_000, 48_000);
        sink(vec![1.0, 2.0, 3.0]);
        strategy.discard_pending();
        sink(vec![7.0, 8.0]);

        let block = strategy.next_block().await.expect("block");
        assert_eq!(block.samples(), &[7.0, 8.0]);
    }
}
