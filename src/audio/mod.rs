//! Audio pipeline: microphone capture → block extraction → wire encoding.
//!
//! # Pipeline
//!
//! ```text
//! Microphone → cpal callback → first_channel → SampleSink
//!           → CaptureStrategy (OffThread | InThread) → resample_linear
//!           → SampleBlock → into_wire → transport
//! ```
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use babelcast::audio::{build_strategy, AudioCapture, CaptureStrategyKind};
//! use babelcast::config::StrategyPreference;
//!
//! # async fn demo() {
//! let capture = AudioCapture::open(None, 48_000).unwrap();
//! let kind = CaptureStrategyKind::probe(capture.sample_format(), StrategyPreference::Auto);
//! let (mut strategy, sink) = build_strategy(kind, 4096, capture.sample_rate(), 48_000);
//! let _handle = capture.start(sink).unwrap(); // drops handle → stops stream
//!
//! while let Some(block) = strategy.next_block().await {
//!     println!("{} samples, {:.1} ms", block.len(), block.duration_secs() * 1000.0);
//! }
//! # }
//! ```

pub mod block;
pub mod buffer;
pub mod capture;
pub mod resample;
pub mod strategy;

pub use block::{BlockError, SampleBlock};
pub use buffer::{new_shared_buffer, RingBuffer, SharedSampleBuffer};
pub use capture::{AudioCapture, CaptureError, CaptureNode, StreamHandle};
pub use resample::{first_channel, resample_linear};
pub use strategy::{
    build_strategy, CaptureStrategy, CaptureStrategyKind, InThreadCapture, OffThreadCapture,
    SampleSink,
};
