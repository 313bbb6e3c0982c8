//! cpal-backed [`AudioOutput`].
//!
//! The cpal `Stream` is `!Send`, so it lives on a dedicated thread for the
//! lifetime of the output.  The session side talks to that thread only
//! through the shared [`Timeline`] and a stop channel.
//!
//! The device clock is the number of frames the output callback has
//! rendered.  Each scheduled block becomes a voice placed at an absolute
//! frame; the callback mixes whatever voices overlap the current window.

use std::collections::VecDeque;
use std::sync::{mpsc as std_mpsc, Arc, Mutex};
use std::thread::JoinHandle;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SampleFormat, SizedSample, StreamConfig};

use crate::audio::{resample_linear, SampleBlock};

use super::output::{
    AudioOutput, BlockId, OutputFactory, PlaybackError, PlaybackEvent, PlaybackEventSender,
};

// ---------------------------------------------------------------------------
// Timeline
// ---------------------------------------------------------------------------

struct Voice {
    id: BlockId,
    start_frame: u64,
    samples: Vec<f32>,
    notified: bool,
}

impl Voice {
    fn end_frame(&self) -> u64 {
        self.start_frame + self.samples.len() as u64
    }
}

/// Frame-accurate mix of scheduled blocks.
pub(crate) struct Timeline {
    device_rate: u32,
    frames_rendered: u64,
    voices: VecDeque<Voice>,
}

impl Timeline {
    pub(crate) fn new(device_rate: u32) -> Self {
        Self {
            device_rate,
            frames_rendered: 0,
            voices: VecDeque::new(),
        }
    }

    fn set_device_rate(&mut self, rate: u32) {
        self.device_rate = rate;
    }

    pub(crate) fn now_secs(&self) -> f64 {
        if self.device_rate == 0 {
            return 0.0;
        }
        self.frames_rendered as f64 / self.device_rate as f64
    }

    /// Place `samples` (already at the device rate) over `start .. start +
    /// duration` seconds.
    ///
    /// The voice covers exactly the frames between the rounded start and the
    /// rounded end, so `samples` is trimmed or padded with its last value to
    /// fit.  A start within one frame of the previous voice's end is snapped
    /// onto it; rate conversion must not leave an overlap or a hole between
    /// back-to-back blocks.
    pub(crate) fn add(&mut self, id: BlockId, mut samples: Vec<f32>, start: f64, duration: f64) {
        let rate = self.device_rate as f64;
        let start = start.max(0.0);
        let mut start_frame = (start * rate).round() as u64;
        let end_frame = ((start + duration.max(0.0)) * rate).round() as u64;
        let span = end_frame.saturating_sub(start_frame) as usize;

        if let Some(prev) = self.voices.back() {
            let prev_end = prev.end_frame();
            if start_frame.abs_diff(prev_end) <= 1 {
                start_frame = prev_end;
            }
        }

        let fill = samples.last().copied().unwrap_or(0.0);
        samples.resize(span, fill);

        self.voices.push_back(Voice {
            id,
            start_frame: start_frame.max(self.frames_rendered),
            samples,
            notified: false,
        });
    }

    /// Drop voices that have not reached the speaker yet.
    pub(crate) fn cancel_pending(&mut self) {
        let now = self.frames_rendered;
        self.voices.retain(|v| v.start_frame < now);
    }

    /// Fill one interleaved callback buffer and report the voices that can
    /// be followed up.
    ///
    /// A voice is reported once what is left of it fits in one more callback
    /// of the same size, so the successor is in place before the gap opens.
    pub(crate) fn render(&mut self, out: &mut [f32], channels: usize, consumed: &mut Vec<BlockId>) {
        out.fill(0.0);
        let channels = channels.max(1);
        let frames = (out.len() / channels) as u64;
        let window_start = self.frames_rendered;
        let window_end = window_start + frames;

        for voice in self.voices.iter_mut() {
            let voice_end = voice.end_frame();
            let from = voice.start_frame.max(window_start);
            let to = voice_end.min(window_end);
            for frame in from..to {
                let sample = voice.samples[(frame - voice.start_frame) as usize];
                let base = (frame - window_start) as usize * channels;
                for slot in &mut out[base..base + channels] {
                    *slot += sample;
                }
            }

            if !voice.notified && voice_end <= window_end + frames {
                voice.notified = true;
                consumed.push(voice.id);
            }
        }

        self.frames_rendered = window_end;
        self.voices.retain(|v| v.end_frame() > window_end);
    }
}

// ---------------------------------------------------------------------------
// CpalOutput
// ---------------------------------------------------------------------------

/// Output on a real sound card.
pub struct CpalOutput {
    timeline: Arc<Mutex<Timeline>>,
    stream_rate: u32,
    device_rate: u32,
    stop_tx: Option<std_mpsc::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl CpalOutput {
    /// Open `device_name` (or the default output) and start rendering.
    ///
    /// Blocks are resampled from `stream_rate` to whatever rate the device
    /// runs at.  Completion events go to `events`.
    pub fn open(
        device_name: Option<&str>,
        stream_rate: u32,
        events: PlaybackEventSender,
    ) -> Result<Self, PlaybackError> {
        let timeline = Arc::new(Mutex::new(Timeline::new(stream_rate)));
        let (ready_tx, ready_rx) = std_mpsc::channel::<Result<u32, PlaybackError>>();
        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();

        let thread_timeline = Arc::clone(&timeline);
        let device_name = device_name.map(str::to_owned);
        let thread = std::thread::Builder::new()
            .name("babelcast-output".into())
            .spawn(move || {
                output_thread(device_name, thread_timeline, events, ready_tx, stop_rx)
            })
            .map_err(|e| PlaybackError::DeviceUnavailable(e.to_string()))?;

        let device_rate = match ready_rx.recv() {
            Ok(Ok(rate)) => rate,
            Ok(Err(e)) => {
                let _ = thread.join();
                return Err(e);
            }
            Err(_) => {
                let _ = thread.join();
                return Err(PlaybackError::DeviceUnavailable(
                    "output thread exited during setup".into(),
                ));
            }
        };

        log::info!("playback: output open at {device_rate} Hz (stream {stream_rate} Hz)");
        Ok(Self {
            timeline,
            stream_rate,
            device_rate,
            stop_tx: Some(stop_tx),
            thread: Some(thread),
        })
    }
}

impl AudioOutput for CpalOutput {
    fn current_time(&self) -> f64 {
        self.timeline.lock().map(|t| t.now_secs()).unwrap_or(0.0)
    }

    fn schedule(
        &mut self,
        id: BlockId,
        block: SampleBlock,
        start: f64,
    ) -> Result<(), PlaybackError> {
        if self.stop_tx.is_none() {
            return Err(PlaybackError::Disconnected);
        }
        let duration = block.duration_secs();
        let samples = resample_linear(block.into_samples(), self.stream_rate, self.device_rate);
        let mut timeline = self
            .timeline
            .lock()
            .map_err(|_| PlaybackError::Disconnected)?;
        timeline.add(id, samples, start, duration);
        Ok(())
    }

    fn cancel_pending(&mut self) {
        if let Ok(mut timeline) = self.timeline.lock() {
            timeline.cancel_pending();
        }
    }

    fn disconnect(&mut self) {
        if let Some(stop) = self.stop_tx.take() {
            let _ = stop.send(());
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("playback: output thread panicked");
            }
            log::info!("playback: output closed");
        }
    }
}

impl Drop for CpalOutput {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// Owns the cpal stream until told to stop.
fn output_thread(
    device_name: Option<String>,
    timeline: Arc<Mutex<Timeline>>,
    events: PlaybackEventSender,
    ready_tx: std_mpsc::Sender<Result<u32, PlaybackError>>,
    stop_rx: std_mpsc::Receiver<()>,
) {
    let (stream, rate) = match build_output_stream(device_name.as_deref(), &timeline, events) {
        Ok(built) => built,
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };
    if let Err(e) = stream.play() {
        let _ = ready_tx.send(Err(PlaybackError::PlayStream(e.to_string())));
        return;
    }
    let _ = ready_tx.send(Ok(rate));

    // returns on stop() or when the handle is dropped
    let _ = stop_rx.recv();

    if let Err(e) = stream.pause() {
        log::debug!("playback: pause on close failed: {e}");
    }
}

fn build_output_stream(
    device_name: Option<&str>,
    timeline: &Arc<Mutex<Timeline>>,
    events: PlaybackEventSender,
) -> Result<(cpal::Stream, u32), PlaybackError> {
    let host = cpal::default_host();
    let device = match device_name {
        Some(name) => host
            .output_devices()
            .map_err(|e| PlaybackError::DeviceUnavailable(e.to_string()))?
            .find(|d| d.name().map(|n| n == name).unwrap_or(false))
            .ok_or_else(|| {
                PlaybackError::DeviceUnavailable(format!("no output device named {name:?}"))
            })?,
        None => host
            .default_output_device()
            .ok_or_else(|| PlaybackError::DeviceUnavailable("no default output device".into()))?,
    };

    let supported = device
        .default_output_config()
        .map_err(|e| PlaybackError::DeviceUnavailable(e.to_string()))?;
    let format = supported.sample_format();
    let config: StreamConfig = supported.into();
    let rate = config.sample_rate.0;
    let channels = config.channels as usize;

    timeline
        .lock()
        .map_err(|_| PlaybackError::Disconnected)?
        .set_device_rate(rate);

    let timeline = Arc::clone(timeline);
    let stream = match format {
        SampleFormat::F32 => build_typed::<f32>(&device, &config, channels, timeline, events),
        SampleFormat::I16 => build_typed::<i16>(&device, &config, channels, timeline, events),
        SampleFormat::U16 => build_typed::<u16>(&device, &config, channels, timeline, events),
        other => Err(PlaybackError::UnsupportedFormat(other)),
    }?;
    Ok((stream, rate))
}

fn build_typed<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    channels: usize,
    timeline: Arc<Mutex<Timeline>>,
    events: PlaybackEventSender,
) -> Result<cpal::Stream, PlaybackError>
where
    T: SizedSample + FromSample<f32>,
{
    let mut mix: Vec<f32> = Vec::new();
    let mut consumed: Vec<BlockId> = Vec::new();

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                mix.resize(data.len(), 0.0);
                match timeline.lock() {
                    Ok(mut tl) => tl.render(&mut mix, channels, &mut consumed),
                    Err(_) => mix.fill(0.0),
                }
                for (out, sample) in data.iter_mut().zip(mix.iter()) {
                    *out = T::from_sample(*sample);
                }
                for id in consumed.drain(..) {
                    let _ = events.send(PlaybackEvent::BlockConsumed(id));
                }
            },
            |err| log::error!("playback: output stream error: {err}"),
            None,
        )
        .map_err(|e| PlaybackError::BuildStream(e.to_string()))
}

// ---------------------------------------------------------------------------
// CpalOutputFactory
// ---------------------------------------------------------------------------

/// Opens a [`CpalOutput`] per session on the configured device.
#[derive(Debug, Clone, Default)]
pub struct CpalOutputFactory {
    device_name: Option<String>,
}

impl CpalOutputFactory {
    pub fn new(device_name: Option<String>) -> Self {
        Self { device_name }
    }
}

impl OutputFactory for CpalOutputFactory {
    fn open(
        &self,
        stream_rate: u32,
        events: PlaybackEventSender,
    ) -> Result<Box<dyn AudioOutput>, PlaybackError> {
        let output = CpalOutput::open(self.device_name.as_deref(), stream_rate, events)?;
        Ok(Box::new(output))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn render(tl: &mut Timeline, frames: usize, channels: usize) -> (Vec<f32>, Vec<BlockId>) {
        let mut out = vec![9.0; frames * channels];
        let mut consumed = Vec::new();
        tl.render(&mut out, channels, &mut consumed);
        (out, consumed)
    }

    #[test]
    fn clock_advances_by_rendered_frames() {
        let mut tl = Timeline::new(1000);
        assert_eq!(tl.now_secs(), 0.0);
        render(&mut tl, 250, 2);
        assert!((tl.now_secs() - 0.25).abs() < 1e-12);
    }

    #[test]
    fn silence_when_nothing_scheduled() {
        let mut tl = Timeline::new(1000);
        let (out, consumed) = render(&mut tl, 4, 1);
        assert_eq!(out, vec![0.0; 4]);
        assert!(consumed.is_empty());
    }

    #[test]
    fn voice_starts_at_its_frame_on_every_channel() {
        let mut tl = Timeline::new(1000);
        tl.add(0, vec![0.5, 0.25], 0.002, 0.002);
        let (out, _) = render(&mut tl, 4, 2);
        assert_eq!(out, vec![0.0, 0.0, 0.0, 0.0, 0.5, 0.5, 0.25, 0.25]);
    }

    #[test]
    fn back_to_back_voices_are_seamless() {
        let mut tl = Timeline::new(1000);
        tl.add(0, vec![1.0; 3], 0.0, 0.003);
        tl.add(1, vec![2.0; 3], 0.003, 0.003);
        let (out, _) = render(&mut tl, 6, 1);
        assert_eq!(out, vec![1.0, 1.0, 1.0, 2.0, 2.0, 2.0]);
    }

    #[test]
    fn voice_spanning_callbacks_continues() {
        let mut tl = Timeline::new(1000);
        tl.add(0, vec![1.0, 2.0, 3.0, 4.0, 5.0], 0.0, 0.005);
        let (first, _) = render(&mut tl, 3, 1);
        let (second, _) = render(&mut tl, 3, 1);
        assert_eq!(first, vec![1.0, 2.0, 3.0]);
        assert_eq!(second, vec![4.0, 5.0, 0.0]);
    }

    #[test]
    fn completion_is_reported_one_callback_early_and_once() {
        let mut tl = Timeline::new(1000);
        tl.add(7, vec![0.1; 10], 0.0, 0.010);

        let (_, c1) = render(&mut tl, 4, 1); // frames 0..4, 6 left
        assert!(c1.is_empty());
        let (_, c2) = render(&mut tl, 4, 1); // frames 4..8, 2 left ≤ 4
        assert_eq!(c2, vec![7]);
        let (_, c3) = render(&mut tl, 4, 1);
        assert!(c3.is_empty());
    }

    #[test]
    fn late_start_is_clamped_to_now() {
        let mut tl = Timeline::new(1000);
        render(&mut tl, 5, 1);
        tl.add(0, vec![1.0], 0.001, 0.001);
        let (out, _) = render(&mut tl, 2, 1);
        assert_eq!(out, vec![1.0, 0.0]);
    }

    #[test]
    fn cancel_keeps_only_started_voices() {
        let mut tl = Timeline::new(1000);
        tl.add(0, vec![1.0; 4], 0.0, 0.004);
        tl.add(1, vec![2.0; 4], 0.004, 0.004);
        render(&mut tl, 2, 1);
        tl.cancel_pending();
        let (out, _) = render(&mut tl, 6, 1);
        assert_eq!(out, vec![1.0, 1.0, 0.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn converted_blocks_stay_seamless_at_44_1_khz() {
        const BLOCK: usize = 4096;
        let stream_rate = 48_000;
        let device_rate = 44_100;
        let mut tl = Timeline::new(device_rate);

        // start times as the scheduler hands them out: each block at the
        // previous start plus its duration
        let duration = BLOCK as f64 / stream_rate as f64;
        let mut start = 0.0;
        for id in 0..4 {
            let samples = resample_linear(vec![1.0; BLOCK], stream_rate, device_rate);
            tl.add(id, samples, start, duration);
            start += duration;
        }

        let covered = (start * device_rate as f64).round() as usize;
        let (out, _) = render(&mut tl, covered + 100, 1);
        let off: Vec<(usize, f32)> = out[..covered]
            .iter()
            .copied()
            .enumerate()
            .filter(|&(_, s)| (s - 1.0).abs() > 1e-6)
            .collect();
        assert!(off.is_empty(), "overlaps or holes at {off:?}");
        assert!(out[covered..].iter().all(|&s| s == 0.0));
    }

    #[test]
    fn short_conversion_is_padded_to_its_span() {
        let mut tl = Timeline::new(1000);
        // 4 ms at 1 kHz is 4 frames; hand over only 3
        tl.add(0, vec![0.5; 3], 0.0, 0.004);
        tl.add(1, vec![0.25; 4], 0.004, 0.004);
        let (out, _) = render(&mut tl, 8, 1);
        assert_eq!(out, vec![0.5, 0.5, 0.5, 0.5, 0.25, 0.25, 0.25, 0.25]);
    }
}
