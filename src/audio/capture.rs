//! Microphone capture via `cpal`.
//!
//! [`AudioCapture`] wraps the cpal host/device/stream lifecycle.  Opening it
//! acquires the input device (this is where a missing microphone or a denied
//! permission surfaces); [`AudioCapture::start`] begins delivering channel-0
//! samples to a [`SampleSink`] from the real-time callback thread.  The
//! returned [`StreamHandle`] is a RAII guard: dropping or releasing it stops
//! the hardware stream.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, SampleFormat, SizedSample};
use thiserror::Error;

use super::resample::first_channel;
use super::strategy::SampleSink;

// ---------------------------------------------------------------------------
// CaptureError
// ---------------------------------------------------------------------------

/// Errors that can occur while setting up or running the audio capture.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// No usable microphone: missing device, unplugged, or access denied.
    #[error("capture unavailable: {0}")]
    CaptureUnavailable(String),

    #[error("unsupported input sample format {0:?}")]
    UnsupportedFormat(SampleFormat),

    #[error("failed to build input stream: {0}")]
    BuildStream(cpal::BuildStreamError),

    #[error("failed to start audio stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),
}

impl From<cpal::BuildStreamError> for CaptureError {
    fn from(err: cpal::BuildStreamError) -> Self {
        match err {
            cpal::BuildStreamError::DeviceNotAvailable => {
                CaptureError::CaptureUnavailable("input device is not available".into())
            }
            other => CaptureError::BuildStream(other),
        }
    }
}

impl From<cpal::DefaultStreamConfigError> for CaptureError {
    fn from(err: cpal::DefaultStreamConfigError) -> Self {
        CaptureError::CaptureUnavailable(format!("cannot query input config: {err}"))
    }
}

// ---------------------------------------------------------------------------
// CaptureNode / StreamHandle
// ---------------------------------------------------------------------------

/// Something that keeps a microphone open until it is released.
pub trait CaptureNode {
    /// Stop delivering samples and free the device.
    fn release(self: Box<Self>);
}

/// RAII guard that keeps the cpal input stream alive.
pub struct StreamHandle {
    stream: cpal::Stream,
}

impl CaptureNode for StreamHandle {
    fn release(self: Box<Self>) {
        if let Err(e) = self.stream.pause() {
            log::debug!("capture: pause on release failed: {e}");
        }
        // dropping `stream` closes the device
    }
}

// ---------------------------------------------------------------------------
// AudioCapture
// ---------------------------------------------------------------------------

/// Microphone capture device wrapper built on top of `cpal`.
///
/// ```rust,no_run
/// use babelcast::audio::{AudioCapture, OffThreadCapture};
///
/// let capture = AudioCapture::open(None, 48_000).unwrap();
/// let (strategy, sink) = OffThreadCapture::new(capture.sample_rate(), 48_000);
/// let _handle = capture.start(sink).unwrap();
/// // `_handle` keeps the stream alive; drop it to stop recording.
/// # drop(strategy);
/// ```
pub struct AudioCapture {
    device: cpal::Device,
    config: cpal::StreamConfig,
    sample_format: SampleFormat,
    sample_rate: u32,
    channels: u16,
}

impl AudioCapture {
    /// Acquire an input device.
    ///
    /// `device_name` selects a device by its cpal name (`None` = system
    /// default).  A configuration running at `preferred_rate` is used when
    /// the device offers one, preferring native `f32` samples; otherwise the
    /// device default is taken and blocks are resampled later.
    ///
    /// # Errors
    ///
    /// [`CaptureError::CaptureUnavailable`] when no matching device exists or
    /// the platform refuses to describe it (typically a denied permission).
    pub fn open(device_name: Option<&str>, preferred_rate: u32) -> Result<Self, CaptureError> {
        let host = cpal::default_host();

        let device = match device_name {
            Some(name) => host
                .input_devices()
                .map_err(|e| CaptureError::CaptureUnavailable(e.to_string()))?
                .find(|d| d.name().map(|n| n == name).unwrap_or(false))
                .ok_or_else(|| {
                    CaptureError::CaptureUnavailable(format!("input device {name:?} not found"))
                })?,
            None => host.default_input_device().ok_or_else(|| {
                CaptureError::CaptureUnavailable("no input device on the default host".into())
            })?,
        };

        let supported = match Self::config_at_rate(&device, preferred_rate) {
            Some(cfg) => cfg,
            None => device.default_input_config()?,
        };

        let sample_format = supported.sample_format();
        let channels = supported.channels();
        let sample_rate = supported.sample_rate().0;
        let config: cpal::StreamConfig = supported.into();

        log::info!(
            "capture: opened {:?} ({sample_rate} Hz, {channels} ch, {sample_format:?})",
            device.name().unwrap_or_else(|_| "<unnamed>".into())
        );

        Ok(Self {
            device,
            config,
            sample_format,
            sample_rate,
            channels,
        })
    }

    fn config_at_rate(device: &cpal::Device, rate: u32) -> Option<cpal::SupportedStreamConfig> {
        let ranges: Vec<_> = device.supported_input_configs().ok()?.collect();
        let fits = |r: &&cpal::SupportedStreamConfigRange| {
            r.min_sample_rate().0 <= rate && rate <= r.max_sample_rate().0
        };
        ranges
            .iter()
            .filter(fits)
            .find(|r| r.sample_format() == SampleFormat::F32)
            .or_else(|| ranges.iter().find(fits))
            .map(|r| r.clone().with_sample_rate(cpal::SampleRate(rate)))
    }

    /// Start the hardware stream, feeding channel-0 samples of every callback
    /// to `sink` on the real-time audio thread.
    ///
    /// # Errors
    ///
    /// [`CaptureError::CaptureUnavailable`] when the device vanished,
    /// [`CaptureError::UnsupportedFormat`] for exotic sample formats, or a
    /// build/play error from the platform.
    pub fn start(&self, sink: SampleSink) -> Result<StreamHandle, CaptureError> {
        match self.sample_format {
            SampleFormat::F32 => self.build::<f32>(sink),
            SampleFormat::I16 => self.build::<i16>(sink),
            SampleFormat::U16 => self.build::<u16>(sink),
            other => Err(CaptureError::UnsupportedFormat(other)),
        }
    }

    fn build<T>(&self, mut sink: SampleSink) -> Result<StreamHandle, CaptureError>
    where
        T: SizedSample,
        f32: FromSample<T>,
    {
        let channels = self.channels;

        let stream = self.device.build_input_stream(
            &self.config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                sink(first_channel(data, channels));
            },
            |err: cpal::StreamError| {
                log::error!("capture: cpal stream error: {err}");
            },
            None,
        )?;

        stream.play()?;
        Ok(StreamHandle { stream })
    }

    /// Native sample rate of the capture stream in Hz.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of interleaved channels delivered by the device.
    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Sample format the device delivers natively.
    pub fn sample_format(&self) -> SampleFormat {
        self.sample_format
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
