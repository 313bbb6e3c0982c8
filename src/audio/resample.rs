//! Channel extraction and sample-rate conversion.
//!
//! Blocks on the wire are mono at the configured stream rate.  Capture devices
//! frequently deliver interleaved multi-channel audio at their own native
//! rate, and output devices may run at yet another rate, so this module
//! provides:
//!
//! 1. [`first_channel`]: pull channel 0 out of interleaved frames.
//! 2. [`resample_linear`]: convert between arbitrary rates.
//!
//! The resampler uses linear interpolation: fast and allocation-light, which
//! matters because it runs once per block on the live path.

use cpal::{FromSample, Sample};

// ---------------------------------------------------------------------------
// first_channel
// ---------------------------------------------------------------------------

/// Extract channel 0 from interleaved `data`, converting each sample to `f32`.
///
/// * `channels == 1` copies the input straight through.
/// * `channels == 0` yields an empty vector.
/// * A trailing partial frame is ignored.
///
/// # Example
///
/// ```rust
/// use babelcast::audio::first_channel;
///
/// let stereo = [0.5_f32, -0.5, 0.2, -0.2]; // L R L R
/// assert_eq!(first_channel(&stereo, 2), vec![0.5, 0.2]);
/// ```
pub fn first_channel<T>(data: &[T], channels: u16) -> Vec<f32>
where
    T: Sample,
    f32: FromSample<T>,
{
    match channels {
        0 => Vec::new(),
        1 => data.iter().map(|&s| f32::from_sample(s)).collect(),
        n => data
            .chunks_exact(n as usize)
            .map(|frame| f32::from_sample(frame[0]))
            .collect(),
    }
}

// ---------------------------------------------------------------------------
// resample_linear
// ---------------------------------------------------------------------------

/// Resample `samples` from `source_rate` Hz to `target_rate` Hz using linear
/// interpolation.
///
/// * Equal rates return the input unchanged (no interpolation performed).
/// * Empty input, or a zero rate on either side, yields an empty vector.
///
/// The output length is `ceil(samples.len() * target_rate / source_rate)`.
///
/// # Example
///
/// ```rust
/// use babelcast::audio::resample_linear;
///
/// // 10 ms @ 44.1 kHz → 10 ms @ 48 kHz
/// let out = resample_linear(vec![0.5_f32; 441], 44_100, 48_000);
/// assert_eq!(out.len(), 480);
/// ```
pub fn resample_linear(samples: Vec<f32>, source_rate: u32, target_rate: u32) -> Vec<f32> {
    if source_rate == target_rate {
        return samples;
    }

    if samples.is_empty() || source_rate == 0 || target_rate == 0 {
        return Vec::new();
    }

    let ratio = target_rate as f64 / source_rate as f64;
    let output_len = (samples.len() as f64 * ratio).ceil() as usize;
    let mut output = Vec::with_capacity(output_len);

    for i in 0..output_len {
        let src_pos = i as f64 / ratio;
        let idx = src_pos as usize;
        let frac = (src_pos - idx as f64) as f32;

        let sample = if idx + 1 < samples.len() {
            samples[idx] * (1.0 - frac) + samples[idx + 1] * frac
        } else if idx < samples.len() {
            samples[idx]
        } else {
            0.0
        };

        output.push(sample);
    }

    output
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
