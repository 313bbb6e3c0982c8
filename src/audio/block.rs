//! [`SampleBlock`], one unit of captured or transmitted mono audio, and its
//! wire encoding.
//!
//! The wire format is the block's samples as consecutive little-endian
//! IEEE-754 `f32` values: no header, no length prefix.  Framing comes from the
//! transport (one message == one block), so the sample rate is not carried
//! and both ends must agree on it out of band.

use thiserror::Error;

/// Size in bytes of one encoded sample.
pub const BYTES_PER_SAMPLE: usize = std::mem::size_of::<f32>();

// ---------------------------------------------------------------------------
// BlockError
// ---------------------------------------------------------------------------

/// Reasons a wire payload cannot be turned into a [`SampleBlock`].
#[derive(Debug, Error, Clone, PartialEq)]
pub enum BlockError {
    #[error("empty payload")]
    Empty,

    #[error("payload of {len} bytes is not a whole number of f32 samples")]
    Truncated { len: usize },

    #[error("sample {index} is not a finite number")]
    NonFinite { index: usize },
}

// ---------------------------------------------------------------------------
// SampleBlock
// ---------------------------------------------------------------------------

/// An immutable run of mono `f32` PCM samples at a fixed sample rate.
///
/// The samples live in an owned buffer; moving the block moves the buffer, so
/// handing a block from the capture thread to the transport never copies it.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBlock {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl SampleBlock {
    /// Wrap `samples` captured at `sample_rate` Hz.
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Playback duration in seconds (`len / sample_rate`).
    ///
    /// ```
    /// use babelcast::audio::SampleBlock;
    ///
    /// let block = SampleBlock::new(vec![0.0; 4096], 48_000);
    /// assert!((block.duration_secs() - 0.085_333).abs() < 1e-6);
    /// ```
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }

    /// Give up the sample buffer.
    pub fn into_samples(self) -> Vec<f32> {
        self.samples
    }

    /// Encode as a wire payload, consuming the block.
    pub fn into_wire(self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.samples.len() * BYTES_PER_SAMPLE);
        for sample in self.samples {
            out.extend_from_slice(&sample.to_le_bytes());
        }
        out
    }

    /// Decode a wire payload received for a stream running at `sample_rate`.
    ///
    /// # Errors
    ///
    /// * [`BlockError::Empty`] for a zero-length payload.
    /// * [`BlockError::Truncated`] when the length is not a multiple of 4.
    /// * [`BlockError::NonFinite`] when a sample decodes to NaN or ±inf.
    pub fn from_wire(bytes: &[u8], sample_rate: u32) -> Result<Self, BlockError> {
        if bytes.is_empty() {
            return Err(BlockError::Empty);
        }
        if bytes.len() % BYTES_PER_SAMPLE != 0 {
            return Err(BlockError::Truncated { len: bytes.len() });
        }

        let mut samples = Vec::with_capacity(bytes.len() / BYTES_PER_SAMPLE);
        for (index, chunk) in bytes.chunks_exact(BYTES_PER_SAMPLE).enumerate() {
            let sample = f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
            if !sample.is_finite() {
                return Err(BlockError::NonFinite { index });
            }
            samples.push(sample);
        }

        Ok(Self::new(samples, sample_rate))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_is_little_endian_f32() {
        let block = SampleBlock::new(vec![1.0, -0.5], 48_000);
        let wire = block.into_wire();
        assert_eq!(wire, [0x00, 0x00, 0x80, 0x3f, 0x00, 0x00, 0x00, 0xbf]);
    }

    #[test]
    fn decode_preserves_bits() {
        let samples = vec![0.0_f32, -0.0, 1.0e-30, 0.123_456_79, -1.0];
        let wire = SampleBlock::new(samples.clone(), 16_000).into_wire();
        let decoded = SampleBlock::from_wire(&wire, 16_000).expect("decode");

        let expected: Vec<u32> = samples.iter().map(|s| s.to_bits()).collect();
        let got: Vec<u32> = decoded.samples().iter().map(|s| s.to_bits()).collect();
        assert_eq!(got, expected);
        assert_eq!(decoded.sample_rate(), 16_000);
    }

    #[test]
    fn truncated_payload_is_rejected() {
        let err = SampleBlock::from_wire(&[0, 0, 0x80, 0x3f, 0x00], 48_000).unwrap_err();
        assert_eq!(err, BlockError::Truncated { len: 5 });
    }

    #[test]
    fn empty_payload_is_rejected() {
        assert_eq!(SampleBlock::from_wire(&[], 48_000), Err(BlockError::Empty));
    }

    #[test]
    fn nan_sample_is_rejected() {
        let mut wire = SampleBlock::new(vec![0.25], 48_000).into_wire();
        wire.extend_from_slice(&f32::NAN.to_le_bytes());
        assert_eq!(
            SampleBlock::from_wire(&wire, 48_000),
            Err(BlockError::NonFinite { index: 1 })
        );
    }

    #[test]
    fn duration_of_zero_rate_is_zero() {
        let block = SampleBlock::new(vec![0.0; 10], 0);
        assert_eq!(block.duration_secs(), 0.0);
    }

    #[test]
    fn sample_block_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<SampleBlock>();
    }
}
