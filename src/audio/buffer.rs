//! Fixed-capacity circular (ring) buffer for `f32` audio samples.
//!
//! The in-thread capture strategy pushes every hardware callback into this
//! buffer and pulls fixed-size blocks out of it on the session task.  When the
//! session falls behind and the buffer fills, new samples **overwrite** the
//! oldest data, so the stream skips ahead instead of building latency.
//!
//! # Example
//!
//! ```rust
//! use babelcast::audio::RingBuffer;
//!
//! let mut buf = RingBuffer::new(4);
//! buf.push_slice(&[1.0, 2.0, 3.0, 4.0, 5.0]); // 5 items → capacity 4 → oldest dropped
//! assert_eq!(buf.take_exact(3), Some(vec![2.0, 3.0, 4.0]));
//! assert_eq!(buf.take_exact(3), None);
//! ```

use std::sync::{Arc, Mutex};

// ---------------------------------------------------------------------------
// RingBuffer
// ---------------------------------------------------------------------------

/// A fixed-capacity circular buffer.
///
/// ## Overflow behaviour
///
/// When [`push_slice`](Self::push_slice) would exceed `capacity`, the oldest
/// samples are silently overwritten and counted in
/// [`overwritten`](Self::overwritten).  The buffer never allocates beyond its
/// initial capacity.
pub struct RingBuffer<T> {
    buf: Vec<T>,
    capacity: usize,
    /// Index of the *next* write position (wraps around `capacity`).
    write_pos: usize,
    /// Number of valid samples currently stored (≤ `capacity`).
    len: usize,
    overwritten: u64,
}

impl<T: Copy + Default> RingBuffer<T> {
    /// Create a new ring buffer with the given `capacity`.
    ///
    /// # Panics
    ///
    /// Panics if `capacity == 0`.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "RingBuffer capacity must be > 0");
        Self {
            buf: vec![T::default(); capacity],
            capacity,
            write_pos: 0,
            len: 0,
            overwritten: 0,
        }
    }

    /// Append `data`, overwriting the oldest samples on overflow.
    pub fn push_slice(&mut self, data: &[T]) {
        for &item in data {
            self.buf[self.write_pos] = item;
            self.write_pos = (self.write_pos + 1) % self.capacity;
            if self.len < self.capacity {
                self.len += 1;
            } else {
                self.overwritten += 1;
            }
        }
    }

    /// Remove and return exactly `n` of the oldest samples, or `None` (leaving
    /// the buffer untouched) when fewer than `n` are stored.
    pub fn take_exact(&mut self, n: usize) -> Option<Vec<T>> {
        if n == 0 || self.len < n {
            return None;
        }

        // Oldest sample sits `len` positions behind the write cursor.
        let read_pos = (self.write_pos + self.capacity - self.len) % self.capacity;

        let mut out = Vec::with_capacity(n);
        for i in 0..n {
            out.push(self.buf[(read_pos + i) % self.capacity]);
        }
        self.len -= n;
        Some(out)
    }

    /// Discard all samples and reset the write position.
    pub fn clear(&mut self) {
        self.write_pos = 0;
        self.len = 0;
    }

    /// Number of valid samples currently stored.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total samples lost to overflow since creation.
    pub fn overwritten(&self) -> u64 {
        self.overwritten
    }
}

// ---------------------------------------------------------------------------
// SharedSampleBuffer
// ---------------------------------------------------------------------------

/// Ring buffer shared between the cpal callback (writer) and the in-thread
/// capture strategy (reader).  Lock only for the copy; never across `.await`.
pub type SharedSampleBuffer = Arc<Mutex<RingBuffer<f32>>>;

/// Construct an empty [`SharedSampleBuffer`].
pub fn new_shared_buffer(capacity: usize) -> SharedSampleBuffer {
    Arc::new(Mutex::new(RingBuffer::new(capacity)))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
