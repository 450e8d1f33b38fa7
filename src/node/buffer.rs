//! Fixed-capacity sample block owned by one acquisition node
//!
//! The buffer is written exclusively by the sample producer while sampling is
//! enabled and read exclusively by the transfer layer after the producer has
//! been disabled. `[0, cursor)` is the committed prefix: values pushed by the
//! producer and never mutated again until `clear()`.

use std::fmt;

/// A fixed-length block of 16-bit samples with an optional parallel
/// timestamp track.
///
/// Invariants:
/// - `cursor <= capacity` always
/// - `full` holds exactly when `cursor == capacity`
/// - slots at index `>= cursor` are zero
pub struct SampleBuffer {
    samples: Vec<u16>,
    /// Microsecond timestamps, same length and indexing as `samples`.
    timestamps: Option<Vec<u64>>,
    cursor: usize,
    full: bool,
}

impl SampleBuffer {
    /// Create a zeroed buffer. `record_timestamps` allocates the parallel
    /// timestamp track.
    pub fn new(capacity: usize, record_timestamps: bool) -> Self {
        Self {
            samples: vec![0; capacity],
            timestamps: record_timestamps.then(|| vec![0; capacity]),
            cursor: 0,
            full: false,
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.samples.len()
    }

    #[inline]
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.full
    }

    /// Commit one sample at the cursor. Returns the new cursor position, or
    /// `None` if the buffer is already full (a late trigger edge, dropped).
    pub fn push(&mut self, value: u16, timestamp_us: u64) -> Option<usize> {
        if self.full {
            return None;
        }
        debug_assert!(self.cursor < self.capacity(), "cursor past capacity");

        self.samples[self.cursor] = value;
        if let Some(ts) = self.timestamps.as_mut() {
            ts[self.cursor] = timestamp_us;
        }
        self.cursor += 1;
        if self.cursor == self.capacity() {
            self.full = true;
        }
        Some(self.cursor)
    }

    /// The committed prefix `[0, cursor)`.
    #[inline]
    pub fn committed(&self) -> &[u16] {
        &self.samples[..self.cursor]
    }

    /// Committed timestamps, if the track is recorded.
    pub fn committed_timestamps(&self) -> Option<&[u64]> {
        self.timestamps.as_deref().map(|ts| &ts[..self.cursor])
    }

    /// Reset to the freshly-constructed state: cursor 0, `full` cleared, all
    /// slots (both tracks) zeroed.
    pub fn clear(&mut self) {
        self.samples.fill(0);
        if let Some(ts) = self.timestamps.as_mut() {
            ts.fill(0);
        }
        self.cursor = 0;
        self.full = false;
    }
}

impl fmt::Display for SampleBuffer {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "SampleBuffer[{}/{}{}]",
            self.cursor,
            self.capacity(),
            if self.full { ", full" } else { "" }
        )
    }
}
