//! Fixed-capacity sample ring buffer.
//!
//! Decouples irregular hardware delivery from fixed-size window
//! consumption. Overflow is a signal of a stalled consumer: `push`
//! refuses new samples instead of overwriting old ones.

/// FIFO of `i16` audio samples with capacity fixed at construction.
#[derive(Debug)]
pub struct SampleRingBuffer {
    buf: Box<[i16]>,
    head: usize,
    tail: usize,
    len: usize,
    rejected: u64,
}

impl SampleRingBuffer {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "ring capacity must be non-zero");
        Self {
            buf: vec![0i16; capacity].into_boxed_slice(),
            head: 0,
            tail: 0,
            len: 0,
            rejected: 0,
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Samples refused because the buffer was full.
    #[must_use]
    pub fn rejected_samples(&self) -> u64 {
        self.rejected
    }

    /// Returns `false` (and keeps existing contents unchanged) when full.
    pub fn push(&mut self, sample: i16) -> bool {
        if self.len == self.buf.len() {
            self.rejected += 1;
            return false;
        }
        self.buf[self.head] = sample;
        self.head = (self.head + 1) % self.buf.len();
        self.len += 1;
        true
    }

    /// Push as many of `samples` as fit; returns how many were accepted.
    pub fn push_slice(&mut self, samples: &[i16]) -> usize {
        let mut accepted = 0;
        for &s in samples {
            if !self.push(s) {
                break;
            }
            accepted += 1;
        }
        accepted
    }

    pub fn pop(&mut self) -> Option<i16> {
        if self.len == 0 {
            return None;
        }
        let s = self.buf[self.tail];
        self.tail = (self.tail + 1) % self.buf.len();
        self.len -= 1;
        Some(s)
    }

    /// All-or-nothing: fills `out` completely or leaves the buffer
    /// untouched and returns `false`. Fewer samples than requested is
    /// "not ready yet", not an error.
    pub fn pop_many(&mut self, out: &mut [i16]) -> bool {
        if self.len < out.len() {
            return false;
        }
        for slot in out.iter_mut() {
            *slot = self.buf[self.tail];
            self.tail = (self.tail + 1) % self.buf.len();
        }
        self.len -= out.len();
        true
    }
}
