//! Fixed-capacity circular sample history

use crate::types::Sample;
use crate::{LinkError, Result};

/// Fixed-capacity circular store
///
/// Every slot starts at the zero value. The write cursor starts on the last slot so
/// the first write lands in slot 0 and `latest` reads zero before any write. Until
/// `capacity` writes have happened the zero slots are part of the mean; this warm-up
/// bias is expected.
#[derive(Debug, Clone)]
pub struct RingBuffer<T: Sample> {
    slots: Box<[T]>,
    cursor: usize,
    writes: u64,
}

impl<T: Sample> RingBuffer<T> {
    /// Create a buffer with `capacity` zeroed slots
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(LinkError::config("ring buffer capacity must be at least 1"));
        }

        Ok(Self { slots: vec![T::default(); capacity].into_boxed_slice(), cursor: capacity - 1, writes: 0 })
    }

    /// Number of slots; fixed for the lifetime of the buffer
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Total writes since construction
    pub fn writes(&self) -> u64 {
        self.writes
    }

    /// Whether every slot holds a written sample
    pub fn is_warm(&self) -> bool {
        self.writes >= self.slots.len() as u64
    }

    /// Overwrite the oldest slot
    pub fn push(&mut self, sample: T) {
        self.cursor = (self.cursor + 1) % self.slots.len();
        self.slots[self.cursor] = sample;
        self.writes += 1;
    }

    /// Most recently written slot
    pub fn latest(&self) -> T {
        self.slots[self.cursor]
    }

    /// Field-wise arithmetic mean over all slots
    pub fn mean(&self) -> T {
        let sum = self.slots.iter().fold(T::default(), |acc, sample| acc + *sample);
        sum * (1.0 / self.slots.len() as f32)
    }

    /// Slots from oldest to newest
    pub fn iter_chronological(&self) -> impl Iterator<Item = &T> {
        let start = (self.cursor + 1) % self.slots.len();
        self.slots[start..].iter().chain(self.slots[..start].iter())
    }
}
