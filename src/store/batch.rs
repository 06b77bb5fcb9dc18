//! Fixed-capacity storage page for the vector store

use super::allocator::{AlignedAllocator, AlignedBuf};
use crate::error::{Error, Result};

/// A batch holds `capacity` slots of `width` bytes in one aligned region
///
/// The fill cursor (`size`) only moves through `resize`; the physical
/// capacity is fixed when the batch is created.
#[derive(Debug)]
pub struct VectorBatch {
    /// Backing memory, `width * capacity` bytes
    data: AlignedBuf,
    /// Bytes per slot
    width: usize,
    /// Number of slots
    capacity: usize,
    /// Fill cursor
    size: usize,
}

impl VectorBatch {
    /// Allocate a batch of `capacity` slots, each `width` bytes wide
    pub fn new(allocator: &AlignedAllocator, width: usize, capacity: usize) -> Result<Self> {
        let bytes = width.checked_mul(capacity).ok_or_else(|| {
            Error::InvalidArgument(format!(
                "Batch of {} slots x {} bytes overflows",
                capacity, width
            ))
        })?;

        let data = allocator.allocate(bytes)?;

        Ok(Self {
            data,
            width,
            capacity,
            size: 0,
        })
    }

    /// Slots in use
    pub fn size(&self) -> usize {
        self.size
    }

    /// Slots left before the batch is full
    pub fn available(&self) -> usize {
        self.capacity - self.size
    }

    /// Physical slot count
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes per slot
    pub fn width(&self) -> usize {
        self.width
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn is_full(&self) -> bool {
        self.size == self.capacity
    }

    /// Bytes of the slot at `index`
    pub fn at(&self, index: usize) -> &[u8] {
        check!(
            index < self.capacity,
            "batch slot {} out of range, capacity {}",
            index,
            self.capacity
        );
        let start = index * self.width;
        &self.data[start..start + self.width]
    }

    /// Mutable bytes of the slot at `index`
    pub fn at_mut(&mut self, index: usize) -> &mut [u8] {
        check!(
            index < self.capacity,
            "batch slot {} out of range, capacity {}",
            index,
            self.capacity
        );
        let start = index * self.width;
        &mut self.data[start..start + self.width]
    }

    /// Overwrite the slot at `index`
    pub fn set_vector(&mut self, index: usize, vector: &[u8]) {
        check!(
            vector.len() == self.width,
            "vector of {} bytes written to {}-byte slot",
            vector.len(),
            self.width
        );
        self.at_mut(index).copy_from_slice(vector);
    }

    /// Copy slot `from` over slot `to` within this batch
    pub fn copy_within(&mut self, from: usize, to: usize) {
        check!(
            from < self.capacity && to < self.capacity,
            "batch copy {} -> {} out of range, capacity {}",
            from,
            to,
            self.capacity
        );
        let src = from * self.width;
        self.data.copy_within(src..src + self.width, to * self.width);
    }

    /// Move the fill cursor to `n`
    pub fn resize(&mut self, n: usize) {
        check!(
            n <= self.capacity,
            "batch resize to {} exceeds capacity {}",
            n,
            self.capacity
        );
        self.size = n;
    }

    /// Raw bytes of the whole batch, slot after slot
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch(width: usize, capacity: usize) -> VectorBatch {
        VectorBatch::new(&AlignedAllocator::new(), width, capacity).unwrap()
    }

    #[test]
    fn test_batch_cursor() {
        let mut b = batch(8, 4);

        assert!(b.is_empty());
        assert_eq!(b.available(), 4);

        b.resize(3);
        assert_eq!(b.size(), 3);
        assert_eq!(b.available(), 1);
        assert!(!b.is_full());

        b.resize(4);
        assert!(b.is_full());

        b.resize(0);
        assert!(b.is_empty());
        assert_eq!(b.capacity(), 4);
    }

    #[test]
    fn test_batch_slots() {
        let mut b = batch(4, 3);

        b.set_vector(0, &[1, 2, 3, 4]);
        b.set_vector(2, &[9, 9, 9, 9]);

        assert_eq!(b.at(0), &[1, 2, 3, 4]);
        assert_eq!(b.at(1), &[0, 0, 0, 0]);
        assert_eq!(b.at(2), &[9, 9, 9, 9]);
        assert_eq!(b.as_bytes().len(), 12);
    }

    #[test]
    fn test_batch_copy_within() {
        let mut b = batch(2, 3);
        b.set_vector(0, &[5, 6]);
        b.copy_within(0, 2);
        assert_eq!(b.at(2), &[5, 6]);
    }

    #[test]
    fn test_batch_resize_keeps_bytes() {
        let mut b = batch(2, 2);
        b.resize(2);
        b.set_vector(1, &[7, 8]);
        b.resize(0);
        b.resize(2);
        assert_eq!(b.at(1), &[7, 8]);
    }

    #[test]
    #[should_panic(expected = "exceeds capacity")]
    fn test_batch_resize_past_capacity() {
        batch(4, 2).resize(3);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_batch_slot_out_of_range() {
        batch(4, 2).at(2);
    }

    #[test]
    #[should_panic(expected = "written to")]
    fn test_batch_width_mismatch() {
        batch(4, 2).set_vector(0, &[1, 2]);
    }

    #[test]
    fn test_batch_size_overflow() {
        let err = VectorBatch::new(&AlignedAllocator::new(), usize::MAX, 2).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }
}
