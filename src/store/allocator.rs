//! Aligned memory allocator for vector batches

use crate::error::{Error, Result};
use std::alloc::{alloc_zeroed, dealloc, handle_alloc_error, Layout};
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Default alignment, wide enough for any SIMD register in use today
pub const DEFAULT_ALIGNMENT: usize = 64;

/// Allocator handing out aligned, zeroed byte regions
///
/// One instance is created per process (or per store) and shared by `Arc`
/// with every batch, so all vector memory follows one alignment policy.
#[derive(Debug)]
pub struct AlignedAllocator {
    /// Alignment of every region (power of two)
    alignment: usize,
    /// Bytes currently held by live buffers
    allocated: Arc<AtomicUsize>,
}

impl AlignedAllocator {
    /// Create an allocator with the default 64-byte alignment
    pub fn new() -> Self {
        Self {
            alignment: DEFAULT_ALIGNMENT,
            allocated: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Create an allocator with a custom alignment
    ///
    /// The alignment must be a power of two and at least 8.
    pub fn with_alignment(alignment: usize) -> Result<Self> {
        if !alignment.is_power_of_two() || alignment < 8 {
            return Err(Error::InvalidArgument(format!(
                "Alignment {} must be a power of two >= 8",
                alignment
            )));
        }

        Ok(Self {
            alignment,
            allocated: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Alignment applied to every allocation
    pub fn alignment(&self) -> usize {
        self.alignment
    }

    /// Bytes currently allocated and not yet freed
    pub fn allocated_bytes(&self) -> usize {
        self.allocated.load(Ordering::Relaxed)
    }

    /// Allocate `size` zeroed bytes
    pub fn allocate(&self, size: usize) -> Result<AlignedBuf> {
        let layout = Layout::from_size_align(size, self.alignment).map_err(|e| {
            Error::InvalidArgument(format!("Cannot allocate {} bytes: {}", size, e))
        })?;

        let ptr = if size == 0 {
            NonNull::dangling()
        } else {
            // SAFETY: layout has a non-zero size.
            let raw = unsafe { alloc_zeroed(layout) };
            match NonNull::new(raw) {
                Some(ptr) => ptr,
                None => handle_alloc_error(layout),
            }
        };

        self.allocated.fetch_add(size, Ordering::Relaxed);
        debug!(size, alignment = self.alignment, "Allocated aligned buffer");

        Ok(AlignedBuf {
            ptr,
            layout,
            counter: Arc::clone(&self.allocated),
        })
    }
}

impl Default for AlignedAllocator {
    fn default() -> Self {
        Self::new()
    }
}

/// Owned aligned byte region, freed on drop
pub struct AlignedBuf {
    ptr: NonNull<u8>,
    layout: Layout,
    counter: Arc<AtomicUsize>,
}

// SAFETY: the buffer exclusively owns its memory; shared access only hands
// out `&[u8]` and mutation requires `&mut self`.
unsafe impl Send for AlignedBuf {}
unsafe impl Sync for AlignedBuf {}

impl AlignedBuf {
    /// Size in bytes
    pub fn len(&self) -> usize {
        self.layout.size()
    }

    /// True for a zero-sized region
    pub fn is_empty(&self) -> bool {
        self.layout.size() == 0
    }

    /// Alignment of the region
    pub fn alignment(&self) -> usize {
        self.layout.align()
    }

    /// Raw pointer to the first byte
    pub fn as_ptr(&self) -> *const u8 {
        self.ptr.as_ptr()
    }
}

impl Deref for AlignedBuf {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        // SAFETY: ptr is valid for layout.size() initialised bytes (or
        // dangling with size 0).
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.layout.size()) }
    }
}

impl DerefMut for AlignedBuf {
    fn deref_mut(&mut self) -> &mut [u8] {
        // SAFETY: as above, and `&mut self` guarantees exclusivity.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.layout.size()) }
    }
}

impl Drop for AlignedBuf {
    fn drop(&mut self) {
        if self.layout.size() != 0 {
            // SAFETY: allocated in `AlignedAllocator::allocate` with this layout.
            unsafe { dealloc(self.ptr.as_ptr(), self.layout) };
        }
        self.counter.fetch_sub(self.layout.size(), Ordering::Relaxed);
    }
}

impl fmt::Debug for AlignedBuf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AlignedBuf")
            .field("len", &self.layout.size())
            .field("alignment", &self.layout.align())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocation_is_aligned_and_zeroed() -> Result<()> {
        let allocator = AlignedAllocator::new();
        let buf = allocator.allocate(1000)?;

        assert_eq!(buf.len(), 1000);
        assert_eq!(buf.as_ptr() as usize % DEFAULT_ALIGNMENT, 0);
        assert!(buf.iter().all(|&b| b == 0));
        Ok(())
    }

    #[test]
    fn test_allocated_bytes_tracking() -> Result<()> {
        let allocator = AlignedAllocator::new();
        let a = allocator.allocate(128)?;
        let b = allocator.allocate(64)?;
        assert_eq!(allocator.allocated_bytes(), 192);

        drop(a);
        assert_eq!(allocator.allocated_bytes(), 64);

        drop(b);
        assert_eq!(allocator.allocated_bytes(), 0);
        Ok(())
    }

    #[test]
    fn test_write_through_deref() -> Result<()> {
        let allocator = AlignedAllocator::new();
        let mut buf = allocator.allocate(16)?;
        buf[3] = 7;
        buf[15] = 9;
        assert_eq!(buf[3], 7);
        assert_eq!(buf[15], 9);
        Ok(())
    }

    #[test]
    fn test_zero_sized_allocation() -> Result<()> {
        let allocator = AlignedAllocator::new();
        let buf = allocator.allocate(0)?;
        assert!(buf.is_empty());
        assert_eq!(&buf[..], &[] as &[u8]);
        Ok(())
    }

    #[test]
    fn test_custom_alignment() -> Result<()> {
        let allocator = AlignedAllocator::with_alignment(256)?;
        let buf = allocator.allocate(10)?;
        assert_eq!(buf.as_ptr() as usize % 256, 0);
        assert_eq!(buf.alignment(), 256);

        assert!(matches!(
            AlignedAllocator::with_alignment(48),
            Err(Error::InvalidArgument(_))
        ));
        assert!(AlignedAllocator::with_alignment(4).is_err());
        Ok(())
    }
}
