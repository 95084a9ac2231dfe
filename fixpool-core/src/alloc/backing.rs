//! ## fixpool-core::alloc::backing
//! **Backing allocator interface and owned storage blocks**
//!
//! Pools never call the global allocator directly. Every block of chunk
//! storage is obtained through a [`BackingAllocator`] handed to the pool at
//! construction, which makes the pool usable with arenas, static buffers or
//! any other source of raw memory.

use std::alloc::Layout;
use std::fmt;
use std::ptr::NonNull;
use std::sync::Arc;

use crate::alloc::align::BLOCK_ALIGN;
use crate::error::{PoolError, Result};

/// Source of raw memory for pool blocks.
///
/// Implementations must be thread-safe: a shared pool may call into the
/// allocator from whichever thread holds its lock.
pub trait BackingAllocator: Send + Sync {
    /// Allocates `layout.size()` bytes aligned to `layout.align()`, or
    /// returns `None` when the request cannot be satisfied.
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>>;

    /// Releases a block previously returned by [`allocate`](Self::allocate).
    ///
    /// # Safety
    ///
    /// `ptr` must come from `allocate` on this allocator with the same
    /// `layout`, and must not be released twice.
    unsafe fn release(&self, ptr: NonNull<u8>, layout: Layout);
}

/// Backing allocator forwarding to the process-wide global allocator.
#[cfg(feature = "system-alloc")]
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemAllocator;

#[cfg(feature = "system-alloc")]
impl BackingAllocator for SystemAllocator {
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>> {
        // Safety: layouts handed out by `Block::allocate` are never zero sized.
        NonNull::new(unsafe { std::alloc::alloc(layout) })
    }

    unsafe fn release(&self, ptr: NonNull<u8>, layout: Layout) {
        // Safety: upheld by caller.
        unsafe { std::alloc::dealloc(ptr.as_ptr(), layout) }
    }
}

/// Default backing allocator, if this build has one.
pub(crate) fn default_backing() -> Option<Arc<dyn BackingAllocator>> {
    #[cfg(feature = "system-alloc")]
    {
        Some(Arc::new(SystemAllocator))
    }
    #[cfg(not(feature = "system-alloc"))]
    {
        None
    }
}

/// One contiguous array of chunks owned by a pool.
///
/// The block releases its memory through the allocator that produced it
/// when dropped.
pub(crate) struct Block {
    base: NonNull<u8>,
    layout: Layout,
    allocator: Arc<dyn BackingAllocator>,
}

// Safety: a Block exclusively owns its memory; the allocator is Send + Sync.
unsafe impl Send for Block {}

impl Block {
    /// Obtains `bytes` bytes of pointer-aligned storage from `allocator`.
    ///
    /// Sizes no `Layout` can hold (above `isize::MAX`) are rejected as
    /// `InvalidArgument` without asking the allocator; see
    /// [`block_bytes`](crate::alloc::align::block_bytes).
    pub(crate) fn allocate(allocator: &Arc<dyn BackingAllocator>, bytes: usize) -> Result<Self> {
        let layout = Layout::from_size_align(bytes, BLOCK_ALIGN)
            .map_err(|e| PoolError::invalid(format!("block of {bytes} bytes: {e}")))?;
        if layout.size() == 0 {
            return Err(PoolError::invalid("block must not be empty"));
        }

        let base = allocator
            .allocate(layout)
            .ok_or(PoolError::AllocationFailure { bytes })?;

        Ok(Self {
            base,
            layout,
            allocator: Arc::clone(allocator),
        })
    }

    #[inline]
    pub(crate) fn base(&self) -> NonNull<u8> {
        self.base
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.layout.size()
    }

    /// Whether `addr` lies inside this block.
    #[inline]
    pub(crate) fn contains(&self, addr: usize) -> bool {
        let start = self.base.as_ptr() as usize;
        addr >= start && addr < start + self.len()
    }
}

impl Drop for Block {
    fn drop(&mut self) {
        // Safety: base/layout come from `allocate` on this allocator.
        unsafe { self.allocator.release(self.base, self.layout) }
    }
}

impl fmt::Debug for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Block")
            .field("base", &self.base)
            .field("len", &self.len())
            .finish()
    }
}
