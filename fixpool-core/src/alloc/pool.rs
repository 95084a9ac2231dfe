//! ## fixpool-core::alloc::pool
//! **Fixed-size chunk pool with an intrusive free list**
//!
//! Chunks are carved out of backing blocks. A free chunk stores the
//! address of the next free chunk in its first pointer-sized bytes, so the
//! free list costs no memory beyond the chunks themselves:
//!
//! ```text
//!   +-----------+  +-----------+  +-----------+  +-----------+
//!   | * |       |  | * |       |  | * |       |  | X |       |
//!   +-----------+  +-----------+  +-----------+  +-----------+
//!   ^ |            ^ |            ^ |            ^
//!   | '------------' '------------' '------------'
//!   '-- head
//! ```
//!
//! `alloc` pops the head and `free` pushes onto it, both in O(1). The list
//! is only walked when a block is threaded or relocated.

use std::fmt;
use std::ptr::NonNull;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::alloc::align::{self, LINK_SIZE};
use crate::alloc::backing::{BackingAllocator, Block};
use crate::alloc::instrument::{MemoryChecker, NoopChecker, PoolId};
use crate::alloc::stats::{PoolCounters, PoolStats};
use crate::builder::PoolBuilder;
use crate::error::{PoolError, Result};
use crate::GrowthStrategy;

/// Reads the free-list link stored at the start of a free chunk.
///
/// # Safety
/// `chunk` must point to at least `LINK_SIZE` readable bytes.
#[inline]
pub(crate) unsafe fn read_link(chunk: NonNull<u8>) -> Option<NonNull<u8>> {
    // Safety: upheld by caller. Unaligned because chunk sizes need not be
    // pointer multiples when rounding is disabled.
    unsafe { chunk.as_ptr().cast::<Option<NonNull<u8>>>().read_unaligned() }
}

/// Stores a free-list link at the start of a chunk.
///
/// # Safety
/// `chunk` must point to at least `LINK_SIZE` writable bytes.
#[inline]
pub(crate) unsafe fn write_link(chunk: NonNull<u8>, next: Option<NonNull<u8>>) {
    // Safety: upheld by caller.
    unsafe {
        chunk
            .as_ptr()
            .cast::<Option<NonNull<u8>>>()
            .write_unaligned(next)
    }
}

/// A pool of same-sized chunks.
///
/// `ChunkPool` is not thread-safe by itself; wrap it in a
/// [`SharedPool`](crate::SharedPool) to share it between threads.
pub struct ChunkPool {
    pub(crate) id: PoolId,
    pub(crate) head: Option<NonNull<u8>>,
    pub(crate) chunk_size: usize,
    pub(crate) capacity: usize,
    pub(crate) free_chunks: usize,
    pub(crate) blocks: Vec<Block>,
    pub(crate) growth: GrowthStrategy,
    pub(crate) backing: Arc<dyn BackingAllocator>,
    pub(crate) checker: Arc<dyn MemoryChecker>,
    pub(crate) counters: PoolCounters,
}

// Safety: the pool exclusively owns its blocks and the raw pointers only
// point into them; allocator and checker are Send + Sync.
unsafe impl Send for ChunkPool {}

impl ChunkPool {
    /// Creates a pool of `capacity` chunks of at least `chunk_size` bytes
    /// using the default backing allocator and settings.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for a zero capacity or chunk size, `AllocationFailure`
    /// if the backing block cannot be obtained.
    pub fn new(capacity: usize, chunk_size: usize) -> Result<Self> {
        PoolBuilder::new(capacity, chunk_size).build()
    }

    /// Returns a builder for a pool of `capacity` chunks of `chunk_size` bytes.
    pub fn builder(capacity: usize, chunk_size: usize) -> PoolBuilder {
        PoolBuilder::new(capacity, chunk_size)
    }

    pub(crate) fn with_parts(
        capacity: usize,
        chunk_size: usize,
        align_chunks: bool,
        growth: GrowthStrategy,
        backing: Arc<dyn BackingAllocator>,
        checker: Option<Arc<dyn MemoryChecker>>,
    ) -> Result<Self> {
        if capacity == 0 {
            return Err(PoolError::invalid("capacity must be greater than zero"));
        }
        let chunk_size = align::align_chunk_size(chunk_size, align_chunks)?;
        let bytes = align::block_bytes(capacity, chunk_size)?;
        let block = Block::allocate(&backing, bytes)?;

        let checker = checker.unwrap_or_else(|| Arc::new(NoopChecker));
        let id = PoolId::next();
        checker.register_pool(id);
        checker.mark_no_access(block.base(), block.len());

        let head = thread_block(checker.as_ref(), &block, chunk_size, capacity, None);

        debug!(
            pool = %id,
            capacity,
            chunk_size,
            bytes,
            ?growth,
            "chunk pool created"
        );

        Ok(Self {
            id,
            head: Some(head),
            chunk_size,
            capacity,
            free_chunks: capacity,
            blocks: vec![block],
            growth,
            backing,
            checker,
            counters: PoolCounters::default(),
        })
    }

    /// Takes a chunk from the pool.
    ///
    /// Returns `None` when every chunk is in use. The returned memory is
    /// `chunk_size()` bytes long, aligned to a pointer when chunk rounding
    /// is enabled, and not initialised.
    #[inline]
    pub fn alloc(&mut self) -> Option<NonNull<u8>> {
        let Some(chunk) = self.head else {
            self.counters.record_exhausted();
            trace!(pool = %self.id, capacity = self.capacity, "pool exhausted");
            return None;
        };

        self.checker.mark_defined(chunk, LINK_SIZE);
        // Safety: `chunk` is a free chunk of this pool, at least LINK_SIZE bytes.
        self.head = unsafe { read_link(chunk) };
        self.checker.mark_no_access(chunk, LINK_SIZE);
        self.checker.report_alloc(self.id, chunk, self.chunk_size);

        self.free_chunks -= 1;
        self.counters.record_allocation(self.in_use());
        Some(chunk)
    }

    /// Returns a chunk to the pool. `None` is ignored.
    ///
    /// Chunks may be returned in any order.
    ///
    /// # Safety
    ///
    /// - `ptr` must have been returned by [`alloc`](Self::alloc) on this pool.
    /// - `ptr` must not have been freed already.
    /// - `ptr` must not predate a [`resize`](Self::resize) of this pool.
    ///
    /// None of this is checked in release builds.
    #[inline]
    pub unsafe fn free(&mut self, ptr: Option<NonNull<u8>>) {
        let Some(chunk) = ptr else {
            return;
        };
        debug_assert!(
            self.owns(chunk),
            "Pointer {chunk:p} is not a chunk of {}",
            self.id
        );
        debug_assert!(self.free_chunks < self.capacity, "Free on a pool with no live chunks");

        self.checker.report_free(self.id, chunk);
        self.checker.mark_defined(chunk, LINK_SIZE);
        // Safety: caller guarantees `chunk` is a live chunk of this pool.
        unsafe { write_link(chunk, self.head) };
        self.checker.mark_no_access(chunk, LINK_SIZE);

        self.head = Some(chunk);
        self.free_chunks += 1;
        self.counters.record_free();
    }

    /// Whether `ptr` points at the start of a chunk inside one of this
    /// pool's blocks. O(number of blocks).
    pub fn owns(&self, ptr: NonNull<u8>) -> bool {
        let addr = ptr.as_ptr() as usize;
        self.blocks.iter().any(|block| {
            block.contains(addr)
                && (addr - block.base().as_ptr() as usize) % self.chunk_size == 0
        })
    }

    /// Chunk size in bytes, after alignment.
    #[inline]
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Total number of chunks, free or not.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of chunks `alloc` can still hand out.
    #[inline]
    pub fn free_chunks(&self) -> usize {
        self.free_chunks
    }

    /// Number of chunks currently handed out.
    #[inline]
    pub fn in_use(&self) -> usize {
        self.capacity - self.free_chunks
    }

    pub fn is_exhausted(&self) -> bool {
        self.head.is_none()
    }

    pub fn growth_strategy(&self) -> GrowthStrategy {
        self.growth
    }

    pub fn id(&self) -> PoolId {
        self.id
    }

    /// Number of backing blocks owned by the pool.
    pub fn blocks(&self) -> usize {
        self.blocks.len()
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats::new(
            &self.counters,
            self.chunk_size,
            self.capacity,
            self.in_use(),
            self.blocks.len(),
        )
    }
}

/// Threads `chunks` chunks of `block` into a list ending in `tail` and
/// returns the first chunk. Chunk `i` links to chunk `i + 1`.
pub(crate) fn thread_block(
    checker: &dyn MemoryChecker,
    block: &Block,
    chunk_size: usize,
    chunks: usize,
    tail: Option<NonNull<u8>>,
) -> NonNull<u8> {
    thread_range(checker, block, chunk_size, 0, chunks, tail)
}

/// Threads chunks `first..end` of `block` into a list ending in `tail`
/// and returns chunk `first`.
pub(crate) fn thread_range(
    checker: &dyn MemoryChecker,
    block: &Block,
    chunk_size: usize,
    first: usize,
    end: usize,
    tail: Option<NonNull<u8>>,
) -> NonNull<u8> {
    debug_assert!(first < end && end * chunk_size <= block.len());
    let base = block.base();

    let mut next = tail;
    for i in (first..end).rev() {
        // Safety: i < end and end * chunk_size <= block.len().
        let chunk = unsafe { base.add(i * chunk_size) };
        checker.mark_defined(chunk, LINK_SIZE);
        // Safety: chunk lies inside the block and spans chunk_size >= LINK_SIZE bytes.
        unsafe { write_link(chunk, next) };
        checker.mark_no_access(chunk, LINK_SIZE);
        next = Some(chunk);
    }

    // Safety: the loop ran at least once.
    unsafe { next.unwrap_unchecked() }
}

impl Drop for ChunkPool {
    fn drop(&mut self) {
        self.checker.unregister_pool(self.id);
        debug!(
            pool = %self.id,
            blocks = self.blocks.len(),
            in_use = self.in_use(),
            "chunk pool destroyed"
        );
        // Blocks release their memory as the field drops.
    }
}

impl fmt::Debug for ChunkPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChunkPool")
            .field("id", &self.id)
            .field("chunk_size", &self.chunk_size)
            .field("capacity", &self.capacity)
            .field("free_chunks", &self.free_chunks)
            .field("blocks", &self.blocks.len())
            .field("growth", &self.growth)
            .finish()
    }
}
