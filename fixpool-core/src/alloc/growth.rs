//! ## fixpool-core::alloc::growth
//! **Capacity growth**
//!
//! A pool grows in one of two ways, fixed when it is built:
//!
//! - [`GrowthStrategy::Expand`]: a new, independent block is threaded and
//!   spliced in front of the free list. Existing chunks never move, so
//!   pointers handed out earlier stay valid.
//! - [`GrowthStrategy::Resize`]: the single block is replaced by a larger
//!   one and its contents copied over. The pool stays contiguous, but every
//!   pointer handed out earlier must be rebased with the returned
//!   [`Relocation`].
//!
//! A failed growth leaves the pool exactly as it was.

use std::ptr::NonNull;

use tracing::{debug, warn};

use crate::alloc::align;
use crate::alloc::backing::Block;
use crate::alloc::pool::{read_link, thread_block, thread_range, write_link, ChunkPool};
use crate::error::{PoolError, Result};
use crate::GrowthStrategy;

/// Address mapping produced by [`ChunkPool::resize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Relocation {
    old_base: usize,
    old_len: usize,
    new_base: NonNull<u8>,
}

// Safety: a Relocation only carries addresses and never dereferences them.
unsafe impl Send for Relocation {}
// Safety: see above.
unsafe impl Sync for Relocation {}

impl Relocation {
    fn identity(base: NonNull<u8>, len: usize) -> Self {
        Self {
            old_base: base.as_ptr() as usize,
            old_len: len,
            new_base: base,
        }
    }

    /// Whether the chunks moved to a different block.
    pub fn moved(&self) -> bool {
        self.old_base != self.new_base.as_ptr() as usize
    }

    /// Maps a pointer into the pre-resize block to the same offset in the
    /// new block. Returns `None` for pointers outside the old block.
    pub fn translate(&self, ptr: NonNull<u8>) -> Option<NonNull<u8>> {
        let offset = (ptr.as_ptr() as usize).checked_sub(self.old_base)?;
        if offset >= self.old_len {
            return None;
        }
        // Safety: offset < old_len <= new block length.
        Some(unsafe { self.new_base.add(offset) })
    }
}

impl ChunkPool {
    /// Adds `extra_capacity` chunks in a new block without moving existing
    /// chunks.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if `extra_capacity` is zero or the pool grows by
    /// resizing; `AllocationFailure` if the new block cannot be obtained.
    pub fn expand(&mut self, extra_capacity: usize) -> Result<()> {
        if extra_capacity == 0 {
            return Err(PoolError::invalid("expansion size must be greater than zero"));
        }
        if self.growth != GrowthStrategy::Expand {
            return Err(PoolError::invalid(format!(
                "{} grows by resizing; expand is unavailable",
                self.id
            )));
        }

        let new_capacity = self
            .capacity
            .checked_add(extra_capacity)
            .ok_or_else(|| PoolError::invalid("pool capacity overflows"))?;
        let bytes = align::block_bytes(extra_capacity, self.chunk_size)?;
        let block = Block::allocate(&self.backing, bytes).inspect_err(|err| {
            warn!(pool = %self.id, extra_capacity, %err, "pool expansion failed");
        })?;

        self.checker.mark_no_access(block.base(), block.len());
        let head = thread_block(
            self.checker.as_ref(),
            &block,
            self.chunk_size,
            extra_capacity,
            self.head,
        );

        self.blocks.push(block);
        self.head = Some(head);
        self.capacity = new_capacity;
        self.free_chunks += extra_capacity;
        self.counters.record_growth();

        debug!(
            pool = %self.id,
            extra_capacity,
            capacity = self.capacity,
            blocks = self.blocks.len(),
            "pool expanded"
        );
        Ok(())
    }

    /// Grows the pool to `new_capacity` chunks by moving it into one larger
    /// block.
    ///
    /// Pointers obtained from [`alloc`](Self::alloc) before the call are
    /// invalid afterwards; use [`Relocation::translate`] to find where their
    /// contents now live.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if `new_capacity` is below the current capacity or
    /// the pool grows by expanding; `AllocationFailure` if the new block
    /// cannot be obtained.
    pub fn resize(&mut self, new_capacity: usize) -> Result<Relocation> {
        if self.growth != GrowthStrategy::Resize {
            return Err(PoolError::invalid(format!(
                "{} grows by expanding; resize is unavailable",
                self.id
            )));
        }
        if new_capacity < self.capacity {
            return Err(PoolError::invalid(format!(
                "cannot shrink pool from {} to {new_capacity} chunks",
                self.capacity
            )));
        }

        let old = &self.blocks[0];
        let old_base = old.base();
        let old_len = old.len();
        if new_capacity == self.capacity {
            return Ok(Relocation::identity(old_base, old_len));
        }

        let chunk_size = self.chunk_size;
        let old_capacity = self.capacity;
        let bytes = align::block_bytes(new_capacity, chunk_size)?;
        let block = Block::allocate(&self.backing, bytes).inspect_err(|err| {
            warn!(pool = %self.id, new_capacity, %err, "pool resize failed");
        })?;
        let new_base = block.base();
        let checker = self.checker.as_ref();

        checker.mark_defined(old_base, old_len);
        checker.mark_defined(new_base, old_len);
        // Safety: both blocks are at least old_len bytes and distinct.
        unsafe { std::ptr::copy_nonoverlapping(old_base.as_ptr(), new_base.as_ptr(), old_len) };

        let suffix = thread_range(checker, &block, chunk_size, old_capacity, new_capacity, None);

        // Rewrite the copied free list to point into the new block and hang
        // the new suffix off its tail.
        let rebase = |ptr: NonNull<u8>| {
            // Safety: every link in the old list points inside the old block.
            unsafe { new_base.add(ptr.as_ptr() as usize - old_base.as_ptr() as usize) }
        };
        // Free-chunk mask, only built when the checker wants live chunks
        // reported as moved.
        let mut free = checker.tracks_chunks().then(|| vec![false; old_capacity]);
        let head = match self.head {
            None => suffix,
            Some(old_head) => {
                let mut cur = rebase(old_head);
                loop {
                    if let Some(free) = free.as_mut() {
                        free[(cur.as_ptr() as usize - new_base.as_ptr() as usize) / chunk_size] =
                            true;
                    }
                    // Safety: `cur` is a free chunk inside the copied prefix.
                    match unsafe { read_link(cur) } {
                        Some(next) => {
                            let next = rebase(next);
                            // Safety: as above.
                            unsafe { write_link(cur, Some(next)) };
                            cur = next;
                        }
                        None => {
                            // Safety: as above.
                            unsafe { write_link(cur, Some(suffix)) };
                            break;
                        }
                    }
                }
                rebase(old_head)
            }
        };

        checker.mark_no_access(new_base, block.len());
        if let Some(free) = free {
            for (index, _) in free.iter().enumerate().filter(|(_, is_free)| !**is_free) {
                let offset = index * chunk_size;
                // Safety: offset < old_len, inside both blocks.
                let (from, to) = unsafe { (old_base.add(offset), new_base.add(offset)) };
                checker.move_chunk(self.id, from, to, chunk_size);
            }
        }

        let relocation = Relocation {
            old_base: old_base.as_ptr() as usize,
            old_len,
            new_base,
        };

        // Dropping the old block releases it.
        self.blocks[0] = block;
        self.head = Some(head);
        self.capacity = new_capacity;
        self.free_chunks += new_capacity - old_capacity;
        self.counters.record_growth();

        debug!(
            pool = %self.id,
            old_capacity,
            capacity = new_capacity,
            moved = relocation.moved(),
            "pool resized"
        );
        Ok(relocation)
    }
}
