//! ## fixpool-core::alloc::align
//! **Chunk size alignment rule**
//!
//! A free chunk stores the address of the next free chunk in its first
//! pointer-sized bytes, so no chunk may be smaller than a pointer.

use crate::error::{PoolError, Result};

/// Size of the in-band free-list link.
pub const LINK_SIZE: usize = std::mem::size_of::<*mut u8>();

/// Alignment every backing block is allocated with.
pub const BLOCK_ALIGN: usize = std::mem::align_of::<*mut u8>();

/// Applies the alignment rule to a requested chunk size.
///
/// With `align_chunks` the size is rounded up to the next multiple of the
/// pointer size. Without it, sizes smaller than a pointer are rejected and
/// everything else is used as given.
pub fn align_chunk_size(requested: usize, align_chunks: bool) -> Result<usize> {
    if requested == 0 {
        return Err(PoolError::invalid("chunk size must be greater than zero"));
    }

    if align_chunks {
        requested
            .checked_next_multiple_of(LINK_SIZE)
            .ok_or_else(|| PoolError::invalid(format!("chunk size {requested} overflows")))
    } else if requested < LINK_SIZE {
        Err(PoolError::invalid(format!(
            "chunk size {requested} is smaller than a pointer ({LINK_SIZE} bytes)"
        )))
    } else {
        Ok(requested)
    }
}

/// Byte length of a block holding `chunks` chunks of `chunk_size` bytes.
///
/// Geometry the address space cannot describe is an `InvalidArgument`:
/// overflow here, and sizes above `isize::MAX` when the block layout is
/// built. `AllocationFailure` is reserved for a backing allocator that
/// declines a valid request.
pub fn block_bytes(chunks: usize, chunk_size: usize) -> Result<usize> {
    chunks.checked_mul(chunk_size).ok_or_else(|| {
        PoolError::invalid(format!(
            "{chunks} chunks of {chunk_size} bytes overflow the address space"
        ))
    })
}
