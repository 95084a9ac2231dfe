//! # fixpool-core
//!
//! Fixed-size chunk pools with an intrusive free list.
//!
//! A pool hands out equally sized chunks of memory in O(1) and takes them
//! back in O(1). Free chunks link to each other through their own first
//! bytes, so bookkeeping costs nothing beyond the chunk storage.
//!
//! ```
//! use fixpool_core::ChunkPool;
//!
//! let mut pool = ChunkPool::new(4, 32).unwrap();
//! let chunk = pool.alloc().unwrap();
//! // Safety: `chunk` came from this pool and is freed once.
//! unsafe { pool.free(Some(chunk)) };
//! assert_eq!(pool.free_chunks(), 4);
//! ```
//!
//! ### Key Submodules:
//! - `alloc`: pool engine, growth, locking and instrumentation
//! - `builder`: pool construction from code or configuration
//! - `error`: the crate error type

pub mod alloc;
pub mod builder;
pub mod error;

pub mod prelude {
    pub use crate::alloc::*;
    pub use crate::builder::PoolBuilder;
    pub use crate::error::*;
    pub use crate::{GrowthStrategy, Instrumentation};
}

pub use alloc::{
    align_chunk_size, BackingAllocator, ChunkPool, MemoryChecker, NoopChecker, PoolId, PoolLock,
    PoolStats, PooledChunk, Relocation, SharedPool, TracingChecker, LINK_SIZE,
};
#[cfg(feature = "system-alloc")]
pub use alloc::SystemAllocator;
pub use builder::PoolBuilder;
pub use error::{PoolError, Result};
pub use fixpool_config::{GrowthStrategy, Instrumentation, PoolConfig};
