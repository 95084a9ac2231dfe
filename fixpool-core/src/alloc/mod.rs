//! ## fixpool-core::alloc
//! **Fixed-size chunk pools**
//!
//! ### Key Submodules:
//! - `align`: chunk size rounding and block size arithmetic
//! - `backing`: source of raw block memory
//! - `pool`: the free-list engine
//! - `growth`: expand and resize
//! - `shared`: lock-guarded pool for multi-threaded use
//! - `instrument`: memory checker hooks
//! - `stats`: usage counters and snapshots

pub mod align;
pub mod backing;
pub mod growth;
pub mod instrument;
pub mod pool;
pub mod shared;
pub mod stats;

pub use align::{align_chunk_size, LINK_SIZE};
#[cfg(feature = "system-alloc")]
pub use backing::SystemAllocator;
pub use backing::BackingAllocator;
pub use growth::Relocation;
pub use instrument::{MemoryChecker, NoopChecker, PoolId, TracingChecker};
pub use pool::ChunkPool;
pub use shared::{PoolLock, PooledChunk, SharedPool};
pub use stats::PoolStats;
