//! ## fixpool-core::alloc::instrument
//! **Memory-checker hooks**
//!
//! Chunks live inside one large backing block, so an external memory
//! checker sees a single allocation and cannot tell which chunks are live.
//! Pools report their logical allocations through a [`MemoryChecker`] and
//! mark the bytes they touch as accessible or not around every free-list
//! access. All hooks default to no-ops.

use std::fmt;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::trace;

/// Identifies one pool towards a memory checker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
pub struct PoolId(u64);

static NEXT_POOL_ID: AtomicU64 = AtomicU64::new(1);

impl PoolId {
    pub(crate) fn next() -> Self {
        PoolId(NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for PoolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pool#{}", self.0)
    }
}

/// Receiver of pool memory events.
///
/// Implementations must be thread-safe; shared pools call them while
/// holding the pool lock.
pub trait MemoryChecker: Send + Sync {
    fn register_pool(&self, _pool: PoolId) {}

    fn unregister_pool(&self, _pool: PoolId) {}

    fn mark_defined(&self, _addr: NonNull<u8>, _len: usize) {}

    fn mark_no_access(&self, _addr: NonNull<u8>, _len: usize) {}

    fn report_alloc(&self, _pool: PoolId, _addr: NonNull<u8>, _len: usize) {}

    fn report_free(&self, _pool: PoolId, _addr: NonNull<u8>) {}

    /// A live chunk was copied from `from` to `to` by a resize. It stays
    /// allocated; this is not a free followed by an allocation.
    fn move_chunk(&self, _pool: PoolId, _from: NonNull<u8>, _to: NonNull<u8>, _len: usize) {}

    /// Whether the checker wants a `move_chunk` call per live chunk on
    /// resize. When `false` the pool skips collecting them.
    fn tracks_chunks(&self) -> bool {
        true
    }
}

/// Checker that ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopChecker;

impl MemoryChecker for NoopChecker {
    fn tracks_chunks(&self) -> bool {
        false
    }
}

/// Emits every checker event as a `trace` level event on the
/// `fixpool_core::memcheck` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingChecker;

impl MemoryChecker for TracingChecker {
    fn register_pool(&self, pool: PoolId) {
        trace!(target: "fixpool_core::memcheck", %pool, "register pool");
    }

    fn unregister_pool(&self, pool: PoolId) {
        trace!(target: "fixpool_core::memcheck", %pool, "unregister pool");
    }

    fn mark_defined(&self, addr: NonNull<u8>, len: usize) {
        trace!(target: "fixpool_core::memcheck", ?addr, len, "mark defined");
    }

    fn mark_no_access(&self, addr: NonNull<u8>, len: usize) {
        trace!(target: "fixpool_core::memcheck", ?addr, len, "mark no access");
    }

    fn report_alloc(&self, pool: PoolId, addr: NonNull<u8>, len: usize) {
        trace!(target: "fixpool_core::memcheck", %pool, ?addr, len, "chunk allocated");
    }

    fn report_free(&self, pool: PoolId, addr: NonNull<u8>) {
        trace!(target: "fixpool_core::memcheck", %pool, ?addr, "chunk freed");
    }

    fn move_chunk(&self, pool: PoolId, from: NonNull<u8>, to: NonNull<u8>, len: usize) {
        trace!(target: "fixpool_core::memcheck", %pool, ?from, ?to, len, "chunk moved");
    }
}
