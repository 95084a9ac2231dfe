//! ## fixpool-core::builder
//! **Pool construction**
//!
//! [`PoolBuilder`] collects the pool geometry and the pluggable parts
//! (backing allocator, memory checker) before allocating the first block.
//! Pools can also be described by a [`PoolConfig`] loaded through
//! `fixpool-config`.

use std::fmt;
use std::sync::Arc;

use crate::alloc::backing::{default_backing, BackingAllocator};
use crate::alloc::instrument::{MemoryChecker, TracingChecker};
use crate::alloc::pool::ChunkPool;
use crate::alloc::shared::{PoolLock, SharedPool};
use crate::error::{PoolError, Result};
use crate::{GrowthStrategy, Instrumentation, PoolConfig};

/// Builder for [`ChunkPool`] and [`SharedPool`].
///
/// ```
/// use fixpool_core::{GrowthStrategy, PoolBuilder};
///
/// let pool = PoolBuilder::new(16, 24)
///     .growth(GrowthStrategy::Resize)
///     .build()
///     .unwrap();
/// assert_eq!(pool.capacity(), 16);
/// ```
#[derive(Clone)]
pub struct PoolBuilder {
    capacity: usize,
    chunk_size: usize,
    align_chunks: bool,
    growth: GrowthStrategy,
    backing: Option<Arc<dyn BackingAllocator>>,
    checker: Option<Arc<dyn MemoryChecker>>,
}

impl PoolBuilder {
    pub fn new(capacity: usize, chunk_size: usize) -> Self {
        Self {
            capacity,
            chunk_size,
            align_chunks: true,
            growth: GrowthStrategy::default(),
            backing: None,
            checker: None,
        }
    }

    /// Starts from a loaded configuration section.
    pub fn from_config(config: &PoolConfig) -> Self {
        let builder = Self::new(config.capacity, config.chunk_size)
            .align_chunks(config.align_chunks)
            .growth(config.growth);
        match config.instrumentation {
            Instrumentation::None => builder,
            Instrumentation::Tracing => builder.checker(Arc::new(TracingChecker)),
        }
    }

    /// Round chunk sizes up to a pointer multiple (default `true`).
    pub fn align_chunks(mut self, align: bool) -> Self {
        self.align_chunks = align;
        self
    }

    pub fn growth(mut self, growth: GrowthStrategy) -> Self {
        self.growth = growth;
        self
    }

    /// Uses `backing` for every block of the pool.
    pub fn backing(mut self, backing: Arc<dyn BackingAllocator>) -> Self {
        self.backing = Some(backing);
        self
    }

    /// Routes memory events to `checker`.
    pub fn checker(mut self, checker: Arc<dyn MemoryChecker>) -> Self {
        self.checker = Some(checker);
        self
    }

    /// Allocates the first block and returns the pool.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for a bad geometry or when no backing allocator is
    /// available, `AllocationFailure` when the first block cannot be
    /// obtained.
    pub fn build(self) -> Result<ChunkPool> {
        let backing = self
            .backing
            .or_else(default_backing)
            .ok_or_else(|| PoolError::invalid("no backing allocator configured"))?;
        ChunkPool::with_parts(
            self.capacity,
            self.chunk_size,
            self.align_chunks,
            self.growth,
            backing,
            self.checker,
        )
    }

    /// Builds the pool and wraps it in lock `L`.
    pub fn build_shared<L: PoolLock<ChunkPool>>(self) -> Result<SharedPool<L>> {
        SharedPool::new(self.build()?)
    }
}

impl fmt::Debug for PoolBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolBuilder")
            .field("capacity", &self.capacity)
            .field("chunk_size", &self.chunk_size)
            .field("align_chunks", &self.align_chunks)
            .field("growth", &self.growth)
            .field("custom_backing", &self.backing.is_some())
            .field("custom_checker", &self.checker.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alloc::backing::tests::CountingAllocator;
    use crate::alloc::instrument::tests::{Event, RecordingChecker};
    use crate::LINK_SIZE;
    use std::sync::atomic::Ordering;

    #[test]
    fn test_defaults() {
        let pool = PoolBuilder::new(8, 1).build().unwrap();
        assert_eq!(pool.capacity(), 8);
        assert_eq!(pool.chunk_size(), LINK_SIZE);
        assert_eq!(pool.growth_strategy(), GrowthStrategy::Expand);
    }

    #[test]
    fn test_unaligned_chunks() {
        let pool = PoolBuilder::new(4, LINK_SIZE + 3)
            .align_chunks(false)
            .build()
            .unwrap();
        assert_eq!(pool.chunk_size(), LINK_SIZE + 3);

        let err = PoolBuilder::new(4, LINK_SIZE - 1)
            .align_chunks(false)
            .build()
            .unwrap_err();
        assert!(matches!(err, PoolError::InvalidArgument(_)));
    }

    #[test]
    fn test_custom_backing_is_used() {
        let backing = Arc::new(CountingAllocator::new());
        let pool = PoolBuilder::new(4, 16)
            .backing(backing.clone())
            .build()
            .unwrap();
        assert_eq!(backing.live_bytes.load(Ordering::SeqCst), 64);
        drop(pool);
        assert_eq!(backing.live_bytes.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_backing_failure() {
        let backing = Arc::new(CountingAllocator::failing_after(0));
        let err = PoolBuilder::new(4, 16).backing(backing).build().unwrap_err();
        assert_eq!(err, PoolError::AllocationFailure { bytes: 64 });
    }

    #[test]
    fn test_checker_sees_registration() {
        let checker = Arc::new(RecordingChecker::default());
        let pool = PoolBuilder::new(2, 8)
            .checker(checker.clone())
            .build()
            .unwrap();
        let id = pool.id();
        assert_eq!(checker.take().first(), Some(&Event::Register(id)));
        drop(pool);
        assert_eq!(checker.take().last(), Some(&Event::Unregister(id)));
    }

    #[test]
    fn test_from_config() {
        let config = PoolConfig {
            capacity: 32,
            chunk_size: 20,
            align_chunks: false,
            growth: GrowthStrategy::Resize,
            instrumentation: Instrumentation::Tracing,
        };
        let pool = PoolBuilder::from_config(&config).build().unwrap();
        assert_eq!(pool.capacity(), 32);
        assert_eq!(pool.chunk_size(), 20);
        assert_eq!(pool.growth_strategy(), GrowthStrategy::Resize);
    }

    #[test]
    fn test_build_shared() {
        let pool = PoolBuilder::new(3, 8)
            .build_shared::<parking_lot::Mutex<ChunkPool>>()
            .unwrap();
        assert_eq!(pool.capacity().unwrap(), 3);

        let pool: SharedPool = PoolBuilder::new(3, 8).build_shared().unwrap();
        assert!(pool.alloc().unwrap().is_some());
    }

    #[test]
    fn test_debug_hides_parts() {
        let builder = PoolBuilder::new(1, 8).backing(Arc::new(CountingAllocator::new()));
        let debug = format!("{builder:?}");
        assert!(debug.contains("custom_backing: true"));
        assert!(debug.contains("custom_checker: false"));
    }
}
