//! ## fixpool-core::alloc::stats
//! **Pool usage statistics**
//!
//! Counters are updated by the pool on every operation; callers receive
//! a [`PoolStats`] snapshot.

use serde::Serialize;

/// Running counters kept inside a pool.
#[derive(Debug, Default, Clone)]
pub(crate) struct PoolCounters {
    total_allocations: u64,
    failed_allocations: u64,
    total_frees: u64,
    growth_events: u64,
    peak_in_use: usize,
}

impl PoolCounters {
    #[inline]
    pub(crate) fn record_allocation(&mut self, in_use: usize) {
        self.total_allocations += 1;
        if in_use > self.peak_in_use {
            self.peak_in_use = in_use;
        }
    }

    #[inline]
    pub(crate) fn record_exhausted(&mut self) {
        self.failed_allocations += 1;
    }

    #[inline]
    pub(crate) fn record_free(&mut self) {
        self.total_frees += 1;
    }

    pub(crate) fn record_growth(&mut self) {
        self.growth_events += 1;
    }
}

/// Snapshot of a pool's geometry and usage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    /// Chunk size after alignment, in bytes.
    pub chunk_size: usize,
    /// Total number of chunks across all blocks.
    pub capacity: usize,
    /// Chunks currently handed out.
    pub in_use: usize,
    /// Highest `in_use` ever observed.
    pub peak_in_use: usize,
    /// Backing blocks currently owned.
    pub blocks: usize,
    /// Successful `alloc` calls.
    pub total_allocations: u64,
    /// `alloc` calls that found the pool exhausted.
    pub failed_allocations: u64,
    /// Chunks returned through `free`.
    pub total_frees: u64,
    /// Successful `expand`/`resize` calls that added capacity.
    pub growth_events: u64,
}

impl PoolStats {
    pub(crate) fn new(
        counters: &PoolCounters,
        chunk_size: usize,
        capacity: usize,
        in_use: usize,
        blocks: usize,
    ) -> Self {
        Self {
            chunk_size,
            capacity,
            in_use,
            peak_in_use: counters.peak_in_use,
            blocks,
            total_allocations: counters.total_allocations,
            failed_allocations: counters.failed_allocations,
            total_frees: counters.total_frees,
            growth_events: counters.growth_events,
        }
    }

    /// Fraction of the capacity currently in use, in `[0.0, 1.0]`.
    pub fn utilization(&self) -> f64 {
        if self.capacity == 0 {
            return 0.0;
        }
        self.in_use as f64 / self.capacity as f64
    }

    /// Bytes of chunk storage owned by the pool.
    pub fn reserved_bytes(&self) -> usize {
        self.capacity * self.chunk_size
    }

    /// Returns a human-readable summary.
    pub fn summary(&self) -> String {
        format!(
            "{}/{} chunks of {} B in use ({:.0}%), peak {}, {} allocs ({} exhausted), \
             {} frees, {} blocks, {} growth events",
            self.in_use,
            self.capacity,
            self.chunk_size,
            self.utilization() * 100.0,
            self.peak_in_use,
            self.total_allocations,
            self.failed_allocations,
            self.total_frees,
            self.blocks,
            self.growth_events,
        )
    }
}
