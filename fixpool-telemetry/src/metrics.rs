//! ## fixpool-telemetry::metrics
//! **Prometheus metrics for chunk pools**
//!
//! [`PoolMetrics`] is a [`MemoryChecker`]: hand it to a pool builder and
//! every allocation, free and pool lifetime event is counted.

use std::ptr::NonNull;

use fixpool_config::TelemetryConfig;
use fixpool_core::{MemoryChecker, PoolId, PoolStats};
use prometheus::{
    Histogram, HistogramOpts, IntCounter, IntGauge, IntGaugeVec, Opts, Registry,
};

#[derive(Debug, Clone)]
pub struct PoolMetrics {
    pub registry: Registry,
    pub allocations: IntCounter,
    pub frees: IntCounter,
    pub pools_registered: IntGauge,
    pub chunk_size: Histogram,
    pub capacity: IntGaugeVec,
    pub in_use: IntGaugeVec,
}

impl PoolMetrics {
    /// Creates and registers every metric under `prefix`.
    pub fn new(prefix: &str) -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let allocations = IntCounter::new(
            format!("{prefix}_allocations_total"),
            "Chunks handed out by all pools",
        )?;
        let frees = IntCounter::new(
            format!("{prefix}_frees_total"),
            "Chunks returned to all pools",
        )?;
        let pools_registered = IntGauge::new(
            format!("{prefix}_pools_registered"),
            "Pools currently alive",
        )?;
        let chunk_size = Histogram::with_opts(
            HistogramOpts::new(
                format!("{prefix}_chunk_size_bytes"),
                "Size of allocated chunks",
            )
            .buckets(vec![8.0, 16.0, 32.0, 64.0, 128.0, 256.0, 1024.0, 4096.0]),
        )?;
        let capacity = IntGaugeVec::new(
            Opts::new(format!("{prefix}_capacity_chunks"), "Pool capacity"),
            &["pool"],
        )?;
        let in_use = IntGaugeVec::new(
            Opts::new(format!("{prefix}_in_use_chunks"), "Chunks currently allocated"),
            &["pool"],
        )?;

        registry.register(Box::new(allocations.clone()))?;
        registry.register(Box::new(frees.clone()))?;
        registry.register(Box::new(pools_registered.clone()))?;
        registry.register(Box::new(chunk_size.clone()))?;
        registry.register(Box::new(capacity.clone()))?;
        registry.register(Box::new(in_use.clone()))?;

        Ok(Self {
            registry,
            allocations,
            frees,
            pools_registered,
            chunk_size,
            capacity,
            in_use,
        })
    }

    pub fn from_config(config: &TelemetryConfig) -> Result<Self, prometheus::Error> {
        Self::new(&config.metrics_prefix)
    }

    /// Publishes a stats snapshot as per-pool gauges.
    pub fn observe(&self, pool: PoolId, stats: &PoolStats) {
        let label = pool.to_string();
        self.capacity
            .with_label_values(&[label.as_str()])
            .set(stats.capacity as i64);
        self.in_use
            .with_label_values(&[label.as_str()])
            .set(stats.in_use as i64);
    }

    pub fn gather_metrics(&self) -> Result<String, prometheus::Error> {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let mut buffer = Vec::<u8>::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

impl MemoryChecker for PoolMetrics {
    fn register_pool(&self, _pool: PoolId) {
        self.pools_registered.inc();
    }

    fn unregister_pool(&self, pool: PoolId) {
        self.pools_registered.dec();
        let label = pool.to_string();
        // Absent when the pool was never observed.
        let _ = self.capacity.remove_label_values(&[label.as_str()]);
        let _ = self.in_use.remove_label_values(&[label.as_str()]);
    }

    fn report_alloc(&self, _pool: PoolId, _addr: NonNull<u8>, len: usize) {
        self.allocations.inc();
        self.chunk_size.observe(len as f64);
    }

    fn report_free(&self, _pool: PoolId, _addr: NonNull<u8>) {
        self.frees.inc();
    }

    // Chunks moved by a resize are neither allocated nor freed.
    fn tracks_chunks(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fixpool_core::{ChunkPool, GrowthStrategy};
    use std::sync::Arc;

    fn pool_with(metrics: &Arc<PoolMetrics>, capacity: usize) -> ChunkPool {
        ChunkPool::builder(capacity, 32)
            .checker(metrics.clone())
            .build()
            .unwrap()
    }

    #[test]
    fn test_counts_alloc_and_free() {
        let metrics = Arc::new(PoolMetrics::new("fixpool").unwrap());
        let mut pool = pool_with(&metrics, 4);
        assert_eq!(metrics.pools_registered.get(), 1);

        let a = pool.alloc();
        let b = pool.alloc();
        assert_eq!(metrics.allocations.get(), 2);
        assert_eq!(metrics.chunk_size.get_sample_count(), 2);
        assert_eq!(metrics.chunk_size.get_sample_sum(), 64.0);

        // Safety: `a` and `b` are live chunks of `pool`, each freed once.
        unsafe {
            pool.free(a);
            pool.free(b);
        }
        assert_eq!(metrics.frees.get(), 2);

        drop(pool);
        assert_eq!(metrics.pools_registered.get(), 0);
    }

    #[test]
    fn test_exhaustion_not_counted() {
        let metrics = Arc::new(PoolMetrics::new("fixpool").unwrap());
        let mut pool = pool_with(&metrics, 1);
        assert!(pool.alloc().is_some());
        assert!(pool.alloc().is_none());
        assert_eq!(metrics.allocations.get(), 1);
    }

    #[test]
    fn test_observe_and_unregister() {
        let metrics = Arc::new(PoolMetrics::new("fixpool").unwrap());
        let mut pool = pool_with(&metrics, 8);
        let _ = pool.alloc();
        metrics.observe(pool.id(), &pool.stats());

        let label = pool.id().to_string();
        assert_eq!(
            metrics.in_use.with_label_values(&[label.as_str()]).get(),
            1
        );
        assert_eq!(
            metrics.capacity.with_label_values(&[label.as_str()]).get(),
            8
        );

        drop(pool);
        let text = metrics.gather_metrics().unwrap();
        assert!(!text.contains(&label));
    }

    #[test]
    fn test_gather_uses_prefix() {
        let config = TelemetryConfig {
            metrics_prefix: "edge_pool".into(),
            ..Default::default()
        };
        let metrics = Arc::new(PoolMetrics::from_config(&config).unwrap());
        let mut pool = pool_with(&metrics, 2);
        let _ = pool.alloc();

        let text = metrics.gather_metrics().unwrap();
        assert!(text.contains("edge_pool_allocations_total 1"));
        assert!(text.contains("edge_pool_pools_registered 1"));
        assert!(text.contains("edge_pool_chunk_size_bytes_bucket"));
    }

    #[test]
    fn test_resize_does_not_count_allocations() {
        let metrics = Arc::new(PoolMetrics::new("fixpool").unwrap());
        let mut pool = ChunkPool::builder(2, 32)
            .growth(GrowthStrategy::Resize)
            .checker(metrics.clone())
            .build()
            .unwrap();
        let _ = pool.alloc();
        metrics.observe(pool.id(), &pool.stats());

        pool.resize(4).unwrap();
        pool.resize(8).unwrap();

        assert_eq!(metrics.allocations.get(), 1);
        assert_eq!(pool.stats().total_allocations, 1);
        assert_eq!(metrics.chunk_size.get_sample_count(), 1);
        assert_eq!(metrics.pools_registered.get(), 1);

        let label = pool.id().to_string();
        assert!(metrics.gather_metrics().unwrap().contains(&label));
    }

    #[test]
    fn test_invalid_prefix_rejected() {
        assert!(PoolMetrics::new("not a metric").is_err());
    }
}
