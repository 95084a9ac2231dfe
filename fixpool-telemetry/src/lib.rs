//! # fixpool Telemetry
//!
//! Log subscriber setup and Prometheus metrics for chunk pools.

pub mod logging;
pub mod metrics;

pub use logging::PoolLogger;
pub use metrics::PoolMetrics;
