//! ## fixpool-telemetry::logging
//! **`tracing` subscriber setup**
//!
//! Pools log through `tracing`; this module installs a `fmt` subscriber
//! filtered by `RUST_LOG`, or by the configured level when it is unset.

use fixpool_config::TelemetryConfig;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{fmt, EnvFilter};

pub type InitError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Clone)]
pub struct PoolLogger;

impl PoolLogger {
    /// Installs the global subscriber at `info`.
    ///
    /// # Panics
    /// If a global subscriber is already set.
    pub fn init() {
        fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
            )
            .with_thread_names(true)
            .with_span_events(FmtSpan::ENTER)
            .init()
    }

    /// Installs the global subscriber using `config.log_level` as the
    /// fallback filter. Fails if the directive does not parse or a
    /// subscriber is already set.
    pub fn try_init(config: &TelemetryConfig) -> Result<(), InitError> {
        fmt()
            .with_env_filter(filter(&config.log_level)?)
            .with_thread_names(true)
            .with_span_events(FmtSpan::ENTER)
            .try_init()
    }
}

fn filter(fallback: &str) -> Result<EnvFilter, InitError> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => Ok(EnvFilter::try_new(fallback)?),
    }
}
