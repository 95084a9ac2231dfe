//! Logging and metrics settings.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::validation;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct TelemetryConfig {
    /// `tracing_subscriber::EnvFilter` directive, e.g. `info` or
    /// `fixpool_core=trace`. `RUST_LOG` takes precedence when set.
    #[serde(default = "default_log_level")]
    #[validate(custom(function = validation::validate_filter_directive))]
    pub log_level: String,

    /// Prefix for exported Prometheus metric names.
    #[serde(default = "default_metrics_prefix")]
    #[validate(custom(function = validation::validate_metric_prefix))]
    pub metrics_prefix: String,
}

fn default_log_level() -> String {
    "info".into()
}

fn default_metrics_prefix() -> String {
    "fixpool".into()
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            metrics_prefix: default_metrics_prefix(),
        }
    }
}
