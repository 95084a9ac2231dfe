//! # fixpool Configuration
//!
//! Layered configuration for chunk pools and their telemetry.
//!
//! Values come from built-in defaults, YAML files and `FIXPOOL_*`
//! environment variables, in that order of precedence, and are validated
//! before being handed out.

#![warn(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

mod error;
mod pool;
mod telemetry;
mod validation;

pub use error::ConfigError;
pub use pool::{GrowthStrategy, Instrumentation, PoolConfig, MAX_POOL_CAPACITY};
pub use telemetry::TelemetryConfig;

const ENV_PREFIX: &str = "FIXPOOL_";
const BASE_FILE: &str = "config/fixpool.yaml";

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate, Default)]
pub struct FixpoolConfig {
    /// Geometry and behaviour of the pool.
    #[serde(default)]
    #[validate(nested)]
    pub pool: PoolConfig,

    /// Logging and metrics.
    #[serde(default)]
    #[validate(nested)]
    pub telemetry: TelemetryConfig,
}

impl FixpoolConfig {
    /// Load configuration from default files and environment.
    ///
    /// Hierarchy:
    /// 1. Default values
    /// 2. `config/fixpool.yaml`, skipped when missing
    /// 3. `config/<FIXPOOL_ENV>.yaml`, skipped when `FIXPOOL_ENV` is unset
    ///    or the file is missing
    /// 4. `FIXPOOL_*` environment variables, `__` separating nested keys
    ///    (`FIXPOOL_POOL__CAPACITY=4096`)
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(FixpoolConfig::default()));

        if Path::new(BASE_FILE).exists() {
            figment = figment.merge(Yaml::file(BASE_FILE));
        }

        if let Ok(env) = std::env::var("FIXPOOL_ENV") {
            let env_file = format!("config/{}.yaml", env);
            if Path::new(&env_file).exists() {
                figment = figment.merge(Yaml::file(env_file));
            }
        }

        Self::finish(figment)
    }

    /// Load configuration from a specific file plus the environment.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        Self::finish(
            Figment::from(Serialized::defaults(FixpoolConfig::default())).merge(Yaml::file(path)),
        )
    }

    fn finish(figment: Figment) -> Result<Self, ConfigError> {
        figment
            .merge(Env::prefixed(ENV_PREFIX).ignore(&["env"]).split("__"))
            .extract()
            .map_err(ConfigError::from)
            .and_then(|config: Self| {
                config.validate()?;
                Ok(config)
            })
    }
}
