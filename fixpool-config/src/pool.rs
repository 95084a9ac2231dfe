//! Pool geometry and behaviour.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::validation;

/// Largest capacity accepted from configuration.
pub const MAX_POOL_CAPACITY: usize = u32::MAX as usize;

/// How a pool obtains more chunks once it is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GrowthStrategy {
    /// Add further blocks; existing chunks never move.
    #[default]
    Expand,
    /// Keep a single block and reallocate it; existing chunks move.
    Resize,
}

/// Memory event reporting for a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Instrumentation {
    #[default]
    None,
    /// Emit every memory event as a `trace` level log record.
    Tracing,
}

/// Configuration of a single chunk pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[validate(schema(function = validation::validate_chunk_fits_link))]
pub struct PoolConfig {
    /// Number of chunks allocated up front.
    #[serde(default = "default_capacity")]
    #[validate(range(min = 1, max = MAX_POOL_CAPACITY))]
    pub capacity: usize,

    /// Requested chunk size in bytes.
    #[serde(default = "default_chunk_size")]
    #[validate(range(min = 1))]
    pub chunk_size: usize,

    /// Round the chunk size up to a multiple of the pointer size.
    #[serde(default = "default_true")]
    pub align_chunks: bool,

    #[serde(default)]
    pub growth: GrowthStrategy,

    #[serde(default)]
    pub instrumentation: Instrumentation,
}

fn default_capacity() -> usize {
    1024
}

fn default_chunk_size() -> usize {
    64
}

fn default_true() -> bool {
    true
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            chunk_size: default_chunk_size(),
            align_chunks: default_true(),
            growth: GrowthStrategy::default(),
            instrumentation: Instrumentation::default(),
        }
    }
}
