//! # Configuration
//!
//! [`GaugedConfig`] mirrors the reference system's layered config object:
//! a flat set of engine-wide defaults plus a nested [`QueryDefaults`] applied
//! whenever a [`Context`](crate::context::Context) omits a query parameter.
//! Validated eagerly at construction, following [`EngineConfig`](crate::engine::Engine)'s
//! validate-at-open convention rather than deferring to first use.

use crate::error::GaugedError;
use crate::time::Time;

/// The three ways a policy-configurable error can be handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    /// Reject the offending measurement/batch with an error.
    Error,
    /// Silently drop the offending measurement.
    Ignore,
    /// Clamp the offending measurement onto the writer's current position.
    ///
    /// Only meaningful for the append-only policy; configuring it for key
    /// overflow or NaN handling is accepted but behaves like `Ignore`.
    Rewrite,
}

/// Query parameters applied when a [`Context`](crate::context::Context) omits them.
#[derive(Debug, Clone)]
pub struct QueryDefaults {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    pub prefix: Option<Vec<u8>>,
    pub interval: u64,
    pub cache: bool,
    pub percentile: f64,
}

impl Default for QueryDefaults {
    fn default() -> Self {
        Self {
            limit: Some(10),
            offset: None,
            prefix: None,
            interval: Time::DAY,
            cache: true,
            percentile: 50.0,
        }
    }
}

/// Engine-wide configuration, shared by every [`Writer`](crate::writer::Writer)
/// and [`Context`](crate::context::Context) created from the same [`Engine`](crate::engine::Engine).
#[derive(Debug, Clone)]
pub struct GaugedConfig {
    /// Default namespace used when a caller doesn't supply one.
    pub namespace: u32,
    /// Width of one block, in milliseconds.
    pub block_size: u64,
    /// Width of one slot, in milliseconds. Must evenly divide `block_size`.
    pub resolution: u64,
    /// Identifies this writer's position row in the store.
    pub writer_name: String,
    /// When true, block rollover replaces existing blocks instead of appending to them.
    pub overwrite_blocks: bool,
    /// Policy applied when a key exceeds the store's `MAX_KEY`.
    pub key_overflow: Policy,
    /// When set, only keys in this set are accepted by `Writer::add`.
    pub key_whitelist: Option<std::collections::HashSet<Vec<u8>>>,
    /// Interval between automatic background flushes; `Duration::ZERO` disables the ticker.
    pub flush_interval: std::time::Duration,
    /// Policy applied when a measurement's `(block, slot)` regresses.
    pub append_only_violation: Policy,
    /// Policy applied when a gauge value is non-finite.
    pub gauge_nan: Policy,
    /// Maximum number of `(namespace, key) -> id` entries cached by the writer's LRU.
    pub key_cache_size: usize,
    /// Maximum number of steps a `*_series` call may materialize.
    pub max_interval_steps: u64,
    /// Minimum `interval` (ms) eligible for the aggregate cache.
    pub min_cache_interval: u64,
    /// Maximum number of blocks `Context::value` will scan backward.
    pub max_look_behind: u64,
    /// Defaults applied to unset query parameters.
    pub defaults: QueryDefaults,
}

impl Default for GaugedConfig {
    fn default() -> Self {
        Self {
            namespace: 0,
            block_size: Time::DAY,
            resolution: Time::SECOND,
            writer_name: "default".to_string(),
            overwrite_blocks: false,
            key_overflow: Policy::Error,
            key_whitelist: None,
            flush_interval: std::time::Duration::ZERO,
            append_only_violation: Policy::Error,
            gauge_nan: Policy::Error,
            key_cache_size: 64 * 1024,
            max_interval_steps: 31 * 24,
            min_cache_interval: Time::HOUR,
            max_look_behind: Time::WEEK,
            defaults: QueryDefaults::default(),
        }
    }
}

impl GaugedConfig {
    /// Number of slots per block (`S = block_size / resolution`).
    pub fn slots_per_block(&self) -> u64 {
        self.block_size / self.resolution
    }

    /// Validates the configuration, surfacing `block_size % resolution != 0` eagerly
    /// instead of letting it corrupt the first `(block, slot)` decomposition.
    pub fn validate(&self) -> Result<(), GaugedError> {
        if self.resolution == 0 {
            return Err(GaugedError::Config("resolution must be nonzero".into()));
        }
        if self.block_size % self.resolution != 0 {
            return Err(GaugedError::Config(
                "block_size must be a multiple of resolution".into(),
            ));
        }
        Ok(())
    }
}
