//! # Error Types
//!
//! A single crate-wide error enum covering every failure mode named in the
//! component contracts: append-only violations, key/value rejection under
//! the `ERROR` policy, malformed query ranges, and use of a disposed
//! structure. Schema/version mismatches at engine bootstrap are a distinct
//! concern layered on top, in [`EngineError`](crate::engine::EngineError).
//!
//! Lower-level errors (binary codec failures, a [`Store`](crate::store::Store)
//! implementation's own I/O errors) compose into [`GaugedError`] via `#[from]`,
//! the same way the reference engine's per-module error enums compose at
//! their façade boundary.

use thiserror::Error;

use crate::encoding::EncodingError;

/// All errors produced by this crate.
#[derive(Debug, Error)]
pub enum GaugedError {
    /// A measurement's `(block, slot)` regressed relative to the writer's
    /// current position under the `ERROR` append-only policy.
    #[error("append-only violation: timestamps must be non-decreasing (writer {writer_name:?})")]
    AppendOnly {
        /// The writer-name whose position was violated.
        writer_name: String,
    },

    /// A key exceeded the store-advertised `MAX_KEY` under the `ERROR` overflow policy.
    #[error("key exceeds maximum length ({max_key} bytes, namespace {namespace})")]
    KeyOverflow {
        /// The offending key bytes.
        key: Vec<u8>,
        /// The namespace the key was written under.
        namespace: u32,
        /// The store's advertised limit.
        max_key: usize,
    },

    /// A non-finite gauge value was rejected under the `ERROR` NaN policy.
    #[error("non-finite gauge value for key {key:?} in namespace {namespace}")]
    NaN {
        /// The offending key bytes.
        key: Vec<u8>,
        /// The namespace the value was written under.
        namespace: u32,
    },

    /// A resolved `[start, end)` query range was invalid (e.g., both ends negative
    /// after "now"-relative resolution, or `start > end` with both ends explicit).
    #[error("invalid date range: {0}")]
    DateRange(String),

    /// `interval <= 0`, or the number of steps in a series exceeds `max_interval_steps`.
    #[error("invalid interval: {0}")]
    IntervalSize(String),

    /// An operation was attempted on a disposed `FloatArray`, `SparseMap`, or `Writer`.
    #[error("use after release")]
    UseAfterRelease,

    /// An aggregate name outside `{sum, min, max, count, mean, stddev, percentile, median}`.
    #[error("unknown aggregate: {0}")]
    UnknownAggregate(String),

    /// `percentile`/`median` called with `p` outside `[0, 100]` or `p` is NaN.
    #[error("invalid percentile: {0}")]
    InvalidPercentile(f64),

    /// `clear_from` was called with a timestamp not aligned to a block boundary.
    #[error("clear_from timestamp {0} is not aligned to a block boundary")]
    UnalignedClear(u64),

    /// A binary codec failure while encoding or decoding a block payload.
    #[error("encoding error: {0}")]
    Encoding(#[from] EncodingError),

    /// An error surfaced by the underlying [`Store`](crate::store::Store) implementation.
    #[error("store error: {0}")]
    Store(String),

    /// `GaugedConfig` failed validation (e.g. `block_size % resolution != 0`).
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A `SparseMap::append` call violated the strictly-increasing slot invariant.
    #[error("sparse map slots must be appended in strictly increasing order: {0}")]
    SparseMapOrder(String),

    /// A `SparseMap::from_bytes` call received a malformed or truncated buffer.
    #[error("malformed sparse map payload: {0}")]
    MalformedSparseMap(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, GaugedError>;
