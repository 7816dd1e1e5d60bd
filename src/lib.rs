//! # Gauged
//!
//! An embeddable, append-only storage engine for numeric gauges sampled on a
//! fixed time grid — CPU percentages, queue depths, temperature readings,
//! anything that's "a number, at a time, under a key."
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                         Engine                           │
//! │   schema bootstrap, version check, Writer/Context factory │
//! └───────────────┬───────────────────────────┬──────────────┘
//!                 │                           │
//!         ┌───────▼────────┐         ┌────────▼────────┐
//!         │     Writer      │         │     Context      │
//!         │  append-only     │         │  value/aggregate │
//!         │  ingestion, LRU   │         │  series, caching  │
//!         │  key translation │         │                  │
//!         └───────┬────────┘         └────────┬────────┘
//!                 │                           │
//!                 └─────────────┬─────────────┘
//!                               │
//!                       ┌───────▼────────┐
//!                       │  Store (trait)  │
//!                       │  blocks, keys,   │
//!                       │  cache, metadata │
//!                       └────────────────┘
//! ```
//!
//! A timestamp decomposes into a `(block, slot)` coordinate on a grid
//! defined by two constants: `resolution` (the width of one slot) and
//! `block_size` (the width of one block, holding `block_size / resolution`
//! slots). Each block is a sparse, columnar array of values, one per key,
//! encoded with [`structures::SparseMap`].
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`engine`] | Schema bootstrap, version check, `Writer`/`Context` factory |
//! | [`writer`] | Append-only ingestion: key translation, flush policy, background ticker |
//! | [`context`] | Point lookups, aggregates, and time series over a key |
//! | [`store`] | The `Store` trait and an in-process `MemoryStore` reference implementation |
//! | [`structures`] | `FloatArray` (dense) and `SparseMap` (sparse columnar) block payloads |
//! | [`measurement`] | Normalizes `Writer::add`'s accepted input shapes into one ingestion path |
//! | [`aggregate`] | The `Aggregate` enum and its associativity classification |
//! | [`encoding`] | The little-endian binary codec blocks are serialized with |
//! | [`config`] | `GaugedConfig`, validated eagerly at construction |
//! | [`time`] | The `(block, slot)` time grid decomposition |
//! | [`lru`] | The writer's key-translation cache |
//! | [`results`] | `TimeSeries`/`Statistics` result wrappers |
//! | [`error`] | The crate-wide `GaugedError` enum |
//!
//! ## Key Features
//!
//! - **Append-only by default** — writes must be non-decreasing in time;
//!   regressions are rejected, ignored, or clamped per [`config::Policy`].
//! - **Associative aggregate fast path** — SUM/MIN/MAX/COUNT over a range
//!   spanning full blocks reuse a per-block cache instead of rescanning
//!   every slot.
//! - **Sparse columnar encoding** — a block only stores the slots a key
//!   actually wrote to.
//! - **Pluggable storage** — the `Store` trait is the only persistence
//!   contract; bring your own backend.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use gauged::config::GaugedConfig;
//! use gauged::engine::Engine;
//! use gauged::measurement::Measurements;
//! use gauged::store::{MemoryStore, Store};
//! use gauged::context::QueryParams;
//! use gauged::aggregate::Aggregate;
//!
//! let store: Arc<dyn Store> = Arc::new(MemoryStore::default());
//! let config = GaugedConfig::default();
//! Engine::sync(&store, &config).unwrap();
//! let engine = Engine::open(store, config).unwrap();
//!
//! let mut writer = engine.writer().unwrap();
//! writer.add(Measurements::single("cpu", 42.0), Some(0), None).unwrap();
//! writer.release().unwrap();
//!
//! let ctx = engine.context(QueryParams {
//!     key: b"cpu".to_vec(),
//!     start: Some(0),
//!     end: Some(0),
//!     aggregate: Some(Aggregate::Max),
//!     ..QueryParams::default()
//! }).unwrap();
//! assert_eq!(ctx.aggregate(None, None, None, None).unwrap(), Some(42.0));
//! ```

pub mod aggregate;
pub mod config;
pub mod context;
pub mod encoding;
pub mod engine;
pub mod error;
pub mod lru;
pub mod measurement;
pub mod results;
pub mod store;
pub mod structures;
pub mod time;
pub mod writer;
