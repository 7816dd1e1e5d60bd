//! Integration tests for the public `gauged` API.
//!
//! These exercise the full stack (`Writer` -> `MemoryStore` -> `Context`)
//! through the published `Engine`/`Writer`/`Context` surface only.
//!
//! Scenario names (S1-S6) and the numbered invariants below match the
//! end-to-end scenarios and testable properties this engine is built to
//! satisfy.

use std::sync::Arc;

use gauged::aggregate::Aggregate;
use gauged::config::{GaugedConfig, Policy};
use gauged::context::QueryParams;
use gauged::engine::Engine;
use gauged::measurement::Measurements;
use gauged::store::{MemoryStore, Store};

fn config() -> GaugedConfig {
    GaugedConfig {
        block_size: 10_000,
        resolution: 1_000,
        ..GaugedConfig::default()
    }
}

fn open(config: GaugedConfig) -> Engine {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::default());
    Engine::sync(&store, &config).unwrap();
    Engine::open(store, config).unwrap()
}

fn params(key: &str, start: i64, end: i64) -> QueryParams {
    QueryParams {
        key: key.as_bytes().to_vec(),
        start: Some(start),
        end: Some(end),
        ..QueryParams::default()
    }
}

fn write_s1(engine: &Engine) {
    let mut writer = engine.writer().unwrap();
    for (t, v) in [(10_000, 50.0), (15_000, 150.0), (20_000, 250.0), (40_000, 350.0), (60_000, 70.0)] {
        writer.add(Measurements::single("foobar", v), Some(t), None).unwrap();
    }
    writer.release().unwrap();
}

#[test]
fn s1_scalar_aggregates_over_the_full_stack() {
    let engine = open(config());
    write_s1(&engine);

    let aggregate = |kind: Aggregate, start: i64, end: i64| {
        engine
            .context(QueryParams { aggregate: Some(kind), ..params("foobar", start, end) })
            .unwrap()
            .aggregate(None, None, None, None)
            .unwrap()
    };

    assert_eq!(aggregate(Aggregate::Sum, 0, 70_000), Some(870.0));
    assert_eq!(aggregate(Aggregate::Min, 0, 70_000), Some(50.0));
    assert_eq!(aggregate(Aggregate::Max, 0, 70_000), Some(350.0));
    assert_eq!(aggregate(Aggregate::Count, 0, 70_000), Some(5.0));
    assert_eq!(aggregate(Aggregate::Mean, 0, 70_000), Some(174.0));
    assert_eq!(aggregate(Aggregate::Median, 0, 70_000), Some(150.0));

    let stddev = aggregate(Aggregate::Stddev, 0, 70_000).unwrap();
    assert!((stddev - 112.71202).abs() < 1e-2);

    assert_eq!(aggregate(Aggregate::Min, 11_000, 70_000), Some(70.0));
    assert_eq!(aggregate(Aggregate::Min, 11_000, 55_000), Some(150.0));
}

#[test]
fn s2_value_series_over_the_full_stack() {
    let engine = open(config());
    write_s1(&engine);

    let ctx = engine
        .context(QueryParams { interval: Some(10_000), ..params("foobar", 0, 80_000) })
        .unwrap();
    let series = ctx.value_series().unwrap();
    let values: Vec<f32> = series.values().collect();
    assert_eq!(values, vec![50.0, 250.0, 250.0, 350.0, 350.0, 70.0]);
}

#[test]
fn s3_aggregate_series_over_the_full_stack() {
    let engine = open(config());
    write_s1(&engine);

    let sum_ctx = engine
        .context(QueryParams {
            aggregate: Some(Aggregate::Sum),
            interval: Some(10_000),
            ..params("foobar", 10_000, 40_000)
        })
        .unwrap();
    let sums: Vec<f32> = sum_ctx.aggregate_series(None, None, None, None, None).unwrap().values().collect();
    assert_eq!(sums, vec![200.0, 150.0, 50.0]);

    let count_ctx = engine
        .context(QueryParams {
            aggregate: Some(Aggregate::Count),
            interval: Some(10_000),
            ..params("foobar", 10_000, 50_000)
        })
        .unwrap();
    let counts: Vec<f32> = count_ctx.aggregate_series(None, None, None, None, None).unwrap().values().collect();
    assert_eq!(counts, vec![2.0, 2.0, 2.0, 0.0]);
}

#[test]
fn s3_aggregate_series_keeps_a_slot_for_steps_with_no_data() {
    // Sum (unlike Count) reports `None` for a step with no matching data at
    // all, rather than `0.0` — the series must keep that step's position
    // instead of shrinking to only the populated steps.
    let engine = open(config());
    write_s1(&engine);

    let sum_ctx = engine
        .context(QueryParams {
            aggregate: Some(Aggregate::Sum),
            interval: Some(10_000),
            ..params("foobar", 20_000, 40_000)
        })
        .unwrap();
    let series = sum_ctx.aggregate_series(None, None, None, None, None).unwrap();
    assert_eq!(series.points(), &[(20_000, Some(250.0)), (30_000, None)]);
    assert_eq!(series.values().collect::<Vec<_>>(), vec![250.0]);
}

#[test]
fn s4_overwrite_mode_cache_staleness_and_invalidation() {
    // Caching only ever covers blocks that are no longer the writer's
    // current block, so block 0 must be pushed into the past before its
    // aggregate is cache-eligible: write "foobar" into block 0, then write
    // an unrelated key into block 1 to advance the namespace's bounds.
    let config = GaugedConfig {
        overwrite_blocks: true,
        min_cache_interval: 0,
        ..config()
    };
    let engine = open(config);

    let mut writer = engine.writer().unwrap();
    writer.add(Measurements::single("foobar", 1.0), Some(0), None).unwrap();
    writer.add(Measurements::single("ping", 0.0), Some(10_000), None).unwrap();
    writer.release().unwrap();

    let series_params = || QueryParams {
        aggregate: Some(Aggregate::Sum),
        interval: Some(10_000),
        cache: Some(true),
        ..params("foobar", 0, 10_000)
    };

    let cached = engine.context(series_params()).unwrap();
    let first: Vec<f32> = cached.aggregate_series(None, None, None, None, None).unwrap().values().collect();
    assert_eq!(first, vec![1.0]);

    // A fresh writer instance starts back at block 0, so overwriting
    // "foobar" here is not an append-only violation.
    let mut writer = engine.writer().unwrap();
    writer.add(Measurements::single("foobar", 5.0), Some(0), None).unwrap();
    writer.release().unwrap();

    let still_cached = engine.context(series_params()).unwrap();
    let stale: Vec<f32> = still_cached.aggregate_series(None, None, None, None, None).unwrap().values().collect();
    assert_eq!(stale, vec![1.0], "cached series should still reflect the pre-overwrite value");

    engine.store().remove_cache(engine.config().namespace).unwrap();

    let fresh_ctx = engine.context(series_params()).unwrap();
    let fresh: Vec<f32> = fresh_ctx.aggregate_series(None, None, None, None, None).unwrap().values().collect();
    assert_eq!(fresh, vec![5.0]);
}

#[test]
fn s5_append_only_error_policy_preserves_prior_value() {
    let config = GaugedConfig { append_only_violation: Policy::Error, ..config() };
    let engine = open(config);

    let mut writer = engine.writer().unwrap();
    writer.add(Measurements::single("foobar", 1.0), Some(20_000), None).unwrap();
    assert!(writer.add(Measurements::single("foobar", 2.0), Some(10_000), None).is_err());
    writer.release().unwrap();

    let ctx = engine.context(params("foobar", 0, 30_000)).unwrap();
    assert_eq!(ctx.value(Some(20_000), None).unwrap(), Some(1.0));
}

#[test]
fn s5_append_only_rewrite_policy_clamps_to_current_position() {
    let config = GaugedConfig { append_only_violation: Policy::Rewrite, ..config() };
    let engine = open(config);

    let mut writer = engine.writer().unwrap();
    writer.add(Measurements::single("foobar", 1.0), Some(20_000), None).unwrap();
    writer.add(Measurements::single("foobar", 2.0), Some(10_000), None).unwrap();
    writer.release().unwrap();

    let ctx = engine.context(params("foobar", 0, 30_000)).unwrap();
    assert_eq!(ctx.value(Some(20_000), None).unwrap(), Some(2.0));
}

#[test]
fn s6_clear_from_requires_block_alignment_and_drops_future_data() {
    let engine = open(config());

    let mut writer = engine.writer().unwrap();
    writer.add(Measurements::single("foobar", 1.0), Some(5_000), None).unwrap();
    writer.add(Measurements::single("foobar", 2.0), Some(30_000), None).unwrap();
    writer.release().unwrap();

    assert!(engine.writer().unwrap().clear_from(25_000).is_err());

    let writer = engine.writer().unwrap();
    writer.clear_from(20_000).unwrap();

    let ctx = engine.context(params("foobar", 0, 40_000)).unwrap();
    assert_eq!(ctx.value(Some(40_000), None).unwrap(), Some(1.0));
}

// ---------------------------------------------------------------------------
// Numbered invariants (property 1 is covered by S1/S3 above)
// ---------------------------------------------------------------------------

#[test]
fn invariant_2_sparse_map_round_trip_preserves_items_and_byte_length() {
    use gauged::structures::{FloatArray, SparseMap};

    let mut map = SparseMap::new();
    map.append(0, FloatArray::from_floats(vec![1.0, 2.0])).unwrap();
    map.append(3, FloatArray::from_floats(vec![4.0])).unwrap();

    let bytes = map.to_bytes().unwrap();
    let restored = SparseMap::from_bytes(&bytes).unwrap();

    assert_eq!(restored.to_bytes().unwrap(), bytes);
    assert_eq!(restored.byte_length().unwrap(), map.byte_length().unwrap());
}

#[test]
fn invariant_3_block_aligned_sum_matches_whole_range_sum_restricted_to_that_block() {
    let engine = open(config());
    write_s1(&engine);

    let block_ctx = engine
        .context(QueryParams { aggregate: Some(Aggregate::Sum), ..params("foobar", 10_000, 20_000) })
        .unwrap();
    assert_eq!(block_ctx.aggregate(None, None, None, None).unwrap(), Some(200.0));
}

#[test]
fn invariant_5_append_only_ignore_policy_preserves_prior_state() {
    let config = GaugedConfig { append_only_violation: Policy::Ignore, ..config() };
    let engine = open(config);

    let mut writer = engine.writer().unwrap();
    writer.add(Measurements::single("foobar", 1.0), Some(20_000), None).unwrap();
    writer.add(Measurements::single("foobar", 99.0), Some(5_000), None).unwrap();
    writer.release().unwrap();

    let ctx = engine.context(params("foobar", 0, 30_000)).unwrap();
    assert_eq!(ctx.value(Some(20_000), None).unwrap(), Some(1.0));
}

#[test]
fn invariant_6_clear_from_preserves_earlier_values_and_clears_later_ones() {
    let engine = open(config());

    let mut writer = engine.writer().unwrap();
    writer.add(Measurements::single("foobar", 1.0), Some(5_000), None).unwrap();
    writer.add(Measurements::single("foobar", 2.0), Some(25_000), None).unwrap();
    writer.release().unwrap();

    let writer = engine.writer().unwrap();
    writer.clear_from(20_000).unwrap();

    let ctx = engine.context(params("foobar", 0, 30_000)).unwrap();
    assert_eq!(ctx.value(Some(5_000), None).unwrap(), Some(1.0));
    assert_eq!(ctx.value(Some(29_999), None).unwrap(), Some(1.0));
}

#[test]
fn invariant_7_use_after_release_fires_on_every_public_operation() {
    let engine = open(config());
    let mut writer = engine.writer().unwrap();
    writer.add(Measurements::single("foobar", 1.0), Some(0), None).unwrap();
    writer.release().unwrap();

    assert!(writer.add(Measurements::single("foobar", 2.0), Some(10_000), None).is_err());
    assert!(writer.clear_from(10_000).is_err());
}
