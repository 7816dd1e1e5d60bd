//! # Context (query engine)
//!
//! Resolves a query (key, range, interval, aggregate) into an ordered walk
//! over blocks and a composition of block-local aggregates, with an
//! optional aggregate cache: timestamp normalization, block iteration,
//! point lookup with look-behind, the associative-aggregate optimization,
//! and cache read/write.

use std::cell::Cell;
use std::collections::HashMap;
use std::sync::Arc;

use sha1::{Digest, Sha1};
use tracing::{debug, debug_span};

use crate::aggregate::Aggregate;
use crate::config::GaugedConfig;
use crate::error::{GaugedError, Result};
use crate::results::{Statistics, TimeSeries};
use crate::store::Store;
use crate::structures::SparseMap;
use crate::time::now_millis;

/// Inputs used to construct a [`Context`]; unset fields fall back to
/// [`GaugedConfig::defaults`](crate::config::GaugedConfig).
#[derive(Default)]
pub struct QueryParams {
    pub namespace: Option<u32>,
    pub key: Vec<u8>,
    /// A negative value means "now plus this many milliseconds".
    pub start: Option<i64>,
    /// A negative value means "now plus this many milliseconds".
    pub end: Option<i64>,
    pub interval: Option<u64>,
    pub aggregate: Option<Aggregate>,
    pub percentile: Option<f64>,
    pub cache: Option<bool>,
    pub prefix: Option<Vec<u8>>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

/// A resolved query against one namespace/key. Owns no mutable persistent
/// state — every operation borrows blocks from the store for the duration
/// of the call.
pub struct Context {
    store: Arc<dyn Store>,
    config: GaugedConfig,
    namespace: u32,
    key: Vec<u8>,
    start: u64,
    end: u64,
    min_block: u64,
    max_block: u64,
    no_data: bool,
    interval: u64,
    aggregate: Aggregate,
    percentile: f64,
    cache_requested: bool,
    prefix: Option<Vec<u8>>,
    limit: Option<usize>,
    offset: Option<usize>,
    suppress_interval_size_error: Cell<bool>,
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("namespace", &self.namespace)
            .field("key", &self.key)
            .field("start", &self.start)
            .field("end", &self.end)
            .field("min_block", &self.min_block)
            .field("max_block", &self.max_block)
            .field("no_data", &self.no_data)
            .field("interval", &self.interval)
            .field("aggregate", &self.aggregate)
            .field("percentile", &self.percentile)
            .field("cache_requested", &self.cache_requested)
            .field("prefix", &self.prefix)
            .field("limit", &self.limit)
            .field("offset", &self.offset)
            .finish()
    }
}

impl Context {
    pub fn new(store: Arc<dyn Store>, config: GaugedConfig, params: QueryParams) -> Result<Self> {
        let namespace = params.namespace.unwrap_or(config.namespace);
        let (first, last) = store.block_offset_bounds(namespace)?;
        let no_data = last.is_none();
        let min_block = first.unwrap_or(0);
        let max_block = last.unwrap_or(0);

        let now = now_millis() as i64;
        let resolve = |v: Option<i64>| v.map(|x| if x < 0 { x + now } else { x });
        let raw_start = resolve(params.start);
        let raw_end = resolve(params.end);
        let block_size = config.block_size;

        let mut start = raw_start.unwrap_or(0);
        let mut end = raw_end.unwrap_or(((max_block + 1) * block_size) as i64);
        if start < 0 || end < 0 {
            return Err(GaugedError::DateRange("invalid date range".into()));
        }
        let lower = (min_block * block_size) as i64;
        let upper = ((max_block + 1) * block_size) as i64;
        start = start.max(lower);
        end = end.min(upper);
        if start > end {
            if params.start.is_some() ^ params.end.is_some() {
                start = end;
            }
        }
        if start > end {
            return Err(GaugedError::DateRange("invalid date range".into()));
        }

        Ok(Self {
            store,
            interval: params.interval.unwrap_or(config.defaults.interval),
            aggregate: params.aggregate.unwrap_or(Aggregate::Sum),
            percentile: params.percentile.unwrap_or(config.defaults.percentile),
            cache_requested: params.cache.unwrap_or(config.defaults.cache),
            prefix: params.prefix.or_else(|| config.defaults.prefix.clone()),
            limit: params.limit.or(config.defaults.limit),
            offset: params.offset.or(config.defaults.offset),
            key: params.key,
            namespace,
            start: start as u64,
            end: end as u64,
            min_block,
            max_block,
            no_data,
            config,
            suppress_interval_size_error: Cell::new(false),
        })
    }

    /// The effective interval after validating `interval > 0` and the step
    /// count against `max_interval_steps`, unless suppressed by the
    /// associative-aggregate optimization's interior middle-block call.
    fn effective_interval(&self) -> Result<u64> {
        if self.interval == 0 {
            return Err(GaugedError::IntervalSize("interval must be positive".into()));
        }
        let steps = (self.end - self.start) / self.interval;
        if steps > self.config.max_interval_steps && !self.suppress_interval_size_error.get() {
            return Err(GaugedError::IntervalSize(format!(
                "{steps} steps exceeds max_interval_steps ({})",
                self.config.max_interval_steps
            )));
        }
        Ok(self.interval)
    }

    fn cache_enabled(&self, interval: u64) -> bool {
        self.cache_requested && interval >= self.config.min_cache_interval
    }

    fn translated_key(&self) -> Result<Option<u64>> {
        let lookup = [(self.namespace, self.key.clone())];
        let ids = self.store.lookup_ids(&lookup)?;
        Ok(ids.get(&(self.namespace, self.key.clone())).copied())
    }

    pub fn keys(&self) -> Result<Vec<Vec<u8>>> {
        self.store
            .keys(self.namespace, self.prefix.as_deref(), self.limit, self.offset)
    }

    pub fn namespaces(&self) -> Result<Vec<u32>> {
        self.store.namespaces()
    }

    pub fn statistics(&self) -> Result<Statistics> {
        let block_size = self.config.block_size;
        let start_block = self.start / block_size;
        let end_remainder = self.end % block_size;
        let end_block = if end_remainder == 0 {
            (self.end / block_size).saturating_sub(1)
        } else {
            self.end / block_size
        };
        let (data_points, byte_count) =
            self.store
                .get_namespace_statistics(self.namespace, start_block, end_block)?;
        Ok(Statistics {
            namespace: self.namespace,
            start: start_block * block_size,
            end: (end_block + 1) * block_size,
            data_points,
            byte_count,
        })
    }

    fn get_block(&self, key_id: u64, block: u64) -> Result<Option<SparseMap>> {
        match self.store.get_block(self.namespace, block, key_id)? {
            Some(bytes) => Ok(Some(SparseMap::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Walks `[start, end)`, fetching and slicing each covered block.
    /// `None` marks a block offset with no stored data, preserving position
    /// for callers (like [`Context::materialize`]) that need correct slot
    /// offsets across gaps.
    fn block_iterator_raw(&self, key_id: u64, start: u64, end: u64) -> Result<Vec<Option<SparseMap>>> {
        let block_size = self.config.block_size;
        let resolution = self.config.resolution;
        let start_block = start / block_size;
        let mut start_slot = ((start % block_size) / resolution) as u32;
        let end_remainder = end % block_size;
        let end_slot = ((end_remainder) / resolution) as u32;
        let end_block_raw = end / block_size;
        let end_block = if end_remainder == 0 {
            end_block_raw.saturating_sub(1)
        } else {
            end_block_raw
        };

        let mut out = Vec::new();
        if start_block > end_block {
            return Ok(out);
        }
        let mut block_index = start_block;
        loop {
            let slot_bounded = match self.get_block(key_id, block_index)? {
                Some(block) => {
                    let sliced = if block_index != end_block {
                        if start_slot > 0 {
                            block.slice(start_slot, 0)?
                        } else {
                            block
                        }
                    } else if start_slot > 0 || end_slot > 0 {
                        block.slice(start_slot, end_slot)?
                    } else {
                        block
                    };
                    Some(sliced)
                }
                None => None,
            };
            out.push(slot_bounded);
            start_slot = 0;
            if block_index == end_block {
                break;
            }
            block_index += 1;
        }
        Ok(out)
    }

    fn block_iterator(&self, key_id: u64, start: u64, end: u64) -> Result<Vec<SparseMap>> {
        Ok(self
            .block_iterator_raw(key_id, start, end)?
            .into_iter()
            .flatten()
            .collect())
    }

    /// Materializes `[start, end)` into one `SparseMap` with per-block
    /// offsets `i * slots_per_block`, for `percentile`/`median`.
    fn materialize(&self, key_id: u64, start: u64, end: u64) -> Result<SparseMap> {
        let blocks = self.block_iterator_raw(key_id, start, end)?;
        let slots_per_block = self.config.slots_per_block() as u32;
        let mut result = SparseMap::new();
        for (index, block) in blocks.into_iter().enumerate() {
            if let Some(block) = block {
                result.concat(&block, 0, 0, index as u32 * slots_per_block)?;
            }
        }
        Ok(result)
    }

    /// The last value for `key` at or before `timestamp`, scanning at most
    /// `max_look_behind / block_size` prior blocks.
    pub fn value(&self, timestamp: Option<u64>, key_id: Option<u64>) -> Result<Option<f32>> {
        let key_id = match key_id {
            Some(k) => Some(k),
            None => self.translated_key()?,
        };
        let Some(key_id) = key_id else {
            return Ok(None);
        };
        let timestamp = timestamp.unwrap_or(self.end);
        let block_size = self.config.block_size;
        let resolution = self.config.resolution;
        let mut look_behind = self.config.max_look_behind / block_size;
        let mut end_block = timestamp / block_size;
        let mut offset: Option<u32> = Some(((timestamp % block_size) / resolution) as u32);
        loop {
            if let Some(block) = self.get_block(key_id, end_block)? {
                let block = match offset {
                    Some(o) => block.slice(0, o + 1)?,
                    None => block,
                };
                if block.byte_length()? > 0 {
                    return block.last();
                }
            }
            if look_behind == 0 {
                return Ok(None);
            }
            offset = None;
            look_behind -= 1;
            if end_block == 0 {
                return Ok(None);
            }
            end_block -= 1;
        }
    }

    /// A scalar aggregate over `[start, end)`. Associative aggregates over a
    /// range spanning at least one full interior block reuse the cacheable
    /// `aggregate_series` path for the aligned middle and recurse only on
    /// the unaligned remainders.
    #[allow(clippy::too_many_arguments)]
    pub fn aggregate(
        &self,
        start: Option<u64>,
        end: Option<u64>,
        aggregate: Option<Aggregate>,
        key_id: Option<u64>,
    ) -> Result<Option<f32>> {
        let key_id = match key_id {
            Some(k) => Some(k),
            None => self.translated_key()?,
        };
        let Some(key_id) = key_id else {
            return Ok(None);
        };
        let aggregate = aggregate.unwrap_or(self.aggregate);
        let start = start.unwrap_or(self.start);
        let end = end.unwrap_or(self.end);
        let block_size = self.config.block_size;

        let mut start_block = start / block_size;
        if start % block_size != 0 {
            start_block += 1;
        }
        let end_block = end / block_size;

        if start_block + 1 < end_block && aggregate.is_associative() {
            let boundary_start = start_block * block_size;
            let boundary_end = end_block * block_size;
            let mut values: Vec<f32> = Vec::new();
            if start < boundary_start {
                if let Some(v) = self.aggregate(Some(start), Some(boundary_start), Some(aggregate), Some(key_id))? {
                    values.push(v);
                }
            }
            self.suppress_interval_size_error.set(true);
            let series = self.aggregate_series(
                Some(boundary_start),
                Some(boundary_end),
                Some(aggregate),
                Some(key_id),
                Some(block_size),
            );
            self.suppress_interval_size_error.set(false);
            values.extend(series?.values());
            if end > boundary_end {
                if let Some(v) = self.aggregate(Some(boundary_end), Some(end), Some(aggregate), Some(key_id))? {
                    values.push(v);
                }
            }
            let result = match aggregate {
                Aggregate::Sum => (!values.is_empty()).then(|| values.iter().sum()),
                Aggregate::Min => values.into_iter().fold(None, |acc, v| match acc {
                    None => Some(v),
                    Some(m) if v < m => Some(v),
                    acc => acc,
                }),
                Aggregate::Max => values.into_iter().fold(None, |acc, v| match acc {
                    None => Some(v),
                    Some(m) if v > m => Some(v),
                    acc => acc,
                }),
                Aggregate::Count => Some(values.iter().sum()),
                _ => unreachable!("only the associative set reaches this branch"),
            };
            return Ok(result.filter(|v| v.is_finite()));
        }

        let result = match aggregate {
            Aggregate::Sum => {
                let mut total: Option<f32> = None;
                for block in self.block_iterator(key_id, start, end)? {
                    total = Some(total.unwrap_or(0.0) + block.sum()?);
                }
                total
            }
            Aggregate::Count => {
                let mut total = 0u64;
                for block in self.block_iterator(key_id, start, end)? {
                    total += block.count()?;
                }
                Some(total as f32)
            }
            Aggregate::Min => {
                let mut result = None;
                for block in self.block_iterator(key_id, start, end)? {
                    if let Some(v) = block.min()? {
                        result = Some(match result {
                            Some(m) if m < v => m,
                            _ => v,
                        });
                    }
                }
                result
            }
            Aggregate::Max => {
                let mut result = None;
                for block in self.block_iterator(key_id, start, end)? {
                    if let Some(v) = block.max()? {
                        result = Some(match result {
                            Some(m) if m > v => m,
                            _ => v,
                        });
                    }
                }
                result
            }
            Aggregate::Mean => {
                let mut count = 0u64;
                let mut sum = 0f32;
                let mut any = false;
                for block in self.block_iterator(key_id, start, end)? {
                    let block_count = block.count()?;
                    if block_count > 0 {
                        count += block_count;
                        sum += block.sum()?;
                        any = true;
                    }
                }
                any.then_some(if count > 0 { sum / count as f32 } else { 0.0 })
            }
            Aggregate::Stddev => {
                let count = self
                    .aggregate(Some(start), Some(end), Some(Aggregate::Count), Some(key_id))?
                    .unwrap_or(0.0);
                if count == 0.0 {
                    None
                } else {
                    let sum = self
                        .aggregate(Some(start), Some(end), Some(Aggregate::Sum), Some(key_id))?
                        .unwrap_or(0.0);
                    let mean = sum / count;
                    let mut sum_of_squares = 0f32;
                    for block in self.block_iterator(key_id, start, end)? {
                        sum_of_squares += block.sum_of_squares(mean)?;
                    }
                    Some((sum_of_squares / count).sqrt())
                }
            }
            Aggregate::Percentile => self.materialize(key_id, start, end)?.percentile(self.percentile)?,
            Aggregate::Median => self.materialize(key_id, start, end)?.median()?,
        };
        Ok(result.filter(|v| v.is_finite()))
    }

    fn read_cache(&self, hash: [u8; 20], interval: u64, start: u64, end: u64) -> Result<HashMap<u64, f32>> {
        Ok(self
            .store
            .get_cache(self.namespace, hash, interval, start, end)?
            .into_iter()
            .collect())
    }

    fn value_cache_key(&self, key_id: u64) -> [u8; 20] {
        digest(&format!("value_series:{key_id}:{}", self.config.max_look_behind))
    }

    fn aggregate_cache_key(&self, key_id: u64, aggregate: Aggregate) -> [u8; 20] {
        digest(&format!("aggregate_series:{key_id}:{}", aggregate.as_str()))
    }

    /// A time series of point lookups, one per `interval` step.
    pub fn value_series(&self) -> Result<TimeSeries> {
        let Some(key_id) = self.translated_key()? else {
            return Ok(TimeSeries::new(Vec::new()));
        };
        if self.no_data {
            return Ok(TimeSeries::new(Vec::new()));
        }
        let interval = self.effective_interval()?;
        let cache = self.cache_enabled(interval);
        let cache_key = self.value_cache_key(key_id);
        let cached = if cache {
            self.read_cache(cache_key, interval, self.start, self.end)?
        } else {
            HashMap::new()
        };

        let cache_until = if cache { self.max_block * self.config.block_size } else { 0 };
        let mut points = Vec::new();
        let mut to_cache = Vec::new();
        let mut cursor = self.start;
        while cursor < self.end {
            let group_end = self.end.min(cursor + interval);
            let value = match cached.get(&cursor) {
                Some(v) => Some(*v),
                None => self.value(Some(cursor), Some(key_id))?,
            };
            // `value_series` mirrors the look-behind point lookup: a step
            // with no value within look-behind range simply isn't part of
            // the series, unlike `aggregate_series`'s every-step-present
            // contract.
            if let Some(v) = value {
                points.push((cursor, Some(v)));
                if cache && cache_until >= group_end && !cached.contains_key(&cursor) {
                    to_cache.push((cursor, v));
                }
            }
            cursor += interval;
        }
        if cache && !to_cache.is_empty() {
            self.store.add_cache(self.namespace, cache_key, interval, &to_cache)?;
        }
        debug!(points = points.len(), "value_series computed");
        Ok(TimeSeries::new(points))
    }

    /// A time series of scalar aggregates, one per `interval` step.
    #[allow(clippy::too_many_arguments)]
    pub fn aggregate_series(
        &self,
        start: Option<u64>,
        end: Option<u64>,
        aggregate: Option<Aggregate>,
        key_id: Option<u64>,
        interval: Option<u64>,
    ) -> Result<TimeSeries> {
        let key_id = match key_id {
            Some(k) => Some(k),
            None => self.translated_key()?,
        };
        let Some(key_id) = key_id else {
            return Ok(TimeSeries::new(Vec::new()));
        };
        if self.no_data {
            return Ok(TimeSeries::new(Vec::new()));
        }
        let start = start.unwrap_or(self.start);
        let end = end.unwrap_or(self.end);
        let aggregate = aggregate.unwrap_or(self.aggregate);
        let interval = match interval {
            Some(i) => i,
            None => self.effective_interval()?,
        };

        let _span = debug_span!("aggregate_series", aggregate = aggregate.as_str(), interval).entered();

        let cache = self.cache_enabled(interval);
        let cache_key = self.aggregate_cache_key(key_id, aggregate);
        let cached = if cache {
            self.read_cache(cache_key, interval, start, end)?
        } else {
            HashMap::new()
        };

        let cache_until = if cache { self.max_block * self.config.block_size } else { 0 };
        let mut points = Vec::new();
        let mut to_cache = Vec::new();
        let mut cursor = start;
        while cursor < end {
            let group_end = end.min(cursor + interval);
            let value = match cached.get(&cursor) {
                Some(v) => Some(*v),
                None => self.aggregate(Some(cursor), Some(group_end), Some(aggregate), Some(key_id))?,
            };
            // Every step keeps its slot, `None` included, so the series'
            // length always matches the number of steps in `[start, end)`
            // regardless of which steps had data to aggregate.
            points.push((cursor, value));
            if let Some(v) = value {
                if cache && cache_until >= group_end && !cached.contains_key(&cursor) {
                    to_cache.push((cursor, v));
                }
            }
            cursor += interval;
        }
        if cache && !to_cache.is_empty() {
            self.store.add_cache(self.namespace, cache_key, interval, &to_cache)?;
        }
        Ok(TimeSeries::new(points))
    }
}

fn digest(input: &str) -> [u8; 20] {
    let mut hasher = Sha1::new();
    hasher.update(input.as_bytes());
    hasher.finalize().into()
}
