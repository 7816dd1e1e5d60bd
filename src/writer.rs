//! # Writer
//!
//! Accepts measurements, buffers them per `(namespace, key)` for the
//! *current* block, and flushes deterministically on block rollover,
//! periodic tick, or explicit request.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, debug_span, instrument};

use crate::config::{GaugedConfig, Policy};
use crate::error::{GaugedError, Result};
use crate::lru::Lru;
use crate::measurement::Measurements;
use crate::store::{BlockWrite, Store};
use crate::structures::{FloatArray, SparseMap};
use crate::time::{now_millis, BlockSlot};

#[derive(Default)]
struct NamespaceAccumulator {
    data_points: u64,
    byte_count: u64,
}

/// One key's in-progress block state: finalized segments already appended to
/// `map`, plus an open `segment` for the current slot not yet closed.
struct PendingKey {
    map: SparseMap,
    segment: FloatArray,
    segment_slot: u32,
}

impl PendingKey {
    fn new() -> Self {
        Self {
            map: SparseMap::new(),
            segment: FloatArray::new(),
            segment_slot: 0,
        }
    }

    fn push(&mut self, value: f32, slot: u64) -> Result<()> {
        if self.segment.is_empty()? {
            self.segment_slot = slot as u32;
        }
        self.segment.append(value)
    }

    /// The slot-advance primitive: closes the open segment into `map`, if
    /// any values were written to it.
    fn close_segment(&mut self) -> Result<()> {
        if !self.segment.is_empty()? {
            let closed = std::mem::replace(&mut self.segment, FloatArray::new());
            self.map.append(self.segment_slot, closed)?;
        }
        Ok(())
    }
}

/// Cancels a `crossbeam::channel::tick` thread on drop and performs no
/// flush itself — that's the `Writer`'s job on release.
struct FlushTicker {
    stop: crossbeam::channel::Sender<()>,
    handle: Option<std::thread::JoinHandle<()>>,
}

impl FlushTicker {
    fn start(interval: Duration, flag: Arc<AtomicBool>) -> Self {
        let (stop_tx, stop_rx) = crossbeam::channel::bounded(0);
        let ticker = crossbeam::channel::tick(interval);
        let handle = std::thread::spawn(move || loop {
            crossbeam::channel::select! {
                recv(ticker) -> _ => flag.store(true, Ordering::SeqCst),
                recv(stop_rx) -> _ => break,
            }
        });
        Self {
            stop: stop_tx,
            handle: Some(handle),
        }
    }
}

impl Drop for FlushTicker {
    fn drop(&mut self) {
        let _ = self.stop.send(());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Stages incoming measurements into per-key `SparseMap`s for the current
/// block and flushes them to a [`Store`] on block rollover or demand.
///
/// Single-writer per `writer_name` (see the crate's concurrency model); not
/// `Sync` in spirit even though nothing here prevents compiling it that way.
pub struct Writer {
    store: Arc<dyn Store>,
    config: GaugedConfig,
    current_block: u64,
    current_slot: u64,
    pending_order: Vec<(u32, Vec<u8>)>,
    pending: HashMap<(u32, Vec<u8>), PendingKey>,
    namespace_stats: HashMap<u32, NamespaceAccumulator>,
    key_cache: Lru<(u32, Vec<u8>), u64>,
    flush_now: Arc<AtomicBool>,
    ticker: Option<FlushTicker>,
    released: bool,
}

impl Writer {
    pub fn new(store: Arc<dyn Store>, config: GaugedConfig) -> Result<Self> {
        config.validate()?;
        let flush_now = Arc::new(AtomicBool::new(false));
        let ticker = if config.flush_interval > Duration::ZERO {
            Some(FlushTicker::start(config.flush_interval, flush_now.clone()))
        } else {
            None
        };
        let key_cache = Lru::new(config.key_cache_size);
        Ok(Self {
            store,
            config,
            current_block: 0,
            current_slot: 0,
            pending_order: Vec::new(),
            pending: HashMap::new(),
            namespace_stats: HashMap::new(),
            key_cache,
            flush_now,
            ticker,
            released: false,
        })
    }

    fn check_alive(&self) -> Result<()> {
        if self.released {
            Err(GaugedError::UseAfterRelease)
        } else {
            Ok(())
        }
    }

    /// Queues one or more measurements. See [`Measurements`] for the
    /// accepted input shapes.
    #[instrument(skip(self, measurements), fields(namespace))]
    pub fn add(
        &mut self,
        measurements: Measurements,
        timestamp: Option<u64>,
        namespace: Option<u32>,
    ) -> Result<()> {
        self.check_alive()?;
        let namespace = namespace.unwrap_or(self.config.namespace);
        tracing::Span::current().record("namespace", namespace);
        let timestamp = timestamp.unwrap_or_else(now_millis);

        let target = BlockSlot::from_timestamp(timestamp, self.config.block_size, self.config.resolution);
        let current = BlockSlot {
            block: self.current_block,
            slot: self.current_slot,
        };
        let target = if target < current {
            match self.config.append_only_violation {
                Policy::Error => {
                    return Err(GaugedError::AppendOnly {
                        writer_name: self.config.writer_name.clone(),
                    })
                }
                Policy::Ignore => return Ok(()),
                Policy::Rewrite => current,
            }
        } else {
            target
        };

        if target.block > self.current_block {
            self.flush_blocks()?;
            self.current_block = target.block;
            self.current_slot = target.slot;
        } else if target.slot > self.current_slot {
            self.flush_arrays()?;
            self.current_slot = target.slot;
        }

        let max_key = self.store.max_key();
        let mut data_points = 0u64;
        for (key, value) in measurements.into_pairs() {
            if let Some(whitelist) = &self.config.key_whitelist {
                if !whitelist.contains(&key) {
                    continue;
                }
            }
            if key.len() > max_key {
                match self.config.key_overflow {
                    Policy::Error => {
                        return Err(GaugedError::KeyOverflow {
                            key,
                            namespace,
                            max_key,
                        })
                    }
                    _ => continue,
                }
            }
            if !value.is_finite() {
                match self.config.gauge_nan {
                    Policy::Error => return Err(GaugedError::NaN { key, namespace }),
                    _ => continue,
                }
            }
            let entry_key = (namespace, key);
            if !self.pending.contains_key(&entry_key) {
                self.pending_order.push(entry_key.clone());
                self.pending.insert(entry_key.clone(), PendingKey::new());
            }
            self.pending
                .get_mut(&entry_key)
                .expect("just inserted")
                .push(value, self.current_slot)?;
            data_points += 1;
        }
        if data_points > 0 {
            self.namespace_stats
                .entry(namespace)
                .or_default()
                .data_points += data_points;
        }
        debug!(data_points, "queued measurements");

        if self.flush_now.swap(false, Ordering::SeqCst) {
            self.flush()?;
        }
        Ok(())
    }

    fn flush_arrays(&mut self) -> Result<()> {
        for pending_key in self.pending.values_mut() {
            pending_key.close_segment()?;
        }
        Ok(())
    }

    fn flush_blocks(&mut self) -> Result<()> {
        self.flush_arrays()?;
        self.flush()
    }

    /// Flushes every pending `SparseMap` with nonzero byte length to the
    /// store, updates statistics and writer position, and commits. Values
    /// written into the *currently open* segment (not yet slot-closed) are
    /// left untouched, so a periodic mid-block flush never loses data.
    #[instrument(skip(self))]
    pub fn flush(&mut self) -> Result<()> {
        self.check_alive()?;
        let _span = debug_span!("block_rollover", block = self.current_block).entered();

        let keys: Vec<(u32, Vec<u8>)> = self
            .pending_order
            .iter()
            .filter(|key| {
                self.pending
                    .get(*key)
                    .is_some_and(|p| p.map.byte_length().unwrap_or(0) > 0)
            })
            .cloned()
            .collect();

        let key_ids = self.translate_keys(&keys)?;

        let mut blocks = Vec::with_capacity(keys.len());
        for key in &keys {
            let pending_key = self.pending.get_mut(key).expect("key was just filtered in");
            let bytes = pending_key.map.to_bytes()?;
            if bytes.is_empty() {
                continue;
            }
            let key_id = key_ids[key];
            self.namespace_stats
                .entry(key.0)
                .or_default()
                .byte_count += bytes.len() as u64;
            blocks.push(BlockWrite {
                namespace: key.0,
                block: self.current_block,
                key_id,
                bytes,
                flags: 0,
            });
        }

        if !blocks.is_empty() {
            if self.config.overwrite_blocks {
                self.store.replace_blocks(&blocks)?;
            } else {
                self.store.insert_or_append_blocks(&blocks)?;
            }
        }

        for (namespace, acc) in self.namespace_stats.drain() {
            self.store
                .add_namespace_statistics(namespace, self.current_block, acc.data_points, acc.byte_count)?;
        }

        self.flush_writer_position()?;
        self.store.commit()?;

        for key in &keys {
            self.pending.get_mut(key).expect("key was just filtered in").map.clear()?;
        }
        debug!(blocks = blocks.len(), "flushed block");
        Ok(())
    }

    fn flush_writer_position(&self) -> Result<()> {
        let timestamp = self.current_block * self.config.block_size + self.current_slot * self.config.resolution;
        if timestamp > 0 {
            self.store.set_writer_position(&self.config.writer_name, timestamp)?;
        }
        Ok(())
    }

    fn translate_keys(&mut self, keys: &[(u32, Vec<u8>)]) -> Result<HashMap<(u32, Vec<u8>), u64>> {
        if keys.is_empty() {
            return Ok(HashMap::new());
        }
        let mut ids = HashMap::new();
        let mut to_translate = Vec::new();
        for key in keys {
            match self.key_cache.get(key) {
                Some(id) => {
                    ids.insert(key.clone(), id);
                }
                None => to_translate.push(key.clone()),
            }
        }
        if !to_translate.is_empty() {
            self.store.insert_keys(&to_translate)?;
            let looked_up = self.store.lookup_ids(&to_translate)?;
            for (key, id) in looked_up {
                self.key_cache.put(key.clone(), id);
                ids.insert(key, id);
            }
        }
        Ok(ids)
    }

    /// Returns the timestamp just after the last accepted measurement. A new
    /// `Writer` resuming work must not accept timestamps before this.
    pub fn resume_from(&self) -> Result<u64> {
        self.check_alive()?;
        match self.store.get_writer_position(&self.config.writer_name)? {
            Some(position) => Ok(position + self.config.resolution),
            None => Ok(0),
        }
    }

    /// Drops all blocks, statistics, and cache rows at or after `timestamp`,
    /// and clamps writer positions. `timestamp` must land on a block
    /// boundary.
    pub fn clear_from(&self, timestamp: u64) -> Result<()> {
        self.check_alive()?;
        if timestamp % self.config.block_size != 0 {
            return Err(GaugedError::UnalignedClear(timestamp));
        }
        self.store.clear_from(timestamp / self.config.block_size, timestamp)
    }

    /// Flushes any remaining pending data and stops the periodic-flush
    /// ticker, if any. Idempotent; further operations fail with
    /// [`GaugedError::UseAfterRelease`].
    pub fn release(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.flush_blocks()?;
        self.ticker = None;
        self.released = true;
        Ok(())
    }
}

impl Drop for Writer {
    fn drop(&mut self) {
        let _ = self.release();
    }
}
