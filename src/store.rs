//! # Store Contract
//!
//! The persistent *store* is named as an external collaborator and is out of
//! scope for this crate: a relational table layer storing opaque block blobs
//! keyed by `(namespace, block-offset, key-id)`, plus the key dictionary,
//! metadata, writer-position, per-block statistics, and aggregate cache.
//!
//! [`Store`] is the Rust expression of that contract — one method per
//! required operation, grouped the way the reference engine exposes a
//! pluggable backend via [`CompactionStrategy`](crate::compaction::CompactionStrategy)-style
//! traits. [`MemoryStore`] is the single reference implementation: an
//! in-process, mutex-guarded structure with no file I/O, provided purely so
//! [`Writer`](crate::writer::Writer) and [`Context`](crate::context::Context)
//! are testable without a real persistence layer.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use crate::error::GaugedError;

/// One flushed block, ready to be written by [`Store::replace_blocks`] or
/// [`Store::insert_or_append_blocks`].
#[derive(Debug, Clone)]
pub struct BlockWrite {
    pub namespace: u32,
    pub block: u64,
    pub key_id: u64,
    pub bytes: Vec<u8>,
    /// Reserved for future extensions (e.g. block compression); always 0 today.
    pub flags: u8,
}

/// The persistence contract every read/write path in this crate is built
/// against. See the module docs for scope.
pub trait Store: Send + Sync {
    fn create_schema(&self) -> Result<(), GaugedError>;
    fn clear_schema(&self) -> Result<(), GaugedError>;
    fn drop_schema(&self) -> Result<(), GaugedError>;

    /// The maximum key length (bytes) this store can address.
    fn max_key(&self) -> usize;

    /// Every namespace with at least one key, block, or statistics row.
    fn namespaces(&self) -> Result<Vec<u32>, GaugedError>;

    fn keys(
        &self,
        namespace: u32,
        prefix: Option<&[u8]>,
        limit: Option<usize>,
        offset: Option<usize>,
    ) -> Result<Vec<Vec<u8>>, GaugedError>;

    fn lookup_ids(
        &self,
        keys: &[(u32, Vec<u8>)],
    ) -> Result<HashMap<(u32, Vec<u8>), u64>, GaugedError>;

    fn insert_keys(&self, keys: &[(u32, Vec<u8>)]) -> Result<(), GaugedError>;

    fn get_block(
        &self,
        namespace: u32,
        block_offset: u64,
        key_id: u64,
    ) -> Result<Option<Vec<u8>>, GaugedError>;

    fn replace_blocks(&self, blocks: &[BlockWrite]) -> Result<(), GaugedError>;

    /// Appends on conflict, rather than replacing.
    fn insert_or_append_blocks(&self, blocks: &[BlockWrite]) -> Result<(), GaugedError>;

    fn block_offset_bounds(&self, namespace: u32)
    -> Result<(Option<u64>, Option<u64>), GaugedError>;

    /// Additive: repeated calls for the same `(namespace, block)` accumulate.
    fn add_namespace_statistics(
        &self,
        namespace: u32,
        block: u64,
        data_points: u64,
        byte_count: u64,
    ) -> Result<(), GaugedError>;

    fn get_namespace_statistics(
        &self,
        namespace: u32,
        start_block: u64,
        end_block: u64,
    ) -> Result<(u64, u64), GaugedError>;

    fn get_cache(
        &self,
        namespace: u32,
        hash: [u8; 20],
        interval: u64,
        start: u64,
        end: u64,
    ) -> Result<Vec<(u64, f32)>, GaugedError>;

    /// Ignore-on-conflict: entries for timestamps already cached are left alone.
    fn add_cache(
        &self,
        namespace: u32,
        hash: [u8; 20],
        interval: u64,
        entries: &[(u64, f32)],
    ) -> Result<(), GaugedError>;

    fn remove_cache(&self, namespace: u32) -> Result<(), GaugedError>;

    fn set_writer_position(&self, name: &str, timestamp: u64) -> Result<(), GaugedError>;
    fn get_writer_position(&self, name: &str) -> Result<Option<u64>, GaugedError>;

    fn set_metadata(&self, entries: &[(String, String)], replace: bool) -> Result<(), GaugedError>;
    fn get_metadata(&self, key: &str) -> Result<Option<String>, GaugedError>;
    fn get_all_metadata(&self) -> Result<HashMap<String, String>, GaugedError>;

    fn remove_namespace(&self, namespace: u32) -> Result<(), GaugedError>;

    /// Drops blocks and stats at or after `block_offset`; drops cache rows
    /// whose coverage (`[start, start+interval)`) ends at or after
    /// `timestamp`; clamps writer positions to `timestamp`.
    fn clear_from(&self, block_offset: u64, timestamp: u64) -> Result<(), GaugedError>;

    fn commit(&self) -> Result<(), GaugedError>;
}

#[derive(Default)]
struct MemoryStoreInner {
    next_key_id: u64,
    keys: HashMap<u32, BTreeMap<Vec<u8>, u64>>,
    blocks: HashMap<(u32, u64, u64), Vec<u8>>,
    stats: HashMap<(u32, u64), (u64, u64)>,
    cache: HashMap<(u32, [u8; 20], u64), BTreeMap<u64, f32>>,
    writer_positions: HashMap<String, u64>,
    metadata: HashMap<String, String>,
}

/// An in-process reference [`Store`] with no file I/O. Not a durability
/// layer — state is lost when the process exits.
pub struct MemoryStore {
    max_key: usize,
    inner: Mutex<MemoryStoreInner>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl MemoryStore {
    pub fn new(max_key: usize) -> Self {
        Self {
            max_key,
            inner: Mutex::new(MemoryStoreInner::default()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryStoreInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Store for MemoryStore {
    fn create_schema(&self) -> Result<(), GaugedError> {
        Ok(())
    }

    fn clear_schema(&self) -> Result<(), GaugedError> {
        let mut inner = self.lock();
        *inner = MemoryStoreInner::default();
        Ok(())
    }

    fn drop_schema(&self) -> Result<(), GaugedError> {
        self.clear_schema()
    }

    fn max_key(&self) -> usize {
        self.max_key
    }

    fn namespaces(&self) -> Result<Vec<u32>, GaugedError> {
        let inner = self.lock();
        let mut namespaces: std::collections::BTreeSet<u32> = std::collections::BTreeSet::new();
        namespaces.extend(inner.keys.keys().copied());
        namespaces.extend(inner.blocks.keys().map(|(ns, _, _)| *ns));
        namespaces.extend(inner.stats.keys().map(|(ns, _)| *ns));
        Ok(namespaces.into_iter().collect())
    }

    fn keys(
        &self,
        namespace: u32,
        prefix: Option<&[u8]>,
        limit: Option<usize>,
        offset: Option<usize>,
    ) -> Result<Vec<Vec<u8>>, GaugedError> {
        let inner = self.lock();
        let Some(namespace_keys) = inner.keys.get(&namespace) else {
            return Ok(Vec::new());
        };
        let matching = namespace_keys.keys().filter(|key| match prefix {
            Some(p) => key.starts_with(p),
            None => true,
        });
        Ok(matching
            .skip(offset.unwrap_or(0))
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }

    fn lookup_ids(
        &self,
        keys: &[(u32, Vec<u8>)],
    ) -> Result<HashMap<(u32, Vec<u8>), u64>, GaugedError> {
        let inner = self.lock();
        let mut out = HashMap::new();
        for (namespace, key) in keys {
            if let Some(id) = inner.keys.get(namespace).and_then(|m| m.get(key)) {
                out.insert((*namespace, key.clone()), *id);
            }
        }
        Ok(out)
    }

    fn insert_keys(&self, keys: &[(u32, Vec<u8>)]) -> Result<(), GaugedError> {
        let mut inner = self.lock();
        for (namespace, key) in keys {
            if inner
                .keys
                .get(namespace)
                .is_some_and(|m| m.contains_key(key))
            {
                continue;
            }
            let id = inner.next_key_id;
            inner.next_key_id += 1;
            inner
                .keys
                .entry(*namespace)
                .or_default()
                .insert(key.clone(), id);
        }
        Ok(())
    }

    fn get_block(
        &self,
        namespace: u32,
        block_offset: u64,
        key_id: u64,
    ) -> Result<Option<Vec<u8>>, GaugedError> {
        let inner = self.lock();
        Ok(inner.blocks.get(&(namespace, block_offset, key_id)).cloned())
    }

    fn replace_blocks(&self, blocks: &[BlockWrite]) -> Result<(), GaugedError> {
        let mut inner = self.lock();
        for b in blocks {
            inner
                .blocks
                .insert((b.namespace, b.block, b.key_id), b.bytes.clone());
        }
        Ok(())
    }

    fn insert_or_append_blocks(&self, blocks: &[BlockWrite]) -> Result<(), GaugedError> {
        let mut inner = self.lock();
        for b in blocks {
            inner
                .blocks
                .entry((b.namespace, b.block, b.key_id))
                .or_default()
                .extend_from_slice(&b.bytes);
        }
        Ok(())
    }

    fn block_offset_bounds(
        &self,
        namespace: u32,
    ) -> Result<(Option<u64>, Option<u64>), GaugedError> {
        let inner = self.lock();
        let blocks = inner
            .blocks
            .keys()
            .filter(|(ns, _, _)| *ns == namespace)
            .map(|(_, block, _)| *block)
            .chain(
                inner
                    .stats
                    .keys()
                    .filter(|(ns, _)| *ns == namespace)
                    .map(|(_, block)| *block),
            );
        let (min, max) = blocks.fold((None, None), |(min, max), b| {
            (
                Some(min.map_or(b, |m: u64| m.min(b))),
                Some(max.map_or(b, |m: u64| m.max(b))),
            )
        });
        Ok((min, max))
    }

    fn add_namespace_statistics(
        &self,
        namespace: u32,
        block: u64,
        data_points: u64,
        byte_count: u64,
    ) -> Result<(), GaugedError> {
        let mut inner = self.lock();
        let entry = inner.stats.entry((namespace, block)).or_default();
        entry.0 += data_points;
        entry.1 += byte_count;
        Ok(())
    }

    fn get_namespace_statistics(
        &self,
        namespace: u32,
        start_block: u64,
        end_block: u64,
    ) -> Result<(u64, u64), GaugedError> {
        let inner = self.lock();
        let mut data_points = 0;
        let mut byte_count = 0;
        for block in start_block..=end_block {
            if let Some((dp, bc)) = inner.stats.get(&(namespace, block)) {
                data_points += dp;
                byte_count += bc;
            }
        }
        Ok((data_points, byte_count))
    }

    fn get_cache(
        &self,
        namespace: u32,
        hash: [u8; 20],
        interval: u64,
        start: u64,
        end: u64,
    ) -> Result<Vec<(u64, f32)>, GaugedError> {
        let inner = self.lock();
        let Some(rows) = inner.cache.get(&(namespace, hash, interval)) else {
            return Ok(Vec::new());
        };
        Ok(rows
            .range(start..end)
            .map(|(t, v)| (*t, *v))
            .collect())
    }

    fn add_cache(
        &self,
        namespace: u32,
        hash: [u8; 20],
        interval: u64,
        entries: &[(u64, f32)],
    ) -> Result<(), GaugedError> {
        let mut inner = self.lock();
        let rows = inner.cache.entry((namespace, hash, interval)).or_default();
        for (t, v) in entries {
            rows.entry(*t).or_insert(*v);
        }
        Ok(())
    }

    fn remove_cache(&self, namespace: u32) -> Result<(), GaugedError> {
        let mut inner = self.lock();
        inner.cache.retain(|(ns, _, _), _| *ns != namespace);
        Ok(())
    }

    fn set_writer_position(&self, name: &str, timestamp: u64) -> Result<(), GaugedError> {
        let mut inner = self.lock();
        inner.writer_positions.insert(name.to_string(), timestamp);
        Ok(())
    }

    fn get_writer_position(&self, name: &str) -> Result<Option<u64>, GaugedError> {
        let inner = self.lock();
        Ok(inner.writer_positions.get(name).copied())
    }

    fn set_metadata(&self, entries: &[(String, String)], replace: bool) -> Result<(), GaugedError> {
        let mut inner = self.lock();
        for (key, value) in entries {
            if replace || !inner.metadata.contains_key(key) {
                inner.metadata.insert(key.clone(), value.clone());
            }
        }
        Ok(())
    }

    fn get_metadata(&self, key: &str) -> Result<Option<String>, GaugedError> {
        let inner = self.lock();
        Ok(inner.metadata.get(key).cloned())
    }

    fn get_all_metadata(&self) -> Result<HashMap<String, String>, GaugedError> {
        let inner = self.lock();
        Ok(inner.metadata.clone())
    }

    fn remove_namespace(&self, namespace: u32) -> Result<(), GaugedError> {
        let mut inner = self.lock();
        inner.keys.remove(&namespace);
        inner.blocks.retain(|(ns, _, _), _| *ns != namespace);
        inner.stats.retain(|(ns, _), _| *ns != namespace);
        inner.cache.retain(|(ns, _, _), _| *ns != namespace);
        Ok(())
    }

    fn clear_from(&self, block_offset: u64, timestamp: u64) -> Result<(), GaugedError> {
        let mut inner = self.lock();
        inner.blocks.retain(|(_, block, _), _| *block < block_offset);
        inner.stats.retain(|(_, block), _| *block < block_offset);
        for ((_, _, interval), rows) in inner.cache.iter_mut() {
            rows.retain(|start, _| *start + *interval < timestamp);
        }
        for position in inner.writer_positions.values_mut() {
            if *position >= timestamp {
                *position = timestamp;
            }
        }
        Ok(())
    }

    fn commit(&self) -> Result<(), GaugedError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_lookup_keys() {
        let store = MemoryStore::default();
        store.insert_keys(&[(0, b"foobar".to_vec())]).unwrap();
        let ids = store.lookup_ids(&[(0, b"foobar".to_vec())]).unwrap();
        assert_eq!(ids.len(), 1);
    }

    #[test]
    fn insert_keys_is_idempotent() {
        let store = MemoryStore::default();
        store.insert_keys(&[(0, b"a".to_vec())]).unwrap();
        let first = store.lookup_ids(&[(0, b"a".to_vec())]).unwrap()[&(0, b"a".to_vec())];
        store.insert_keys(&[(0, b"a".to_vec())]).unwrap();
        let second = store.lookup_ids(&[(0, b"a".to_vec())]).unwrap()[&(0, b"a".to_vec())];
        assert_eq!(first, second);
    }

    #[test]
    fn insert_or_append_blocks_appends() {
        let store = MemoryStore::default();
        let write = |bytes: &[u8]| BlockWrite {
            namespace: 0,
            block: 1,
            key_id: 7,
            bytes: bytes.to_vec(),
            flags: 0,
        };
        store.insert_or_append_blocks(&[write(&[1, 2])]).unwrap();
        store.insert_or_append_blocks(&[write(&[3, 4])]).unwrap();
        let block = store.get_block(0, 1, 7).unwrap().unwrap();
        assert_eq!(block, vec![1, 2, 3, 4]);
    }

    #[test]
    fn replace_blocks_overwrites() {
        let store = MemoryStore::default();
        let write = |bytes: &[u8]| BlockWrite {
            namespace: 0,
            block: 1,
            key_id: 7,
            bytes: bytes.to_vec(),
            flags: 0,
        };
        store.insert_or_append_blocks(&[write(&[1, 2])]).unwrap();
        store.replace_blocks(&[write(&[9])]).unwrap();
        assert_eq!(store.get_block(0, 1, 7).unwrap().unwrap(), vec![9]);
    }

    #[test]
    fn block_offset_bounds_reflects_writes() {
        let store = MemoryStore::default();
        store
            .insert_or_append_blocks(&[BlockWrite {
                namespace: 0,
                block: 3,
                key_id: 1,
                bytes: vec![1],
                flags: 0,
            }])
            .unwrap();
        assert_eq!(store.block_offset_bounds(0).unwrap(), (Some(3), Some(3)));
        assert_eq!(store.block_offset_bounds(1).unwrap(), (None, None));
    }

    #[test]
    fn clear_from_drops_blocks_at_or_after_boundary() {
        let store = MemoryStore::default();
        for block in 0..5 {
            store
                .insert_or_append_blocks(&[BlockWrite {
                    namespace: 0,
                    block,
                    key_id: 1,
                    bytes: vec![1],
                    flags: 0,
                }])
                .unwrap();
        }
        store.clear_from(2, 20_000).unwrap();
        assert!(store.get_block(0, 1, 1).unwrap().is_some());
        assert!(store.get_block(0, 2, 1).unwrap().is_none());
        assert!(store.get_block(0, 4, 1).unwrap().is_none());
    }

    #[test]
    fn clear_from_clamps_writer_positions() {
        let store = MemoryStore::default();
        store.set_writer_position("default", 50_000).unwrap();
        store.clear_from(2, 20_000).unwrap();
        assert_eq!(store.get_writer_position("default").unwrap(), Some(20_000));
    }

    #[test]
    fn clear_from_drops_cache_rows_whose_coverage_reaches_the_boundary() {
        let store = MemoryStore::default();
        let hash = [7u8; 20];
        // A row at start=15_000 with interval=10_000 covers [15_000, 25_000),
        // which reaches the clear_from boundary at 20_000 and must be
        // dropped even though its own `start` key is below the boundary.
        store.add_cache(0, hash, 10_000, &[(15_000, 1.0)]).unwrap();
        // A row whose coverage ends strictly before the boundary survives.
        store.add_cache(0, hash, 10_000, &[(9_000, 2.0)]).unwrap();

        store.clear_from(2, 20_000).unwrap();

        let rows = store.get_cache(0, hash, 10_000, 0, 30_000).unwrap();
        assert_eq!(rows, vec![(9_000, 2.0)]);
    }

    #[test]
    fn namespaces_reflects_keys_and_blocks() {
        let store = MemoryStore::default();
        store.insert_keys(&[(2, b"a".to_vec())]).unwrap();
        store
            .insert_or_append_blocks(&[BlockWrite {
                namespace: 5,
                block: 0,
                key_id: 1,
                bytes: vec![1],
                flags: 0,
            }])
            .unwrap();
        assert_eq!(store.namespaces().unwrap(), vec![2, 5]);
    }

    #[test]
    fn cache_round_trips_and_ignores_conflicts() {
        let store = MemoryStore::default();
        let hash = [1u8; 20];
        store.add_cache(0, hash, 1000, &[(0, 1.0), (1000, 2.0)]).unwrap();
        store.add_cache(0, hash, 1000, &[(0, 99.0)]).unwrap(); // ignored
        let rows = store.get_cache(0, hash, 1000, 0, 2000).unwrap();
        assert_eq!(rows, vec![(0, 1.0), (1000, 2.0)]);
    }
}
