//! # Key-ID LRU Cache
//!
//! A bounded least-recently-used cache mapping `(namespace, key bytes) -> id`.
//! The original structure is a hand-rolled intrusive doubly-linked list; this
//! version reaches the same eviction behavior with a `HashMap` plus an
//! access-ordered `VecDeque`, which is the idiomatic shape for a small bounded
//! LRU when the value type is cheap to clone (`u64` ids) and raw pointers
//! would buy nothing but unsafety.

use std::collections::HashMap;
use std::collections::VecDeque;
use std::hash::Hash;

/// A fixed-capacity least-recently-used cache.
pub struct Lru<K, V> {
    capacity: usize,
    // Each entry carries the sequence number of its most recent touch, so a
    // stale `order` occurrence (one superseded by a later touch of the same
    // key) can be told apart from the live one without a second lookup.
    map: HashMap<K, (V, u64)>,
    // Least-recently-used at the front. May contain stale occurrences for
    // keys that were touched again since being pushed; `evict_oldest` skips
    // those by comparing sequence numbers instead of lazily compacting.
    order: VecDeque<(u64, K)>,
    next_seq: u64,
}

impl<K: Eq + Hash + Clone, V: Clone> Lru<K, V> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            map: HashMap::new(),
            order: VecDeque::new(),
            next_seq: 0,
        }
    }

    pub fn contains(&self, key: &K) -> bool {
        self.map.contains_key(key)
    }

    /// Looks up `key`, promoting it to most-recently-used on a hit.
    pub fn get(&mut self, key: &K) -> Option<V> {
        if let Some((value, _)) = self.map.get(key).cloned() {
            self.touch(key.clone(), value.clone());
            Some(value)
        } else {
            None
        }
    }

    /// Inserts or overwrites `key`, evicting the least-recently-used entry
    /// if this insertion pushes the cache past capacity.
    pub fn put(&mut self, key: K, value: V) {
        self.touch(key, value);
        while self.map.len() > self.capacity {
            self.evict_oldest();
        }
    }

    pub fn clear(&mut self) {
        self.map.clear();
        self.order.clear();
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    fn touch(&mut self, key: K, value: V) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.map.insert(key.clone(), (value, seq));
        self.order.push_back((seq, key));
    }

    fn evict_oldest(&mut self) {
        while let Some((seq, candidate)) = self.order.pop_front() {
            // A stale occurrence's sequence number no longer matches the
            // one last recorded for that key in `map` — the key has been
            // touched again since, so this occurrence isn't the live one.
            let is_live = matches!(self.map.get(&candidate), Some((_, live_seq)) if *live_seq == seq);
            if is_live {
                self.map.remove(&candidate);
                break;
            }
        }
    }
}
