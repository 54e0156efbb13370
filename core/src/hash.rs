//! Case-insensitive hash table used for every name-keyed registry.
//!
//! Keys hash through a per-table randomized Pearson substitution table
//! over the ASCII-uppercased key bytes, into a fixed array of 256
//! buckets. Duplicate keys are allowed: the newest insertion shadows
//! older ones, and removal uncovers them in reverse insertion order.

use std::fmt;

use rand::seq::SliceRandom;

use crate::{Error, Result};

const NUM_BUCKETS: usize = 256;

struct Entry<V> {
    key: String,
    value: V,
}

/// Fixed-bucket hash table with case-insensitive string keys.
pub struct HashTable<V> {
    buckets: Vec<Vec<Entry<V>>>,
    perm: [u8; 256],
    len: usize,
    capacity: usize,
}

fn fold(key: &str) -> String {
    key.to_ascii_uppercase()
}

impl<V> HashTable<V> {
    /// Creates a table holding at most `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        let mut perm: [u8; 256] = std::array::from_fn(|i| i as u8);
        perm.shuffle(&mut rand::thread_rng());
        let mut buckets = Vec::with_capacity(NUM_BUCKETS);
        for _ in 0..NUM_BUCKETS {
            buckets.push(Vec::new());
        }
        Self {
            buckets,
            perm,
            len: 0,
            capacity,
        }
    }

    fn bucket_index(&self, key: &str) -> usize {
        let mut h: u8 = 0;
        for b in key.bytes() {
            h = self.perm[(h ^ b.to_ascii_uppercase()) as usize];
        }
        h as usize
    }

    /// Inserts a value under `key`. An existing entry with the same key
    /// is shadowed, not replaced.
    pub fn insert(&mut self, key: &str, value: V) -> Result<()> {
        if self.len >= self.capacity {
            return Err(Error::CapacityExceeded("hash table full"));
        }
        let idx = self.bucket_index(key);
        self.buckets[idx].push(Entry {
            key: fold(key),
            value,
        });
        self.len += 1;
        Ok(())
    }

    /// Looks up the newest entry for `key`.
    pub fn lookup(&self, key: &str) -> Option<&V> {
        let folded = fold(key);
        self.buckets[self.bucket_index(key)]
            .iter()
            .rev()
            .find(|e| e.key == folded)
            .map(|e| &e.value)
    }

    /// Mutable lookup of the newest entry for `key`.
    pub fn lookup_mut(&mut self, key: &str) -> Option<&mut V> {
        let folded = fold(key);
        let idx = self.bucket_index(key);
        self.buckets[idx]
            .iter_mut()
            .rev()
            .find(|e| e.key == folded)
            .map(|e| &mut e.value)
    }

    /// Removes and returns the newest entry for `key`, uncovering any
    /// shadowed older entry.
    pub fn remove(&mut self, key: &str) -> Option<V> {
        let folded = fold(key);
        let idx = self.bucket_index(key);
        let pos = self.buckets[idx].iter().rposition(|e| e.key == folded)?;
        let entry = self.buckets[idx].remove(pos);
        self.len -= 1;
        Some(entry.value)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.lookup(key).is_some()
    }

    /// Snapshot of all keys (case-folded). Safe to iterate while the
    /// table is mutated afterwards.
    pub fn keys(&self) -> Vec<String> {
        self.buckets
            .iter()
            .flatten()
            .map(|e| e.key.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Panics with `what` if the table still holds entries. Teardown
    /// paths use this to catch index leaks.
    pub fn assert_empty(&self, what: &str) {
        if self.len != 0 {
            panic!("{} table not empty at teardown ({} left)", what, self.len);
        }
    }
}

impl<V: Clone> HashTable<V> {
    /// Snapshot of all values, in bucket order.
    pub fn values(&self) -> Vec<V> {
        self.buckets
            .iter()
            .flatten()
            .map(|e| e.value.clone())
            .collect()
    }
}

impl<V> fmt::Debug for HashTable<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HashTable")
            .field("len", &self.len)
            .field("capacity", &self.capacity)
            .finish()
    }
}
