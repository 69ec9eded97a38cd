//! Open-chaining dictionary with explicit control over memory layout.
//!
//! This is the workhorse map behind the interop identity caches. It differs from
//! `std::collections::HashMap` in ways the hot paths rely on:
//!
//! - **Struct-of-arrays layout**: chain metadata, keys and values live in three
//!   parallel arrays, no per-entry allocation.
//! - **External hash codes**: callers that already computed (or persisted) a hash
//!   can pass it in, so chain traversal never re-hashes the key.
//! - **Slot enumeration**: entries are addressable by index, which the leak
//!   diagnostics use to walk the cache without holding its lock per element.
//! - **Eager value clearing**: removal clears the key/value slots immediately so a
//!   tombstoned entry does not keep a held object alive until slot reuse.
//!
//! Bucket heads are stored inside the entry array itself (entry `hash % len` holds
//! the head of that bucket's chain), and removed slots are linked into a free list
//! through their `next` field for reuse before the table grows.

use std::hash::{BuildHasher, Hash, RandomState};

use crate::collections::primes;
use crate::{Error, Result};

/// Chain metadata for one slot. `hash == -1` marks a free (tombstoned) slot.
#[derive(Clone, Copy)]
struct Entry {
    hash: i32,
    next: i32,
    bucket: i32,
}

const EMPTY: Entry = Entry {
    hash: -1,
    next: -1,
    bucket: -1,
};

/// Mask a hash down to 31 bits so `-1` stays a safe sentinel in stored hashes.
#[inline]
#[must_use]
pub fn mask_hash(hash: u64) -> i32 {
    (hash & 0x7FFF_FFFF) as i32
}

/// Open-chaining hash map with struct-of-arrays layout and external-hash support.
///
/// # Examples
///
/// ```rust
/// use combridge::collections::Dictionary;
///
/// let mut map: Dictionary<&str, u32> = Dictionary::new();
/// map.insert("identity", 1).unwrap();
/// assert_eq!(map.get(&"identity"), Some(&1));
/// assert!(map.remove(&"identity"));
/// assert_eq!(map.get(&"identity"), None);
/// ```
pub struct Dictionary<K, V> {
    entries: Vec<Entry>,
    keys: Vec<Option<K>>,
    values: Vec<Option<V>>,
    count: usize,
    free_list: i32,
    free_count: usize,
    hasher: RandomState,
}

impl<K, V> Default for Dictionary<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> Dictionary<K, V> {
    /// Creates an empty dictionary. No allocation happens until the first insert.
    #[must_use]
    pub fn new() -> Self {
        Dictionary {
            entries: Vec::new(),
            keys: Vec::new(),
            values: Vec::new(),
            count: 0,
            free_list: -1,
            free_count: 0,
            hasher: RandomState::new(),
        }
    }

    /// Creates a dictionary pre-sized for at least `capacity` live entries.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let mut map = Self::new();
        if capacity > 0 {
            map.initialize(capacity);
        }
        map
    }

    /// Number of live entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.count - self.free_count
    }

    /// Returns `true` if the dictionary holds no live entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total slot count, including tombstoned slots.
    ///
    /// Valid indices for [`Dictionary::value_at`]/[`Dictionary::key_at`] are
    /// `0..max_count()`; slots in that range may be free.
    #[must_use]
    pub fn max_count(&self) -> usize {
        self.count
    }

    /// Returns the value in slot `index` if the slot is live.
    #[must_use]
    pub fn value_at(&self, index: usize) -> Option<&V> {
        if index < self.count && self.entries[index].hash >= 0 {
            self.values[index].as_ref()
        } else {
            None
        }
    }

    /// Returns the key in slot `index` if the slot is live.
    #[must_use]
    pub fn key_at(&self, index: usize) -> Option<&K> {
        if index < self.count && self.entries[index].hash >= 0 {
            self.keys[index].as_ref()
        } else {
            None
        }
    }

    /// Iterates live `(key, value)` pairs in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.entries[..self.count]
            .iter()
            .enumerate()
            .filter(|(_, e)| e.hash >= 0)
            .map(|(i, _)| {
                (
                    self.keys[i].as_ref().expect("live slot has key"),
                    self.values[i].as_ref().expect("live slot has value"),
                )
            })
    }

    fn initialize(&mut self, capacity: usize) {
        let size = primes::get_prime(capacity).unwrap_or(primes::MAX_PRIME_ARRAY_LENGTH);
        self.entries = vec![EMPTY; size];
        self.keys = (0..size).map(|_| None).collect();
        self.values = (0..size).map(|_| None).collect();
    }

    #[inline]
    fn bucket_index(&self, hash: i32) -> usize {
        // Unsigned modulo; hash is already 31-bit so the cast is value-preserving.
        (hash as u32 as usize) % self.entries.len()
    }
}

impl<K: Hash + Eq, V> Dictionary<K, V> {
    #[inline]
    fn hash_of(&self, key: &K) -> i32 {
        mask_hash(self.hasher.hash_one(key))
    }

    /// Inserts `key -> value`, failing if the key is already present.
    ///
    /// # Errors
    ///
    /// [`Error::DuplicateKey`] if an equal key is already stored.
    pub fn insert(&mut self, key: K, value: V) -> Result<()> {
        let hash = self.hash_of(&key);
        self.insert_with_hash(key, value, hash)
    }

    /// Inserts with a caller-provided hash code (masked to 31 bits internally).
    ///
    /// The same hash must be used for every operation on this key.
    ///
    /// # Errors
    ///
    /// [`Error::DuplicateKey`] if an equal key is already stored.
    pub fn insert_with_hash(&mut self, key: K, value: V, hash: i32) -> Result<()> {
        if !self.insert_core(key, value, hash & 0x7FFF_FFFF, true) {
            return Err(Error::DuplicateKey);
        }
        Ok(())
    }

    /// Inserts or overwrites `key -> value`.
    pub fn set(&mut self, key: K, value: V) {
        let hash = self.hash_of(&key);
        self.insert_core(key, value, hash, false);
    }

    fn insert_core(&mut self, key: K, value: V, hash: i32, add_only: bool) -> bool {
        if self.entries.is_empty() {
            self.initialize(0);
        }

        let mut target_bucket = self.bucket_index(hash);

        let mut i = self.entries[target_bucket].bucket;
        while i >= 0 {
            let slot = i as usize;
            if self.entries[slot].hash == hash && self.keys[slot].as_ref() == Some(&key) {
                if add_only {
                    return false;
                }
                self.values[slot] = Some(value);
                return true;
            }
            i = self.entries[slot].next;
        }

        let index = if self.free_count > 0 {
            let index = self.free_list as usize;
            self.free_list = self.entries[index].next;
            self.free_count -= 1;
            index
        } else {
            if self.count == self.entries.len() {
                self.resize();
                target_bucket = self.bucket_index(hash);
            }
            let index = self.count;
            self.count += 1;
            index
        };

        self.entries[index].hash = hash;
        self.entries[index].next = self.entries[target_bucket].bucket;
        self.keys[index] = Some(key);
        self.values[index] = Some(value);
        self.entries[target_bucket].bucket = index as i32;

        true
    }

    fn resize(&mut self) {
        let new_size = primes::expand_prime(self.count).unwrap_or_else(|_| {
            fail_fast!("interop dictionary exceeded the maximum supported size");
        });

        let mut new_entries = vec![EMPTY; new_size];
        for (i, entry) in self.entries.iter().enumerate() {
            new_entries[i].hash = entry.hash;
        }

        self.keys.resize_with(new_size, || None);
        self.values.resize_with(new_size, || None);

        // Rebuild every chain against the new bucket count.
        for i in 0..self.count {
            if new_entries[i].hash >= 0 {
                let bucket = (new_entries[i].hash as u32 as usize) % new_size;
                new_entries[i].next = new_entries[bucket].bucket;
                new_entries[bucket].bucket = i as i32;
            }
        }

        self.entries = new_entries;
    }

    fn find_entry(&self, key: &K, hash: i32) -> i32 {
        if !self.entries.is_empty() {
            let hash = hash & 0x7FFF_FFFF;
            let mut i = self.entries[self.bucket_index(hash)].bucket;
            while i >= 0 {
                let slot = i as usize;
                if self.entries[slot].hash == hash && self.keys[slot].as_ref() == Some(key) {
                    return i;
                }
                i = self.entries[slot].next;
            }
        }
        -1
    }

    /// Looks up `key`, hashing it with the dictionary's hasher.
    #[must_use]
    pub fn get(&self, key: &K) -> Option<&V> {
        let hash = self.hash_of(key);
        self.get_with_hash(key, hash)
    }

    /// Looks up `key` using a caller-provided hash code.
    #[must_use]
    pub fn get_with_hash(&self, key: &K, hash: i32) -> Option<&V> {
        let i = self.find_entry(key, hash);
        if i >= 0 {
            self.values[i as usize].as_ref()
        } else {
            None
        }
    }

    /// Returns `true` if an equal key is stored.
    #[must_use]
    pub fn contains_key(&self, key: &K) -> bool {
        self.find_entry(key, self.hash_of(key)) >= 0
    }

    /// Removes `key`, returning `true` if it was present.
    pub fn remove(&mut self, key: &K) -> bool {
        let hash = self.hash_of(key);
        self.remove_with_hash(key, hash)
    }

    /// Removes `key` using a caller-provided hash code.
    ///
    /// The removed slot is tombstoned, pushed on the free list, and its key/value
    /// are dropped immediately rather than lingering until slot reuse.
    pub fn remove_with_hash(&mut self, key: &K, hash: i32) -> bool {
        if self.entries.is_empty() {
            return false;
        }

        let hash = hash & 0x7FFF_FFFF;
        let bucket = self.bucket_index(hash);
        let mut last: i32 = -1;
        let mut i = self.entries[bucket].bucket;

        while i >= 0 {
            let slot = i as usize;
            if self.entries[slot].hash == hash && self.keys[slot].as_ref() == Some(key) {
                if last < 0 {
                    self.entries[bucket].bucket = self.entries[slot].next;
                } else {
                    self.entries[last as usize].next = self.entries[slot].next;
                }

                self.entries[slot].hash = -1;
                self.entries[slot].next = self.free_list;
                self.keys[slot] = None;
                self.values[slot] = None;
                self.free_list = i;
                self.free_count += 1;

                return true;
            }
            last = i;
            i = self.entries[slot].next;
        }

        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_get_remove_roundtrip() {
        let mut map: Dictionary<String, u32> = Dictionary::new();
        map.insert("a".to_string(), 1).unwrap();
        map.insert("b".to_string(), 2).unwrap();

        assert_eq!(map.get(&"a".to_string()), Some(&1));
        assert_eq!(map.get(&"b".to_string()), Some(&2));
        assert_eq!(map.len(), 2);

        assert!(map.remove(&"a".to_string()));
        assert_eq!(map.get(&"a".to_string()), None);
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_duplicate_key_rejected() {
        let mut map: Dictionary<u32, u32> = Dictionary::new();
        map.insert(7, 1).unwrap();
        assert!(matches!(map.insert(7, 2), Err(Error::DuplicateKey)));
        assert_eq!(map.get(&7), Some(&1));
    }

    #[test]
    fn test_set_overwrites() {
        let mut map: Dictionary<u32, u32> = Dictionary::new();
        map.set(7, 1);
        map.set(7, 2);
        assert_eq!(map.get(&7), Some(&2));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_external_hash_roundtrip() {
        let mut map: Dictionary<u64, &str> = Dictionary::new();
        let hash = 0x1234_5678;
        map.insert_with_hash(42, "x", hash).unwrap();

        assert_eq!(map.get_with_hash(&42, hash), Some(&"x"));
        assert!(map.remove_with_hash(&42, hash));
        assert_eq!(map.get_with_hash(&42, hash), None);
    }

    #[test]
    fn test_free_slot_reuse() {
        let mut map: Dictionary<u32, u32> = Dictionary::new();
        for i in 0..8 {
            map.insert(i, i).unwrap();
        }
        let before = map.max_count();

        map.remove(&3);
        map.insert(100, 100).unwrap();

        // The tombstoned slot is reused instead of growing the slot range.
        assert_eq!(map.max_count(), before);
        assert_eq!(map.get(&100), Some(&100));
    }

    #[test]
    fn test_growth_keeps_entries_reachable() {
        let mut map: Dictionary<u32, u32> = Dictionary::new();
        for i in 0..1000 {
            map.insert(i, i * 2).unwrap();
        }
        for i in 0..1000 {
            assert_eq!(map.get(&i), Some(&(i * 2)));
        }
        assert_eq!(map.len(), 1000);
    }

    #[test]
    fn test_removed_value_is_dropped_eagerly() {
        use std::sync::Arc;

        let mut map: Dictionary<u32, Arc<()>> = Dictionary::new();
        let value = Arc::new(());
        map.insert(1, Arc::clone(&value)).unwrap();
        assert_eq!(Arc::strong_count(&value), 2);

        map.remove(&1);
        assert_eq!(Arc::strong_count(&value), 1);
    }

    #[test]
    fn test_slot_enumeration_skips_tombstones() {
        let mut map: Dictionary<u32, u32> = Dictionary::new();
        map.insert(1, 10).unwrap();
        map.insert(2, 20).unwrap();
        map.remove(&1);

        let live: Vec<u32> = (0..map.max_count())
            .filter_map(|i| map.value_at(i).copied())
            .collect();
        assert_eq!(live, vec![20]);
    }

    #[test]
    fn test_colliding_hashes_chain() {
        let mut map: Dictionary<u32, u32> = Dictionary::new();
        // Same external hash, different keys: all land in one chain.
        for key in 0..16 {
            map.insert_with_hash(key, key + 100, 5).unwrap();
        }
        for key in 0..16 {
            assert_eq!(map.get_with_hash(&key, 5), Some(&(key + 100)));
        }
        assert!(map.remove_with_hash(&7, 5));
        assert_eq!(map.get_with_hash(&7, 5), None);
        assert_eq!(map.get_with_hash(&8, 5), Some(&108));
    }
}
