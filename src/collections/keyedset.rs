//! Hash set with hash-code-driven chain walking.
//!
//! The CCW lookup map stores raw wrapper keys whose "equality" cannot be decided by
//! the key alone: the caller must dereference each candidate and compare target
//! identity under its own rules (a candidate may be mid-teardown). So instead of a
//! `contains`-style API this set exposes the bucket chain itself:
//! [`KeyedSet::find_first`] / [`KeyedSet::find_next`] return entry indices whose
//! stored hash matches, and the caller inspects [`KeyedSet::key_at`] for each one.
//!
//! Layout and free-list behavior match [`crate::collections::Dictionary`].

use crate::collections::primes;
use crate::{Error, Result};

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

/// Open-chaining hash set keyed by caller-provided 31-bit hash codes.
///
/// # Examples
///
/// ```rust
/// use combridge::collections::KeyedSet;
///
/// let mut set: KeyedSet<&str> = KeyedSet::with_capacity(11);
/// set.add("x", 0x55).unwrap();
/// assert!(set.contains(&"x", 0x55));
/// assert!(set.remove(&"x", 0x55));
/// assert!(!set.contains(&"x", 0x55));
/// ```
pub struct KeyedSet<K> {
    entries: Vec<Entry>,
    keys: Vec<Option<K>>,
    count: usize,
    free_list: i32,
    free_count: usize,
}

impl<K> KeyedSet<K> {
    /// Creates a set pre-sized for at least `capacity` entries.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let size = primes::get_prime(capacity).unwrap_or(primes::MAX_PRIME_ARRAY_LENGTH);
        KeyedSet {
            entries: vec![EMPTY; size],
            keys: (0..size).map(|_| None).collect(),
            count: 0,
            free_list: -1,
            free_count: 0,
        }
    }

    /// Number of live entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.count - self.free_count
    }

    /// Returns `true` if the set holds no live entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    fn bucket_index(&self, hash: i32) -> usize {
        (hash as u32 as usize) % self.entries.len()
    }

    /// First entry index in the chain for `hash` whose stored hash matches, or -1.
    #[must_use]
    pub fn find_first(&self, hash: i32) -> i32 {
        let hash = hash & 0x7FFF_FFFF;
        let mut i = self.entries[self.bucket_index(hash)].bucket;
        while i >= 0 {
            if self.entries[i as usize].hash == hash {
                return i;
            }
            i = self.entries[i as usize].next;
        }
        -1
    }

    /// Next entry after `entry` in the same chain with the same hash, or -1.
    #[must_use]
    pub fn find_next(&self, entry: i32) -> i32 {
        let hash = self.entries[entry as usize].hash;
        let mut i = self.entries[entry as usize].next;
        while i >= 0 {
            if self.entries[i as usize].hash == hash {
                return i;
            }
            i = self.entries[i as usize].next;
        }
        -1
    }

    /// Key stored at `entry`, if the slot is live.
    #[must_use]
    pub fn key_at(&self, entry: i32) -> Option<&K> {
        let slot = usize::try_from(entry).ok()?;
        if slot < self.count && self.entries[slot].hash >= 0 {
            self.keys[slot].as_ref()
        } else {
            None
        }
    }

    fn resize(&mut self) {
        let new_size = primes::expand_prime(self.count).unwrap_or_else(|_| {
            fail_fast!("interop lookup set exceeded the maximum supported size");
        });

        let mut new_entries = vec![EMPTY; new_size];
        for (i, entry) in self.entries.iter().enumerate() {
            new_entries[i].hash = entry.hash;
        }
        self.keys.resize_with(new_size, || None);

        for i in 0..self.count {
            if new_entries[i].hash >= 0 {
                let bucket = (new_entries[i].hash as u32 as usize) % new_size;
                new_entries[i].next = new_entries[bucket].bucket;
                new_entries[bucket].bucket = i as i32;
            }
        }

        self.entries = new_entries;
    }
}

impl<K: Eq> KeyedSet<K> {
    /// Adds `key` under `hash`.
    ///
    /// # Errors
    ///
    /// [`Error::DuplicateKey`] if an equal key with the same hash is already present.
    pub fn add(&mut self, key: K, hash: i32) -> Result<()> {
        let hash = hash & 0x7FFF_FFFF;
        let mut target_bucket = self.bucket_index(hash);

        let mut i = self.entries[target_bucket].bucket;
        while i >= 0 {
            let slot = i as usize;
            if self.entries[slot].hash == hash && self.keys[slot].as_ref() == Some(&key) {
                return Err(Error::DuplicateKey);
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
        self.entries[target_bucket].bucket = index as i32;

        Ok(())
    }

    /// Returns `true` if an equal key with the same hash is present.
    #[must_use]
    pub fn contains(&self, key: &K, hash: i32) -> bool {
        let mut entry = self.find_first(hash & 0x7FFF_FFFF);
        while entry >= 0 {
            if self.keys[entry as usize].as_ref() == Some(key) {
                return true;
            }
            entry = self.find_next(entry);
        }
        false
    }

    /// Removes `key` under `hash`, returning `true` if it was present.
    pub fn remove(&mut self, key: &K, hash: i32) -> bool {
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
