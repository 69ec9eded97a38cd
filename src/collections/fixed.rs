//! Fixed-size hash table for tool-generated static lookup tables.
//!
//! Module metadata tables (interface GUIDs, compressed name maps) are immutable after
//! load, so their reverse-lookup index never grows and never removes. This table is
//! sized once at construction and stores nothing but chain links in one flat `i32`
//! array to minimize footprint: per-entry hashes are not kept, so a chain walk can
//! yield entries from other hashes and the caller is expected to compare the payload
//! (a GUID, a pooled string) itself.
//!
//! Entries are added in payload order: the `index` passed to [`FixedHashTable::add`]
//! is both the payload returned by [`FixedHashTable::first`]/[`FixedHashTable::next`]
//! and the entry's own slot in the link array.

use crate::collections::primes;

/// Minimum bucket count, applied to very small tables.
const MIN_BUCKETS: usize = 11;

/// Fixed-size open-chaining index over an external payload array.
///
/// # Examples
///
/// ```rust
/// use combridge::collections::FixedHashTable;
///
/// let payloads = ["alpha", "beta", "gamma"];
/// let mut table = FixedHashTable::new(payloads.len());
/// for (i, name) in payloads.iter().enumerate() {
///     table.add(name.len() as i32, i);
/// }
///
/// let mut slot = table.first(5); // len("alpha") == len("gamma") == 5
/// let mut seen = Vec::new();
/// while slot >= 0 {
///     seen.push(payloads[slot as usize]);
///     slot = table.next(slot);
/// }
/// assert!(seen.contains(&"alpha") && seen.contains(&"gamma"));
/// ```
pub struct FixedHashTable {
    /// `[0 .. buckets)` are bucket heads, `[buckets .. buckets + capacity)` are
    /// per-entry next links. -1 terminates a chain.
    table: Vec<i32>,
    buckets: usize,
    added: usize,
}

impl FixedHashTable {
    /// Creates a table for exactly `size` payload entries.
    ///
    /// The bucket count is the first supported prime at or above `size * 1.1`
    /// (minimum 11), keeping roughly 10% of buckets free to bound chain length.
    #[must_use]
    pub fn new(size: usize) -> Self {
        let desired = (size + size / 10).max(MIN_BUCKETS);
        let buckets = primes::get_prime(desired).unwrap_or(primes::MAX_PRIME_ARRAY_LENGTH);

        FixedHashTable {
            table: vec![-1; buckets + size],
            buckets,
            added: 0,
        }
    }

    /// Number of payload entries this table was sized for.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.table.len() - self.buckets
    }

    /// Links payload `index` into the chain for `hash`.
    ///
    /// Entries must be added in ascending payload order (`index` equals the number
    /// of entries added so far).
    ///
    /// # Panics
    ///
    /// Panics if entries are added out of order or past the construction size.
    pub fn add(&mut self, hash: i32, index: usize) {
        assert_eq!(index, self.added, "entries must be added in payload order");
        assert!(index < self.capacity(), "table is full");

        let bucket = (hash as u32 as usize) % self.buckets;
        self.table[self.buckets + index] = self.table[bucket];
        self.table[bucket] = index as i32;
        self.added += 1;
    }

    /// Head payload index of the chain for `hash`, or -1 if the bucket is empty.
    #[must_use]
    pub fn first(&self, hash: i32) -> i32 {
        self.table[(hash as u32 as usize) % self.buckets]
    }

    /// Payload index following `slot` in its chain, or -1 at the end.
    #[must_use]
    pub fn next(&self, slot: i32) -> i32 {
        self.table[self.buckets + slot as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain(table: &FixedHashTable, hash: i32) -> Vec<i32> {
        let mut out = Vec::new();
        let mut slot = table.first(hash);
        while slot >= 0 {
            out.push(slot);
            slot = table.next(slot);
        }
        out
    }

    #[test]
    fn test_add_and_find() {
        let mut table = FixedHashTable::new(4);
        table.add(100, 0);
        table.add(200, 1);
        table.add(100, 2);
        table.add(300, 3);

        let found = chain(&table, 100);
        assert!(found.contains(&0));
        assert!(found.contains(&2));
    }

    #[test]
    fn test_missing_hash_yields_empty_chain() {
        let mut table = FixedHashTable::new(2);
        table.add(1, 0);
        table.add(2, 1);
        // A hash landing in an unused bucket walks nothing.
        assert!(chain(&table, 7).is_empty());
    }

    #[test]
    fn test_minimum_bucket_count() {
        let table = FixedHashTable::new(1);
        assert!(table.buckets >= MIN_BUCKETS);
        assert_eq!(table.capacity(), 1);
    }

    #[test]
    fn test_ten_percent_headroom() {
        let table = FixedHashTable::new(100);
        assert!(table.buckets >= 110);
    }

    #[test]
    #[should_panic(expected = "payload order")]
    fn test_out_of_order_add_panics() {
        let mut table = FixedHashTable::new(3);
        table.add(1, 1);
    }

    #[test]
    fn test_full_occupancy_roundtrip() {
        let size = 64;
        let mut table = FixedHashTable::new(size);
        for i in 0..size {
            table.add((i % 7) as i32, i);
        }
        for i in 0..size {
            assert!(
                chain(&table, (i % 7) as i32).contains(&(i as i32)),
                "entry {i} must be reachable through its hash chain"
            );
        }
    }
}
