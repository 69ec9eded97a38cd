//! Compressed storage for the type names referenced by metadata tables.
//!
//! Fully-qualified type names share long namespace prefixes ("MyApp.Controls."),
//! so the pool stores each distinct namespace once and replaces it in a name with a
//! single escape byte. Three arrays make up a pool:
//!
//! - the namespace array: every shared namespace, NUL-terminated, back to back
//! - the name array: every name, NUL-terminated; bytes in `0x80..=0xFF` are escapes
//!   referencing a namespace, and a leading `0x01` marks a name stored as raw
//!   little-endian UTF-16 (used for non-ASCII names)
//! - the index array: maps an escape byte to its namespace's start offset
//!
//! Names are addressed by their byte offset in the name array. The two essential
//! queries, [`StringPool::stable_hash`] and [`StringPool::eq_str`], operate on the
//! compressed form directly without allocating the decoded string.
//!
//! Pools are produced by [`StringPoolBuilder`]; nothing mutates a built pool.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use crate::collections::FixedHashTable;

/// First byte value used as a namespace escape.
const ESCAPE_START: u8 = 0x80;
/// Leading byte marking a name stored as raw UTF-16.
const UNICODE_MARK: u8 = 0x01;
/// Seed of the stable hash.
const HASH_INIT: i32 = 5381;
/// At most this many namespaces fit in the escape byte range.
const MAX_NAMESPACES: usize = 0x80;

#[inline]
fn hash_accumulate(hash: i32, unit: u16) -> i32 {
    (hash << 5).wrapping_add(hash) ^ i32::from(unit)
}

/// Immutable compressed string storage.
pub struct StringPool {
    namespaces: Vec<u8>,
    names: Vec<u8>,
    indices: Vec<u16>,
}

impl StringPool {
    /// An empty pool.
    #[must_use]
    pub fn empty() -> StringPool {
        StringPool {
            namespaces: Vec::new(),
            names: Vec::new(),
            indices: Vec::new(),
        }
    }

    /// Stable hash of a string, identical to [`StringPool::stable_hash`] of its
    /// pooled form.
    ///
    /// A djb2 xor variant over UTF-16 code units, seeded with one NUL unit and
    /// masked to 31 bits.
    #[must_use]
    pub fn stable_hash_str(s: &str) -> i32 {
        let mut hash = hash_accumulate(HASH_INIT, 0);
        for unit in s.encode_utf16() {
            hash = hash_accumulate(hash, unit);
        }
        hash & 0x7FFF_FFFF
    }

    /// Stable hash of the pooled string at `name_idx`, without decoding it.
    #[must_use]
    pub fn stable_hash(&self, name_idx: u32) -> i32 {
        let mut hash = hash_accumulate(HASH_INIT, 0);
        for unit in self.code_units(name_idx) {
            hash = hash_accumulate(hash, unit);
        }
        hash & 0x7FFF_FFFF
    }

    /// Decodes the pooled string at `name_idx`.
    #[must_use]
    pub fn get(&self, name_idx: u32) -> String {
        char::decode_utf16(self.code_units(name_idx))
            .map(|unit| unit.unwrap_or(char::REPLACEMENT_CHARACTER))
            .collect()
    }

    /// Compares the pooled string at `name_idx` against `s` without decoding.
    #[must_use]
    pub fn eq_str(&self, name_idx: u32, s: &str) -> bool {
        self.code_units(name_idx).eq(s.encode_utf16())
    }

    fn code_units(&self, name_idx: u32) -> CodeUnits<'_> {
        let mut pos = name_idx as usize;
        let unicode = self.names.get(pos) == Some(&UNICODE_MARK);
        if unicode {
            pos += 1;
        }
        CodeUnits {
            pool: self,
            pos,
            unicode,
            ns_pos: None,
        }
    }
}

/// Iterator over the UTF-16 code units of one pooled string.
struct CodeUnits<'a> {
    pool: &'a StringPool,
    pos: usize,
    unicode: bool,
    /// Position inside the namespace array while expanding an escape.
    ns_pos: Option<usize>,
}

impl Iterator for CodeUnits<'_> {
    type Item = u16;

    fn next(&mut self) -> Option<u16> {
        loop {
            if let Some(ns) = self.ns_pos {
                let byte = self.pool.namespaces[ns];
                if byte != 0 {
                    self.ns_pos = Some(ns + 1);
                    return Some(u16::from(byte));
                }
                self.ns_pos = None;
            }

            if self.unicode {
                let lo = u16::from(self.pool.names[self.pos]);
                let hi = u16::from(self.pool.names[self.pos + 1]);
                let unit = lo | (hi << 8);
                if unit == 0 {
                    return None;
                }
                self.pos += 2;
                return Some(unit);
            }

            let byte = self.pool.names[self.pos];
            if byte == 0 {
                return None;
            }
            self.pos += 1;
            if byte >= ESCAPE_START {
                let start = self.pool.indices[(byte - ESCAPE_START) as usize];
                self.ns_pos = Some(start as usize);
                // Loop again: an escape expands to zero or more units.
            } else {
                return Some(u16::from(byte));
            }
        }
    }
}

/// Assembles a [`StringPool`], interning namespaces and deduplicating names.
///
/// # Examples
///
/// ```rust
/// use combridge::registry::StringPoolBuilder;
///
/// let mut builder = StringPoolBuilder::new();
/// let widget = builder.add("MyApp.Controls.Widget");
/// let panel = builder.add("MyApp.Controls.Panel");
/// let pool = builder.build();
///
/// assert_eq!(pool.get(widget), "MyApp.Controls.Widget");
/// assert!(pool.eq_str(panel, "MyApp.Controls.Panel"));
/// ```
#[derive(Default)]
pub struct StringPoolBuilder {
    namespaces: Vec<u8>,
    indices: Vec<u16>,
    names: Vec<u8>,
    namespace_escapes: HashMap<String, u8>,
    interned: HashMap<String, u32>,
}

impl StringPoolBuilder {
    /// An empty builder.
    #[must_use]
    pub fn new() -> StringPoolBuilder {
        StringPoolBuilder::default()
    }

    /// Adds `name` to the pool, returning its index. Repeated names share one
    /// entry.
    pub fn add(&mut self, name: &str) -> u32 {
        if let Some(&idx) = self.interned.get(name) {
            return idx;
        }

        let idx = u32::try_from(self.names.len()).unwrap_or_else(|_| {
            fail_fast!("string pool exceeded the addressable name range");
        });

        if name.is_ascii() && !name.bytes().any(|b| b == 0 || b == UNICODE_MARK) {
            self.encode_ascii(name);
        } else {
            self.encode_utf16(name);
        }

        self.interned.insert(name.to_string(), idx);
        idx
    }

    fn encode_ascii(&mut self, name: &str) {
        // Compress the namespace prefix up to and including the last dot.
        let remainder = match name.rfind('.') {
            Some(dot) if dot > 0 => {
                let (namespace, rest) = name.split_at(dot + 1);
                if let Some(escape) = self.intern_namespace(namespace) {
                    self.names.push(escape);
                    rest
                } else {
                    name
                }
            }
            _ => name,
        };
        self.names.extend_from_slice(remainder.as_bytes());
        self.names.push(0);
    }

    fn encode_utf16(&mut self, name: &str) {
        self.names.push(UNICODE_MARK);
        for unit in name.encode_utf16() {
            let [lo, hi] = unit.to_le_bytes();
            self.names.push(lo);
            self.names.push(hi);
        }
        self.names.push(0);
        self.names.push(0);
    }

    fn intern_namespace(&mut self, namespace: &str) -> Option<u8> {
        if let Some(&escape) = self.namespace_escapes.get(namespace) {
            return Some(escape);
        }
        if self.indices.len() >= MAX_NAMESPACES {
            return None;
        }
        let start = u16::try_from(self.namespaces.len()).ok()?;

        let escape = ESCAPE_START + self.indices.len() as u8;
        self.indices.push(start);
        self.namespaces.extend_from_slice(namespace.as_bytes());
        self.namespaces.push(0);
        self.namespace_escapes.insert(namespace.to_string(), escape);
        Some(escape)
    }

    /// Finishes the pool.
    #[must_use]
    pub fn build(self) -> StringPool {
        StringPool {
            namespaces: self.namespaces,
            names: self.names,
            indices: self.indices,
        }
    }
}

/// Name-to-index lookup over a slice of pooled strings.
///
/// Holds the name index of each payload entry, in payload order. [`StringMap::find`]
/// answers "which payload has this name" through a hash table that is built on first
/// use and published atomically, so concurrent first lookups are safe and later
/// lookups pay nothing.
pub struct StringMap {
    pool: Arc<StringPool>,
    name_indices: Vec<u32>,
    table: OnceLock<FixedHashTable>,
}

impl StringMap {
    /// Creates a map over `name_indices` into `pool`, in payload order.
    #[must_use]
    pub fn new(pool: Arc<StringPool>, name_indices: Vec<u32>) -> StringMap {
        StringMap {
            pool,
            name_indices,
            table: OnceLock::new(),
        }
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.name_indices.len()
    }

    /// Returns `true` if the map has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.name_indices.is_empty()
    }

    /// Decoded name of payload `index`.
    #[must_use]
    pub fn name_at(&self, index: usize) -> String {
        self.pool.get(self.name_indices[index])
    }

    /// Payload index whose name equals `name`, if any.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<usize> {
        if self.name_indices.is_empty() {
            return None;
        }

        let table = self.table.get_or_init(|| {
            let mut table = FixedHashTable::new(self.name_indices.len());
            for (i, &name_idx) in self.name_indices.iter().enumerate() {
                table.add(self.pool.stable_hash(name_idx), i);
            }
            table
        });

        let hash = StringPool::stable_hash_str(name);
        let mut slot = table.first(hash);
        while slot >= 0 {
            let payload = slot as usize;
            if self.pool.eq_str(self.name_indices[payload], name) {
                return Some(payload);
            }
            slot = table.next(slot);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool_with(names: &[&str]) -> (StringPool, Vec<u32>) {
        let mut builder = StringPoolBuilder::new();
        let indices = names.iter().map(|name| builder.add(name)).collect();
        (builder.build(), indices)
    }

    #[test]
    fn test_roundtrip_with_shared_namespace() {
        let names = [
            "MyApp.Controls.Widget",
            "MyApp.Controls.Panel",
            "MyApp.IWidget",
            "NoNamespace",
        ];
        let (pool, indices) = pool_with(&names);

        for (name, &idx) in names.iter().zip(&indices) {
            assert_eq!(pool.get(idx), *name);
            assert!(pool.eq_str(idx, name));
        }

        // Two names under one namespace share its bytes through the escape.
        assert!(pool.namespaces.len() < "MyApp.Controls.".len() * 2);
    }

    #[test]
    fn test_non_ascii_falls_back_to_utf16() {
        let (pool, indices) = pool_with(&["Café.Ünïcode", "Plain.Name"]);
        assert_eq!(pool.get(indices[0]), "Café.Ünïcode");
        assert_eq!(pool.get(indices[1]), "Plain.Name");
        assert!(pool.eq_str(indices[0], "Café.Ünïcode"));
        assert!(!pool.eq_str(indices[0], "Cafe.Unicode"));
    }

    #[test]
    fn test_duplicate_names_share_one_entry() {
        let mut builder = StringPoolBuilder::new();
        let first = builder.add("A.B");
        let second = builder.add("A.B");
        assert_eq!(first, second);
    }

    #[test]
    fn test_stable_hash_matches_between_forms() {
        let names = ["MyApp.Controls.Widget", "x", "", "Café.Ünïcode"];
        let (pool, indices) = pool_with(&names);
        for (name, &idx) in names.iter().zip(&indices) {
            assert_eq!(pool.stable_hash(idx), StringPool::stable_hash_str(name));
        }
    }

    #[test]
    fn test_empty_string_hash_reflects_the_seed() {
        // The seeded NUL makes "" hash to something other than the raw init value.
        assert_ne!(StringPool::stable_hash_str(""), HASH_INIT & 0x7FFF_FFFF);
        let (pool, indices) = pool_with(&[""]);
        assert_eq!(pool.get(indices[0]), "");
    }

    #[test]
    fn test_string_map_find() {
        let names = [
            "MyApp.Controls.Widget",
            "MyApp.Controls.Panel",
            "Other.Thing",
        ];
        let mut builder = StringPoolBuilder::new();
        let indices: Vec<u32> = names.iter().map(|name| builder.add(name)).collect();
        let map = StringMap::new(Arc::new(builder.build()), indices);

        assert_eq!(map.find("MyApp.Controls.Panel"), Some(1));
        assert_eq!(map.find("Other.Thing"), Some(2));
        assert_eq!(map.find("MyApp.Controls.Missing"), None);
        assert_eq!(map.name_at(0), "MyApp.Controls.Widget");
    }

    #[test]
    fn test_string_map_empty() {
        let map = StringMap::new(Arc::new(StringPool::empty()), Vec::new());
        assert!(map.is_empty());
        assert_eq!(map.find("anything"), None);
    }
}
