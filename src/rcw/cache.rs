//! The identity cache enforcing at most one live wrapper per native object.

use std::sync::{Arc, Mutex, OnceLock, Weak};

use tracing::trace;

use crate::collections::Dictionary;
use crate::com::NativePtr;
use crate::rcw::comobject::ComObject;

/// Identity pointer to wrapper map.
///
/// Holds weak references: the cache never keeps a wrapper alive, it only answers
/// "is there already a live wrapper for this identity". Entries whose wrapper has
/// died are reused in place on the next [`ComObjectCache::add`] for the same
/// identity; [`ComObjectCache::remove`] only removes the entry if it still refers
/// to the wrapper being removed, so a dead entry can never evict its successor.
pub struct ComObjectCache {
    map: Mutex<Dictionary<usize, Weak<ComObject>>>,
}

impl Default for ComObjectCache {
    fn default() -> Self {
        ComObjectCache::new()
    }
}

impl ComObjectCache {
    /// An empty cache.
    #[must_use]
    pub fn new() -> ComObjectCache {
        ComObjectCache {
            map: Mutex::new(Dictionary::new()),
        }
    }

    /// The process-wide cache, shared with the marshalling facade.
    #[must_use]
    pub fn global() -> &'static ComObjectCache {
        static GLOBAL: OnceLock<ComObjectCache> = OnceLock::new();
        GLOBAL.get_or_init(ComObjectCache::new)
    }

    /// Inserts `wrapper` under its identity.
    ///
    /// Returns `false` without inserting when a *live* wrapper is already cached
    /// for the identity; a dead entry is replaced in place.
    pub fn add(&self, wrapper: &Arc<ComObject>) -> bool {
        let key = wrapper.identity().addr();
        let mut map = self.map.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(existing) = map.get(&key) {
            if existing.strong_count() > 0 {
                trace!(identity = %format_args!("{key:#x}"), "identity already has a live wrapper");
                return false;
            }
        }
        map.set(key, Arc::downgrade(wrapper));
        true
    }

    /// Live wrapper for `identity`, if one is cached.
    #[must_use]
    pub fn lookup(&self, identity: NativePtr) -> Option<Arc<ComObject>> {
        let map = self.map.lock().unwrap_or_else(|e| e.into_inner());
        map.get(&identity.addr()).and_then(Weak::upgrade)
    }

    /// Removes the entry for `wrapper`, but only if the entry still refers to it.
    ///
    /// Returns `true` if an entry was removed. Identity addresses can be reused
    /// by the native heap once an object is gone, so a stale removal must never
    /// take out the entry of a newer wrapper that inherited the address.
    pub fn remove(&self, wrapper: &ComObject) -> bool {
        let key = wrapper.identity().addr();
        let mut map = self.map.lock().unwrap_or_else(|e| e.into_inner());

        let matches = map
            .get(&key)
            .is_some_and(|weak| std::ptr::eq(weak.as_ptr(), wrapper));
        if matches {
            map.remove(&key);
        }
        matches
    }

    /// Number of cache entries, dead ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Returns `true` if the cache has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All live wrappers currently cached. Used by leak diagnostics.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Arc<ComObject>> {
        let map = self.map.lock().unwrap_or_else(|e| e.into_inner());
        let mut live = Vec::new();
        for slot in 0..map.max_count() {
            if let Some(wrapper) = map.value_at(slot).and_then(Weak::upgrade) {
                live.push(wrapper);
            }
        }
        live
    }
}
