//! The lookup map enforcing one wrapper per managed object.

use std::sync::{Arc, Mutex, OnceLock};

use tracing::trace;

use crate::ccw::object::{ComCallableObject, ManagedObject};
use crate::collections::{mask_hash, KeyedSet};
use crate::com::NativePtr;
use crate::rcw::ComObject;
use crate::registry::ModuleRegistry;

/// Map entry; equality is wrapper identity.
struct CcwEntry(Arc<ComCallableObject>);

impl PartialEq for CcwEntry {
    fn eq(&self, other: &CcwEntry) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for CcwEntry {}

/// Managed-identity to wrapper map.
///
/// Keys are the address of the target's allocation, hashed into a
/// [`KeyedSet`]; the set only narrows by hash, and this map applies the real
/// identity rule per candidate: same target allocation *and* target still alive.
/// The map owns its wrappers, which keeps every handed-out shim pointer valid
/// for as long as the entry exists.
///
/// An entry outlives native interest in it: a wrapper whose reference count
/// dropped to zero stays mapped while its target is alive, so marshalling the
/// same object out again revives the same wrapper (and the same shim pointers).
/// Entries whose target died are purged lazily during later operations.
pub struct CcwLookupMap {
    registry: Arc<ModuleRegistry>,
    entries: Mutex<KeyedSet<CcwEntry>>,
}

impl CcwLookupMap {
    /// An empty map resolving metadata through `registry`.
    #[must_use]
    pub fn new(registry: Arc<ModuleRegistry>) -> CcwLookupMap {
        CcwLookupMap {
            registry,
            entries: Mutex::new(KeyedSet::with_capacity(16)),
        }
    }

    /// The process-wide map, bound to the global registry.
    #[must_use]
    pub fn global() -> &'static CcwLookupMap {
        static GLOBAL: OnceLock<CcwLookupMap> = OnceLock::new();
        GLOBAL.get_or_init(|| CcwLookupMap::new(ModuleRegistry::global()))
    }

    fn key_of(target: &Arc<dyn ManagedObject>) -> usize {
        Arc::as_ptr(target) as *const () as usize
    }

    /// The wrapper for `target`, creating it if none exists.
    ///
    /// Find-or-create is atomic under the map lock: concurrent callers for one
    /// target get the same wrapper.
    #[must_use]
    pub fn get_or_create(&self, target: &Arc<dyn ManagedObject>) -> Arc<ComCallableObject> {
        self.get_or_create_with_inner(target, None)
    }

    /// Like [`CcwLookupMap::get_or_create`], but a newly created wrapper
    /// aggregates `inner` as its native base.
    ///
    /// `inner` is ignored when the wrapper already exists; aggregation is fixed
    /// at wrapper construction.
    #[must_use]
    pub fn get_or_create_with_inner(
        &self,
        target: &Arc<dyn ManagedObject>,
        inner: Option<Arc<ComObject>>,
    ) -> Arc<ComCallableObject> {
        let key = Self::key_of(target);
        let hash = mask_hash(key as u64);
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());

        let mut dead: Vec<(Arc<ComCallableObject>, usize)> = Vec::new();
        let mut slot = entries.find_first(hash);
        while slot >= 0 {
            if let Some(entry) = entries.key_at(slot) {
                if entry.0.target_key() == key && entry.0.target().is_some() {
                    return Arc::clone(&entry.0);
                }
                if entry.0.target().is_none() && entry.0.ref_count() == 0 {
                    dead.push((Arc::clone(&entry.0), entry.0.target_key()));
                }
            }
            slot = entries.find_next(slot);
        }

        for (wrapper, dead_key) in dead {
            entries.remove(&CcwEntry(wrapper), mask_hash(dead_key as u64));
            trace!("purged wrapper for dead target");
        }

        let wrapper = ComCallableObject::new(Arc::clone(&self.registry), target, inner);
        // DuplicateKey cannot happen for a freshly created wrapper; the entry
        // identity is the wrapper itself.
        let _ = entries.add(CcwEntry(Arc::clone(&wrapper)), hash);
        trace!(handle = ?wrapper.type_handle(), "created wrapper for managed object");
        wrapper
    }

    /// The existing wrapper for `target`, if any.
    #[must_use]
    pub fn lookup(&self, target: &Arc<dyn ManagedObject>) -> Option<Arc<ComCallableObject>> {
        let key = Self::key_of(target);
        let hash = mask_hash(key as u64);
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());

        let mut slot = entries.find_first(hash);
        while slot >= 0 {
            if let Some(entry) = entries.key_at(slot) {
                if entry.0.target_key() == key && entry.0.target().is_some() {
                    return Some(Arc::clone(&entry.0));
                }
            }
            slot = entries.find_next(slot);
        }
        None
    }

    /// Number of mapped wrappers, husks included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Returns `true` if the map holds no wrappers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Builds (or revives) the aggregated wrapper for `target` and returns its
/// inspectable pointer, carrying one native reference.
///
/// Used during composition: the managed derived object needs an inspectable
/// identity to hand to the native base factory *before* the native base exists,
/// and that wrapper must forward unrecognized interface queries to the base
/// once it does. `inner` is the wrapper of the native base.
#[must_use]
pub fn outer_inspectable_for(
    map: &CcwLookupMap,
    target: &Arc<dyn ManagedObject>,
    inner: Arc<ComObject>,
) -> NativePtr {
    let wrapper = map.get_or_create_with_inner(target, Some(inner));
    wrapper.unknown_ptr()
}
