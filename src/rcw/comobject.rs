//! The managed proxy for one native object.

use std::sync::atomic::{AtomicU32, Ordering};

use tracing::trace;

use crate::collections::InlineAppendList;
use crate::com::{raw_query_interface, raw_release, NativePtr};
use crate::rcw::context::{current_context, ContextCookie};
use crate::registry::{ModuleRegistry, TypeHandle};
use crate::{Error, Result};

/// One entry of a wrapper's interface pointer cache.
#[derive(Clone, Copy, Debug)]
pub struct CachedInterface {
    /// Managed type of the cached interface.
    pub type_handle: TypeHandle,
    /// The interface pointer. The cache owns one reference on it.
    pub ptr: NativePtr,
    /// Context the pointer is bound to.
    pub context: ContextCookie,
}

/// The managed-side proxy (wrapper) for a native object.
///
/// At most one live wrapper exists per native identity and context; the identity
/// cache in [`crate::rcw::ComObjectCache`] enforces this and
/// [`crate::rcw::create_com_object`] is the only constructor path. The wrapper
/// owns one reference on the identity pointer and one on every cached interface
/// pointer; dropping the wrapper releases them all.
///
/// Interface pointers obtained through [`ComObject::query_interface_no_addref`]
/// are owned by the cache, never by the caller, and stay valid for the wrapper's
/// lifetime. This is what makes repeated calls through a wrapper cheap: one
/// native `QueryInterface` per (interface, context), ever.
pub struct ComObject {
    /// Identity pointer; owns one native reference.
    identity: NativePtr,
    /// Context the wrapper was created in.
    context: ContextCookie,
    /// Free-threaded objects skip all context checks.
    free_threaded: bool,
    /// Resolved class type; null when only weakly typed.
    class_type: TypeHandle,
    /// Logical holder count: one per marshalling crossing that handed out this
    /// wrapper. Starts at 1 for the creating crossing.
    ref_count: AtomicU32,
    /// Interface pointer cache. Slot 0 is inline: most objects are only ever
    /// used through the one interface they were handed out as.
    interfaces: InlineAppendList<CachedInterface>,
}

impl ComObject {
    /// Wraps `identity`, taking ownership of one reference on it.
    pub(crate) fn new(
        identity: NativePtr,
        context: ContextCookie,
        free_threaded: bool,
        class_type: TypeHandle,
    ) -> ComObject {
        ComObject {
            identity,
            context,
            free_threaded,
            class_type,
            ref_count: AtomicU32::new(1),
            interfaces: InlineAppendList::new(),
        }
    }

    /// Seeds the cache before the wrapper is shared. Takes ownership of one
    /// reference on `entry.ptr`.
    pub(crate) fn cache_first(&mut self, entry: CachedInterface) {
        self.interfaces.add_first(entry);
    }

    /// The native identity pointer. Valid for the wrapper's lifetime.
    #[must_use]
    pub fn identity(&self) -> NativePtr {
        self.identity
    }

    /// Context this wrapper was created in.
    #[must_use]
    pub fn context(&self) -> ContextCookie {
        self.context
    }

    /// Returns `true` if the native object declared itself free-threaded.
    #[must_use]
    pub fn is_free_threaded(&self) -> bool {
        self.free_threaded
    }

    /// Resolved class type, or the null handle for weakly typed wrappers.
    #[must_use]
    pub fn class_type(&self) -> TypeHandle {
        self.class_type
    }

    /// Number of cached interface pointers.
    #[must_use]
    pub fn cached_interface_count(&self) -> usize {
        self.interfaces.len()
    }

    /// Increments the logical reference count, returning the new count.
    ///
    /// The creation pipeline calls this on every crossing that returns an
    /// already-live wrapper; the embedding runtime balances each crossing with
    /// one [`ComObject::release`] when the holder lets go.
    pub fn add_ref(&self) -> u32 {
        self.ref_count.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Decrements the logical reference count, returning the new count.
    ///
    /// Reaching zero does not free anything; the wrapper's owner decides when to
    /// drop it. The count exists so the embedding runtime can mirror native
    /// reference semantics on top of the wrapper.
    pub fn release(&self) -> u32 {
        self.ref_count.fetch_sub(1, Ordering::AcqRel) - 1
    }

    /// Current logical reference count.
    #[must_use]
    pub fn ref_count(&self) -> u32 {
        self.ref_count.load(Ordering::Acquire)
    }

    /// The context a new cache entry is bound to.
    fn cache_context(&self) -> ContextCookie {
        if self.free_threaded {
            ContextCookie::DEFAULT
        } else {
            current_context()
        }
    }

    /// Cached pointer for `handle` usable from the current context, if any.
    #[must_use]
    pub fn cached_interface(&self, handle: TypeHandle) -> Option<NativePtr> {
        let context = current_context();
        self.interfaces
            .iter()
            .find(|entry| {
                entry.type_handle == handle
                    && (self.free_threaded || entry.context.matches(context))
            })
            .map(|entry| entry.ptr)
    }

    /// Resolves `handle` to an interface pointer, querying the native object on
    /// a cache miss.
    ///
    /// The returned pointer is owned by the wrapper's cache; the caller must not
    /// release it and must not use it past the wrapper's lifetime.
    ///
    /// # Errors
    ///
    /// [`Error::NoSuchInterface`] if `handle` has no registered IID or the native
    /// object refuses the query.
    pub fn query_interface_no_addref(
        &self,
        registry: &ModuleRegistry,
        handle: TypeHandle,
    ) -> Result<NativePtr> {
        if let Some(ptr) = self.cached_interface(handle) {
            return Ok(ptr);
        }

        let data = registry
            .interface_data_for(handle)
            .ok_or(Error::NoSuchInterface(handle))?;

        // Identity stays valid for self's lifetime; see the ownership contract.
        let (hr, out) = unsafe { raw_query_interface(self.identity, &data.iid) };
        let Some(ptr) = out else {
            trace!(handle = ?handle, hr = %hr, "native QueryInterface refused");
            return Err(Error::NoSuchInterface(handle));
        };

        // The reference returned by the query transfers to the cache. A racing
        // query for the same interface may add a second entry; both references
        // are released on drop, so the duplicate is only a few wasted bytes.
        self.interfaces.add(CachedInterface {
            type_handle: handle,
            ptr,
            context: self.cache_context(),
        });
        Ok(ptr)
    }
}

impl Drop for ComObject {
    fn drop(&mut self) {
        for entry in self.interfaces.iter() {
            unsafe {
                raw_release(entry.ptr);
            }
        }
        unsafe {
            raw_release(self.identity);
        }
    }
}

impl std::fmt::Debug for ComObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComObject")
            .field("identity", &format_args!("{:#x}", self.identity.addr()))
            .field("context", &self.context)
            .field("free_threaded", &self.free_threaded)
            .field("class_type", &self.class_type)
            .field("ref_count", &self.ref_count())
            .field("cached_interfaces", &self.interfaces.len())
            .finish()
    }
}