//! The native-callable wrapper for one managed object.

use std::any::Any;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, OnceLock, Weak};

use tracing::{trace, warn};
use uguid::Guid;

use crate::ccw::vtable::InterfaceShim;
use crate::com::{
    raw_query_interface, NativePtr, IID_IAGILEOBJECT, IID_IDISPATCH, IID_IINSPECTABLE,
    IID_IMARSHAL, IID_IUNKNOWN,
};
use crate::rcw::ComObject;
use crate::registry::{ModuleRegistry, TypeHandle, TYPE_IUNKNOWN};

/// A managed object that can be handed to native code.
///
/// Identity is the `Arc` allocation: two `Arc`s to the same allocation are the
/// same managed object, and the wrapper layer guarantees they share one wrapper.
pub trait ManagedObject: Send + Sync {
    /// The object's managed type, used to resolve its wrapper template.
    fn type_handle(&self) -> TypeHandle;

    /// Downcast access for the embedding runtime.
    fn as_any(&self) -> &dyn Any;
}

/// The native-callable wrapper (shim owner) for one managed object.
///
/// # Lifetime bridge
///
/// The wrapper always holds a weak reference to its target and, *while the
/// native reference count is above zero*, a strong one too. Native code holding
/// a wrapper pointer therefore keeps the managed object alive; once native code
/// releases its last reference, the target's lifetime is back in managed hands
/// and the wrapper stays behind as a husk that can be revived by the lookup map
/// if the same object is marshalled out again.
///
/// The wrapper itself is owned by [`crate::ccw::CcwLookupMap`], which keeps the
/// interface shim memory valid for as long as the entry exists.
pub struct ComCallableObject {
    registry: Arc<ModuleRegistry>,
    type_handle: TypeHandle,
    /// Native reference count across all of this wrapper's interfaces.
    ref_count: AtomicU32,
    weak_target: Weak<dyn ManagedObject>,
    /// Strong target reference, present iff `ref_count > 0`.
    pinned: Mutex<Option<Arc<dyn ManagedObject>>>,
    /// Interface shims handed to native code. Append-only; boxes pin each shim.
    shims: boxcar::Vec<Box<InterfaceShim>>,
    /// Wrapped native base for aggregation.
    inner: Option<Arc<ComObject>>,
    self_weak: Weak<ComCallableObject>,
    /// UTF-16 runtime class name, built on first request.
    class_name: OnceLock<Option<Vec<u16>>>,
}

impl ComCallableObject {
    pub(crate) fn new(
        registry: Arc<ModuleRegistry>,
        target: &Arc<dyn ManagedObject>,
        inner: Option<Arc<ComObject>>,
    ) -> Arc<ComCallableObject> {
        let ccw = Arc::new_cyclic(|self_weak| ComCallableObject {
            registry,
            type_handle: target.type_handle(),
            ref_count: AtomicU32::new(0),
            weak_target: Arc::downgrade(target),
            pinned: Mutex::new(None),
            shims: boxcar::Vec::new(),
            inner,
            self_weak: self_weak.clone(),
            class_name: OnceLock::new(),
        });
        // The identity shim exists up front so QueryInterface for the identity
        // interface always returns one stable pointer.
        ccw.shim_for(TYPE_IUNKNOWN);
        ccw
    }

    /// Managed type of the target.
    #[must_use]
    pub fn type_handle(&self) -> TypeHandle {
        self.type_handle
    }

    /// Current native reference count.
    #[must_use]
    pub fn ref_count(&self) -> u32 {
        self.ref_count.load(Ordering::Acquire)
    }

    /// The target, if it is still alive.
    #[must_use]
    pub fn target(&self) -> Option<Arc<dyn ManagedObject>> {
        if let Some(target) = self.pinned.lock().unwrap_or_else(|e| e.into_inner()).clone() {
            return Some(target);
        }
        self.weak_target.upgrade()
    }

    /// Address identifying the target allocation, valid even after it died.
    #[must_use]
    pub(crate) fn target_key(&self) -> usize {
        self.weak_target.as_ptr() as *const () as usize
    }

    /// Increments the native reference count; `0 -> 1` pins the target.
    pub fn com_add_ref(&self) -> u32 {
        let previous = self.ref_count.fetch_add(1, Ordering::AcqRel);
        if previous == 0 {
            let mut pinned = self.pinned.lock().unwrap_or_else(|e| e.into_inner());
            *pinned = self.weak_target.upgrade();
        }
        previous + 1
    }

    /// Decrements the native reference count; reaching zero unpins the target.
    ///
    /// A release with no outstanding references is a native-side bug; the count
    /// saturates at zero so the pin state stays coherent.
    pub fn com_release(&self) -> u32 {
        let mut current = self.ref_count.load(Ordering::Acquire);
        loop {
            if current == 0 {
                warn!(
                    target = %format_args!("{:#x}", self.target_key()),
                    "release on a wrapper with no outstanding references"
                );
                return 0;
            }
            match self.ref_count.compare_exchange_weak(
                current,
                current - 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(observed) => current = observed,
            }
        }

        let remaining = current - 1;
        if remaining == 0 {
            let mut pinned = self.pinned.lock().unwrap_or_else(|e| e.into_inner());
            *pinned = None;
            trace!(target = %format_args!("{:#x}", self.target_key()), "wrapper unpinned");
        }
        remaining
    }

    /// The identity interface pointer, carrying one new native reference.
    #[must_use]
    pub fn unknown_ptr(&self) -> NativePtr {
        self.com_add_ref();
        self.shim_for(TYPE_IUNKNOWN)
    }

    /// Resolves `iid` the way native `QueryInterface` does, taking a reference
    /// on success.
    ///
    /// Resolution order: the standard interfaces every wrapper supports, then
    /// the target type's template chain, then the aggregated inner object.
    /// The marshalling and dispatch interfaces are answered with the identity
    /// shim: wrappers are free-threaded, and legacy callers only probe for the
    /// interface's presence.
    #[must_use]
    pub fn query_interface(&self, iid: &Guid) -> Option<NativePtr> {
        if *iid == IID_IUNKNOWN
            || *iid == IID_IAGILEOBJECT
            || *iid == IID_IINSPECTABLE
            || *iid == IID_IMARSHAL
            || *iid == IID_IDISPATCH
        {
            self.com_add_ref();
            return Some(self.shim_for(TYPE_IUNKNOWN));
        }

        if let Some(handle) = self.registry.get_type_from_guid(iid) {
            if self.implements(handle) {
                self.com_add_ref();
                return Some(self.shim_for(handle));
            }
        }

        if let Some(inner) = &self.inner {
            // Aggregation: anything we do not implement is the inner's to answer.
            let (hr, out) = unsafe { raw_query_interface(inner.identity(), iid) };
            if hr.is_success() {
                return out;
            }
        }

        trace!(iid = %iid, handle = ?self.type_handle, "wrapper refused interface");
        None
    }

    /// Whether the target type's template chain implements `handle`.
    fn implements(&self, handle: TypeHandle) -> bool {
        let mut current = self.type_handle;
        while !current.is_null() {
            let Some(template) = self.registry.ccw_template_for(current) else {
                return false;
            };
            if template.implemented_interfaces.contains(&handle) {
                return true;
            }
            current = template.parent;
        }
        false
    }

    /// Existing or new shim for `handle`. The returned pointer stays valid for
    /// the wrapper's lifetime.
    fn shim_for(&self, handle: TypeHandle) -> NativePtr {
        for (_, shim) in self.shims.iter() {
            if shim.type_handle() == handle {
                return shim.as_native();
            }
        }
        // Racing creators may push duplicates; every pushed shim stays valid,
        // so a duplicate only costs its allocation.
        let index = self.shims.push(InterfaceShim::boxed(
            self.self_weak.as_ptr(),
            handle,
        ));
        self.shims[index].as_native()
    }

    /// NUL-terminated UTF-16 runtime class name, if metadata records one.
    pub(crate) fn class_name_utf16(&self) -> Option<&[u16]> {
        self.class_name
            .get_or_init(|| {
                self.registry.runtime_class_name_of(self.type_handle).map(|name| {
                    name.encode_utf16().chain(std::iter::once(0)).collect()
                })
            })
            .as_deref()
    }
}

impl std::fmt::Debug for ComCallableObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComCallableObject")
            .field("type", &self.type_handle)
            .field("ref_count", &self.ref_count())
            .field("target_alive", &(self.weak_target.strong_count() > 0))
            .field("shims", &self.shims.count())
            .finish()
    }
}
