//! The wrapper creation pipeline.
//!
//! [`create_com_object`] is the single entry point that turns a native interface
//! pointer into a managed wrapper. The pipeline, in order:
//!
//! 1. obtain the identity pointer (a failed identity query is a hard error)
//! 2. probe the identity cache; a live wrapper usable from the current context
//!    takes one logical reference and is returned
//! 3. probe whether the object is free-threaded
//! 4. resolve the class type: a sealed signature hint is trusted outright,
//!    otherwise the runtime class name (when resolvable) beats the hint, and
//!    with neither the wrapper stays weakly typed
//! 5. construct the wrapper, seeding its cache with the offered pointer when the
//!    hint names a registered interface
//! 6. publish it in the cache, deferring to a racing winner
//!
//! A context mismatch at step 2 intentionally yields a second live wrapper that
//! is *not* inserted: the cache keyes wrappers by identity, and the entry belongs
//! to the wrapper of the creation context.

use std::sync::Arc;

use tracing::{debug, trace};

use crate::com::{is_free_threaded, query_identity, raw_add_ref, runtime_class_name, NativePtr};
use crate::rcw::cache::ComObjectCache;
use crate::rcw::comobject::{CachedInterface, ComObject};
use crate::rcw::context::{current_context, ContextCookie};
use crate::registry::{BoxedValue, ClassFlags, ModuleRegistry, TypeHandle};
use crate::{Error, Result};

/// Creates (or finds) the wrapper for the native object behind `ptr`.
///
/// `signature_hint` is the static type the pointer was typed as at the call
/// site: an interface handle seeds the cache, a sealed class handle short-cuts
/// name resolution. Pass [`TypeHandle::NULL`] when nothing is known.
///
/// # Errors
///
/// [`Error::InvalidCast`] if the object refuses the identity query.
pub fn create_com_object(
    registry: &ModuleRegistry,
    cache: &ComObjectCache,
    ptr: NativePtr,
    signature_hint: TypeHandle,
) -> Result<Arc<ComObject>> {
    let identity = unsafe { query_identity(ptr) }.ok_or(Error::InvalidCast)?;

    if let Some(existing) = cache.lookup(identity.as_raw()) {
        if existing.is_free_threaded() || existing.context().matches(current_context()) {
            trace!(identity = %format_args!("{:#x}", identity.as_raw().addr()), "wrapper cache hit");
            // Every crossing that hands out the wrapper counts as one holder.
            existing.add_ref();
            return Ok(existing);
        }
        // Bound to another context: a second wrapper is required, and it stays
        // out of the cache (the entry belongs to the original context's wrapper).
        debug!(
            identity = %format_args!("{:#x}", identity.as_raw().addr()),
            "context mismatch, creating uncached duplicate wrapper"
        );
        return Ok(build_wrapper(registry, ptr, identity.into_raw(), signature_hint));
    }

    let wrapper = build_wrapper(registry, ptr, identity.into_raw(), signature_hint);

    if cache.add(&wrapper) {
        return Ok(wrapper);
    }
    // Lost the publication race. Defer to the winner when it is usable from
    // here; otherwise ours lives on as the uncached duplicate.
    match cache.lookup(wrapper.identity()) {
        Some(winner)
            if winner.is_free_threaded() || winner.context().matches(current_context()) =>
        {
            winner.add_ref();
            Ok(winner)
        }
        _ => Ok(wrapper),
    }
}

fn build_wrapper(
    registry: &ModuleRegistry,
    ptr: NativePtr,
    identity: NativePtr,
    signature_hint: TypeHandle,
) -> Arc<ComObject> {
    let free_threaded = unsafe { is_free_threaded(identity) };
    let context = if free_threaded {
        ContextCookie::DEFAULT
    } else {
        current_context()
    };

    let class_type = resolve_class_type(registry, ptr, signature_hint);

    let mut wrapper = ComObject::new(identity, context, free_threaded, class_type);

    // Seed the cache with the pointer the caller already has. Cached under the
    // hint type: the pointer may concretely be something more derived, but it
    // is only ever handed out as the hint.
    if !signature_hint.is_null() && registry.interface_data_for(signature_hint).is_some() {
        unsafe {
            raw_add_ref(ptr);
        }
        wrapper.cache_first(CachedInterface {
            type_handle: signature_hint,
            ptr,
            context,
        });
    }

    trace!(
        identity = %format_args!("{:#x}", identity.addr()),
        class = ?class_type,
        free_threaded,
        "created wrapper"
    );
    Arc::new(wrapper)
}

/// Class-type resolution with the precedence sealed hint > runtime name > hint.
fn resolve_class_type(
    registry: &ModuleRegistry,
    ptr: NativePtr,
    signature_hint: TypeHandle,
) -> TypeHandle {
    if !signature_hint.is_null() {
        if let Some(class) = registry.class_data_for(signature_hint) {
            if class.flags.contains(ClassFlags::SEALED) {
                return signature_hint;
            }
        }
    }

    if let Some(name) = unsafe { runtime_class_name(ptr) } {
        if let Some(resolved) = registry.try_get_class_type_from_name(&name) {
            return resolved;
        }
        debug!(class = %name, "runtime class name unknown to the registry");
    }

    if !signature_hint.is_null() && registry.class_data_for(signature_hint).is_some() {
        return signature_hint;
    }

    TypeHandle::NULL
}

/// Recovers the boxed value from a wrapper of a registered boxed class.
///
/// Returns `None` when the wrapper's class has no boxing row, the row carries no
/// extraction stub, or the stub itself gives up.
#[must_use]
pub fn try_unbox(registry: &ModuleRegistry, wrapper: &ComObject) -> Option<BoxedValue> {
    let boxing = registry.boxing_data_for(wrapper.class_type())?;
    let unbox = boxing.unbox?;
    unbox(wrapper)
}

#[cfg(test)]
pub(crate) mod fixtures {
    //! A minimal native object for exercising the pipeline in-process.

    use std::ffi::c_void;
    use std::sync::atomic::{AtomicU32, Ordering};

    use uguid::Guid;

    use crate::com::{
        HResult, IInspectableVtbl, IUnknownVtbl, NativePtr, IID_IAGILEOBJECT, IID_IINSPECTABLE,
        IID_IUNKNOWN,
    };

    #[repr(C)]
    pub struct FixtureObject {
        vtable: *const IInspectableVtbl,
        pub refs: AtomicU32,
        agile: bool,
        /// NUL-terminated UTF-16 runtime class name; empty means unnamed.
        name: Vec<u16>,
    }

    unsafe extern "system" fn fx_query_interface(
        this: *mut c_void,
        iid: *const Guid,
        out: *mut *mut c_void,
    ) -> HResult {
        let object = &*(this as *mut FixtureObject);
        let supported = *iid == IID_IUNKNOWN
            || (*iid == IID_IINSPECTABLE && !object.name.is_empty())
            || (*iid == IID_IAGILEOBJECT && object.agile);
        if supported {
            object.refs.fetch_add(1, Ordering::SeqCst);
            *out = this;
            HResult::S_OK
        } else {
            *out = std::ptr::null_mut();
            HResult::E_NOINTERFACE
        }
    }

    unsafe extern "system" fn fx_add_ref(this: *mut c_void) -> u32 {
        (*(this as *mut FixtureObject)).refs.fetch_add(1, Ordering::SeqCst) + 1
    }

    unsafe extern "system" fn fx_release(this: *mut c_void) -> u32 {
        (*(this as *mut FixtureObject)).refs.fetch_sub(1, Ordering::SeqCst) - 1
    }

    unsafe extern "system" fn fx_get_iids(
        _this: *mut c_void,
        count: *mut u32,
        iids: *mut *mut Guid,
    ) -> HResult {
        *count = 0;
        *iids = std::ptr::null_mut();
        HResult::E_NOTIMPL
    }

    unsafe extern "system" fn fx_get_runtime_class_name(
        this: *mut c_void,
        name: *mut *const u16,
    ) -> HResult {
        let object = &*(this as *mut FixtureObject);
        if object.name.is_empty() {
            *name = std::ptr::null();
            HResult::E_FAIL
        } else {
            *name = object.name.as_ptr();
            HResult::S_OK
        }
    }

    unsafe extern "system" fn fx_get_trust_level(_this: *mut c_void, level: *mut i32) -> HResult {
        *level = 0;
        HResult::S_OK
    }

    static FX_VTBL: IInspectableVtbl = IInspectableVtbl {
        base: IUnknownVtbl {
            query_interface: fx_query_interface,
            add_ref: fx_add_ref,
            release: fx_release,
        },
        get_iids: fx_get_iids,
        get_runtime_class_name: fx_get_runtime_class_name,
        get_trust_level: fx_get_trust_level,
    };

    impl FixtureObject {
        pub fn new(name: &str, agile: bool) -> Box<FixtureObject> {
            let name = if name.is_empty() {
                Vec::new()
            } else {
                name.encode_utf16().chain(std::iter::once(0)).collect()
            };
            Box::new(FixtureObject {
                vtable: &FX_VTBL,
                refs: AtomicU32::new(1),
                agile,
                name,
            })
        }

        pub fn as_native(&self) -> NativePtr {
            NativePtr::from_ptr(self as *const FixtureObject as *mut c_void)
                .expect("fixture address is never null")
        }

        pub fn ref_count(&self) -> u32 {
            self.refs.load(Ordering::SeqCst)
        }
    }
}
