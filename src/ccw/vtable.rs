//! The shim layout and the `extern "system"` slots native code calls into.
//!
//! Every interface pointer this crate hands to native code points at an
//! [`InterfaceShim`]: a `#[repr(C)]` pair of (vtable pointer, owner pointer) plus
//! the managed interface type the shim stands for. All shims share one static
//! vtable, which doubles as the recognition token: a pointer whose vtable is
//! [`ccw_vtable_addr`] is one of ours and can be unwrapped back to the managed
//! object without a native round trip.
//!
//! The slot functions never unwind into native code. The reference-counting
//! slots only touch an atomic and a mutex; `QueryInterface` and the inspectable
//! slots run resolution under `catch_unwind` and report failure codes instead.

use std::ffi::c_void;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use uguid::Guid;

use crate::ccw::object::{ComCallableObject, ManagedObject};
use crate::com::{raw_vtable, HResult, IInspectableVtbl, IUnknownVtbl, NativePtr};
use crate::registry::TypeHandle;

/// The object behind every interface pointer this crate exposes to native code.
#[repr(C)]
pub(crate) struct InterfaceShim {
    /// Always [`CCW_VTBL`]. First field, per the ABI.
    vtable: *const IInspectableVtbl,
    owner: *const ComCallableObject,
    type_handle: TypeHandle,
}

// The raw pointers are stable for the owning wrapper's lifetime and only
// dereferenced under the dispatch contract.
unsafe impl Send for InterfaceShim {}
unsafe impl Sync for InterfaceShim {}

impl InterfaceShim {
    pub(crate) fn boxed(owner: *const ComCallableObject, type_handle: TypeHandle) -> Box<InterfaceShim> {
        Box::new(InterfaceShim {
            vtable: &CCW_VTBL,
            owner,
            type_handle,
        })
    }

    pub(crate) fn type_handle(&self) -> TypeHandle {
        self.type_handle
    }

    pub(crate) fn as_native(&self) -> NativePtr {
        NativePtr::from_non_null(std::ptr::NonNull::from(self).cast())
    }
}

/// Vtable address shared by all shims; the recognition token for unwrapping.
pub(crate) fn ccw_vtable_addr() -> *const c_void {
    std::ptr::addr_of!(CCW_VTBL) as *const c_void
}

/// Recovers the managed object behind `ptr` if `ptr` is one of this crate's
/// shims and the target is still alive.
///
/// # Safety
///
/// `ptr` must be a live COM interface pointer. (It need not be one of ours;
/// foreign pointers are recognized and refused by the vtable check alone.)
#[must_use]
pub unsafe fn unwrap_managed(ptr: NativePtr) -> Option<Arc<dyn ManagedObject>> {
    if raw_vtable(ptr) != ccw_vtable_addr() {
        return None;
    }
    let shim = &*(ptr.as_ptr() as *const InterfaceShim);
    (*shim.owner).target()
}

#[inline]
unsafe fn owner_of(this: *mut c_void) -> &'static ComCallableObject {
    let shim = &*(this as *const InterfaceShim);
    &*shim.owner
}

unsafe extern "system" fn ccw_query_interface(
    this: *mut c_void,
    iid: *const Guid,
    out: *mut *mut c_void,
) -> HResult {
    if out.is_null() {
        return HResult::E_POINTER;
    }
    *out = std::ptr::null_mut();
    if iid.is_null() {
        return HResult::E_POINTER;
    }

    let owner = owner_of(this);
    let requested = *iid;
    match catch_unwind(AssertUnwindSafe(|| owner.query_interface(&requested))) {
        Ok(Some(ptr)) => {
            *out = ptr.as_ptr();
            HResult::S_OK
        }
        Ok(None) => HResult::E_NOINTERFACE,
        Err(_) => HResult::E_FAIL,
    }
}

unsafe extern "system" fn ccw_add_ref(this: *mut c_void) -> u32 {
    owner_of(this).com_add_ref()
}

unsafe extern "system" fn ccw_release(this: *mut c_void) -> u32 {
    owner_of(this).com_release()
}

unsafe extern "system" fn ccw_get_iids(
    _this: *mut c_void,
    count: *mut u32,
    iids: *mut *mut Guid,
) -> HResult {
    if count.is_null() || iids.is_null() {
        return HResult::E_POINTER;
    }
    *count = 0;
    *iids = std::ptr::null_mut();
    HResult::E_NOTIMPL
}

unsafe extern "system" fn ccw_get_runtime_class_name(
    this: *mut c_void,
    name: *mut *const u16,
) -> HResult {
    if name.is_null() {
        return HResult::E_POINTER;
    }
    *name = std::ptr::null();

    let owner = owner_of(this);
    match catch_unwind(AssertUnwindSafe(|| owner.class_name_utf16())) {
        Ok(Some(utf16)) => {
            *name = utf16.as_ptr();
            HResult::S_OK
        }
        Ok(None) => HResult::E_NOTIMPL,
        Err(_) => HResult::E_FAIL,
    }
}

unsafe extern "system" fn ccw_get_trust_level(_this: *mut c_void, level: *mut i32) -> HResult {
    if level.is_null() {
        return HResult::E_POINTER;
    }
    *level = 0;
    HResult::S_OK
}

static CCW_VTBL: IInspectableVtbl = IInspectableVtbl {
    base: IUnknownVtbl {
        query_interface: ccw_query_interface,
        add_ref: ccw_add_ref,
        release: ccw_release,
    },
    get_iids: ccw_get_iids,
    get_runtime_class_name: ccw_get_runtime_class_name,
    get_trust_level: ccw_get_trust_level,
};
