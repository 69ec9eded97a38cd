//! Raw vtable ABI: interface pointers, vtable layouts and the narrow call primitives.
//!
//! A native interface pointer is a pointer to a pointer to a vtable whose first three
//! slots are always `QueryInterface` / `AddRef` / `Release`. Everything in this crate
//! that talks to native code goes through the three `raw_*` functions below; they are
//! the only place a foreign vtable is dereferenced, which keeps the unsafe surface
//! auditable.
//!
//! # Safety Model
//!
//! [`NativePtr`] itself is a plain address and is safe to copy, hash and compare.
//! The unsafety lives entirely in the call primitives: the caller must guarantee the
//! address really is a live COM interface pointer whose vtable follows the standard
//! slot layout.

use std::ffi::c_void;
use std::ptr::NonNull;

use uguid::{guid, Guid};

use crate::collections::mask_hash;
use crate::com::HResult;

/// IID of `IUnknown`, the identity interface.
pub const IID_IUNKNOWN: Guid = guid!("00000000-0000-0000-c000-000000000046");
/// IID of `IInspectable`, the runtime-class introspection interface.
pub const IID_IINSPECTABLE: Guid = guid!("af86e2e0-b12d-4c6a-9c5a-d7aa65101e90");
/// IID of `IMarshal`, implemented by objects with custom cross-context marshalling.
pub const IID_IMARSHAL: Guid = guid!("00000003-0000-0000-c000-000000000046");
/// IID of `IDispatch`, the late-binding automation interface.
pub const IID_IDISPATCH: Guid = guid!("00020400-0000-0000-c000-000000000046");
/// IID of `IWeakReference`.
pub const IID_IWEAKREFERENCE: Guid = guid!("00000037-0000-0000-c000-000000000046");
/// IID of `IWeakReferenceSource`.
pub const IID_IWEAKREFERENCESOURCE: Guid = guid!("00000038-0000-0000-c000-000000000046");
/// IID of `IAgileObject`, a marker interface for free-threaded objects.
pub const IID_IAGILEOBJECT: Guid = guid!("94ea2b94-e9cc-49e0-c0ff-ee64ca8f5b90");
/// IID of `IClassFactory`.
pub const IID_ICLASSFACTORY: Guid = guid!("00000001-0000-0000-c000-000000000046");
/// IID of `IActivationFactory`, the parameterless activation interface.
pub const IID_IACTIVATIONFACTORY: Guid = guid!("00000035-0000-0000-c000-000000000046");

/// A non-null native interface pointer, treated as an opaque address.
///
/// This type carries no ownership and no liveness guarantee. It exists so that cache
/// keys and vtable shims can store, compare and hash interface pointers safely; any
/// dereference goes through the `unsafe` raw-call primitives in this module.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct NativePtr(NonNull<c_void>);

// Only an address. The unsafe raw-call primitives own the liveness obligations.
unsafe impl Send for NativePtr {}
unsafe impl Sync for NativePtr {}

impl NativePtr {
    /// Wraps a raw pointer, returning `None` for null.
    #[must_use]
    pub fn from_ptr(ptr: *mut c_void) -> Option<NativePtr> {
        NonNull::new(ptr).map(NativePtr)
    }

    /// Wraps a pointer already known to be non-null.
    #[must_use]
    pub fn from_non_null(ptr: NonNull<c_void>) -> NativePtr {
        NativePtr(ptr)
    }

    /// The raw pointer value.
    #[must_use]
    pub fn as_ptr(self) -> *mut c_void {
        self.0.as_ptr()
    }

    /// The address as an integer, used as an identity cache key.
    #[must_use]
    pub fn addr(self) -> usize {
        self.0.as_ptr() as usize
    }

    /// 31-bit hash code of the address, for the hash-code-keyed collections.
    #[must_use]
    pub fn hash_code(self) -> i32 {
        mask_hash(self.addr() as u64)
    }
}

/// Slot signature of `QueryInterface`.
pub type QueryInterfaceFn =
    unsafe extern "system" fn(this: *mut c_void, iid: *const Guid, out: *mut *mut c_void) -> HResult;
/// Slot signature of `AddRef`.
pub type AddRefFn = unsafe extern "system" fn(this: *mut c_void) -> u32;
/// Slot signature of `Release`.
pub type ReleaseFn = unsafe extern "system" fn(this: *mut c_void) -> u32;

/// The universal first three vtable slots.
///
/// Every native interface, whatever else it adds, starts with exactly these slots in
/// exactly this order.
#[repr(C)]
pub struct IUnknownVtbl {
    /// Slot 0.
    pub query_interface: QueryInterfaceFn,
    /// Slot 1.
    pub add_ref: AddRefFn,
    /// Slot 2.
    pub release: ReleaseFn,
}

/// Vtable of the runtime-class introspection interface.
///
/// `get_runtime_class_name` writes a pointer to a NUL-terminated UTF-16 name owned
/// by the object; the pointer stays valid while the queried interface is held.
#[repr(C)]
pub struct IInspectableVtbl {
    /// Slots 0-2.
    pub base: IUnknownVtbl,
    /// Slot 3: writes the count and array of IIDs the object implements.
    pub get_iids:
        unsafe extern "system" fn(this: *mut c_void, count: *mut u32, iids: *mut *mut Guid) -> HResult,
    /// Slot 4: writes the fully-qualified runtime class name.
    pub get_runtime_class_name:
        unsafe extern "system" fn(this: *mut c_void, name: *mut *const u16) -> HResult,
    /// Slot 5: writes the trust level.
    pub get_trust_level: unsafe extern "system" fn(this: *mut c_void, level: *mut i32) -> HResult,
}

#[inline]
unsafe fn unknown_vtbl<'a>(ptr: NativePtr) -> &'a IUnknownVtbl {
    &**(ptr.as_ptr() as *mut *const IUnknownVtbl)
}

/// Reads the vtable pointer of an interface pointer without calling through it.
///
/// Used to recognize this crate's own wrapper shims by vtable identity before
/// treating a pointer as foreign.
///
/// # Safety
///
/// `ptr` must point to a live COM interface pointer.
#[must_use]
pub unsafe fn raw_vtable(ptr: NativePtr) -> *const c_void {
    *(ptr.as_ptr() as *mut *const c_void)
}

/// Calls `QueryInterface` through the vtable.
///
/// Returns the result code and, on success, the retrieved interface pointer carrying
/// one reference the caller now owns.
///
/// # Safety
///
/// `ptr` must point to a live COM interface pointer with a standard vtable.
pub unsafe fn raw_query_interface(ptr: NativePtr, iid: &Guid) -> (HResult, Option<NativePtr>) {
    let mut out: *mut c_void = std::ptr::null_mut();
    let hr = (unknown_vtbl(ptr).query_interface)(ptr.as_ptr(), iid, &mut out);
    if hr.is_success() {
        (hr, NativePtr::from_ptr(out))
    } else {
        (hr, None)
    }
}

/// Calls `AddRef` through the vtable, returning the new reference count.
///
/// # Safety
///
/// `ptr` must point to a live COM interface pointer with a standard vtable.
pub unsafe fn raw_add_ref(ptr: NativePtr) -> u32 {
    (unknown_vtbl(ptr).add_ref)(ptr.as_ptr())
}

/// Calls `Release` through the vtable, returning the new reference count.
///
/// # Safety
///
/// `ptr` must point to a live COM interface pointer holding a reference the caller
/// owns; the pointer must not be used again if this releases the last reference.
pub unsafe fn raw_release(ptr: NativePtr) -> u32 {
    (unknown_vtbl(ptr).release)(ptr.as_ptr())
}
