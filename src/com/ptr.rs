//! Owning smart pointer over a native interface reference, plus identity helpers.

use uguid::Guid;
use widestring::U16CStr;

use crate::com::abi::{
    raw_add_ref, raw_query_interface, raw_release, IID_IAGILEOBJECT, IID_IINSPECTABLE,
    IID_IUNKNOWN, IInspectableVtbl, NativePtr,
};
use crate::com::HResult;
use crate::{Error, Result};

/// An owned native interface reference.
///
/// Each `ComPtr` owns exactly one reference on the underlying object: cloning calls
/// `AddRef`, dropping calls `Release`. Construction is `unsafe` because the wrapped
/// address must really be a live interface pointer; once constructed, use is safe.
pub struct ComPtr {
    ptr: NativePtr,
}

// A reference can be released from any thread; context affinity is enforced at the
// wrapper layer, not here.
unsafe impl Send for ComPtr {}
unsafe impl Sync for ComPtr {}

impl ComPtr {
    /// Takes ownership of one existing reference on `ptr`.
    ///
    /// # Safety
    ///
    /// `ptr` must be a live COM interface pointer and the caller must own one
    /// reference on it, which this `ComPtr` will release on drop.
    #[must_use]
    pub unsafe fn from_raw(ptr: NativePtr) -> ComPtr {
        ComPtr { ptr }
    }

    /// Wraps `ptr` and calls `AddRef` to take a new reference.
    ///
    /// # Safety
    ///
    /// `ptr` must be a live COM interface pointer.
    #[must_use]
    pub unsafe fn from_borrowed(ptr: NativePtr) -> ComPtr {
        raw_add_ref(ptr);
        ComPtr { ptr }
    }

    /// The wrapped pointer, without transferring the reference.
    #[must_use]
    pub fn as_raw(&self) -> NativePtr {
        self.ptr
    }

    /// Releases ownership of the reference to the caller without calling `Release`.
    #[must_use]
    pub fn into_raw(self) -> NativePtr {
        let ptr = self.ptr;
        std::mem::forget(self);
        ptr
    }

    /// Queries for `iid`, returning an owned pointer on success and `None` when the
    /// object reports it does not implement the interface.
    #[must_use]
    pub fn try_query(&self, iid: &Guid) -> Option<ComPtr> {
        // Construction guaranteed liveness; the vtable call is sound.
        let (hr, out) = unsafe { raw_query_interface(self.ptr, iid) };
        if hr.is_success() {
            out.map(|ptr| unsafe { ComPtr::from_raw(ptr) })
        } else {
            None
        }
    }

    /// Queries for `iid`, surfacing the failure result code.
    ///
    /// # Errors
    ///
    /// [`Error::Com`] with the reported code when the query fails, or with
    /// [`HResult::E_POINTER`] if the object claimed success but wrote no pointer.
    pub fn query(&self, iid: &Guid) -> Result<ComPtr> {
        let (hr, out) = unsafe { raw_query_interface(self.ptr, iid) };
        if hr.is_failure() {
            return Err(Error::Com(hr));
        }
        match out {
            Some(ptr) => Ok(unsafe { ComPtr::from_raw(ptr) }),
            None => Err(Error::Com(HResult::E_POINTER)),
        }
    }
}

impl Clone for ComPtr {
    fn clone(&self) -> Self {
        unsafe { ComPtr::from_borrowed(self.ptr) }
    }
}

impl Drop for ComPtr {
    fn drop(&mut self) {
        unsafe {
            raw_release(self.ptr);
        }
    }
}

impl std::fmt::Debug for ComPtr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ComPtr({:#x})", self.ptr.addr())
    }
}

/// Obtains the identity `IUnknown` pointer of a native object.
///
/// Per the identity rules of the ABI, querying `IUnknown` on any interface of an
/// object must always return the same pointer, so the result is usable as the
/// object's cache key.
///
/// # Safety
///
/// `ptr` must be a live COM interface pointer.
#[must_use]
pub unsafe fn query_identity(ptr: NativePtr) -> Option<ComPtr> {
    let (hr, out) = raw_query_interface(ptr, &IID_IUNKNOWN);
    if hr.is_success() {
        out.map(|identity| ComPtr::from_raw(identity))
    } else {
        None
    }
}

/// Probes whether a native object is free-threaded.
///
/// Agile objects advertise it through the `IAgileObject` marker interface; an object
/// that answers the probe can be called from any context, so its wrapper skips all
/// context checks.
///
/// # Safety
///
/// `ptr` must be a live COM interface pointer.
#[must_use]
pub unsafe fn is_free_threaded(ptr: NativePtr) -> bool {
    let (hr, out) = raw_query_interface(ptr, &IID_IAGILEOBJECT);
    if let Some(agile) = out {
        raw_release(agile);
    }
    hr.is_success()
}

/// Reads the runtime class name of a native object through `IInspectable`.
///
/// Returns `None` when the object is not inspectable, reports no name, or the name
/// is not valid UTF-16. The wrapper-creation pipeline treats all of these as "no
/// name available" and falls back to weaker typing.
///
/// # Safety
///
/// `ptr` must be a live COM interface pointer.
#[must_use]
pub unsafe fn runtime_class_name(ptr: NativePtr) -> Option<String> {
    let (hr, out) = raw_query_interface(ptr, &IID_IINSPECTABLE);
    if hr.is_failure() {
        return None;
    }
    let inspectable = ComPtr::from_raw(out?);

    let vtbl = &**(inspectable.as_raw().as_ptr() as *mut *const IInspectableVtbl);
    let mut name: *const u16 = std::ptr::null();
    let hr = (vtbl.get_runtime_class_name)(inspectable.as_raw().as_ptr(), &mut name);
    if hr.is_failure() || name.is_null() {
        return None;
    }

    // The name stays valid while `inspectable` is held.
    U16CStr::from_ptr_str(name).to_string().ok()
}

#[cfg(test)]
mod tests {
    use std::ffi::c_void;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::com::abi::{IUnknownVtbl, IID_IDISPATCH};

    #[repr(C)]
    struct TestObject {
        vtable: *const IUnknownVtbl,
        refs: AtomicU32,
        agile: bool,
    }

    unsafe extern "system" fn qi(
        this: *mut c_void,
        iid: *const Guid,
        out: *mut *mut c_void,
    ) -> HResult {
        let obj = &*(this as *mut TestObject);
        if *iid == IID_IUNKNOWN || (*iid == IID_IAGILEOBJECT && obj.agile) {
            obj.refs.fetch_add(1, Ordering::SeqCst);
            *out = this;
            HResult::S_OK
        } else {
            *out = std::ptr::null_mut();
            HResult::E_NOINTERFACE
        }
    }

    unsafe extern "system" fn add_ref(this: *mut c_void) -> u32 {
        (*(this as *mut TestObject)).refs.fetch_add(1, Ordering::SeqCst) + 1
    }

    unsafe extern "system" fn release(this: *mut c_void) -> u32 {
        (*(this as *mut TestObject)).refs.fetch_sub(1, Ordering::SeqCst) - 1
    }

    static VTBL: IUnknownVtbl = IUnknownVtbl {
        query_interface: qi,
        add_ref,
        release,
    };

    fn test_object(agile: bool) -> Box<TestObject> {
        Box::new(TestObject {
            vtable: &VTBL,
            refs: AtomicU32::new(1),
            agile,
        })
    }

    fn ptr_of(obj: &TestObject) -> NativePtr {
        NativePtr::from_ptr(obj as *const TestObject as *mut c_void).unwrap()
    }

    #[test]
    fn test_com_ptr_owns_exactly_one_reference() {
        let obj = test_object(false);
        let raw = ptr_of(&obj);

        let first = unsafe { ComPtr::from_borrowed(raw) };
        assert_eq!(obj.refs.load(Ordering::SeqCst), 2);

        let second = first.clone();
        assert_eq!(obj.refs.load(Ordering::SeqCst), 3);

        drop(second);
        drop(first);
        assert_eq!(obj.refs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_into_raw_leaks_the_reference() {
        let obj = test_object(false);
        let raw = ptr_of(&obj);

        let owned = unsafe { ComPtr::from_borrowed(raw) };
        let leaked = owned.into_raw();
        assert_eq!(leaked, raw);
        assert_eq!(obj.refs.load(Ordering::SeqCst), 2);

        drop(unsafe { ComPtr::from_raw(leaked) });
        assert_eq!(obj.refs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_query_reports_missing_interface() {
        let obj = test_object(false);
        let owned = unsafe { ComPtr::from_borrowed(ptr_of(&obj)) };

        assert!(owned.try_query(&IID_IDISPATCH).is_none());
        match owned.query(&IID_IDISPATCH) {
            Err(Error::Com(hr)) => assert_eq!(hr, HResult::E_NOINTERFACE),
            other => panic!("expected E_NOINTERFACE, got {other:?}"),
        }
    }

    #[test]
    fn test_query_identity_returns_same_pointer() {
        let obj = test_object(false);
        let raw = ptr_of(&obj);

        let identity = unsafe { query_identity(raw) }.unwrap();
        assert_eq!(identity.as_raw(), raw);
        drop(identity);
        assert_eq!(obj.refs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_free_threaded_probe() {
        let plain = test_object(false);
        assert!(!unsafe { is_free_threaded(ptr_of(&plain)) });
        assert_eq!(plain.refs.load(Ordering::SeqCst), 1);

        let agile = test_object(true);
        assert!(unsafe { is_free_threaded(ptr_of(&agile)) });
        assert_eq!(agile.refs.load(Ordering::SeqCst), 1);
    }
}
