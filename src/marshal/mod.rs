//! The outward-facing marshalling facade.
//!
//! The embedding runtime calls these functions at every boundary crossing; they
//! compose the identity machinery of [`crate::rcw`] and [`crate::ccw`] into the
//! two canonical directions:
//!
//! - managed object out: [`object_to_com_interface`] (one wrapper per object,
//!   one pointer per interface)
//! - native pointer in: [`com_interface_to_object`], which first recognizes this
//!   crate's own shims and short-circuits back to the managed object without a
//!   native round trip, then falls into the wrapper-creation pipeline, then
//!   applies the boxed-value post-pass
//!
//! Error translation is total in both directions. An error crossing into native
//! code leaves its details in a thread-local side channel next to the returned
//! result code; a failure code crossing back in picks those details up again
//! when they match, so an error round trip through native code is lossless.

use std::cell::RefCell;
use std::sync::Arc;

use tracing::trace;
use uguid::Guid;

use crate::ccw::{unwrap_managed, CcwLookupMap, ManagedObject};
use crate::com::{HResult, NativePtr};
use crate::rcw::{create_com_object, try_unbox, ComObject, ComObjectCache};
use crate::registry::{BoxedValue, InterfaceFlags, ModuleRegistry, TypeHandle};
use crate::{Error, Result};

/// What a native interface pointer marshalled into managed code turned out to be.
pub enum MarshaledObject {
    /// One of this crate's own shims: the original managed object, recovered
    /// without touching native code.
    Managed(Arc<dyn ManagedObject>),
    /// A foreign native object behind its (new or existing) wrapper.
    Wrapper(Arc<ComObject>),
    /// A foreign object that is a registered boxed value; the box was opened.
    Value(BoxedValue),
}

impl std::fmt::Debug for MarshaledObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            // Targets are opaque trait objects; show their identity, not content.
            MarshaledObject::Managed(target) => f
                .debug_tuple("Managed")
                .field(&format_args!(
                    "{:#x}",
                    Arc::as_ptr(target) as *const () as usize
                ))
                .finish(),
            MarshaledObject::Wrapper(wrapper) => f.debug_tuple("Wrapper").field(wrapper).finish(),
            MarshaledObject::Value(value) => f.debug_tuple("Value").field(value).finish(),
        }
    }
}

/// Marshals a managed object out as the interface named by `iid`.
///
/// The returned pointer carries one native reference the caller is responsible
/// for releasing (or handing to native code, which then owns it).
///
/// # Errors
///
/// [`Error::Com`] with `E_NOINTERFACE` when the object's wrapper does not
/// implement `iid`.
pub fn object_to_com_interface(
    map: &CcwLookupMap,
    target: &Arc<dyn ManagedObject>,
    iid: &Guid,
) -> Result<NativePtr> {
    let wrapper = map.get_or_create(target);
    wrapper
        .query_interface(iid)
        .ok_or(Error::Com(HResult::E_NOINTERFACE))
}

/// Marshals a native interface pointer into managed code.
///
/// `signature_hint` is the static type of the pointer at the call site (see
/// [`create_com_object`]); pass [`TypeHandle::NULL`] when unknown.
///
/// # Errors
///
/// [`Error::InvalidCast`] when the pointer refuses the identity query.
pub fn com_interface_to_object(
    registry: &ModuleRegistry,
    cache: &ComObjectCache,
    ptr: NativePtr,
    signature_hint: TypeHandle,
) -> Result<MarshaledObject> {
    // One of ours coming home?
    if let Some(target) = unsafe { unwrap_managed(ptr) } {
        trace!("unwrapped own shim on the way in");
        return Ok(MarshaledObject::Managed(target));
    }

    let wrapper = create_com_object(registry, cache, ptr, signature_hint)?;

    if let Some(value) = try_unbox(registry, &wrapper) {
        // The crossing hands back the value, not the wrapper; give the logical
        // reference the pipeline took back before letting it go.
        wrapper.release();
        return Ok(MarshaledObject::Value(value));
    }
    Ok(MarshaledObject::Wrapper(wrapper))
}

/// Marshals a managed delegate out as its invocation interface.
///
/// # Errors
///
/// - [`Error::MissingMetadata`] when the delegate's type has no interface row
/// - [`Error::NotSupported`] when the row is not flagged as a delegate
pub fn delegate_to_com_interface(
    registry: &ModuleRegistry,
    map: &CcwLookupMap,
    delegate: &Arc<dyn ManagedObject>,
) -> Result<NativePtr> {
    let handle = delegate.type_handle();
    let data = registry
        .interface_data_for(handle)
        .ok_or_else(|| missing_metadata_error!("no interface row for delegate type {:?}", handle))?;
    if !data.flags.contains(InterfaceFlags::DELEGATE) {
        return Err(Error::NotSupported("type is not a delegate"));
    }
    object_to_com_interface(map, delegate, &data.iid)
}

/// Marshals a native invocation-interface pointer in as a delegate.
///
/// Our own shims unwrap to the original delegate; foreign pointers get a
/// wrapper typed with the delegate's interface so the invocation pointer is
/// cached up front.
///
/// # Errors
///
/// [`Error::InvalidCast`] when the pointer refuses the identity query.
pub fn com_interface_to_delegate(
    registry: &ModuleRegistry,
    cache: &ComObjectCache,
    ptr: NativePtr,
    delegate_type: TypeHandle,
) -> Result<MarshaledObject> {
    if let Some(target) = unsafe { unwrap_managed(ptr) } {
        return Ok(MarshaledObject::Managed(target));
    }
    let wrapper = create_com_object(registry, cache, ptr, delegate_type)?;
    Ok(MarshaledObject::Wrapper(wrapper))
}

struct StoredErrorInfo {
    hr: HResult,
    message: String,
}

thread_local! {
    /// Details of the last error that crossed out on this thread.
    static RESTRICTED_ERROR_INFO: RefCell<Option<StoredErrorInfo>> = const { RefCell::new(None) };
}

/// Translates an error to the result code reported to native code, parking the
/// error's details in the thread-local side channel.
#[must_use]
pub fn hresult_from_error(error: &Error) -> HResult {
    let hr = error.to_hresult();
    RESTRICTED_ERROR_INFO.with(|slot| {
        *slot.borrow_mut() = Some(StoredErrorInfo {
            hr,
            message: error.to_string(),
        });
    });
    hr
}

/// Details parked by [`hresult_from_error`], if they match `hr`. Consumes them.
#[must_use]
pub fn take_restricted_error_info(hr: HResult) -> Option<String> {
    RESTRICTED_ERROR_INFO.with(|slot| {
        let mut slot = slot.borrow_mut();
        match slot.take() {
            Some(info) if info.hr == hr => Some(info.message),
            other => {
                // Mismatched info belongs to some other failure; keep it.
                *slot = other;
                None
            }
        }
    })
}

/// Translates a failure code arriving from native code into an error.
///
/// Total: every code maps to some error (success codes map to
/// [`Error::Com`] of `E_FAIL`, since calling this on success is itself a bug
/// worth surfacing). Details parked on this thread for the same code are
/// consumed and logged.
#[must_use]
pub fn error_from_hresult(hr: HResult) -> Error {
    if let Some(message) = take_restricted_error_info(hr) {
        trace!(hr = %hr, message = %message, "restored error details from side channel");
    }

    if hr.is_success() {
        return Error::Com(HResult::E_FAIL);
    }
    match hr {
        HResult::E_NOINTERFACE => Error::InvalidCast,
        HResult::COR_E_OBJECTDISPOSED | HResult::RPC_E_DISCONNECTED => Error::ObjectDisposed,
        HResult::E_NOTIMPL => Error::NotSupported("native code reported E_NOTIMPL"),
        HResult::E_BOUNDS => Error::ArgumentOutOfRange("native code reported E_BOUNDS"),
        other => Error::Com(other),
    }
}

/// Turns a result code into `Ok(())` or the translated error.
///
/// # Errors
///
/// The [`error_from_hresult`] translation of any failure code.
pub fn check_hresult(hr: HResult) -> Result<()> {
    if hr.is_success() {
        Ok(())
    } else {
        Err(error_from_hresult(hr))
    }
}
