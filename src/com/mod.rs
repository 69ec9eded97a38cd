//! The native ABI layer: result codes, vtable layouts, IIDs and call primitives.
//!
//! This module defines the binary contract shared by both wrapper directions.
//! Proxies for native objects ([`crate::rcw`]) call *out* through it, and
//! native-callable shims for managed objects ([`crate::ccw`]) implement the same
//! contract *inward*. Nothing here knows about wrappers or metadata; it is pure ABI.
//!
//! # Key Components
//!
//! - [`HResult`] - the signed result-code convention, with the well-known codes
//! - [`IUnknownVtbl`] / [`IInspectableVtbl`] - `#[repr(C)]` vtable layouts
//! - [`NativePtr`] - an interface pointer as an opaque, hashable address
//! - [`raw_query_interface`] / [`raw_add_ref`] / [`raw_release`] - the only
//!   functions that dereference a foreign vtable
//! - [`ComPtr`] - an owning reference (Clone = AddRef, Drop = Release)
//! - [`query_identity`] / [`is_free_threaded`] / [`runtime_class_name`] - the
//!   identity and introspection probes used when materializing a proxy

mod abi;
mod hresult;
mod ptr;

pub use abi::{
    raw_add_ref, raw_query_interface, raw_release, raw_vtable, AddRefFn, IInspectableVtbl,
    IUnknownVtbl, NativePtr, QueryInterfaceFn, ReleaseFn, IID_IACTIVATIONFACTORY,
    IID_IAGILEOBJECT, IID_ICLASSFACTORY, IID_IDISPATCH, IID_IINSPECTABLE, IID_IMARSHAL,
    IID_IUNKNOWN, IID_IWEAKREFERENCE, IID_IWEAKREFERENCESOURCE,
};
pub use hresult::HResult;
pub use ptr::{is_free_threaded, query_identity, runtime_class_name, ComPtr};
