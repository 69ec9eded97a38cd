//! Convenient re-exports of the types most embedders touch.
//!
//! ```rust
//! use combridge::prelude::*;
//!
//! let registry = ModuleRegistry::new();
//! assert!(registry.try_get_interface_type_from_name("MyApp.IWidget").is_none());
//! ```

pub use crate::ccw::{CcwLookupMap, ComCallableObject, ManagedObject};
pub use crate::com::{ComPtr, HResult, NativePtr};
pub use crate::marshal::{
    com_interface_to_object, hresult_from_error, object_to_com_interface, MarshaledObject,
};
pub use crate::rcw::{create_com_object, ComObject, ComObjectCache, ContextCookie};
pub use crate::registry::{
    ClassData, InterfaceData, Module, ModuleBuilder, ModuleRegistry, TypeHandle,
};
pub use crate::{Error, Result};
