//! Interop metadata: string pools, module tables and cross-module resolution.
//!
//! A build-time tool generates, per component, a *module* of metadata tables
//! describing the types that cross the native boundary: interfaces with their
//! IIDs, classes with their bases and default interfaces, wrapper templates,
//! boxing descriptors and name fallbacks. This module is the runtime side of that
//! contract.
//!
//! # Architecture
//!
//! ```text
//! ModuleRegistry (priority-ordered, memoized cross-module queries)
//!   ├── internal Module (base interfaces, always present)
//!   └── user Modules
//!         ├── descriptor tables (InterfaceData, ClassData, ...)
//!         ├── StringMap per named table (lazy hash index)
//!         └── StringPool (compressed names)
//! ```
//!
//! Everything below the registry is immutable after [`ModuleBuilder::build`];
//! the lazy lookup indexes publish atomically, so all reads are lock-free.

mod internal;
mod manager;
mod module;
mod stringpool;
mod types;

pub use internal::{
    TYPE_IACTIVATIONFACTORY, TYPE_IDISPATCH, TYPE_IINSPECTABLE, TYPE_IMARSHAL, TYPE_IUNKNOWN,
    TYPE_IWEAKREFERENCE,
};
pub use manager::{ModuleRegistry, MAX_MODULES};
pub use module::{Module, ModuleBuilder};
pub use stringpool::{StringMap, StringPool, StringPoolBuilder};
pub use types::{
    AdditionalClassData, BoxedValue, BoxingData, CcwTemplateData, ClassConstructorFn, ClassData,
    ClassFlags, GcPressure, InterfaceData, InterfaceFlags, MarshalingType, TypeHandle, UnboxFn,
};
