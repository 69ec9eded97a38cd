//! Descriptor types stored in interop metadata tables.
//!
//! These are the row types of a module's tables. They are plain data: all behavior
//! (lookup, memoization, cross-module resolution) lives in
//! [`crate::registry::Module`] and [`crate::registry::ModuleRegistry`].

use std::fmt;

use bitflags::bitflags;
use strum::{Display, EnumString};
use uguid::Guid;

use crate::rcw::ComObject;

/// An opaque, address-sized handle identifying a managed type.
///
/// Handles compare and hash by raw bits only; the runtime that embeds this crate
/// assigns them. The null handle marks "no type" in base-class chains and weakly
/// typed wrappers.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeHandle(usize);

impl TypeHandle {
    /// The null handle.
    pub const NULL: TypeHandle = TypeHandle(0);

    /// Builds a handle from raw bits.
    #[must_use]
    pub const fn from_raw(raw: usize) -> TypeHandle {
        TypeHandle(raw)
    }

    /// The raw bits.
    #[must_use]
    pub const fn raw(self) -> usize {
        self.0
    }

    /// Returns `true` for the null handle.
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Debug for TypeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeHandle({:#x})", self.0)
    }
}

bitflags! {
    /// Per-interface marshalling traits.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
    pub struct InterfaceFlags: u32 {
        /// The interface is a delegate invocation interface.
        const DELEGATE = 1 << 0;
        /// The interface derives from the inspectable base rather than plain IUnknown.
        const INSPECTABLE = 1 << 1;
        /// The interface is provided by the built-in internal module.
        const INTERNAL = 1 << 2;
    }
}

bitflags! {
    /// Per-class traits consulted during wrapper creation.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
    pub struct ClassFlags: u32 {
        /// The class is sealed; a signature hint naming it can be trusted without
        /// consulting the runtime class name.
        const SEALED = 1 << 0;
        /// The class hides its native identity (marshalled by value).
        const NOT_COM_OBJECT = 1 << 1;
    }
}

/// How instances of an interface marshal across contexts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Display, EnumString)]
pub enum MarshalingType {
    /// Not recorded in metadata.
    #[default]
    Unknown,
    /// Standard proxy-based marshalling.
    Standard,
    /// Marshalling is inhibited; the object must stay in its context.
    Inhibit,
    /// The object declares itself free-threaded.
    FreeThreaded,
}

/// Relative GC cost of keeping a wrapper of this class alive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Display, EnumString)]
pub enum GcPressure {
    /// No declared native cost.
    #[default]
    Default,
    /// Small native footprint.
    Low,
    /// Moderate native footprint.
    Medium,
    /// Large native footprint (bitmaps, media buffers).
    High,
}

/// One row of a module's interface table.
#[derive(Clone, Copy, Debug)]
pub struct InterfaceData {
    /// Handle of the managed interface type.
    pub type_handle: TypeHandle,
    /// The interface's IID.
    pub iid: Guid,
    /// Marshalling traits.
    pub flags: InterfaceFlags,
    /// Cross-context marshalling behavior.
    pub marshaling: MarshalingType,
}

impl InterfaceData {
    /// A row with default flags and unknown marshalling.
    #[must_use]
    pub fn new(type_handle: TypeHandle, iid: Guid) -> InterfaceData {
        InterfaceData {
            type_handle,
            iid,
            flags: InterfaceFlags::empty(),
            marshaling: MarshalingType::Unknown,
        }
    }

    /// Marks the row as a delegate invocation interface.
    #[must_use]
    pub fn delegate(mut self) -> InterfaceData {
        self.flags |= InterfaceFlags::DELEGATE;
        self
    }

    /// Marks the row as deriving from the inspectable base.
    #[must_use]
    pub fn inspectable(mut self) -> InterfaceData {
        self.flags |= InterfaceFlags::INSPECTABLE;
        self
    }

    /// Adds the given trait flags.
    #[must_use]
    pub fn with_flags(mut self, flags: InterfaceFlags) -> InterfaceData {
        self.flags |= flags;
        self
    }

    /// Sets the marshalling behavior.
    #[must_use]
    pub fn with_marshaling(mut self, marshaling: MarshalingType) -> InterfaceData {
        self.marshaling = marshaling;
        self
    }
}

/// Constructor hook used by class-factory activation.
pub type ClassConstructorFn = fn() -> std::sync::Arc<dyn crate::ccw::ManagedObject>;

/// One row of a module's class table.
#[derive(Clone, Copy, Debug)]
pub struct ClassData {
    /// Handle of the managed class type. Null for classes that were reduced away;
    /// resolution then walks the base chain.
    pub type_handle: TypeHandle,
    /// Handle of the class's default interface, or null.
    pub default_interface: TypeHandle,
    /// Handle of the base class, or null at the root.
    pub base_class: TypeHandle,
    /// Class traits.
    pub flags: ClassFlags,
    /// Declared GC cost.
    pub gc_pressure: GcPressure,
    /// Constructor hook for activation, when the class is activatable.
    pub constructor: Option<ClassConstructorFn>,
}

impl ClassData {
    /// A row with no base, no default interface and default traits.
    #[must_use]
    pub fn new(type_handle: TypeHandle) -> ClassData {
        ClassData {
            type_handle,
            default_interface: TypeHandle::NULL,
            base_class: TypeHandle::NULL,
            flags: ClassFlags::empty(),
            gc_pressure: GcPressure::Default,
            constructor: None,
        }
    }

    /// Sets the default interface.
    #[must_use]
    pub fn with_default_interface(mut self, interface: TypeHandle) -> ClassData {
        self.default_interface = interface;
        self
    }

    /// Sets the base class.
    #[must_use]
    pub fn with_base(mut self, base: TypeHandle) -> ClassData {
        self.base_class = base;
        self
    }

    /// Marks the class sealed.
    #[must_use]
    pub fn sealed(mut self) -> ClassData {
        self.flags |= ClassFlags::SEALED;
        self
    }

    /// Sets the declared GC cost.
    #[must_use]
    pub fn with_gc_pressure(mut self, pressure: GcPressure) -> ClassData {
        self.gc_pressure = pressure;
        self
    }

    /// Sets the activation constructor hook.
    #[must_use]
    pub fn with_constructor(mut self, constructor: ClassConstructorFn) -> ClassData {
        self.constructor = Some(constructor);
        self
    }
}

/// One row of a module's native-callable-wrapper template table.
///
/// Templates chain through `parent` to the base type's template; interface
/// resolution on a wrapper walks the chain from most-derived to root.
#[derive(Clone, Debug)]
pub struct CcwTemplateData {
    /// Handle of the managed type this template describes.
    pub type_handle: TypeHandle,
    /// Template of the base type, or null at the root.
    pub parent: TypeHandle,
    /// Interfaces this type itself implements (not including inherited ones).
    pub implemented_interfaces: Vec<TypeHandle>,
    /// Index of the runtime class name in the module's string pool.
    pub name_index: u32,
}

/// A value recovered from a boxed-primitive wrapper.
#[derive(Clone, Debug, PartialEq)]
pub enum BoxedValue {
    /// A boxed boolean.
    Bool(bool),
    /// A boxed signed 32-bit integer.
    I32(i32),
    /// A boxed unsigned 32-bit integer.
    U32(u32),
    /// A boxed signed 64-bit integer.
    I64(i64),
    /// A boxed double.
    F64(f64),
    /// A boxed string.
    String(String),
}

/// Stub that extracts the boxed value out of a wrapper of the boxed class.
///
/// The stub owns the raw calls needed to read the value; it returns `None` when
/// the native object refuses.
pub type UnboxFn = fn(&ComObject) -> Option<BoxedValue>;

/// One row of a module's boxing table.
#[derive(Clone, Copy, Debug)]
pub struct BoxingData {
    /// Handle of the managed class whose instances are boxed values.
    pub type_handle: TypeHandle,
    /// Handle of the value type inside the box.
    pub unboxed_type: TypeHandle,
    /// Extraction stub, when one is available.
    pub unbox: Option<UnboxFn>,
}

/// One row of a module's additional-class table.
///
/// Maps a runtime class name with no generated class of its own to the nearest
/// base type that does exist, so such objects still get a typed wrapper.
#[derive(Clone, Copy, Debug)]
pub struct AdditionalClassData {
    /// Handle of the nearest existing base type.
    pub nearest_base: TypeHandle,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_handle_identity() {
        assert!(TypeHandle::NULL.is_null());
        let handle = TypeHandle::from_raw(0x1234);
        assert!(!handle.is_null());
        assert_eq!(handle, TypeHandle::from_raw(0x1234));
        assert_ne!(handle, TypeHandle::from_raw(0x1235));
        assert_eq!(format!("{handle:?}"), "TypeHandle(0x1234)");
    }

    #[test]
    fn test_class_data_builders_compose() {
        let class = ClassData::new(TypeHandle::from_raw(2))
            .with_base(TypeHandle::from_raw(1))
            .with_default_interface(TypeHandle::from_raw(3))
            .sealed()
            .with_gc_pressure(GcPressure::High);

        assert_eq!(class.base_class, TypeHandle::from_raw(1));
        assert!(class.flags.contains(ClassFlags::SEALED));
        assert_eq!(class.gc_pressure, GcPressure::High);
        assert_eq!(class.gc_pressure.to_string(), "High");
    }

    #[test]
    fn test_interface_flags_compose() {
        let data = InterfaceData::new(TypeHandle::from_raw(7), crate::com::IID_IUNKNOWN)
            .delegate()
            .with_marshaling(MarshalingType::FreeThreaded);
        assert!(data.flags.contains(InterfaceFlags::DELEGATE));
        assert!(!data.flags.contains(InterfaceFlags::INSPECTABLE));
        assert_eq!(data.marshaling, MarshalingType::FreeThreaded);
    }
}
