//! The built-in module providing the base interfaces every object supports.
//!
//! Registration of any user module guarantees this module is present, so lookups
//! for the identity interface, the inspectable base and the other universal
//! interfaces always resolve regardless of what metadata the embedder generated.
//! It registers at the lowest possible priority: user modules always win ties.

use crate::com::{
    IID_IACTIVATIONFACTORY, IID_IDISPATCH, IID_IINSPECTABLE, IID_IMARSHAL, IID_IUNKNOWN,
    IID_IWEAKREFERENCE,
};
use crate::registry::module::{Module, ModuleBuilder};
use crate::registry::types::{InterfaceData, InterfaceFlags, MarshalingType, TypeHandle};

/// Reserved handle of the identity interface.
pub const TYPE_IUNKNOWN: TypeHandle = TypeHandle::from_raw(0x1);
/// Reserved handle of the inspectable base interface.
pub const TYPE_IINSPECTABLE: TypeHandle = TypeHandle::from_raw(0x2);
/// Reserved handle of the custom-marshalling interface.
pub const TYPE_IMARSHAL: TypeHandle = TypeHandle::from_raw(0x3);
/// Reserved handle of the automation interface.
pub const TYPE_IDISPATCH: TypeHandle = TypeHandle::from_raw(0x4);
/// Reserved handle of the weak-reference interface.
pub const TYPE_IWEAKREFERENCE: TypeHandle = TypeHandle::from_raw(0x5);
/// Reserved handle of the activation-factory interface.
pub const TYPE_IACTIVATIONFACTORY: TypeHandle = TypeHandle::from_raw(0x6);

/// Builds the internal module.
#[must_use]
pub(crate) fn internal_module() -> Module {
    ModuleBuilder::new(i32::MIN)
        .named("combridge.internal")
        .internal()
        .interface_data(
            "IUnknown",
            InterfaceData::new(TYPE_IUNKNOWN, IID_IUNKNOWN)
                .with_marshaling(MarshalingType::Standard)
                .with_flags(InterfaceFlags::INTERNAL),
        )
        .interface_data(
            "IInspectable",
            InterfaceData::new(TYPE_IINSPECTABLE, IID_IINSPECTABLE)
                .inspectable()
                .with_flags(InterfaceFlags::INTERNAL),
        )
        .interface_data(
            "IMarshal",
            InterfaceData::new(TYPE_IMARSHAL, IID_IMARSHAL)
                .with_marshaling(MarshalingType::FreeThreaded)
                .with_flags(InterfaceFlags::INTERNAL),
        )
        .interface_data(
            "IDispatch",
            InterfaceData::new(TYPE_IDISPATCH, IID_IDISPATCH).with_flags(InterfaceFlags::INTERNAL),
        )
        .interface_data(
            "IWeakReference",
            InterfaceData::new(TYPE_IWEAKREFERENCE, IID_IWEAKREFERENCE)
                .with_flags(InterfaceFlags::INTERNAL),
        )
        .interface_data(
            "IActivationFactory",
            InterfaceData::new(TYPE_IACTIVATIONFACTORY, IID_IACTIVATIONFACTORY)
                .inspectable()
                .with_flags(InterfaceFlags::INTERNAL),
        )
        .build()
}
