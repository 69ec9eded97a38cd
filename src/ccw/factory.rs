//! Activation of registered classes on behalf of native callers.

use tracing::debug;
use uguid::Guid;

use crate::ccw::lookup::CcwLookupMap;
use crate::com::{HResult, NativePtr, IID_IINSPECTABLE, IID_IUNKNOWN};
use crate::registry::{ClassConstructorFn, ModuleRegistry, TypeHandle};
use crate::{Error, Result};

/// Factory for one registered activatable class.
///
/// Shaped after the native class-factory contract: `create_instance` is the
/// two-argument creation call (controlling outer, requested interface), and
/// `activate_instance` is the parameterless activation used by inspectable
/// callers. Both construct the managed object through the constructor hook
/// recorded in class metadata and hand back a wrapper interface pointer.
pub struct ClassFactory {
    class_type: TypeHandle,
    constructor: ClassConstructorFn,
}

impl ClassFactory {
    /// Factory for the class registered under `class_type`.
    ///
    /// # Errors
    ///
    /// [`Error::MissingMetadata`] when the class is unknown to the registry or
    /// its row records no constructor hook.
    pub fn for_class(registry: &ModuleRegistry, class_type: TypeHandle) -> Result<ClassFactory> {
        let class = registry
            .class_data_for(class_type)
            .ok_or_else(|| missing_metadata_error!("no class row for {:?}", class_type))?;
        let constructor = class.constructor.ok_or_else(|| {
            missing_metadata_error!("class {:?} is not activatable", class_type)
        })?;
        Ok(ClassFactory {
            class_type,
            constructor,
        })
    }

    /// The class this factory activates.
    #[must_use]
    pub fn class_type(&self) -> TypeHandle {
        self.class_type
    }

    /// Constructs an instance and returns the interface requested by `iid`,
    /// carrying one native reference.
    ///
    /// # Errors
    ///
    /// - [`Error::Com`] with `CLASS_E_NOAGGREGATION` when `outer` is given:
    ///   these factories never support a controlling outer
    /// - [`Error::Com`] with `E_NOINTERFACE` when the new instance does not
    ///   implement `iid`
    pub fn create_instance(
        &self,
        map: &CcwLookupMap,
        outer: Option<NativePtr>,
        iid: &Guid,
    ) -> Result<NativePtr> {
        if outer.is_some() {
            debug!(class = ?self.class_type, "aggregation requested and refused");
            return Err(Error::Com(HResult::CLASS_E_NOAGGREGATION));
        }

        let target = (self.constructor)();
        let wrapper = map.get_or_create(&target);
        wrapper
            .query_interface(iid)
            .ok_or(Error::Com(HResult::E_NOINTERFACE))
    }

    /// Parameterless activation: constructs an instance and returns its
    /// inspectable pointer, carrying one native reference.
    pub fn activate_instance(&self, map: &CcwLookupMap) -> Result<NativePtr> {
        self.create_instance(map, None, &IID_IINSPECTABLE)
    }
}

/// Convenience entry point: activates `class_type` and returns its identity
/// pointer, as an activation-factory caller would.
///
/// # Errors
///
/// Same conditions as [`ClassFactory::for_class`] and
/// [`ClassFactory::create_instance`].
pub fn activate_class(
    registry: &ModuleRegistry,
    map: &CcwLookupMap,
    class_type: TypeHandle,
) -> Result<NativePtr> {
    ClassFactory::for_class(registry, class_type)?.create_instance(map, None, &IID_IUNKNOWN)
}
