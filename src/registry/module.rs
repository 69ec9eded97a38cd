//! One interop metadata module: immutable tables plus per-module lookups.
//!
//! A module is the unit of metadata registration. It bundles index-aligned tables
//! (interface rows with their names, class rows with their names, and so on) that
//! are frozen at build time; every lookup structure on top of them is either built
//! eagerly by [`ModuleBuilder::build`] or lazily on first use behind an atomic
//! publish. A built module is therefore freely shared across threads.

use std::sync::{Arc, OnceLock};

use tracing::trace;
use uguid::Guid;

use crate::collections::{mask_hash, FixedHashTable};
use crate::registry::stringpool::{StringMap, StringPoolBuilder};
use crate::registry::types::{
    AdditionalClassData, BoxingData, CcwTemplateData, ClassData, InterfaceData, TypeHandle,
};
use crate::registry::StringPool;

/// 31-bit hash of an IID for the GUID lookup table.
pub(crate) fn guid_hash(iid: &Guid) -> i32 {
    let bytes = iid.to_bytes();
    let mut lo = 0u64;
    let mut hi = 0u64;
    for &b in &bytes[..8] {
        lo = (lo << 8) | u64::from(b);
    }
    for &b in &bytes[8..] {
        hi = (hi << 8) | u64::from(b);
    }
    mask_hash(lo ^ hi)
}

/// An immutable interop metadata module.
///
/// Constructed through [`ModuleBuilder`] and registered with
/// [`crate::registry::ModuleRegistry`].
pub struct Module {
    name: String,
    priority: i32,
    is_internal: bool,
    pool: Arc<StringPool>,
    interfaces: Vec<InterfaceData>,
    interface_names: StringMap,
    classes: Vec<ClassData>,
    class_names: StringMap,
    additional: Vec<AdditionalClassData>,
    additional_names: StringMap,
    ccw_templates: Vec<CcwTemplateData>,
    boxing: Vec<BoxingData>,
    /// IID reverse index over `interfaces`, built on first GUID lookup.
    guid_map: OnceLock<FixedHashTable>,
}

impl Module {
    /// The module's diagnostic name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registration priority; higher-priority modules are consulted first.
    #[must_use]
    pub fn priority(&self) -> i32 {
        self.priority
    }

    /// Returns `true` for the built-in base-interface module.
    #[must_use]
    pub fn is_internal(&self) -> bool {
        self.is_internal
    }

    /// Number of interface rows.
    #[must_use]
    pub fn interface_count(&self) -> usize {
        self.interfaces.len()
    }

    /// Number of class rows.
    #[must_use]
    pub fn class_count(&self) -> usize {
        self.classes.len()
    }

    /// Interface row at `index`, with its name.
    #[must_use]
    pub fn interface_at(&self, index: usize) -> (&InterfaceData, String) {
        (&self.interfaces[index], self.interface_names.name_at(index))
    }

    /// Row index of the interface registered under `iid`.
    #[must_use]
    pub fn interface_index_from_guid(&self, iid: &Guid) -> Option<usize> {
        if self.interfaces.is_empty() {
            return None;
        }
        let map = self.guid_map.get_or_init(|| {
            let mut map = FixedHashTable::new(self.interfaces.len());
            for (i, row) in self.interfaces.iter().enumerate() {
                map.add(guid_hash(&row.iid), i);
            }
            map
        });

        let mut slot = map.first(guid_hash(iid));
        while slot >= 0 {
            let index = slot as usize;
            if self.interfaces[index].iid == *iid {
                return Some(index);
            }
            slot = map.next(slot);
        }
        None
    }

    /// Type handle of the interface registered under `iid`.
    #[must_use]
    pub fn type_from_guid(&self, iid: &Guid) -> Option<TypeHandle> {
        self.interface_index_from_guid(iid)
            .map(|i| self.interfaces[i].type_handle)
    }

    /// Row index of the interface with type `handle`.
    #[must_use]
    pub fn interface_index_of(&self, handle: TypeHandle) -> Option<usize> {
        self.interfaces
            .iter()
            .position(|row| row.type_handle == handle)
    }

    /// Interface row for type `handle`.
    #[must_use]
    pub fn interface_data(&self, handle: TypeHandle) -> Option<&InterfaceData> {
        self.interface_index_of(handle).map(|i| &self.interfaces[i])
    }

    /// Interface row registered under `name`.
    #[must_use]
    pub fn interface_from_name(&self, name: &str) -> Option<&InterfaceData> {
        self.interface_names.find(name).map(|i| &self.interfaces[i])
    }

    /// Class row registered under `name`.
    #[must_use]
    pub fn class_from_name(&self, name: &str) -> Option<&ClassData> {
        self.class_names.find(name).map(|i| &self.classes[i])
    }

    /// Class row for type `handle`.
    #[must_use]
    pub fn class_data(&self, handle: TypeHandle) -> Option<&ClassData> {
        if handle.is_null() {
            return None;
        }
        self.classes.iter().find(|row| row.type_handle == handle)
    }

    /// Nearest existing base type for a runtime class known only by name.
    #[must_use]
    pub fn class_from_name_in_additional_data(&self, name: &str) -> Option<TypeHandle> {
        self.additional_names
            .find(name)
            .map(|i| self.additional[i].nearest_base)
    }

    /// Wrapper template for type `handle`.
    #[must_use]
    pub fn ccw_template(&self, handle: TypeHandle) -> Option<&CcwTemplateData> {
        self.ccw_templates
            .iter()
            .find(|row| row.type_handle == handle)
    }

    /// Runtime class name recorded on a wrapper template of this module.
    #[must_use]
    pub fn ccw_template_name(&self, template: &CcwTemplateData) -> String {
        self.pool.get(template.name_index)
    }

    /// Boxing row whose boxed class is `handle`.
    #[must_use]
    pub fn boxing_data(&self, handle: TypeHandle) -> Option<&BoxingData> {
        self.boxing.iter().find(|row| row.type_handle == handle)
    }
}

/// Assembles an immutable [`Module`].
///
/// # Examples
///
/// ```rust
/// use combridge::com::IID_IUNKNOWN;
/// use combridge::registry::{ClassData, ModuleBuilder, TypeHandle};
///
/// let widget_itf = TypeHandle::from_raw(0x1000);
/// let module = ModuleBuilder::new(10)
///     .named("MyApp.Interop")
///     .interface("MyApp.IWidget", widget_itf, IID_IUNKNOWN)
///     .class(
///         "MyApp.Widget",
///         ClassData::new(TypeHandle::from_raw(0x2000)).with_default_interface(widget_itf),
///     )
///     .build();
///
/// assert_eq!(module.interface_from_name("MyApp.IWidget").unwrap().type_handle, widget_itf);
/// ```
pub struct ModuleBuilder {
    name: String,
    priority: i32,
    is_internal: bool,
    pool: StringPoolBuilder,
    interfaces: Vec<InterfaceData>,
    interface_name_indices: Vec<u32>,
    classes: Vec<ClassData>,
    class_name_indices: Vec<u32>,
    additional: Vec<AdditionalClassData>,
    additional_name_indices: Vec<u32>,
    ccw_templates: Vec<CcwTemplateData>,
    boxing: Vec<BoxingData>,
}

impl ModuleBuilder {
    /// Starts a module with the given registration priority.
    #[must_use]
    pub fn new(priority: i32) -> ModuleBuilder {
        ModuleBuilder {
            name: String::from("anonymous"),
            priority,
            is_internal: false,
            pool: StringPoolBuilder::new(),
            interfaces: Vec::new(),
            interface_name_indices: Vec::new(),
            classes: Vec::new(),
            class_name_indices: Vec::new(),
            additional: Vec::new(),
            additional_name_indices: Vec::new(),
            ccw_templates: Vec::new(),
            boxing: Vec::new(),
        }
    }

    /// Sets the diagnostic name.
    #[must_use]
    pub fn named(mut self, name: &str) -> ModuleBuilder {
        self.name = name.to_string();
        self
    }

    pub(crate) fn internal(mut self) -> ModuleBuilder {
        self.is_internal = true;
        self
    }

    /// Adds an interface row with default traits.
    #[must_use]
    pub fn interface(self, name: &str, handle: TypeHandle, iid: Guid) -> ModuleBuilder {
        self.interface_data(name, InterfaceData::new(handle, iid))
    }

    /// Adds a fully specified interface row.
    #[must_use]
    pub fn interface_data(mut self, name: &str, data: InterfaceData) -> ModuleBuilder {
        let name_idx = self.pool.add(name);
        self.interface_name_indices.push(name_idx);
        self.interfaces.push(data);
        self
    }

    /// Adds a class row.
    #[must_use]
    pub fn class(mut self, name: &str, data: ClassData) -> ModuleBuilder {
        let name_idx = self.pool.add(name);
        self.class_name_indices.push(name_idx);
        self.classes.push(data);
        self
    }

    /// Adds an additional-class row mapping `name` to its nearest existing base.
    #[must_use]
    pub fn additional_class(mut self, name: &str, nearest_base: TypeHandle) -> ModuleBuilder {
        let name_idx = self.pool.add(name);
        self.additional_name_indices.push(name_idx);
        self.additional.push(AdditionalClassData { nearest_base });
        self
    }

    /// Adds a wrapper template for `handle`, chained to `parent`.
    #[must_use]
    pub fn ccw_template(
        mut self,
        name: &str,
        handle: TypeHandle,
        parent: TypeHandle,
        implemented_interfaces: Vec<TypeHandle>,
    ) -> ModuleBuilder {
        let name_index = self.pool.add(name);
        self.ccw_templates.push(CcwTemplateData {
            type_handle: handle,
            parent,
            implemented_interfaces,
            name_index,
        });
        self
    }

    /// Adds a boxing row.
    #[must_use]
    pub fn boxing(mut self, data: BoxingData) -> ModuleBuilder {
        self.boxing.push(data);
        self
    }

    /// Freezes the tables into a [`Module`].
    #[must_use]
    pub fn build(self) -> Module {
        let pool = Arc::new(self.pool.build());
        trace!(
            module = %self.name,
            interfaces = self.interfaces.len(),
            classes = self.classes.len(),
            "built interop module"
        );
        Module {
            name: self.name,
            priority: self.priority,
            is_internal: self.is_internal,
            interface_names: StringMap::new(Arc::clone(&pool), self.interface_name_indices),
            class_names: StringMap::new(Arc::clone(&pool), self.class_name_indices),
            additional_names: StringMap::new(Arc::clone(&pool), self.additional_name_indices),
            pool,
            interfaces: self.interfaces,
            classes: self.classes,
            additional: self.additional,
            ccw_templates: self.ccw_templates,
            boxing: self.boxing,
            guid_map: OnceLock::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uguid::guid;

    const IID_A: Guid = guid!("11111111-1111-1111-1111-111111111111");
    const IID_B: Guid = guid!("22222222-2222-2222-2222-222222222222");

    fn sample_module() -> Module {
        let itf_a = TypeHandle::from_raw(0x10);
        let itf_b = TypeHandle::from_raw(0x20);
        ModuleBuilder::new(5)
            .named("Sample")
            .interface("App.IAlpha", itf_a, IID_A)
            .interface("App.IBeta", itf_b, IID_B)
            .class(
                "App.Alpha",
                ClassData::new(TypeHandle::from_raw(0x100)).with_default_interface(itf_a),
            )
            .additional_class("App.AlphaDerived", TypeHandle::from_raw(0x100))
            .ccw_template(
                "App.Alpha",
                TypeHandle::from_raw(0x100),
                TypeHandle::NULL,
                vec![itf_a],
            )
            .build()
    }

    #[test]
    fn test_interface_lookup_by_name_and_guid() {
        let module = sample_module();

        let row = module.interface_from_name("App.IBeta").unwrap();
        assert_eq!(row.type_handle, TypeHandle::from_raw(0x20));

        assert_eq!(
            module.type_from_guid(&IID_A),
            Some(TypeHandle::from_raw(0x10))
        );
        assert_eq!(
            module.type_from_guid(&guid!("33333333-3333-3333-3333-333333333333")),
            None
        );
    }

    #[test]
    fn test_class_and_additional_lookup() {
        let module = sample_module();

        let class = module.class_from_name("App.Alpha").unwrap();
        assert_eq!(class.type_handle, TypeHandle::from_raw(0x100));
        assert_eq!(class.default_interface, TypeHandle::from_raw(0x10));

        assert!(module.class_from_name("App.Missing").is_none());
        assert_eq!(
            module.class_from_name_in_additional_data("App.AlphaDerived"),
            Some(TypeHandle::from_raw(0x100))
        );
    }

    #[test]
    fn test_ccw_template_lookup() {
        let module = sample_module();
        let template = module.ccw_template(TypeHandle::from_raw(0x100)).unwrap();
        assert_eq!(template.implemented_interfaces, vec![TypeHandle::from_raw(0x10)]);
        assert_eq!(module.ccw_template_name(template), "App.Alpha");
        assert!(module.ccw_template(TypeHandle::from_raw(0x999)).is_none());
    }

    #[test]
    fn test_interface_data_by_handle() {
        let module = sample_module();
        let row = module.interface_data(TypeHandle::from_raw(0x20)).unwrap();
        assert_eq!(row.iid, IID_B);
        assert!(module.interface_data(TypeHandle::from_raw(0x999)).is_none());
    }
}
