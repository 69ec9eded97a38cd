//! Cross-module metadata resolution.
//!
//! The registry owns every registered [`Module`] and answers the queries the
//! wrapper layers ask: name to type, IID to type, and per-type descriptor rows.
//! Modules are kept sorted by descending priority and queries consult them in that
//! order, so a higher-priority module shadows a lower one for the same name or IID.
//!
//! Per-type answers are memoized in concurrent maps, including negative answers;
//! registering a module invalidates all memoized state. A lookup racing a
//! registration skips memoization (epoch check), so an answer computed against
//! the old module list can never be pinned past the invalidation.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, RwLock};

use dashmap::DashMap;
use tracing::{debug, info};
use uguid::Guid;

use crate::registry::internal::internal_module;
use crate::registry::module::Module;
use crate::registry::types::{BoxingData, CcwTemplateData, ClassData, InterfaceData, TypeHandle};

/// Hard cap on registered modules, the internal module included.
pub const MAX_MODULES: usize = 1 << 3;

/// The set of registered interop modules and the lookups across them.
///
/// A process normally uses the [`ModuleRegistry::global`] instance; owned
/// instances exist so tests can build isolated metadata worlds.
///
/// # Examples
///
/// ```rust
/// use combridge::com::IID_IUNKNOWN;
/// use combridge::registry::{ModuleBuilder, ModuleRegistry, TypeHandle};
///
/// let registry = ModuleRegistry::new();
/// let module = ModuleBuilder::new(10)
///     .interface("MyApp.IWidget", TypeHandle::from_raw(0x1000), IID_IUNKNOWN)
///     .build();
/// registry.register(module);
///
/// assert_eq!(
///     registry.try_get_interface_type_from_name("MyApp.IWidget"),
///     Some(TypeHandle::from_raw(0x1000)),
/// );
/// ```
pub struct ModuleRegistry {
    /// Sorted by descending priority; stable for ties.
    modules: RwLock<Vec<Arc<Module>>>,
    /// Bumped (under the modules write lock) by every registration.
    epoch: AtomicU64,
    interface_cache: DashMap<TypeHandle, Option<InterfaceData>>,
    class_cache: DashMap<TypeHandle, Option<ClassData>>,
    template_cache: DashMap<TypeHandle, Option<CcwTemplateData>>,
    boxing_cache: DashMap<TypeHandle, Option<BoxingData>>,
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        ModuleRegistry::new()
    }
}

impl ModuleRegistry {
    /// An empty registry. The internal module is added on first registration.
    #[must_use]
    pub fn new() -> ModuleRegistry {
        ModuleRegistry {
            modules: RwLock::new(Vec::new()),
            epoch: AtomicU64::new(0),
            interface_cache: DashMap::new(),
            class_cache: DashMap::new(),
            template_cache: DashMap::new(),
            boxing_cache: DashMap::new(),
        }
    }

    /// The process-wide registry.
    ///
    /// Shared as an `Arc` because wrapper shims keep their own handle to it for
    /// callbacks arriving from native code at arbitrary times.
    #[must_use]
    pub fn global() -> Arc<ModuleRegistry> {
        static GLOBAL: OnceLock<Arc<ModuleRegistry>> = OnceLock::new();
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(ModuleRegistry::new())))
    }

    /// Registers a module, keeping the priority order.
    ///
    /// The first registration also inserts the built-in base-interface module.
    /// Registration past [`MAX_MODULES`] is a fatal condition: the metadata world
    /// is sized at build time and an overflow means the embedder misconfigured it.
    pub fn register(&self, module: Module) {
        let module = Arc::new(module);
        {
            let mut modules = self.modules.write().unwrap_or_else(|e| e.into_inner());

            let mut pending = Vec::with_capacity(2);
            if !module.is_internal() && !modules.iter().any(|m| m.is_internal()) {
                pending.push(Arc::new(internal_module()));
            }
            pending.push(Arc::clone(&module));

            if modules.len() + pending.len() > MAX_MODULES {
                fail_fast!("interop module registry overflow (max {MAX_MODULES} modules)");
            }

            for entry in pending {
                let at = modules
                    .iter()
                    .position(|m| m.priority() < entry.priority())
                    .unwrap_or(modules.len());
                modules.insert(at, entry);
            }

            // Bumped while still holding the write lock: a lookup that reads
            // the new epoch is guaranteed to see the new module list too.
            self.epoch.fetch_add(1, Ordering::Release);

            info!(
                module = %module.name(),
                priority = module.priority(),
                registered = modules.len(),
                "registered interop module"
            );
        }

        // Memoized answers (negative ones included) may change; drop them all.
        // Taken after the module lock is released to keep lock order one-way.
        self.interface_cache.clear();
        self.class_cache.clear();
        self.template_cache.clear();
        self.boxing_cache.clear();
    }

    /// Number of registered modules.
    #[must_use]
    pub fn module_count(&self) -> usize {
        self.modules.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn snapshot(&self) -> Vec<Arc<Module>> {
        self.modules
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Resolves an interface name to its type handle.
    #[must_use]
    pub fn try_get_interface_type_from_name(&self, name: &str) -> Option<TypeHandle> {
        for module in self.snapshot() {
            if let Some(row) = module.interface_from_name(name) {
                return Some(row.type_handle);
            }
        }
        None
    }

    /// Resolves a runtime class name to the most specific type handle available.
    ///
    /// Two full passes: every module's class table first, then every module's
    /// additional-class table. A class row that was reduced away (null handle)
    /// resolves to its nearest existing base.
    #[must_use]
    pub fn try_get_class_type_from_name(&self, name: &str) -> Option<TypeHandle> {
        let modules = self.snapshot();

        for module in &modules {
            if let Some(row) = module.class_from_name(name) {
                if !row.type_handle.is_null() {
                    return Some(row.type_handle);
                }
                if let Some(base) = self.nearest_existing_base(row.base_class) {
                    return Some(base);
                }
            }
        }

        for module in &modules {
            if let Some(base) = module.class_from_name_in_additional_data(name) {
                return Some(base);
            }
        }

        debug!(class = name, "runtime class name did not resolve");
        None
    }

    /// Walks a base-class chain to the first type that still exists.
    fn nearest_existing_base(&self, mut handle: TypeHandle) -> Option<TypeHandle> {
        while !handle.is_null() {
            match self.class_data_for(handle) {
                Some(row) if !row.type_handle.is_null() => return Some(row.type_handle),
                Some(row) => handle = row.base_class,
                // No row: the handle names a type outside the class tables.
                None => return Some(handle),
            }
        }
        None
    }

    /// Resolves an IID to the interface type registered under it.
    #[must_use]
    pub fn get_type_from_guid(&self, iid: &Guid) -> Option<TypeHandle> {
        for module in self.snapshot() {
            if let Some(handle) = module.type_from_guid(iid) {
                return Some(handle);
            }
        }
        None
    }

    /// Looks up `handle` in `cache`, computing and memoizing on a miss.
    ///
    /// The epoch is read before the compute and rechecked before the insert: if
    /// a registration landed in between, the computed answer may predate the
    /// cache clear and is returned without being memoized.
    fn memoized<V: Clone>(
        &self,
        cache: &DashMap<TypeHandle, V>,
        handle: TypeHandle,
        compute: impl FnOnce() -> V,
    ) -> V {
        if let Some(cached) = cache.get(&handle) {
            return cached.clone();
        }
        let epoch = self.epoch.load(Ordering::Acquire);
        let value = compute();
        if self.epoch.load(Ordering::Acquire) == epoch {
            cache.insert(handle, value.clone());
        }
        value
    }

    /// Interface row for `handle`, memoized.
    #[must_use]
    pub fn interface_data_for(&self, handle: TypeHandle) -> Option<InterfaceData> {
        self.memoized(&self.interface_cache, handle, || {
            self.snapshot()
                .iter()
                .find_map(|m| m.interface_data(handle).copied())
        })
    }

    /// Class row for `handle`, memoized.
    #[must_use]
    pub fn class_data_for(&self, handle: TypeHandle) -> Option<ClassData> {
        self.memoized(&self.class_cache, handle, || {
            self.snapshot()
                .iter()
                .find_map(|m| m.class_data(handle).copied())
        })
    }

    /// Wrapper template for `handle`, memoized.
    #[must_use]
    pub fn ccw_template_for(&self, handle: TypeHandle) -> Option<CcwTemplateData> {
        self.memoized(&self.template_cache, handle, || {
            self.snapshot()
                .iter()
                .find_map(|m| m.ccw_template(handle).cloned())
        })
    }

    /// Runtime class name recorded for `handle`, from its wrapper template.
    #[must_use]
    pub fn runtime_class_name_of(&self, handle: TypeHandle) -> Option<String> {
        for module in self.snapshot() {
            if let Some(template) = module.ccw_template(handle) {
                return Some(module.ccw_template_name(template));
            }
        }
        None
    }

    /// Boxing row for `handle`, memoized.
    #[must_use]
    pub fn boxing_data_for(&self, handle: TypeHandle) -> Option<BoxingData> {
        self.memoized(&self.boxing_cache, handle, || {
            self.snapshot()
                .iter()
                .find_map(|m| m.boxing_data(handle).copied())
        })
    }
}
