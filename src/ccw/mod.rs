//! Native-callable wrappers for managed objects.
//!
//! The mirror image of [`crate::rcw`]: a managed object crossing into native
//! code gets exactly one wrapper, whose interface shims follow the standard
//! vtable ABI. The wrapper's reference count is a *native* count, distinct from
//! managed reachability: while it is above zero the wrapper holds the target
//! strongly (native code must not lose the object), and at zero the hold drops
//! to a weak one (the object lives or dies by managed references alone).
//!
//! # Key Components
//!
//! - [`ManagedObject`] - what the embedding runtime implements per exposed type
//! - [`ComCallableObject`] - the wrapper: refcount, target bridge, shims
//! - [`CcwLookupMap`] - identity map; one wrapper per live target
//! - [`ClassFactory`] - native-driven activation of registered classes
//! - [`unwrap_managed`] - recognizes our own shims by vtable identity

mod factory;
mod lookup;
mod object;
mod vtable;

pub use factory::{activate_class, ClassFactory};
pub use lookup::{outer_inspectable_for, CcwLookupMap};
pub use object::{ComCallableObject, ManagedObject};
pub use vtable::unwrap_managed;

#[cfg(test)]
mod tests {
    use std::any::Any;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use uguid::guid;

    use super::*;
    use crate::com::{
        raw_add_ref, raw_query_interface, raw_release, HResult, NativePtr, IID_IAGILEOBJECT,
        IID_IDISPATCH, IID_IINSPECTABLE, IID_IMARSHAL, IID_IUNKNOWN,
    };
    use crate::registry::{ClassData, ModuleBuilder, ModuleRegistry, TypeHandle};
    use uguid::Guid;

    const COUNTER_CLASS: TypeHandle = TypeHandle::from_raw(0x100);
    const COUNTER_ITF: TypeHandle = TypeHandle::from_raw(0x101);
    const BASE_CLASS: TypeHandle = TypeHandle::from_raw(0x200);
    const BASE_ITF: TypeHandle = TypeHandle::from_raw(0x201);
    const IID_COUNTER: Guid = guid!("c0c0c0c0-0000-0000-0000-000000000001");
    const IID_BASE: Guid = guid!("c0c0c0c0-0000-0000-0000-000000000002");
    const IID_OTHER: Guid = guid!("c0c0c0c0-0000-0000-0000-00000000000f");

    struct Counter {
        value: AtomicU32,
    }

    impl Counter {
        fn shared() -> Arc<dyn ManagedObject> {
            Arc::new(Counter {
                value: AtomicU32::new(0),
            })
        }
    }

    impl ManagedObject for Counter {
        fn type_handle(&self) -> TypeHandle {
            COUNTER_CLASS
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    fn test_registry() -> Arc<ModuleRegistry> {
        let registry = ModuleRegistry::new();
        registry.register(
            ModuleBuilder::new(0)
                .named("ccw-test")
                .interface("App.ICounter", COUNTER_ITF, IID_COUNTER)
                .interface("App.IBase", BASE_ITF, IID_BASE)
                .class(
                    "App.Counter",
                    ClassData::new(COUNTER_CLASS)
                        .with_base(BASE_CLASS)
                        .with_constructor(Counter::shared),
                )
                .ccw_template("App.Counter", COUNTER_CLASS, BASE_CLASS, vec![COUNTER_ITF])
                .ccw_template("App.Base", BASE_CLASS, TypeHandle::NULL, vec![BASE_ITF])
                .build(),
        );
        Arc::new(registry)
    }

    #[test]
    fn test_one_wrapper_per_target() {
        let map = CcwLookupMap::new(test_registry());
        let target = Counter::shared();

        let first = map.get_or_create(&target);
        let second = map.get_or_create(&target);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(map.len(), 1);

        let other = Counter::shared();
        let third = map.get_or_create(&other);
        assert!(!Arc::ptr_eq(&first, &third));
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn test_refcount_pins_and_unpins_target() {
        let map = CcwLookupMap::new(test_registry());
        let target = Counter::shared();
        let wrapper = map.get_or_create(&target);

        let ptr = wrapper.unknown_ptr();
        assert_eq!(wrapper.ref_count(), 1);

        // Native holds the only interest; the managed reference goes away and
        // the target must survive through the pin.
        drop(target);
        assert!(wrapper.target().is_some());

        assert_eq!(unsafe { raw_release(ptr) }, 0);
        assert!(wrapper.target().is_none());
    }

    #[test]
    fn test_release_to_zero_keeps_entry_while_target_lives() {
        let map = CcwLookupMap::new(test_registry());
        let target = Counter::shared();
        let wrapper = map.get_or_create(&target);

        let ptr = wrapper.unknown_ptr();
        assert_eq!(unsafe { raw_release(ptr) }, 0);

        // Re-marshal after release: same wrapper, same identity pointer.
        let again = map.get_or_create(&target);
        assert!(Arc::ptr_eq(&wrapper, &again));
        assert_eq!(again.unknown_ptr(), ptr);
        assert_eq!(unsafe { raw_release(ptr) }, 0);
    }

    #[test]
    fn test_dead_target_entry_is_purged() {
        let map = CcwLookupMap::new(test_registry());
        let target = Counter::shared();
        let wrapper = map.get_or_create(&target);
        drop(target);
        drop(wrapper);
        assert_eq!(map.len(), 1);

        // The next operation purges the husk.
        let other = Counter::shared();
        let _ = map.get_or_create(&other);
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_query_interface_standard_and_template() {
        let map = CcwLookupMap::new(test_registry());
        let target = Counter::shared();
        let wrapper = map.get_or_create(&target);

        let unknown = wrapper.query_interface(&IID_IUNKNOWN).unwrap();
        let inspectable = wrapper.query_interface(&IID_IINSPECTABLE).unwrap();
        let agile = wrapper.query_interface(&IID_IAGILEOBJECT).unwrap();
        // Identity: the standard interfaces share one pointer.
        assert_eq!(unknown, inspectable);
        assert_eq!(unknown, agile);

        // Own template interface, and an inherited one through the chain.
        let counter = wrapper.query_interface(&IID_COUNTER).unwrap();
        assert_ne!(counter, unknown);
        let base = wrapper.query_interface(&IID_BASE).unwrap();
        assert_ne!(base, unknown);

        // Unknown IID refused without a refcount change.
        let before = wrapper.ref_count();
        assert!(wrapper.query_interface(&IID_OTHER).is_none());
        assert_eq!(wrapper.ref_count(), before);

        for ptr in [unknown, inspectable, agile, counter, base] {
            unsafe {
                raw_release(ptr);
            }
        }
        assert_eq!(wrapper.ref_count(), 0);
    }

    #[test]
    fn test_every_wrapper_answers_marshal_and_dispatch() {
        let map = CcwLookupMap::new(test_registry());
        let target = Counter::shared();
        let wrapper = map.get_or_create(&target);

        // Marshalling (free-threading declaration) and legacy dispatch are
        // universal: they resolve on every wrapper, to the identity shim.
        let unknown = wrapper.query_interface(&IID_IUNKNOWN).unwrap();
        let marshal = wrapper.query_interface(&IID_IMARSHAL).unwrap();
        let dispatch = wrapper.query_interface(&IID_IDISPATCH).unwrap();
        assert_eq!(marshal, unknown);
        assert_eq!(dispatch, unknown);

        for ptr in [unknown, marshal, dispatch] {
            unsafe {
                raw_release(ptr);
            }
        }
        assert_eq!(wrapper.ref_count(), 0);
    }

    #[test]
    fn test_over_release_saturates_at_zero() {
        let map = CcwLookupMap::new(test_registry());
        let target = Counter::shared();
        let wrapper = map.get_or_create(&target);

        let ptr = wrapper.unknown_ptr();
        assert_eq!(unsafe { raw_release(ptr) }, 0);

        // A buggy native caller releasing once too often must not wrap the
        // count back up.
        assert_eq!(wrapper.com_release(), 0);
        assert_eq!(wrapper.ref_count(), 0);

        // The wrapper still pins and releases normally afterwards.
        let again = wrapper.unknown_ptr();
        assert_eq!(wrapper.ref_count(), 1);
        drop(target);
        assert!(wrapper.target().is_some());
        assert_eq!(unsafe { raw_release(again) }, 0);
        assert!(wrapper.target().is_none());
    }

    #[test]
    fn test_native_queries_through_the_shim() {
        let map = CcwLookupMap::new(test_registry());
        let target = Counter::shared();
        let wrapper = map.get_or_create(&target);
        let unknown = wrapper.unknown_ptr();

        // Call QueryInterface the way native code does, through the vtable.
        let (hr, out) = unsafe { raw_query_interface(unknown, &IID_COUNTER) };
        assert!(hr.is_success());
        let counter = out.unwrap();

        let (hr, _) = unsafe { raw_query_interface(counter, &IID_OTHER) };
        assert_eq!(hr, HResult::E_NOINTERFACE);

        // A second reference through AddRef.
        assert_eq!(unsafe { raw_add_ref(counter) }, 3);
        unsafe {
            raw_release(counter);
            raw_release(counter);
            raw_release(unknown);
        }
        assert_eq!(wrapper.ref_count(), 0);
    }

    #[test]
    fn test_unwrap_managed_recognizes_own_shims() {
        let map = CcwLookupMap::new(test_registry());
        let target = Counter::shared();
        let wrapper = map.get_or_create(&target);
        let unknown = wrapper.unknown_ptr();

        let recovered = unsafe { unwrap_managed(unknown) }.unwrap();
        assert!(Arc::ptr_eq(
            &recovered,
            &target
        ));

        // A foreign pointer is recognized as not ours.
        let foreign = crate::rcw::fixtures::FixtureObject::new("", false);
        assert!(unsafe { unwrap_managed(foreign.as_native()) }.is_none());

        unsafe {
            raw_release(unknown);
        }
    }

    #[test]
    fn test_class_factory_activation() {
        let registry = test_registry();
        let map = CcwLookupMap::new(Arc::clone(&registry));

        let factory = ClassFactory::for_class(&registry, COUNTER_CLASS).unwrap();
        let ptr = factory.create_instance(&map, None, &IID_COUNTER).unwrap();
        let recovered = unsafe { unwrap_managed(ptr) }.unwrap();
        assert!(recovered.as_any().downcast_ref::<Counter>().is_some());
        unsafe {
            raw_release(ptr);
        }

        // Aggregation refused.
        let outer = NativePtr::from_ptr(&factory as *const ClassFactory as *mut _).unwrap();
        match factory.create_instance(&map, Some(outer), &IID_COUNTER) {
            Err(crate::Error::Com(hr)) => assert_eq!(hr, HResult::CLASS_E_NOAGGREGATION),
            other => panic!("expected CLASS_E_NOAGGREGATION, got {other:?}"),
        }

        // Unknown class is a metadata error.
        assert!(ClassFactory::for_class(&registry, TypeHandle::from_raw(0xDEAD)).is_err());
    }

    #[test]
    fn test_counter_state_survives_roundtrip() {
        let map = CcwLookupMap::new(test_registry());
        let target = Counter::shared();
        target
            .as_any()
            .downcast_ref::<Counter>()
            .unwrap()
            .value
            .store(41, Ordering::SeqCst);

        let wrapper = map.get_or_create(&target);
        let ptr = wrapper.unknown_ptr();
        let recovered = unsafe { unwrap_managed(ptr) }.unwrap();
        let counter = recovered.as_any().downcast_ref::<Counter>().unwrap();
        assert_eq!(counter.value.fetch_add(1, Ordering::SeqCst), 41);
        unsafe {
            raw_release(ptr);
        }
    }
}
