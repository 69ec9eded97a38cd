//! Registry-level resolution scenarios across several registered modules.

use std::sync::Arc;
use std::thread;

use uguid::{guid, Guid};

use combridge::registry::{
    ClassData, InterfaceData, MarshalingType, ModuleBuilder, ModuleRegistry, TypeHandle,
    TYPE_IUNKNOWN,
};
use combridge::com::{IID_IINSPECTABLE, IID_IUNKNOWN};

const IID_STREAM: Guid = guid!("905a0fe0-0001-0002-0003-0000000000a0");
const IID_STREAM_V2: Guid = guid!("905a0fe0-0001-0002-0003-0000000000a1");

fn app_module(priority: i32, stream_handle: usize) -> combridge::registry::Module {
    ModuleBuilder::new(priority)
        .named("app")
        .interface_data(
            "Windows.Storage.Streams.IInputStream",
            InterfaceData::new(TypeHandle::from_raw(stream_handle), IID_STREAM)
                .inspectable()
                .with_marshaling(MarshalingType::Standard),
        )
        .class(
            "Windows.Storage.Streams.FileInputStream",
            ClassData::new(TypeHandle::from_raw(stream_handle + 1))
                .with_default_interface(TypeHandle::from_raw(stream_handle)),
        )
        .additional_class(
            "Windows.Storage.Streams.OpaqueInputStream",
            TypeHandle::from_raw(stream_handle + 1),
        )
        .ccw_template(
            "Windows.Storage.Streams.FileInputStream",
            TypeHandle::from_raw(stream_handle + 1),
            TypeHandle::NULL,
            vec![TypeHandle::from_raw(stream_handle)],
        )
        .build()
}

#[test]
fn test_internal_interfaces_always_resolve() {
    let registry = ModuleRegistry::new();
    // The built-in module is registered on first use, no user module needed.
    assert_eq!(registry.get_type_from_guid(&IID_IUNKNOWN), Some(TYPE_IUNKNOWN));
    assert!(registry.get_type_from_guid(&IID_IINSPECTABLE).is_some());
    assert_eq!(registry.module_count(), 1);
}

#[test]
fn test_name_and_guid_resolution_agree() {
    let registry = ModuleRegistry::new();
    registry.register(app_module(0, 0x500));

    let by_name = registry
        .try_get_interface_type_from_name("Windows.Storage.Streams.IInputStream")
        .unwrap();
    let by_guid = registry.get_type_from_guid(&IID_STREAM).unwrap();
    assert_eq!(by_name, by_guid);

    let data = registry.interface_data_for(by_name).unwrap();
    assert_eq!(data.iid, IID_STREAM);
    assert_eq!(data.marshaling, MarshalingType::Standard);
}

#[test]
fn test_higher_priority_module_shadows_names() {
    let registry = ModuleRegistry::new();
    registry.register(app_module(0, 0x500));
    registry.register(
        ModuleBuilder::new(10)
            .named("override")
            .interface_data(
                "Windows.Storage.Streams.IInputStream",
                InterfaceData::new(TypeHandle::from_raw(0x900), IID_STREAM_V2),
            )
            .build(),
    );

    assert_eq!(
        registry.try_get_interface_type_from_name("Windows.Storage.Streams.IInputStream"),
        Some(TypeHandle::from_raw(0x900))
    );
    // The shadowed module still answers queries nothing shadows.
    assert_eq!(
        registry.get_type_from_guid(&IID_STREAM),
        Some(TypeHandle::from_raw(0x500))
    );
}

#[test]
fn test_unlisted_class_falls_back_to_nearest_base() {
    let registry = ModuleRegistry::new();
    registry.register(app_module(0, 0x500));

    // A runtime class name only the additional table knows maps to the nearest
    // registered base class.
    assert_eq!(
        registry.try_get_class_type_from_name("Windows.Storage.Streams.OpaqueInputStream"),
        Some(TypeHandle::from_raw(0x501))
    );
    assert!(registry
        .try_get_class_type_from_name("Windows.Storage.Streams.NeverHeardOfIt")
        .is_none());
}

#[test]
fn test_class_name_survives_pool_roundtrip() {
    let registry = ModuleRegistry::new();
    registry.register(app_module(0, 0x500));

    // Compressed storage must reproduce the exact registered spelling.
    assert_eq!(
        registry.runtime_class_name_of(TypeHandle::from_raw(0x501)).as_deref(),
        Some("Windows.Storage.Streams.FileInputStream")
    );

    // Non-ASCII names take the wide-storage path.
    let registry = ModuleRegistry::new();
    registry.register(
        ModuleBuilder::new(0)
            .ccw_template(
                "App.Génériques.Donnée",
                TypeHandle::from_raw(0x700),
                TypeHandle::NULL,
                Vec::new(),
            )
            .build(),
    );
    assert_eq!(
        registry.runtime_class_name_of(TypeHandle::from_raw(0x700)).as_deref(),
        Some("App.Génériques.Donnée")
    );
}

#[test]
fn test_concurrent_lookups_during_registration() {
    let registry = Arc::new(ModuleRegistry::new());
    registry.register(app_module(0, 0x500));

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let registry = Arc::clone(&registry);
            thread::spawn(move || {
                for _ in 0..1_000 {
                    let handle = registry
                        .try_get_interface_type_from_name("Windows.Storage.Streams.IInputStream")
                        .unwrap();
                    assert!(registry.interface_data_for(handle).is_some());
                }
            })
        })
        .collect();

    let writer = {
        let registry = Arc::clone(&registry);
        thread::spawn(move || {
            for i in 0..4 {
                registry.register(
                    ModuleBuilder::new(-1 - i)
                        .named("extra")
                        .interface(
                            "Extra.IThing",
                            TypeHandle::from_raw(0x800 + i as usize),
                            guid!("905a0fe0-dead-beef-0000-0000000000ff"),
                        )
                        .build(),
                );
            }
        })
    };

    for reader in readers {
        reader.join().unwrap();
    }
    writer.join().unwrap();
    assert_eq!(registry.module_count(), 6);
}
