//! Benchmarks for the interop hot-path primitives.
//!
//! Covers the operations that sit on wrapper-creation and dispatch paths:
//! - Dictionary insert and lookup (identity caches)
//! - AppendList append and scan (interface caches)
//! - Stable name hashing and registry name/GUID resolution

extern crate combridge;

use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;

use combridge::collections::{AppendList, Dictionary};
use combridge::com::IID_IUNKNOWN;
use combridge::registry::{ModuleBuilder, ModuleRegistry, StringPool, TypeHandle};

/// Benchmark inserting 256 distinct keys into a fresh table.
fn bench_dictionary_insert(c: &mut Criterion) {
    c.bench_function("dictionary_insert_256", |b| {
        b.iter(|| {
            let mut dict: Dictionary<usize, usize> = Dictionary::new();
            for key in 0..256usize {
                dict.insert(black_box(key * 8), key).unwrap();
            }
            black_box(dict.len())
        });
    });
}

/// Benchmark a lookup that hits, against a populated table.
fn bench_dictionary_lookup_hit(c: &mut Criterion) {
    let mut dict: Dictionary<usize, usize> = Dictionary::new();
    for key in 0..4096usize {
        dict.insert(key * 8, key).unwrap();
    }

    c.bench_function("dictionary_lookup_hit", |b| {
        b.iter(|| black_box(dict.get(black_box(&2048))));
    });
}

/// Benchmark a lookup that misses, against a populated table.
fn bench_dictionary_lookup_miss(c: &mut Criterion) {
    let mut dict: Dictionary<usize, usize> = Dictionary::new();
    for key in 0..4096usize {
        dict.insert(key * 8, key).unwrap();
    }

    c.bench_function("dictionary_lookup_miss", |b| {
        b.iter(|| black_box(dict.get(black_box(&3))));
    });
}

/// Benchmark appending 64 entries to a fresh list.
fn bench_append_list_add(c: &mut Criterion) {
    c.bench_function("appendlist_add_64", |b| {
        b.iter(|| {
            let list: AppendList<usize> = AppendList::new();
            for value in 0..64usize {
                list.add(black_box(value));
            }
            black_box(list.len())
        });
    });
}

/// Benchmark scanning a small list, the shape of an interface-cache probe.
fn bench_append_list_scan(c: &mut Criterion) {
    let list: AppendList<usize> = AppendList::new();
    for value in 0..8usize {
        list.add(value);
    }

    c.bench_function("appendlist_scan_8", |b| {
        b.iter(|| {
            let found = list.iter().find(|&v| v == black_box(7));
            black_box(found)
        });
    });
}

/// Benchmark the stable name hash over a typical runtime class name.
fn bench_stable_name_hash(c: &mut Criterion) {
    let name = "Windows.Storage.Streams.IRandomAccessStreamWithContentType";

    c.bench_function("stringpool_stable_hash", |b| {
        b.iter(|| black_box(StringPool::stable_hash_str(black_box(name))));
    });
}

fn populated_registry() -> ModuleRegistry {
    let mut builder = ModuleBuilder::new(0).named("bench");
    for i in 0..512usize {
        let name = format!("Windows.Bench.Types.IGenerated{i}");
        builder = builder.interface(&name, TypeHandle::from_raw(0x1000 + i), IID_IUNKNOWN);
    }
    let registry = ModuleRegistry::new();
    registry.register(builder.build());
    registry
}

/// Benchmark resolving an interface name through a 512-row module.
fn bench_registry_name_lookup(c: &mut Criterion) {
    let registry = populated_registry();

    c.bench_function("registry_name_lookup", |b| {
        b.iter(|| {
            let handle = registry
                .try_get_interface_type_from_name(black_box("Windows.Bench.Types.IGenerated300"));
            black_box(handle)
        });
    });
}

/// Benchmark the memoized per-handle row lookup, the wrapper-creation shape.
fn bench_registry_interface_data(c: &mut Criterion) {
    let registry = populated_registry();

    c.bench_function("registry_interface_data", |b| {
        b.iter(|| black_box(registry.interface_data_for(black_box(TypeHandle::from_raw(0x1100)))));
    });
}

criterion_group!(
    benches,
    // Identity-cache primitives
    bench_dictionary_insert,
    bench_dictionary_lookup_hit,
    bench_dictionary_lookup_miss,
    // Interface-cache primitives
    bench_append_list_add,
    bench_append_list_scan,
    // Metadata resolution
    bench_stable_name_hash,
    bench_registry_name_lookup,
    bench_registry_interface_data,
);
criterion_main!(benches);
