//! Benchmarks for VaultKV storage operations

use std::io::Cursor;

use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use vaultkv::DiskMap;

fn map_benchmarks(c: &mut Criterion) {
    let value = b"hello, world!";

    c.bench_function("diskmap_store_unique_keys", |b| {
        let mut n = 0u64;
        let map = DiskMap::new(Cursor::new(Vec::new())).unwrap();
        b.iter(|| {
            map.insert(format!("{n:x}").as_bytes(), value).unwrap();
            n += 1;
        });
    });

    c.bench_function("diskmap_load", |b| {
        const N: u64 = 1000;
        let map = DiskMap::new(Cursor::new(Vec::new())).unwrap();
        for i in 0..N {
            map.insert(format!("{i:x}").as_bytes(), value).unwrap();
        }

        let mut n = 0u64;
        b.iter(|| {
            let key = format!("{:x}", n % N);
            let got = map.get(key.as_bytes()).unwrap();
            assert!(got.is_some());
            n += 1;
        });
    });

    c.bench_function("diskmap_overwrite_key", |b| {
        b.iter_batched(
            || DiskMap::new(Cursor::new(Vec::new())).unwrap(),
            |map| {
                for _ in 0..100 {
                    map.insert(b"key", value).unwrap();
                }
            },
            BatchSize::SmallInput,
        );
    });
}

criterion_group!(benches, map_benchmarks);
criterion_main!(benches);
