use criterion::{criterion_group, criterion_main, Criterion};
use nanoid::nanoid;
use std::hint::black_box;
use std::sync::Arc;
use vtree::{Config, Item, MemoryStore, ReadStreamOpts, Version};

fn write_throughput(c: &mut Criterion) {
    c.bench_function("write + drain", |b| {
        let store = Arc::new(MemoryStore::new());
        let tree = Config::new("bench").open(store).unwrap();
        let mut n = 0u64;

        b.iter(|| {
            n += 1;
            let id = nanoid!(12);
            tree.write(Item::new(id.as_str(), Version::from_u64(n, 6).unwrap()))
                .unwrap();
            tree.drain().unwrap();
        });
    });
}

fn scan_throughput(c: &mut Criterion) {
    c.bench_function("insertion order scan", |b| {
        let store = Arc::new(MemoryStore::new());
        let tree = Config::new("bench").open(store).unwrap();

        for n in 1..=10_000u64 {
            let mut item = Item::new("doc", Version::from_u64(n, 6).unwrap());
            if n > 1 {
                item = item.parent(Version::from_u64(n - 1, 6).unwrap());
            }
            tree.write(item).unwrap();
        }
        tree.drain().unwrap();

        b.iter(|| {
            let count = tree
                .read_stream(ReadStreamOpts::new())
                .unwrap()
                .map(|entry| entry.unwrap())
                .count();
            black_box(count)
        });
    });
}

fn point_lookup(c: &mut Criterion) {
    c.bench_function("get by version", |b| {
        let store = Arc::new(MemoryStore::new());
        let tree = Config::new("bench").open(store).unwrap();

        for n in 1..=10_000u64 {
            let mut item = Item::new("doc", Version::from_u64(n, 6).unwrap());
            if n > 1 {
                item = item.parent(Version::from_u64(n - 1, 6).unwrap());
            }
            tree.write(item).unwrap();
        }
        tree.drain().unwrap();

        let needle = Version::from_u64(5_000, 6).unwrap();

        b.iter(|| tree.get_by_version(black_box(&needle)).unwrap());
    });
}

criterion_group!(benches, write_throughput, scan_throughput, point_lookup);
criterion_main!(benches);
