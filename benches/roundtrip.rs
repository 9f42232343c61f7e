#![allow(missing_docs)]

use criterion::{criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use satchel::{BinaryCodec, Codec, EntitySet, JsonCodec, Persist, Satchel, Vec3};
use std::hint::black_box;

#[derive(Clone, Debug, Default, Persist)]
#[persist(nested)]
struct Slot {
    #[persist]
    item: String,
    #[persist]
    count: u16,
}

#[derive(Clone, Debug, Default, Persist)]
#[persist(file = "world")]
struct BenchEntity {
    #[persist(id)]
    id: String,
    #[persist]
    hp: i64,
    #[persist]
    pos: Vec3,
    #[persist]
    tags: Vec<String>,
    #[persist]
    inventory: Vec<Slot>,
}

fn generate_world(count: usize) -> EntitySet {
    let mut set = EntitySet::new();
    for i in 0..count {
        set.insert(BenchEntity {
            id: format!("e-{i}"),
            hp: i64::try_from(i).unwrap_or_default(),
            pos: Vec3::new(1.0, 2.0, 3.0),
            tags: vec!["npc".into(), "merchant".into()],
            inventory: (0..8)
                .map(|s| Slot {
                    item: format!("item-{s}"),
                    count: s,
                })
                .collect(),
        });
    }
    set
}

fn fresh_world(count: usize) -> EntitySet {
    let mut set = EntitySet::new();
    for i in 0..count {
        set.insert(BenchEntity {
            id: format!("e-{i}"),
            ..BenchEntity::default()
        });
    }
    set
}

// --- BENCHMARKS ---

fn bench_documents(c: &mut Criterion) {
    let count = 1_000;
    let satchel = Satchel::builder().build().expect("default configuration");
    let mut world = generate_world(count);

    let mut group = c.benchmark_group("Document");
    group.throughput(Throughput::Elements(count as u64));

    // 1. Live graph -> document
    group.bench_function("build_document", |b| {
        b.iter(|| {
            let doc = satchel
                .build_document("world", world.iter_mut())
                .expect("build failed");
            black_box(doc);
        });
    });

    // 2. Document -> live graph
    let doc = satchel
        .build_document("world", world.iter_mut())
        .expect("build failed");
    group.bench_function("restore_document", |b| {
        b.iter_batched(
            || fresh_world(count),
            |mut target| {
                let report = satchel
                    .restore_document(&doc, target.iter_mut())
                    .expect("restore failed");
                black_box(report);
            },
            BatchSize::LargeInput,
        );
    });

    // 3. Codecs
    for codec in [&JsonCodec::compact() as &dyn Codec, &BinaryCodec] {
        let bytes = codec.encode(&doc).expect("encode failed");
        group.bench_function(format!("encode_{}", codec.extension()), |b| {
            b.iter(|| black_box(codec.encode(black_box(&doc)).expect("encode failed")));
        });
        group.bench_function(format!("decode_{}", codec.extension()), |b| {
            b.iter(|| black_box(codec.decode(black_box(&bytes)).expect("decode failed")));
        });
    }
    group.finish();
}

fn bench_files(c: &mut Criterion) {
    let count = 1_000;
    let dir = tempfile::tempdir().expect("temp dir");
    let satchel = Satchel::builder()
        .save_dir(dir.path())
        .codec(BinaryCodec)
        .build()
        .expect("binary configuration");
    let mut world = generate_world(count);

    let mut group = c.benchmark_group("Files");
    group.sample_size(20);

    group.bench_function("save_all", |b| {
        b.iter(|| black_box(satchel.save_all(&mut world).expect("save failed")));
    });
    group.bench_function("load_all", |b| {
        b.iter_batched(
            || fresh_world(count),
            |mut target| black_box(satchel.load_all(&mut target).expect("load failed")),
            BatchSize::LargeInput,
        );
    });
    group.finish();
}

criterion_group!(benches, bench_documents, bench_files);
criterion_main!(benches);
