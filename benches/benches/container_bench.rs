use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use ndarray::Array3;
use pidb_core::{sort, Container, OpenMode, RecordCodec};
use pidb_types::{IntegrationHeader, StokesParams};
use rand::Rng;
use tempfile::tempdir;

const SIDE: usize = 128;
const RECORDS: usize = 64;

fn info(t: f64) -> IntegrationHeader {
    IntegrationHeader {
        stokes_params: StokesParams::parse("I,V"),
        ..IntegrationHeader::new(t, 5.0 / 86_400.0)
    }
}

fn random_image() -> Array3<f32> {
    let mut rng = rand::thread_rng();
    Array3::from_shape_fn((2, SIDE, SIDE), |_| rng.gen())
}

fn bench_codec(c: &mut Criterion) {
    let img = random_image();
    let dir = tempdir().unwrap();
    let path = dir.path().join("codec.pidb");

    let mut db = Container::open(&path, OpenMode::Write).unwrap();
    db.add_image(&info(0.0), &img, None).unwrap();
    let codec: RecordCodec = db.codec().unwrap().clone();
    drop(db);

    let raw = codec.encode(&info(0.0), &img, None).unwrap();

    c.bench_function("encode_2x128x128", |b| {
        b.iter(|| codec.encode(black_box(&info(0.0)), black_box(&img), None))
    });
    c.bench_function("decode_2x128x128", |b| b.iter(|| codec.decode(black_box(&raw))));
    c.bench_function("peek_start_time", |b| {
        b.iter(|| codec.peek_start_time(black_box(&raw)))
    });
}

fn bench_append(c: &mut Criterion) {
    let img = random_image();

    c.bench_function("append_64_records", |b| {
        b.iter_batched(
            || tempdir().unwrap(),
            |dir| {
                let mut db = Container::open(dir.path().join("a.pidb"), OpenMode::Write).unwrap();
                for i in 0..RECORDS {
                    db.add_image(&info(i as f64), &img, None).unwrap();
                }
                db.close().unwrap();
            },
            BatchSize::PerIteration,
        )
    });
}

fn bench_read_and_sort(c: &mut Criterion) {
    let img = random_image();
    let dir = tempdir().unwrap();
    let sorted = dir.path().join("sorted.pidb");

    let mut db = Container::open(&sorted, OpenMode::Write).unwrap();
    for i in 0..RECORDS {
        db.add_image(&info(i as f64), &img, None).unwrap();
    }
    db.close().unwrap();

    c.bench_function("read_all_64_records", |b| {
        b.iter(|| {
            let mut db = Container::open(&sorted, OpenMode::Read).unwrap();
            db.read_all().unwrap().len()
        })
    });

    c.bench_function("sort_64_reversed_records", |b| {
        b.iter_batched(
            || {
                let path = dir.path().join("reversed.pidb");
                let mut db = Container::open(&path, OpenMode::Write).unwrap();
                for i in (0..RECORDS).rev() {
                    db.add_image(&info(i as f64), &img, None).unwrap();
                }
                db.close().unwrap();
                path
            },
            |path| sort(&path).unwrap(),
            BatchSize::PerIteration,
        )
    });
}

criterion_group!(benches, bench_codec, bench_append, bench_read_and_sort);
criterion_main!(benches);
