use criterion::{black_box, criterion_group, criterion_main, Criterion};
use kv::{Database, Options};
use tempfile::tempdir;

fn open_bench_db() -> (tempfile::TempDir, std::sync::Arc<Database>) {
    let dir = tempdir().unwrap();
    let mut options = Options::default();
    options.dir_path = dir.path().to_path_buf();
    let db = Database::open(options).unwrap();
    (dir, db)
}

fn put_benchmark(c: &mut Criterion) {
    let (_dir, db) = open_bench_db();
    let mut i = 0u64;
    c.bench_function("put 32B value", |b| {
        b.iter(|| {
            let key = format!("key-{}", i);
            i += 1;
            db.put(black_box(key.as_bytes()), black_box(b"01234567890123456789012345678901")).unwrap();
        })
    });
}

fn get_benchmark(c: &mut Criterion) {
    let (_dir, db) = open_bench_db();
    for i in 0..10_000u64 {
        db.put(format!("key-{}", i).as_bytes(), b"01234567890123456789012345678901").unwrap();
    }
    let mut i = 0u64;
    c.bench_function("get existing key", |b| {
        b.iter(|| {
            let key = format!("key-{}", i % 10_000);
            i += 1;
            black_box(db.get(black_box(key.as_bytes())).unwrap());
        })
    });
}

criterion_group!(benches, put_benchmark, get_benchmark);
criterion_main!(benches);
