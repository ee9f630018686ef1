//! Criterion benchmarks for ledger transitions over the simulated coprocessor.
//!
//! Run with: `cargo bench -p cipherledger-testkit`

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};

use cipherledger::RecordId;
use cipherledger_store::{MemoryStore, SqliteStore};
use cipherledger_testkit::{players, LedgerFixture};

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn bench_apply_delta(c: &mut Criterion) {
    let rt = runtime();
    let owner = players(1).remove(0);
    let caller = owner.identity();
    let mut group = c.benchmark_group("apply_delta");

    let memory = rt.block_on(async {
        let fx = LedgerFixture::open(MemoryStore::new(), [1; 32]).await.unwrap();
        fx.create(&owner, 1, [100, 5, 5, 5, 5]).await.unwrap();
        fx
    });
    group.bench_function("memory", |b| {
        b.iter_batched(
            || memory.encrypt(&caller, [1, 1, 0, 0, 0]).unwrap(),
            |(fields, proof)| {
                rt.block_on(memory.ledger.apply_delta(
                    &caller,
                    RecordId::new(1),
                    black_box(&fields),
                    &proof,
                ))
                .unwrap()
            },
            BatchSize::SmallInput,
        );
    });

    let sqlite = rt.block_on(async {
        let fx = LedgerFixture::open(SqliteStore::open_memory().unwrap(), [2; 32])
            .await
            .unwrap();
        fx.create(&owner, 1, [100, 5, 5, 5, 5]).await.unwrap();
        fx
    });
    group.bench_function("sqlite", |b| {
        b.iter_batched(
            || sqlite.encrypt(&caller, [1, 1, 0, 0, 0]).unwrap(),
            |(fields, proof)| {
                rt.block_on(sqlite.ledger.apply_delta(
                    &caller,
                    RecordId::new(1),
                    black_box(&fields),
                    &proof,
                ))
                .unwrap()
            },
            BatchSize::SmallInput,
        );
    });

    group.finish();
}

fn bench_create(c: &mut Criterion) {
    let rt = runtime();
    let owner = players(1).remove(0);
    let caller = owner.identity();
    let fx = rt.block_on(LedgerFixture::new()).unwrap();
    let mut next_id = 0u64;

    c.bench_function("create", |b| {
        b.iter_batched(
            || {
                next_id += 1;
                (next_id, fx.encrypt(&caller, [100, 5, 5, 5, 5]).unwrap())
            },
            |(id, (fields, proof))| {
                rt.block_on(fx.ledger.create(&caller, RecordId::new(id), &fields, &proof))
                    .unwrap()
            },
            BatchSize::SmallInput,
        );
    });
}

fn bench_encrypt_inputs(c: &mut Criterion) {
    let rt = runtime();
    let fx = rt.block_on(LedgerFixture::new()).unwrap();
    let caller = players(1)[0].identity();

    c.bench_function("encrypt_inputs", |b| {
        b.iter(|| fx.encrypt(black_box(&caller), [100, 5, 5, 5, 5]).unwrap());
    });
}

criterion_group!(benches, bench_apply_delta, bench_create, bench_encrypt_inputs);
criterion_main!(benches);
