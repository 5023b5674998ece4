//! Benchmarks for access ledger grant and release paths.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use sharefs::config::LedgerConfig;
use sharefs::ledger::AccessLedger;
use sharefs::storage::normalize;

fn bench_open_close(c: &mut Criterion) {
    let mut group = c.benchmark_group("ledger_open_close");

    for sessions in [1usize, 16, 256].iter() {
        let mut ledger = AccessLedger::new(LedgerConfig::default());
        let tokens: Vec<_> = (0..*sessions)
            .map(|_| ledger.start_session().unwrap())
            .collect();
        let mut next = 0usize;

        group.bench_with_input(BenchmarkId::new("write", sessions), sessions, |b, _| {
            b.iter(|| {
                let token = &tokens[next % tokens.len()];
                next += 1;
                let path = "bench/file";
                if let Some(fd) = ledger.open_for_write(token, black_box(path)).unwrap().descriptor() {
                    ledger.close(token, fd, path).unwrap();
                }
            })
        });

        group.bench_with_input(BenchmarkId::new("read", sessions), sessions, |b, _| {
            b.iter(|| {
                let token = &tokens[next % tokens.len()];
                next += 1;
                let path = "bench/file";
                let fd = ledger.open_for_read(token, black_box(path)).unwrap();
                ledger.close(token, fd, path).unwrap();
            })
        });
    }
    group.finish();
}

fn bench_outstanding_check(c: &mut Criterion) {
    let mut ledger = AccessLedger::new(LedgerConfig::default());
    let token = ledger.start_session().unwrap();
    for i in 0..1000 {
        ledger.open_for_read(&token, &format!("dir/{}", i)).unwrap();
    }

    c.bench_function("ledger_is_any_handle_outstanding", |b| {
        b.iter(|| ledger.is_any_handle_outstanding(black_box("dir/500")))
    });
}

fn bench_normalize(c: &mut Criterion) {
    c.bench_function("normalize_path", |b| {
        b.iter(|| normalize(black_box("/projects/./sharefs/src/ledger.rs")))
    });
}

criterion_group!(benches, bench_open_close, bench_outstanding_check, bench_normalize);
criterion_main!(benches);
