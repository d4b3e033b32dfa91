//! Store benchmarks
//!
//! Benchmarks for the hot write and query paths:
//! - Metric logging (fact insert + latest-view maintenance)
//! - Run search (fetch, filter, sort)
//!
//! Toyota Way: Measure before optimizing (Genchi Genbutsu)

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::Rng;
use rastro_db::entities::{Metric, Param, ViewType};
use rastro_db::SqliteStore;

fn store_with_run() -> (SqliteStore, String) {
    let store = SqliteStore::open_in_memory().unwrap();
    let exp_id = store.create_experiment("bench", None).unwrap();
    let run_id = store
        .create_run(&exp_id, "", 0, vec![])
        .unwrap()
        .info
        .run_id;
    (store, run_id)
}

/// Seed an experiment with `n` runs, each carrying one metric and one param.
fn seeded_experiment(n: i64) -> (SqliteStore, String) {
    let store = SqliteStore::open_in_memory().unwrap();
    let exp_id = store.create_experiment("bench", None).unwrap();
    for i in 0..n {
        let run = store.create_run(&exp_id, "", i, vec![]).unwrap();
        #[allow(clippy::cast_precision_loss)]
        store
            .log_metric(&run.info.run_id, Metric::new("acc", i as f64 / n as f64, i, 0))
            .unwrap();
        let opt = if i % 2 == 0 { "sgd" } else { "adam" };
        store
            .log_param(&run.info.run_id, Param::new("opt", opt))
            .unwrap();
    }
    (store, exp_id)
}

fn bench_log_metric(c: &mut Criterion) {
    let (store, run_id) = store_with_run();
    let mut rng = rand::thread_rng();
    let mut step = 0i64;

    c.bench_function("log_metric_monotonic_steps", |b| {
        b.iter(|| {
            step += 1;
            let value: f64 = rng.gen_range(0.0..1.0);
            store
                .log_metric(&run_id, Metric::new("loss", value, step, step))
                .unwrap();
        });
    });
}

fn bench_search_runs(c: &mut Criterion) {
    let mut group = c.benchmark_group("search_runs");
    for size in [100i64, 1000] {
        let (store, exp_id) = seeded_experiment(size);

        group.bench_with_input(BenchmarkId::new("unfiltered", size), &size, |b, _| {
            b.iter(|| {
                let page = store
                    .search_runs(&[&exp_id], None, ViewType::ActiveOnly, 100, &[], None)
                    .unwrap();
                black_box(page.runs.len());
            });
        });

        group.bench_with_input(BenchmarkId::new("filtered_sorted", size), &size, |b, _| {
            b.iter(|| {
                let page = store
                    .search_runs(
                        &[&exp_id],
                        Some("metrics.acc > 0.5 AND params.opt = 'adam'"),
                        ViewType::ActiveOnly,
                        100,
                        &["metrics.acc DESC"],
                        None,
                    )
                    .unwrap();
                black_box(page.runs.len());
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_log_metric, bench_search_runs);
criterion_main!(benches);
