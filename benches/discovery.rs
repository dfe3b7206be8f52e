//! Discovery Scan Benchmarks
//!
//! Measures the overhead of a concurrent port scan with scripted probes:
//! - Fan-out cost of the generic scanner as the port list grows
//! - A full Postgres discovery where a few ports answer

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use herdux::discovery::scan;
use herdux::engine::DatabaseInstance;
use herdux::{create_engine_with, ConnectionOptions, DatabaseEngine, DatabaseType, EngineContext, RunResult, ScriptedRunner};

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread().enable_all().build().expect("Failed to build runtime")
}

fn bench_scan_fan_out(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("scan_fan_out");

    for count in [5u16, 20, 100] {
        let ports: Vec<u16> = (0..count).map(|i| 5400 + i).collect();
        group.bench_with_input(BenchmarkId::from_parameter(count), &ports, |b, ports| {
            b.iter(|| {
                rt.block_on(scan(black_box(ports), |port| async move {
                    (port % 3 == 0).then(|| DatabaseInstance::running(port, None))
                }))
            });
        });
    }
    group.finish();
}

fn bench_postgres_discovery(c: &mut Criterion) {
    let rt = runtime();
    let runner = Arc::new(
        ScriptedRunner::new()
            .on_args("pg_isready", "-p 5432", RunResult::ok("accepting connections"))
            .on_args("pg_isready", "-p 5417", RunResult::ok("accepting connections"))
            .on_args("psql", "-p 5432", RunResult::ok("PostgreSQL 16.2 on x86_64-pc-linux-gnu, compiled by gcc"))
            .on("pg_isready", RunResult::exited(2, "no response")),
    );
    let engine = create_engine_with(Some(DatabaseType::Postgres), &EngineContext::with_runner(runner));
    let opts = ConnectionOptions::default();

    c.bench_function("postgres_discover_instances", |b| {
        b.iter(|| {
            let instances = rt.block_on(engine.discover_instances(black_box(&opts)));
            assert_eq!(instances.len(), 2);
            instances
        });
    });
}

criterion_group!(benches, bench_scan_fan_out, bench_postgres_discovery);
criterion_main!(benches);
