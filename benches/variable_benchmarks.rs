use chrono::NaiveDate;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use neurovars::graph::{predefined, NodeKind, VarTag};
use neurovars::{Processor, Runtime};

fn benchmark_variable_reads(c: &mut Criterion) {
    let runtime = Runtime::in_memory();
    let var = runtime.graph().add_node(NodeKind::Variable(VarTag::Variable));
    let value = runtime.graph().create_constant_int(42);
    runtime.add_link(var, value, predefined::INITIAL_VALUE).unwrap();
    let mut proc = Processor::new(runtime);

    c.bench_function("extract value", |b| {
        b.iter(|| {
            let values = proc.extract_value(var);
            proc.recycle(values);
        });
    });
}

fn benchmark_time_clusters(c: &mut Criterion) {
    let runtime = Runtime::in_memory();
    let time = runtime.time();
    time.preload();
    let when = NaiveDate::from_ymd_opt(2024, 2, 29)
        .unwrap()
        .and_hms_opt(23, 59, 59)
        .unwrap();

    c.bench_function("build and reclaim time cluster", |b| {
        b.iter(|| {
            let cluster = time.build_time_cluster(when, None).unwrap();
            time.reclaim_if_unused(cluster);
        });
    });
}

fn benchmark_split_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("split_sizes");

    for size in [1, 8, 64].iter() {
        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let runtime = Runtime::in_memory();
            let mut proc = Processor::new(runtime.clone());
            // Setup 'size' bound call-local variables
            for i in 0..size {
                let var = runtime.graph().add_node(NodeKind::Variable(VarTag::Local));
                let value = runtime.graph().create_constant_int(i as i64);
                proc.store_value(var, &[value]);
            }

            b.iter(|| proc.split(4));
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    benchmark_variable_reads,
    benchmark_time_clusters,
    benchmark_split_sizes
);
criterion_main!(benches);
