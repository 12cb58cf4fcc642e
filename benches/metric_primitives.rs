//! Metric Primitive Benchmarks
//!
//! Hot-path cost of updating the registry's instruments and of taking a
//! registry snapshot, which is what every collection tick pays for.

use criterion::{BatchSize, BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use perfscope::core::{ManualClock, SystemClock};
use perfscope::metrics::{Counter, Histogram, Meter, MetricOptions, MetricRegistry, Timer};
use std::hint::black_box;
use std::time::Duration;

fn bench_instrument_updates(c: &mut Criterion) {
    let mut group = c.benchmark_group("instrument_updates");
    group.throughput(Throughput::Elements(1));
    group.sample_size(1000);
    group.measurement_time(Duration::from_secs(5));

    let counter = Counter::new("requests", MetricOptions::new());
    group.bench_function("counter_increment", |b| {
        b.iter(|| counter.increment_by(black_box(3)))
    });

    let histogram = Histogram::new("latency", MetricOptions::new().unit("ms"));
    group.bench_function("histogram_update", |b| {
        let mut value = 0.0;
        b.iter(|| {
            value += 0.25;
            histogram.update(black_box(value));
        })
    });

    let meter = Meter::new("events", MetricOptions::new(), SystemClock::shared());
    group.bench_function("meter_mark", |b| b.iter(|| meter.mark_n(black_box(2))));

    let timer = Timer::new("handler", MetricOptions::new(), SystemClock::shared());
    group.bench_function("timer_time", |b| {
        b.iter(|| timer.time(|| black_box(17u64).pow(2)))
    });

    group.finish();
}

fn bench_histogram_queries(c: &mut Criterion) {
    let mut group = c.benchmark_group("histogram_queries");
    group.sample_size(200);

    for size in [100usize, 1_000, 10_000] {
        let histogram = Histogram::new("latency", MetricOptions::new());
        for i in 0..size {
            histogram.update((i % 97) as f64);
        }
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("p95", size), &histogram, |b, histogram| {
            b.iter(|| black_box(histogram.get_percentile(black_box(0.95))))
        });
        group.bench_with_input(BenchmarkId::new("std_dev", size), &histogram, |b, histogram| {
            b.iter(|| black_box(histogram.get_std_dev()))
        });
    }

    group.finish();
}

fn bench_registry_snapshot(c: &mut Criterion) {
    let mut group = c.benchmark_group("registry_snapshot");
    group.sample_size(200);

    for instruments in [10usize, 100, 500] {
        group.throughput(Throughput::Elements(instruments as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(instruments),
            &instruments,
            |b, &instruments| {
                b.iter_batched(
                    || {
                        let registry = MetricRegistry::new(ManualClock::shared(0));
                        for i in 0..instruments {
                            registry.counter(&format!("counter.{i}")).increment();
                            registry.histogram(&format!("histogram.{i}")).update(i as f64);
                        }
                        registry
                    },
                    |registry| black_box(registry.snapshot()),
                    BatchSize::SmallInput,
                )
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_instrument_updates,
    bench_histogram_queries,
    bench_registry_snapshot
);
criterion_main!(benches);
