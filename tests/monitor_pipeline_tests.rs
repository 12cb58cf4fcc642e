//! # Monitoring Pipeline Tests
//!
//! End-to-end checks of registry -> collector -> storage -> analyzer driven
//! by a manual clock, so every timestamp is deterministic.

use perfscope::core::{EngineConfig, ManualClock};
use perfscope::metrics::{
    Aggregation, AnalyzeOptions, AnomalyOptions, HistoryOptions, Metric, MetricAnalyzer,
    MetricKind, MetricOptions, MetricQuery, PerformanceMonitor, SortField, SortOrder,
    TrendDirection, TrendOptions,
};
use std::sync::Arc;
use std::time::Duration;

const START_MS: i64 = 1_700_000_000_000;

fn monitor() -> (PerformanceMonitor, Arc<ManualClock>) {
    let clock = ManualClock::shared(START_MS);
    let monitor = PerformanceMonitor::new(EngineConfig::default(), clock.clone())
        .expect("default config is valid");
    (monitor, clock)
}

/// Ten one-second harvests of a counter growing by 5 per second.
fn harvest_requests(monitor: &PerformanceMonitor, clock: &ManualClock) {
    let requests = monitor.registry().counter("http.requests");
    for _ in 0..10 {
        requests.increment_by(5);
        monitor.collect_now();
        clock.advance_ms(1_000);
    }
}

#[test]
fn test_harvest_history_and_trend() {
    let (monitor, clock) = monitor();
    harvest_requests(&monitor, &clock);

    let storage = monitor.storage();
    let latest = storage.get_latest("http.requests").expect("counter was stored");
    assert_eq!(latest.metric.number(), Some(50.0));
    assert_eq!(latest.metric.timestamp, START_MS + 9_000);

    let buckets = storage.get_history(
        "http.requests",
        &HistoryOptions::aggregated(Aggregation::Max, Duration::from_secs(5)),
    );
    assert_eq!(buckets.len(), 2);
    assert_eq!(buckets[0].timestamp, START_MS);
    assert_eq!(buckets[0].number(), Some(25.0));
    assert_eq!(buckets[1].timestamp, START_MS + 5_000);
    assert_eq!(buckets[1].number(), Some(50.0));

    let samples: Vec<Metric> = storage
        .query(&MetricQuery::new().name("http.requests"))
        .into_iter()
        .map(|record| record.metric)
        .collect();
    let trend = MetricAnalyzer::calculate_trend(&samples, &TrendOptions { forecast_periods: 2 });
    assert_eq!(trend.direction, TrendDirection::Up);
    assert!((trend.slope - 5.0).abs() < 1e-9);
    assert!(trend.confidence > 0.999);
    assert_eq!(trend.forecast.len(), 2);
    assert_eq!(trend.forecast[0].timestamp, START_MS + 10_000);
    assert!((trend.forecast[0].value - 55.0).abs() < 1e-9);
}

#[test]
fn test_histogram_snapshots_are_analyzed_by_tag() {
    let (monitor, clock) = monitor();
    let registry = monitor.registry();
    let eu = registry.histogram_with(
        "latency.eu",
        MetricOptions::new().tag("region", "eu").unit("ms"),
    );
    let us = registry.histogram_with(
        "latency.us",
        MetricOptions::new().tag("region", "us").unit("ms"),
    );

    for value in [10.0, 20.0, 30.0] {
        eu.update(value);
    }
    for value in [100.0, 200.0, 300.0] {
        us.update(value);
    }
    monitor.collect_now();
    clock.advance_ms(1_000);

    let query = MetricQuery::new()
        .kind(MetricKind::Histogram)
        .sort_by(SortField::Name, SortOrder::Asc);
    let result = monitor.analyze(&query, &AnalyzeOptions::default().group_by(["region"]));

    // Each snapshot contributes the mean of its recorded values.
    assert_eq!(result.summary.count, 2);
    assert_eq!(result.summary.min_value, 20.0);
    assert_eq!(result.summary.max_value, 200.0);
    assert_eq!(result.groups["region:eu"].summary.avg_value, 20.0);
    assert_eq!(result.groups["region:us"].summary.avg_value, 200.0);

    let tagged = monitor.storage().query(&MetricQuery::new().tag("region", "us"));
    assert_eq!(tagged.len(), 1);
    assert_eq!(tagged[0].metric.unit.as_deref(), Some("ms"));
}

#[test]
fn test_anomaly_detection_over_stored_gauge() {
    let (monitor, _) = monitor();
    let depths = [10.0, 11.0, 10.0, 11.0, 10.0, 11.0, 10.0, 11.0, 10.0, 50.0];
    let stored = monitor
        .storage()
        .store_many(depths.iter().enumerate().map(|(i, depth)| {
            Metric::new("queue.depth", MetricKind::Gauge, *depth, START_MS + i as i64 * 1_000)
        }))
        .expect("finite gauge values are accepted");
    assert_eq!(stored, 10);

    let samples: Vec<Metric> = monitor
        .storage()
        .query(&MetricQuery::new().name("queue.depth"))
        .into_iter()
        .map(|record| record.metric)
        .collect();

    let anomalies = MetricAnalyzer::detect_anomalies(&samples, &AnomalyOptions::default());
    assert_eq!(anomalies.len(), 1);
    assert_eq!(anomalies[0].value, 50.0);
    assert!(anomalies[0].z_score > AnomalyOptions::default().threshold());

    let flat = vec![Metric::new("flat", MetricKind::Gauge, 3.0, START_MS); 5];
    assert!(MetricAnalyzer::detect_anomalies(&flat, &AnomalyOptions::default()).is_empty());
}

#[test]
fn test_storage_bound_drops_oldest() {
    let clock = ManualClock::shared(START_MS);
    let mut config = EngineConfig::default();
    config.storage.max_entries = 3;
    let monitor = PerformanceMonitor::new(config, clock.clone()).expect("valid config");

    let gauge = monitor.registry().gauge("cache.size");
    for size in 1..=4 {
        gauge.update(f64::from(size));
        monitor.collect_now();
        clock.advance_ms(1_000);
    }

    let kept: Vec<f64> = monitor
        .storage()
        .query(&MetricQuery::new().name("cache.size").sort_by(SortField::Timestamp, SortOrder::Asc))
        .iter()
        .filter_map(|record| record.metric.number())
        .collect();
    assert_eq!(kept, vec![2.0, 3.0, 4.0]);
}

#[tokio::test(start_paused = true)]
async fn test_background_collection_lifecycle() {
    let clock = ManualClock::shared(START_MS);
    let mut config = EngineConfig::default();
    config.collection.interval = Duration::from_secs(1);
    let monitor = PerformanceMonitor::new(config, clock).expect("valid config");
    monitor.registry().counter("jobs").increment();

    monitor.start().expect("runtime is available");
    tokio::time::sleep(Duration::from_millis(3_500)).await;
    assert_eq!(monitor.storage().record_count(), 3);

    assert!(monitor.stop());
    // stop takes one final harvest
    assert_eq!(monitor.storage().record_count(), 4);
    assert!(!monitor.stop());
}
