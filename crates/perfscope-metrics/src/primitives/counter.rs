use super::Instrument;
use crate::metric::{Metric, MetricKind, MetricOptions};
use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic total, reset only explicitly.
#[derive(Debug)]
pub struct Counter {
    name: String,
    options: MetricOptions,
    value: AtomicU64,
}

impl Counter {
    pub fn new(name: impl Into<String>, options: MetricOptions) -> Self {
        Self {
            name: name.into(),
            options,
            value: AtomicU64::new(0),
        }
    }

    pub fn increment(&self) {
        self.increment_by(1);
    }

    pub fn increment_by(&self, delta: u64) {
        self.value.fetch_add(delta, Ordering::Relaxed);
    }

    pub fn reset(&self) {
        self.value.store(0, Ordering::Relaxed);
    }

    pub fn value(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }

    pub fn options(&self) -> &MetricOptions {
        &self.options
    }
}

impl Instrument for Counter {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> MetricKind {
        MetricKind::Counter
    }

    fn snapshot(&self, timestamp: i64) -> Metric {
        self.options.decorate(Metric::new(
            self.name.clone(),
            MetricKind::Counter,
            self.value() as f64,
            timestamp,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_increment_and_reset() {
        let counter = Counter::new("jobs", MetricOptions::default());
        counter.increment();
        counter.increment_by(5);
        counter.increment_by(10);
        assert_eq!(counter.value(), 16);

        counter.reset();
        assert_eq!(counter.value(), 0);
    }

    #[test]
    fn test_snapshot_carries_options() {
        let counter = Counter::new("jobs", MetricOptions::new().tag("queue", "high").unit("jobs"));
        counter.increment_by(3);

        let metric = counter.snapshot(42);
        assert_eq!(metric.kind, MetricKind::Counter);
        assert_eq!(metric.number(), Some(3.0));
        assert_eq!(metric.timestamp, 42);
        assert_eq!(metric.unit.as_deref(), Some("jobs"));
        assert!(metric.tags.contains_key("queue"));
    }
}
