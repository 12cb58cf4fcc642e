use super::{AtomicF64, Instrument};
use crate::metric::{Metric, MetricKind, MetricOptions};

/// Last-set value. No bounds are enforced.
#[derive(Debug)]
pub struct Gauge {
    name: String,
    options: MetricOptions,
    value: AtomicF64,
}

impl Gauge {
    pub fn new(name: impl Into<String>, options: MetricOptions) -> Self {
        Self {
            name: name.into(),
            options,
            value: AtomicF64::new(0.0),
        }
    }

    pub fn update(&self, value: f64) {
        self.value.store(value);
    }

    pub fn increment(&self) {
        self.increment_by(1.0);
    }

    pub fn increment_by(&self, delta: f64) {
        self.value.fetch_add(delta);
    }

    pub fn decrement(&self) {
        self.decrement_by(1.0);
    }

    pub fn decrement_by(&self, delta: f64) {
        self.value.fetch_add(-delta);
    }

    pub fn value(&self) -> f64 {
        self.value.load()
    }
}

impl Instrument for Gauge {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> MetricKind {
        MetricKind::Gauge
    }

    fn snapshot(&self, timestamp: i64) -> Metric {
        self.options.decorate(Metric::new(
            self.name.clone(),
            MetricKind::Gauge,
            self.value(),
            timestamp,
        ))
    }
}
