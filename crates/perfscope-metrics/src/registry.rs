//! Named, typed instrument store.
//!
//! Instruments are keyed by `(name, kind)`: one map per kind, each keyed by
//! name. Requesting an existing name with the same kind returns the same
//! `Arc`; the same name under another kind is a separate instrument.

use crate::metric::{Metric, MetricKind, MetricOptions};
use crate::primitives::{Counter, Gauge, Histogram, Instrument, Meter, Timer};
use dashmap::DashMap;
use perfscope_core::{SharedClock, SystemClock};
use std::sync::Arc;
use std::time::Duration;

/// A registered instrument of any kind.
#[derive(Debug, Clone)]
pub enum MetricHandle {
    Counter(Arc<Counter>),
    Gauge(Arc<Gauge>),
    Histogram(Arc<Histogram>),
    Timer(Arc<Timer>),
    Meter(Arc<Meter>),
}

impl MetricHandle {
    fn instrument(&self) -> &dyn Instrument {
        match self {
            Self::Counter(m) => m.as_ref(),
            Self::Gauge(m) => m.as_ref(),
            Self::Histogram(m) => m.as_ref(),
            Self::Timer(m) => m.as_ref(),
            Self::Meter(m) => m.as_ref(),
        }
    }

    pub fn name(&self) -> &str {
        self.instrument().name()
    }

    pub fn kind(&self) -> MetricKind {
        self.instrument().kind()
    }

    pub fn snapshot(&self, timestamp: i64) -> Metric {
        self.instrument().snapshot(timestamp)
    }
}

pub struct MetricRegistry {
    clock: SharedClock,
    meter_tick: Duration,
    counters: DashMap<String, Arc<Counter>>,
    gauges: DashMap<String, Arc<Gauge>>,
    histograms: DashMap<String, Arc<Histogram>>,
    timers: DashMap<String, Arc<Timer>>,
    meters: DashMap<String, Arc<Meter>>,
}

impl MetricRegistry {
    pub fn new(clock: SharedClock) -> Self {
        Self::with_meter_tick(clock, crate::primitives::TICK_INTERVAL)
    }

    /// Registry whose meters expect to be ticked every `meter_tick`.
    pub fn with_meter_tick(clock: SharedClock, meter_tick: Duration) -> Self {
        Self {
            clock,
            meter_tick,
            counters: DashMap::new(),
            gauges: DashMap::new(),
            histograms: DashMap::new(),
            timers: DashMap::new(),
            meters: DashMap::new(),
        }
    }

    pub fn clock(&self) -> &SharedClock {
        &self.clock
    }

    pub fn counter(&self, name: &str) -> Arc<Counter> {
        self.counter_with(name, MetricOptions::default())
    }

    /// Options only apply when the instrument is created.
    pub fn counter_with(&self, name: &str, options: MetricOptions) -> Arc<Counter> {
        self.counters
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Counter::new(name, options)))
            .clone()
    }

    pub fn gauge(&self, name: &str) -> Arc<Gauge> {
        self.gauge_with(name, MetricOptions::default())
    }

    pub fn gauge_with(&self, name: &str, options: MetricOptions) -> Arc<Gauge> {
        self.gauges
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Gauge::new(name, options)))
            .clone()
    }

    pub fn histogram(&self, name: &str) -> Arc<Histogram> {
        self.histogram_with(name, MetricOptions::default())
    }

    pub fn histogram_with(&self, name: &str, options: MetricOptions) -> Arc<Histogram> {
        self.histograms
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Histogram::new(name, options)))
            .clone()
    }

    pub fn timer(&self, name: &str) -> Arc<Timer> {
        self.timer_with(name, MetricOptions::default())
    }

    pub fn timer_with(&self, name: &str, options: MetricOptions) -> Arc<Timer> {
        self.timers
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Timer::new(name, options, self.clock.clone())))
            .clone()
    }

    pub fn meter(&self, name: &str) -> Arc<Meter> {
        self.meter_with(name, MetricOptions::default())
    }

    pub fn meter_with(&self, name: &str, options: MetricOptions) -> Arc<Meter> {
        self.meters
            .entry(name.to_string())
            .or_insert_with(|| {
                Arc::new(Meter::with_tick_interval(
                    name,
                    options,
                    self.clock.clone(),
                    self.meter_tick,
                ))
            })
            .clone()
    }

    pub fn get_metric(&self, name: &str, kind: MetricKind) -> Option<MetricHandle> {
        match kind {
            MetricKind::Counter => self
                .counters
                .get(name)
                .map(|m| MetricHandle::Counter(m.clone())),
            MetricKind::Gauge => self.gauges.get(name).map(|m| MetricHandle::Gauge(m.clone())),
            MetricKind::Histogram => self
                .histograms
                .get(name)
                .map(|m| MetricHandle::Histogram(m.clone())),
            MetricKind::Timer => self.timers.get(name).map(|m| MetricHandle::Timer(m.clone())),
            MetricKind::Meter => self.meters.get(name).map(|m| MetricHandle::Meter(m.clone())),
        }
    }

    /// Every instrument registered under `name`, across kinds.
    pub fn metrics_named(&self, name: &str) -> Vec<MetricHandle> {
        MetricKind::ALL
            .iter()
            .filter_map(|kind| self.get_metric(name, *kind))
            .collect()
    }

    /// All instruments, ordered by kind then name.
    pub fn get_all_metrics(&self) -> Vec<MetricHandle> {
        let mut handles: Vec<MetricHandle> = Vec::with_capacity(self.len());
        handles.extend(self.counters.iter().map(|e| MetricHandle::Counter(e.value().clone())));
        handles.extend(self.gauges.iter().map(|e| MetricHandle::Gauge(e.value().clone())));
        handles.extend(
            self.histograms
                .iter()
                .map(|e| MetricHandle::Histogram(e.value().clone())),
        );
        handles.extend(self.timers.iter().map(|e| MetricHandle::Timer(e.value().clone())));
        handles.extend(self.meters.iter().map(|e| MetricHandle::Meter(e.value().clone())));
        handles.sort_by(|a, b| a.kind().cmp(&b.kind()).then_with(|| a.name().cmp(b.name())));
        handles
    }

    /// Snapshot every instrument with the current wall-clock time.
    pub fn snapshot(&self) -> Vec<Metric> {
        let timestamp = self.clock.now_ms();
        self.get_all_metrics()
            .iter()
            .map(|handle| handle.snapshot(timestamp))
            .collect()
    }

    /// Remove every instrument called `name`. Returns how many were removed.
    pub fn remove_metric(&self, name: &str) -> usize {
        MetricKind::ALL
            .iter()
            .filter(|kind| self.remove_metric_kind(name, **kind))
            .count()
    }

    pub fn remove_metric_kind(&self, name: &str, kind: MetricKind) -> bool {
        match kind {
            MetricKind::Counter => self.counters.remove(name).is_some(),
            MetricKind::Gauge => self.gauges.remove(name).is_some(),
            MetricKind::Histogram => self.histograms.remove(name).is_some(),
            MetricKind::Timer => self.timers.remove(name).is_some(),
            MetricKind::Meter => self.meters.remove(name).is_some(),
        }
    }

    pub fn clear(&self) {
        self.counters.clear();
        self.gauges.clear();
        self.histograms.clear();
        self.timers.clear();
        self.meters.clear();
    }

    /// Advance the EWMA rates of every registered meter by one tick.
    pub fn tick_meters(&self) {
        for meter in self.meters.iter() {
            meter.value().tick();
        }
    }

    pub fn meter_tick(&self) -> Duration {
        self.meter_tick
    }

    pub fn len(&self) -> usize {
        self.counters.len()
            + self.gauges.len()
            + self.histograms.len()
            + self.timers.len()
            + self.meters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MetricRegistry {
    fn default() -> Self {
        Self::new(SystemClock::shared())
    }
}

impl std::fmt::Debug for MetricRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricRegistry")
            .field("instruments", &self.len())
            .field("meter_tick", &self.meter_tick)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use perfscope_core::ManualClock;

    fn registry() -> MetricRegistry {
        MetricRegistry::new(ManualClock::shared(1_000))
    }

    #[test]
    fn test_same_name_and_kind_is_idempotent() {
        let registry = registry();
        let first = registry.counter("requests");
        let second = registry.counter("requests");

        assert!(Arc::ptr_eq(&first, &second));
        first.increment();
        assert_eq!(second.value(), 1);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_same_name_different_kind_coexist() {
        let registry = registry();
        registry.counter("io").increment_by(4);
        registry.gauge("io").update(2.5);

        let handles = registry.metrics_named("io");
        assert_eq!(handles.len(), 2);
        assert_eq!(handles[0].kind(), MetricKind::Counter);
        assert_eq!(handles[1].kind(), MetricKind::Gauge);
        assert!(registry.get_metric("io", MetricKind::Meter).is_none());
    }

    #[test]
    fn test_options_only_apply_on_creation() {
        let registry = registry();
        registry.gauge_with("temp", MetricOptions::new().unit("celsius"));
        registry.gauge_with("temp", MetricOptions::new().unit("kelvin"));

        let metric = registry
            .get_metric("temp", MetricKind::Gauge)
            .unwrap()
            .snapshot(0);
        assert_eq!(metric.unit.as_deref(), Some("celsius"));
    }

    #[test]
    fn test_snapshot_uses_clock_and_orders_by_kind() {
        let registry = registry();
        registry.meter("b").mark();
        registry.counter("z").increment();
        registry.counter("a").increment();

        let snapshot = registry.snapshot();
        let names: Vec<_> = snapshot.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["a", "z", "b"]);
        assert!(snapshot.iter().all(|m| m.timestamp == 1_000));
    }

    #[test]
    fn test_remove_and_clear() {
        let registry = registry();
        registry.counter("x");
        registry.timer("x");
        registry.histogram("y");

        assert!(!registry.remove_metric_kind("x", MetricKind::Gauge));
        assert_eq!(registry.remove_metric("x"), 2);
        assert_eq!(registry.len(), 1);

        registry.clear();
        assert!(registry.is_empty());
        assert!(registry.get_all_metrics().is_empty());
    }

    #[test]
    fn test_tick_meters() {
        let registry = registry();
        let meter = registry.meter("hits");
        meter.mark_n(10);

        registry.tick_meters();
        assert_eq!(meter.one_minute_rate(), 2.0);
    }
}
