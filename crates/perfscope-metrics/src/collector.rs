//! Periodic harvesting of registry snapshots.

use crate::metric::Metric;
use crate::registry::MetricRegistry;
use perfscope_core::{PeriodicTask, TaskError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::debug;

/// Receives every harvest.
pub trait MetricSink: Send + Sync {
    fn on_collect(&self, metrics: Vec<Metric>);
}

impl<F> MetricSink for F
where
    F: Fn(Vec<Metric>) + Send + Sync,
{
    fn on_collect(&self, metrics: Vec<Metric>) {
        self(metrics)
    }
}

/// Sink that discards harvests.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl MetricSink for NullSink {
    fn on_collect(&self, _metrics: Vec<Metric>) {}
}

pub struct Collector {
    registry: Arc<MetricRegistry>,
    sink: Arc<dyn MetricSink>,
    task: Mutex<Option<PeriodicTask>>,
    harvests: Arc<AtomicU64>,
}

impl Collector {
    pub fn new(registry: Arc<MetricRegistry>, sink: Arc<dyn MetricSink>) -> Self {
        Self {
            registry,
            sink,
            task: Mutex::new(None),
            harvests: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Full snapshot of the registry, not forwarded anywhere.
    pub fn collect(&self) -> Vec<Metric> {
        self.registry.snapshot()
    }

    /// Take one snapshot and hand it to the sink. Returns the metric count.
    pub fn collect_once(&self) -> usize {
        harvest(&self.registry, self.sink.as_ref(), &self.harvests)
    }

    /// Collect every `interval`. A running collection is replaced.
    pub fn start_collection(&self, interval: Duration) -> Result<(), TaskError> {
        let registry = Arc::clone(&self.registry);
        let sink = Arc::clone(&self.sink);
        let harvests = Arc::clone(&self.harvests);

        let task = PeriodicTask::spawn("metric-collector", interval, move |_| {
            harvest(&registry, sink.as_ref(), &harvests);
        })?;

        let previous = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(task);
        if let Some(previous) = previous {
            previous.stop();
        }

        debug!(interval_ms = interval.as_millis() as u64, "Metric collection started");
        Ok(())
    }

    /// Stop collecting and take one final snapshot. Returns `false` and does
    /// nothing if collection was not running.
    pub fn stop_collection(&self) -> bool {
        let task = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(task) = task else {
            return false;
        };
        task.stop();
        let collected = self.collect_once();
        debug!(final_metrics = collected, "Metric collection stopped");
        true
    }

    pub fn is_collecting(&self) -> bool {
        self.task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(PeriodicTask::is_running)
    }

    /// Number of snapshots delivered to the sink so far.
    pub fn harvest_count(&self) -> u64 {
        self.harvests.load(Ordering::Relaxed)
    }

    pub fn registry(&self) -> &Arc<MetricRegistry> {
        &self.registry
    }
}

impl std::fmt::Debug for Collector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collector")
            .field("collecting", &self.is_collecting())
            .field("harvests", &self.harvest_count())
            .finish()
    }
}

fn harvest(registry: &MetricRegistry, sink: &dyn MetricSink, harvests: &AtomicU64) -> usize {
    let metrics = registry.snapshot();
    let count = metrics.len();
    sink.on_collect(metrics);
    harvests.fetch_add(1, Ordering::Relaxed);
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use perfscope_core::ManualClock;

    fn recording_collector() -> (Collector, Arc<Mutex<Vec<Vec<Metric>>>>) {
        let registry = Arc::new(MetricRegistry::new(ManualClock::shared(0)));
        registry.counter("requests").increment_by(2);
        registry.gauge("load").update(0.5);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink_seen = Arc::clone(&seen);
        let sink = move |metrics: Vec<Metric>| sink_seen.lock().unwrap().push(metrics);
        (Collector::new(registry, Arc::new(sink)), seen)
    }

    #[test]
    fn test_collect_once_forwards_snapshot() {
        let (collector, seen) = recording_collector();
        assert_eq!(collector.collect_once(), 2);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0][0].name, "requests");
        assert_eq!(collector.harvest_count(), 1);
    }

    #[test]
    fn test_collect_does_not_touch_sink() {
        let (collector, seen) = recording_collector();
        assert_eq!(collector.collect().len(), 2);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_stop_without_start_is_noop() {
        let (collector, seen) = recording_collector();
        assert!(!collector.stop_collection());
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_collection_and_final_sample() {
        let (collector, seen) = recording_collector();
        collector
            .start_collection(Duration::from_millis(100))
            .unwrap();
        assert!(collector.is_collecting());

        tokio::time::sleep(Duration::from_millis(350)).await;
        assert_eq!(seen.lock().unwrap().len(), 3);

        assert!(collector.stop_collection());
        assert!(!collector.is_collecting());
        assert_eq!(seen.lock().unwrap().len(), 4);

        assert!(!collector.stop_collection());
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(seen.lock().unwrap().len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_replaces_running_task() {
        let (collector, seen) = recording_collector();
        collector.start_collection(Duration::from_millis(100)).unwrap();
        collector.start_collection(Duration::from_secs(1)).unwrap();

        tokio::time::sleep(Duration::from_millis(550)).await;
        assert!(seen.lock().unwrap().is_empty());
        collector.stop_collection();
    }
}
