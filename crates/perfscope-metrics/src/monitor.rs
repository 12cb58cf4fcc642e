//! Explicitly constructed monitor tying the pipeline together.
//!
//! A [`PerformanceMonitor`] owns one registry, one storage and a collector
//! that stores every harvest. Callers pass the monitor (or its registry)
//! around; there is no process-wide instance.

use crate::analyzer::{AnalysisResult, AnalyzeOptions, MetricAnalyzer};
use crate::collector::{Collector, MetricSink};
use crate::error::MetricsResult;
use crate::metric::Metric;
use crate::registry::MetricRegistry;
use crate::storage::{MetricQuery, MetricStorage, StorageOptions};
use perfscope_core::{EngineConfig, PeriodicTask, SharedClock, SystemClock};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{info, warn};

/// [`MetricSink`] that appends each harvested metric to storage.
#[derive(Debug, Clone)]
pub struct StorageSink {
    storage: Arc<MetricStorage>,
}

impl StorageSink {
    pub fn new(storage: Arc<MetricStorage>) -> Self {
        Self { storage }
    }
}

impl MetricSink for StorageSink {
    fn on_collect(&self, metrics: Vec<Metric>) {
        for metric in metrics {
            let name = metric.name.clone();
            if let Err(error) = self.storage.store(metric) {
                warn!(metric = %name, %error, "Skipping metric that storage rejected");
            }
        }
    }
}

pub struct PerformanceMonitor {
    config: EngineConfig,
    registry: Arc<MetricRegistry>,
    storage: Arc<MetricStorage>,
    collector: Collector,
    meter_task: Mutex<Option<PeriodicTask>>,
}

impl PerformanceMonitor {
    pub fn new(config: EngineConfig, clock: SharedClock) -> MetricsResult<Self> {
        config.validate()?;

        let registry = Arc::new(MetricRegistry::with_meter_tick(
            clock.clone(),
            config.meter.tick_interval,
        ));
        let storage = Arc::new(MetricStorage::new(
            StorageOptions::from(&config.storage),
            clock,
        ));
        let collector = Collector::new(
            Arc::clone(&registry),
            Arc::new(StorageSink::new(Arc::clone(&storage))),
        );

        Ok(Self {
            config,
            registry,
            storage,
            collector,
            meter_task: Mutex::new(None),
        })
    }

    /// Default configuration and the system clock.
    pub fn with_defaults() -> MetricsResult<Self> {
        Self::new(EngineConfig::default(), SystemClock::shared())
    }

    pub fn registry(&self) -> &Arc<MetricRegistry> {
        &self.registry
    }

    pub fn storage(&self) -> &Arc<MetricStorage> {
        &self.storage
    }

    pub fn collector(&self) -> &Collector {
        &self.collector
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Start collection, pruning and meter ticking. Requires a tokio runtime.
    pub fn start(&self) -> MetricsResult<()> {
        self.collector
            .start_collection(self.config.collection.interval)?;
        self.storage.start_pruning(self.config.storage.prune_interval)?;

        let registry = Arc::downgrade(&self.registry);
        let meter_task = PeriodicTask::spawn("meter-tick", self.config.meter.tick_interval, move |_| {
            if let Some(registry) = registry.upgrade() {
                registry.tick_meters();
            }
        })?;
        if let Some(previous) = self
            .meter_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(meter_task)
        {
            previous.stop();
        }

        info!(
            collection_ms = self.config.collection.interval.as_millis() as u64,
            prune_ms = self.config.storage.prune_interval.as_millis() as u64,
            meter_tick_ms = self.config.meter.tick_interval.as_millis() as u64,
            "Performance monitor started"
        );
        Ok(())
    }

    /// Stop every background task, storing one final harvest. Returns
    /// `false` if nothing was running.
    pub fn stop(&self) -> bool {
        let meter_stopped = self
            .meter_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .is_some_and(|task| task.stop());
        let collector_stopped = self.collector.stop_collection();
        let pruning_stopped = self.storage.stop_pruning();

        let stopped = meter_stopped || collector_stopped || pruning_stopped;
        if stopped {
            info!(records = self.storage.record_count(), "Performance monitor stopped");
        }
        stopped
    }

    pub fn is_running(&self) -> bool {
        self.collector.is_collecting()
    }

    /// Store the current registry snapshot immediately.
    pub fn collect_now(&self) -> usize {
        self.collector.collect_once()
    }

    /// Analyze the stored samples matching `query`.
    pub fn analyze(&self, query: &MetricQuery, options: &AnalyzeOptions<'_>) -> AnalysisResult {
        let metrics: Vec<Metric> = self
            .storage
            .query(query)
            .into_iter()
            .map(|record| record.metric)
            .collect();
        MetricAnalyzer::analyze(&metrics, options)
    }
}

impl Drop for PerformanceMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for PerformanceMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PerformanceMonitor")
            .field("running", &self.is_running())
            .field("registry", &self.registry)
            .field("storage", &self.storage)
            .finish()
    }
}
