//! System resource sampling while a benchmark runs.
//!
//! The sampler records process CPU, resident memory and how late each of its
//! own ticks fired. Tick lateness is the scheduler delay: a blocked runtime
//! shows up as ticks arriving behind schedule.

use crate::result::{CPU_METRIC, EVENT_LOOP_METRIC, MEMORY_METRIC, MetricStats};
use perfscope_core::{HostInfo, HostSnapshot, PeriodicTask, SharedClock, TaskError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::debug;

/// One observation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemSample {
    /// Milliseconds since [`SystemSampler::start`].
    pub elapsed_ms: f64,
    pub cpu_percent: f64,
    pub rss_mb: f64,
    pub event_loop_delay_ms: f64,
}

/// Samples collected between one `start` and `stop`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SystemSeries {
    pub samples: Vec<SystemSample>,
}

impl SystemSeries {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Elapsed time of the last sample.
    pub fn elapsed_ms(&self) -> f64 {
        self.samples.last().map_or(0.0, |sample| sample.elapsed_ms)
    }

    /// Per-series statistics keyed by result metric name. Empty when nothing was sampled.
    pub fn into_metrics(self) -> BTreeMap<String, MetricStats> {
        if self.samples.is_empty() {
            return BTreeMap::new();
        }

        let column = |f: fn(&SystemSample) -> f64| self.samples.iter().map(f).collect::<Vec<_>>();
        BTreeMap::from([
            (
                CPU_METRIC.to_string(),
                MetricStats::from_values(column(|s| s.cpu_percent)),
            ),
            (
                MEMORY_METRIC.to_string(),
                MetricStats::from_values(column(|s| s.rss_mb)),
            ),
            (
                EVENT_LOOP_METRIC.to_string(),
                MetricStats::from_values(column(|s| s.event_loop_delay_ms)),
            ),
        ])
    }
}

#[derive(Debug, Default)]
struct SamplerState {
    started_at: Option<Duration>,
    samples: Vec<SystemSample>,
}

impl SamplerState {
    fn record(&mut self, host: &dyn HostInfo, now: Duration, lateness: Duration) -> SystemSample {
        let elapsed = self
            .started_at
            .map_or(Duration::ZERO, |started| now.saturating_sub(started));
        let usage = host.process_usage();
        let sample = SystemSample {
            elapsed_ms: elapsed.as_secs_f64() * 1000.0,
            cpu_percent: usage.cpu_percent,
            rss_mb: usage.rss_mb(),
            event_loop_delay_ms: lateness.as_secs_f64() * 1000.0,
        };
        self.samples.push(sample);
        sample
    }
}

pub struct SystemSampler {
    host: Arc<dyn HostInfo>,
    clock: SharedClock,
    interval: Duration,
    state: Arc<Mutex<SamplerState>>,
    task: Mutex<Option<PeriodicTask>>,
}

impl SystemSampler {
    pub fn new(host: Arc<dyn HostInfo>, clock: SharedClock, interval: Duration) -> Self {
        Self {
            host,
            clock,
            interval,
            state: Arc::new(Mutex::new(SamplerState::default())),
            task: Mutex::new(None),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn environment(&self) -> HostSnapshot {
        self.host.snapshot()
    }

    /// Clear previous samples, take an initial one and start periodic sampling.
    pub fn start(&self) -> Result<(), TaskError> {
        {
            let mut state = self.lock_state();
            state.started_at = Some(self.clock.monotonic());
            state.samples.clear();
            state.record(self.host.as_ref(), self.clock.monotonic(), Duration::ZERO);
        }

        let host = Arc::clone(&self.host);
        let clock = self.clock.clone();
        let state = Arc::clone(&self.state);
        let task = PeriodicTask::spawn("system-sampler", self.interval, move |tick| {
            state
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .record(host.as_ref(), clock.monotonic(), tick.lateness);
        })?;

        if let Some(previous) = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(task)
        {
            previous.stop();
        }
        debug!(interval_ms = self.interval.as_millis() as u64, "System sampler started");
        Ok(())
    }

    /// Take one sample now.
    pub fn sample(&self) -> SystemSample {
        self.lock_state()
            .record(self.host.as_ref(), self.clock.monotonic(), Duration::ZERO)
    }

    /// Stop sampling and return everything collected. A final sample is taken
    /// only if the sampler was running; calling it twice is harmless.
    ///
    /// A tick already in progress on another worker may still land after
    /// this returns. Use [`SystemSampler::finish`] to wait for it.
    pub fn stop(&self) -> SystemSeries {
        let was_running = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .is_some_and(|task| task.stop());
        self.close(was_running)
    }

    /// Like [`SystemSampler::stop`], but waits for the sampling task to exit
    /// so the returned series is final.
    pub async fn finish(&self) -> SystemSeries {
        let task = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let was_running = match task {
            Some(task) => {
                let running = task.is_running();
                task.shutdown().await;
                running
            }
            None => false,
        };
        self.close(was_running)
    }

    fn close(&self, was_running: bool) -> SystemSeries {
        let mut state = self.lock_state();
        if was_running {
            state.record(self.host.as_ref(), self.clock.monotonic(), Duration::ZERO);
            debug!(samples = state.samples.len(), "System sampler stopped");
        }
        state.started_at = None;
        SystemSeries {
            samples: state.samples.clone(),
        }
    }

    pub fn is_sampling(&self) -> bool {
        self.task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(PeriodicTask::is_running)
    }

    /// Samples collected so far.
    pub fn series(&self) -> SystemSeries {
        SystemSeries {
            samples: self.lock_state().samples.clone(),
        }
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, SamplerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for SystemSampler {
    fn drop(&mut self) {
        if let Some(task) = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            task.stop();
        }
    }
}

impl std::fmt::Debug for SystemSampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemSampler")
            .field("interval", &self.interval)
            .field("sampling", &self.is_sampling())
            .finish()
    }
}
