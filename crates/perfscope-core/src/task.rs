//! Periodic background work.
//!
//! A [`PeriodicTask`] owns one tokio task that invokes a callback every
//! `period`. The first invocation happens one full period after spawning.
//! Stopping is explicit and idempotent; dropping the handle stops the task.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, trace};

#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("no tokio runtime is available to run '{0}'")]
    NoRuntime(String),

    #[error("period for '{0}' must be greater than zero")]
    ZeroPeriod(String),
}

/// Passed to the callback on every tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickInfo {
    /// Sequence number starting at 1.
    pub tick: u64,
    /// How far past its scheduled instant this tick fired.
    pub lateness: Duration,
}

pub struct PeriodicTask {
    name: String,
    period: Duration,
    shutdown_tx: Mutex<Option<oneshot::Sender<()>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl PeriodicTask {
    /// Spawn `callback` on the current tokio runtime.
    pub fn spawn<F>(name: impl Into<String>, period: Duration, mut callback: F) -> Result<Self, TaskError>
    where
        F: FnMut(TickInfo) + Send + 'static,
    {
        let name = name.into();
        if period.is_zero() {
            return Err(TaskError::ZeroPeriod(name));
        }
        let runtime = Handle::try_current().map_err(|_| TaskError::NoRuntime(name.clone()))?;

        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let task_name = name.clone();

        let handle = runtime.spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut tick = 0u64;

            loop {
                tokio::select! {
                    biased;
                    _ = &mut shutdown_rx => {
                        debug!(task = %task_name, "Periodic task shutting down");
                        break;
                    }
                    scheduled = interval.tick() => {
                        tick += 1;
                        let lateness = Instant::now().saturating_duration_since(scheduled);
                        trace!(task = %task_name, tick, lateness_ms = lateness.as_secs_f64() * 1000.0, "tick");
                        callback(TickInfo { tick, lateness });
                    }
                }
            }
        });

        debug!(task = %name, period_ms = period.as_millis() as u64, "Periodic task started");

        Ok(Self {
            name,
            period,
            shutdown_tx: Mutex::new(Some(shutdown_tx)),
            handle: Mutex::new(Some(handle)),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Stop the task. Returns `false` if it was already stopped.
    ///
    /// Does not wait: a callback already running may finish after this
    /// returns. Use [`PeriodicTask::shutdown`] when that matters.
    pub fn stop(&self) -> bool {
        if !self.signal_shutdown() {
            return false;
        }
        self.handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        true
    }

    pub fn is_running(&self) -> bool {
        self.shutdown_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Stop the task and wait until its loop has exited.
    pub async fn shutdown(&self) {
        self.signal_shutdown();
        let handle = self
            .handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    fn signal_shutdown(&self) -> bool {
        let sender = self
            .shutdown_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match sender {
            Some(sender) => {
                let _ = sender.send(());
                true
            }
            None => false,
        }
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for PeriodicTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeriodicTask")
            .field("name", &self.name)
            .field("period", &self.period)
            .field("running", &self.is_running())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[test]
    fn test_spawn_without_runtime_fails() {
        let result = PeriodicTask::spawn("orphan", Duration::from_secs(1), |_| {});
        assert!(matches!(result, Err(TaskError::NoRuntime(name)) if name == "orphan"));
    }

    #[tokio::test]
    async fn test_zero_period_rejected() {
        let result = PeriodicTask::spawn("zero", Duration::ZERO, |_| {});
        assert!(matches!(result, Err(TaskError::ZeroPeriod(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_after_each_period() {
        let ticks = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&ticks);
        let task = PeriodicTask::spawn("ticker", Duration::from_secs(1), move |info| {
            counter.store(info.tick, Ordering::SeqCst);
        })
        .unwrap();

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(2600)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 3);

        assert!(task.stop());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_is_idempotent_and_halts_ticks() {
        let ticks = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&ticks);
        let task = PeriodicTask::spawn("stoppable", Duration::from_millis(100), move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        tokio::time::sleep(Duration::from_millis(250)).await;
        task.shutdown().await;
        let after_stop = ticks.load(Ordering::SeqCst);

        assert!(!task.is_running());
        assert!(!task.stop());

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), after_stop);
        assert_eq!(after_stop, 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_shutdown_waits_for_running_callback() {
        let started = Arc::new(AtomicU64::new(0));
        let finished = Arc::new(AtomicU64::new(0));
        let (start_count, finish_count) = (Arc::clone(&started), Arc::clone(&finished));
        let task = PeriodicTask::spawn("slow", Duration::from_millis(5), move |_| {
            start_count.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(50));
            finish_count.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        while started.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        task.shutdown().await;

        let finished_at_shutdown = finished.load(Ordering::SeqCst);
        assert_eq!(finished_at_shutdown, started.load(Ordering::SeqCst));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(finished.load(Ordering::SeqCst), finished_at_shutdown);
    }
}
