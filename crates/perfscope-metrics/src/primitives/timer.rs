use super::{Histogram, Instrument};
use crate::metric::{Metric, MetricKind, MetricOptions};
use perfscope_core::{SharedClock, ValidationError};
use std::time::Duration;

/// Histogram of elapsed milliseconds measured with an injected clock.
#[derive(Debug)]
pub struct Timer {
    histogram: Histogram,
    clock: SharedClock,
}

impl Timer {
    pub fn new(name: impl Into<String>, options: MetricOptions, clock: SharedClock) -> Self {
        Self {
            histogram: Histogram::new(name, options),
            clock,
        }
    }

    /// Begin a measurement. It is recorded when the guard is stopped or
    /// dropped, whichever comes first.
    pub fn start_timer(&self) -> TimerGuard<'_> {
        TimerGuard {
            timer: self,
            started: self.clock.monotonic(),
            stopped: false,
        }
    }

    pub fn record_time(&self, millis: f64) {
        self.histogram.update(millis);
    }

    pub fn record_duration(&self, duration: Duration) {
        self.record_time(duration.as_secs_f64() * 1000.0);
    }

    /// Run `f` and record how long it took.
    pub fn time<R>(&self, f: impl FnOnce() -> R) -> R {
        let guard = self.start_timer();
        let result = f();
        guard.stop();
        result
    }

    pub fn histogram(&self) -> &Histogram {
        &self.histogram
    }

    pub fn get_percentile(&self, p: f64) -> Result<f64, ValidationError> {
        self.histogram.get_percentile(p)
    }

    pub fn get_mean(&self) -> f64 {
        self.histogram.get_mean()
    }

    pub fn get_median(&self) -> f64 {
        self.histogram.get_median()
    }

    pub fn get_min(&self) -> f64 {
        self.histogram.get_min()
    }

    pub fn get_max(&self) -> f64 {
        self.histogram.get_max()
    }

    pub fn count(&self) -> usize {
        self.histogram.count()
    }
}

impl Instrument for Timer {
    fn name(&self) -> &str {
        self.histogram.name()
    }

    fn kind(&self) -> MetricKind {
        MetricKind::Timer
    }

    fn snapshot(&self, timestamp: i64) -> Metric {
        self.histogram.snapshot_as(MetricKind::Timer, timestamp)
    }
}

/// In-flight measurement returned by [`Timer::start_timer`].
#[must_use = "dropping the guard immediately records a near-zero duration"]
pub struct TimerGuard<'a> {
    timer: &'a Timer,
    started: Duration,
    stopped: bool,
}

impl TimerGuard<'_> {
    /// Record and return the elapsed milliseconds.
    pub fn stop(mut self) -> f64 {
        self.record()
    }

    fn record(&mut self) -> f64 {
        self.stopped = true;
        let elapsed = self.timer.clock.monotonic().saturating_sub(self.started);
        let millis = elapsed.as_secs_f64() * 1000.0;
        self.timer.record_time(millis);
        millis
    }
}

impl Drop for TimerGuard<'_> {
    fn drop(&mut self) {
        if !self.stopped {
            self.record();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use perfscope_core::ManualClock;
    use std::sync::Arc;

    fn manual_timer() -> (Timer, Arc<ManualClock>) {
        let clock = ManualClock::shared(0);
        let timer = Timer::new("request", MetricOptions::default(), clock.clone());
        (timer, clock)
    }

    #[test]
    fn test_stop_records_elapsed() {
        let (timer, clock) = manual_timer();
        let guard = timer.start_timer();
        clock.advance_ms(250);

        assert_eq!(guard.stop(), 250.0);
        assert_eq!(timer.count(), 1);
        assert_eq!(timer.get_max(), 250.0);
    }

    #[test]
    fn test_drop_records_once() {
        let (timer, clock) = manual_timer();
        {
            let _guard = timer.start_timer();
            clock.advance_ms(40);
        }
        assert_eq!(timer.count(), 1);
        assert_eq!(timer.get_mean(), 40.0);
    }

    #[test]
    fn test_time_closure_and_direct_record() {
        let (timer, clock) = manual_timer();
        let value = timer.time(|| {
            clock.advance_ms(10);
            7
        });
        timer.record_time(30.0);

        assert_eq!(value, 7);
        assert_eq!(timer.count(), 2);
        assert_eq!(timer.get_median(), 20.0);
        assert_eq!(timer.snapshot(0).kind, MetricKind::Timer);
    }
}
