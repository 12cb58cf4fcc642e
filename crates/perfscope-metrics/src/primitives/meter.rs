use super::Instrument;
use crate::metric::{Metric, MetricKind, MetricOptions};
use perfscope_core::{PeriodicTask, SharedClock, TaskError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Granularity at which meter rates are recomputed.
pub const TICK_INTERVAL: Duration = Duration::from_secs(5);

const ONE_MINUTE: Duration = Duration::from_secs(60);
const FIVE_MINUTES: Duration = Duration::from_secs(5 * 60);
const FIFTEEN_MINUTES: Duration = Duration::from_secs(15 * 60);

/// Exponentially weighted moving average of an event rate, per second.
#[derive(Debug, Clone, Copy)]
struct Ewma {
    alpha: f64,
    rate: f64,
    initialized: bool,
}

impl Ewma {
    fn new(window: Duration, tick: Duration) -> Self {
        Self {
            alpha: 1.0 - (-tick.as_secs_f64() / window.as_secs_f64()).exp(),
            rate: 0.0,
            initialized: false,
        }
    }

    fn tick(&mut self, events: u64, tick: Duration) {
        let instant_rate = events as f64 / tick.as_secs_f64();
        if self.initialized {
            self.rate += self.alpha * (instant_rate - self.rate);
        } else {
            self.rate = instant_rate;
            self.initialized = true;
        }
    }
}

#[derive(Debug)]
struct Rates {
    m1: Ewma,
    m5: Ewma,
    m15: Ewma,
}

/// Lifetime event count plus 1, 5 and 15 minute EWMA rates.
///
/// Rates only move on [`Meter::tick`]; until the first tick all three read
/// zero.
#[derive(Debug)]
pub struct Meter {
    name: String,
    options: MetricOptions,
    count: AtomicU64,
    uncounted: AtomicU64,
    rates: Mutex<Rates>,
    tick_interval: Duration,
    clock: SharedClock,
    created: Duration,
}

impl Meter {
    pub fn new(name: impl Into<String>, options: MetricOptions, clock: SharedClock) -> Self {
        Self::with_tick_interval(name, options, clock, TICK_INTERVAL)
    }

    pub fn with_tick_interval(
        name: impl Into<String>,
        options: MetricOptions,
        clock: SharedClock,
        tick_interval: Duration,
    ) -> Self {
        let tick_interval = if tick_interval.is_zero() {
            TICK_INTERVAL
        } else {
            tick_interval
        };
        Self {
            name: name.into(),
            options,
            count: AtomicU64::new(0),
            uncounted: AtomicU64::new(0),
            rates: Mutex::new(Rates {
                m1: Ewma::new(ONE_MINUTE, tick_interval),
                m5: Ewma::new(FIVE_MINUTES, tick_interval),
                m15: Ewma::new(FIFTEEN_MINUTES, tick_interval),
            }),
            tick_interval,
            created: clock.monotonic(),
            clock,
        }
    }

    pub fn mark(&self) {
        self.mark_n(1);
    }

    pub fn mark_n(&self, events: u64) {
        self.count.fetch_add(events, Ordering::Relaxed);
        self.uncounted.fetch_add(events, Ordering::Relaxed);
    }

    /// Fold events marked since the previous tick into the three rates.
    pub fn tick(&self) {
        let events = self.uncounted.swap(0, Ordering::AcqRel);
        let mut rates = self.rates.lock().unwrap_or_else(PoisonError::into_inner);
        rates.m1.tick(events, self.tick_interval);
        rates.m5.tick(events, self.tick_interval);
        rates.m15.tick(events, self.tick_interval);
    }

    /// Tick this meter on its own background task.
    pub fn spawn_ticker(self: &Arc<Self>) -> Result<PeriodicTask, TaskError> {
        let meter = Arc::downgrade(self);
        PeriodicTask::spawn(
            format!("meter-tick:{}", self.name),
            self.tick_interval,
            move |_| {
                if let Some(meter) = meter.upgrade() {
                    meter.tick();
                }
            },
        )
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn one_minute_rate(&self) -> f64 {
        self.rates().m1.rate
    }

    pub fn five_minute_rate(&self) -> f64 {
        self.rates().m5.rate
    }

    pub fn fifteen_minute_rate(&self) -> f64 {
        self.rates().m15.rate
    }

    /// Lifetime events per second.
    pub fn mean_rate(&self) -> f64 {
        let elapsed = self.clock.monotonic().saturating_sub(self.created);
        if elapsed.is_zero() {
            return 0.0;
        }
        self.count() as f64 / elapsed.as_secs_f64()
    }

    pub fn tick_interval(&self) -> Duration {
        self.tick_interval
    }

    fn rates(&self) -> std::sync::MutexGuard<'_, Rates> {
        self.rates.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Instrument for Meter {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> MetricKind {
        MetricKind::Meter
    }

    fn snapshot(&self, timestamp: i64) -> Metric {
        let (m1, m5, m15) = {
            let rates = self.rates();
            (rates.m1.rate, rates.m5.rate, rates.m15.rate)
        };
        let count = self.count() as f64;

        self.options.decorate(
            Metric::new(self.name.clone(), MetricKind::Meter, count, timestamp)
                .with_attribute("count", count)
                .with_attribute("m1_rate", m1)
                .with_attribute("m5_rate", m5)
                .with_attribute("m15_rate", m15)
                .with_attribute("mean_rate", self.mean_rate()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use perfscope_core::ManualClock;

    fn meter() -> (Meter, Arc<ManualClock>) {
        let clock = ManualClock::shared(0);
        (Meter::new("events", MetricOptions::default(), clock.clone()), clock)
    }

    #[test]
    fn test_rates_zero_before_first_tick() {
        let (meter, _) = meter();
        meter.mark_n(100);

        assert_eq!(meter.count(), 100);
        assert_eq!(meter.one_minute_rate(), 0.0);
        assert_eq!(meter.five_minute_rate(), 0.0);
        assert_eq!(meter.fifteen_minute_rate(), 0.0);
    }

    #[test]
    fn test_first_tick_seeds_instant_rate() {
        let (meter, _) = meter();
        meter.mark_n(50);
        meter.tick();

        // 50 events over a 5 second tick.
        assert_eq!(meter.one_minute_rate(), 10.0);
        assert_eq!(meter.fifteen_minute_rate(), 10.0);
    }

    #[test]
    fn test_idle_ticks_decay_by_window() {
        let (meter, _) = meter();
        meter.mark_n(50);
        meter.tick();
        meter.tick();

        let alpha_1m = 1.0 - (-5.0f64 / 60.0).exp();
        let alpha_15m = 1.0 - (-5.0f64 / 900.0).exp();
        assert!((meter.one_minute_rate() - 10.0 * (1.0 - alpha_1m)).abs() < 1e-9);
        assert!((meter.fifteen_minute_rate() - 10.0 * (1.0 - alpha_15m)).abs() < 1e-9);
        assert!(meter.one_minute_rate() < meter.fifteen_minute_rate());
    }

    #[test]
    fn test_mean_rate_uses_clock() {
        let (meter, clock) = meter();
        assert_eq!(meter.mean_rate(), 0.0);

        meter.mark_n(30);
        clock.advance(Duration::from_secs(10));
        assert_eq!(meter.mean_rate(), 3.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawned_ticker_drives_rates() {
        let clock = ManualClock::shared(0);
        let meter = Arc::new(Meter::new("jobs", MetricOptions::default(), clock));
        let ticker = meter.spawn_ticker().unwrap();

        meter.mark_n(25);
        tokio::time::sleep(TICK_INTERVAL + Duration::from_millis(10)).await;

        assert_eq!(meter.one_minute_rate(), 5.0);
        assert!(ticker.stop());
    }
}
