//! Metric instruments.
//!
//! Each instrument is internally synchronized and shared as `Arc<_>` by the
//! registry. Writers never wait on the collector: counters, gauges and meter
//! marks are atomics, histogram updates hold their lock only to push a value.

mod counter;
mod gauge;
mod histogram;
mod meter;
mod timer;

pub use counter::Counter;
pub use gauge::Gauge;
pub use histogram::Histogram;
pub use meter::{Meter, TICK_INTERVAL};
pub use timer::{Timer, TimerGuard};

use crate::metric::{Metric, MetricKind};
use std::sync::atomic::{AtomicU64, Ordering};

/// Common surface for snapshotting any instrument.
pub trait Instrument: Send + Sync {
    fn name(&self) -> &str;

    fn kind(&self) -> MetricKind;

    /// Reading stamped with `timestamp` epoch milliseconds.
    fn snapshot(&self, timestamp: i64) -> Metric;
}

/// `f64` stored as bits in an [`AtomicU64`].
#[derive(Debug, Default)]
pub(crate) struct AtomicF64(AtomicU64);

impl AtomicF64 {
    pub(crate) fn new(value: f64) -> Self {
        Self(AtomicU64::new(value.to_bits()))
    }

    pub(crate) fn load(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Acquire))
    }

    pub(crate) fn store(&self, value: f64) {
        self.0.store(value.to_bits(), Ordering::Release);
    }

    pub(crate) fn fetch_add(&self, delta: f64) -> f64 {
        let mut current = self.0.load(Ordering::Acquire);
        loop {
            let next = (f64::from_bits(current) + delta).to_bits();
            match self
                .0
                .compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(previous) => return f64::from_bits(previous),
                Err(actual) => current = actual,
            }
        }
    }
}
