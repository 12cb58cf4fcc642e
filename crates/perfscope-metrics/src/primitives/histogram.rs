use super::Instrument;
use crate::metric::{Metric, MetricKind, MetricOptions};
use perfscope_core::ValidationError;
use perfscope_core::stats;
use std::sync::{Mutex, PoisonError};
use tracing::warn;

#[derive(Debug, Default)]
struct Series {
    values: Vec<f64>,
    /// Sorted copy of `values`, rebuilt lazily after a mutation.
    sorted: Option<Vec<f64>>,
}

/// Unordered, append-only series of observations.
///
/// Every query on an empty histogram returns `0`.
#[derive(Debug)]
pub struct Histogram {
    name: String,
    options: MetricOptions,
    series: Mutex<Series>,
}

impl Histogram {
    pub fn new(name: impl Into<String>, options: MetricOptions) -> Self {
        Self {
            name: name.into(),
            options,
            series: Mutex::new(Series::default()),
        }
    }

    /// Record one observation. NaN and infinities are dropped.
    pub fn update(&self, value: f64) {
        if !value.is_finite() {
            warn!(metric = %self.name, value, "Dropping non-finite histogram observation");
            return;
        }
        let mut series = self.series.lock().unwrap_or_else(PoisonError::into_inner);
        series.values.push(value);
        series.sorted = None;
    }

    /// Interpolated percentile, `p` in `[0, 1]`.
    pub fn get_percentile(&self, p: f64) -> Result<f64, ValidationError> {
        if !(0.0..=1.0).contains(&p) {
            return Err(ValidationError::PercentileOutOfRange(p));
        }
        Ok(self.with_sorted(|sorted| stats::percentile_sorted(sorted, p)))
    }

    pub fn get_mean(&self) -> f64 {
        let series = self.series.lock().unwrap_or_else(PoisonError::into_inner);
        stats::mean(&series.values)
    }

    pub fn get_median(&self) -> f64 {
        self.with_sorted(|sorted| stats::percentile_sorted(sorted, 0.5))
    }

    pub fn get_min(&self) -> f64 {
        self.with_sorted(|sorted| sorted.first().copied().unwrap_or(0.0))
    }

    pub fn get_max(&self) -> f64 {
        self.with_sorted(|sorted| sorted.last().copied().unwrap_or(0.0))
    }

    pub fn get_std_dev(&self) -> f64 {
        let series = self.series.lock().unwrap_or_else(PoisonError::into_inner);
        stats::std_dev(&series.values)
    }

    pub fn count(&self) -> usize {
        self.series
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values
            .len()
    }

    pub fn sum(&self) -> f64 {
        self.series
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values
            .iter()
            .sum()
    }

    /// Observations in insertion order.
    pub fn snapshot_values(&self) -> Vec<f64> {
        self.series
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values
            .clone()
    }

    pub(crate) fn snapshot_as(&self, kind: MetricKind, timestamp: i64) -> Metric {
        let (values, dist) = {
            let mut series = self.series.lock().unwrap_or_else(PoisonError::into_inner);
            let values = series.values.clone();
            let sorted = series
                .sorted
                .get_or_insert_with(|| stats::sorted_copy(&values));
            (values, stats::Distribution::from_sorted(sorted))
        };

        self.options.decorate(
            Metric::new(self.name.clone(), kind, values, timestamp)
                .with_attribute("count", dist.count as f64)
                .with_attribute("min", dist.min)
                .with_attribute("max", dist.max)
                .with_attribute("mean", dist.mean)
                .with_attribute("median", dist.median)
                .with_attribute("p95", dist.p95)
                .with_attribute("p99", dist.p99),
        )
    }

    fn with_sorted<R>(&self, f: impl FnOnce(&[f64]) -> R) -> R {
        let mut series = self.series.lock().unwrap_or_else(PoisonError::into_inner);
        if series.sorted.is_none() {
            series.sorted = Some(stats::sorted_copy(&series.values));
        }
        f(series.sorted.as_deref().unwrap_or_default())
    }
}

impl Instrument for Histogram {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> MetricKind {
        MetricKind::Histogram
    }

    fn snapshot(&self, timestamp: i64) -> Metric {
        self.snapshot_as(MetricKind::Histogram, timestamp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn histogram_with(values: &[f64]) -> Histogram {
        let histogram = Histogram::new("latency", MetricOptions::default());
        for value in values {
            histogram.update(*value);
        }
        histogram
    }

    #[test]
    fn test_basic_statistics() {
        let histogram = histogram_with(&[10.0, 20.0, 30.0, 40.0, 50.0]);
        assert_eq!(histogram.get_mean(), 30.0);
        assert_eq!(histogram.get_median(), 30.0);
        assert_eq!(histogram.get_min(), 10.0);
        assert_eq!(histogram.get_max(), 50.0);
        assert_eq!(histogram.count(), 5);
        assert_eq!(histogram.sum(), 150.0);
    }

    #[test]
    fn test_empty_histogram_is_neutral() {
        let histogram = histogram_with(&[]);
        assert_eq!(histogram.get_mean(), 0.0);
        assert_eq!(histogram.get_median(), 0.0);
        assert_eq!(histogram.get_min(), 0.0);
        assert_eq!(histogram.get_max(), 0.0);
        assert_eq!(histogram.get_percentile(0.99).unwrap(), 0.0);
    }

    #[test]
    fn test_percentile_out_of_range() {
        let histogram = histogram_with(&[1.0]);
        assert_eq!(
            histogram.get_percentile(1.5),
            Err(ValidationError::PercentileOutOfRange(1.5))
        );
        assert!(histogram.get_percentile(-0.1).is_err());
    }

    #[test]
    fn test_cache_invalidated_on_update() {
        let histogram = histogram_with(&[5.0, 1.0]);
        assert_eq!(histogram.get_max(), 5.0);

        histogram.update(9.0);
        assert_eq!(histogram.get_max(), 9.0);
        assert_eq!(histogram.snapshot_values(), vec![5.0, 1.0, 9.0]);
    }

    #[test]
    fn test_non_finite_observation_dropped() {
        let histogram = histogram_with(&[1.0, f64::NAN, f64::INFINITY]);
        assert_eq!(histogram.count(), 1);
    }

    #[test]
    fn test_snapshot_attributes() {
        let histogram = histogram_with(&[1.0, 2.0, 3.0]);
        let metric = histogram.snapshot(7);

        assert_eq!(metric.kind, MetricKind::Histogram);
        assert_eq!(metric.number(), Some(2.0));
        assert_eq!(metric.attributes["count"], 3.0);
        assert_eq!(metric.attributes["max"], 3.0);
    }

    proptest! {
        #[test]
        fn prop_percentile_bounds_and_monotonic(
            values in prop::collection::vec(-1e6f64..1e6, 1..200),
            a in 0.0f64..=1.0,
            b in 0.0f64..=1.0,
        ) {
            let histogram = histogram_with(&values);
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };

            prop_assert_eq!(histogram.get_percentile(0.0).unwrap(), histogram.get_min());
            prop_assert_eq!(histogram.get_percentile(1.0).unwrap(), histogram.get_max());
            prop_assert!(histogram.get_percentile(lo).unwrap() <= histogram.get_percentile(hi).unwrap());
        }
    }
}
