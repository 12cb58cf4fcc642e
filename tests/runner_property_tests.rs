//! Property-Based Runner Tests
//!
//! Whatever the iteration count or per-iteration cost, the runner's
//! derived statistics and threshold verdicts must agree with the workload.

use perfscope::bench::{
    BenchmarkConfig, BenchmarkLevel, BenchmarkRunner, BenchmarkType, DURATION_METRIC, StatKey,
    create_case,
};
use perfscope::core::{ManualClock, StaticHost};
use proptest::prelude::*;
use std::sync::Arc;

fn fixed_cost_runner(clock: &Arc<ManualClock>, config: BenchmarkConfig, ms: u64) -> BenchmarkRunner {
    let runner = BenchmarkRunner::new(Arc::new(StaticHost::default()), clock.clone());
    let workload_clock = Arc::clone(clock);
    runner
        .register_case(create_case(config, move |_ctx| {
            let clock = Arc::clone(&workload_clock);
            async move {
                clock.advance_ms(ms);
                Ok(())
            }
        }))
        .expect("Config should be valid");
    runner
}

proptest! {
    /// Property: duration statistics and throughput follow from the per-iteration cost
    #[test]
    fn prop_stats_match_fixed_cost(iterations in 1u32..30, ms in 1u64..50) {
        tokio_test::block_on(async {
            let clock = ManualClock::shared(0);
            let config = BenchmarkConfig::new("fixed", BenchmarkType::Latency, BenchmarkLevel::Unit)
                .iterations(iterations)
                .warmup_runs(1);
            let runner = fixed_cost_runner(&clock, config, ms);

            let result = runner.run_case("fixed").await.expect("Case should be registered");
            let stats = result.duration_stats().expect("Durations should be recorded");
            let expected = ms as f64;

            prop_assert_eq!(result.iterations, iterations);
            prop_assert_eq!(stats.values.len(), iterations as usize);
            prop_assert!((stats.mean - expected).abs() < 1e-6);
            prop_assert!((stats.p99 - expected).abs() < 1e-6);
            prop_assert!(stats.std_dev.abs() < 1e-6);
            prop_assert!((result.duration_ms - expected * f64::from(iterations)).abs() < 1e-6);
            prop_assert!((result.ops_per_second - 1_000.0 / expected).abs() < 1e-6);
            Ok(())
        })?;
    }

    /// Property: a max-duration threshold passes exactly when the cost is within it
    #[test]
    fn prop_max_threshold_verdict(ms in 1u64..50, limit in 1u64..50) {
        tokio_test::block_on(async {
            let clock = ManualClock::shared(0);
            let config = BenchmarkConfig::new("bounded", BenchmarkType::Latency, BenchmarkLevel::Unit)
                .iterations(5)
                .warmup_runs(0)
                .threshold(DURATION_METRIC, StatKey::Max, limit as f64 + 0.5);
            let runner = fixed_cost_runner(&clock, config, ms);

            let result = runner.run_case("bounded").await.expect("Case should be registered");
            prop_assert_eq!(result.passed, ms <= limit);
            prop_assert!(result.error.is_none());
            Ok(())
        })?;
    }
}
