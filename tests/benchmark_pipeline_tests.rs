//! # Benchmark Pipeline Tests
//!
//! Register cases, run them, check thresholds and state, then report and
//! compare the results. Workloads advance a manual clock so measured
//! durations are exact.

use perfscope::bench::{
    BenchError, BenchmarkConfig, BenchmarkLevel, BenchmarkReporter, BenchmarkResult,
    BenchmarkRunner, BenchmarkType, CaseState, ChangeDirection, DURATION_METRIC, ExportFormat,
    Phase, StatKey, compare, create_case,
};
use perfscope::core::{LocalFs, ManualClock, MemorySink, StaticHost};
use std::sync::Arc;
use tempfile::TempDir;

const START_MS: i64 = 1_700_000_000_000;

fn runner(clock: &Arc<ManualClock>) -> BenchmarkRunner {
    BenchmarkRunner::new(Arc::new(StaticHost::default()), clock.clone())
}

fn config(name: &str) -> BenchmarkConfig {
    BenchmarkConfig::new(name, BenchmarkType::Latency, BenchmarkLevel::Component)
        .iterations(10)
        .warmup_runs(2)
}

/// Register a case whose every iteration takes exactly `ms` on `clock`.
fn register_fixed(runner: &BenchmarkRunner, clock: &Arc<ManualClock>, config: BenchmarkConfig, ms: u64) {
    let clock = Arc::clone(clock);
    runner
        .register_case(create_case(config, move |_ctx| {
            let clock = Arc::clone(&clock);
            async move {
                clock.advance_ms(ms);
                Ok(())
            }
        }))
        .expect("case config is valid");
}

#[tokio::test]
async fn test_threshold_violation_fails_result() {
    let clock = ManualClock::shared(START_MS);
    let runner = runner(&clock);
    register_fixed(
        &runner,
        &clock,
        config("slow-query").threshold(DURATION_METRIC, StatKey::Max, 5.0),
        10,
    );

    let result = runner.run_case("slow-query").await.expect("case is registered");

    assert!(!result.passed);
    assert!(result.error.is_none());
    assert_eq!(result.duration_stats().map(|s| s.mean), Some(10.0));
    let checks = &result
        .threshold_validation
        .as_ref()
        .expect("thresholds were configured")[DURATION_METRIC];
    assert_eq!(checks.len(), 1);
    assert!(!checks[0].passed);
    assert_eq!(runner.case_state("slow-query"), Some(CaseState::Completed));
}

#[tokio::test]
async fn test_unregistered_case_reports_not_found() {
    let clock = ManualClock::shared(START_MS);
    let runner = runner(&clock);

    match runner.run_case("does-not-exist").await {
        Err(BenchError::CaseNotFound(name)) => assert_eq!(name, "does-not-exist"),
        other => panic!("expected CaseNotFound, got {other:?}"),
    }
}

#[tokio::test]
async fn test_batch_survives_failing_case() {
    let clock = ManualClock::shared(START_MS);
    let runner = runner(&clock);
    register_fixed(&runner, &clock, config("first"), 1);
    runner
        .register_case(create_case(config("exploding"), |ctx| async move {
            if ctx.warmup {
                return Ok(());
            }
            Err(format!("iteration {} blew up", ctx.index).into())
        }))
        .expect("case config is valid");
    register_fixed(&runner, &clock, config("last"), 2);

    let results = runner.run_all().await;

    let names: Vec<&str> = results.iter().map(BenchmarkResult::name).collect();
    assert_eq!(names, vec!["first", "exploding", "last"]);
    assert!(results[0].passed);
    assert!(results[2].passed);

    let failure = results[1].error.as_ref().expect("failure was captured");
    assert_eq!(failure.phase, Phase::Execute);
    assert_eq!(failure.message, "iteration 0 blew up");
    assert_eq!(runner.case_state("exploding"), Some(CaseState::Failed));
}

#[tokio::test]
async fn test_results_round_trip_through_json() {
    let clock = ManualClock::shared(START_MS);
    let runner = runner(&clock);
    register_fixed(
        &runner,
        &clock,
        config("round-trip")
            .description("Serialization fixture")
            .tag("json")
            .threshold(DURATION_METRIC, StatKey::P95, 50.0),
        3,
    );
    let results = runner.run_all().await;

    let json = serde_json::to_string(&results).expect("results serialize");
    let parsed: Vec<BenchmarkResult> = serde_json::from_str(&json).expect("results parse");
    assert_eq!(parsed, results);

    let value: serde_json::Value = serde_json::from_str(&json).expect("valid json");
    assert_eq!(value[0]["timestampMs"], START_MS);
    assert_eq!(value[0]["config"]["type"], "latency");
    assert!(value[0]["opsPerSecond"].is_number());
    assert!(value[0]["metrics"]["duration"]["p95"].is_number());
}

#[tokio::test]
async fn test_comparison_reports_improvement() {
    let clock = ManualClock::shared(START_MS);
    let baseline_runner = runner(&clock);
    register_fixed(&baseline_runner, &clock, config("encode"), 10);
    let mut baseline = baseline_runner.run_all().await;
    assert!((baseline[0].ops_per_second - 100.0).abs() < 1e-9);
    baseline[0].ops_per_second = 100.0;

    let mut current = baseline.clone();
    current[0].ops_per_second = 150.0;

    let summary = compare(&baseline, &current);
    let ops = summary.cases[0].ops_per_second;
    assert_eq!(ops.percent, 50.0);
    assert_eq!(ops.direction, ChangeDirection::Improved);

    let reporter = BenchmarkReporter::new("reports", Arc::new(MemorySink::new()), clock.clone());
    let report = reporter.generate_comparison_report(&baseline, &current);
    assert!(report.contains("+50.00%"));
    assert!(report.contains("improved"));
}

#[tokio::test]
async fn test_export_to_disk() {
    let clock = ManualClock::shared(START_MS);
    let runner = runner(&clock);
    register_fixed(&runner, &clock, config("disk"), 4);
    let results = runner.run_all().await;
    // Workloads advanced the wall clock too; pin it for stable file names.
    clock.set_epoch_ms(START_MS);

    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let output_dir = temp_dir.path().join("nested/reports");
    let reporter = BenchmarkReporter::new(&output_dir, Arc::new(LocalFs), clock.clone());

    for format in ExportFormat::ALL {
        let path = reporter.export(&results, format).expect("export succeeds");
        assert!(path.exists(), "{} should exist", path.display());
        assert!(path.starts_with(&output_dir));
    }

    let markdown = std::fs::read_to_string(
        output_dir.join("benchmark-report-2023-11-14T22-13-20-000Z.md"),
    )
    .expect("markdown report was written");
    assert!(markdown.contains("## disk"));
    assert!(markdown.contains("Histogram:"));

    let path = reporter.report(&results[0]).expect("report succeeds");
    assert_eq!(
        path.file_name().and_then(|name| name.to_str()),
        Some("disk-2023-11-14T22-13-20-000Z.json")
    );
}
