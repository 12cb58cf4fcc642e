//! Benchmark runner.
//!
//! Each case moves through `pending -> running -> completed | failed`. A run
//! goes setup, warmup, measured iterations (with the system sampler running),
//! teardown, then the optional validator. Failures in any workload phase,
//! panics included, are captured into the result instead of being returned,
//! so one broken case never aborts a batch.

use crate::case::{BenchmarkCase, IterationContext};
use crate::error::{BenchError, BenchResult, ExecutionError, Phase, WorkloadError};
use crate::result::{
    BenchmarkContext, BenchmarkResult, DURATION_METRIC, MetricStats, validate_thresholds,
};
use crate::sampler::{SystemSampler, SystemSeries};
use futures::future::{self, FutureExt};
use futures::stream::{self, StreamExt};
use perfscope_core::{
    EngineConfig, HostInfo, SharedClock, SysinfoHost, SystemClock, ValidationError,
};
use perfscope_metrics::{MetricOptions, MetricRegistry};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaseState {
    Pending,
    Running,
    /// Ran to the end; thresholds may still have failed.
    Completed,
    /// A workload phase raised an error or panicked.
    Failed,
}

struct RegisteredCase {
    case: Arc<dyn BenchmarkCase>,
    state: CaseState,
}

pub struct BenchmarkRunner {
    cases: RwLock<Vec<RegisteredCase>>,
    host: Arc<dyn HostInfo>,
    clock: SharedClock,
    sampler_interval: Duration,
    registry: Option<Arc<MetricRegistry>>,
}

impl BenchmarkRunner {
    pub fn new(host: Arc<dyn HostInfo>, clock: SharedClock) -> Self {
        Self {
            cases: RwLock::new(Vec::new()),
            host,
            clock,
            sampler_interval: perfscope_core::SamplerConfig::default().interval,
            registry: None,
        }
    }

    /// Real host, system clock.
    pub fn with_defaults() -> Self {
        Self::new(Arc::new(SysinfoHost::new()), SystemClock::shared())
    }

    pub fn from_config(config: &EngineConfig, host: Arc<dyn HostInfo>, clock: SharedClock) -> Self {
        Self::new(host, clock).with_sampler_interval(config.sampler.interval)
    }

    pub fn with_sampler_interval(mut self, interval: Duration) -> Self {
        self.sampler_interval = interval;
        self
    }

    /// Also record iteration durations and run outcomes into `registry`.
    pub fn with_registry(mut self, registry: Arc<MetricRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn register_case<C>(&self, case: C) -> Result<(), ValidationError>
    where
        C: BenchmarkCase + 'static,
    {
        self.register_arc(Arc::new(case))
    }

    pub fn register_arc(&self, case: Arc<dyn BenchmarkCase>) -> Result<(), ValidationError> {
        case.config().validate()?;

        let mut cases = self.cases.write().unwrap_or_else(PoisonError::into_inner);
        let name = &case.config().name;
        if cases.iter().any(|entry| entry.case.config().name == *name) {
            return Err(ValidationError::duplicate("benchmark case", name));
        }
        cases.push(RegisteredCase {
            case,
            state: CaseState::Pending,
        });
        Ok(())
    }

    pub fn unregister_case(&self, name: &str) -> bool {
        let mut cases = self.cases.write().unwrap_or_else(PoisonError::into_inner);
        let before = cases.len();
        cases.retain(|entry| entry.case.config().name != name);
        cases.len() != before
    }

    /// Registered names in registration order.
    pub fn case_names(&self) -> Vec<String> {
        self.cases
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|entry| entry.case.config().name.clone())
            .collect()
    }

    pub fn case_state(&self, name: &str) -> Option<CaseState> {
        self.cases
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|entry| entry.case.config().name == name)
            .map(|entry| entry.state)
    }

    pub async fn run_case(&self, name: &str) -> BenchResult<BenchmarkResult> {
        let case = self
            .find(name)
            .ok_or_else(|| BenchError::CaseNotFound(name.to_string()))?;

        self.set_state(name, CaseState::Running);
        let result = self.execute(case.as_ref()).await;
        self.set_state(
            name,
            if result.error.is_some() {
                CaseState::Failed
            } else {
                CaseState::Completed
            },
        );
        self.record_outcome(&result);
        Ok(result)
    }

    /// Run every registered case in registration order.
    pub async fn run_all(&self) -> Vec<BenchmarkResult> {
        let mut results = Vec::new();
        for name in self.case_names() {
            match self.run_case(&name).await {
                Ok(result) => results.push(result),
                // Unregistered while the batch was running.
                Err(BenchError::CaseNotFound(_)) => {}
                Err(error) => warn!(case = %name, %error, "Skipping benchmark case"),
            }
        }
        results
    }

    /// Run the named cases in the given order. Every name is checked before
    /// anything runs.
    pub async fn run_cases(&self, names: &[&str]) -> BenchResult<Vec<BenchmarkResult>> {
        if let Some(missing) = names.iter().find(|name| self.find(name).is_none()) {
            return Err(BenchError::CaseNotFound((*missing).to_string()));
        }

        let mut results = Vec::with_capacity(names.len());
        for name in names {
            results.push(self.run_case(name).await?);
        }
        Ok(results)
    }

    pub fn len(&self) -> usize {
        self.cases.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn find(&self, name: &str) -> Option<Arc<dyn BenchmarkCase>> {
        self.cases
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|entry| entry.case.config().name == name)
            .map(|entry| Arc::clone(&entry.case))
    }

    fn set_state(&self, name: &str, state: CaseState) {
        let mut cases = self.cases.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(entry) = cases
            .iter_mut()
            .find(|entry| entry.case.config().name == name)
        {
            entry.state = state;
        }
    }

    async fn execute(&self, case: &dyn BenchmarkCase) -> BenchmarkResult {
        let config = case.config().clone();
        let environment = self.host.snapshot();
        let timestamp_ms = self.clock.now_ms();

        info!(
            case = %config.name,
            iterations = config.iterations,
            warmup_runs = config.warmup_runs,
            concurrency = config.concurrency,
            "Starting benchmark case"
        );

        let mut failure = guarded(Phase::Setup, case.setup()).await.err();

        if failure.is_none() {
            for index in 0..config.warmup_runs {
                let ctx = IterationContext { index, warmup: true };
                if let Err(error) = guarded(Phase::Warmup, case.warmup(ctx)).await {
                    failure = Some(error);
                    break;
                }
            }
        }

        let mut durations = Vec::new();
        let mut elapsed = Duration::ZERO;
        let mut system = SystemSeries::default();

        if failure.is_none() {
            let sampler = SystemSampler::new(
                Arc::clone(&self.host),
                self.clock.clone(),
                self.sampler_interval,
            );
            if let Err(error) = sampler.start() {
                warn!(case = %config.name, %error, "System sampler unavailable");
            }

            let started = self.clock.monotonic();
            let (measured, error) = self.run_iterations(case, started).await;
            elapsed = self.clock.monotonic().saturating_sub(started);
            system = sampler.finish().await;

            durations = measured;
            failure = error;
        }

        if let Err(error) = guarded(Phase::Teardown, case.teardown()).await {
            warn!(case = %config.name, %error, "Teardown failed");
        }

        let completed = durations.len();
        let mut metrics: BTreeMap<String, MetricStats> = system.into_metrics();
        if !durations.is_empty() {
            self.record_durations(&config.name, &durations);
            metrics.insert(DURATION_METRIC.to_string(), MetricStats::from_values(durations));
        }

        let duration_ms = elapsed.as_secs_f64() * 1000.0;
        let ops_per_second = if duration_ms > 0.0 {
            completed as f64 / duration_ms * 1000.0
        } else {
            0.0
        };
        let threshold_validation = validate_thresholds(&config, &metrics);

        let mut result = BenchmarkResult {
            run_id: Uuid::new_v4(),
            config,
            context: BenchmarkContext { environment },
            passed: false,
            duration_ms,
            iterations: u32::try_from(completed).unwrap_or(u32::MAX),
            operations: completed as u64,
            ops_per_second,
            metrics,
            threshold_validation,
            error: failure,
            timestamp_ms,
        };
        result.passed = result.error.is_none() && result.thresholds_passed();

        match guarded(Phase::Validate, case.validate(&result)).await {
            Ok(Some(false)) => result.passed = false,
            Ok(_) => {}
            Err(error) => {
                result.passed = false;
                if result.error.is_none() {
                    result.error = Some(error);
                }
            }
        }

        self.log_outcome(&result);
        result
    }

    /// Measured iterations. Returns the per-iteration durations in ms and the
    /// first failure, if any. No iteration starts after a failure or once the
    /// timeout budget has elapsed.
    async fn run_iterations(
        &self,
        case: &dyn BenchmarkCase,
        started: Duration,
    ) -> (Vec<f64>, Option<ExecutionError>) {
        let config = case.config();
        let budget = config.timeout_ms.map(Duration::from_millis);
        let clock = &self.clock;
        let over_budget = || {
            budget.is_some_and(|budget| clock.monotonic().saturating_sub(started) >= budget)
        };
        let warn_budget = |completed: usize| {
            warn!(
                case = %config.name,
                completed,
                iterations = config.iterations,
                "Benchmark exceeded its timeout budget, stopping early"
            );
        };

        let mut durations = Vec::with_capacity(config.iterations as usize);

        if config.concurrency <= 1 {
            for index in 0..config.iterations {
                if over_budget() {
                    warn_budget(durations.len());
                    break;
                }
                match measure(clock, case, index).await {
                    Ok(ms) => durations.push(ms),
                    Err(error) => return (durations, Some(error)),
                }
            }
            return (durations, None);
        }

        let halted = AtomicBool::new(false);
        let outcomes: Vec<Result<f64, ExecutionError>> = stream::iter(0..config.iterations)
            .take_while(|_| {
                let stop = halted.load(Ordering::SeqCst) || over_budget();
                future::ready(!stop)
            })
            .map(|index| {
                let halted = &halted;
                async move {
                    let outcome = measure(clock, case, index).await;
                    if outcome.is_err() {
                        halted.store(true, Ordering::SeqCst);
                    }
                    outcome
                }
            })
            .buffer_unordered(config.concurrency as usize)
            .collect()
            .await;

        let mut failure = None;
        for outcome in outcomes {
            match outcome {
                Ok(ms) => durations.push(ms),
                Err(error) if failure.is_none() => failure = Some(error),
                Err(_) => {}
            }
        }
        if failure.is_none() && durations.len() < config.iterations as usize {
            warn_budget(durations.len());
        }
        (durations, failure)
    }

    fn record_durations(&self, name: &str, durations: &[f64]) {
        if let Some(registry) = &self.registry {
            let timer = registry.timer_with(
                &format!("bench.{name}.duration"),
                MetricOptions::new().tag("case", name).unit("ms"),
            );
            for ms in durations {
                timer.record_time(*ms);
            }
        }
    }

    fn record_outcome(&self, result: &BenchmarkResult) {
        if let Some(registry) = &self.registry {
            let outcome = if result.passed { "passed" } else { "failed" };
            registry
                .counter_with(
                    &format!("bench.runs.{outcome}"),
                    MetricOptions::new().description("Benchmark runs by outcome"),
                )
                .increment();
        }
    }

    fn log_outcome(&self, result: &BenchmarkResult) {
        let name = result.name();
        if let Some(failure) = &result.error {
            error!(case = %name, phase = %failure.phase, error = %failure.message, "Benchmark case failed");
            return;
        }
        for (metric, check) in result.failed_checks() {
            warn!(case = %name, metric, check = %check.comparison, "Threshold not met");
        }
        info!(
            case = %name,
            passed = result.passed,
            duration_ms = result.duration_ms,
            ops_per_second = result.ops_per_second,
            "Benchmark case finished"
        );
    }
}

impl Default for BenchmarkRunner {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl std::fmt::Debug for BenchmarkRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BenchmarkRunner")
            .field("cases", &self.case_names())
            .field("sampler_interval", &self.sampler_interval)
            .field("registry", &self.registry.is_some())
            .finish()
    }
}

/// Time one measured iteration on `clock`.
async fn measure(
    clock: &SharedClock,
    case: &dyn BenchmarkCase,
    index: u32,
) -> Result<f64, ExecutionError> {
    let ctx = IterationContext {
        index,
        warmup: false,
    };
    let start = clock.monotonic();
    guarded(Phase::Execute, case.execute(ctx)).await?;
    Ok(clock.monotonic().saturating_sub(start).as_secs_f64() * 1000.0)
}

/// Await a workload future, turning errors and panics into [`ExecutionError`].
async fn guarded<T, Fut>(phase: Phase, fut: Fut) -> Result<T, ExecutionError>
where
    Fut: Future<Output = Result<T, WorkloadError>>,
{
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(error)) => Err(ExecutionError::from_error(phase, &*error)),
        Err(payload) => Err(ExecutionError::from_panic(phase, payload)),
    }
}
