//! Benchmark cases.
//!
//! A case is a workload plus optional lifecycle hooks. Implement
//! [`BenchmarkCase`] directly for stateful workloads, or build an
//! [`FnCase`] from closures with [`create_case`].

use crate::config::BenchmarkConfig;
use crate::error::WorkloadError;
use crate::result::BenchmarkResult;
use async_trait::async_trait;
use futures::FutureExt;
use futures::future::BoxFuture;
use std::future::Future;

/// Passed to every warmup and measured iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IterationContext {
    /// Zero-based within the phase.
    pub index: u32,
    pub warmup: bool,
}

#[async_trait]
pub trait BenchmarkCase: Send + Sync {
    fn config(&self) -> &BenchmarkConfig;

    async fn setup(&self) -> Result<(), WorkloadError> {
        Ok(())
    }

    /// Runs `warmup_runs` times before measurement. Defaults to [`execute`](Self::execute).
    async fn warmup(&self, ctx: IterationContext) -> Result<(), WorkloadError> {
        self.execute(ctx).await
    }

    /// One measured iteration.
    async fn execute(&self, ctx: IterationContext) -> Result<(), WorkloadError>;

    /// Always called once setup has been attempted.
    async fn teardown(&self) -> Result<(), WorkloadError> {
        Ok(())
    }

    /// `Some(false)` fails the run even when every threshold passed.
    async fn validate(&self, _result: &BenchmarkResult) -> Result<Option<bool>, WorkloadError> {
        Ok(None)
    }
}

type Hook = Box<dyn Fn() -> BoxFuture<'static, Result<(), WorkloadError>> + Send + Sync>;
type Workload =
    Box<dyn Fn(IterationContext) -> BoxFuture<'static, Result<(), WorkloadError>> + Send + Sync>;
type Validator = Box<dyn Fn(&BenchmarkResult) -> Result<bool, WorkloadError> + Send + Sync>;

/// Closure-backed [`BenchmarkCase`].
pub struct FnCase {
    config: BenchmarkConfig,
    execute: Workload,
    warmup: Option<Workload>,
    setup: Option<Hook>,
    teardown: Option<Hook>,
    validator: Option<Validator>,
}

/// Build a case whose measured iteration is `workload`.
///
/// ```ignore
/// let case = create_case(config, |ctx| async move {
///     parse(ctx.index)?;
///     Ok(())
/// });
/// ```
pub fn create_case<F, Fut>(config: BenchmarkConfig, workload: F) -> FnCase
where
    F: Fn(IterationContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), WorkloadError>> + Send + 'static,
{
    FnCase {
        config,
        execute: boxed_workload(workload),
        warmup: None,
        setup: None,
        teardown: None,
        validator: None,
    }
}

fn boxed_workload<F, Fut>(workload: F) -> Workload
where
    F: Fn(IterationContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), WorkloadError>> + Send + 'static,
{
    Box::new(move |ctx| workload(ctx).boxed())
}

fn boxed_hook<F, Fut>(hook: F) -> Hook
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), WorkloadError>> + Send + 'static,
{
    Box::new(move || hook().boxed())
}

impl FnCase {
    pub fn with_setup<F, Fut>(mut self, setup: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), WorkloadError>> + Send + 'static,
    {
        self.setup = Some(boxed_hook(setup));
        self
    }

    pub fn with_warmup<F, Fut>(mut self, warmup: F) -> Self
    where
        F: Fn(IterationContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), WorkloadError>> + Send + 'static,
    {
        self.warmup = Some(boxed_workload(warmup));
        self
    }

    pub fn with_teardown<F, Fut>(mut self, teardown: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), WorkloadError>> + Send + 'static,
    {
        self.teardown = Some(boxed_hook(teardown));
        self
    }

    pub fn with_validator<F>(mut self, validator: F) -> Self
    where
        F: Fn(&BenchmarkResult) -> Result<bool, WorkloadError> + Send + Sync + 'static,
    {
        self.validator = Some(Box::new(validator));
        self
    }
}

impl std::fmt::Debug for FnCase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnCase")
            .field("name", &self.config.name)
            .field("has_setup", &self.setup.is_some())
            .field("has_warmup", &self.warmup.is_some())
            .field("has_teardown", &self.teardown.is_some())
            .field("has_validator", &self.validator.is_some())
            .finish()
    }
}

#[async_trait]
impl BenchmarkCase for FnCase {
    fn config(&self) -> &BenchmarkConfig {
        &self.config
    }

    async fn setup(&self) -> Result<(), WorkloadError> {
        match &self.setup {
            Some(setup) => setup().await,
            None => Ok(()),
        }
    }

    async fn warmup(&self, ctx: IterationContext) -> Result<(), WorkloadError> {
        match &self.warmup {
            Some(warmup) => warmup(ctx).await,
            None => (self.execute)(ctx).await,
        }
    }

    async fn execute(&self, ctx: IterationContext) -> Result<(), WorkloadError> {
        (self.execute)(ctx).await
    }

    async fn teardown(&self) -> Result<(), WorkloadError> {
        match &self.teardown {
            Some(teardown) => teardown().await,
            None => Ok(()),
        }
    }

    async fn validate(&self, result: &BenchmarkResult) -> Result<Option<bool>, WorkloadError> {
        self.validator
            .as_ref()
            .map(|validator| validator(result))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BenchmarkLevel, BenchmarkType};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn config() -> BenchmarkConfig {
        BenchmarkConfig::new("closure", BenchmarkType::Throughput, BenchmarkLevel::Unit)
    }

    #[tokio::test]
    async fn test_warmup_defaults_to_execute() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let case = create_case(config(), move |_ctx| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });

        case.warmup(IterationContext { index: 0, warmup: true }).await.unwrap();
        case.execute(IterationContext { index: 0, warmup: false }).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_custom_hooks_are_used() {
        let hooks = Arc::new(AtomicU32::new(0));
        let (setup, warmup, teardown) = (hooks.clone(), hooks.clone(), hooks.clone());

        let case = create_case(config(), |_ctx| async { Ok(()) })
            .with_setup(move || {
                let setup = setup.clone();
                async move {
                    setup.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            })
            .with_warmup(move |_ctx| {
                let warmup = warmup.clone();
                async move {
                    warmup.fetch_add(10, Ordering::SeqCst);
                    Ok(())
                }
            })
            .with_teardown(move || {
                let teardown = teardown.clone();
                async move {
                    teardown.fetch_add(100, Ordering::SeqCst);
                    Ok(())
                }
            });

        case.setup().await.unwrap();
        case.warmup(IterationContext { index: 0, warmup: true }).await.unwrap();
        case.teardown().await.unwrap();
        assert_eq!(hooks.load(Ordering::SeqCst), 111);
    }

    #[test]
    fn test_workload_errors_propagate() {
        let case = create_case(config(), |ctx| async move {
            if ctx.index == 3 {
                return Err("iteration 3 failed".into());
            }
            Ok(())
        });

        tokio_test::block_on(async {
            assert!(case.execute(IterationContext { index: 2, warmup: false }).await.is_ok());
            let error = case
                .execute(IterationContext { index: 3, warmup: false })
                .await
                .unwrap_err();
            assert_eq!(error.to_string(), "iteration 3 failed");
        });
    }
}
