//! The phase scheduler (component F): runs prepare → load → validate against a
//! shared [`Step`], grounded on `examples/original_source/benchmark.go`.
//!
//! One deliberate departure from the original's literal control flow: on a
//! prepare/validate callback whose error matches the ignore set, the original's
//! `goto Result` jumps straight to final teardown, skipping every later callback
//! and the load phase entirely. That contradicts its own documented semantics
//! ("an ignored error ... the phase considers the callback successful") and the
//! worked example of registering an ignored prepare error alongside a load step
//! that must still run. This implementation treats an ignored error as the
//! non-fatal case it's documented to be: the current phase continues to its next
//! callback instead of aborting the whole run.

mod scenario;

pub use scenario::{LoadsScenario, PreparesScenario, Scenario, ValidatesScenario};

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio_util::sync::CancellationToken;

use crate::error::{Cause, ErrorCode, StructuredError};
use crate::parallel::Parallel;
use crate::step::{BenchmarkResult, Step};

type ScenarioFn = Arc<dyn Fn(CancellationToken, Step) -> BoxFuture<'static, Option<Cause>> + Send + Sync>;
type ErrorHook = Arc<dyn Fn(&(dyn std::error::Error + Send + Sync), &Step) + Send + Sync>;

/// Construction-time options, mirroring the original's functional-options
/// (`WithPrepareTimeout`, `WithLoadTimeout`, `WithoutPanicRecover`) as a builder.
#[derive(Clone)]
pub struct BenchmarkOptions {
    prepare_timeout: Option<Duration>,
    load_timeout: Option<Duration>,
    panic_recover: bool,
}

impl Default for BenchmarkOptions {
    fn default() -> Self {
        BenchmarkOptions {
            prepare_timeout: None,
            load_timeout: None,
            panic_recover: true,
        }
    }
}

impl BenchmarkOptions {
    pub fn prepare_timeout(mut self, d: Duration) -> Self {
        self.prepare_timeout = Some(d);
        self
    }

    pub fn load_timeout(mut self, d: Duration) -> Self {
        self.load_timeout = Some(d);
        self
    }

    pub fn without_panic_recover(mut self) -> Self {
        self.panic_recover = false;
        self
    }
}

/// Orchestrates the prepare/load/validate lifecycle of a benchmark run.
pub struct Benchmark {
    options: BenchmarkOptions,
    prepare: Mutex<Vec<ScenarioFn>>,
    load: Mutex<Vec<ScenarioFn>>,
    validate: Mutex<Vec<ScenarioFn>>,
    hooks: Mutex<Vec<ErrorHook>>,
    ignore_codes: Mutex<Vec<ErrorCode>>,
}

impl Benchmark {
    pub fn new(options: BenchmarkOptions) -> Self {
        Benchmark {
            options,
            prepare: Mutex::new(Vec::new()),
            load: Mutex::new(Vec::new()),
            validate: Mutex::new(Vec::new()),
            hooks: Mutex::new(Vec::new()),
            ignore_codes: Mutex::new(Vec::new()),
        }
    }

    fn push_scenario(list: &Mutex<Vec<ScenarioFn>>, f: ScenarioFn) {
        list.lock().expect("scenario list poisoned").push(f);
    }

    pub fn prepare<F, Fut>(&self, f: F)
    where
        F: Fn(CancellationToken, Step) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Option<Cause>> + Send + 'static,
    {
        Self::push_scenario(&self.prepare, scenario_fn_for(f));
    }

    pub fn load<F, Fut>(&self, f: F)
    where
        F: Fn(CancellationToken, Step) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Option<Cause>> + Send + 'static,
    {
        Self::push_scenario(&self.load, scenario_fn_for(f));
    }

    pub fn validation<F, Fut>(&self, f: F)
    where
        F: Fn(CancellationToken, Step) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Option<Cause>> + Send + 'static,
    {
        Self::push_scenario(&self.validate, scenario_fn_for(f));
    }

    /// Registers a hook invoked for every error appended to the result's error
    /// aggregator, alongside the [`Step`] driving the run it was added from.
    pub fn on_error(
        &self,
        hook: impl Fn(&(dyn std::error::Error + Send + Sync), &Step) + Send + Sync + 'static,
    ) {
        self.hooks.lock().expect("hook list poisoned").push(Arc::new(hook));
    }

    pub fn ignore_error_code(&self, code: impl Into<ErrorCode>) {
        self.ignore_codes.lock().expect("ignore list poisoned").push(code.into());
    }

    /// Registers every capability `scenario` exposes (see [`Scenario`]). Panics
    /// with `"invalid scenario"` if it exposes none — loud failure on
    /// misconfiguration, matching the majority behavior among prior
    /// implementations of this contract.
    pub fn add_scenario<T: Scenario>(&self, scenario: Arc<T>) {
        let mut matched = false;

        if let Some(p) = scenario.clone().as_prepare() {
            Self::push_scenario(&self.prepare, scenario_fn_for(move |ctx, step| {
                let p = p.clone();
                async move { p.prepare(ctx, step).await }
            }));
            matched = true;
        }
        if let Some(l) = scenario.clone().as_load() {
            Self::push_scenario(&self.load, scenario_fn_for(move |ctx, step| {
                let l = l.clone();
                async move { l.load(ctx, step).await }
            }));
            matched = true;
        }
        if let Some(v) = scenario.as_validate() {
            Self::push_scenario(&self.validate, scenario_fn_for(move |ctx, step| {
                let v = v.clone();
                async move { v.validate(ctx, step).await }
            }));
            matched = true;
        }

        if !matched {
            panic!("invalid scenario");
        }
    }

    fn is_ignored(&self, err: &(dyn std::error::Error + 'static)) -> bool {
        self.ignore_codes
            .lock()
            .expect("ignore list poisoned")
            .iter()
            .any(|code| crate::error::is_code(err, code))
    }

    /// Runs prepare → load → validate against a child of `parent`, returning the
    /// result snapshot once both aggregators have fully drained.
    pub async fn start(&self, parent: CancellationToken) -> BenchmarkResult {
        let child = parent.child_token();
        let result = BenchmarkResult {
            score: crate::aggregate::ScoreAggregator::new(child.clone()),
            errors: crate::aggregate::ErrorAggregator::new(child.clone()),
        };
        let step = Step::new(result.clone(), child.clone());

        for hook in self.hooks.lock().expect("hook list poisoned").iter().cloned() {
            let step_for_hook = step.clone();
            result.errors.hook(move |err| hook(err, &step_for_hook));
        }

        step.set_phase_code(Some(ErrorCode::PREPARE));
        let prepares: Vec<ScenarioFn> = self.prepare.lock().expect("prepare list poisoned").clone();
        let mut fatal = false;
        for prepare in prepares {
            let phase = PhaseContext::new(&child, self.options.prepare_timeout);
            let outcome = self.invoke(prepare, phase.token.clone(), step.clone()).await;
            if let Some(err) = outcome {
                if self.is_ignored(err.as_ref()) {
                    continue;
                }
                step.add_error(err);
                fatal = true;
                break;
            }
        }
        result.errors.wait().await;
        if fatal || child.is_cancelled() {
            return self.finish(result, step, child).await;
        }

        step.set_phase_code(Some(ErrorCode::LOAD));
        let load_phase = PhaseContext::new(&child, self.options.load_timeout);
        let dispatcher = Parallel::new(-1, load_phase.token.clone());
        let loads: Vec<ScenarioFn> = self.load.lock().expect("load list poisoned").clone();
        for load in loads {
            let step = step.clone();
            let ctx = load_phase.token.clone();
            let panic_recover = self.options.panic_recover;
            let ignore_codes = self.ignore_codes.lock().expect("ignore list poisoned").clone();
            let _ = dispatcher
                .do_now(async move {
                    let outcome = panic_wrapper(panic_recover, load(ctx, step.clone())).await;
                    if let Some(err) = outcome {
                        let ignored = ignore_codes.iter().any(|code| crate::error::is_code(err.as_ref(), code));
                        if !ignored {
                            step.add_error(err);
                        }
                    }
                })
                .await;
        }
        dispatcher.wait().await;
        drop(load_phase);
        result.errors.wait().await;
        if child.is_cancelled() {
            return self.finish(result, step, child).await;
        }

        step.set_phase_code(Some(ErrorCode::VALIDATION));
        let validates: Vec<ScenarioFn> = self.validate.lock().expect("validate list poisoned").clone();
        for validate in validates {
            let outcome = self.invoke(validate, child.clone(), step.clone()).await;
            if let Some(err) = outcome {
                if self.is_ignored(err.as_ref()) {
                    continue;
                }
                step.add_error(err);
                break;
            }
        }

        self.finish(result, step, child).await
    }

    async fn invoke(&self, f: ScenarioFn, ctx: CancellationToken, step: Step) -> Option<Cause> {
        panic_wrapper(self.options.panic_recover, f(ctx, step)).await
    }

    async fn finish(&self, result: BenchmarkResult, step: Step, child: CancellationToken) -> BenchmarkResult {
        child.cancel();
        result.score.done().await;
        result.errors.done().await;
        step.set_phase_code(None);
        result
    }
}

fn scenario_fn_for<F, Fut>(f: F) -> ScenarioFn
where
    F: Fn(CancellationToken, Step) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Option<Cause>> + Send + 'static,
{
    Arc::new(move |ctx, step| Box::pin(f(ctx, step)) as BoxFuture<'static, Option<Cause>>)
}

/// A phase-scoped cancellation token, optionally deadline-bounded. Aborts its
/// backing timer task on drop so no phase outlives `start()`'s return.
struct PhaseContext {
    token: CancellationToken,
    timer: Option<tokio::task::JoinHandle<()>>,
}

impl PhaseContext {
    fn new(parent: &CancellationToken, timeout: Option<Duration>) -> Self {
        let token = parent.child_token();
        let timer = timeout.map(|d| {
            let token = token.clone();
            tokio::spawn(async move {
                tokio::time::sleep(d).await;
                token.cancel();
            })
        });
        PhaseContext { token, timer }
    }
}

impl Drop for PhaseContext {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

/// The synthetic cause wrapping a recovered panic payload whose value wasn't
/// itself an error.
#[derive(Debug)]
struct PanicMessage(String);

impl std::fmt::Display for PanicMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for PanicMessage {}

async fn panic_wrapper(panic_recover: bool, fut: BoxFuture<'static, Option<Cause>>) -> Option<Cause> {
    if !panic_recover {
        return fut.await;
    }

    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(outcome) => outcome,
        Err(payload) => {
            let cause: Cause = if let Some(msg) = payload.downcast_ref::<String>() {
                Box::new(PanicMessage(msg.clone()))
            } else if let Some(msg) = payload.downcast_ref::<&str>() {
                Box::new(PanicMessage((*msg).to_string()))
            } else {
                Box::new(PanicMessage("non-string panic payload".to_string()))
            };
            Some(Box::new(StructuredError::new(ErrorCode::PANIC, cause)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn ok() -> Option<Cause> {
        None
    }

    #[tokio::test]
    async fn happy_path_reports_no_errors_and_zero_score() {
        let bench = Benchmark::new(BenchmarkOptions::default());
        bench.prepare(|_ctx, _step| async { ok() });
        bench.load(|_ctx, _step| async {
            tokio::time::sleep(Duration::from_millis(1)).await;
            ok()
        });
        bench.validation(|_ctx, _step| async { ok() });

        let result = bench.start(CancellationToken::new()).await;
        assert!(result.errors.all().is_empty());
        assert!(result.errors.count().is_empty());
        assert_eq!(result.score.sum(), 0);
    }

    #[tokio::test]
    async fn ignored_prepare_error_lets_load_run() {
        let bench = Benchmark::new(BenchmarkOptions::default());
        bench.ignore_error_code("ignore");
        bench.prepare(|_ctx, _step| async {
            Some(Box::new(StructuredError::new(
                ErrorCode::new("ignore"),
                Box::new(PanicMessage("x".into())) as Cause,
            )) as Cause)
        });

        let flag = Arc::new(AtomicBool::new(false));
        let f = flag.clone();
        bench.load(move |_ctx, _step| {
            let f = f.clone();
            async move {
                f.store(true, Ordering::SeqCst);
                ok()
            }
        });

        let result = bench.start(CancellationToken::new()).await;
        assert!(result.errors.all().is_empty());
        assert!(flag.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn fatal_prepare_error_skips_load() {
        let bench = Benchmark::new(BenchmarkOptions::default());
        bench.prepare(|_ctx, _step| async {
            Some(Box::new(PanicMessage("boom".into())) as Cause)
        });

        let flag = Arc::new(AtomicBool::new(false));
        let f = flag.clone();
        bench.load(move |_ctx, _step| {
            let f = f.clone();
            async move {
                f.store(true, Ordering::SeqCst);
                ok()
            }
        });

        let result = bench.start(CancellationToken::new()).await;
        assert_eq!(result.errors.all().len(), 1);
        assert!(!flag.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn load_panic_is_captured_with_panic_code() {
        let bench = Benchmark::new(BenchmarkOptions::default());
        bench.load(|_ctx, _step| async { panic!("x") });

        let result = bench.start(CancellationToken::new()).await;
        let all = result.errors.all();
        assert_eq!(all.len(), 1);
        assert!(all[0].is_code(&ErrorCode::PANIC));
        assert!(all[0].message().contains('x'));
    }

    #[tokio::test]
    async fn load_timeout_cancels_before_callback_finishes() {
        let bench = Benchmark::new(BenchmarkOptions::default().load_timeout(Duration::from_millis(5)));
        let flag = Arc::new(AtomicBool::new(false));
        let f = flag.clone();
        bench.load(move |ctx, _step| {
            let f = f.clone();
            async move {
                tokio::select! {
                    _ = ctx.cancelled() => {}
                    _ = tokio::time::sleep(Duration::from_millis(100)) => {
                        f.store(true, Ordering::SeqCst);
                    }
                }
                ok()
            }
        });

        bench.start(CancellationToken::new()).await;
        assert!(!flag.load(Ordering::SeqCst));
    }
}
