//! End-to-end acceptance tests against the public API, one per scenario in
//! `spec.md` §8 that exercises `Benchmark` (scenario 7, cache revalidation,
//! is covered at the unit level in `src/agent/cache.rs` — it needs no live
//! HTTP server and duplicating it here through the crate's public surface
//! would add a network dependency without adding coverage).

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt as _;
use tokio_util::sync::CancellationToken;

use loadcraft::benchmark::{LoadsScenario, PreparesScenario, Scenario};
use loadcraft::error::{ErrorCode, StructuredError};
use loadcraft::step::Step;
use loadcraft::{Benchmark, BenchmarkOptions};

#[derive(Debug, thiserror::Error)]
#[error("plain failure: {0}")]
struct PlainFailure(String);

#[tokio::test]
async fn happy_path_has_no_errors_and_zero_score() {
    let bench = Benchmark::new(BenchmarkOptions::default());
    bench.prepare(|_ctx, _step| async { None });
    bench.load(|_ctx, _step| async {
        tokio::time::sleep(Duration::from_millis(1)).await;
        None
    });
    bench.validation(|_ctx, _step| async { None });

    let result = bench.start(CancellationToken::new()).await;

    assert!(result.errors.all().is_empty());
    assert!(result.errors.count().is_empty());
    assert_eq!(result.score.sum(), 0);
}

#[tokio::test]
async fn ignored_prepare_error_does_not_block_load() {
    let bench = Benchmark::new(BenchmarkOptions::default());
    bench.ignore_error_code("ignore-me");
    bench.prepare(|_ctx, _step| async {
        let cause: loadcraft::error::Cause = Box::new(PlainFailure("transient setup issue".into()));
        Some(Box::new(StructuredError::new(ErrorCode::new("ignore-me"), cause)) as loadcraft::error::Cause)
    });

    let ran = Arc::new(AtomicBool::new(false));
    let flag = ran.clone();
    bench.load(move |_ctx, _step| {
        let flag = flag.clone();
        async move {
            flag.store(true, Ordering::SeqCst);
            None
        }
    });

    let result = bench.start(CancellationToken::new()).await;

    assert!(result.errors.all().is_empty());
    assert!(ran.load(Ordering::SeqCst));
}

#[tokio::test]
async fn fatal_prepare_error_aborts_before_load_runs() {
    let bench = Benchmark::new(BenchmarkOptions::default());
    bench.prepare(|_ctx, _step| async {
        Some(Box::new(PlainFailure("setup failed".into())) as loadcraft::error::Cause)
    });

    let ran = Arc::new(AtomicBool::new(false));
    let flag = ran.clone();
    bench.load(move |_ctx, _step| {
        let flag = flag.clone();
        async move {
            flag.store(true, Ordering::SeqCst);
            None
        }
    });

    let result = bench.start(CancellationToken::new()).await;

    assert_eq!(result.errors.all().len(), 1);
    assert!(!ran.load(Ordering::SeqCst));
}

#[tokio::test]
async fn load_panic_is_recovered_with_panic_code() {
    let bench = Benchmark::new(BenchmarkOptions::default());
    bench.load(|_ctx, _step| async { panic!("exploded") });

    let result = bench.start(CancellationToken::new()).await;
    let errors = result.errors.all();

    assert_eq!(errors.len(), 1);
    assert!(errors[0].is_code(&ErrorCode::PANIC));
    assert!(errors[0].message().contains("exploded"));
}

#[tokio::test]
async fn load_timeout_cuts_off_a_slow_callback() {
    let bench = Benchmark::new(BenchmarkOptions::default().load_timeout(Duration::from_millis(5)));
    let finished = Arc::new(AtomicBool::new(false));
    let flag = finished.clone();
    bench.load(move |ctx, _step| {
        let flag = flag.clone();
        async move {
            tokio::select! {
                _ = ctx.cancelled() => {}
                _ = tokio::time::sleep(Duration::from_millis(200)) => {
                    flag.store(true, Ordering::SeqCst);
                }
            }
            None
        }
    });

    bench.start(CancellationToken::new()).await;
    assert!(!finished.load(Ordering::SeqCst));
}

#[tokio::test]
async fn without_panic_recover_propagates_a_prepare_panic() {
    // Prepare and validate callbacks run inline on the caller's task (unlike
    // load callbacks, which are always spawned through the dispatcher and so
    // can never unwind back into `start()` regardless of this option), so
    // this is the phase where disabling recovery is observable.
    let bench = Benchmark::new(BenchmarkOptions::default().without_panic_recover());
    bench.prepare(|_ctx, _step| async { panic!("should escape start()") });

    let outcome = std::panic::AssertUnwindSafe(bench.start(CancellationToken::new()))
        .catch_unwind()
        .await;
    assert!(outcome.is_err());
}

struct FullScenario {
    prepared: Arc<AtomicUsize>,
    loaded: Arc<AtomicUsize>,
}

#[async_trait::async_trait]
impl PreparesScenario for FullScenario {
    async fn prepare(self: Arc<Self>, _ctx: CancellationToken, _step: Step) -> Option<loadcraft::error::Cause> {
        self.prepared.fetch_add(1, Ordering::SeqCst);
        None
    }
}

#[async_trait::async_trait]
impl LoadsScenario for FullScenario {
    async fn load(self: Arc<Self>, _ctx: CancellationToken, step: Step) -> Option<loadcraft::error::Cause> {
        self.loaded.fetch_add(1, Ordering::SeqCst);
        step.add_score("hit");
        None
    }
}

impl Scenario for FullScenario {
    fn as_prepare(self: Arc<Self>) -> Option<Arc<dyn PreparesScenario>> {
        Some(self)
    }

    fn as_load(self: Arc<Self>) -> Option<Arc<dyn LoadsScenario>> {
        Some(self)
    }
}

#[tokio::test]
async fn add_scenario_registers_every_capability_it_exposes() {
    let bench = Benchmark::new(BenchmarkOptions::default());
    let prepared = Arc::new(AtomicUsize::new(0));
    let loaded = Arc::new(AtomicUsize::new(0));
    bench.add_scenario(Arc::new(FullScenario {
        prepared: prepared.clone(),
        loaded: loaded.clone(),
    }));

    let result = bench.start(CancellationToken::new()).await;

    assert_eq!(prepared.load(Ordering::SeqCst), 1);
    assert_eq!(loaded.load(Ordering::SeqCst), 1);
    assert_eq!(result.score.sum(), 0); // no multiplier configured for "hit"
    assert_eq!(result.score.breakdown().get("hit"), Some(&1));
}

struct NoCapabilities;
impl Scenario for NoCapabilities {}

#[test]
fn add_scenario_with_no_capability_panics() {
    let bench = Benchmark::new(BenchmarkOptions::default());
    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        bench.add_scenario(Arc::new(NoCapabilities));
    }));
    assert!(outcome.is_err());
}
