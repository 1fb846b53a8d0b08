//! The mutable binding a running phase passes to every callback, grounded on
//! `examples/original_source/benchmark_step.go` (`BenchmarkStep`).

use std::sync::RwLock;

use tokio_util::sync::CancellationToken;

use crate::aggregate::{ErrorAggregator, ScoreAggregator, ScoreTag};
use crate::error::{Cause, ErrorCode, StructuredError};

/// The two aggregators produced by a [`crate::benchmark::Benchmark::start`] run.
#[derive(Clone)]
pub struct BenchmarkResult {
    pub score: ScoreAggregator,
    pub errors: ErrorAggregator,
}

/// Binding between a running phase and the shared aggregators. Callbacks receive
/// one of these alongside their cancellation token.
///
/// Cheap to clone: every clone shares the same underlying aggregators and
/// cancellation trigger.
#[derive(Clone)]
pub struct Step {
    result: BenchmarkResult,
    phase_code: std::sync::Arc<RwLock<Option<ErrorCode>>>,
    cancel: CancellationToken,
}

impl Step {
    pub(crate) fn new(result: BenchmarkResult, cancel: CancellationToken) -> Self {
        Step {
            result,
            phase_code: std::sync::Arc::new(RwLock::new(None)),
            cancel,
        }
    }

    /// Scheduler-private: sets the phase code every subsequent `add_error` stamps
    /// onto an error that doesn't already carry one. Readable without tearing by
    /// concurrent `add_error` callers since it only changes at phase boundaries,
    /// strictly before the callbacks of that phase run.
    pub(crate) fn set_phase_code(&self, code: Option<ErrorCode>) {
        *self.phase_code.write().expect("phase code poisoned") = code;
    }

    /// Records `err`. If the current phase has a code, `err` is wrapped so the
    /// chain reads `phase: original-message` (or, if `err` already carries some
    /// other code, `phase: code: message` as an additional layer) — unless `err`
    /// already carries the phase's own code, in which case wrapping is a no-op.
    ///
    /// Takes an already-boxed cause rather than a generic `impl StdError` so a
    /// caller handing over a `Cause` they already hold (e.g. the `Option<Cause>`
    /// a scenario callback returned) is passed through as-is: boxing it a second
    /// time here would hide its concrete type from `downcast_ref` and break the
    /// classification chain.
    pub fn add_error(&self, err: Cause) {
        let phase = self.phase_code.read().expect("phase code poisoned").clone();
        let wrapped: Cause = match phase {
            Some(code) => Box::new(StructuredError::new(code, err)),
            None => err,
        };
        self.result.errors.add(wrapped);
    }

    /// Increments `tag` in the score aggregator.
    pub fn add_score(&self, tag: impl Into<ScoreTag>) {
        self.result.score.add(tag);
    }

    /// Fires the scheduler's child cancellation token. Safe to call more than
    /// once; only the first call has an effect.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// A handle onto the result this step is feeding.
    pub fn result(&self) -> &BenchmarkResult {
        &self.result
    }
}
