//! Reusable loop driver that feeds a [`Parallel`] with a finite or infinite stream
//! of invocations, grounded on `examples/original_source/worker/worker.go`.

use std::future::Future;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use crate::parallel::Parallel;

/// The unit of work a [`Worker`] drives: `(ctx, index)`, where `index` is the
/// 0-based invocation count for a finite loop or `-1` for an infinite one.
pub type WorkerFn = Arc<dyn Fn(CancellationToken, i64) -> BoxFuture<'static, ()> + Send + Sync>;

/// Drives `f` either a finite number of times or forever, admitting each
/// invocation through a [`Parallel`] dispatcher rebuilt fresh on every
/// [`Self::process`] call (mirroring the original's per-`Process` limiter reset).
pub struct Worker {
    f: WorkerFn,
    loop_count: AtomicI64,
    parallelism: AtomicI64,
    current: std::sync::RwLock<Option<Parallel>>,
}

impl Worker {
    /// `loop_count` defaults to `-1` (infinite), `parallelism` to `-1` (unbounded).
    /// Use [`Self::set_loop_count`]/[`Self::set_parallelism`] to change either
    /// before (or during) [`Self::process`].
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(CancellationToken, i64) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let f: WorkerFn = Arc::new(move |ctx, idx| Box::pin(f(ctx, idx)));
        Worker {
            f,
            loop_count: AtomicI64::new(-1),
            parallelism: AtomicI64::new(-1),
            current: std::sync::RwLock::new(None),
        }
    }

    /// Runs to completion: either `loop_count` invocations have all finished, or
    /// `ctx` is cancelled (in which case submission stops and `process` waits for
    /// whatever was already admitted to drain before returning).
    pub async fn process(&self, ctx: CancellationToken) {
        if ctx.is_cancelled() {
            return;
        }

        let dispatcher = Parallel::new(self.parallelism.load(Ordering::SeqCst), ctx.clone());
        *self.current.write().expect("worker dispatcher poisoned") = Some(dispatcher.clone());
        let count = self.loop_count.load(Ordering::SeqCst);

        if count >= 1 {
            for idx in 0..count {
                if ctx.is_cancelled() {
                    break;
                }
                let f = self.f.clone();
                let task_ctx = ctx.clone();
                let _ = dispatcher.do_now(async move { f(task_ctx, idx).await }).await;
            }
        } else {
            loop {
                if ctx.is_cancelled() {
                    break;
                }
                let f = self.f.clone();
                let task_ctx = ctx.clone();
                let _ = dispatcher.do_now(async move { f(task_ctx, -1).await }).await;
            }
        }

        dispatcher.wait().await;
    }

    /// Blocks until the dispatcher from the most recent `process` call has no
    /// invocations in flight. A no-op if `process` has never run.
    pub async fn wait(&self) {
        let dispatcher = self.current.read().expect("worker dispatcher poisoned").clone();
        if let Some(dispatcher) = dispatcher {
            dispatcher.wait().await;
        }
    }

    pub fn set_loop_count(&self, count: i64) {
        self.loop_count.store(count, Ordering::SeqCst);
    }

    /// Live-adjusts parallelism, delegating to the in-flight dispatcher if
    /// `process` is currently running.
    pub fn set_parallelism(&self, limit: i64) {
        self.parallelism.store(limit, Ordering::SeqCst);
        if let Some(dispatcher) = self.current.read().expect("worker dispatcher poisoned").as_ref() {
            dispatcher.set_parallelism(limit);
        }
    }

    pub fn add_parallelism(&self, delta: i64) {
        self.parallelism.fetch_add(delta, Ordering::SeqCst);
        if let Some(dispatcher) = self.current.read().expect("worker dispatcher poisoned").as_ref() {
            dispatcher.add_parallelism(delta);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn finite_loop_count_runs_exactly_n_times() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let worker = Worker::new(move |_ctx, _idx| {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
            }
        });
        worker.set_loop_count(10);
        worker.process(CancellationToken::new()).await;
        assert_eq!(count.load(Ordering::SeqCst), 10);
    }

    #[tokio::test]
    async fn infinite_loop_stops_on_cancellation() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let worker = Arc::new(Worker::new(move |_ctx, _idx| {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
            }
        }));

        let token = CancellationToken::new();
        let w = worker.clone();
        let t = token.clone();
        let handle = tokio::spawn(async move { w.process(t).await });

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        token.cancel();
        handle.await.unwrap();

        assert!(count.load(Ordering::SeqCst) > 0);
    }

    #[tokio::test]
    async fn already_cancelled_context_skips_entirely() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let worker = Worker::new(move |_ctx, _idx| {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
            }
        });
        worker.set_loop_count(5);

        let token = CancellationToken::new();
        token.cancel();
        worker.process(token).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
