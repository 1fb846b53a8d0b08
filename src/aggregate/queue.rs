//! A generic single-consumer fan-in queue shared by [`super::errors::ErrorAggregator`]
//! and [`super::score::ScoreAggregator`].
//!
//! `spec.md` §4.B calls for "a bounded or unbounded queue + a single consumer that
//! appends to the list under a write lock" and explicitly rules out busy-spin waits
//! (§9 Design Notes). A `tokio::sync::mpsc` channel plus a background task gives the
//! single-consumer property for free; `wait()` is implemented by sending a barrier
//! message through the same channel so it is answered only after every item sent
//! before the call has already been applied — no polling involved.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use tokio::sync::{mpsc, oneshot, watch};

enum Msg<T> {
    Item(T),
    Barrier(oneshot::Sender<()>),
}

pub(crate) struct DrainQueue<T> {
    tx: RwLock<Option<mpsc::UnboundedSender<Msg<T>>>>,
    closed: AtomicBool,
    finished: watch::Receiver<bool>,
}

impl<T: Send + 'static> DrainQueue<T> {
    /// Spawns the background consumer, which calls `apply` once per item in
    /// arrival order until the queue is closed and drained.
    pub(crate) fn spawn(mut apply: impl FnMut(T) + Send + 'static) -> Arc<Self> {
        let (tx, mut rx) = mpsc::unbounded_channel::<Msg<T>>();
        let (finished_tx, finished_rx) = watch::channel(false);

        tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                match msg {
                    Msg::Item(item) => apply(item),
                    Msg::Barrier(done) => {
                        let _ = done.send(());
                    }
                }
            }
            let _ = finished_tx.send(true);
        });

        Arc::new(DrainQueue {
            tx: RwLock::new(Some(tx)),
            closed: AtomicBool::new(false),
            finished: finished_rx,
        })
    }

    /// Enqueues `item`. Silently dropped once the queue has been closed.
    pub(crate) fn push(&self, item: T) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        if let Some(tx) = self.tx.read().expect("queue lock poisoned").as_ref() {
            let _ = tx.send(Msg::Item(item));
        }
    }

    /// Resolves once every item pushed before this call has been applied.
    pub(crate) async fn wait(&self) {
        let tx = self.tx.read().expect("queue lock poisoned").clone();
        match tx {
            Some(tx) => {
                let (done_tx, done_rx) = oneshot::channel();
                if tx.send(Msg::Barrier(done_tx)).is_ok() {
                    let _ = done_rx.await;
                }
            }
            None => {
                let mut finished = self.finished.clone();
                let _ = finished.wait_for(|done| *done).await;
            }
        }
    }

    /// Idempotent. Rejects future pushes and lets the consumer drain the backlog.
    pub(crate) fn close(&self) {
        self.closed.store(true, Ordering::Release);
        *self.tx.write().expect("queue lock poisoned") = None;
    }

    pub(crate) async fn done(&self) {
        self.close();
        self.wait().await;
    }
}
