//! Thread-safe error collection with hooks, grounded on
//! `examples/original_source/failure/errors.go` (`Errors.collect`/`Add`/`Wait`/`Close`),
//! reworked onto [`super::queue::DrainQueue`] so `wait()` genuinely drains the current
//! backlog instead of requiring a prior `close()` (see `SPEC_FULL.md` §9).

use std::collections::HashMap;
use std::error::Error as StdError;
use std::sync::{Arc, RwLock};

use tokio_util::sync::CancellationToken;

use super::queue::DrainQueue;
use crate::error::{code_of, codes_of, ErrorCode};

/// A boxed, type-erased error as stored by the aggregator. Most entries are
/// [`crate::error::StructuredError`], but arbitrary errors are accepted too.
type Boxed = Box<dyn StdError + Send + Sync + 'static>;

type Hook = Box<dyn Fn(&(dyn StdError + Send + Sync)) + Send + Sync>;

/// A point-in-time copy of one collected error, safe to hold independent of the
/// aggregator's internal lock.
#[derive(Clone, Debug)]
pub struct ErrorRecord {
    codes: Vec<ErrorCode>,
    message: String,
}

impl ErrorRecord {
    fn capture(err: &(dyn StdError + Send + Sync)) -> Self {
        let as_std: &(dyn StdError + 'static) = err;
        let mut codes = codes_of(as_std);
        if codes.is_empty() {
            codes.push(ErrorCode::UNKNOWN);
        }
        ErrorRecord {
            codes,
            message: err.to_string(),
        }
    }

    /// The outermost code, falling back to [`ErrorCode::UNKNOWN`] for a plain error.
    pub fn code(&self) -> &ErrorCode {
        &self.codes[0]
    }

    /// Every code found while unwrapping the original error's chain.
    pub fn codes(&self) -> &[ErrorCode] {
        &self.codes
    }

    /// `true` iff `code` appears anywhere in [`Self::codes`].
    pub fn is_code(&self, code: &ErrorCode) -> bool {
        self.codes.iter().any(|c| c == code)
    }

    /// The error's `Display` form, captured at collection time.
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Collects errors submitted concurrently from many scenario callbacks, exposing
/// aggregate views (`count`, `messages`, `all`) and a hook mechanism for
/// side effects such as `step.cancel()` on a fatal class of error.
///
/// Cheap to clone: every clone is a handle onto the same underlying state.
#[derive(Clone)]
pub struct ErrorAggregator {
    list: Arc<RwLock<Vec<Boxed>>>,
    hooks: Arc<RwLock<Vec<Hook>>>,
    queue: Arc<DrainQueue<Boxed>>,
}

impl ErrorAggregator {
    /// Creates an aggregator bound to `token`: the underlying queue is closed
    /// automatically when the token fires, same as an explicit [`Self::close`].
    pub fn new(token: CancellationToken) -> Self {
        let list: Arc<RwLock<Vec<Boxed>>> = Arc::new(RwLock::new(Vec::new()));
        let hooks: Arc<RwLock<Vec<Hook>>> = Arc::new(RwLock::new(Vec::new()));

        let list_for_apply = list.clone();
        let hooks_for_apply = hooks.clone();
        let queue = DrainQueue::spawn(move |item: Boxed| {
            list_for_apply.write().expect("error list poisoned").push(item);
            let guard = list_for_apply.read().expect("error list poisoned");
            let last = guard.last().expect("just pushed");
            // Most-recently-installed hook observes the error first.
            for hook in hooks_for_apply.read().expect("hook list poisoned").iter().rev() {
                hook(last.as_ref());
            }
        });

        let queue_for_token = queue.clone();
        tokio::spawn(async move {
            token.cancelled().await;
            queue_for_token.close();
        });

        ErrorAggregator { list, hooks, queue }
    }

    /// Enqueues `err`. A no-op once the aggregator has been closed.
    pub fn add(&self, err: impl Into<Boxed>) {
        self.queue.push(err.into());
    }

    /// Registers a hook invoked, as a side effect, for every error added from this
    /// point forward. Hooks compose: all run per error, most-recently-installed first.
    pub fn hook(&self, f: impl Fn(&(dyn StdError + Send + Sync)) + Send + Sync + 'static) {
        self.hooks.write().expect("hook list poisoned").push(Box::new(f));
    }

    /// Resolves once every error added before this call has been appended and has
    /// had its hooks run.
    pub async fn wait(&self) {
        self.queue.wait().await;
    }

    /// Stops accepting new errors. Idempotent.
    pub fn close(&self) {
        self.queue.close();
    }

    /// `close()` then `wait()`.
    pub async fn done(&self) {
        self.queue.done().await;
    }

    /// Ordered, point-in-time snapshot of every error collected so far.
    pub fn all(&self) -> Vec<ErrorRecord> {
        self.list
            .read()
            .expect("error list poisoned")
            .iter()
            .map(|e| ErrorRecord::capture(e.as_ref()))
            .collect()
    }

    /// Frequency table: for every error, each code in its unwrap chain is tallied
    /// once (an uncoded error counts once under [`ErrorCode::UNKNOWN`]).
    pub fn count(&self) -> HashMap<ErrorCode, u64> {
        let mut table = HashMap::new();
        for err in self.list.read().expect("error list poisoned").iter() {
            let mut codes = codes_of(err.as_ref());
            if codes.is_empty() {
                codes.push(ErrorCode::UNKNOWN);
            }
            for code in codes {
                *table.entry(code).or_insert(0) += 1;
            }
        }
        table
    }

    /// Display strings grouped by outermost code.
    pub fn messages(&self) -> HashMap<ErrorCode, Vec<String>> {
        let mut table: HashMap<ErrorCode, Vec<String>> = HashMap::new();
        for err in self.list.read().expect("error list poisoned").iter() {
            table
                .entry(code_of(err.as_ref()))
                .or_default()
                .push(err.to_string());
        }
        table
    }

    /// Clears the current snapshot. Does not affect errors added afterward.
    pub fn reset(&self) {
        self.list.write().expect("error list poisoned").clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StructuredError;
    use std::io;

    fn plain_error(msg: &str) -> Boxed {
        Box::new(io::Error::new(io::ErrorKind::Other, msg.to_string()))
    }

    #[tokio::test]
    async fn add_then_wait_makes_errors_visible() {
        let agg = ErrorAggregator::new(CancellationToken::new());
        for i in 0..50 {
            agg.add(plain_error(&format!("err-{i}")));
        }
        agg.wait().await;
        assert_eq!(agg.all().len(), 50);
    }

    #[tokio::test]
    async fn count_tallies_every_code_in_the_chain() {
        let agg = ErrorAggregator::new(CancellationToken::new());
        let inner = StructuredError::new(ErrorCode::LOAD, plain_error("boom"));
        let outer = StructuredError::new(ErrorCode::VALIDATION, Box::new(inner) as Boxed);
        agg.add(Box::new(outer) as Boxed);
        agg.add(plain_error("uncoded"));
        agg.wait().await;

        let counts = agg.count();
        assert_eq!(counts.get(&ErrorCode::VALIDATION), Some(&1));
        assert_eq!(counts.get(&ErrorCode::LOAD), Some(&1));
        assert_eq!(counts.get(&ErrorCode::UNKNOWN), Some(&1));
    }

    #[tokio::test]
    async fn hooks_run_most_recently_installed_first() {
        let agg = ErrorAggregator::new(CancellationToken::new());
        let order = Arc::new(RwLock::new(Vec::new()));
        let o1 = order.clone();
        agg.hook(move |_| o1.write().unwrap().push(1));
        let o2 = order.clone();
        agg.hook(move |_| o2.write().unwrap().push(2));

        agg.add(plain_error("x"));
        agg.wait().await;
        assert_eq!(*order.read().unwrap(), vec![2, 1]);
    }

    #[tokio::test]
    async fn close_drops_further_adds_but_keeps_existing() {
        let agg = ErrorAggregator::new(CancellationToken::new());
        agg.add(plain_error("kept"));
        agg.done().await;
        agg.add(plain_error("dropped"));
        agg.wait().await;
        assert_eq!(agg.all().len(), 1);
    }

    #[tokio::test]
    async fn cancellation_token_closes_the_aggregator() {
        let token = CancellationToken::new();
        let agg = ErrorAggregator::new(token.clone());
        token.cancel();
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        agg.add(plain_error("post-cancel"));
        agg.wait().await;
        assert_eq!(agg.all().len(), 0);
    }
}
