//! Concurrent tagged-counter sink with a multiplier table, grounded on
//! `examples/original_source/score/score.go` (`Score.Add`/`Set`/`Sum`/`Breakdown`),
//! reusing the same [`super::queue::DrainQueue`] plumbing as [`super::errors::ErrorAggregator`]
//! (`spec.md` §4.C: "Semantics mirror 4.B").

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tokio_util::sync::CancellationToken;

use super::queue::DrainQueue;

/// A short string identifying a class of scored event (e.g. `"GET /api/items"`).
pub type ScoreTag = String;

/// Concurrent sink for tagged increments, with a separate multiplier table consulted
/// only by [`Self::sum`].
///
/// Cheap to clone: every clone is a handle onto the same underlying state.
#[derive(Clone)]
pub struct ScoreAggregator {
    counts: Arc<RwLock<HashMap<ScoreTag, u64>>>,
    multipliers: Arc<RwLock<HashMap<ScoreTag, i64>>>,
    default_multiplier: Arc<RwLock<i64>>,
    queue: Arc<DrainQueue<ScoreTag>>,
}

impl ScoreAggregator {
    /// Creates an aggregator bound to `token`, closed automatically when it fires.
    /// `default_multiplier` is the weight applied to a tag absent from the
    /// multiplier table when computing [`Self::sum`] (`SPEC_FULL.md` §6 resolves
    /// the open question of what that default is: `0`, so an unweighted tag
    /// contributes nothing to `sum()` until `set` is called for it).
    pub fn new(token: CancellationToken) -> Self {
        let counts: Arc<RwLock<HashMap<ScoreTag, u64>>> = Arc::new(RwLock::new(HashMap::new()));

        let counts_for_apply = counts.clone();
        let queue = DrainQueue::spawn(move |tag: ScoreTag| {
            *counts_for_apply.write().expect("score table poisoned").entry(tag).or_insert(0) += 1;
        });

        let queue_for_token = queue.clone();
        tokio::spawn(async move {
            token.cancelled().await;
            queue_for_token.close();
        });

        ScoreAggregator {
            counts,
            multipliers: Arc::new(RwLock::new(HashMap::new())),
            default_multiplier: Arc::new(RwLock::new(0)),
            queue,
        }
    }

    /// Sets the weight `sum()` uses for `tag`. Intended to be called from
    /// configuration before `start()`, but safe to call concurrently at any time.
    pub fn set(&self, tag: impl Into<ScoreTag>, multiplier: i64) {
        self.multipliers
            .write()
            .expect("multiplier table poisoned")
            .insert(tag.into(), multiplier);
    }

    /// Sets the fallback weight used by `sum()` for any tag absent from the
    /// multiplier table. Defaults to `0`.
    pub fn set_default_multiplier(&self, multiplier: i64) {
        *self.default_multiplier.write().expect("default multiplier poisoned") = multiplier;
    }

    /// Increments `tag` by one.
    pub fn add(&self, tag: impl Into<ScoreTag>) {
        self.queue.push(tag.into());
    }

    /// Resolves once every increment added before this call has been applied.
    pub async fn wait(&self) {
        self.queue.wait().await;
    }

    /// Stops accepting new increments. Idempotent.
    pub fn close(&self) {
        self.queue.close();
    }

    /// `close()` then `wait()`.
    pub async fn done(&self) {
        self.queue.done().await;
    }

    /// Point-in-time snapshot: tag → raw count.
    pub fn breakdown(&self) -> HashMap<ScoreTag, u64> {
        self.counts.read().expect("score table poisoned").clone()
    }

    /// Weighted sum over the current snapshot: `Σ count(tag) * multiplier(tag)`,
    /// falling back to the default multiplier for a tag with no table entry.
    /// Overflow wraps per `i64` arithmetic; the caller is responsible for scaling
    /// multipliers to avoid it (`spec.md` §4.C).
    pub fn sum(&self) -> i64 {
        let counts = self.counts.read().expect("score table poisoned");
        let multipliers = self.multipliers.read().expect("multiplier table poisoned");
        let default = *self.default_multiplier.read().expect("default multiplier poisoned");
        counts.iter().fold(0i64, |acc, (tag, count)| {
            let weight = multipliers.get(tag).copied().unwrap_or(default);
            acc.wrapping_add((*count as i64).wrapping_mul(weight))
        })
    }

    /// `done()` then `sum()`.
    pub async fn total(&self) -> i64 {
        self.done().await;
        self.sum()
    }

    /// Clears the current count snapshot. Does not affect the multiplier table or
    /// future `add` calls.
    pub fn reset(&self) {
        self.counts.write().expect("score table poisoned").clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn add_is_commutative_across_producers() {
        let agg = ScoreAggregator::new(CancellationToken::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let agg = agg.clone();
            handles.push(tokio::spawn(async move {
                for _ in 0..100 {
                    agg.add("hit");
                }
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        agg.wait().await;
        assert_eq!(agg.breakdown().get("hit"), Some(&800));
    }

    #[tokio::test]
    async fn sum_uses_default_multiplier_for_unweighted_tags() {
        let agg = ScoreAggregator::new(CancellationToken::new());
        agg.set("weighted", 3);
        agg.add("weighted");
        agg.add("weighted");
        agg.add("unweighted");
        agg.wait().await;
        assert_eq!(agg.sum(), 6);

        agg.set_default_multiplier(1);
        assert_eq!(agg.sum(), 7);
    }

    #[tokio::test]
    async fn total_closes_then_sums() {
        let agg = ScoreAggregator::new(CancellationToken::new());
        agg.set("x", 2);
        agg.add("x");
        assert_eq!(agg.total().await, 2);
        agg.add("x");
        agg.wait().await;
        assert_eq!(agg.breakdown().get("x"), Some(&1));
    }
}
