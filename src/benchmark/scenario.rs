//! Capability traits a scenario can implement, and the umbrella [`Scenario`] trait
//! [`super::Benchmark::add_scenario`] registers against.
//!
//! The original dispatches on runtime type assertions (`scenario.(PrepareScenario)`)
//! against a single `Scenario` interface value. Rust has no equivalent type-assertion
//! on a trait object, so each capability is instead its own trait, and a concrete
//! scenario opts in by overriding the matching `as_*` accessor to return `Some(self)`
//! (inheriting a default of `None` from [`Scenario`] for anything it doesn't
//! implement). `add_scenario` probes all three and registers each that's present.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::Cause;
use crate::step::Step;

#[async_trait]
pub trait PreparesScenario: Send + Sync + 'static {
    async fn prepare(self: Arc<Self>, ctx: CancellationToken, step: Step) -> Option<Cause>;
}

#[async_trait]
pub trait LoadsScenario: Send + Sync + 'static {
    async fn load(self: Arc<Self>, ctx: CancellationToken, step: Step) -> Option<Cause>;
}

#[async_trait]
pub trait ValidatesScenario: Send + Sync + 'static {
    async fn validate(self: Arc<Self>, ctx: CancellationToken, step: Step) -> Option<Cause>;
}

/// Umbrella trait a scenario type implements once; `add_scenario` calls each
/// accessor to discover which phases it participates in. A scenario that
/// overrides none of the three is considered malformed.
pub trait Scenario: Send + Sync + 'static {
    fn as_prepare(self: Arc<Self>) -> Option<Arc<dyn PreparesScenario>> {
        None
    }

    fn as_load(self: Arc<Self>) -> Option<Arc<dyn LoadsScenario>> {
        None
    }

    fn as_validate(self: Arc<Self>) -> Option<Arc<dyn ValidatesScenario>> {
        None
    }
}
