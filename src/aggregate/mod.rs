//! Concurrent sinks shared by every running phase: collected errors (component B)
//! and tagged score counters (component C), both built on the same single-consumer
//! drain queue (`SPEC_FULL.md` §9).

mod errors;
mod queue;
mod score;

pub use errors::{ErrorAggregator, ErrorRecord};
pub use score::{ScoreAggregator, ScoreTag};
