//! A phased load-testing harness core: a [`benchmark::Benchmark`] drives
//! prepare/load/validate callbacks against a shared [`step::Step`], admitting
//! concurrent work through [`parallel::Parallel`] and collecting results into
//! [`aggregate::ErrorAggregator`]/[`aggregate::ScoreAggregator`]. [`worker::Worker`]
//! is the reusable finite-or-infinite loop driver scenarios can use internally
//! for sustained load. [`agent`] ships a concrete HTTP collaborator scenarios
//! can issue requests through.
//!
//! Grounded throughout on `hlieu5402-collab-spark2026/spark-core`'s module shape
//! (one file per concern, `Arc`-handle types cheap to clone across tasks) and on
//! `examples/original_source/` for the phase-scheduler and agent semantics this
//! crate is a from-scratch Rust expression of.

pub mod agent;
pub mod aggregate;
pub mod benchmark;
pub mod error;
pub mod parallel;
pub mod step;
pub mod worker;

pub use benchmark::{Benchmark, BenchmarkOptions, Scenario};
pub use error::{ErrorCode, StructuredError};
pub use parallel::Parallel;
pub use step::{BenchmarkResult, Step};
pub use worker::Worker;
