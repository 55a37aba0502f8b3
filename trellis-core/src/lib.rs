//! Shared primitives for the Trellis sequence-labeling ecosystem.
//!
//! `trellis-core` provides the foundation that the engine crates build on:
//!
//! - **Error types** — [`TrellisError`] and [`Result`] for structured error handling
//! - **Log-space math** — stabilized log-sum-exp for underflow-free chains
//! - **Indexing** — [`Indexer`], an immutable two-way map between values and dense indices
//! - **Batch fan-out** — [`parallel::map_reduce`] for accumulating statistics over examples

pub mod error;
pub mod indexer;
pub mod logspace;
pub mod parallel;

pub use error::{Result, TrellisError};
pub use indexer::Indexer;
