//! Structured error types for the Trellis ecosystem.

use thiserror::Error;

/// Unified error type for all Trellis operations.
#[derive(Debug, Error)]
pub enum TrellisError {
    /// I/O error (file not found, permission denied, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid model configuration (duplicate state, duplicate transition,
    /// missing start/stop designation, persistence version mismatch)
    #[error("config error: {0}")]
    Config(String),

    /// A training-time operation was called on an example without gold labels
    #[error("example has no gold labels")]
    UnlabeledExample,

    /// The gold label sequence uses a transition absent from the state space
    #[error("illegal gold path: {0}")]
    IllegalGoldPath(String),

    /// No legal path exists under the constraints (log partition is -inf)
    #[error("infeasible example: no legal path has finite score")]
    InfeasibleExample,

    /// Array or vector sizes disagree with the state space dimensions
    #[error("dimension mismatch: {0}")]
    DimensionMismatch(String),

    /// A NaN or +inf appeared where only finite values or -inf are allowed
    #[error("numeric error: {0}")]
    Numeric(String),
}

/// Convenience alias used throughout the Trellis ecosystem.
pub type Result<T> = std::result::Result<T, TrellisError>;
