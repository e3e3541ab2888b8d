//! Error taxonomy for the adaptive screening decision core.

use thiserror::Error;

/// Errors surfaced by the decision core.
///
/// Every variant maps to exactly one of the four error kinds the core
/// contract distinguishes: malformed caller input, a recoverable numerical
/// degeneracy, an empty-but-legal state, and a malformed snapshot.
#[derive(Debug, Error)]
pub enum DysError {
    /// Caller supplied input the core cannot act on: an unknown module id,
    /// an item not present in the pool, a negative response time, or a
    /// mutation attempted against a session that has already stopped.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A posterior normalizer underflowed to (near) zero. The core recovers
    /// by resetting the affected module's posterior to uniform; this
    /// variant exists so callers can observe and log the recovery.
    #[error("numerical degeneracy recovered by reset: {0}")]
    NumericalDegenerate(String),

    /// A global risk computation was requested before any items were
    /// administered. This is a legal, low-confidence result, not a failure
    /// path, but is distinguished so callers can choose how to present it.
    #[error("empty state: {0}")]
    EmptyState(String),

    /// A snapshot failed to deserialize: a required field was missing or
    /// ill-typed.
    #[error("malformed snapshot: {0}")]
    SnapshotMalformed(String),
}

pub type DysResult<T> = Result<T, DysError>;
