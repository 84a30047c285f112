//! Coordinator error types.

use crate::busnearby::ApiError;

/// Errors surfaced by coordinator operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoordinatorError {
    /// A refresh cycle failed; the previous snapshot is kept
    #[error("fetch failed: {0}")]
    FetchFailed(#[from] ApiError),

    /// Line filters only apply to stop targets
    #[error("line filters cannot be set on a route target")]
    NotAStopTarget,
}
