//! Error types for the experimentation engine
//!
//! The taxonomy is deliberately small:
//! - Store failures propagate; the engine never fabricates a variant.
//! - A missing profile is a qualification miss, not an error.
//! - Invalid definitions are rejected at authoring time
//!   (`ExperimentConfigError` in the types crate) and never reach the
//!   assignment path.
//! - Insufficient data is a results status, not an error.

use scribe_exp_store::StoreError;
use scribe_exp_types::ExperimentId;

/// Failures surfaced by engine operations
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The store failed or refused the call
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The store did not answer within the configured deadline
    #[error("store call exceeded {timeout_ms}ms deadline")]
    StoreTimeout {
        /// Deadline that elapsed, in milliseconds
        timeout_ms: u64,
    },

    /// Results were requested for an experiment the store does not know
    #[error("experiment not found: {0}")]
    ExperimentNotFound(ExperimentId),
}

impl EngineError {
    /// Whether this failure means the store could not be reached in time.
    /// Callers treat timeouts and unavailability identically: fall back to
    /// default behavior.
    #[inline]
    #[must_use]
    pub fn is_store_unavailable(&self) -> bool {
        matches!(
            self,
            EngineError::StoreTimeout { .. }
                | EngineError::Store(StoreError::Unavailable(_) | StoreError::Timeout)
        )
    }
}
