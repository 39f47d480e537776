//! Scribe Experiment Store - persistence boundary
//!
//! The engine talks to storage through the [`ExperimentStore`] trait and
//! nothing else. Production deployments back it with the platform database;
//! [`MemoryStore`] is the in-process reference implementation used by tests
//! and local development.
//!
//! The trait deliberately pushes two guarantees down to the store, because
//! the engine runs as multiple stateless instances and cannot lock:
//! - [`ExperimentStore::create_assignment_if_absent`] is atomic per
//!   (user, experiment): concurrent callers get exactly one persisted row,
//!   and losers receive the winner's row back instead of an error.
//! - [`ExperimentStore::mark_converted_if_unset`] is a conditional update
//!   that fires at most once per assignment.

#![warn(unreachable_pub)]

pub mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use scribe_exp_types::{
    Assignment, AssignmentId, ConversionEvent, Experiment, ExperimentId, UserId, UserProfile,
};

/// Storage failures
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Backend unreachable or refused the request
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Backend did not answer within the caller's deadline
    #[error("store call timed out")]
    Timeout,

    /// Row could not be encoded or decoded
    #[error("serialization failure: {0}")]
    Serialization(String),
}

/// Narrow storage surface the experimentation engine consumes
#[async_trait]
pub trait ExperimentStore: Send + Sync {
    /// The single running experiment on `feature`, if any
    async fn running_experiment_for_feature(
        &self,
        feature: &str,
    ) -> Result<Option<Experiment>, StoreError>;

    /// Experiment definition by id
    async fn experiment(&self, id: ExperimentId) -> Result<Option<Experiment>, StoreError>;

    /// All currently running experiments
    async fn running_experiments(&self) -> Result<Vec<Experiment>, StoreError>;

    /// Profile row for audience targeting
    async fn user_profile(&self, user_id: &UserId) -> Result<Option<UserProfile>, StoreError>;

    /// Existing assignment for (user, experiment), if any
    async fn assignment(
        &self,
        user_id: &UserId,
        experiment_id: ExperimentId,
    ) -> Result<Option<Assignment>, StoreError>;

    /// Insert `assignment` unless a row for its (user, experiment) already
    /// exists; returns the persisted row either way
    async fn create_assignment_if_absent(
        &self,
        assignment: Assignment,
    ) -> Result<Assignment, StoreError>;

    /// Update `last_seen` on an existing assignment
    async fn touch_last_seen(&self, assignment_id: AssignmentId) -> Result<(), StoreError>;

    /// Append a conversion event
    async fn append_event(&self, event: ConversionEvent) -> Result<(), StoreError>;

    /// Flip the converted flag if still unset; returns whether this call
    /// performed the flip
    async fn mark_converted_if_unset(
        &self,
        assignment_id: AssignmentId,
        value: f64,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// All assignments for an experiment, for aggregation
    async fn assignments_for_experiment(
        &self,
        experiment_id: ExperimentId,
    ) -> Result<Vec<Assignment>, StoreError>;

    /// All events for an experiment, for secondary metrics
    async fn events_for_experiment(
        &self,
        experiment_id: ExperimentId,
    ) -> Result<Vec<ConversionEvent>, StoreError>;
}
