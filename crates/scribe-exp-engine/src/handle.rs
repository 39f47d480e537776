//! Deadline-enforcing store handle
//!
//! Every store call goes through [`StoreHandle`], which applies the
//! configured timeout and folds an elapsed deadline into
//! [`EngineError::StoreTimeout`]. Timeouts and unavailability are treated
//! identically by callers.

use crate::error::EngineError;
use chrono::{DateTime, Utc};
use scribe_exp_store::{ExperimentStore, StoreError};
use scribe_exp_types::{
    Assignment, AssignmentId, ConversionEvent, Experiment, ExperimentId, UserId, UserProfile,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Shared, timeout-wrapped store reference
#[derive(Clone)]
pub struct StoreHandle {
    store: Arc<dyn ExperimentStore>,
    timeout: Duration,
}

impl StoreHandle {
    /// Wrap a store with a per-call deadline
    #[inline]
    #[must_use]
    pub fn new(store: Arc<dyn ExperimentStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    async fn call<T>(
        &self,
        fut: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, EngineError> {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result.map_err(EngineError::from),
            Err(_) => Err(EngineError::StoreTimeout {
                timeout_ms: self.timeout.as_millis() as u64,
            }),
        }
    }

    /// See [`ExperimentStore::running_experiment_for_feature`]
    pub async fn running_experiment_for_feature(
        &self,
        feature: &str,
    ) -> Result<Option<Experiment>, EngineError> {
        self.call(self.store.running_experiment_for_feature(feature))
            .await
    }

    /// See [`ExperimentStore::experiment`]
    pub async fn experiment(&self, id: ExperimentId) -> Result<Option<Experiment>, EngineError> {
        self.call(self.store.experiment(id)).await
    }

    /// See [`ExperimentStore::running_experiments`]
    pub async fn running_experiments(&self) -> Result<Vec<Experiment>, EngineError> {
        self.call(self.store.running_experiments()).await
    }

    /// See [`ExperimentStore::user_profile`]
    pub async fn user_profile(
        &self,
        user_id: &UserId,
    ) -> Result<Option<UserProfile>, EngineError> {
        self.call(self.store.user_profile(user_id)).await
    }

    /// See [`ExperimentStore::assignment`]
    pub async fn assignment(
        &self,
        user_id: &UserId,
        experiment_id: ExperimentId,
    ) -> Result<Option<Assignment>, EngineError> {
        self.call(self.store.assignment(user_id, experiment_id))
            .await
    }

    /// See [`ExperimentStore::create_assignment_if_absent`]
    pub async fn create_assignment_if_absent(
        &self,
        assignment: Assignment,
    ) -> Result<Assignment, EngineError> {
        self.call(self.store.create_assignment_if_absent(assignment))
            .await
    }

    /// See [`ExperimentStore::touch_last_seen`]
    pub async fn touch_last_seen(&self, assignment_id: AssignmentId) -> Result<(), EngineError> {
        self.call(self.store.touch_last_seen(assignment_id)).await
    }

    /// See [`ExperimentStore::append_event`]
    pub async fn append_event(&self, event: ConversionEvent) -> Result<(), EngineError> {
        self.call(self.store.append_event(event)).await
    }

    /// See [`ExperimentStore::mark_converted_if_unset`]
    pub async fn mark_converted_if_unset(
        &self,
        assignment_id: AssignmentId,
        value: f64,
        at: DateTime<Utc>,
    ) -> Result<bool, EngineError> {
        self.call(self.store.mark_converted_if_unset(assignment_id, value, at))
            .await
    }

    /// See [`ExperimentStore::assignments_for_experiment`]
    pub async fn assignments_for_experiment(
        &self,
        experiment_id: ExperimentId,
    ) -> Result<Vec<Assignment>, EngineError> {
        self.call(self.store.assignments_for_experiment(experiment_id))
            .await
    }

    /// See [`ExperimentStore::events_for_experiment`]
    pub async fn events_for_experiment(
        &self,
        experiment_id: ExperimentId,
    ) -> Result<Vec<ConversionEvent>, EngineError> {
        self.call(self.store.events_for_experiment(experiment_id))
            .await
    }
}

impl std::fmt::Debug for StoreHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreHandle")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
