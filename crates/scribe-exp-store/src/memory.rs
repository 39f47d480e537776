//! In-memory reference store
//!
//! DashMap-backed implementation of [`ExperimentStore`] with the same
//! atomicity semantics the production backend provides: the entry API makes
//! `create_assignment_if_absent` at-most-once per (user, experiment), and
//! the converted flip happens under the shard lock.
//!
//! Fault injection (`set_unavailable`, `fail_next`) exists so engine tests
//! can exercise degraded-store paths.

use crate::{ExperimentStore, StoreError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use scribe_exp_types::{
    Assignment, AssignmentId, ConversionEvent, Experiment, ExperimentId, ExperimentStatus,
    UserId, UserProfile,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// In-memory store for tests and local development
#[derive(Debug, Default)]
pub struct MemoryStore {
    experiments: DashMap<ExperimentId, Experiment>,
    profiles: DashMap<UserId, UserProfile>,
    assignments: DashMap<(UserId, ExperimentId), Assignment>,
    assignment_index: DashMap<AssignmentId, (UserId, ExperimentId)>,
    events: DashMap<ExperimentId, Vec<ConversionEvent>>,
    unavailable: AtomicBool,
    fail_next: AtomicUsize,
}

impl MemoryStore {
    /// Create an empty store
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an experiment definition
    pub fn put_experiment(&self, experiment: Experiment) {
        self.experiments.insert(experiment.id, experiment);
    }

    /// Insert or replace a profile row
    pub fn put_profile(&self, user_id: UserId, profile: UserProfile) {
        self.profiles.insert(user_id, profile);
    }

    /// Make every subsequent call fail until reset
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Fail the next `n` calls, then recover
    pub fn fail_next(&self, n: usize) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    /// Number of persisted assignments for an experiment
    #[must_use]
    pub fn assignment_count(&self, experiment_id: ExperimentId) -> usize {
        self.assignments
            .iter()
            .filter(|e| e.key().1 == experiment_id)
            .count()
    }

    /// Number of appended events for an experiment
    #[must_use]
    pub fn event_count(&self, experiment_id: ExperimentId) -> usize {
        self.events.get(&experiment_id).map_or(0, |v| v.len())
    }

    fn guard(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("store marked offline".to_string()));
        }
        if self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(StoreError::Unavailable("injected failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ExperimentStore for MemoryStore {
    async fn running_experiment_for_feature(
        &self,
        feature: &str,
    ) -> Result<Option<Experiment>, StoreError> {
        self.guard()?;
        Ok(self
            .experiments
            .iter()
            .find(|e| e.status == ExperimentStatus::Running && e.feature == feature)
            .map(|e| e.value().clone()))
    }

    async fn experiment(&self, id: ExperimentId) -> Result<Option<Experiment>, StoreError> {
        self.guard()?;
        Ok(self.experiments.get(&id).map(|e| e.value().clone()))
    }

    async fn running_experiments(&self) -> Result<Vec<Experiment>, StoreError> {
        self.guard()?;
        Ok(self
            .experiments
            .iter()
            .filter(|e| e.status == ExperimentStatus::Running)
            .map(|e| e.value().clone())
            .collect())
    }

    async fn user_profile(&self, user_id: &UserId) -> Result<Option<UserProfile>, StoreError> {
        self.guard()?;
        Ok(self.profiles.get(user_id).map(|p| p.value().clone()))
    }

    async fn assignment(
        &self,
        user_id: &UserId,
        experiment_id: ExperimentId,
    ) -> Result<Option<Assignment>, StoreError> {
        self.guard()?;
        Ok(self
            .assignments
            .get(&(user_id.clone(), experiment_id))
            .map(|a| a.value().clone()))
    }

    async fn create_assignment_if_absent(
        &self,
        assignment: Assignment,
    ) -> Result<Assignment, StoreError> {
        self.guard()?;
        let key = (assignment.user_id.clone(), assignment.experiment_id);
        // Entry holds the shard lock, so concurrent callers serialize here
        // and exactly one insert wins.
        match self.assignments.entry(key) {
            Entry::Occupied(existing) => Ok(existing.get().clone()),
            Entry::Vacant(slot) => {
                self.assignment_index.insert(
                    assignment.id,
                    (assignment.user_id.clone(), assignment.experiment_id),
                );
                slot.insert(assignment.clone());
                Ok(assignment)
            }
        }
    }

    async fn touch_last_seen(&self, assignment_id: AssignmentId) -> Result<(), StoreError> {
        self.guard()?;
        if let Some(key) = self.assignment_index.get(&assignment_id) {
            if let Some(mut row) = self.assignments.get_mut(key.value()) {
                row.last_seen = Utc::now();
            }
        }
        Ok(())
    }

    async fn append_event(&self, event: ConversionEvent) -> Result<(), StoreError> {
        self.guard()?;
        self.events
            .entry(event.experiment_id)
            .or_default()
            .push(event);
        Ok(())
    }

    async fn mark_converted_if_unset(
        &self,
        assignment_id: AssignmentId,
        value: f64,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        self.guard()?;
        let Some(key) = self.assignment_index.get(&assignment_id) else {
            return Ok(false);
        };
        let Some(mut row) = self.assignments.get_mut(key.value()) else {
            return Ok(false);
        };
        if row.converted {
            return Ok(false);
        }
        row.converted = true;
        row.converted_at = Some(at);
        row.conversion_value += value;
        Ok(true)
    }

    async fn assignments_for_experiment(
        &self,
        experiment_id: ExperimentId,
    ) -> Result<Vec<Assignment>, StoreError> {
        self.guard()?;
        Ok(self
            .assignments
            .iter()
            .filter(|e| e.key().1 == experiment_id)
            .map(|e| e.value().clone())
            .collect())
    }

    async fn events_for_experiment(
        &self,
        experiment_id: ExperimentId,
    ) -> Result<Vec<ConversionEvent>, StoreError> {
        self.guard()?;
        Ok(self
            .events
            .get(&experiment_id)
            .map(|v| v.value().clone())
            .unwrap_or_default())
    }
}
