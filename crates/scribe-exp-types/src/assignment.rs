//! Assignments and conversion events
//!
//! An assignment is the one-time, persisted decision binding a user to a
//! variant. The stored row is authoritative; the bucketing hash only seeds
//! it the first time. Conversion events are append-only and many may attach
//! to one assignment, but the `converted` flag flips exactly once.

use crate::ids::{AssignmentId, EventId, ExperimentId, UserId, VariantId};
use crate::profile::UserTier;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Request context captured at assignment time, for later slicing
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AssignmentContext {
    /// Subscription tier at assignment time
    pub tier: Option<UserTier>,
    /// User agent of the assigning request
    pub user_agent: Option<String>,
    /// Referral source, if the account came through a referral link
    pub referral_source: Option<String>,
}

/// The persisted user -> variant decision, unique per (user, experiment)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    /// Unique assignment identifier
    pub id: AssignmentId,
    /// Assigned user
    pub user_id: UserId,
    /// Experiment assigned into
    pub experiment_id: ExperimentId,
    /// Variant the user landed in
    pub variant_id: VariantId,
    /// When the decision was made
    pub assigned_at: DateTime<Utc>,
    /// First request that observed the assignment
    pub first_seen: DateTime<Utc>,
    /// Most recent request that observed the assignment
    pub last_seen: DateTime<Utc>,
    /// One-way conversion flag, set by the first goal event
    pub converted: bool,
    /// When the goal event first fired
    pub converted_at: Option<DateTime<Utc>>,
    /// Value attached to the converting event
    pub conversion_value: f64,
    /// Qualification context at assignment time
    pub context: AssignmentContext,
}

impl Assignment {
    /// Create a fresh assignment, stamped with the current time
    #[must_use]
    pub fn new(
        user_id: UserId,
        experiment_id: ExperimentId,
        variant_id: VariantId,
        context: AssignmentContext,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: AssignmentId::new(),
            user_id,
            experiment_id,
            variant_id,
            assigned_at: now,
            first_seen: now,
            last_seen: now,
            converted: false,
            converted_at: None,
            conversion_value: 0.0,
            context,
        }
    }
}

/// Append-only product event attributed to an assignment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionEvent {
    /// Unique event identifier
    pub id: EventId,
    /// User the event belongs to
    pub user_id: UserId,
    /// Experiment the event is attributed to
    pub experiment_id: ExperimentId,
    /// Variant the user held when the event fired
    pub variant_id: VariantId,
    /// Event type name ("draft_completed", "upgrade_clicked", ...)
    pub event_type: String,
    /// Free-form event payload
    pub event_data: BTreeMap<String, Value>,
    /// Monetary or unit value attached to the event
    pub conversion_value: f64,
    /// When the event occurred
    pub occurred_at: DateTime<Utc>,
}

impl ConversionEvent {
    /// Create an event stamped with the current time
    #[must_use]
    pub fn new(
        assignment: &Assignment,
        event_type: impl Into<String>,
        event_data: BTreeMap<String, Value>,
        conversion_value: f64,
    ) -> Self {
        Self {
            id: EventId::new(),
            user_id: assignment.user_id.clone(),
            experiment_id: assignment.experiment_id,
            variant_id: assignment.variant_id,
            event_type: event_type.into(),
            event_data,
            conversion_value,
            occurred_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_assignment_starts_unconverted() {
        let a = Assignment::new(
            UserId::from("writer-1"),
            ExperimentId::new(),
            VariantId::new(),
            AssignmentContext::default(),
        );
        assert!(!a.converted);
        assert!(a.converted_at.is_none());
        assert_eq!(a.conversion_value, 0.0);
        assert_eq!(a.assigned_at, a.first_seen);
    }

    #[test]
    fn event_inherits_attribution_from_assignment() {
        let a = Assignment::new(
            UserId::from("writer-1"),
            ExperimentId::new(),
            VariantId::new(),
            AssignmentContext::default(),
        );
        let e = ConversionEvent::new(&a, "draft_completed", BTreeMap::new(), 1.0);
        assert_eq!(e.user_id, a.user_id);
        assert_eq!(e.experiment_id, a.experiment_id);
        assert_eq!(e.variant_id, a.variant_id);
        assert_eq!(e.event_type, "draft_completed");
    }
}
