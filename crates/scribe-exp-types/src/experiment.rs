//! Experiment and variant definitions
//!
//! An experiment binds a feature tag to a set of variants, an audience, and
//! the metrics that will decide a winner. Definitions are validated once at
//! authoring time; the assignment path assumes they are well formed.

use crate::config::VariantConfig;
use crate::ids::{ExperimentId, UserId, VariantId};
use crate::profile::UserTier;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Tolerance when checking that traffic splits sum to 100
const SPLIT_SUM_EPSILON: f64 = 0.001;

/// Lifecycle state of an experiment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExperimentStatus {
    /// Being authored, not assignment-eligible
    Draft,
    /// Live: accepting new assignments
    Running,
    /// Temporarily stopped; existing assignments persist
    Paused,
    /// Finished normally; results stay readable
    Completed,
    /// Abandoned; results stay readable
    Cancelled,
}

impl ExperimentStatus {
    /// Whether new assignments may be created in this state
    #[inline]
    #[must_use]
    pub fn accepts_assignments(&self) -> bool {
        matches!(self, ExperimentStatus::Running)
    }

    /// Whether `next` is a legal lifecycle transition from this state
    #[must_use]
    pub fn can_transition_to(&self, next: ExperimentStatus) -> bool {
        use ExperimentStatus::*;
        matches!(
            (self, next),
            (Draft, Running)
                | (Draft, Cancelled)
                | (Running, Paused)
                | (Running, Completed)
                | (Running, Cancelled)
                | (Paused, Running)
                | (Paused, Completed)
                | (Paused, Cancelled)
        )
    }
}

/// One arm of an experiment
///
/// Immutable once the experiment has live assignments: persisted assignments
/// are permanently authoritative, so changing `traffic_split` mid-flight does
/// not rebalance existing users and only skews future ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variant {
    /// Unique variant identifier
    pub id: VariantId,
    /// Human-readable name ("control", "warmer-tone", ...)
    pub name: String,
    /// Exactly one variant per experiment is the control
    pub is_control: bool,
    /// Share of included traffic, 0-100
    pub traffic_split: f64,
    /// Feature override payload
    pub config: VariantConfig,
}

impl Variant {
    /// Create a treatment variant
    #[inline]
    pub fn new(name: impl Into<String>, traffic_split: f64, config: VariantConfig) -> Self {
        Self {
            id: VariantId::new(),
            name: name.into(),
            is_control: false,
            traffic_split,
            config,
        }
    }

    /// Create the control variant
    #[inline]
    pub fn control(name: impl Into<String>, traffic_split: f64, config: VariantConfig) -> Self {
        Self {
            is_control: true,
            ..Self::new(name, traffic_split, config)
        }
    }
}

/// Audience targeting rules
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TargetAudience {
    /// Allowed tiers; empty means all tiers qualify
    pub user_tiers: Vec<UserTier>,
    /// Minimum account age in days
    pub min_account_age_days: Option<i64>,
    /// Only accounts created after the experiment started
    pub new_users_only: bool,
    /// Explicitly excluded users (internal accounts, QA)
    pub exclude_user_ids: Vec<UserId>,
}

impl TargetAudience {
    /// Audience with no restrictions
    #[inline]
    #[must_use]
    pub fn everyone() -> Self {
        Self::default()
    }

    /// Restrict to the given tiers
    #[inline]
    #[must_use]
    pub fn with_tiers(mut self, tiers: Vec<UserTier>) -> Self {
        self.user_tiers = tiers;
        self
    }

    /// Require a minimum account age
    #[inline]
    #[must_use]
    pub fn with_min_account_age_days(mut self, days: i64) -> Self {
        self.min_account_age_days = Some(days);
        self
    }

    /// Exclude specific users
    #[inline]
    #[must_use]
    pub fn with_excluded(mut self, user_ids: Vec<UserId>) -> Self {
        self.exclude_user_ids = user_ids;
        self
    }
}

/// A configured A/B test
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Experiment {
    /// Unique experiment identifier
    pub id: ExperimentId,
    /// Human-readable name
    pub name: String,
    /// What we expect to happen and why
    pub description: String,
    /// Feature tag this experiment varies; at most one experiment per
    /// feature should be running at a time (enforced at activation)
    pub feature: String,
    /// Lifecycle state
    pub status: ExperimentStatus,
    /// Share of qualified users included at all, 0-100
    pub traffic_allocation: f64,
    /// Ordered variant arms; splits sum to 100
    pub variants: Vec<Variant>,
    /// Audience targeting rules
    pub target_audience: TargetAudience,
    /// When the experiment went live
    pub start_at: Option<DateTime<Utc>>,
    /// When the experiment stopped accepting traffic
    pub end_at: Option<DateTime<Utc>>,
    /// Primary metric name
    pub primary_metric: String,
    /// Secondary metric names (event types), reported as deltas
    pub secondary_metrics: Vec<String>,
    /// Event type whose first occurrence marks an assignment converted
    pub conversion_goal: String,
    /// Participants per variant before results are trusted
    pub minimum_sample_size: u64,
    /// Smallest relative effect worth detecting, in percent
    pub minimum_effect: f64,
    /// Significance threshold, e.g. 95.0
    pub confidence_level: f64,
}

impl Experiment {
    /// Create a draft experiment
    pub fn new(
        name: impl Into<String>,
        feature: impl Into<String>,
        conversion_goal: impl Into<String>,
        variants: Vec<Variant>,
    ) -> Self {
        let conversion_goal = conversion_goal.into();
        Self {
            id: ExperimentId::new(),
            name: name.into(),
            description: String::new(),
            feature: feature.into(),
            status: ExperimentStatus::Draft,
            traffic_allocation: 100.0,
            variants,
            target_audience: TargetAudience::everyone(),
            start_at: None,
            end_at: None,
            primary_metric: conversion_goal.clone(),
            secondary_metrics: Vec::new(),
            conversion_goal,
            minimum_sample_size: 1000,
            minimum_effect: 5.0,
            confidence_level: 95.0,
        }
    }

    /// With a description
    #[inline]
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// With a traffic allocation percentage
    #[inline]
    #[must_use]
    pub fn with_traffic_allocation(mut self, pct: f64) -> Self {
        self.traffic_allocation = pct;
        self
    }

    /// With audience targeting
    #[inline]
    #[must_use]
    pub fn with_audience(mut self, audience: TargetAudience) -> Self {
        self.target_audience = audience;
        self
    }

    /// With secondary metrics
    #[inline]
    #[must_use]
    pub fn with_secondary_metrics(mut self, metrics: Vec<String>) -> Self {
        self.secondary_metrics = metrics;
        self
    }

    /// With a minimum relative effect, in percent
    #[inline]
    #[must_use]
    pub fn with_minimum_effect(mut self, pct: f64) -> Self {
        self.minimum_effect = pct;
        self
    }

    /// Whether the experiment is live
    #[inline]
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.status == ExperimentStatus::Running
    }

    /// The control variant, if the definition is well formed
    #[inline]
    #[must_use]
    pub fn control_variant(&self) -> Option<&Variant> {
        self.variants.iter().find(|v| v.is_control)
    }

    /// Look up a variant by id
    #[inline]
    #[must_use]
    pub fn variant(&self, id: VariantId) -> Option<&Variant> {
        self.variants.iter().find(|v| v.id == id)
    }

    /// Validate authoring-time invariants
    ///
    /// Called when a draft is saved or activated; the assignment path relies
    /// on definitions having passed this and never re-checks.
    pub fn validate(&self) -> Result<(), ExperimentConfigError> {
        if self.variants.is_empty() {
            return Err(ExperimentConfigError::NoVariants);
        }

        let controls = self.variants.iter().filter(|v| v.is_control).count();
        if controls != 1 {
            return Err(ExperimentConfigError::ControlCount(controls));
        }

        let split_sum: f64 = self.variants.iter().map(|v| v.traffic_split).sum();
        if (split_sum - 100.0).abs() > SPLIT_SUM_EPSILON {
            return Err(ExperimentConfigError::SplitSum(split_sum));
        }
        if self.variants.iter().any(|v| v.traffic_split < 0.0) {
            return Err(ExperimentConfigError::NegativeSplit);
        }

        if !(0.0..=100.0).contains(&self.traffic_allocation) {
            return Err(ExperimentConfigError::AllocationOutOfRange(
                self.traffic_allocation,
            ));
        }

        if !(0.0..100.0).contains(&self.confidence_level) || self.confidence_level <= 50.0 {
            return Err(ExperimentConfigError::ConfidenceOutOfRange(
                self.confidence_level,
            ));
        }

        Ok(())
    }

    /// Validate and move to a new lifecycle state
    ///
    /// Activation stamps `start_at`; terminal states stamp `end_at`.
    pub fn transition_to(&mut self, next: ExperimentStatus) -> Result<(), ExperimentConfigError> {
        if !self.status.can_transition_to(next) {
            return Err(ExperimentConfigError::IllegalTransition {
                from: self.status,
                to: next,
            });
        }
        if next == ExperimentStatus::Running {
            self.validate()?;
            if self.start_at.is_none() {
                self.start_at = Some(Utc::now());
            }
        }
        if matches!(
            next,
            ExperimentStatus::Completed | ExperimentStatus::Cancelled
        ) {
            self.end_at = Some(Utc::now());
        }
        self.status = next;
        Ok(())
    }
}

/// Authoring-time validation failures
#[derive(Debug, thiserror::Error)]
pub enum ExperimentConfigError {
    /// No variants defined
    #[error("experiment has no variants")]
    NoVariants,

    /// Must have exactly one control
    #[error("experiment must have exactly one control variant, found {0}")]
    ControlCount(usize),

    /// Splits must sum to 100
    #[error("variant traffic splits must sum to 100, got {0}")]
    SplitSum(f64),

    /// Negative split
    #[error("variant traffic splits must be non-negative")]
    NegativeSplit,

    /// Allocation outside 0-100
    #[error("traffic allocation must be within 0-100, got {0}")]
    AllocationOutOfRange(f64),

    /// Confidence level outside the usable range
    #[error("confidence level must be within (50, 100), got {0}")]
    ConfidenceOutOfRange(f64),

    /// Lifecycle transition not allowed
    #[error("illegal status transition: {from:?} -> {to:?}")]
    IllegalTransition {
        /// Current state
        from: ExperimentStatus,
        /// Requested state
        to: ExperimentStatus,
    },
}
