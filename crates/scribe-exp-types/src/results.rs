//! Derived experiment results
//!
//! Everything here is recomputed on demand from assignments and events;
//! nothing is authoritative persisted state.

use crate::ids::VariantId;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Outcome of the control-vs-treatment comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultsStatus {
    /// Not enough participants to compare anything
    InsufficientData,
    /// Comparison ran, nothing crossed the significance threshold
    NoSignificantDifference,
    /// A treatment beat control at the configured confidence level
    SignificantWinner,
    /// A treatment lost to control at the configured confidence level
    SignificantLoser,
}

/// Two-sided 95% Wald interval on a conversion rate
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceInterval {
    /// Lower bound, clamped to [0, 1]
    pub lower: f64,
    /// Upper bound, clamped to [0, 1]
    pub upper: f64,
}

/// Aggregates for one variant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantResults {
    /// Variant these numbers describe
    pub variant_id: VariantId,
    /// Variant name, for display
    pub name: String,
    /// Whether this is the control arm
    pub is_control: bool,
    /// Number of assignments
    pub participants: u64,
    /// Assignments with the converted flag set
    pub conversions: u64,
    /// conversions / participants, 0 when empty
    pub conversion_rate: f64,
    /// 95% Wald interval on the conversion rate
    pub confidence_interval: ConfidenceInterval,
    /// Participants per arm needed to detect the minimum effect at 80% power
    pub required_sample_size: u64,
    /// Relative delta vs control per secondary metric, in percent
    pub secondary_metric_deltas: BTreeMap<String, f64>,
}

/// One calendar day of the trend series, re-derived per day (not cumulative)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyResults {
    /// Calendar day, keyed on each assignment's `assigned_at` date
    pub date: NaiveDate,
    /// Per-variant (participants, conversions) for assignments made that day
    pub variants: BTreeMap<VariantId, DailyVariantCounts>,
}

/// Per-day counts for a single variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DailyVariantCounts {
    /// Assignments made that day
    pub participants: u64,
    /// Of those, assignments that eventually converted
    pub conversions: u64,
}

/// Full derived results for one experiment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentResults {
    /// Comparison outcome
    pub status: ResultsStatus,
    /// Winning treatment, when `status` is `SignificantWinner`
    pub winning_variant: Option<VariantId>,
    /// (1 - p) * 100 for the reported comparison, floored at 0
    pub confidence: f64,
    /// Two-sided p-value of the reported comparison
    pub p_value: f64,
    /// Relative effect of the reported treatment vs control, in percent
    pub effect: f64,
    /// Per-variant aggregates, control first
    pub variants: Vec<VariantResults>,
    /// Daily trend series, oldest day first
    pub daily: Vec<DailyResults>,
}

impl ExperimentResults {
    /// Results for an experiment that cannot be compared yet
    #[must_use]
    pub fn insufficient(variants: Vec<VariantResults>, daily: Vec<DailyResults>) -> Self {
        Self {
            status: ResultsStatus::InsufficientData,
            winning_variant: None,
            confidence: 0.0,
            p_value: 1.0,
            effect: 0.0,
            variants,
            daily,
        }
    }
}
