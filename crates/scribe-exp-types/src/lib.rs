//! Scribe Experiment Types - shared data model
//!
//! Defines the vocabulary the experimentation engine operates on:
//! - Experiment and variant definitions, audience targeting, lifecycle
//! - Assignments (the one-time user -> variant decision) and conversion events
//! - Derived per-experiment results
//! - Variant config payloads and the shallow-merge overlay
//!
//! This crate is I/O-free; persistence and decision logic live in
//! `scribe-exp-store` and `scribe-exp-engine`.

#![warn(unreachable_pub)]

pub mod assignment;
pub mod config;
pub mod experiment;
pub mod ids;
pub mod profile;
pub mod results;

// Re-exports for convenience
pub use assignment::{Assignment, AssignmentContext, ConversionEvent};
pub use config::{EditorModelConfig, OnboardingFlowConfig, PaywallCopyConfig, VariantConfig};
pub use experiment::{
    Experiment, ExperimentConfigError, ExperimentStatus, TargetAudience, Variant,
};
pub use ids::{AssignmentId, EventId, ExperimentId, UserId, VariantId};
pub use profile::{UserProfile, UserTier};
pub use results::{
    ConfidenceInterval, DailyResults, DailyVariantCounts, ExperimentResults, ResultsStatus,
    VariantResults,
};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with experiment types
    pub use crate::{
        Assignment, ConversionEvent, Experiment, ExperimentId, ExperimentResults,
        ExperimentStatus, ResultsStatus, UserId, UserProfile, UserTier, Variant, VariantConfig,
        VariantId,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
