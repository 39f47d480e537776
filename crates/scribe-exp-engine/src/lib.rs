//! Scribe Experimentation Engine
//!
//! Deterministic A/B testing for the Scribe writing platform:
//! - Hash bucketing: stable user -> `[0,1)` draws for inclusion and variant pick
//! - Qualification: audience targeting and cross-experiment exclusion
//! - Assignment: exactly-once persisted user -> variant decisions
//! - Conversion tracking: append-only events with a one-way converted flip
//! - Statistics: two-proportion significance tests, intervals, power analysis
//! - Config resolution: variant overrides shallow-merged onto caller defaults
//!
//! The engine holds no cross-request state beyond a TTL-bounded cache of
//! experiment definitions, so any number of stateless instances can share one
//! store.
//!
//! # Example
//!
//! ```rust,ignore
//! use scribe_exp_engine::{EngineConfig, ExperimentClient};
//! use scribe_exp_store::MemoryStore;
//! use scribe_exp_types::{UserId, VariantConfig};
//! use std::sync::Arc;
//!
//! # async fn example() {
//! let store = Arc::new(MemoryStore::new());
//! let client = ExperimentClient::new(store, EngineConfig::new());
//!
//! let config = client
//!     .config_for(&UserId::from("writer-1"), "editor_model", &VariantConfig::empty())
//!     .await;
//! # }
//! ```

#![warn(unreachable_pub)]

// Core modules
pub mod assignment;
pub mod bucketing;
pub mod cache;
pub mod config;
pub mod conversion;
pub mod error;
pub mod handle;
pub mod qualification;
pub mod resolver;
pub mod stats;

// Re-exports for convenience
pub use assignment::{AssignmentEngine, RequestContext};
pub use bucketing::{bucket, inclusion_key, variant_key};
pub use cache::DefinitionCache;
pub use config::EngineConfig;
pub use conversion::ConversionTracker;
pub use error::EngineError;
pub use handle::StoreHandle;
pub use qualification::QualificationFilter;
pub use resolver::ExperimentClient;
pub use stats::StatisticsEngine;

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with the experimentation engine
    pub use crate::{
        AssignmentEngine, ConversionTracker, EngineConfig, EngineError, ExperimentClient,
        QualificationFilter, StatisticsEngine,
    };
    pub use scribe_exp_types::prelude::*;
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
