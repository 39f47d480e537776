//! Feature config resolution - the surface the rest of the platform uses
//!
//! [`ExperimentClient`] wires the assignment engine, conversion tracker, and
//! statistics engine over one store, and exposes the five operations the
//! application consumes. Config and flag lookups are the one place engine
//! errors are swallowed: "experiment unavailable" degrades to the caller's
//! default so experimentation can never block a feature.

use crate::assignment::{AssignmentEngine, RequestContext};
use crate::cache::DefinitionCache;
use crate::config::EngineConfig;
use crate::conversion::ConversionTracker;
use crate::error::EngineError;
use crate::handle::StoreHandle;
use crate::stats::StatisticsEngine;
use scribe_exp_store::ExperimentStore;
use scribe_exp_types::{
    ExperimentId, ExperimentResults, UserId, Variant, VariantConfig,
};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::warn;

/// Key used for plain boolean feature flags inside a custom config payload
const FLAG_KEY: &str = "enabled";

/// Application-facing entry point to the experimentation engine
#[derive(Debug, Clone)]
pub struct ExperimentClient {
    store: StoreHandle,
    cache: DefinitionCache,
    assignments: AssignmentEngine,
    tracker: ConversionTracker,
    stats: StatisticsEngine,
}

impl ExperimentClient {
    /// Build a client over a store with the given configuration
    #[must_use]
    pub fn new(store: Arc<dyn ExperimentStore>, config: EngineConfig) -> Self {
        let store = StoreHandle::new(store, config.store_timeout);
        let cache = DefinitionCache::new(config.cache_capacity, config.cache_ttl);
        Self {
            assignments: AssignmentEngine::new(store.clone(), cache.clone()),
            tracker: ConversionTracker::new(store.clone(), cache.clone()),
            stats: StatisticsEngine::new(store.clone()),
            store,
            cache,
        }
    }

    /// The effective config for (user, feature): the assigned variant's
    /// overrides shallow-merged onto `default`
    ///
    /// Degrades to `default` unchanged when no experiment is running on the
    /// feature, the user is out of it, or the store cannot be reached.
    pub async fn config_for(
        &self,
        user_id: &UserId,
        feature: &str,
        default: &VariantConfig,
    ) -> VariantConfig {
        match self.try_config_for(user_id, feature, default).await {
            Ok(config) => config,
            Err(err) => {
                warn!(%user_id, feature, %err, "experiment lookup failed, serving default");
                default.clone()
            }
        }
    }

    async fn try_config_for(
        &self,
        user_id: &UserId,
        feature: &str,
        default: &VariantConfig,
    ) -> Result<VariantConfig, EngineError> {
        let Some(experiment) = self.cache.running_for_feature(&self.store, feature).await?
        else {
            return Ok(default.clone());
        };

        let Some(variant) = self.assignments.variant_for(user_id, experiment.id).await? else {
            return Ok(default.clone());
        };

        Ok(variant.config.merge_over(default))
    }

    /// Boolean feature flag: the `enabled` key of the variant config on the
    /// experiment tagged `flag`, or `default` when out of experiment
    pub async fn is_enabled(&self, user_id: &UserId, flag: &str, default: bool) -> bool {
        let default_config = VariantConfig::custom([(FLAG_KEY, json!(default))]);
        self.config_for(user_id, flag, &default_config)
            .await
            .bool_value(FLAG_KEY)
            .unwrap_or(default)
    }

    /// Record a product event against every running experiment the user
    /// holds an assignment in
    ///
    /// Experiments without an assignment for this user are untouched.
    /// Store failures propagate; event delivery is the caller's retry
    /// decision.
    pub async fn track_event(
        &self,
        user_id: &UserId,
        event_type: &str,
        event_data: BTreeMap<String, Value>,
        value: f64,
    ) -> Result<(), EngineError> {
        let running = self.store.running_experiments().await?;
        for experiment in running {
            self.tracker
                .record_event(user_id, experiment.id, event_type, event_data.clone(), value)
                .await?;
        }
        Ok(())
    }

    /// The user's variant in a specific experiment, assigning on first sight
    pub async fn variant_for(
        &self,
        user_id: &UserId,
        experiment_id: ExperimentId,
    ) -> Result<Option<Variant>, EngineError> {
        self.assignments.variant_for(user_id, experiment_id).await
    }

    /// Variant lookup with request context stamped onto a fresh assignment
    pub async fn variant_for_with_context(
        &self,
        user_id: &UserId,
        experiment_id: ExperimentId,
        request: &RequestContext,
    ) -> Result<Option<Variant>, EngineError> {
        self.assignments
            .variant_for_with_context(user_id, experiment_id, request)
            .await
    }

    /// Aggregate and test an experiment's current data
    pub async fn compute_results(
        &self,
        experiment_id: ExperimentId,
    ) -> Result<ExperimentResults, EngineError> {
        self.stats.compute_results(experiment_id).await
    }

    /// Drop cached experiment definitions, forcing fresh reads
    pub fn invalidate_definitions(&self) {
        self.cache.invalidate_all();
    }
}
