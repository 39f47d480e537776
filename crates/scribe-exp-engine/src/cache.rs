//! TTL-bounded cache of experiment definitions
//!
//! Definitions change rarely and are read on every config lookup, so each
//! engine instance keeps a small moka cache in front of the store. Entries
//! expire on a bounded interval; a stale definition may serve for seconds,
//! never indefinitely. The cache is injected per instance, not a process
//! global, so tests and multi-tenant deployments construct their own.

use crate::error::EngineError;
use crate::handle::StoreHandle;
use moka::future::Cache;
use scribe_exp_types::{Experiment, ExperimentId};
use std::sync::Arc;
use std::time::Duration;

/// Concurrent read-through cache of experiment definitions
///
/// Misses (no experiment, no running experiment on a feature) are cached
/// too, so hot features without a live experiment do not hammer the store.
#[derive(Debug, Clone)]
pub struct DefinitionCache {
    by_id: Cache<ExperimentId, Option<Arc<Experiment>>>,
    by_feature: Cache<String, Option<Arc<Experiment>>>,
}

impl DefinitionCache {
    /// Create a cache with the given capacity and entry TTL
    #[must_use]
    pub fn new(capacity: u64, ttl: Duration) -> Self {
        Self {
            by_id: Cache::builder()
                .max_capacity(capacity)
                .time_to_live(ttl)
                .build(),
            by_feature: Cache::builder()
                .max_capacity(capacity)
                .time_to_live(ttl)
                .build(),
        }
    }

    /// Definition by id, read through the store on miss
    pub async fn experiment(
        &self,
        store: &StoreHandle,
        id: ExperimentId,
    ) -> Result<Option<Arc<Experiment>>, EngineError> {
        if let Some(cached) = self.by_id.get(&id).await {
            return Ok(cached);
        }

        let fetched = store.experiment(id).await?.map(Arc::new);
        self.by_id.insert(id, fetched.clone()).await;
        Ok(fetched)
    }

    /// The running experiment on `feature`, read through the store on miss
    pub async fn running_for_feature(
        &self,
        store: &StoreHandle,
        feature: &str,
    ) -> Result<Option<Arc<Experiment>>, EngineError> {
        if let Some(cached) = self.by_feature.get(feature).await {
            return Ok(cached);
        }

        let fetched = store
            .running_experiment_for_feature(feature)
            .await?
            .map(Arc::new);
        self.by_feature
            .insert(feature.to_string(), fetched.clone())
            .await;
        if let Some(exp) = &fetched {
            self.by_id.insert(exp.id, Some(Arc::clone(exp))).await;
        }
        Ok(fetched)
    }

    /// Drop every cached definition
    pub fn invalidate_all(&self) {
        self.by_id.invalidate_all();
        self.by_feature.invalidate_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scribe_exp_store::MemoryStore;
    use scribe_exp_types::{ExperimentStatus, Variant, VariantConfig};

    fn running_experiment(feature: &str) -> Experiment {
        let mut exp = Experiment::new(
            "test",
            feature,
            "goal",
            vec![
                Variant::control("control", 50.0, VariantConfig::empty()),
                Variant::new("treatment", 50.0, VariantConfig::empty()),
            ],
        );
        exp.transition_to(ExperimentStatus::Running).unwrap();
        exp
    }

    fn handle(store: &Arc<MemoryStore>) -> StoreHandle {
        StoreHandle::new(Arc::clone(store) as _, Duration::from_secs(1))
    }

    #[tokio::test]
    async fn cached_definition_survives_store_outage() {
        let store = Arc::new(MemoryStore::new());
        let exp = running_experiment("editor_model");
        let id = exp.id;
        store.put_experiment(exp);

        let cache = DefinitionCache::new(16, Duration::from_secs(30));
        let handle = handle(&store);

        assert!(cache.experiment(&handle, id).await.unwrap().is_some());

        // Hits are served from cache even while the store is down.
        store.set_unavailable(true);
        assert!(cache.experiment(&handle, id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn miss_propagates_store_error() {
        let store = Arc::new(MemoryStore::new());
        store.set_unavailable(true);

        let cache = DefinitionCache::new(16, Duration::from_secs(30));
        let err = cache
            .running_for_feature(&handle(&store), "editor_model")
            .await
            .unwrap_err();
        assert!(err.is_store_unavailable());
    }

    #[tokio::test]
    async fn negative_feature_lookup_is_cached() {
        let store = Arc::new(MemoryStore::new());
        let cache = DefinitionCache::new(16, Duration::from_secs(30));
        let handle = handle(&store);

        assert!(cache
            .running_for_feature(&handle, "paywall_copy")
            .await
            .unwrap()
            .is_none());

        store.set_unavailable(true);
        assert!(cache
            .running_for_feature(&handle, "paywall_copy")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn feature_hit_also_primes_id_lookup() {
        let store = Arc::new(MemoryStore::new());
        let exp = running_experiment("editor_model");
        let id = exp.id;
        store.put_experiment(exp);

        let cache = DefinitionCache::new(16, Duration::from_secs(30));
        let handle = handle(&store);
        cache
            .running_for_feature(&handle, "editor_model")
            .await
            .unwrap();

        store.set_unavailable(true);
        assert!(cache.experiment(&handle, id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn invalidate_all_forces_refresh() {
        let store = Arc::new(MemoryStore::new());
        let exp = running_experiment("editor_model");
        let id = exp.id;
        store.put_experiment(exp);

        let cache = DefinitionCache::new(16, Duration::from_secs(30));
        let handle = handle(&store);
        cache.experiment(&handle, id).await.unwrap();

        cache.invalidate_all();
        store.set_unavailable(true);
        assert!(cache.experiment(&handle, id).await.is_err());
    }
}
