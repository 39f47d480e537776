//! Assignment engine
//!
//! Turns (user, experiment) into a variant exactly once. The persisted
//! assignment row is authoritative; the bucketing hash only seeds it the
//! first time, so changing variant splits mid-experiment never rebalances
//! existing users.
//!
//! Concurrency: multiple stateless instances may race to create the first
//! row. The store's conditional insert decides the winner; losers read the
//! winning row back and return its variant, never an error.

use crate::bucketing::{bucket, inclusion_key, variant_key};
use crate::cache::DefinitionCache;
use crate::error::EngineError;
use crate::handle::StoreHandle;
use crate::qualification::QualificationFilter;
use scribe_exp_types::{
    Assignment, AssignmentContext, Experiment, ExperimentId, UserId, Variant,
};
use tracing::{debug, info, warn};

/// Request-scoped context recorded on a fresh assignment
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// User agent of the assigning request
    pub user_agent: Option<String>,
    /// Referral source, when known
    pub referral_source: Option<String>,
}

/// Deterministic, exactly-once user -> variant assignment
#[derive(Debug, Clone)]
pub struct AssignmentEngine {
    store: StoreHandle,
    cache: DefinitionCache,
    filter: QualificationFilter,
}

impl AssignmentEngine {
    /// Create an engine over the given store and definition cache
    #[must_use]
    pub fn new(store: StoreHandle, cache: DefinitionCache) -> Self {
        let filter = QualificationFilter::new(store.clone());
        Self {
            store,
            cache,
            filter,
        }
    }

    /// The user's variant in the experiment, assigning on first sight
    ///
    /// Returns `None` when the user is out of the experiment for any reason:
    /// not running, unqualified, or outside the traffic slice. No assignment
    /// is persisted in those cases. Store failures propagate; callers own
    /// the fallback to default behavior.
    pub async fn variant_for(
        &self,
        user_id: &UserId,
        experiment_id: ExperimentId,
    ) -> Result<Option<Variant>, EngineError> {
        self.variant_for_with_context(user_id, experiment_id, &RequestContext::default())
            .await
    }

    /// Like [`variant_for`](Self::variant_for), stamping request context
    /// onto a fresh assignment
    pub async fn variant_for_with_context(
        &self,
        user_id: &UserId,
        experiment_id: ExperimentId,
        request: &RequestContext,
    ) -> Result<Option<Variant>, EngineError> {
        // Idempotent fast path: the stored row wins over any re-derivation.
        if let Some(existing) = self.store.assignment(user_id, experiment_id).await? {
            let Some(experiment) = self.cache.experiment(&self.store, experiment_id).await?
            else {
                return Ok(None);
            };
            if !experiment.is_running() {
                return Ok(None);
            }
            self.store.touch_last_seen(existing.id).await?;
            return Ok(self.resolve_variant(&experiment, &existing));
        }

        let Some(experiment) = self.cache.experiment(&self.store, experiment_id).await? else {
            return Ok(None);
        };
        if !experiment.is_running() {
            return Ok(None);
        }

        let Some(profile) = self.filter.qualify(user_id, &experiment).await? else {
            return Ok(None);
        };

        let inclusion = bucket(&inclusion_key(user_id, experiment_id));
        if inclusion > experiment.traffic_allocation / 100.0 {
            debug!(%user_id, experiment = %experiment_id, "outside traffic slice");
            return Ok(None);
        }

        let variant = pick_variant(&experiment, bucket(&variant_key(user_id, experiment_id)));

        let context = AssignmentContext {
            tier: Some(profile.tier),
            user_agent: request.user_agent.clone(),
            referral_source: request.referral_source.clone(),
        };
        let candidate =
            Assignment::new(user_id.clone(), experiment_id, variant.id, context);

        // The store arbitrates the race; whatever row comes back is the
        // decision, ours or a concurrent winner's.
        let persisted = self.store.create_assignment_if_absent(candidate).await?;
        info!(
            %user_id,
            experiment = %experiment_id,
            variant = %persisted.variant_id,
            "assignment resolved"
        );
        Ok(self.resolve_variant(&experiment, &persisted))
    }

    fn resolve_variant(
        &self,
        experiment: &Experiment,
        assignment: &Assignment,
    ) -> Option<Variant> {
        let found = experiment.variant(assignment.variant_id).cloned();
        if found.is_none() {
            warn!(
                experiment = %experiment.id,
                variant = %assignment.variant_id,
                "persisted assignment references a variant missing from the definition"
            );
        }
        found
    }
}

/// Walk variants in definition order, accumulating splits, and take the
/// first whose cumulative weight reaches `pick`. Rounding can leave the
/// last boundary short of 1.0; the first variant is the documented fallback.
fn pick_variant(experiment: &Experiment, pick: f64) -> &Variant {
    let mut cumulative = 0.0;
    for variant in &experiment.variants {
        cumulative += variant.traffic_split / 100.0;
        if pick <= cumulative {
            return variant;
        }
    }
    &experiment.variants[0]
}
