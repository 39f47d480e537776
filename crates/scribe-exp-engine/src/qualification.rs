//! Audience qualification
//!
//! Decides whether a user may enter a running experiment. Pure reads, no
//! writes: an unqualified user leaves no trace in the store.
//!
//! A missing profile fails closed (not qualified); a store failure while
//! checking propagates, so callers can distinguish "ineligible" from
//! "cannot tell right now".

use crate::error::EngineError;
use crate::handle::StoreHandle;
use chrono::Utc;
use scribe_exp_types::{Experiment, UserId, UserProfile};
use tracing::debug;

/// Audience targeting and cross-experiment exclusion checks
#[derive(Debug, Clone)]
pub struct QualificationFilter {
    store: StoreHandle,
}

impl QualificationFilter {
    /// Create a filter over the given store
    #[inline]
    #[must_use]
    pub fn new(store: StoreHandle) -> Self {
        Self { store }
    }

    /// Run every check; `Some(profile)` means qualified, and the profile is
    /// returned so the caller can stamp assignment context without a second
    /// fetch.
    pub async fn qualify(
        &self,
        user_id: &UserId,
        experiment: &Experiment,
    ) -> Result<Option<UserProfile>, EngineError> {
        if !experiment.status.accepts_assignments() {
            return Ok(None);
        }

        let Some(profile) = self.store.user_profile(user_id).await? else {
            debug!(%user_id, experiment = %experiment.id, "no profile, failing closed");
            return Ok(None);
        };

        let audience = &experiment.target_audience;

        if !audience.user_tiers.is_empty() && !audience.user_tiers.contains(&profile.tier) {
            return Ok(None);
        }

        if let Some(min_days) = audience.min_account_age_days {
            if profile.account_age_days(Utc::now()) < min_days {
                return Ok(None);
            }
        }

        // New-users-only means the account postdates the experiment start;
        // an experiment that never recorded a start time cannot narrow here.
        if audience.new_users_only {
            if let Some(start) = experiment.start_at {
                if profile.created_at < start {
                    return Ok(None);
                }
            }
        }

        if audience.exclude_user_ids.contains(user_id) {
            return Ok(None);
        }

        if self.holds_conflicting_assignment(user_id, experiment).await? {
            debug!(
                %user_id,
                feature = %experiment.feature,
                "already assigned in another experiment on this feature"
            );
            return Ok(None);
        }

        Ok(Some(profile))
    }

    /// Whether the user already holds an assignment in a different running
    /// experiment on the same feature. Guarantees a user never sees two
    /// simultaneous variants of one feature.
    async fn holds_conflicting_assignment(
        &self,
        user_id: &UserId,
        experiment: &Experiment,
    ) -> Result<bool, EngineError> {
        let running = self.store.running_experiments().await?;
        for other in running {
            if other.id == experiment.id || other.feature != experiment.feature {
                continue;
            }
            if self.store.assignment(user_id, other.id).await?.is_some() {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use scribe_exp_store::{ExperimentStore, MemoryStore};
    use scribe_exp_types::{
        Assignment, AssignmentContext, ExperimentStatus, TargetAudience, UserTier, Variant,
        VariantConfig,
    };
    use std::sync::Arc;
    use std::time::Duration;

    fn experiment(audience: TargetAudience) -> Experiment {
        let mut exp = Experiment::new(
            "test",
            "editor_model",
            "goal",
            vec![
                Variant::control("control", 50.0, VariantConfig::empty()),
                Variant::new("treatment", 50.0, VariantConfig::empty()),
            ],
        )
        .with_audience(audience);
        exp.transition_to(ExperimentStatus::Running).unwrap();
        exp
    }

    fn fixture() -> (Arc<MemoryStore>, QualificationFilter) {
        let store = Arc::new(MemoryStore::new());
        let handle = StoreHandle::new(Arc::clone(&store) as _, Duration::from_secs(1));
        (store, QualificationFilter::new(handle))
    }

    fn seasoned_profile(tier: UserTier) -> UserProfile {
        UserProfile::new(tier, Utc::now() - ChronoDuration::days(100))
    }

    #[tokio::test]
    async fn open_audience_qualifies_profiled_user() {
        let (store, filter) = fixture();
        let user = UserId::from("writer-1");
        store.put_profile(user.clone(), seasoned_profile(UserTier::Free));

        let exp = experiment(TargetAudience::everyone());
        store.put_experiment(exp.clone());

        assert!(filter.qualify(&user, &exp).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn missing_profile_fails_closed() {
        let (store, filter) = fixture();
        let exp = experiment(TargetAudience::everyone());
        store.put_experiment(exp.clone());

        let result = filter.qualify(&UserId::from("ghost"), &exp).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn tier_allow_list_enforced() {
        let (store, filter) = fixture();
        let user = UserId::from("writer-1");
        store.put_profile(user.clone(), seasoned_profile(UserTier::Free));

        let exp = experiment(TargetAudience::everyone().with_tiers(vec![UserTier::Plus]));
        store.put_experiment(exp.clone());

        assert!(filter.qualify(&user, &exp).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn minimum_account_age_enforced() {
        let (store, filter) = fixture();
        let user = UserId::from("newbie");
        store.put_profile(
            user.clone(),
            UserProfile::new(UserTier::Free, Utc::now() - ChronoDuration::days(3)),
        );

        let exp = experiment(TargetAudience::everyone().with_min_account_age_days(30));
        store.put_experiment(exp.clone());

        assert!(filter.qualify(&user, &exp).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn exclusion_list_enforced() {
        let (store, filter) = fixture();
        let user = UserId::from("qa-account");
        store.put_profile(user.clone(), seasoned_profile(UserTier::Pro));

        let exp =
            experiment(TargetAudience::everyone().with_excluded(vec![UserId::from("qa-account")]));
        store.put_experiment(exp.clone());

        assert!(filter.qualify(&user, &exp).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn new_users_only_excludes_accounts_predating_start() {
        let (store, filter) = fixture();
        let veteran = UserId::from("veteran");
        store.put_profile(veteran.clone(), seasoned_profile(UserTier::Free));
        let fresh = UserId::from("fresh");
        store.put_profile(fresh.clone(), UserProfile::new(UserTier::Free, Utc::now()));

        let mut audience = TargetAudience::everyone();
        audience.new_users_only = true;
        let exp = experiment(audience);
        store.put_experiment(exp.clone());

        assert!(filter.qualify(&veteran, &exp).await.unwrap().is_none());
        assert!(filter.qualify(&fresh, &exp).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn conflicting_assignment_on_same_feature_disqualifies() {
        let (store, filter) = fixture();
        let user = UserId::from("writer-1");
        store.put_profile(user.clone(), seasoned_profile(UserTier::Free));

        let other = experiment(TargetAudience::everyone());
        store.put_experiment(other.clone());
        store
            .create_assignment_if_absent(Assignment::new(
                user.clone(),
                other.id,
                other.variants[0].id,
                AssignmentContext::default(),
            ))
            .await
            .unwrap();

        let exp = experiment(TargetAudience::everyone());
        store.put_experiment(exp.clone());

        assert!(filter.qualify(&user, &exp).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn store_failure_propagates() {
        let (store, filter) = fixture();
        let exp = experiment(TargetAudience::everyone());
        store.set_unavailable(true);

        let err = filter
            .qualify(&UserId::from("writer-1"), &exp)
            .await
            .unwrap_err();
        assert!(err.is_store_unavailable());
    }
}
