//! Conversion tracking
//!
//! Events attach to an existing assignment and are append-only. The
//! assignment's `converted` flag flips exactly once, when the experiment's
//! goal event first fires; later goal events still append but never
//! re-trigger the flip. Users without an assignment produce no rows at all:
//! an event that cannot be attributed is dropped, not an error.

use crate::cache::DefinitionCache;
use crate::error::EngineError;
use crate::handle::StoreHandle;
use chrono::Utc;
use scribe_exp_types::{ConversionEvent, ExperimentId, UserId};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Records product events against existing assignments
#[derive(Debug, Clone)]
pub struct ConversionTracker {
    store: StoreHandle,
    cache: DefinitionCache,
}

impl ConversionTracker {
    /// Create a tracker over the given store and definition cache
    #[inline]
    #[must_use]
    pub fn new(store: StoreHandle, cache: DefinitionCache) -> Self {
        Self { store, cache }
    }

    /// Append an event for the user's assignment in `experiment_id`,
    /// flipping the converted flag if this is the first goal event
    pub async fn record_event(
        &self,
        user_id: &UserId,
        experiment_id: ExperimentId,
        event_type: &str,
        event_data: BTreeMap<String, Value>,
        value: f64,
    ) -> Result<(), EngineError> {
        let Some(assignment) = self.store.assignment(user_id, experiment_id).await? else {
            debug!(%user_id, experiment = %experiment_id, "event without assignment, dropping");
            return Ok(());
        };

        let event = ConversionEvent::new(&assignment, event_type, event_data, value);
        self.store.append_event(event).await?;

        let Some(experiment) = self.cache.experiment(&self.store, experiment_id).await? else {
            return Ok(());
        };

        if event_type == experiment.conversion_goal {
            let flipped = self
                .store
                .mark_converted_if_unset(assignment.id, value, Utc::now())
                .await?;
            if flipped {
                info!(
                    %user_id,
                    experiment = %experiment_id,
                    variant = %assignment.variant_id,
                    "conversion recorded"
                );
            }
        }

        Ok(())
    }
}
