use std::collections::HashMap;

use shared::domain::IntegrationId;
use tracing::{debug, warn};

use crate::{
    cache::Resource,
    error::ClientError,
    mutation::{Effect, FailureIndicator, FailureScope, MutationIntent},
    ordered::CollectionItem,
    revision::{Revision, RevisionLedger},
};

#[derive(Debug, Clone)]
pub enum ToggleEvent {
    Synced(Vec<(IntegrationId, bool)>),
    Requested {
        id: IntegrationId,
    },
    Settled {
        id: IntegrationId,
        revision: Revision,
        /// Activation state the server returned.
        result: Result<bool, ClientError>,
    },
}

#[derive(Debug, Clone)]
struct PendingToggle {
    desired: bool,
    intent: MutationIntent<bool>,
}

/// Optimistic activation flips. The overlay holds the newest requested state per
/// item and wins over confirmed data until that newest request settles.
#[derive(Debug, Clone, Default)]
pub struct ToggleController {
    confirmed: HashMap<IntegrationId, bool>,
    overlay: HashMap<IntegrationId, PendingToggle>,
    revisions: RevisionLedger<IntegrationId>,
}

impl ToggleController {
    pub fn displayed(&self, id: &IntegrationId) -> Option<bool> {
        self.overlay
            .get(id)
            .map(|pending| pending.desired)
            .or_else(|| self.confirmed.get(id).copied())
    }

    pub fn is_pending(&self, id: &IntegrationId) -> bool {
        self.overlay.contains_key(id)
    }

    /// Sets each item's activation to the displayed state: the pending request if
    /// any, otherwise the last value the server confirmed.
    pub fn project(&self, items: &mut [CollectionItem]) {
        for item in items {
            if let Some(is_active) = self.displayed(&item.identifier) {
                item.is_active = is_active;
            }
        }
    }

    pub fn apply(&mut self, event: ToggleEvent) -> Vec<Effect> {
        match event {
            ToggleEvent::Synced(states) => {
                self.confirmed = states.into_iter().collect();
                let confirmed = &self.confirmed;
                self.overlay.retain(|id, _| confirmed.contains_key(id));
                Vec::new()
            }
            ToggleEvent::Requested { id } => {
                let Some(current) = self.displayed(&id) else {
                    return Vec::new();
                };
                let desired = !current;
                let revision = self.revisions.advance(&id);
                let prior = self.confirmed.get(&id).copied().unwrap_or(current);
                self.overlay.insert(
                    id.clone(),
                    PendingToggle {
                        desired,
                        intent: MutationIntent::new(revision, prior),
                    },
                );
                vec![Effect::SendToggle {
                    id,
                    revision,
                    is_active: desired,
                }]
            }
            ToggleEvent::Settled {
                id,
                revision,
                result,
            } => self.settle(id, revision, result),
        }
    }

    fn settle(
        &mut self,
        id: IntegrationId,
        revision: Revision,
        result: Result<bool, ClientError>,
    ) -> Vec<Effect> {
        if !self.revisions.is_current(&id, revision) {
            // Older request. While the newer one is pending its overlay stays on
            // screen, so the server value may still become the rollback target.
            // Once the newer one has settled this response is behind it.
            if let Ok(is_active) = result {
                if self.overlay.contains_key(&id) {
                    self.confirmed.insert(id.clone(), is_active);
                }
            }
            debug!(integration = %id, revision = revision.0, "toggle: discarding stale settlement");
            return Vec::new();
        }

        let Some(pending) = self.overlay.remove(&id) else {
            return Vec::new();
        };
        match result {
            Ok(is_active) => {
                self.confirmed.insert(id, is_active);
                vec![Effect::Refetch(Resource::Integrations)]
            }
            Err(err) => {
                let restored = self
                    .confirmed
                    .get(&id)
                    .copied()
                    .unwrap_or(pending.intent.rollback);
                self.confirmed.insert(id.clone(), restored);
                warn!(integration = %id, %err, restored, "toggle: request failed; reverted");
                vec![Effect::Surface(FailureIndicator::new(
                    FailureScope::Integration(id),
                    &err,
                ))]
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/toggle_tests.rs"]
mod tests;
