use shared::domain::{IncidenceId, TransitionKind};
use tracing::{info, warn};

use crate::{
    cache::Resource,
    error::ClientError,
    mutation::{Effect, FailureIndicator, FailureScope},
};

#[derive(Debug, Clone)]
pub enum BulkEvent {
    Requested {
        kind: TransitionKind,
        ids: Vec<IncidenceId>,
    },
    Settled {
        result: Result<(), ClientError>,
    },
}

/// Batch status transitions. Never optimistic: under an active filter a
/// transition can remove rows from the visible set, so nothing is predicted
/// locally and only a refetch changes what is shown.
#[derive(Debug, Clone, Default)]
pub struct BulkTransitionController {
    in_flight: Option<TransitionKind>,
}

impl BulkTransitionController {
    pub fn is_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn apply(&mut self, event: BulkEvent) -> Vec<Effect> {
        match event {
            BulkEvent::Requested { kind, ids } => {
                if ids.is_empty() || self.in_flight.is_some() {
                    return Vec::new();
                }
                self.in_flight = Some(kind);
                vec![Effect::SendBulk { kind, ids }]
            }
            BulkEvent::Settled { result } => {
                let Some(kind) = self.in_flight.take() else {
                    return Vec::new();
                };
                match result {
                    Ok(()) => {
                        info!(?kind, "bulk: transition applied");
                        vec![Effect::ClearSelection, Effect::Refetch(Resource::Incidences)]
                    }
                    Err(err) => {
                        warn!(?kind, %err, "bulk: transition failed");
                        vec![Effect::Surface(FailureIndicator::new(
                            FailureScope::BulkTransition,
                            &err,
                        ))]
                    }
                }
            }
        }
    }
}
