//! Effects emitted by the controllers and the records pairing each optimistic
//! patch with what is needed to undo it.

use std::fmt;

use serde::Serialize;
use shared::{
    domain::{IncidenceId, IntegrationId, SettingId, TransitionKind},
    error::FailureKind,
};

use crate::{cache::Resource, error::ClientError, revision::Revision};

/// An optimistic patch in flight: the revision it was sent under and the value
/// to restore if it fails.
#[derive(Debug, Clone, PartialEq)]
pub struct MutationIntent<S> {
    pub revision: Revision,
    pub rollback: S,
}

impl<S> MutationIntent<S> {
    pub fn new(revision: Revision, rollback: S) -> Self {
        Self { revision, rollback }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "scope", content = "id", rename_all = "snake_case")]
pub enum FailureScope {
    Integration(IntegrationId),
    Ordering,
    Setting(SettingId),
    BulkTransition,
}

impl fmt::Display for FailureScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureScope::Integration(id) => write!(f, "integration {id}"),
            FailureScope::Ordering => f.write_str("pipeline order"),
            FailureScope::Setting(id) => write!(f, "setting {id}"),
            FailureScope::BulkTransition => f.write_str("bulk transition"),
        }
    }
}

/// Visible, dismissible failure scoped to the affected item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureIndicator {
    pub scope: FailureScope,
    pub kind: FailureKind,
    pub message: String,
}

impl FailureIndicator {
    pub fn new(scope: FailureScope, err: &ClientError) -> Self {
        Self {
            scope,
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    PersistOrder {
        revision: Revision,
        order: Vec<IntegrationId>,
    },
    SendToggle {
        id: IntegrationId,
        revision: Revision,
        is_active: bool,
    },
    SendBulk {
        kind: TransitionKind,
        ids: Vec<IncidenceId>,
    },
    SaveSetting {
        id: SettingId,
        revision: Revision,
        value: serde_json::Value,
    },
    ClearSelection,
    Refetch(Resource),
    Surface(FailureIndicator),
}
