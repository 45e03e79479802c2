//! Local edit buffers for settings.
//!
//! A field follows the cache only while it is clean. Once edited it keeps the
//! user's value through any number of refreshes until a save for its newest
//! revision succeeds. A failed save leaves the edit in place.

use std::collections::BTreeMap;

use serde_json::Value;
use shared::{domain::SettingFieldType, domain::SettingId, protocol::InsiderSetting};
use tracing::{debug, warn};

use crate::{
    cache::Resource,
    error::{ClientError, DashboardError},
    mutation::{Effect, FailureIndicator, FailureScope, MutationIntent},
    revision::{Revision, RevisionLedger},
};

pub const LIST_DELIMITER: char = ',';

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DraftValue {
    Flag(bool),
    Number(Option<i64>),
    /// Strings, and list fields in their comma-delimited editing form.
    Text(String),
}

impl DraftValue {
    pub fn from_server(field_type: SettingFieldType, value: &Value) -> Self {
        match field_type {
            SettingFieldType::Boolean => DraftValue::Flag(value.as_bool().unwrap_or(false)),
            SettingFieldType::Integer => DraftValue::Number(value.as_i64()),
            SettingFieldType::List => DraftValue::Text(match value {
                Value::Array(items) => items
                    .iter()
                    .map(value_text)
                    .collect::<Vec<_>>()
                    .join(", "),
                other => value_text(other),
            }),
            SettingFieldType::String => DraftValue::Text(value_text(value)),
        }
    }

    /// Parses raw operator input for a field.
    pub fn parse_input(field_type: SettingFieldType, raw: &str) -> Result<Self, String> {
        match field_type {
            SettingFieldType::Boolean => match raw.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "on" | "yes" => Ok(DraftValue::Flag(true)),
                "false" | "0" | "off" | "no" => Ok(DraftValue::Flag(false)),
                other => Err(format!("expected a boolean, got {other:?}")),
            },
            SettingFieldType::Integer => {
                let trimmed = raw.trim();
                if trimmed.is_empty() {
                    return Ok(DraftValue::Number(None));
                }
                trimmed
                    .parse::<i64>()
                    .map(|n| DraftValue::Number(Some(n)))
                    .map_err(|err| format!("expected an integer: {err}"))
            }
            SettingFieldType::List | SettingFieldType::String => {
                Ok(DraftValue::Text(raw.to_string()))
            }
        }
    }

    pub fn fits(&self, field_type: SettingFieldType) -> bool {
        matches!(
            (field_type, self),
            (SettingFieldType::Boolean, DraftValue::Flag(_))
                | (SettingFieldType::Integer, DraftValue::Number(_))
                | (SettingFieldType::List, DraftValue::Text(_))
                | (SettingFieldType::String, DraftValue::Text(_))
        )
    }

    /// Wire value sent on save. List drafts only become token sequences here.
    pub fn to_wire(&self, field_type: SettingFieldType) -> Value {
        match (field_type, self) {
            (SettingFieldType::List, DraftValue::Text(raw)) => Value::Array(
                split_list(raw).into_iter().map(Value::String).collect(),
            ),
            (_, DraftValue::Flag(flag)) => Value::Bool(*flag),
            (_, DraftValue::Number(Some(n))) => Value::from(*n),
            (_, DraftValue::Number(None)) => Value::Null,
            (_, DraftValue::Text(text)) => Value::String(text.clone()),
        }
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(LIST_DELIMITER)
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirtyField {
    pub record_id: SettingId,
    pub key: String,
    pub description: String,
    pub field_type: SettingFieldType,
    pub value: DraftValue,
    pub is_dirty: bool,
    pub is_saving: bool,
}

#[derive(Debug, Clone)]
struct FieldState {
    key: String,
    description: String,
    field_type: SettingFieldType,
    server: Value,
    local: DraftValue,
    is_dirty: bool,
    saving: Option<MutationIntent<DraftValue>>,
}

impl FieldState {
    fn from_setting(setting: &InsiderSetting) -> Self {
        Self {
            key: setting.key.clone(),
            description: setting.description.clone(),
            field_type: setting.field_type,
            server: setting.value.clone(),
            local: DraftValue::from_server(setting.field_type, &setting.value),
            is_dirty: false,
            saving: None,
        }
    }

    fn adopt_server(&mut self, setting: &InsiderSetting) {
        self.key = setting.key.clone();
        self.description = setting.description.clone();
        self.field_type = setting.field_type;
        self.server = setting.value.clone();
        if !self.is_dirty {
            self.local = DraftValue::from_server(self.field_type, &self.server);
        }
    }
}

#[derive(Debug, Clone)]
pub enum FormEvent {
    Synced(Vec<InsiderSetting>),
    Edited { id: SettingId, value: DraftValue },
    SaveRequested { id: SettingId },
    SaveSettled {
        id: SettingId,
        revision: Revision,
        result: Result<InsiderSetting, ClientError>,
    },
}

#[derive(Debug, Clone, Default)]
pub struct DirtyFormController {
    fields: BTreeMap<SettingId, FieldState>,
    revisions: RevisionLedger<SettingId>,
}

impl DirtyFormController {
    pub fn fields(&self) -> Vec<DirtyField> {
        self.fields
            .iter()
            .map(|(id, state)| DirtyField {
                record_id: *id,
                key: state.key.clone(),
                description: state.description.clone(),
                field_type: state.field_type,
                value: state.local.clone(),
                is_dirty: state.is_dirty,
                is_saving: state.saving.is_some(),
            })
            .collect()
    }

    pub fn field(&self, id: SettingId) -> Option<DirtyField> {
        self.fields().into_iter().find(|field| field.record_id == id)
    }

    pub fn field_type(&self, id: SettingId) -> Option<SettingFieldType> {
        self.fields.get(&id).map(|state| state.field_type)
    }

    pub fn apply(&mut self, event: FormEvent) -> Result<Vec<Effect>, DashboardError> {
        match event {
            FormEvent::Synced(settings) => {
                for setting in &settings {
                    self.fields
                        .entry(setting.id)
                        .and_modify(|state| state.adopt_server(setting))
                        .or_insert_with(|| FieldState::from_setting(setting));
                }
                self.fields
                    .retain(|id, _| settings.iter().any(|setting| setting.id == *id));
                Ok(Vec::new())
            }
            FormEvent::Edited { id, value } => {
                let state = self
                    .fields
                    .get_mut(&id)
                    .ok_or(DashboardError::UnknownSetting(id))?;
                if !value.fits(state.field_type) {
                    return Err(DashboardError::InvalidSettingValue {
                        id,
                        reason: format!("{value:?} does not fit a {:?} field", state.field_type),
                    });
                }
                state.local = value;
                state.is_dirty = true;
                self.revisions.advance(&id);
                Ok(Vec::new())
            }
            FormEvent::SaveRequested { id } => {
                let state = self
                    .fields
                    .get_mut(&id)
                    .ok_or(DashboardError::UnknownSetting(id))?;
                if !state.is_dirty {
                    return Ok(Vec::new());
                }
                let revision = self.revisions.advance(&id);
                let value = state.local.to_wire(state.field_type);
                state.saving = Some(MutationIntent::new(revision, state.local.clone()));
                Ok(vec![Effect::SaveSetting {
                    id,
                    revision,
                    value,
                }])
            }
            FormEvent::SaveSettled {
                id,
                revision,
                result,
            } => Ok(self.settle(id, revision, result)),
        }
    }

    fn settle(
        &mut self,
        id: SettingId,
        revision: Revision,
        result: Result<InsiderSetting, ClientError>,
    ) -> Vec<Effect> {
        let current = self.revisions.is_current(&id, revision);
        let Some(state) = self.fields.get_mut(&id) else {
            return Vec::new();
        };
        let settles_in_flight = state
            .saving
            .as_ref()
            .is_some_and(|intent| intent.revision == revision);
        let intent = if settles_in_flight {
            state.saving.take()
        } else {
            None
        };

        if !current {
            if let Ok(setting) = &result {
                state.server = setting.value.clone();
            }
            debug!(setting = %id, revision = revision.0, "form: save superseded by newer edit");
            return Vec::new();
        }

        match result {
            Ok(setting) => {
                state.is_dirty = false;
                state.adopt_server(&setting);
                vec![Effect::Refetch(Resource::Settings)]
            }
            Err(err) => {
                if let Some(intent) = intent {
                    state.local = intent.rollback;
                }
                state.is_dirty = true;
                warn!(setting = %id, %err, "form: save failed; keeping local edit");
                vec![Effect::Surface(FailureIndicator::new(
                    FailureScope::Setting(id),
                    &err,
                ))]
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/dirty_form_tests.rs"]
mod tests;
