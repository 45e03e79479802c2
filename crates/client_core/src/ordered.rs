//! Optimistic reordering of the integration pipeline.

use std::collections::BTreeMap;

use shared::{
    domain::{ConfigFieldType, IntegrationId},
    protocol::{ConfigValue, Integration},
};
use tracing::{debug, info, warn};

use crate::{
    cache::Resource,
    error::{ClientError, ReorderError},
    mutation::{Effect, FailureIndicator, FailureScope},
    revision::Revision,
};

/// One pipeline step as the dashboard renders it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionItem {
    pub identifier: IntegrationId,
    pub name: String,
    pub order_index: usize,
    pub is_active: bool,
    pub config: BTreeMap<String, ConfigValue>,
}

impl CollectionItem {
    pub fn from_integration(integration: &Integration, order_index: usize) -> Self {
        let config = integration
            .config_keys
            .iter()
            .map(|key| {
                let raw = key.value.clone().unwrap_or_default();
                let value = match key.field_type {
                    ConfigFieldType::Boolean => ConfigValue::Flag(raw == "true"),
                    ConfigFieldType::Integer => raw
                        .trim()
                        .parse::<i64>()
                        .map(ConfigValue::Number)
                        .unwrap_or(ConfigValue::Text(raw)),
                    ConfigFieldType::String | ConfigFieldType::Password => {
                        ConfigValue::Text(raw)
                    }
                };
                (key.key.clone(), value)
            })
            .collect();
        Self {
            identifier: integration.identifier.clone(),
            name: integration.name.clone(),
            order_index,
            is_active: integration.is_active,
            config,
        }
    }
}

/// Canonical collection from a server snapshot: sorted by the backend's `order`
/// (stable for ties) and re-indexed by position.
pub fn collection_from_integrations(integrations: &[Integration]) -> Vec<CollectionItem> {
    let mut sorted: Vec<&Integration> = integrations.iter().collect();
    sorted.sort_by_key(|integration| integration.order);
    sorted
        .into_iter()
        .enumerate()
        .map(|(index, integration)| CollectionItem::from_integration(integration, index))
        .collect()
}

/// Moves the item at `from` to `to` and rewrites every `order_index` to its new
/// position. Indices are purely positional, so every move touches every item.
pub fn reorder(
    items: &[CollectionItem],
    from: usize,
    to: usize,
) -> Result<Vec<CollectionItem>, ReorderError> {
    let len = items.len();
    if from >= len || to >= len {
        return Err(ReorderError::OutOfBounds { from, to, len });
    }
    let mut next = items.to_vec();
    let moved = next.remove(from);
    next.insert(to, moved);
    for (index, item) in next.iter_mut().enumerate() {
        item.order_index = index;
    }
    Ok(next)
}

#[derive(Debug, Clone)]
pub enum OrderEvent {
    Synced(Vec<CollectionItem>),
    Moved { from: usize, to: usize },
    PersistSettled {
        revision: Revision,
        result: Result<(), ClientError>,
    },
}

#[derive(Debug, Clone)]
struct InFlightOrder {
    revision: Revision,
    submitted: Vec<CollectionItem>,
}

/// At most one persist is in flight. Newer local orders wait behind it and the
/// newest one is what gets persisted next.
#[derive(Debug, Clone, Default)]
pub struct OrderedCollectionController {
    confirmed: Vec<CollectionItem>,
    local: Vec<CollectionItem>,
    revision: Revision,
    in_flight: Option<InFlightOrder>,
    pending: bool,
}

impl OrderedCollectionController {
    pub fn items(&self) -> &[CollectionItem] {
        &self.local
    }

    pub fn confirmed(&self) -> &[CollectionItem] {
        &self.confirmed
    }

    pub fn is_persisting(&self) -> bool {
        self.in_flight.is_some() || self.pending
    }

    pub fn apply(&mut self, event: OrderEvent) -> Result<Vec<Effect>, ReorderError> {
        match event {
            OrderEvent::Synced(items) => {
                self.confirmed = items;
                if !self.is_persisting() {
                    self.local = self.confirmed.clone();
                }
                Ok(Vec::new())
            }
            OrderEvent::Moved { from, to } => {
                self.local = reorder(&self.local, from, to)?;
                self.revision.0 += 1;
                if self.in_flight.is_some() {
                    debug!(revision = self.revision.0, "order: queued behind in-flight persist");
                    self.pending = true;
                    return Ok(Vec::new());
                }
                Ok(vec![self.begin_persist()])
            }
            OrderEvent::PersistSettled { revision, result } => {
                Ok(self.settle(revision, result))
            }
        }
    }

    fn begin_persist(&mut self) -> Effect {
        self.pending = false;
        self.in_flight = Some(InFlightOrder {
            revision: self.revision,
            submitted: self.local.clone(),
        });
        Effect::PersistOrder {
            revision: self.revision,
            order: self
                .local
                .iter()
                .map(|item| item.identifier.clone())
                .collect(),
        }
    }

    fn settle(&mut self, revision: Revision, result: Result<(), ClientError>) -> Vec<Effect> {
        if self.in_flight.as_ref().map(|flight| flight.revision) != Some(revision) {
            debug!(revision = revision.0, "order: ignoring unknown persist settlement");
            return Vec::new();
        }
        let Some(in_flight) = self.in_flight.take() else {
            return Vec::new();
        };
        let newest = revision == self.revision;

        match result {
            Ok(()) => {
                self.confirmed = in_flight.submitted;
                if self.pending {
                    debug!(
                        settled = revision.0,
                        current = self.revision.0,
                        "order: persisted order superseded locally"
                    );
                    return vec![self.begin_persist()];
                }
                info!(revision = revision.0, "order: pipeline order persisted");
                vec![Effect::Refetch(Resource::Integrations)]
            }
            Err(err) if !newest && self.pending => {
                debug!(
                    settled = revision.0,
                    current = self.revision.0,
                    %err,
                    "order: discarding stale persist failure"
                );
                vec![self.begin_persist()]
            }
            Err(err) => {
                warn!(revision = revision.0, %err, "order: persist failed; reverting");
                self.pending = false;
                self.local = self.confirmed.clone();
                self.revision.0 += 1;
                vec![Effect::Surface(FailureIndicator::new(
                    FailureScope::Ordering,
                    &err,
                ))]
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/ordered_tests.rs"]
mod tests;
