//! Keyed read cache shared by every controller.
//!
//! The store is the only owner of server-confirmed data. Entries are never
//! patched in place: a refetch replaces the whole payload. Each fetch takes a
//! ticket when it starts; invalidating a key raises its watermark so a fetch
//! that started before the invalidation cannot land afterwards.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use shared::{
    domain::IncidenceFilter,
    protocol::{DashboardStats, FootprintPage, Incidence, InsiderSetting, Integration},
};
use tokio::sync::{broadcast, Mutex};
use tracing::debug;

use crate::{error::ClientError, transport::InsiderApi};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    Incidences,
    Integrations,
    Settings,
    Footprints,
    DashboardStats,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub resource: Resource,
    pub filter: IncidenceFilter,
    pub page: u32,
}

impl CacheKey {
    pub fn incidences(filter: IncidenceFilter, page: u32) -> Self {
        Self {
            resource: Resource::Incidences,
            filter,
            page,
        }
    }

    pub fn integrations() -> Self {
        Self::unscoped(Resource::Integrations)
    }

    pub fn settings() -> Self {
        Self::unscoped(Resource::Settings)
    }

    pub fn footprints(page: u32) -> Self {
        Self {
            resource: Resource::Footprints,
            filter: IncidenceFilter::All,
            page,
        }
    }

    pub fn dashboard_stats() -> Self {
        Self::unscoped(Resource::DashboardStats)
    }

    fn unscoped(resource: Resource) -> Self {
        Self {
            resource,
            filter: IncidenceFilter::All,
            page: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CachePayload {
    Incidences(Vec<Incidence>),
    Integrations(Vec<Integration>),
    Settings(Vec<InsiderSetting>),
    Footprints(FootprintPage),
    DashboardStats(DashboardStats),
}

impl CachePayload {
    pub fn as_incidences(&self) -> Option<&[Incidence]> {
        match self {
            CachePayload::Incidences(rows) => Some(rows),
            _ => None,
        }
    }

    pub fn as_integrations(&self) -> Option<&[Integration]> {
        match self {
            CachePayload::Integrations(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_settings(&self) -> Option<&[InsiderSetting]> {
        match self {
            CachePayload::Settings(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_footprints(&self) -> Option<&FootprintPage> {
        match self {
            CachePayload::Footprints(page) => Some(page),
            _ => None,
        }
    }

    pub fn as_dashboard_stats(&self) -> Option<&DashboardStats> {
        match self {
            CachePayload::DashboardStats(stats) => Some(stats),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: CacheKey,
    pub data: Arc<CachePayload>,
    pub is_stale: bool,
    /// Ticket of the fetch that produced this payload.
    pub generation: u64,
}

#[derive(Debug, Clone)]
pub enum FetchOutcome {
    Stored(CacheEntry),
    /// The key was invalidated (or refetched) after this fetch started. The
    /// payload is returned to the caller but was not written to the cache.
    Superseded(Arc<CachePayload>),
}

impl FetchOutcome {
    pub fn payload(&self) -> Arc<CachePayload> {
        match self {
            FetchOutcome::Stored(entry) => Arc::clone(&entry.data),
            FetchOutcome::Superseded(data) => Arc::clone(data),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheUpdate {
    pub key: CacheKey,
    pub generation: u64,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<CacheKey, CacheEntry>,
    in_flight: HashMap<CacheKey, u64>,
    invalidated_at: HashMap<CacheKey, u64>,
    next_ticket: u64,
}

pub struct CacheStore {
    api: Arc<dyn InsiderApi>,
    state: Mutex<CacheState>,
    updates: broadcast::Sender<CacheUpdate>,
}

impl CacheStore {
    pub fn new(api: Arc<dyn InsiderApi>) -> Arc<Self> {
        let (updates, _) = broadcast::channel(256);
        Arc::new(Self {
            api,
            state: Mutex::new(CacheState::default()),
            updates,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CacheUpdate> {
        self.updates.subscribe()
    }

    pub async fn peek(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.state.lock().await.entries.get(key).cloned()
    }

    pub async fn is_fetching(&self, key: &CacheKey) -> bool {
        self.state.lock().await.in_flight.contains_key(key)
    }

    /// Returns fresh cached data, fetching on a miss or when the entry is stale.
    pub async fn read(&self, key: &CacheKey) -> Result<Arc<CachePayload>, ClientError> {
        if let Some(entry) = self.peek(key).await {
            if !entry.is_stale {
                return Ok(entry.data);
            }
        }
        Ok(self.fetch(key).await?.payload())
    }

    /// Always goes to the server. A failed fetch leaves any previous entry in place.
    pub async fn fetch(&self, key: &CacheKey) -> Result<FetchOutcome, ClientError> {
        let ticket = {
            let mut guard = self.state.lock().await;
            guard.next_ticket += 1;
            let ticket = guard.next_ticket;
            guard.in_flight.insert(*key, ticket);
            ticket
        };

        let result = self.load(key).await;

        let mut guard = self.state.lock().await;
        if guard.in_flight.get(key) == Some(&ticket) {
            guard.in_flight.remove(key);
        }
        let payload = Arc::new(result?);

        let invalidated_after_start = guard
            .invalidated_at
            .get(key)
            .is_some_and(|watermark| ticket < *watermark);
        let newer_already_stored = guard
            .entries
            .get(key)
            .is_some_and(|entry| entry.generation > ticket);
        if invalidated_after_start || newer_already_stored {
            debug!(?key, ticket, "cache: discarding superseded fetch");
            return Ok(FetchOutcome::Superseded(payload));
        }

        let entry = CacheEntry {
            key: *key,
            data: payload,
            is_stale: false,
            generation: ticket,
        };
        guard.entries.insert(*key, entry.clone());
        drop(guard);

        let _ = self.updates.send(CacheUpdate {
            key: *key,
            generation: ticket,
        });
        Ok(FetchOutcome::Stored(entry))
    }

    /// Marks every entry of `resource` stale and dooms fetches already in flight
    /// for it. Returns the number of keys affected.
    pub async fn invalidate(&self, resource: Resource) -> usize {
        let mut guard = self.state.lock().await;
        let watermark = guard.next_ticket + 1;
        let keys: HashSet<CacheKey> = guard
            .entries
            .keys()
            .chain(guard.in_flight.keys())
            .filter(|key| key.resource == resource)
            .copied()
            .collect();

        for key in &keys {
            guard.invalidated_at.insert(*key, watermark);
            if let Some(entry) = guard.entries.get_mut(key) {
                entry.is_stale = true;
            }
        }
        debug!(?resource, keys = keys.len(), "cache: invalidated");
        keys.len()
    }

    /// Invalidate-then-refetch of one key: the only write path mutations use.
    pub async fn invalidate_and_refetch(
        &self,
        key: &CacheKey,
    ) -> Result<FetchOutcome, ClientError> {
        self.invalidate(key.resource).await;
        self.fetch(key).await
    }

    pub async fn clear(&self) {
        let mut guard = self.state.lock().await;
        let watermark = guard.next_ticket + 1;
        let in_flight: Vec<CacheKey> = guard.in_flight.keys().copied().collect();
        guard.entries.clear();
        guard.invalidated_at.clear();
        for key in in_flight {
            guard.invalidated_at.insert(key, watermark);
        }
    }

    async fn load(&self, key: &CacheKey) -> Result<CachePayload, ClientError> {
        debug!(?key, "cache: fetching");
        Ok(match key.resource {
            Resource::Incidences => CachePayload::Incidences(
                self.api.list_incidences(key.filter, key.page).await?,
            ),
            Resource::Integrations => {
                CachePayload::Integrations(self.api.list_integrations().await?)
            }
            Resource::Settings => CachePayload::Settings(self.api.list_settings().await?),
            Resource::Footprints => {
                CachePayload::Footprints(self.api.list_footprints(key.page).await?)
            }
            Resource::DashboardStats => {
                CachePayload::DashboardStats(self.api.dashboard_stats().await?)
            }
        })
    }
}

#[cfg(test)]
#[path = "tests/cache_tests.rs"]
mod tests;
