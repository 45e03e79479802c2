use std::sync::Arc;

use futures::future::{join_all, BoxFuture, FutureExt};
use shared::{
    domain::{FootprintId, IncidenceFilter, IncidenceId, IntegrationId, SettingId, TransitionKind},
    protocol::{
        DashboardStats, Footprint, FootprintPage, Incidence, IncidenceDetail, InsiderSetting,
        Integration,
    },
};
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

pub mod bulk;
pub mod cache;
pub mod config;
pub mod config_draft;
pub mod dirty_form;
pub mod error;
pub mod filter_gate;
pub mod mutation;
pub mod ordered;
pub mod revision;
pub mod selection;
pub mod toggle;
pub mod transport;

#[cfg(test)]
#[path = "tests/support.rs"]
pub(crate) mod test_support;

pub use cache::{CacheKey, CachePayload, CacheStore, Resource};
pub use config::{load_settings, ClientSettings};
pub use config_draft::ConfigDraft;
pub use dirty_form::{DirtyField, DraftValue};
pub use error::{ClientError, DashboardError, ReorderError};
pub use filter_gate::Affordances;
pub use mutation::{FailureIndicator, FailureScope};
pub use ordered::CollectionItem;
pub use transport::{HttpTransport, InsiderApi};

use bulk::{BulkEvent, BulkTransitionController};
use cache::FetchOutcome;
use dirty_form::{DirtyFormController, FormEvent};
use filter_gate::FilterGate;
use mutation::Effect;
use ordered::{collection_from_integrations, OrderEvent, OrderedCollectionController};
use selection::SelectionController;
use toggle::{ToggleController, ToggleEvent};

/// Result of a user action that an affordance can refuse.
#[must_use]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch<T = ()> {
    Accepted(T),
    /// The affordance was disabled; nothing changed and nothing was sent.
    Disabled,
}

impl<T> Dispatch<T> {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Dispatch::Accepted(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    IntegrationsChanged,
    IncidencesChanged,
    SelectionChanged,
    SettingsChanged,
    FailureSurfaced(FailureIndicator),
    FailureDismissed(FailureScope),
}

/// Incidence rows as rendered. `dimmed` is set while a filter or page change
/// is loading over rows that were already shown.
#[derive(Debug, Clone, PartialEq)]
pub struct IncidenceView {
    pub rows: Vec<Incidence>,
    pub dimmed: bool,
    pub is_initial_load: bool,
}

#[derive(Default)]
struct DashboardState {
    ordered: OrderedCollectionController,
    toggles: ToggleController,
    selection: SelectionController,
    gate: FilterGate,
    bulk: BulkTransitionController,
    form: DirtyFormController,
    rows: Vec<Incidence>,
    failures: Vec<FailureIndicator>,
}

impl DashboardState {
    fn sync_integrations(&mut self, integrations: &[Integration]) {
        let states = integrations
            .iter()
            .map(|integration| (integration.identifier.clone(), integration.is_active))
            .collect();
        self.toggles.apply(ToggleEvent::Synced(states));
        if let Err(err) = self
            .ordered
            .apply(OrderEvent::Synced(collection_from_integrations(integrations)))
        {
            warn!(%err, "dashboard: failed to sync pipeline order");
        }
    }

    fn sync_settings(&mut self, settings: &[InsiderSetting]) {
        if let Err(err) = self.form.apply(FormEvent::Synced(settings.to_vec())) {
            warn!(%err, "dashboard: failed to sync settings");
        }
    }

    fn projected_integrations(&self) -> Vec<CollectionItem> {
        let mut items = self.ordered.items().to_vec();
        self.toggles.project(&mut items);
        items
    }

    fn show_rows(&mut self, rows: Vec<Incidence>) {
        self.selection
            .set_visible(rows.iter().map(|row| row.id).collect());
        self.rows = rows;
    }

    fn surface(&mut self, indicator: FailureIndicator) {
        self.failures.retain(|existing| existing.scope != indicator.scope);
        self.failures.push(indicator);
    }
}

/// Owns every controller and runs their effects against the shared cache.
///
/// Controllers never await. Mutations are spawned as tasks tracked here so
/// callers can wait for every outstanding one with [`Dashboard::settle`]. On
/// success the affected resource is invalidated before the controller sees the
/// result, so no refetch started earlier can land after the mutation.
pub struct Dashboard {
    api: Arc<dyn InsiderApi>,
    cache: Arc<CacheStore>,
    inner: Mutex<DashboardState>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    events: broadcast::Sender<ClientEvent>,
}

impl Dashboard {
    pub fn new(api: Arc<dyn InsiderApi>, cache: Arc<CacheStore>) -> Arc<Self> {
        let (events, _) = broadcast::channel(1024);
        Arc::new(Self {
            api,
            cache,
            inner: Mutex::new(DashboardState::default()),
            tasks: Mutex::new(Vec::new()),
            events,
        })
    }

    pub fn from_settings(settings: &ClientSettings) -> Result<Arc<Self>, ClientError> {
        let api: Arc<dyn InsiderApi> = Arc::new(HttpTransport::from_settings(settings)?);
        let cache = CacheStore::new(Arc::clone(&api));
        Ok(Self::new(api, cache))
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    pub fn cache(&self) -> &Arc<CacheStore> {
        &self.cache
    }

    /// Aborts outstanding mutations and empties the cache.
    pub async fn shutdown(&self) {
        let handles = std::mem::take(&mut *self.tasks.lock().await);
        for handle in &handles {
            handle.abort();
        }
        self.cache.clear().await;
        info!(aborted = handles.len(), "dashboard: shut down");
    }

    /// Waits until no mutation task is outstanding, including follow-up
    /// persists and refetches spawned while waiting.
    pub async fn settle(&self) {
        loop {
            let handles = std::mem::take(&mut *self.tasks.lock().await);
            if handles.is_empty() {
                return;
            }
            for joined in join_all(handles).await {
                if let Err(err) = joined {
                    warn!(%err, "dashboard: mutation task did not complete");
                }
            }
        }
    }

    // Integrations

    pub async fn load_integrations(&self) -> Result<Vec<CollectionItem>, ClientError> {
        let payload = self.cache.read(&CacheKey::integrations()).await?;
        let integrations = payload.as_integrations().unwrap_or_default();
        let items = {
            let mut state = self.inner.lock().await;
            state.sync_integrations(integrations);
            state.projected_integrations()
        };
        self.emit(ClientEvent::IntegrationsChanged);
        Ok(items)
    }

    /// Pipeline order with pending activation flips applied.
    pub async fn integrations(&self) -> Vec<CollectionItem> {
        self.inner.lock().await.projected_integrations()
    }

    pub async fn reorder_integration(
        self: &Arc<Self>,
        from: usize,
        to: usize,
    ) -> Result<Dispatch, DashboardError> {
        let effects = {
            let mut state = self.inner.lock().await;
            if !state.gate.affordances().reorder {
                return Ok(Dispatch::Disabled);
            }
            state.ordered.apply(OrderEvent::Moved { from, to })?
        };
        info!(from, to, "dashboard: pipeline reordered");
        self.emit(ClientEvent::IntegrationsChanged);
        self.run_effects(effects).await;
        Ok(Dispatch::Accepted(()))
    }

    /// Flips `id` optimistically. Accepted carries the state now displayed.
    pub async fn toggle_integration(
        self: &Arc<Self>,
        id: &IntegrationId,
    ) -> Result<Dispatch<bool>, DashboardError> {
        let (effects, displayed) = {
            let mut state = self.inner.lock().await;
            if !state.gate.affordances().toggle {
                return Ok(Dispatch::Disabled);
            }
            if state.toggles.displayed(id).is_none() {
                return Err(DashboardError::UnknownIntegration(id.clone()));
            }
            let effects = state.toggles.apply(ToggleEvent::Requested { id: id.clone() });
            (effects, state.toggles.displayed(id).unwrap_or_default())
        };
        info!(integration = %id, is_active = displayed, "dashboard: toggle requested");
        self.emit(ClientEvent::IntegrationsChanged);
        self.run_effects(effects).await;
        Ok(Dispatch::Accepted(displayed))
    }

    /// Saves an integration's configuration. Not optimistic: the form keeps the
    /// draft and the cached integration only changes through the refetch.
    pub async fn save_integration_config(
        &self,
        draft: &ConfigDraft,
    ) -> Result<Integration, DashboardError> {
        let id = &draft.identifier;
        match self.api.save_integration_config(id, draft.values()).await {
            Ok(integration) => {
                info!(integration = %id, "dashboard: integration config saved");
                self.refetch(Resource::Integrations).await;
                Ok(integration)
            }
            Err(err) => {
                warn!(integration = %id, %err, "dashboard: integration config save failed");
                self.surface(FailureIndicator::new(
                    FailureScope::Integration(id.clone()),
                    &err,
                ))
                .await;
                Err(err.into())
            }
        }
    }

    // Incidences

    pub async fn set_filter(
        &self,
        filter: IncidenceFilter,
    ) -> Result<Vec<Incidence>, ClientError> {
        let changed = {
            let mut state = self.inner.lock().await;
            let changed = state.gate.set_filter(filter);
            if changed {
                state.selection.clear();
            }
            changed
        };
        if changed {
            debug!(filter = filter.as_query(), "dashboard: filter changed");
            self.emit(ClientEvent::SelectionChanged);
        }
        self.load_incidences(false).await
    }

    pub async fn set_page(&self, page: u32) -> Result<Vec<Incidence>, ClientError> {
        self.inner.lock().await.gate.set_page(page);
        self.load_incidences(false).await
    }

    /// Forces a fetch of the active filter and page.
    pub async fn refresh_incidences(&self) -> Result<Vec<Incidence>, ClientError> {
        self.load_incidences(true).await
    }

    pub async fn incidences(&self) -> IncidenceView {
        let state = self.inner.lock().await;
        IncidenceView {
            rows: state.rows.clone(),
            dimmed: state.gate.is_filter_loading(),
            is_initial_load: state.gate.is_initial_load(),
        }
    }

    pub async fn filter(&self) -> IncidenceFilter {
        self.inner.lock().await.gate.filter()
    }

    pub async fn affordances(&self) -> Affordances {
        self.inner.lock().await.gate.affordances()
    }

    async fn load_incidences(&self, force: bool) -> Result<Vec<Incidence>, ClientError> {
        let (key, ticket) = {
            let mut state = self.inner.lock().await;
            (state.gate.active_key(), state.gate.fetch_started())
        };
        let result = if force {
            self.cache.fetch(&key).await.map(|outcome| outcome.payload())
        } else {
            self.cache.read(&key).await
        };

        let mut state = self.inner.lock().await;
        let latest = state.gate.fetch_settled(ticket, result.is_ok());
        let rows = result?
            .as_incidences()
            .map(<[Incidence]>::to_vec)
            .unwrap_or_default();
        if latest {
            state.show_rows(rows.clone());
            drop(state);
            self.emit(ClientEvent::IncidencesChanged);
        } else {
            debug!(?key, ticket, "dashboard: rows from an older fetch not shown");
        }
        Ok(rows)
    }

    // Selection

    /// Selects every loaded row. Accepted carries the selection size.
    pub async fn select_all(&self) -> Dispatch<usize> {
        let selected = {
            let mut state = self.inner.lock().await;
            if !state.gate.affordances().select {
                return Dispatch::Disabled;
            }
            let visible = state.selection.visible().to_vec();
            state.selection.select_all(&visible);
            state.selection.len()
        };
        self.emit(ClientEvent::SelectionChanged);
        Dispatch::Accepted(selected)
    }

    pub async fn toggle_selected(&self, id: IncidenceId) -> Dispatch<bool> {
        let selected = {
            let mut state = self.inner.lock().await;
            if !state.gate.affordances().select {
                return Dispatch::Disabled;
            }
            state.selection.toggle_one(id)
        };
        self.emit(ClientEvent::SelectionChanged);
        Dispatch::Accepted(selected)
    }

    pub async fn clear_selection(&self) {
        self.inner.lock().await.selection.clear();
        self.emit(ClientEvent::SelectionChanged);
    }

    pub async fn selection(&self) -> Vec<IncidenceId> {
        self.inner.lock().await.selection.selected_ids()
    }

    /// Applies `kind` to the current selection. Accepted carries the number of
    /// ids sent; zero when the selection was empty or a batch is already running.
    pub async fn bulk_transition(self: &Arc<Self>, kind: TransitionKind) -> Dispatch<usize> {
        let (effects, sent) = {
            let mut state = self.inner.lock().await;
            if !state.gate.affordances().bulk {
                return Dispatch::Disabled;
            }
            let ids = state.selection.selected_ids();
            let effects = state.bulk.apply(BulkEvent::Requested {
                kind,
                ids: ids.clone(),
            });
            let sent = if effects.is_empty() { 0 } else { ids.len() };
            (effects, sent)
        };
        if sent > 0 {
            info!(?kind, ids = sent, "dashboard: bulk transition requested");
        }
        self.run_effects(effects).await;
        Dispatch::Accepted(sent)
    }

    // Settings

    pub async fn load_settings(&self) -> Result<Vec<DirtyField>, ClientError> {
        let payload = self.cache.read(&CacheKey::settings()).await?;
        let fields = {
            let mut state = self.inner.lock().await;
            state.sync_settings(payload.as_settings().unwrap_or_default());
            state.form.fields()
        };
        self.emit(ClientEvent::SettingsChanged);
        Ok(fields)
    }

    pub async fn settings(&self) -> Vec<DirtyField> {
        self.inner.lock().await.form.fields()
    }

    pub async fn edit_setting(&self, id: SettingId, value: DraftValue) -> Result<(), DashboardError> {
        self.inner
            .lock()
            .await
            .form
            .apply(FormEvent::Edited { id, value })?;
        self.emit(ClientEvent::SettingsChanged);
        Ok(())
    }

    /// Parses raw operator input for the field's type, then edits it.
    pub async fn edit_setting_input(&self, id: SettingId, raw: &str) -> Result<(), DashboardError> {
        let field_type = self
            .inner
            .lock()
            .await
            .form
            .field_type(id)
            .ok_or(DashboardError::UnknownSetting(id))?;
        let value = DraftValue::parse_input(field_type, raw)
            .map_err(|reason| DashboardError::InvalidSettingValue { id, reason })?;
        self.edit_setting(id, value).await
    }

    pub async fn save_setting(self: &Arc<Self>, id: SettingId) -> Result<(), DashboardError> {
        let effects = self
            .inner
            .lock()
            .await
            .form
            .apply(FormEvent::SaveRequested { id })?;
        if !effects.is_empty() {
            info!(setting = %id, "dashboard: setting save requested");
            self.emit(ClientEvent::SettingsChanged);
        }
        self.run_effects(effects).await;
        Ok(())
    }

    // Failures

    pub async fn failures(&self) -> Vec<FailureIndicator> {
        self.inner.lock().await.failures.clone()
    }

    pub async fn dismiss_failure(&self, scope: &FailureScope) -> bool {
        let removed = {
            let mut state = self.inner.lock().await;
            let before = state.failures.len();
            state.failures.retain(|failure| &failure.scope != scope);
            state.failures.len() != before
        };
        if removed {
            self.emit(ClientEvent::FailureDismissed(scope.clone()));
        }
        removed
    }

    // Read-only views

    pub async fn dashboard_stats(&self) -> Result<DashboardStats, ClientError> {
        let payload = self.cache.read(&CacheKey::dashboard_stats()).await?;
        payload
            .as_dashboard_stats()
            .cloned()
            .ok_or_else(|| unexpected_payload(Resource::DashboardStats))
    }

    pub async fn footprints_page(&self, page: u32) -> Result<FootprintPage, ClientError> {
        let payload = self.cache.read(&CacheKey::footprints(page.max(1))).await?;
        payload
            .as_footprints()
            .cloned()
            .ok_or_else(|| unexpected_payload(Resource::Footprints))
    }

    pub async fn incidence_detail(&self, id: IncidenceId) -> Result<IncidenceDetail, ClientError> {
        self.api.incidence_detail(id).await
    }

    pub async fn incidence_footprints(&self, id: IncidenceId) -> Result<Vec<Footprint>, ClientError> {
        self.api.incidence_footprints(id).await
    }

    pub async fn footprint(&self, id: FootprintId) -> Result<Footprint, ClientError> {
        self.api.footprint(id).await
    }

    pub async fn footprint_breadcrumbs(&self, id: FootprintId) -> Result<Vec<Footprint>, ClientError> {
        self.api.footprint_breadcrumbs(id).await
    }

    // Effects

    fn run_effects(self: &Arc<Self>, effects: Vec<Effect>) -> BoxFuture<'static, ()> {
        let dashboard = Arc::clone(self);
        async move {
            for effect in effects {
                dashboard.run_effect(effect).await;
            }
        }
        .boxed()
    }

    async fn run_effect(self: &Arc<Self>, effect: Effect) {
        match effect {
            Effect::PersistOrder { revision, order } => {
                let dashboard = Arc::clone(self);
                self.spawn_mutation(async move {
                    let result = dashboard.api.reorder_integrations(&order).await;
                    if result.is_ok() {
                        dashboard.cache.invalidate(Resource::Integrations).await;
                    }
                    let follow_up = {
                        let mut state = dashboard.inner.lock().await;
                        state
                            .ordered
                            .apply(OrderEvent::PersistSettled { revision, result })
                    };
                    match follow_up {
                        Ok(effects) => {
                            dashboard.emit(ClientEvent::IntegrationsChanged);
                            dashboard.run_effects(effects).await;
                        }
                        Err(err) => warn!(%err, "dashboard: order settlement rejected"),
                    }
                })
                .await;
            }
            Effect::SendToggle {
                id,
                revision,
                is_active,
            } => {
                let dashboard = Arc::clone(self);
                self.spawn_mutation(async move {
                    let result = dashboard
                        .api
                        .toggle_integration(&id, is_active)
                        .await
                        .map(|integration| integration.is_active);
                    if result.is_ok() {
                        dashboard.cache.invalidate(Resource::Integrations).await;
                    }
                    let follow_up = dashboard.inner.lock().await.toggles.apply(ToggleEvent::Settled {
                        id,
                        revision,
                        result,
                    });
                    dashboard.emit(ClientEvent::IntegrationsChanged);
                    dashboard.run_effects(follow_up).await;
                })
                .await;
            }
            Effect::SendBulk { kind, ids } => {
                let dashboard = Arc::clone(self);
                self.spawn_mutation(async move {
                    let result = dashboard.api.bulk_transition(kind, &ids).await;
                    if result.is_ok() {
                        dashboard.cache.invalidate(Resource::Incidences).await;
                    }
                    let follow_up = dashboard
                        .inner
                        .lock()
                        .await
                        .bulk
                        .apply(BulkEvent::Settled { result });
                    dashboard.run_effects(follow_up).await;
                })
                .await;
            }
            Effect::SaveSetting {
                id,
                revision,
                value,
            } => {
                let dashboard = Arc::clone(self);
                self.spawn_mutation(async move {
                    let result = dashboard.api.update_setting(id, value).await;
                    if result.is_ok() {
                        dashboard.cache.invalidate(Resource::Settings).await;
                    }
                    let follow_up = dashboard.inner.lock().await.form.apply(FormEvent::SaveSettled {
                        id,
                        revision,
                        result,
                    });
                    match follow_up {
                        Ok(effects) => {
                            dashboard.emit(ClientEvent::SettingsChanged);
                            dashboard.run_effects(effects).await;
                        }
                        Err(err) => warn!(%err, "dashboard: setting settlement rejected"),
                    }
                })
                .await;
            }
            Effect::ClearSelection => self.clear_selection().await,
            Effect::Refetch(resource) => self.refetch(resource).await,
            Effect::Surface(indicator) => self.surface(indicator).await,
        }
    }

    async fn spawn_mutation<F>(&self, task: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(task);
        self.tasks.lock().await.push(handle);
    }

    /// Reloads `resource` after invalidating it and pushes the result into the
    /// controllers. A superseded fetch is dropped; the newer one will follow.
    async fn refetch(&self, resource: Resource) {
        let result = match resource {
            Resource::Incidences => {
                self.cache.invalidate(resource).await;
                self.refresh_incidences().await.map(drop)
            }
            Resource::Integrations => {
                match self.cache.invalidate_and_refetch(&CacheKey::integrations()).await {
                    Ok(FetchOutcome::Stored(entry)) => {
                        let integrations = entry.data.as_integrations().unwrap_or_default();
                        self.inner.lock().await.sync_integrations(integrations);
                        self.emit(ClientEvent::IntegrationsChanged);
                        Ok(())
                    }
                    Ok(FetchOutcome::Superseded(_)) => Ok(()),
                    Err(err) => Err(err),
                }
            }
            Resource::Settings => {
                match self.cache.invalidate_and_refetch(&CacheKey::settings()).await {
                    Ok(FetchOutcome::Stored(entry)) => {
                        let settings = entry.data.as_settings().unwrap_or_default();
                        self.inner.lock().await.sync_settings(settings);
                        self.emit(ClientEvent::SettingsChanged);
                        Ok(())
                    }
                    Ok(FetchOutcome::Superseded(_)) => Ok(()),
                    Err(err) => Err(err),
                }
            }
            Resource::Footprints | Resource::DashboardStats => {
                self.cache.invalidate(resource).await;
                Ok(())
            }
        };
        if let Err(err) = result {
            warn!(?resource, %err, "dashboard: refetch failed");
        }
    }

    async fn surface(&self, indicator: FailureIndicator) {
        self.inner.lock().await.surface(indicator.clone());
        self.emit(ClientEvent::FailureSurfaced(indicator));
    }

    fn emit(&self, event: ClientEvent) {
        let _ = self.events.send(event);
    }
}

fn unexpected_payload(resource: Resource) -> ClientError {
    ClientError::Decode(format!("cache returned a mismatched payload for {resource:?}"))
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
