//! Scripted in-memory backend for controller and dashboard tests.
//!
//! Reads answer with the data present when the request arrived. Any endpoint
//! can be held open with [`ScriptedApi::hold`] until the test releases it, and
//! made to fail once with [`ScriptedApi::fail_next`].

use std::collections::{BTreeMap, HashMap, VecDeque};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde_json::Value;
use shared::{
    domain::{
        FootprintId, IncidenceFilter, IncidenceId, IncidenceStatus, IntegrationId,
        SettingFieldType, SettingId, TransitionKind,
    },
    protocol::{
        ConfigValue, DashboardStats, Footprint, FootprintPage, Health, Incidence,
        IncidenceDetail, InsiderSetting, Integration, Velocity,
    },
};
use tokio::sync::{oneshot, Mutex};

use crate::{
    error::ClientError,
    transport::{ApiResult, InsiderApi},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Endpoint {
    ListIncidences,
    BulkTransition,
    ListIntegrations,
    ToggleIntegration,
    ReorderIntegrations,
    SaveIntegrationConfig,
    ListSettings,
    UpdateSetting,
    ReadOnly,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Call {
    ListIncidences(IncidenceFilter, u32),
    BulkTransition(TransitionKind, Vec<IncidenceId>),
    ListIntegrations,
    ToggleIntegration(IntegrationId, bool),
    ReorderIntegrations(Vec<IntegrationId>),
    SaveIntegrationConfig(IntegrationId, BTreeMap<String, ConfigValue>),
    ListSettings,
    UpdateSetting(SettingId, Value),
    ReadOnly(&'static str),
}

impl Call {
    fn endpoint(&self) -> Endpoint {
        match self {
            Call::ListIncidences(..) => Endpoint::ListIncidences,
            Call::BulkTransition(..) => Endpoint::BulkTransition,
            Call::ListIntegrations => Endpoint::ListIntegrations,
            Call::ToggleIntegration(..) => Endpoint::ToggleIntegration,
            Call::ReorderIntegrations(_) => Endpoint::ReorderIntegrations,
            Call::SaveIntegrationConfig(..) => Endpoint::SaveIntegrationConfig,
            Call::ListSettings => Endpoint::ListSettings,
            Call::UpdateSetting(..) => Endpoint::UpdateSetting,
            Call::ReadOnly(_) => Endpoint::ReadOnly,
        }
    }
}

#[derive(Default)]
struct Script {
    incidences: Vec<Incidence>,
    incidence_page_size: Option<usize>,
    integrations: Vec<Integration>,
    settings: Vec<InsiderSetting>,
    calls: Vec<Call>,
    holds: HashMap<Endpoint, VecDeque<oneshot::Receiver<()>>>,
    failures: HashMap<Endpoint, VecDeque<ClientError>>,
}

#[derive(Default)]
pub(crate) struct ScriptedApi {
    script: Mutex<Script>,
}

impl ScriptedApi {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_incidences(mut self, rows: Vec<Incidence>) -> Self {
        self.script.get_mut().incidences = rows;
        self
    }

    /// Serves incidence lists in pages of `size` rows instead of all at once.
    pub(crate) fn with_incidence_pages(mut self, size: usize) -> Self {
        self.script.get_mut().incidence_page_size = Some(size);
        self
    }

    pub(crate) fn with_integrations(mut self, items: Vec<Integration>) -> Self {
        self.script.get_mut().integrations = items;
        self
    }

    pub(crate) fn with_settings(mut self, settings: Vec<InsiderSetting>) -> Self {
        self.script.get_mut().settings = settings;
        self
    }

    /// The next call to `endpoint` waits until the returned sender fires or is dropped.
    pub(crate) async fn hold(&self, endpoint: Endpoint) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.script
            .lock()
            .await
            .holds
            .entry(endpoint)
            .or_default()
            .push_back(rx);
        tx
    }

    pub(crate) async fn fail_next(&self, endpoint: Endpoint, err: ClientError) {
        self.script
            .lock()
            .await
            .failures
            .entry(endpoint)
            .or_default()
            .push_back(err);
    }

    pub(crate) async fn calls(&self) -> Vec<Call> {
        self.script.lock().await.calls.clone()
    }

    pub(crate) async fn count(&self, endpoint: Endpoint) -> usize {
        self.script
            .lock()
            .await
            .calls
            .iter()
            .filter(|call| call.endpoint() == endpoint)
            .count()
    }

    pub(crate) async fn set_incidence_status(&self, id: IncidenceId, status: IncidenceStatus) {
        let mut script = self.script.lock().await;
        for row in script.incidences.iter_mut().filter(|row| row.id == id) {
            row.status = status;
        }
    }

    /// Records `call`, waits out any hold, then yields a scripted failure if one is queued.
    async fn enter(&self, call: Call) -> Option<ClientError> {
        let endpoint = call.endpoint();
        let hold = {
            let mut script = self.script.lock().await;
            script.calls.push(call);
            script
                .holds
                .get_mut(&endpoint)
                .and_then(VecDeque::pop_front)
        };
        if let Some(hold) = hold {
            let _ = hold.await;
        }
        self.script
            .lock()
            .await
            .failures
            .get_mut(&endpoint)
            .and_then(VecDeque::pop_front)
    }

    async fn visible_incidences(&self, filter: IncidenceFilter, page: u32) -> Vec<Incidence> {
        let script = self.script.lock().await;
        let matching = script.incidences.iter().filter(|row| match filter {
            IncidenceFilter::All => true,
            IncidenceFilter::New => row.status == IncidenceStatus::Open,
            IncidenceFilter::Regressions => false,
        });
        match script.incidence_page_size {
            Some(size) => matching
                .skip(page.saturating_sub(1) as usize * size)
                .take(size)
                .cloned()
                .collect(),
            None => matching.cloned().collect(),
        }
    }
}

#[async_trait]
impl InsiderApi for ScriptedApi {
    async fn list_incidences(
        &self,
        filter: IncidenceFilter,
        page: u32,
    ) -> ApiResult<Vec<Incidence>> {
        let rows = self.visible_incidences(filter, page).await;
        match self.enter(Call::ListIncidences(filter, page)).await {
            Some(err) => Err(err),
            None => Ok(rows),
        }
    }

    async fn incidence_detail(&self, id: IncidenceId) -> ApiResult<IncidenceDetail> {
        if let Some(err) = self.enter(Call::ReadOnly("incidence_detail")).await {
            return Err(err);
        }
        let script = self.script.lock().await;
        script
            .incidences
            .iter()
            .find(|row| row.id == id)
            .map(|row| IncidenceDetail {
                summary: row.clone(),
                fingerprint: Some(format!("fp-{id}")),
            })
            .ok_or_else(|| not_found("incidence"))
    }

    async fn incidence_footprints(&self, _id: IncidenceId) -> ApiResult<Vec<Footprint>> {
        match self.enter(Call::ReadOnly("incidence_footprints")).await {
            Some(err) => Err(err),
            None => Ok(Vec::new()),
        }
    }

    async fn bulk_transition(&self, kind: TransitionKind, ids: &[IncidenceId]) -> ApiResult<()> {
        if let Some(err) = self.enter(Call::BulkTransition(kind, ids.to_vec())).await {
            return Err(err);
        }
        let mut script = self.script.lock().await;
        for row in script
            .incidences
            .iter_mut()
            .filter(|row| ids.contains(&row.id))
        {
            row.status = kind.target_status();
        }
        Ok(())
    }

    async fn list_footprints(&self, page: u32) -> ApiResult<FootprintPage> {
        if let Some(err) = self.enter(Call::ReadOnly("list_footprints")).await {
            return Err(err);
        }
        Ok(FootprintPage {
            count: 0,
            next: None,
            previous: (page > 1).then(|| format!("?page={}", page - 1)),
            results: Vec::new(),
        })
    }

    async fn footprint(&self, _id: FootprintId) -> ApiResult<Footprint> {
        if let Some(err) = self.enter(Call::ReadOnly("footprint")).await {
            return Err(err);
        }
        Err(not_found("footprint"))
    }

    async fn footprint_breadcrumbs(&self, _id: FootprintId) -> ApiResult<Vec<Footprint>> {
        match self.enter(Call::ReadOnly("footprint_breadcrumbs")).await {
            Some(err) => Err(err),
            None => Ok(Vec::new()),
        }
    }

    async fn dashboard_stats(&self) -> ApiResult<DashboardStats> {
        if let Some(err) = self.enter(Call::ReadOnly("dashboard_stats")).await {
            return Err(err);
        }
        let script = self.script.lock().await;
        let open = script
            .incidences
            .iter()
            .filter(|row| row.status == IncidenceStatus::Open)
            .count() as u64;
        Ok(DashboardStats {
            velocity: Velocity {
                total_24h: open,
                errors_500: open,
                errors_400: 0,
            },
            velocity_series: Vec::new(),
            health: Health {
                avg_response_time_ms: 12.5,
            },
            top_offenders: Vec::new(),
            performance_risks: Vec::new(),
        })
    }

    async fn list_integrations(&self) -> ApiResult<Vec<Integration>> {
        let items = self.script.lock().await.integrations.clone();
        match self.enter(Call::ListIntegrations).await {
            Some(err) => Err(err),
            None => Ok(items),
        }
    }

    async fn toggle_integration(
        &self,
        id: &IntegrationId,
        is_active: bool,
    ) -> ApiResult<Integration> {
        if let Some(err) = self
            .enter(Call::ToggleIntegration(id.clone(), is_active))
            .await
        {
            return Err(err);
        }
        let mut script = self.script.lock().await;
        let item = script
            .integrations
            .iter_mut()
            .find(|item| &item.identifier == id)
            .ok_or_else(|| not_found("integration"))?;
        item.is_active = is_active;
        Ok(item.clone())
    }

    async fn save_integration_config(
        &self,
        id: &IntegrationId,
        config: &BTreeMap<String, ConfigValue>,
    ) -> ApiResult<Integration> {
        if let Some(err) = self
            .enter(Call::SaveIntegrationConfig(id.clone(), config.clone()))
            .await
        {
            return Err(err);
        }
        let mut script = self.script.lock().await;
        let item = script
            .integrations
            .iter_mut()
            .find(|item| &item.identifier == id)
            .ok_or_else(|| not_found("integration"))?;
        for key in &mut item.config_keys {
            if let Some(value) = config.get(&key.key) {
                key.value = Some(match value {
                    ConfigValue::Flag(flag) => flag.to_string(),
                    ConfigValue::Number(n) => n.to_string(),
                    ConfigValue::Text(text) => text.clone(),
                });
            }
        }
        Ok(item.clone())
    }

    async fn reorder_integrations(&self, order: &[IntegrationId]) -> ApiResult<()> {
        if let Some(err) = self
            .enter(Call::ReorderIntegrations(order.to_vec()))
            .await
        {
            return Err(err);
        }
        let mut script = self.script.lock().await;
        for item in &mut script.integrations {
            if let Some(position) = order.iter().position(|id| id == &item.identifier) {
                item.order = position as i64;
            }
        }
        Ok(())
    }

    async fn list_settings(&self) -> ApiResult<Vec<InsiderSetting>> {
        let settings = self.script.lock().await.settings.clone();
        match self.enter(Call::ListSettings).await {
            Some(err) => Err(err),
            None => Ok(settings),
        }
    }

    async fn update_setting(&self, id: SettingId, value: Value) -> ApiResult<InsiderSetting> {
        if let Some(err) = self.enter(Call::UpdateSetting(id, value.clone())).await {
            return Err(err);
        }
        let mut script = self.script.lock().await;
        let setting = script
            .settings
            .iter_mut()
            .find(|setting| setting.id == id)
            .ok_or_else(|| not_found("setting"))?;
        setting.value = value;
        Ok(setting.clone())
    }
}

fn not_found(what: &str) -> ClientError {
    ClientError::Validation {
        status: 404,
        message: format!("{what} not found"),
    }
}

pub(crate) fn server_error() -> ClientError {
    ClientError::Server {
        status: 500,
        message: "internal error".into(),
    }
}

pub(crate) fn incidence(id: i64, status: IncidenceStatus) -> Incidence {
    Incidence {
        id: IncidenceId(id),
        title: format!("ZeroDivisionError #{id}"),
        status,
        occurrence_count: 3,
        users_affected: 1,
        last_seen: Utc
            .with_ymd_and_hms(2024, 5, 1, 12, 0, 0)
            .single()
            .unwrap_or_default(),
        first_seen: None,
        created_at: None,
    }
}

pub(crate) fn integration(identifier: &str, order: i64, is_active: bool) -> Integration {
    Integration {
        identifier: IntegrationId::new(identifier),
        name: identifier.to_uppercase(),
        description: format!("{identifier} notifications"),
        logo_url: None,
        is_active,
        order,
        config_keys: Vec::new(),
    }
}

pub(crate) fn setting(
    id: i64,
    key: &str,
    field_type: SettingFieldType,
    value: Value,
) -> InsiderSetting {
    InsiderSetting {
        id: SettingId(id),
        key: key.into(),
        value,
        field_type,
        description: format!("{key} setting"),
    }
}

/// Yields to spawned tasks until `endpoint` has been called `expected` times.
pub(crate) async fn wait_for_calls(api: &ScriptedApi, endpoint: Endpoint, expected: usize) {
    for _ in 0..1000 {
        if api.count(endpoint).await >= expected {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("{endpoint:?} was not called {expected} times");
}
