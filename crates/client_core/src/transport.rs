//! REST transport for the Insider API.
//!
//! [`InsiderApi`] is the seam every controller effect is executed through. The
//! production implementation is [`HttpTransport`]; tests substitute scripted
//! implementations to force specific settlement orders.

use std::{collections::BTreeMap, time::Duration};

use async_trait::async_trait;
use reqwest::{Client, Method, Response};
use serde::{de::DeserializeOwned, Serialize};
use shared::{
    domain::{FootprintId, IncidenceFilter, IncidenceId, IntegrationId, SettingId, TransitionKind},
    protocol::{
        BulkIdsRequest, ConfigValue, DashboardStats, Footprint, FootprintPage, Incidence,
        IncidenceDetail, InsiderSetting, Integration, ReorderRequest,
        SaveIntegrationConfigRequest, ToggleIntegrationRequest, UpdateSettingRequest,
    },
};
use tokio::sync::RwLock;
use tracing::{debug, warn};
use url::Url;

use crate::{config::ClientSettings, error::ClientError};

pub const CSRF_HEADER: &str = "X-CSRFToken";

pub type ApiResult<T> = std::result::Result<T, ClientError>;

#[async_trait]
pub trait InsiderApi: Send + Sync {
    /// `page` is 1-based. The first page is requested without a `page` parameter.
    async fn list_incidences(
        &self,
        filter: IncidenceFilter,
        page: u32,
    ) -> ApiResult<Vec<Incidence>>;
    async fn incidence_detail(&self, id: IncidenceId) -> ApiResult<IncidenceDetail>;
    async fn incidence_footprints(&self, id: IncidenceId) -> ApiResult<Vec<Footprint>>;
    async fn bulk_transition(&self, kind: TransitionKind, ids: &[IncidenceId]) -> ApiResult<()>;
    async fn list_footprints(&self, page: u32) -> ApiResult<FootprintPage>;
    async fn footprint(&self, id: FootprintId) -> ApiResult<Footprint>;
    async fn footprint_breadcrumbs(&self, id: FootprintId) -> ApiResult<Vec<Footprint>>;
    async fn dashboard_stats(&self) -> ApiResult<DashboardStats>;
    async fn list_integrations(&self) -> ApiResult<Vec<Integration>>;
    async fn toggle_integration(&self, id: &IntegrationId, is_active: bool)
        -> ApiResult<Integration>;
    async fn save_integration_config(
        &self,
        id: &IntegrationId,
        config: &BTreeMap<String, ConfigValue>,
    ) -> ApiResult<Integration>;
    async fn reorder_integrations(&self, order: &[IntegrationId]) -> ApiResult<()>;
    async fn list_settings(&self) -> ApiResult<Vec<InsiderSetting>>;
    async fn update_setting(
        &self,
        id: SettingId,
        value: serde_json::Value,
    ) -> ApiResult<InsiderSetting>;
}

pub struct HttpTransport {
    http: Client,
    base_url: Url,
    csrf_token: RwLock<Option<String>>,
}

impl HttpTransport {
    pub fn new(base_url: &str, csrf_token: Option<String>) -> ApiResult<Self> {
        Self::with_client(Client::new(), base_url, csrf_token)
    }

    pub fn from_settings(settings: &ClientSettings) -> ApiResult<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .build()
            .map_err(|err| ClientError::Network(err.to_string()))?;
        Self::with_client(http, &settings.base_url, settings.csrf_token.clone())
    }

    fn with_client(http: Client, base_url: &str, csrf_token: Option<String>) -> ApiResult<Self> {
        let base_url = Url::parse(&with_trailing_slash(base_url))
            .map_err(|err| ClientError::InvalidUrl(format!("{base_url}: {err}")))?;
        Ok(Self {
            http,
            base_url,
            csrf_token: RwLock::new(csrf_token.filter(|token| !token.trim().is_empty())),
        })
    }

    pub async fn set_csrf_token(&self, token: Option<String>) {
        *self.csrf_token.write().await = token.filter(|token| !token.trim().is_empty());
    }

    fn endpoint(&self, path: &str) -> ApiResult<Url> {
        self.base_url
            .join(path)
            .map_err(|err| ClientError::InvalidUrl(format!("{path}: {err}")))
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> ApiResult<T> {
        let url = self.endpoint(path)?;
        debug!(%url, "insider api: GET");
        let res = self.http.get(url).query(query).send().await?;
        let res = ensure_success(res).await?;
        Ok(res.json().await?)
    }

    async fn send_mutation<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: &B,
    ) -> ApiResult<Response> {
        let token = self
            .csrf_token
            .read()
            .await
            .clone()
            .ok_or(ClientError::MissingCsrfToken)?;
        let url = self.endpoint(path)?;
        debug!(%url, %method, "insider api: mutation");
        let res = self
            .http
            .request(method, url)
            .header(CSRF_HEADER, token)
            .json(body)
            .send()
            .await?;
        ensure_success(res).await
    }

    async fn mutate_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: &B,
    ) -> ApiResult<T> {
        let res = self.send_mutation(method, path, body).await?;
        Ok(res.json().await?)
    }
}

async fn ensure_success(res: Response) -> ApiResult<Response> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }
    let body = res.text().await.unwrap_or_default();
    warn!(status = status.as_u16(), "insider api: request rejected");
    Err(ClientError::from_status(status.as_u16(), &body))
}

pub(crate) fn with_trailing_slash(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{trimmed}/")
    }
}

#[async_trait]
impl InsiderApi for HttpTransport {
    async fn list_incidences(
        &self,
        filter: IncidenceFilter,
        page: u32,
    ) -> ApiResult<Vec<Incidence>> {
        let mut query = Vec::new();
        if filter != IncidenceFilter::All {
            query.push(("filter", filter.as_query().to_string()));
        }
        if page > 1 {
            query.push(("page", page.to_string()));
        }
        self.get_json("incidences/", &query).await
    }

    async fn incidence_detail(&self, id: IncidenceId) -> ApiResult<IncidenceDetail> {
        self.get_json(&format!("incidences/{id}/"), &[]).await
    }

    async fn incidence_footprints(&self, id: IncidenceId) -> ApiResult<Vec<Footprint>> {
        self.get_json(&format!("incidences/{id}/footprints/"), &[])
            .await
    }

    async fn bulk_transition(&self, kind: TransitionKind, ids: &[IncidenceId]) -> ApiResult<()> {
        let path = match kind {
            TransitionKind::Resolve => "incidences/bulk_resolve/",
            TransitionKind::Ignore => "incidences/bulk_ignore/",
        };
        self.send_mutation(
            Method::POST,
            path,
            &BulkIdsRequest { ids: ids.to_vec() },
        )
        .await?;
        Ok(())
    }

    async fn list_footprints(&self, page: u32) -> ApiResult<FootprintPage> {
        self.get_json("footprints/", &[("page", page.max(1).to_string())])
            .await
    }

    async fn footprint(&self, id: FootprintId) -> ApiResult<Footprint> {
        self.get_json(&format!("footprints/{id}/"), &[]).await
    }

    async fn footprint_breadcrumbs(&self, id: FootprintId) -> ApiResult<Vec<Footprint>> {
        self.get_json(&format!("footprints/{id}/breadcrumbs/"), &[])
            .await
    }

    async fn dashboard_stats(&self) -> ApiResult<DashboardStats> {
        self.get_json("stats/dashboard/", &[]).await
    }

    async fn list_integrations(&self) -> ApiResult<Vec<Integration>> {
        self.get_json("integrations/", &[]).await
    }

    async fn toggle_integration(
        &self,
        id: &IntegrationId,
        is_active: bool,
    ) -> ApiResult<Integration> {
        self.mutate_json(
            Method::PATCH,
            &format!("integrations/{id}/"),
            &ToggleIntegrationRequest { is_active },
        )
        .await
    }

    async fn save_integration_config(
        &self,
        id: &IntegrationId,
        config: &BTreeMap<String, ConfigValue>,
    ) -> ApiResult<Integration> {
        self.mutate_json(
            Method::PATCH,
            &format!("integrations/{id}/"),
            &SaveIntegrationConfigRequest {
                config: config.clone(),
            },
        )
        .await
    }

    async fn reorder_integrations(&self, order: &[IntegrationId]) -> ApiResult<()> {
        self.send_mutation(
            Method::POST,
            "integrations/reorder/",
            &ReorderRequest {
                order: order.to_vec(),
            },
        )
        .await?;
        Ok(())
    }

    async fn list_settings(&self) -> ApiResult<Vec<InsiderSetting>> {
        self.get_json("settings/", &[]).await
    }

    async fn update_setting(
        &self,
        id: SettingId,
        value: serde_json::Value,
    ) -> ApiResult<InsiderSetting> {
        self.mutate_json(
            Method::PATCH,
            &format!("settings/{id}/"),
            &UpdateSettingRequest { value },
        )
        .await
    }
}

#[cfg(test)]
#[path = "tests/transport_tests.rs"]
mod tests;
