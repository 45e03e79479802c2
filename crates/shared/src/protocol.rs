use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{
    ConfigFieldType, FootprintId, IncidenceId, IncidenceStatus, IntegrationId, SettingFieldType,
    SettingId,
};

/// Number of footprints per page the backend paginator returns.
pub const FOOTPRINT_PAGE_SIZE: u32 = 50;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incidence {
    pub id: IncidenceId,
    pub title: String,
    pub status: IncidenceStatus,
    pub occurrence_count: u64,
    #[serde(default)]
    pub users_affected: u64,
    pub last_seen: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_seen: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncidenceDetail {
    #[serde(flatten)]
    pub summary: Incidence,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackFrame {
    pub file: String,
    pub line: u32,
    pub function: String,
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub is_user_code: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Footprint {
    pub id: FootprintId,
    pub request_id: String,
    pub request_path: String,
    pub request_method: String,
    pub status_code: u16,
    #[serde(default)]
    pub response_time: Option<f64>,
    #[serde(default)]
    pub request_user: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_headers: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_body: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_body: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_logs: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_query_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub incidence: Option<IncidenceId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack_trace: Option<Vec<StackFrame>>,
    #[serde(default)]
    pub is_slow: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FootprintPage {
    pub count: u64,
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default)]
    pub previous: Option<String>,
    pub results: Vec<Footprint>,
}

impl FootprintPage {
    pub fn page_count(&self) -> u64 {
        self.count.div_ceil(u64::from(FOOTPRINT_PAGE_SIZE))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Velocity {
    pub total_24h: u64,
    pub errors_500: u64,
    pub errors_400: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VelocityPoint {
    pub time: String,
    pub errors: u64,
    pub requests: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Health {
    pub avg_response_time_ms: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceRisk {
    pub id: FootprintId,
    pub path: String,
    pub method: String,
    pub db_query_count: u32,
    pub avg_duration: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardStats {
    pub velocity: Velocity,
    #[serde(default)]
    pub velocity_series: Vec<VelocityPoint>,
    pub health: Health,
    #[serde(default)]
    pub top_offenders: Vec<Incidence>,
    #[serde(default)]
    pub performance_risks: Vec<PerformanceRisk>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsiderSetting {
    pub id: SettingId,
    pub key: String,
    pub value: serde_json::Value,
    pub field_type: SettingFieldType,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigKey {
    pub key: String,
    pub label: String,
    /// Stored as text server-side; PASSWORD values arrive masked.
    #[serde(default)]
    pub value: Option<String>,
    pub field_type: ConfigFieldType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub help_text: Option<String>,
    #[serde(default)]
    pub is_required: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Integration {
    pub identifier: IntegrationId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub logo_url: Option<String>,
    pub is_active: bool,
    #[serde(default)]
    pub order: i64,
    #[serde(default)]
    pub config_keys: Vec<ConfigKey>,
}

/// Scalar config values: integration config maps carry strings, flags and numbers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Flag(bool),
    Number(i64),
    Text(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkIdsRequest {
    pub ids: Vec<IncidenceId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToggleIntegrationRequest {
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReorderRequest {
    pub order: Vec<IntegrationId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateSettingRequest {
    pub value: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveIntegrationConfigRequest {
    pub config: BTreeMap<String, ConfigValue>,
}
