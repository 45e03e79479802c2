use shared::{
    domain::{IntegrationId, SettingId},
    error::{ApiErrorBody, FailureKind},
};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    #[error("network failure: {0}")]
    Network(String),
    #[error("request rejected with status {status}: {message}")]
    Validation { status: u16, message: String },
    #[error("server failure with status {status}: {message}")]
    Server { status: u16, message: String },
    #[error("failed to decode response body: {0}")]
    Decode(String),
    #[error("csrf token missing; mutating request was not sent")]
    MissingCsrfToken,
    #[error("invalid request url: {0}")]
    InvalidUrl(String),
}

impl ClientError {
    /// Builds the classified error for a non-success response. `body` is the raw
    /// response text; its `error`/`detail` message is preferred when present.
    pub fn from_status(status: u16, body: &str) -> Self {
        let message = serde_json::from_str::<ApiErrorBody>(body)
            .ok()
            .and_then(|parsed| parsed.message().map(str::to_string))
            .unwrap_or_else(|| body.trim().to_string());
        match FailureKind::from_status(status) {
            FailureKind::Validation => ClientError::Validation { status, message },
            _ => ClientError::Server { status, message },
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            ClientError::Network(_) => FailureKind::Network,
            ClientError::Validation { .. } => FailureKind::Validation,
            ClientError::Server { .. } | ClientError::Decode(_) => FailureKind::Server,
            ClientError::MissingCsrfToken | ClientError::InvalidUrl(_) => {
                FailureKind::Precondition
            }
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ClientError::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            ClientError::from_status(status.as_u16(), "")
        } else {
            ClientError::Network(err.to_string())
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ReorderError {
    #[error("reorder index out of bounds: from={from} to={to} len={len}")]
    OutOfBounds { from: usize, to: usize, len: usize },
}

#[derive(Debug, Error)]
pub enum DashboardError {
    #[error(transparent)]
    Reorder(#[from] ReorderError),
    #[error("unknown integration {0}")]
    UnknownIntegration(IntegrationId),
    #[error("unknown setting {0}")]
    UnknownSetting(SettingId),
    #[error("invalid value for setting {id}: {reason}")]
    InvalidSettingValue { id: SettingId, reason: String },
    #[error(transparent)]
    Client(#[from] ClientError),
}
