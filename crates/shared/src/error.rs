use serde::{Deserialize, Serialize};

/// Failure taxonomy surfaced to operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// No response reached the client.
    Network,
    /// 4xx
    Validation,
    /// 5xx, or a success body that could not be decoded.
    Server,
    /// The request was never sent because a local requirement was missing.
    Precondition,
}

impl FailureKind {
    pub fn from_status(status: u16) -> Self {
        if (400..500).contains(&status) {
            FailureKind::Validation
        } else {
            FailureKind::Server
        }
    }
}

/// Error body the backend sends with rejected requests. The viewsets use `error`,
/// the framework's own permission and parsing failures use `detail`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ApiErrorBody {
    pub fn message(&self) -> Option<&str> {
        self.error.as_deref().or(self.detail.as_deref())
    }
}
