use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_newtype!(IncidenceId);
id_newtype!(FootprintId);
id_newtype!(SettingId);

/// Integrations are addressed by their registry identifier (`"slack"`, `"jira"`), not a row id.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IntegrationId(pub String);

impl IntegrationId {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self(identifier.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IntegrationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IncidenceStatus {
    Open,
    Resolved,
    Ignored,
}

/// Server-side scoping of the incidence list. The wire value is the `filter` query parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidenceFilter {
    #[default]
    All,
    New,
    Regressions,
}

impl IncidenceFilter {
    pub fn as_query(self) -> &'static str {
        match self {
            IncidenceFilter::All => "",
            IncidenceFilter::New => "new",
            IncidenceFilter::Regressions => "regressions",
        }
    }

    pub fn from_query(raw: &str) -> Option<Self> {
        match raw.trim() {
            "" | "all" => Some(IncidenceFilter::All),
            "new" => Some(IncidenceFilter::New),
            "regressions" => Some(IncidenceFilter::Regressions),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionKind {
    Resolve,
    Ignore,
}

impl TransitionKind {
    /// Status every targeted incidence has once the server applied the transition.
    pub fn target_status(self) -> IncidenceStatus {
        match self {
            TransitionKind::Resolve => IncidenceStatus::Resolved,
            TransitionKind::Ignore => IncidenceStatus::Ignored,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SettingFieldType {
    Boolean,
    Integer,
    List,
    String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConfigFieldType {
    String,
    Password,
    Boolean,
    Integer,
}
