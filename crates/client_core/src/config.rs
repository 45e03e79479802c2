use std::{collections::HashMap, fs, path::Path};

use anyhow::Context;
use serde::Deserialize;

use crate::transport::with_trailing_slash;

pub const DEFAULT_SETTINGS_FILE: &str = "insider.toml";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ClientSettings {
    pub base_url: String,
    pub csrf_token: Option<String>,
    pub request_timeout_secs: u64,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000/insider/api/".into(),
            csrf_token: None,
            request_timeout_secs: 10,
        }
    }
}

impl ClientSettings {
    /// Applies command-line overrides on top of loaded settings, normalized the
    /// same way as file and environment values.
    pub fn with_overrides(mut self, base_url: Option<&str>, csrf_token: Option<&str>) -> Self {
        if let Some(base_url) = base_url {
            self.base_url = base_url.to_string();
        }
        if let Some(token) = csrf_token {
            self.csrf_token = Some(token.to_string());
        }
        self.normalized()
    }

    fn normalized(mut self) -> Self {
        self.base_url = with_trailing_slash(&self.base_url);
        self.csrf_token = self
            .csrf_token
            .map(|token| token.trim().to_string())
            .filter(|token| !token.is_empty());
        self
    }
}

pub fn load_settings() -> ClientSettings {
    load_settings_from(Path::new(DEFAULT_SETTINGS_FILE), |key| std::env::var(key).ok())
}

/// Layers defaults, then the optional toml file, then environment overrides.
/// An unreadable or malformed file is ignored.
pub fn load_settings_from(
    path: &Path,
    env: impl Fn(&str) -> Option<String>,
) -> ClientSettings {
    let mut settings = ClientSettings::default();

    if let Ok(raw) = fs::read_to_string(path) {
        if let Ok(file_cfg) = parse_settings_file(&raw) {
            if let Some(v) = file_cfg.get("base_url") {
                settings.base_url = v.clone();
            }
            if let Some(v) = file_cfg.get("csrf_token") {
                settings.csrf_token = Some(v.clone());
            }
            if let Some(v) = file_cfg.get("request_timeout_secs") {
                if let Ok(parsed) = v.parse::<u64>() {
                    settings.request_timeout_secs = parsed;
                }
            }
        }
    }

    if let Some(v) = env("INSIDER_BASE_URL") {
        settings.base_url = v;
    }
    if let Some(v) = env("APP__BASE_URL") {
        settings.base_url = v;
    }

    if let Some(v) = env("INSIDER_CSRF_TOKEN") {
        settings.csrf_token = Some(v);
    }
    if let Some(v) = env("APP__CSRF_TOKEN") {
        settings.csrf_token = Some(v);
    }

    if let Some(v) = env("APP__REQUEST_TIMEOUT_SECS") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.request_timeout_secs = parsed;
        }
    }

    settings.normalized()
}

/// Accepts flat `key = value` tables; numbers are kept as their text form.
fn parse_settings_file(raw: &str) -> anyhow::Result<HashMap<String, String>> {
    let table: toml::Table = toml::from_str(raw).context("failed to parse settings file")?;
    Ok(table
        .into_iter()
        .filter_map(|(key, value)| {
            let text = match value {
                toml::Value::String(s) => s,
                toml::Value::Integer(n) => n.to_string(),
                _ => return None,
            };
            Some((key, text))
        })
        .collect())
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
