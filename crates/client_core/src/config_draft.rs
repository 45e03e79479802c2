use std::collections::BTreeMap;

use shared::{
    domain::{ConfigFieldType, IntegrationId},
    protocol::{ConfigKey, ConfigValue, Integration},
};

/// Editable copy of one integration's configuration keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigDraft {
    pub identifier: IntegrationId,
    values: BTreeMap<String, ConfigValue>,
    field_types: BTreeMap<String, ConfigFieldType>,
}

impl ConfigDraft {
    /// Boolean keys become real flags (`"true"` only); everything else is kept
    /// as text, with absent values as the empty string.
    pub fn from_integration(integration: &Integration) -> Self {
        let mut values = BTreeMap::new();
        let mut field_types = BTreeMap::new();
        for key in &integration.config_keys {
            values.insert(key.key.clone(), seed_value(key));
            field_types.insert(key.key.clone(), key.field_type);
        }
        Self {
            identifier: integration.identifier.clone(),
            values,
            field_types,
        }
    }

    pub fn values(&self) -> &BTreeMap<String, ConfigValue> {
        &self.values
    }

    pub fn get(&self, key: &str) -> Option<&ConfigValue> {
        self.values.get(key)
    }

    /// Sets `key` from raw input. Returns false for keys the integration does
    /// not declare.
    pub fn set(&mut self, key: &str, raw: &str) -> bool {
        let Some(field_type) = self.field_types.get(key).copied() else {
            return false;
        };
        let value = match field_type {
            ConfigFieldType::Boolean => ConfigValue::Flag(raw.trim() == "true"),
            _ => ConfigValue::Text(raw.to_string()),
        };
        self.values.insert(key.to_string(), value);
        true
    }
}

fn seed_value(key: &ConfigKey) -> ConfigValue {
    let raw = key.value.clone().unwrap_or_default();
    match key.field_type {
        ConfigFieldType::Boolean => ConfigValue::Flag(raw == "true"),
        _ => ConfigValue::Text(raw),
    }
}
