//! `config get/set/list` for config.kdl.

use super::{Output, json_of};
use crate::config::{
    CONFIG_KEYS, ConfigOverrides, ResolvedConfig, ValueSource, resolve_config,
    resolve_config_without_storage,
};
use crate::storage::Storage;
use crate::{Error, Result};
use serde::Serialize;
use std::path::Path;

#[derive(Serialize)]
pub struct ConfigValue {
    pub key: String,
    pub value: Option<String>,
    pub source: String,
}

impl Output for ConfigValue {
    fn to_json(&self) -> String {
        json_of(self)
    }

    fn to_human(&self) -> String {
        match &self.value {
            Some(v) => format!("{} = {} ({})", self.key, v, self.source),
            None => format!("{} is not set", self.key),
        }
    }
}

#[derive(Serialize)]
pub struct ConfigList {
    pub entries: Vec<ConfigValue>,
}

impl Output for ConfigList {
    fn to_json(&self) -> String {
        json_of(self)
    }

    fn to_human(&self) -> String {
        self.entries
            .iter()
            .map(Output::to_human)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Serialize)]
pub struct ConfigSetResult {
    pub key: String,
    pub value: String,
    pub scope: &'static str,
}

impl Output for ConfigSetResult {
    fn to_json(&self) -> String {
        json_of(self)
    }

    fn to_human(&self) -> String {
        format!("Set {} = {} ({})", self.key, self.value, self.scope)
    }
}

/// Resolved config for a site, or system-only when the site has no storage.
fn resolved_for(site: &Path) -> Result<ResolvedConfig> {
    match Storage::open(site) {
        Ok(storage) => resolve_config(&storage, &ConfigOverrides::default()),
        Err(Error::NotInitialized) => resolve_config_without_storage(&ConfigOverrides::default()),
        Err(e) => Err(e),
    }
}

fn entry(config: &ResolvedConfig, key: &str) -> Result<ConfigValue> {
    let (value, source): (Option<String>, Option<&ValueSource>) = match key {
        "output-format" => (
            Some(config.output_format.value.to_string()),
            Some(&config.output_format.source),
        ),
        "strict" => (
            Some(config.strict.value.to_string()),
            Some(&config.strict.source),
        ),
        "schema" => match &config.schema {
            Some(r) => (Some(r.value.display().to_string()), Some(&r.source)),
            None => (None, None),
        },
        "backend" => (
            Some(config.backend.value.to_string()),
            Some(&config.backend.source),
        ),
        "action-log" => (
            Some(config.action_log.value.to_string()),
            Some(&config.action_log.source),
        ),
        other => {
            return Err(Error::InvalidInput(format!(
                "unknown config key '{}' (expected one of: {})",
                other,
                CONFIG_KEYS.join(", ")
            )));
        }
    };
    Ok(ConfigValue {
        key: key.to_string(),
        value,
        source: source.map(ToString::to_string).unwrap_or_else(|| "unset".to_string()),
    })
}

/// Get one resolved configuration value with its source.
pub fn config_get(site: &Path, key: &str) -> Result<ConfigValue> {
    entry(&resolved_for(site)?, key)
}

/// List every configuration key with its resolved value and source.
pub fn config_list(site: &Path) -> Result<ConfigList> {
    let config = resolved_for(site)?;
    let entries = CONFIG_KEYS
        .iter()
        .map(|key| entry(&config, key))
        .collect::<Result<Vec<_>>>()?;
    Ok(ConfigList { entries })
}

/// Set a configuration value in the site's config.kdl (or the system one).
pub fn config_set(site: &Path, key: &str, value: &str, system: bool) -> Result<ConfigSetResult> {
    if system {
        let mut config = Storage::read_system_optlayer_config()?;
        config.set_key(key, value).map_err(Error::InvalidInput)?;
        Storage::write_system_optlayer_config(&config)?;
    } else {
        let storage = Storage::open(site)?;
        let mut config = storage.read_optlayer_config()?;
        config.set_key(key, value).map_err(Error::InvalidInput)?;
        storage.write_optlayer_config(&config)?;
    }
    Ok(ConfigSetResult {
        key: key.to_string(),
        value: value.to_string(),
        scope: if system { "system" } else { "session" },
    })
}
