//! Configuration loading.
//!
//! Values come from `config.toml` (explicit path or the user config dir),
//! then environment variables override them.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub client: ClientConfig,
}

/// Hosted database and identity provider (one project URL serves both).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub url: Option<String>,

    /// Public key sent by the terminal client.
    #[serde(default)]
    pub anon_key: Option<String>,

    /// Privileged key used by `serve` to read any user's rows.
    #[serde(default)]
    pub service_key: Option<String>,

    #[serde(default = "default_table")]
    pub table: String,
}

fn default_table() -> String {
    "tasks".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: None,
            anon_key: None,
            service_key: None,
            table: default_table(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Full URL of a `/task-insights` endpoint; insights are computed locally when unset.
    #[serde(default)]
    pub insights_url: Option<String>,
}

impl Config {
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("taskdeck").join("config.toml"))
    }

    /// Reads `path` (or the default location) and applies the process environment.
    pub fn load(path: Option<&Path>) -> Result<Config> {
        let mut config = match path {
            Some(path) => Config::from_file(path)?,
            None => match Config::default_path() {
                Some(path) if path.exists() => Config::from_file(&path)?,
                _ => Config::default(),
            },
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Config> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Applies overrides from `lookup`; blank values are ignored.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(url) = get("SUPABASE_URL") {
            self.store.url = Some(url);
        }
        if let Some(key) = get("SUPABASE_ANON_KEY") {
            self.store.anon_key = Some(key);
        }
        if let Some(key) = get("SUPABASE_SERVICE_ROLE_KEY") {
            self.store.service_key = Some(key);
        }
        if let Some(bind) = get("TASKDECK_BIND") {
            self.server.bind = bind;
        }
        if let Some(url) = get("TASKDECK_INSIGHTS_URL") {
            self.client.insights_url = Some(url);
        }
    }

    pub fn store_url(&self) -> Result<&str> {
        self.store
            .url
            .as_deref()
            .ok_or_else(|| missing("store.url", "SUPABASE_URL"))
    }

    pub fn anon_key(&self) -> Result<&str> {
        self.store
            .anon_key
            .as_deref()
            .ok_or_else(|| missing("store.anon_key", "SUPABASE_ANON_KEY"))
    }

    pub fn service_key(&self) -> Result<&str> {
        self.store
            .service_key
            .as_deref()
            .ok_or_else(|| missing("store.service_key", "SUPABASE_SERVICE_ROLE_KEY"))
    }
}

fn missing(field: &str, env: &str) -> Error {
    Error::InvalidConfig(format!("{} is not set (config file or {})", field, env))
}
