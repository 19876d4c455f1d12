//! Newsletter configuration loaded from TOML.
//!
//! ```toml
//! api_key = "abc123-us6"
//! default_list_name = "subscribers"
//!
//! [[lists]]
//! name = "subscribers"
//! id = "7a1b2c3d4e"
//! ```
//!
//! Lists are an array of tables so their order is the order in the file.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const API_KEY_ENV: &str = "NEWSLETTER_API_KEY";
pub const ENDPOINT_ENV: &str = "NEWSLETTER_ENDPOINT";

/// Per-call timeout used when the config does not set one.
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// One configured list: a human name and the provider's list id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListConfig {
    pub name: String,
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewsletterConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_list_name")]
    pub default_list_name: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Overrides the endpoint derived from the api key's datacenter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub lists: Vec<ListConfig>,
}

fn default_list_name() -> String {
    "subscribers".to_string()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl NewsletterConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: NewsletterConfig = toml::from_str(raw)?;
        Ok(config)
    }

    /// Read, parse, apply environment overrides and validate.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_toml_str(&raw)?;
        config.apply_env();
        config.validate()?;
        tracing::debug!(
            path = %path.display(),
            lists = config.lists.len(),
            "loaded newsletter config"
        );
        Ok(config)
    }

    /// Apply `NEWSLETTER_API_KEY` and `NEWSLETTER_ENDPOINT` from the process
    /// environment.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from any lookup; empty values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup(API_KEY_ENV).filter(|v| !v.is_empty()) {
            self.api_key = key;
        }
        if let Some(endpoint) = lookup(ENDPOINT_ENV).filter(|v| !v.is_empty()) {
            self.endpoint = Some(endpoint);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_key.trim().is_empty() {
            return Err(ConfigError::MissingApiKey);
        }
        if self.lists.is_empty() {
            return Err(ConfigError::NoLists);
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
