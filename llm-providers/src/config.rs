use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::credentials::{ProviderCredentials, ProviderType};
use crate::error::{LlmError, Result};
use crate::provider::LlmClient;
use crate::providers::build_client;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Provider record used when none is named explicitly
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_provider: Option<String>,

    /// Provider records keyed by a user-chosen name
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderRecord>,
}

/// One configured provider: its type, credentials and known models
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRecord {
    /// anthropic, openai, google or azure
    pub provider_type: String,

    /// Raw credentials, checked against the provider's shape on use
    #[serde(default)]
    pub credentials: toml::Table,

    /// Free-form provider settings, not interpreted here
    #[serde(default, skip_serializing_if = "toml::Table::is_empty")]
    pub config: toml::Table,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub models: Vec<ModelRecord>,
}

/// A model offered by a provider
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelRecord {
    /// Vendor model name, or the deployment name for Azure
    pub model_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default)]
    pub is_default: bool,

    /// Preferred model for cheap auxiliary calls
    #[serde(default)]
    pub is_small_default: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_window_tokens: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_cost_per_million_tokens_usd: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_cost_per_million_tokens_usd: Option<f64>,

    /// Free-form per-model settings, not interpreted here
    #[serde(default, skip_serializing_if = "toml::Table::is_empty")]
    pub config: toml::Table,
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from a file; a missing file is an empty config
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to the default location
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the configuration file path
    pub fn config_path() -> Result<PathBuf> {
        let home =
            std::env::var("HOME").map_err(|_| LlmError::ConfigError("HOME not set".into()))?;
        Ok(PathBuf::from(home).join(".config/llm-providers/providers.toml"))
    }

    /// Get a provider record by name
    pub fn get_provider(&self, name: &str) -> Result<&ProviderRecord> {
        self.providers
            .get(name)
            .ok_or_else(|| LlmError::InvalidProvider(name.to_string()))
    }

    /// Name of the default provider record.
    ///
    /// Falls back to the only record when exactly one is configured.
    pub fn default_provider_name(&self) -> Option<&str> {
        match &self.default_provider {
            Some(name) => Some(name.as_str()),
            None if self.providers.len() == 1 => self.providers.keys().next().map(String::as_str),
            None => None,
        }
    }

    /// Build a client for the named provider record
    pub fn build_client(&self, name: &str) -> Result<Box<dyn LlmClient>> {
        self.get_provider(name)?.build_client()
    }
}

impl ProviderRecord {
    pub fn provider_type(&self) -> Result<ProviderType> {
        self.provider_type.parse()
    }

    /// Credentials as an untyped mapping, with the API key filled in from
    /// the environment when the record leaves it out
    pub fn raw_credentials(&self) -> Result<Value> {
        self.raw_credentials_with(|var| std::env::var(var).ok())
    }

    fn raw_credentials_with(&self, env: impl Fn(&str) -> Option<String>) -> Result<Value> {
        let kind = self.provider_type()?;
        let mut raw = serde_json::to_value(&self.credentials)
            .map_err(|e| LlmError::ConfigError(format!("Unreadable credentials: {}", e)))?;

        if let Value::Object(fields) = &mut raw {
            if !fields.contains_key("api_key") {
                if let Some(key) = env(kind.env_var()) {
                    fields.insert("api_key".to_string(), Value::String(key));
                }
            }
        }
        Ok(raw)
    }

    /// Validate this record's credentials
    pub fn credentials(&self) -> Result<ProviderCredentials> {
        ProviderCredentials::validate(&self.provider_type, &self.raw_credentials()?)
    }

    pub fn build_client(&self) -> Result<Box<dyn LlmClient>> {
        build_client(&self.credentials()?)
    }

    /// The model flagged as default, else the first listed
    pub fn default_model(&self) -> Option<&ModelRecord> {
        self.models
            .iter()
            .find(|m| m.is_default)
            .or_else(|| self.models.first())
    }

    /// The model flagged as small default, else the default model
    pub fn small_default_model(&self) -> Option<&ModelRecord> {
        self.models
            .iter()
            .find(|m| m.is_small_default)
            .or_else(|| self.default_model())
    }

    pub fn get_model(&self, model_id: &str) -> Option<&ModelRecord> {
        self.models.iter().find(|m| m.model_id == model_id)
    }
}
