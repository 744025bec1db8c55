//! Uniform inference client over several LLM vendors
//!
//! One contract for all providers:
//! - Anthropic Messages API
//! - OpenAI chat completions (and compatible endpoints)
//! - Azure OpenAI deployments
//! - Google Gemini
//!
//! Raw credentials are checked with [`ProviderCredentials::validate`] and
//! turned into a client with [`build_client`].

pub mod config;
pub mod credentials;
pub mod error;
pub mod provider;
pub mod providers;
mod sse;
pub mod usage;

pub use config::{Config, ModelRecord, ProviderRecord};
pub use credentials::{
    AnthropicCredentials, AzureCredentials, DEFAULT_AZURE_API_VERSION, GoogleCredentials,
    OpenAiCredentials, ProviderCredentials, ProviderType, ProxySettings,
};
pub use error::{LlmError, Result};
pub use provider::{InferenceStream, LlmClient, LlmResponse};
pub use providers::{
    AnthropicClient, AzureClient, GoogleClient, MockClient, OpenAiClient, azure_temperature,
    build_client, build_client_from_raw, openai_temperature, thinking_budget,
};
pub use usage::{LlmUsage, UsageFields, extract_usage};
