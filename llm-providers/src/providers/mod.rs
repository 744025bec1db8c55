//! LLM provider implementations

mod anthropic;
mod azure;
mod chat_completions;
mod google;
mod http;
pub mod mock;
mod openai;

pub use anthropic::AnthropicClient;
pub use azure::{AzureClient, azure_temperature};
pub use google::{GoogleClient, thinking_budget};
pub use mock::MockClient;
pub use openai::{OpenAiClient, openai_temperature};

use serde_json::Value;

use crate::credentials::ProviderCredentials;
use crate::error::Result;
use crate::provider::LlmClient;

/// Create a client instance from validated credentials
pub fn build_client(credentials: &ProviderCredentials) -> Result<Box<dyn LlmClient>> {
    let client: Box<dyn LlmClient> = match credentials {
        ProviderCredentials::Anthropic(c) => Box::new(AnthropicClient::from_credentials(c)?),
        ProviderCredentials::OpenAi(c) => Box::new(OpenAiClient::from_credentials(c)?),
        ProviderCredentials::Google(c) => Box::new(GoogleClient::from_credentials(c)?),
        ProviderCredentials::Azure(c) => Box::new(AzureClient::from_credentials(c)?),
    };

    log::debug!(
        "Built {} client (proxied: {})",
        client.name(),
        !credentials.proxy().is_empty()
    );
    Ok(client)
}

/// Validate raw credentials for `provider_type` and create its client
pub fn build_client_from_raw(provider_type: &str, raw: &Value) -> Result<Box<dyn LlmClient>> {
    let credentials = ProviderCredentials::validate(provider_type, raw).inspect_err(|e| {
        if e.is_validation() {
            log::warn!("Rejected {} credentials: {}", provider_type.trim(), e);
        }
    })?;
    build_client(&credentials)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LlmError;
    use serde_json::json;

    #[test]
    fn test_builds_each_provider() {
        let cases = [
            ("anthropic", json!({"api_key": "a"}), "Anthropic API"),
            ("openai", json!({"api_key": "o", "base_url": "https://llm.internal/v1"}), "OpenAI API"),
            ("google", json!({"api_key": "g", "http_proxy": "http://proxy:3128"}), "Google Gemini"),
            (
                "azure",
                json!({"api_key": "z", "endpoint_url": "https://res.openai.azure.com"}),
                "Azure OpenAI",
            ),
        ];

        for (provider_type, raw, name) in cases {
            let client = build_client_from_raw(provider_type, &raw).unwrap();
            assert_eq!(client.name(), name);
            assert!(client.last_usage().is_empty());
        }
    }

    #[test]
    fn test_validation_happens_before_construction() {
        let err = build_client_from_raw("azure", &json!({"api_key": "z"})).err().unwrap();
        assert!(matches!(err, LlmError::Validation { .. }));
        assert!(err.is_validation());

        let err = build_client_from_raw("bedrock", &json!({"api_key": "z"})).err().unwrap();
        assert!(matches!(err, LlmError::UnknownProvider(_)));
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn test_connection_stub() {
        let client = build_client_from_raw("openai", &json!({"api_key": "o"})).unwrap();
        assert!(client.test_connection().await.unwrap());
    }
}
