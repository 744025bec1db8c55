//! Azure OpenAI provider
//!
//! Same chat completions payloads as OpenAI, but addressed by deployment:
//! the model identifier handed to this client is a deployment name.

use async_trait::async_trait;
use reqwest::{Client, Response};
use url::Url;

use super::chat_completions::{self, ChatCompletionRequest, ChatCompletionResponse};
use super::http;
use crate::credentials::{AzureCredentials, DEFAULT_AZURE_API_VERSION, ProxySettings};
use crate::error::{LlmError, Result};
use crate::provider::{InferenceStream, LlmClient, LlmResponse};
use crate::sse;
use crate::usage::{LlmUsage, UsageCell};

/// Sampling temperature for a deployment.
///
/// Any deployment whose name mentions `gpt-5` is run at temperature 1.
pub fn azure_temperature(deployment: &str) -> f32 {
    if deployment.contains("gpt-5") { 1.0 } else { 0.3 }
}

/// Client for an Azure OpenAI resource
pub struct AzureClient {
    api_key: String,
    endpoint: Url,
    api_version: String,
    client: Client,
    last_usage: UsageCell,
}

impl AzureClient {
    pub fn new(
        api_key: impl Into<String>,
        endpoint_url: &str,
        api_version: Option<&str>,
        proxy: &ProxySettings,
    ) -> Result<Self> {
        let endpoint = Url::parse(endpoint_url.trim()).map_err(|e| {
            LlmError::ConfigError(format!("Invalid Azure endpoint {}: {}", endpoint_url, e))
        })?;
        if endpoint.cannot_be_a_base() {
            return Err(LlmError::ConfigError(format!(
                "Invalid Azure endpoint {}",
                endpoint_url
            )));
        }

        Ok(Self {
            api_key: api_key.into(),
            endpoint,
            api_version: api_version.unwrap_or(DEFAULT_AZURE_API_VERSION).to_string(),
            client: http::client_with_proxies(proxy)?,
            last_usage: UsageCell::default(),
        })
    }

    pub fn from_credentials(credentials: &AzureCredentials) -> Result<Self> {
        Self::new(
            credentials.api_key.clone(),
            &credentials.endpoint_url,
            Some(credentials.api_version()),
            &credentials.proxy,
        )
    }

    /// `{endpoint}/openai/deployments/{deployment}/chat/completions?api-version=...`
    fn completions_url(&self, deployment: &str) -> Url {
        let mut url = self.endpoint.clone();
        url.set_query(None);
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend([
                "openai",
                "deployments",
                deployment,
                "chat",
                "completions",
            ]);
        }
        url.query_pairs_mut()
            .append_pair("api-version", &self.api_version);
        url
    }

    async fn send(&self, deployment: &str, prompt: &str, stream: bool) -> Result<Response> {
        let temperature = azure_temperature(deployment);
        let request = ChatCompletionRequest::new(deployment, prompt, temperature, stream);
        let url = self.completions_url(deployment);
        log::debug!(
            "Azure OpenAI request: deployment={} temperature={} stream={} url={}",
            deployment,
            temperature,
            stream,
            url
        );

        let response = self
            .client
            .post(url)
            .header("api-key", &self.api_key)
            .json(&request)
            .send()
            .await?;

        http::check_status(response).await
    }
}

#[async_trait]
impl LlmClient for AzureClient {
    async fn inference(&self, model_id: &str, prompt: &str) -> Result<LlmResponse> {
        let response = self.send(model_id, prompt, false).await?;
        let response = http::read_json::<ChatCompletionResponse>(self.name(), response)
            .await?
            .into_response(self.name())?;

        self.last_usage.set(response.usage);
        Ok(response)
    }

    async fn inference_stream(&self, model_id: &str, prompt: &str) -> Result<InferenceStream> {
        let response = self.send(model_id, prompt, true).await?;
        let tally = UsageCell::default();
        let fragments = sse::text_fragments(
            self.name(),
            response.bytes_stream(),
            tally.clone(),
            chat_completions::read_chunk,
        );

        Ok(InferenceStream::new(
            self.name(),
            fragments,
            tally,
            self.last_usage.clone(),
        ))
    }

    fn last_usage(&self) -> LlmUsage {
        self.last_usage.get()
    }

    fn name(&self) -> &'static str {
        "Azure OpenAI"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn client(endpoint: &str) -> AzureClient {
        AzureClient::new("key", endpoint, None, &ProxySettings::default()).unwrap()
    }

    #[test]
    fn test_completions_url() {
        let client = client("https://res.openai.azure.com/");
        assert_eq!(
            client.completions_url("gpt-4o-prod").as_str(),
            "https://res.openai.azure.com/openai/deployments/gpt-4o-prod/chat/completions?api-version=2024-10-21"
        );

        let client = AzureClient::new(
            "key",
            "https://gateway.example.com/azure",
            Some("2025-01-01-preview"),
            &ProxySettings::default(),
        )
        .unwrap();
        assert_eq!(
            client.completions_url("my deployment").as_str(),
            "https://gateway.example.com/azure/openai/deployments/my%20deployment/chat/completions?api-version=2025-01-01-preview"
        );
    }

    #[test]
    fn test_rejects_bad_endpoint() {
        let result = AzureClient::new("key", "res.openai.azure.com", None, &ProxySettings::default());
        assert!(matches!(result, Err(LlmError::ConfigError(_))));

        let result = AzureClient::new("key", "mailto:ops@example.com", None, &ProxySettings::default());
        assert!(matches!(result, Err(LlmError::ConfigError(_))));
    }

    #[test]
    fn test_gpt5_deployments() {
        assert_eq!(azure_temperature("gpt-5"), 1.0);
        assert_eq!(azure_temperature("prod-gpt-5-mini"), 1.0);
        assert_eq!(azure_temperature("gpt-4o"), 0.3);
    }

    proptest! {
        #[test]
        fn temperature_follows_substring(prefix in "[a-z0-9-]{0,8}", suffix in "[a-z0-9-]{0,8}") {
            let with = format!("{}gpt-5{}", prefix, suffix);
            prop_assert_eq!(azure_temperature(&with), 1.0);
            let without = format!("{}{}", prefix, suffix);
            let expected = if without.contains("gpt-5") { 1.0 } else { 0.3 };
            prop_assert_eq!(azure_temperature(&without), expected);
        }
    }
}
