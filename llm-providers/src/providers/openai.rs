//! OpenAI API provider
//!
//! Chat completions against api.openai.com or any compatible base URL.

use async_trait::async_trait;
use reqwest::{Client, Response};

use super::chat_completions::{self, ChatCompletionRequest, ChatCompletionResponse};
use super::http;
use crate::credentials::{OpenAiCredentials, ProxySettings, non_blank};
use crate::error::Result;
use crate::provider::{InferenceStream, LlmClient, LlmResponse};
use crate::sse;
use crate::usage::{LlmUsage, UsageCell};

const OPENAI_API_URL: &str = "https://api.openai.com/v1";

/// Sampling temperature for a model.
///
/// `gpt-5` only accepts the default temperature of 1.
pub fn openai_temperature(model_id: &str) -> f32 {
    if model_id == "gpt-5" { 1.0 } else { 0.3 }
}

/// Client for OpenAI chat completions
pub struct OpenAiClient {
    api_key: String,
    base_url: String,
    client: Client,
    last_usage: UsageCell,
}

impl OpenAiClient {
    pub fn new(api_key: impl Into<String>, proxy: &ProxySettings) -> Result<Self> {
        Ok(Self {
            api_key: api_key.into(),
            base_url: OPENAI_API_URL.to_string(),
            client: http::client_with_proxies(proxy)?,
            last_usage: UsageCell::default(),
        })
    }

    pub fn from_credentials(credentials: &OpenAiCredentials) -> Result<Self> {
        let client = Self::new(credentials.api_key.clone(), &credentials.proxy)?;
        Ok(match non_blank(&credentials.base_url) {
            Some(base_url) => client.with_base_url(base_url),
            None => client,
        })
    }

    /// Use an OpenAI-compatible endpoint instead of api.openai.com
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    async fn send(&self, model_id: &str, prompt: &str, stream: bool) -> Result<Response> {
        let temperature = openai_temperature(model_id);
        let request = ChatCompletionRequest::new(model_id, prompt, temperature, stream);
        let url = format!("{}/chat/completions", self.base_url);
        log::debug!(
            "OpenAI request: model={} temperature={} stream={} url={}",
            model_id,
            temperature,
            stream,
            url
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        http::check_status(response).await
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
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
        "OpenAI API"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_gpt5_temperature() {
        assert_eq!(openai_temperature("gpt-5"), 1.0);
        assert_eq!(openai_temperature("gpt-4o"), 0.3);
        // Only the exact identifier is special
        assert_eq!(openai_temperature("gpt-5-mini"), 0.3);
    }

    #[test]
    fn test_base_url_override() {
        let credentials = OpenAiCredentials {
            api_key: "sk-test".to_string(),
            base_url: Some("http://localhost:8080/v1/".to_string()),
            proxy: ProxySettings::default(),
        };
        let client = OpenAiClient::from_credentials(&credentials).unwrap();
        assert_eq!(client.base_url, "http://localhost:8080/v1");

        let client = OpenAiClient::from_credentials(&OpenAiCredentials {
            base_url: Some(" ".to_string()),
            ..credentials
        })
        .unwrap();
        assert_eq!(client.base_url, OPENAI_API_URL);
    }

    proptest! {
        #[test]
        fn temperature_is_low_unless_exactly_gpt5(model in "[a-z0-9.-]{0,16}") {
            let expected = if model == "gpt-5" { 1.0 } else { 0.3 };
            prop_assert_eq!(openai_temperature(&model), expected);
        }
    }
}
