//! Anthropic API provider
//!
//! Direct HTTP implementation for the Anthropic Messages API.

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::http;
use crate::credentials::{AnthropicCredentials, ProxySettings, non_blank};
use crate::error::{LlmError, Result};
use crate::provider::{InferenceStream, LlmClient, LlmResponse, prepare_prompt};
use crate::sse::{self, ChunkUpdate};
use crate::usage::{LlmUsage, UsageCell, UsageFields, extract_usage};

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 1024;
const TEMPERATURE: f32 = 0.3;

/// Client for the Anthropic Messages API
pub struct AnthropicClient {
    api_key: String,
    base_url: String,
    client: Client,
    last_usage: UsageCell,
}

impl AnthropicClient {
    /// Create a new Anthropic client
    pub fn new(api_key: impl Into<String>, proxy: &ProxySettings) -> Result<Self> {
        Ok(Self {
            api_key: api_key.into(),
            base_url: ANTHROPIC_API_URL.to_string(),
            client: http::client_with_proxies(proxy)?,
            last_usage: UsageCell::default(),
        })
    }

    pub fn from_credentials(credentials: &AnthropicCredentials) -> Result<Self> {
        let client = Self::new(credentials.api_key.clone(), &credentials.proxy)?;
        Ok(match non_blank(&credentials.base_url) {
            Some(base_url) => client.with_base_url(base_url),
            None => client,
        })
    }

    /// Point the client at a different API host
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    async fn send(&self, model_id: &str, prompt: &str, stream: bool) -> Result<Response> {
        let request = MessagesRequest {
            model: model_id,
            max_tokens: MAX_TOKENS,
            temperature: TEMPERATURE,
            messages: [Message {
                role: "user",
                content: prepare_prompt(prompt),
            }],
            stream,
        };
        let url = format!("{}/v1/messages", self.base_url);
        log::debug!(
            "Anthropic request: model={} stream={} url={}",
            model_id,
            stream,
            url
        );

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request)
            .send()
            .await?;

        http::check_status(response).await
    }
}

// Anthropic API request/response types

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    messages: [Message<'a>; 1],
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    #[serde(default)]
    usage: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: Option<String>,
}

impl MessagesResponse {
    fn into_response(self) -> LlmResponse {
        let text = self
            .content
            .into_iter()
            .next()
            .and_then(|block| block.text)
            .unwrap_or_default();

        LlmResponse {
            text,
            usage: extract_usage(self.usage.as_ref(), UsageFields::ANTHROPIC),
        }
    }
}

/// Read one streaming event.
///
/// Only `content_block_delta` events carry text. Usage shows up on
/// `message_start` (nested in `message`) and on `message_delta`.
fn read_chunk(event: &Value) -> Result<ChunkUpdate> {
    let kind = event.get("type").and_then(Value::as_str).unwrap_or_default();

    if kind == "error" {
        let message = event
            .pointer("/error/message")
            .and_then(Value::as_str)
            .unwrap_or("stream error")
            .to_string();
        log::warn!("Anthropic stream error event: {}", message);
        return Err(LlmError::ApiError {
            message,
            status_code: None,
        });
    }

    let mut usage = LlmUsage::default();
    usage.absorb(extract_usage(
        event.pointer("/message/usage"),
        UsageFields::ANTHROPIC,
    ));
    usage.absorb(extract_usage(event.get("usage"), UsageFields::ANTHROPIC));

    let text = if kind == "content_block_delta" {
        event
            .pointer("/delta/text")
            .and_then(Value::as_str)
            .map(str::to_string)
    } else {
        None
    };

    Ok(ChunkUpdate { text, usage })
}

#[async_trait]
impl LlmClient for AnthropicClient {
    async fn inference(&self, model_id: &str, prompt: &str) -> Result<LlmResponse> {
        let response = self.send(model_id, prompt, false).await?;
        let response = http::read_json::<MessagesResponse>(self.name(), response)
            .await?
            .into_response();

        self.last_usage.set(response.usage);
        Ok(response)
    }

    async fn inference_stream(&self, model_id: &str, prompt: &str) -> Result<InferenceStream> {
        let response = self.send(model_id, prompt, true).await?;
        let tally = UsageCell::default();
        let fragments =
            sse::text_fragments(self.name(), response.bytes_stream(), tally.clone(), read_chunk);

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
        "Anthropic API"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_shape() {
        let request = MessagesRequest {
            model: "claude-sonnet-4-5",
            max_tokens: MAX_TOKENS,
            temperature: TEMPERATURE,
            messages: [Message {
                role: "user",
                content: prepare_prompt("  hi  "),
            }],
            stream: false,
        };
        let body = serde_json::to_value(&request).unwrap();
        assert_eq!(body["max_tokens"], 1024);
        assert_eq!(body["messages"][0], json!({"role": "user", "content": "hi"}));
        assert!(body.get("stream").is_none());
        assert!((body["temperature"].as_f64().unwrap() - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_response_uses_first_block() {
        let response: MessagesResponse = serde_json::from_value(json!({
            "content": [{"type": "text", "text": "first"}, {"type": "text", "text": "second"}],
            "usage": {"input_tokens": 10, "output_tokens": 3}
        }))
        .unwrap();
        let response = response.into_response();
        assert_eq!(response.text, "first");
        assert_eq!(response.usage, LlmUsage::new(10, 3));
    }

    #[test]
    fn test_response_without_text_is_empty() {
        let response: MessagesResponse =
            serde_json::from_value(json!({"content": [], "usage": null})).unwrap();
        let response = response.into_response();
        assert_eq!(response.text, "");
        assert!(response.usage.is_empty());

        let response: MessagesResponse =
            serde_json::from_value(json!({"content": [{"type": "tool_use"}]})).unwrap();
        assert_eq!(response.into_response().text, "");
    }

    #[test]
    fn test_missing_content_is_malformed() {
        assert!(serde_json::from_value::<MessagesResponse>(json!({"usage": {}})).is_err());
    }

    #[test]
    fn test_read_chunk_events() {
        let start = read_chunk(&json!({
            "type": "message_start",
            "message": {"usage": {"input_tokens": 5, "output_tokens": 1}}
        }))
        .unwrap();
        assert_eq!(start.text, None);
        assert_eq!(start.usage, LlmUsage::new(5, 1));

        let delta = read_chunk(&json!({
            "type": "content_block_delta",
            "delta": {"type": "text_delta", "text": "Hel"}
        }))
        .unwrap();
        assert_eq!(delta.text.as_deref(), Some("Hel"));
        assert!(delta.usage.is_empty());

        let end = read_chunk(&json!({
            "type": "message_delta",
            "delta": {"stop_reason": "end_turn"},
            "usage": {"output_tokens": 2}
        }))
        .unwrap();
        assert_eq!(end.text, None);
        assert_eq!(end.usage, LlmUsage::new(0, 2));

        let ping = read_chunk(&json!({"type": "ping"})).unwrap();
        assert_eq!(ping, ChunkUpdate::default());
    }

    #[test]
    fn test_read_chunk_error_event() {
        let err = read_chunk(&json!({
            "type": "error",
            "error": {"type": "overloaded_error", "message": "Overloaded"}
        }))
        .unwrap_err();
        assert!(matches!(err, LlmError::ApiError { ref message, status_code: None } if message == "Overloaded"));
    }
}
