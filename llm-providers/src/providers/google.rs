//! Google Gemini provider
//!
//! Uses the Generative Language REST API (`generateContent` and its SSE
//! variant `streamGenerateContent?alt=sse`).

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::Serialize;
use serde_json::Value;
use url::Url;

use super::http;
use crate::credentials::{GoogleCredentials, ProxySettings};
use crate::error::{LlmError, Result};
use crate::provider::{InferenceStream, LlmClient, LlmResponse, prepare_prompt};
use crate::sse::{self, ChunkUpdate};
use crate::usage::{LlmUsage, UsageCell, UsageFields, extract_usage};

const GEMINI_API_URL: &str = "https://generativelanguage.googleapis.com";
const TEMPERATURE: f32 = 0.3;

/// Thinking budget for a model: a small one for "pro" models, none otherwise
pub fn thinking_budget(model_id: &str) -> u32 {
    if model_id.contains("pro") { 128 } else { 0 }
}

/// Client for the Gemini API
pub struct GoogleClient {
    api_key: String,
    base_url: String,
    client: Client,
    last_usage: UsageCell,
}

impl GoogleClient {
    /// Create a new Gemini client.
    ///
    /// Gemini traffic goes through a single proxy: `http_proxy` if set,
    /// otherwise `https_proxy`.
    pub fn new(api_key: impl Into<String>, proxy: &ProxySettings) -> Result<Self> {
        Ok(Self {
            api_key: api_key.into(),
            base_url: GEMINI_API_URL.to_string(),
            client: http::client_with_single_proxy(proxy)?,
            last_usage: UsageCell::default(),
        })
    }

    pub fn from_credentials(credentials: &GoogleCredentials) -> Result<Self> {
        Self::new(credentials.api_key.clone(), &credentials.proxy)
    }

    /// Point the client at a different API host
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// `{base}/v1beta/models/{model}:generateContent`, or the SSE streaming
    /// variant. The model name is a single path segment.
    fn endpoint_url(&self, model: &str, stream: bool) -> Result<Url> {
        let mut url = Url::parse(&self.base_url).map_err(|e| {
            LlmError::ConfigError(format!("Invalid Gemini base URL {}: {}", self.base_url, e))
        })?;
        let action = if stream {
            "streamGenerateContent"
        } else {
            "generateContent"
        };

        let segment = format!("{}:{}", model, action);

        url.set_query(None);
        url.path_segments_mut()
            .map_err(|_| {
                LlmError::ConfigError(format!("Invalid Gemini base URL {}", self.base_url))
            })?
            .pop_if_empty()
            .extend(["v1beta", "models", segment.as_str()]);
        if stream {
            url.query_pairs_mut().append_pair("alt", "sse");
        }
        Ok(url)
    }

    async fn send(&self, model_id: &str, prompt: &str, stream: bool) -> Result<Response> {
        let model = model_id.strip_prefix("models/").unwrap_or(model_id);
        let budget = thinking_budget(model_id);
        let request = GenerateContentRequest {
            contents: [Content {
                role: "user",
                parts: [Part {
                    text: prepare_prompt(prompt),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: TEMPERATURE,
                thinking_config: ThinkingConfig {
                    thinking_budget: budget,
                },
            },
        };

        let url = self.endpoint_url(model, stream)?;
        log::debug!(
            "Gemini request: model={} thinking_budget={} stream={} url={}",
            model,
            budget,
            stream,
            url
        );

        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await?;

        http::check_status(response).await
    }
}

// Gemini API request types

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: [Content<'a>; 1],
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'a str,
    parts: [Part<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    thinking_config: ThinkingConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ThinkingConfig {
    thinking_budget: u32,
}

/// Answer text of the first candidate, skipping thought summaries
fn candidate_text(response: &Value) -> Option<String> {
    let parts = response
        .pointer("/candidates/0/content/parts")
        .and_then(Value::as_array)?;

    let text: String = parts
        .iter()
        .filter(|part| !part.get("thought").and_then(Value::as_bool).unwrap_or(false))
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect();

    (!text.is_empty()).then_some(text)
}

fn read_response(response: &Value) -> LlmResponse {
    LlmResponse {
        text: candidate_text(response).unwrap_or_default(),
        usage: extract_usage(response.get("usageMetadata"), UsageFields::GOOGLE),
    }
}

/// Read one stream chunk; a mid-stream `error` object ends the stream
fn read_chunk(chunk: &Value) -> Result<ChunkUpdate> {
    if let Some(error) = http::stream_error("Google Gemini", chunk) {
        return Err(error);
    }

    Ok(ChunkUpdate {
        text: candidate_text(chunk),
        usage: extract_usage(chunk.get("usageMetadata"), UsageFields::GOOGLE),
    })
}

#[async_trait]
impl LlmClient for GoogleClient {
    async fn inference(&self, model_id: &str, prompt: &str) -> Result<LlmResponse> {
        let response = self.send(model_id, prompt, false).await?;
        let body: Value = http::read_json(self.name(), response).await?;
        let response = read_response(&body);

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
        "Google Gemini"
    }
}
