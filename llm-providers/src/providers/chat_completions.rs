//! Chat completions wire format shared by OpenAI and Azure OpenAI

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::http;
use crate::error::{LlmError, Result};
use crate::provider::{LlmResponse, prepare_prompt};
use crate::sse::ChunkUpdate;
use crate::usage::{UsageFields, extract_usage};

#[derive(Debug, Serialize)]
pub(crate) struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: [Message<'a>; 1],
    temperature: f32,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream_options: Option<StreamOptions>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

/// Ask for a final usage-only chunk when streaming
#[derive(Debug, Serialize)]
struct StreamOptions {
    include_usage: bool,
}

impl<'a> ChatCompletionRequest<'a> {
    pub(crate) fn new(model: &'a str, prompt: &'a str, temperature: f32, stream: bool) -> Self {
        Self {
            model,
            messages: [Message {
                role: "user",
                content: prepare_prompt(prompt),
            }],
            temperature,
            stream,
            stream_options: stream.then_some(StreamOptions {
                include_usage: true,
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    message: Option<ResponseMessage>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

impl ChatCompletionResponse {
    pub(crate) fn into_response(self, provider: &str) -> Result<LlmResponse> {
        let choice = self.choices.into_iter().next().ok_or_else(|| {
            LlmError::MalformedResponse(format!("{} returned no choices", provider))
        })?;

        Ok(LlmResponse {
            text: choice
                .message
                .and_then(|m| m.content)
                .unwrap_or_default(),
            usage: extract_usage(self.usage.as_ref(), UsageFields::OPENAI),
        })
    }
}

/// Read one `chat.completion.chunk`.
///
/// Chunks with an empty `choices` list are heartbeats; with
/// `include_usage` the last of them carries the totals.
pub(crate) fn read_chunk(chunk: &Value) -> Result<ChunkUpdate> {
    if let Some(error) = http::stream_error("Chat completions", chunk) {
        return Err(error);
    }

    let text = chunk
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|choices| choices.first())
        .and_then(|choice| choice.pointer("/delta/content"))
        .and_then(Value::as_str)
        .map(str::to_string);

    Ok(ChunkUpdate {
        text,
        usage: extract_usage(chunk.get("usage"), UsageFields::OPENAI),
    })
}
