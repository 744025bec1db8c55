//! Mock LLM client for testing
//!
//! A scripted client that honors the full [`LlmClient`] contract without a
//! network: fixed fragments, fixed usage, optional failures.

use async_trait::async_trait;
use async_stream::try_stream;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use crate::error::{LlmError, Result};
use crate::provider::{InferenceStream, LlmClient, LlmResponse, prepare_prompt};
use crate::usage::{LlmUsage, UsageCell};

/// A mock client returning the same scripted answer for every call
pub struct MockClient {
    /// Fragments streamed in order; `inference` returns them joined
    fragments: Vec<String>,
    /// Usage reported with the last fragment
    usage: LlmUsage,
    /// Fail every call with an API error carrying this message
    fail_with: Option<String>,
    /// Fail a stream after this many fragments
    stream_fails_after: Option<usize>,
    /// Current call count
    call_count: AtomicUsize,
    /// Trimmed prompts seen so far
    prompts: Mutex<Vec<String>>,
    last_usage: UsageCell,
    /// Provider name for display
    name: &'static str,
}

impl MockClient {
    /// Create a client that always succeeds with these fragments
    pub fn always_succeeds(fragments: &[&str], usage: LlmUsage) -> Self {
        Self {
            fragments: fragments.iter().map(|f| f.to_string()).collect(),
            usage,
            fail_with: None,
            stream_fails_after: None,
            call_count: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
            last_usage: UsageCell::default(),
            name: "mock",
        }
    }

    /// Create a client whose every call fails before producing anything
    pub fn always_fails(message: &str) -> Self {
        Self {
            fail_with: Some(message.to_string()),
            ..Self::always_succeeds(&[], LlmUsage::default())
        }
    }

    /// Make streams fail after yielding `n` fragments
    pub fn stream_fails_after(mut self, n: usize) -> Self {
        self.stream_fails_after = Some(n);
        self
    }

    /// Set a custom provider name
    pub fn with_name(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }

    /// Get the number of inference calls made
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Prompts received, as they would have been sent
    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn record(&self, prompt: &str) -> Result<()> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        self.prompts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(prepare_prompt(prompt).to_string());

        match &self.fail_with {
            Some(message) => Err(mock_error(message)),
            None => Ok(()),
        }
    }
}

fn mock_error(message: &str) -> LlmError {
    LlmError::ApiError {
        message: message.to_string(),
        status_code: None,
    }
}

#[async_trait]
impl LlmClient for MockClient {
    async fn inference(&self, _model_id: &str, prompt: &str) -> Result<LlmResponse> {
        self.record(prompt)?;

        let response = LlmResponse {
            text: self.fragments.concat(),
            usage: self.usage,
        };
        self.last_usage.set(response.usage);
        Ok(response)
    }

    async fn inference_stream(&self, _model_id: &str, prompt: &str) -> Result<InferenceStream> {
        self.record(prompt)?;

        let tally = UsageCell::default();
        let chunk_tally = tally.clone();
        let fragments = self.fragments.clone();
        let last = fragments.len().saturating_sub(1);
        let fail_at = self.stream_fails_after;
        let usage = self.usage;

        let items = try_stream! {
            for (i, fragment) in fragments.into_iter().enumerate() {
                if fail_at.is_some_and(|n| i >= n) {
                    Err::<(), LlmError>(mock_error("stream interrupted"))?;
                }
                if i == last {
                    chunk_tally.absorb(usage);
                }
                yield fragment;
            }
            chunk_tally.absorb(usage);
        };

        Ok(InferenceStream::new(
            self.name,
            items,
            tally,
            self.last_usage.clone(),
        ))
    }

    fn last_usage(&self) -> LlmUsage {
        self.last_usage.get()
    }

    fn name(&self) -> &'static str {
        self.name
    }
}
