use async_trait::async_trait;
use futures_util::stream::BoxStream;
use futures_util::{Stream, StreamExt};
use std::pin::Pin;
use std::task::{Context, Poll};

use crate::error::Result;
use crate::usage::{LlmUsage, UsageCell};

/// Response from a non-streaming inference call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LlmResponse {
    pub text: String,
    pub usage: LlmUsage,
}

/// Uniform client contract every vendor adapter implements
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Run one prompt to completion and return the full text with its usage.
    ///
    /// Also records the usage as [`LlmClient::last_usage`].
    async fn inference(&self, model_id: &str, prompt: &str) -> Result<LlmResponse>;

    /// Start a streamed inference.
    ///
    /// Request-level failures (auth, bad status) are returned here; failures
    /// after the first byte surface as stream items.
    async fn inference_stream(&self, model_id: &str, prompt: &str) -> Result<InferenceStream>;

    /// Liveness probe. None of the supported vendors has a cheap health
    /// endpoint, so this does not touch the network.
    async fn test_connection(&self) -> Result<bool> {
        Ok(true)
    }

    /// Usage of the most recently finished call on this adapter.
    ///
    /// Best effort only: concurrent calls overwrite each other. Prefer
    /// [`LlmResponse::usage`] or [`InferenceStream::usage`].
    fn last_usage(&self) -> LlmUsage;

    /// Get the provider name for display
    fn name(&self) -> &'static str;
}

/// Prompts are sent without surrounding whitespace
pub(crate) fn prepare_prompt(prompt: &str) -> &str {
    prompt.trim()
}

/// Lazily pulled sequence of text fragments from one streamed inference.
///
/// Every item is a non-empty increment, in the order the vendor sent it.
/// Usage seen on the wire is tallied as the stream is consumed and published
/// to the adapter's last-usage slot once, when the stream ends: after the
/// final fragment, after an error, or when it is dropped early.
pub struct InferenceStream {
    fragments: BoxStream<'static, Result<String>>,
    tally: UsageCell,
    publish_to: Option<UsageCell>,
    provider: &'static str,
}

impl InferenceStream {
    pub(crate) fn new<S>(
        provider: &'static str,
        fragments: S,
        tally: UsageCell,
        publish_to: UsageCell,
    ) -> Self
    where
        S: Stream<Item = Result<String>> + Send + 'static,
    {
        Self {
            fragments: fragments.boxed(),
            tally,
            publish_to: Some(publish_to),
            provider,
        }
    }

    /// Usage observed so far by this stream alone
    pub fn usage(&self) -> LlmUsage {
        self.tally.get()
    }

    /// Drain the stream, returning the joined text and the final usage
    pub async fn collect_text(mut self) -> Result<(String, LlmUsage)> {
        let mut text = String::new();
        while let Some(fragment) = self.next().await {
            text.push_str(&fragment?);
        }
        Ok((text, self.usage()))
    }

    fn finalize(&mut self) {
        if let Some(target) = self.publish_to.take() {
            let usage = self.tally.get();
            log::debug!(
                "{} stream finished: prompt_tokens={} completion_tokens={}",
                self.provider,
                usage.prompt_tokens,
                usage.completion_tokens
            );
            target.set(usage);
        }
    }
}

impl Stream for InferenceStream {
    type Item = Result<String>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let polled = self.fragments.poll_next_unpin(cx);
        if matches!(polled, Poll::Ready(None) | Poll::Ready(Some(Err(_)))) {
            self.finalize();
        }
        polled
    }
}

impl Drop for InferenceStream {
    fn drop(&mut self) {
        self.finalize();
    }
}

impl std::fmt::Debug for InferenceStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InferenceStream")
            .field("provider", &self.provider)
            .field("usage", &self.tally.get())
            .field("finished", &self.publish_to.is_none())
            .finish()
    }
}
