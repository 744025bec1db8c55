//! Server-sent events decoding
//!
//! All four vendors stream over SSE. Only the `data:` payloads matter to the
//! adapters; event names, ids and comments are dropped here.

use async_stream::try_stream;
use eventsource_stream::{EventStreamError, Eventsource};
use futures_util::{Stream, StreamExt};
use serde_json::Value;

use crate::error::{LlmError, Result};
use crate::usage::{LlmUsage, UsageCell};

/// Sentinel payload some vendors send after the last chunk
const DONE: &str = "[DONE]";

/// Decode an HTTP body into its SSE `data:` payloads, in arrival order.
///
/// Ends at the body's end or at a `[DONE]` payload, whichever comes first.
/// Transport failures surface as [`LlmError::Transport`].
pub(crate) fn data_payloads<S, B>(body: S) -> impl Stream<Item = Result<String>> + Send + 'static
where
    S: Stream<Item = reqwest::Result<B>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
{
    try_stream! {
        let mut events = Box::pin(body.eventsource());

        while let Some(event) = events.next().await {
            let event = event.map_err(|e| match e {
                EventStreamError::Transport(e) => LlmError::Transport(e),
                other => LlmError::MalformedResponse(format!("Unreadable event stream: {}", other)),
            })?;
            if event.data == DONE {
                break;
            }
            if !event.data.is_empty() {
                yield event.data;
            }
        }
    }
}

/// What one decoded stream chunk contributes
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct ChunkUpdate {
    pub(crate) text: Option<String>,
    pub(crate) usage: LlmUsage,
}

/// Turn an SSE body into text fragments.
///
/// Each payload is decoded as JSON and handed to `read_chunk`; its usage is
/// folded into `tally` and its text, when non-empty, is yielded.
pub(crate) fn text_fragments<S, B>(
    provider: &'static str,
    body: S,
    tally: UsageCell,
    read_chunk: fn(&Value) -> Result<ChunkUpdate>,
) -> impl Stream<Item = Result<String>> + Send + 'static
where
    S: Stream<Item = reqwest::Result<B>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
{
    try_stream! {
        let mut payloads = Box::pin(data_payloads(body));

        while let Some(payload) = payloads.next().await {
            let payload = payload?;
            log::trace!("{} chunk: {}", provider, payload);

            let chunk: Value = serde_json::from_str(&payload).map_err(|e| {
                LlmError::MalformedResponse(format!("{} sent an unreadable chunk: {}", provider, e))
            })?;
            let update = read_chunk(&chunk)?;
            tally.absorb(update.usage);

            if let Some(text) = update.text.filter(|t| !t.is_empty()) {
                yield text;
            }
        }
    }
}
