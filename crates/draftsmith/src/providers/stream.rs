//! Normalizes backend-specific streaming events into text deltas.
//!
//! Both backends are reduced to a lazy sequence of [`StreamEvent`]s, which
//! [`collect_pass`] folds into the full text of one pass while forwarding every
//! delta to the caller. Events that carry no content are skipped; only payloads
//! that cannot be parsed at all are errors.
use futures::{Stream, StreamExt, TryStreamExt};
use serde::Deserialize;
use serde_json::Value;

use super::base::{ChunkStream, DeltaCallback, EventStream, GatewayEvent, StopInfo, Usage};
use crate::errors::{CompletionError, CompletionResult};

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ChatCompletionChunk {
    #[serde(default)]
    pub choices: Vec<ChunkChoice>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ChunkChoice {
    #[serde(default)]
    pub delta: Option<ChunkDelta>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ChunkDelta {
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Delta(String),
    Start { input_tokens: Option<i32> },
    Stop(StopInfo),
}

/// The output of one fully consumed stream
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PassOutput {
    pub text: String,
    pub usage: Usage,
    pub stop: Option<StopInfo>,
}

/// The content delta of a chunk's first choice, if it has a non-empty one
pub fn chunk_delta(chunk: &ChatCompletionChunk) -> Option<&str> {
    chunk
        .choices
        .first()
        .and_then(|choice| choice.delta.as_ref())
        .and_then(|delta| delta.content.as_deref())
        .filter(|content| !content.is_empty())
}

/// Decode one gateway event. Returns `None` for events that carry nothing we use.
pub fn decode_gateway_event(event: &GatewayEvent) -> CompletionResult<Option<StreamEvent>> {
    let Some(chunk) = &event.chunk else {
        return Ok(None);
    };
    let value: Value = serde_json::from_slice(&chunk.bytes).map_err(|e| {
        CompletionError::MalformedEvent(format!("gateway chunk is not valid JSON: {}", e))
    })?;

    let event = match value.get("type").and_then(Value::as_str) {
        Some("content_block_delta") => {
            let delta = &value["delta"];
            match (delta["type"].as_str(), delta["text"].as_str()) {
                (Some("text_delta"), Some(text)) => Some(StreamEvent::Delta(text.to_string())),
                _ => None,
            }
        }
        Some("message_start") => Some(StreamEvent::Start {
            input_tokens: as_tokens(&value["message"]["usage"]["input_tokens"]),
        }),
        Some("message_delta") => Some(StreamEvent::Stop(StopInfo {
            stop_reason: value["delta"]["stop_reason"].as_str().map(String::from),
            stop_sequence: value["delta"]["stop_sequence"].as_str().map(String::from),
            output_tokens: as_tokens(&value["usage"]["output_tokens"]),
        })),
        _ => None,
    };
    Ok(event)
}

fn as_tokens(value: &Value) -> Option<i32> {
    value.as_i64().and_then(|v| i32::try_from(v).ok())
}

/// Chat-completion chunks as stream events; chunks without content are dropped.
pub fn openai_events(chunks: ChunkStream) -> impl Stream<Item = CompletionResult<StreamEvent>> {
    chunks.filter_map(|chunk| async move {
        match chunk {
            Ok(chunk) => chunk_delta(&chunk).map(|text| Ok(StreamEvent::Delta(text.to_string()))),
            Err(e) => Some(Err(e)),
        }
    })
}

/// Gateway events as stream events; unused event types are dropped.
pub fn gateway_events(events: EventStream) -> impl Stream<Item = CompletionResult<StreamEvent>> {
    events.filter_map(|event| async move {
        event
            .and_then(|event| decode_gateway_event(&event))
            .transpose()
    })
}

/// Consume a stream of events, awaiting the callback for every delta.
pub async fn collect_pass<S>(events: S, callback: &dyn DeltaCallback) -> CompletionResult<PassOutput>
where
    S: Stream<Item = CompletionResult<StreamEvent>>,
{
    events
        .try_fold(PassOutput::default(), |mut output, event| async move {
            match event {
                StreamEvent::Delta(text) => {
                    callback.on_delta(&text).await;
                    output.text.push_str(&text);
                }
                StreamEvent::Start { input_tokens } => output.usage.input_tokens = input_tokens,
                StreamEvent::Stop(stop) => {
                    output.usage.output_tokens = stop.output_tokens;
                    output.stop = Some(stop);
                }
            }
            Ok(output)
        })
        .await
        .map(|mut output| {
            output.usage = output.usage.with_computed_total();
            output
        })
}
