use async_trait::async_trait;
use futures::stream;
use serde_json::{json, Value};
use std::sync::Mutex;

use crate::errors::{CompletionError, CompletionResult};
use crate::providers::base::{
    ChatCompletionClient, ChunkStream, EventStream, GatewayClient, GatewayEvent,
};
use crate::providers::request::{ChatCompletionRequest, ClaudeRequestBody, GatewayRequest};
use crate::providers::stream::ChatCompletionChunk;

/// A chat-completion client that replays pre-configured chunk sequences
pub struct MockChatClient {
    responses: Mutex<Vec<Vec<Value>>>,
    requests: Mutex<Vec<ChatCompletionRequest>>,
}

impl MockChatClient {
    /// Create a mock client with one chunk sequence per expected call
    pub fn new(responses: Vec<Vec<Value>>) -> Self {
        Self {
            responses: Mutex::new(responses),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<ChatCompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatCompletionClient for MockChatClient {
    async fn stream_chat(&self, request: &ChatCompletionRequest) -> CompletionResult<ChunkStream> {
        self.requests.lock().unwrap().push(request.clone());
        let mut responses = self.responses.lock().unwrap();
        let chunks: Vec<CompletionResult<ChatCompletionChunk>> = if responses.is_empty() {
            Vec::new()
        } else {
            responses
                .remove(0)
                .into_iter()
                .map(|value| serde_json::from_value(value).map_err(CompletionError::from))
                .collect()
        };
        Ok(Box::pin(stream::iter(chunks)))
    }
}

/// A gateway client that replays scripted event streams, one per invocation
pub struct MockGatewayClient {
    responses: Mutex<Vec<Option<Vec<CompletionResult<GatewayEvent>>>>>,
    requests: Mutex<Vec<GatewayRequest>>,
}

impl MockGatewayClient {
    pub fn new(responses: Vec<Option<Vec<CompletionResult<GatewayEvent>>>>) -> Self {
        Self {
            responses: Mutex::new(responses),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// One text response per invocation, each delta sent as its own event
    pub fn with_texts(passes: Vec<Vec<&str>>) -> Self {
        Self::new(
            passes
                .into_iter()
                .map(|deltas| Some(text_stream(&deltas)))
                .collect(),
        )
    }

    pub fn requests(&self) -> Vec<GatewayRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn bodies(&self) -> Vec<ClaudeRequestBody> {
        self.requests()
            .iter()
            .map(|request| serde_json::from_slice(&request.body).unwrap())
            .collect()
    }
}

#[async_trait]
impl GatewayClient for MockGatewayClient {
    async fn invoke_with_response_stream(
        &self,
        request: &GatewayRequest,
    ) -> CompletionResult<Option<EventStream>> {
        self.requests.lock().unwrap().push(request.clone());
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            // Return no stream if no more pre-configured responses
            return Ok(None);
        }
        Ok(responses
            .remove(0)
            .map(|events| Box::pin(stream::iter(events)) as EventStream))
    }
}

pub fn gateway_event(value: Value) -> GatewayEvent {
    GatewayEvent::chunk(serde_json::to_vec(&value).unwrap())
}

pub fn text_delta(text: &str) -> GatewayEvent {
    gateway_event(json!({
        "type": "content_block_delta",
        "index": 0,
        "delta": {"type": "text_delta", "text": text}
    }))
}

/// A realistic stream: start, block start, deltas, stop metadata
pub fn text_stream(deltas: &[&str]) -> Vec<CompletionResult<GatewayEvent>> {
    let mut events = vec![
        Ok(gateway_event(json!({
            "type": "message_start",
            "message": {"role": "assistant", "usage": {"input_tokens": 25, "output_tokens": 1}}
        }))),
        Ok(gateway_event(json!({
            "type": "content_block_start",
            "index": 0,
            "content_block": {"type": "text", "text": ""}
        }))),
    ];
    events.extend(deltas.iter().map(|text| Ok(text_delta(text))));
    events.push(Ok(gateway_event(json!({
        "type": "message_delta",
        "delta": {"stop_reason": "end_turn", "stop_sequence": null},
        "usage": {"output_tokens": deltas.len()}
    }))));
    events.push(Ok(gateway_event(json!({"type": "message_stop"}))));
    events
}
