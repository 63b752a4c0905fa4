use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use super::request::{ChatCompletionRequest, GatewayRequest};
use super::stream::ChatCompletionChunk;
use crate::errors::CompletionResult;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: Option<i32>,
    pub output_tokens: Option<i32>,
    pub total_tokens: Option<i32>,
}

impl Usage {
    pub fn new(
        input_tokens: Option<i32>,
        output_tokens: Option<i32>,
        total_tokens: Option<i32>,
    ) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens,
        }
    }

    /// Fill in the total from the parts when the backend did not report one
    pub fn with_computed_total(mut self) -> Self {
        if self.total_tokens.is_none() {
            self.total_tokens = match (self.input_tokens, self.output_tokens) {
                (Some(input), Some(output)) => Some(input + output),
                _ => None,
            };
        }
        self
    }
}

/// Terminal metadata reported at the end of a gateway stream
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StopInfo {
    pub stop_reason: Option<String>,
    pub stop_sequence: Option<String>,
    pub output_tokens: Option<i32>,
}

/// Receives every text delta, in order, as it is decoded.
///
/// The decoder awaits each call before reading the next wire event, so a slow
/// callback throttles the stream. Implementations should not panic.
#[async_trait]
pub trait DeltaCallback: Send + Sync {
    async fn on_delta(&self, delta: &str);
}

#[async_trait]
impl<F> DeltaCallback for F
where
    F: Fn(&str) + Send + Sync,
{
    async fn on_delta(&self, delta: &str) {
        self(delta)
    }
}

pub type ChunkStream = BoxStream<'static, CompletionResult<ChatCompletionChunk>>;
pub type EventStream = BoxStream<'static, CompletionResult<GatewayEvent>>;

/// One raw event from the gateway's response stream
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GatewayEvent {
    pub chunk: Option<PayloadPart>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PayloadPart {
    /// JSON-encoded anthropic stream event
    pub bytes: Vec<u8>,
}

impl GatewayEvent {
    pub fn chunk<B: Into<Vec<u8>>>(bytes: B) -> Self {
        Self {
            chunk: Some(PayloadPart {
                bytes: bytes.into(),
            }),
        }
    }
}

/// A client for the generic chat-completion backend
#[async_trait]
pub trait ChatCompletionClient: Send + Sync {
    /// Send the request and return the stream of completion chunks
    async fn stream_chat(&self, request: &ChatCompletionRequest) -> CompletionResult<ChunkStream>;
}

/// A client for the gateway that hosts the conversational models
#[async_trait]
pub trait GatewayClient: Send + Sync {
    /// Invoke a deployment and return its event stream; `None` when the
    /// response carried no body
    async fn invoke_with_response_stream(
        &self,
        request: &GatewayRequest,
    ) -> CompletionResult<Option<EventStream>>;
}
