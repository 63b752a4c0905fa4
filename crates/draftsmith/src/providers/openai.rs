use async_trait::async_trait;
use eventsource_stream::{Event, EventStreamError, Eventsource};
use futures::StreamExt;
use reqwest::{Client, Response, StatusCode};

use super::base::{ChatCompletionClient, ChunkStream, DeltaCallback};
use super::request::{build_chat_completion_request, ChatCompletionRequest, REQUEST_TIMEOUT};
use super::stream::{collect_pass, openai_events, ChatCompletionChunk};
use crate::errors::{CompletionError, CompletionResult};
use crate::models::llm::Llm;
use crate::models::message::Message;

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

pub struct OpenAiClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl OpenAiClient {
    pub fn new<S: Into<String>>(api_key: S, base_url: Option<String>) -> CompletionResult<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT) // 10 minutes timeout
            .build()?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: base_url.unwrap_or_else(|| OPENAI_BASE_URL.to_string()),
        })
    }

    async fn post(&self, request: &ChatCompletionRequest) -> CompletionResult<Response> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .timeout(request.timeout)
            .json(request)
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => Ok(response),
            status if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() => {
                Err(CompletionError::ServerError(status.as_u16()))
            }
            status => Err(CompletionError::RequestFailed {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            }),
        }
    }
}

#[async_trait]
impl ChatCompletionClient for OpenAiClient {
    async fn stream_chat(&self, request: &ChatCompletionRequest) -> CompletionResult<ChunkStream> {
        let response = self.post(request).await?;

        let chunks = response
            .bytes_stream()
            .eventsource()
            .filter_map(|event| async move { chunk_from_event(event) });

        Ok(Box::pin(chunks))
    }
}

/// Parse one server-sent event. Keep-alives and the `[DONE]` marker yield nothing.
fn chunk_from_event(
    event: Result<Event, EventStreamError<reqwest::Error>>,
) -> Option<CompletionResult<ChatCompletionChunk>> {
    let event = match event {
        Ok(event) => event,
        Err(EventStreamError::Transport(e)) => return Some(Err(CompletionError::Transport(e))),
        Err(e) => return Some(Err(CompletionError::MalformedEvent(e.to_string()))),
    };

    let data = event.data.trim();
    if data.is_empty() || data == "[DONE]" {
        return None;
    }
    Some(serde_json::from_str(data).map_err(|e| {
        CompletionError::MalformedEvent(format!("invalid completion chunk: {}", e))
    }))
}

/// Stream a completion from the generic chat-completion backend.
pub async fn stream_openai_response(
    messages: &[Message],
    client: &dyn ChatCompletionClient,
    callback: &dyn DeltaCallback,
    model: Llm,
) -> CompletionResult<String> {
    let request = build_chat_completion_request(messages, model);
    stream_chat_completion(client, &request, callback).await
}

pub async fn stream_chat_completion(
    client: &dyn ChatCompletionClient,
    request: &ChatCompletionRequest,
    callback: &dyn DeltaCallback,
) -> CompletionResult<String> {
    tracing::debug!(model = %request.model, max_tokens = ?request.max_tokens, "streaming chat completion");

    // the chunk stream owns the connection and is dropped on every return path
    let chunks = client.stream_chat(request).await?;
    let output = collect_pass(openai_events(chunks), callback).await?;

    tracing::info!(model = %request.model, chars = output.text.len(), "chat completion finished");
    Ok(output.text)
}
