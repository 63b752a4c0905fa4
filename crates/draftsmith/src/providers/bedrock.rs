use async_stream::stream;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::{Buf, Bytes, BytesMut};
use futures::{Stream, StreamExt};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use std::collections::HashMap;

use super::base::{EventStream, GatewayClient, GatewayEvent};
use super::request::{GatewayRequest, REQUEST_TIMEOUT};
use crate::errors::{CompletionError, CompletionResult};

pub const DEFAULT_REGION: &str = "us-east-1";

// total length, headers length, prelude crc
const PRELUDE_LEN: usize = 12;
const MESSAGE_CRC_LEN: usize = 4;
// largest frame the decoder will buffer
const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

pub struct BedrockClient {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
}

impl BedrockClient {
    pub fn new<S: Into<String>>(endpoint: S, api_key: Option<String>) -> CompletionResult<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT) // 10 minutes timeout
            .build()?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            api_key,
        })
    }

    /// Client for the public runtime endpoint of a region
    pub fn for_region(region: &str, api_key: Option<String>) -> CompletionResult<Self> {
        Self::new(runtime_endpoint(region), api_key)
    }

    async fn post(&self, request: &GatewayRequest) -> CompletionResult<Response> {
        let url = format!(
            "{}/model/{}/invoke-with-response-stream",
            self.endpoint.trim_end_matches('/'),
            urlencoding::encode(&request.model_id)
        );

        let mut builder = self
            .client
            .post(&url)
            .header("Content-Type", request.content_type)
            .header("X-Amzn-Bedrock-Accept", request.accept)
            .body(request.body.clone());
        if let Some(api_key) = &self.api_key {
            builder = builder.header("Authorization", format!("Bearer {}", api_key));
        }

        let response = builder.send().await?;

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

pub fn runtime_endpoint(region: &str) -> String {
    format!("https://bedrock-runtime.{}.amazonaws.com", region)
}

#[async_trait]
impl GatewayClient for BedrockClient {
    async fn invoke_with_response_stream(
        &self,
        request: &GatewayRequest,
    ) -> CompletionResult<Option<EventStream>> {
        tracing::debug!(model_id = %request.model_id, bytes = request.body.len(), "invoking gateway model");
        let response = self.post(request).await?;
        Ok(Some(Box::pin(decode_event_stream(response.bytes_stream()))))
    }
}

#[derive(Deserialize)]
struct EncodedPayloadPart {
    bytes: String,
}

/// Decode an `application/vnd.amazon.eventstream` body into gateway events.
///
/// Frames may be split across or packed into network chunks. Frame checksums
/// are not verified; lengths are.
pub fn decode_event_stream<S>(body: S) -> impl Stream<Item = CompletionResult<GatewayEvent>>
where
    S: Stream<Item = reqwest::Result<Bytes>> + Send + 'static,
{
    stream! {
        let mut body = Box::pin(body);
        let mut buffer = BytesMut::new();

        while let Some(chunk) = body.next().await {
            match chunk {
                Ok(chunk) => buffer.extend_from_slice(&chunk),
                Err(e) => {
                    yield Err(CompletionError::from(e));
                    return;
                }
            }
            for event in drain_frames(&mut buffer) {
                let failed = event.is_err();
                yield event;
                if failed {
                    return;
                }
            }
        }

        if !buffer.is_empty() {
            yield Err(malformed(format!(
                "event stream ended inside a frame ({} trailing bytes)",
                buffer.len()
            )));
        }
    }
}

/// Decode every complete frame in the buffer, stopping at the first error.
fn drain_frames(buffer: &mut BytesMut) -> Vec<CompletionResult<GatewayEvent>> {
    let mut events = Vec::new();
    loop {
        match Frame::split_from(buffer).and_then(|frame| frame.map(Frame::into_event).transpose())
        {
            Ok(None) => break,
            Ok(Some(Some(event))) => events.push(Ok(event)),
            Ok(Some(None)) => {}
            Err(e) => {
                events.push(Err(e));
                break;
            }
        }
    }
    events
}

struct Frame {
    headers: HashMap<String, String>,
    payload: Bytes,
}

impl Frame {
    /// Take one complete frame off the front of the buffer, if there is one.
    fn split_from(buffer: &mut BytesMut) -> CompletionResult<Option<Frame>> {
        if buffer.len() < PRELUDE_LEN {
            return Ok(None);
        }
        let mut prelude = &buffer[..8];
        let total_len = prelude.get_u32() as usize;
        let headers_len = prelude.get_u32() as usize;

        if total_len > MAX_FRAME_LEN {
            return Err(malformed(format!(
                "frame length {} exceeds the {} byte limit",
                total_len, MAX_FRAME_LEN
            )));
        }
        if total_len < PRELUDE_LEN + headers_len + MESSAGE_CRC_LEN {
            return Err(malformed(format!(
                "frame length {} cannot hold {} header bytes",
                total_len, headers_len
            )));
        }
        if buffer.len() < total_len {
            return Ok(None);
        }

        let mut frame = buffer.split_to(total_len).freeze();
        frame.advance(PRELUDE_LEN);
        let headers = parse_headers(frame.split_to(headers_len))?;
        let payload = frame.split_to(total_len - PRELUDE_LEN - headers_len - MESSAGE_CRC_LEN);

        Ok(Some(Frame { headers, payload }))
    }

    fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    fn into_event(self) -> CompletionResult<Option<GatewayEvent>> {
        match self.header(":message-type") {
            Some("event") if self.header(":event-type") == Some("chunk") => {
                let part: EncodedPayloadPart = serde_json::from_slice(&self.payload)
                    .map_err(|e| malformed(format!("invalid chunk payload: {}", e)))?;
                let bytes = STANDARD
                    .decode(part.bytes)
                    .map_err(|e| malformed(format!("chunk bytes are not base64: {}", e)))?;
                Ok(Some(GatewayEvent::chunk(bytes)))
            }
            Some("exception") | Some("error") => {
                let kind = self
                    .header(":exception-type")
                    .or_else(|| self.header(":error-code"))
                    .unwrap_or("unknown")
                    .to_string();
                let message = serde_json::from_slice::<serde_json::Value>(&self.payload)
                    .ok()
                    .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(String::from))
                    .unwrap_or_else(|| String::from_utf8_lossy(&self.payload).into_owned());
                Err(CompletionError::Backend(format!("{}: {}", kind, message)))
            }
            _ => Ok(None),
        }
    }
}

fn parse_headers(mut raw: Bytes) -> CompletionResult<HashMap<String, String>> {
    let mut headers = HashMap::new();

    while raw.has_remaining() {
        let name_len = raw.get_u8() as usize;
        let name = String::from_utf8_lossy(&take(&mut raw, name_len)?).into_owned();
        let value_type = take(&mut raw, 1)?.get_u8();

        let value = match value_type {
            // bool true, bool false
            0 | 1 => None,
            2 => skip(&mut raw, 1)?,
            3 => skip(&mut raw, 2)?,
            4 => skip(&mut raw, 4)?,
            5 | 8 => skip(&mut raw, 8)?,
            9 => skip(&mut raw, 16)?,
            6 | 7 => {
                let len = take(&mut raw, 2)?.get_u16() as usize;
                let value = take(&mut raw, len)?;
                (value_type == 7).then(|| String::from_utf8_lossy(&value).into_owned())
            }
            other => return Err(malformed(format!("unknown header value type {}", other))),
        };

        if let Some(value) = value {
            headers.insert(name, value);
        }
    }

    Ok(headers)
}

fn take(raw: &mut Bytes, len: usize) -> CompletionResult<Bytes> {
    if raw.remaining() < len {
        return Err(malformed("truncated frame header".to_string()));
    }
    Ok(raw.split_to(len))
}

fn skip(raw: &mut Bytes, len: usize) -> CompletionResult<Option<String>> {
    take(raw, len).map(|_| None)
}

fn malformed(message: String) -> CompletionError {
    CompletionError::MalformedEvent(message)
}
