use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::utils::{messages_to_claude_spec, messages_to_openai_spec, split_system_prompt};
use crate::errors::CompletionResult;
use crate::models::llm::{BackendFamily, DeploymentMap, Llm};
use crate::models::message::{Message, Role};

pub const ANTHROPIC_VERSION: &str = "bedrock-2023-05-31";
pub const MAX_TOKENS: u32 = 4096;
pub const TEMPERATURE: f32 = 0.0;
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(600);
pub const JSON_CONTENT_TYPE: &str = "application/json";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub stream: bool,
    pub temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip)]
    pub timeout: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceEncoding {
    Base64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageSource {
    #[serde(rename = "type")]
    pub encoding: SourceEncoding,
    pub media_type: String,
    pub data: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClaudeContentBlock {
    Text { text: String },
    Image { source: ImageSource },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClaudeContent {
    Text(String),
    Blocks(Vec<ClaudeContentBlock>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaudeMessage {
    pub role: Role,
    pub content: ClaudeContent,
}

impl ClaudeMessage {
    pub fn text<S: Into<String>>(role: Role, text: S) -> Self {
        Self {
            role,
            content: ClaudeContent::Text(text.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaudeRequestBody {
    pub anthropic_version: String,
    pub max_tokens: u32,
    pub messages: Vec<ClaudeMessage>,
    pub temperature: f32,
    pub system: String,
}

/// A serialized invocation for the gateway-hosted backend
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayRequest {
    pub model_id: String,
    pub content_type: &'static str,
    pub accept: &'static str,
    pub body: Vec<u8>,
}

/// The request a backend family needs, built without touching the network
#[derive(Debug, Clone, PartialEq)]
pub enum BackendRequest {
    ChatCompletion(ChatCompletionRequest),
    Gateway(GatewayRequest),
}

pub fn build_chat_completion_request(messages: &[Message], model: Llm) -> ChatCompletionRequest {
    ChatCompletionRequest {
        model: model.version().to_string(),
        messages: messages_to_openai_spec(messages),
        stream: true,
        temperature: TEMPERATURE,
        max_tokens: model.caps_output_tokens().then_some(MAX_TOKENS),
        timeout: REQUEST_TIMEOUT,
    }
}

pub fn claude_body(system: String, messages: Vec<ClaudeMessage>) -> ClaudeRequestBody {
    ClaudeRequestBody {
        anthropic_version: ANTHROPIC_VERSION.to_string(),
        max_tokens: MAX_TOKENS,
        messages,
        temperature: TEMPERATURE,
        system,
    }
}

pub fn gateway_request(model_id: &str, body: &ClaudeRequestBody) -> CompletionResult<GatewayRequest> {
    Ok(GatewayRequest {
        model_id: model_id.to_string(),
        content_type: JSON_CONTENT_TYPE,
        accept: JSON_CONTENT_TYPE,
        body: serde_json::to_vec(body)?,
    })
}

/// Resolve the deployment, split out the system prompt and translate the rest.
pub fn build_gateway_request(
    messages: &[Message],
    model: Llm,
    deployments: &DeploymentMap,
) -> CompletionResult<GatewayRequest> {
    let model_id = deployments.resolve(model)?;
    let (system, rest) = split_system_prompt(messages)?;
    let body = claude_body(system, messages_to_claude_spec(rest)?);
    gateway_request(model_id, &body)
}

pub fn build_request(
    messages: &[Message],
    model: Llm,
    deployments: &DeploymentMap,
) -> CompletionResult<BackendRequest> {
    match model.family() {
        BackendFamily::ChatCompletion => Ok(BackendRequest::ChatCompletion(
            build_chat_completion_request(messages, model),
        )),
        BackendFamily::Conversational => Ok(BackendRequest::Gateway(build_gateway_request(
            messages,
            model,
            deployments,
        )?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::CompletionError;
    use serde_json::{json, Value};

    fn conversation() -> Vec<Message> {
        vec![
            Message::system("Convert this design to code"),
            Message::user()
                .with_image_url("data:image/png;base64,iVBORw0KGgo=")
                .with_text("Make a button"),
        ]
    }

    #[test]
    fn test_chat_completion_request_for_capped_model() -> anyhow::Result<()> {
        let request = build_chat_completion_request(&conversation(), Llm::Gpt4o20240513);
        let value = serde_json::to_value(&request)?;

        assert_eq!(value["model"], "gpt-4o-2024-05-13");
        assert_eq!(value["stream"], true);
        assert_eq!(value["temperature"], 0.0);
        assert_eq!(value["max_tokens"], 4096);
        assert!(value.get("timeout").is_none());
        assert_eq!(request.timeout, Duration::from_secs(600));
        // messages go out exactly as given
        assert_eq!(value["messages"], serde_json::to_value(conversation())?);
        Ok(())
    }

    #[test]
    fn test_gateway_request_body() -> anyhow::Result<()> {
        let request =
            build_gateway_request(&conversation(), Llm::Claude35Sonnet, &DeploymentMap::default())?;
        assert_eq!(request.model_id, "anthropic.claude-3-5-sonnet-20240620-v1:0");
        assert_eq!(request.content_type, "application/json");
        assert_eq!(request.accept, "application/json");

        let body: Value = serde_json::from_slice(&request.body)?;
        assert_eq!(
            body,
            json!({
                "anthropic_version": "bedrock-2023-05-31",
                "max_tokens": 4096,
                "temperature": 0.0,
                "system": "Convert this design to code",
                "messages": [{
                    "role": "user",
                    "content": [
                        {"type": "image", "source": {"type": "base64", "media_type": "image/png", "data": "iVBORw0KGgo="}},
                        {"type": "text", "text": "Make a button"}
                    ]
                }]
            })
        );
        Ok(())
    }

    #[test]
    fn test_build_request_routes_by_family() -> anyhow::Result<()> {
        let deployments = DeploymentMap::default();
        assert!(matches!(
            build_request(&conversation(), Llm::Gpt4Vision, &deployments)?,
            BackendRequest::ChatCompletion(request) if request.max_tokens == Some(4096)
        ));
        assert!(matches!(
            build_request(&conversation(), Llm::Claude3Haiku, &deployments)?,
            BackendRequest::Gateway(_)
        ));
        Ok(())
    }

    #[test]
    fn test_unmapped_model_fails_before_translation() {
        // the image url is malformed too; the mapping error must win
        let messages = vec![
            Message::system("sys"),
            Message::user().with_image_url("not a data url"),
        ];
        let err =
            build_gateway_request(&messages, Llm::Claude3Opus, &DeploymentMap::empty()).unwrap_err();
        assert!(matches!(err, CompletionError::UnmappedModel(Llm::Claude3Opus)));
    }
}
