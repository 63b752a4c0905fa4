use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use strum_macros::{EnumIter, EnumString};

use crate::errors::{CompletionError, CompletionResult};

/// Actual model versions that are sent to the backends and recorded in logs.
///
/// Each variant owns exactly one version string. Frontend names and dated
/// aliases are accepted when parsing but never produce a second variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, EnumString, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Llm {
    #[strum(serialize = "gpt-4-vision-preview", serialize = "gpt_4_vision")]
    Gpt4Vision,
    #[strum(serialize = "gpt-4-turbo-2024-04-09", serialize = "gpt_4_turbo_2024_04_09")]
    Gpt4Turbo20240409,
    #[strum(serialize = "gpt-4o-2024-05-13", serialize = "gpt_4o_2024_05_13")]
    Gpt4o20240513,
    #[strum(serialize = "claude-3-sonnet-20240229", serialize = "claude_3_sonnet")]
    Claude3Sonnet,
    #[strum(
        serialize = "claude-3-5-sonnet-20240620",
        serialize = "claude_3_5_sonnet",
        serialize = "claude_3_5_sonnet_2024_06_20"
    )]
    Claude35Sonnet,
    #[strum(serialize = "claude-3-opus-20240229", serialize = "claude_3_opus")]
    Claude3Opus,
    #[strum(serialize = "claude-3-haiku-20240307", serialize = "claude_3_haiku")]
    Claude3Haiku,
}

/// The protocol family a model is served through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendFamily {
    /// OpenAI-style chat completions with chunked deltas
    ChatCompletion,
    /// Anthropic-style messages, reached directly or through the gateway
    Conversational,
}

impl fmt::Display for BackendFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendFamily::ChatCompletion => write!(f, "chat-completion"),
            BackendFamily::Conversational => write!(f, "conversational"),
        }
    }
}

impl Llm {
    pub fn version(&self) -> &'static str {
        match self {
            Llm::Gpt4Vision => "gpt-4-vision-preview",
            Llm::Gpt4Turbo20240409 => "gpt-4-turbo-2024-04-09",
            Llm::Gpt4o20240513 => "gpt-4o-2024-05-13",
            Llm::Claude3Sonnet => "claude-3-sonnet-20240229",
            Llm::Claude35Sonnet => "claude-3-5-sonnet-20240620",
            Llm::Claude3Opus => "claude-3-opus-20240229",
            Llm::Claude3Haiku => "claude-3-haiku-20240307",
        }
    }

    pub fn family(&self) -> BackendFamily {
        match self {
            Llm::Gpt4Vision | Llm::Gpt4Turbo20240409 | Llm::Gpt4o20240513 => {
                BackendFamily::ChatCompletion
            }
            Llm::Claude3Sonnet | Llm::Claude35Sonnet | Llm::Claude3Opus | Llm::Claude3Haiku => {
                BackendFamily::Conversational
            }
        }
    }

    /// Models that were historically capped at 4096 output tokens on the
    /// chat-completion backend.
    // TODO: re-check these caps against the current vendor limits before adding new GPT snapshots
    pub fn caps_output_tokens(&self) -> bool {
        matches!(
            self,
            Llm::Gpt4Vision | Llm::Gpt4Turbo20240409 | Llm::Gpt4o20240513
        )
    }

    /// Parse a frontend model name or version string.
    pub fn from_frontend(name: &str) -> CompletionResult<Self> {
        Llm::from_str(name).map_err(|_| CompletionError::UnknownModel(name.to_string()))
    }
}

impl fmt::Display for Llm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.version())
    }
}

impl From<Llm> for String {
    fn from(model: Llm) -> Self {
        model.version().to_string()
    }
}

impl TryFrom<String> for Llm {
    type Error = CompletionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Llm::from_frontend(&value)
    }
}

/// Maps a model to the deployment id used by the gateway-hosted backend.
#[derive(Debug, Clone, PartialEq)]
pub struct DeploymentMap {
    ids: HashMap<Llm, String>,
}

impl Default for DeploymentMap {
    fn default() -> Self {
        let ids = [
            (Llm::Claude3Sonnet, "anthropic.claude-3-sonnet-20240229-v1:0"),
            (Llm::Claude35Sonnet, "anthropic.claude-3-5-sonnet-20240620-v1:0"),
            (Llm::Claude3Opus, "anthropic.claude-3-opus-20240229-v1:0"),
            (Llm::Claude3Haiku, "anthropic.claude-3-haiku-20240307-v1:0"),
        ]
        .into_iter()
        .map(|(model, id)| (model, id.to_string()))
        .collect();

        Self { ids }
    }
}

impl DeploymentMap {
    pub fn empty() -> Self {
        Self {
            ids: HashMap::new(),
        }
    }

    pub fn with_deployment<S: Into<String>>(mut self, model: Llm, deployment_id: S) -> Self {
        self.ids.insert(model, deployment_id.into());
        self
    }

    /// Resolve the deployment id for a model. A miss is a deployment defect,
    /// not something to retry.
    pub fn resolve(&self, model: Llm) -> CompletionResult<&str> {
        self.ids
            .get(&model)
            .map(String::as_str)
            .ok_or(CompletionError::UnmappedModel(model))
    }
}
