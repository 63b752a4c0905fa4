use thiserror::Error;

use crate::models::llm::{BackendFamily, Llm};

#[non_exhaustive]
#[derive(Error, Debug)]
pub enum CompletionError {
    #[error("No gateway deployment configured for model {0}")]
    UnmappedModel(Llm),

    #[error("Unknown model: {0}")]
    UnknownModel(String),

    #[error("Invalid image url: {0}")]
    InvalidImageUrl(String),

    #[error("Conversation is empty")]
    EmptyConversation,

    #[error("No client configured for the {0} backend")]
    BackendUnavailable(BackendFamily),

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Server error: {0}")]
    ServerError(u16),

    #[error("Request failed: {status}: {body}")]
    RequestFailed { status: u16, body: String },

    #[error("Malformed stream event: {0}")]
    MalformedEvent(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Failed to serialize request: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("No content produced after {passes} passes")]
    NoContent { passes: u32 },
}

impl CompletionError {
    /// Errors caused by the caller's input or deployment rather than the backend.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            CompletionError::UnmappedModel(_)
                | CompletionError::UnknownModel(_)
                | CompletionError::InvalidImageUrl(_)
                | CompletionError::EmptyConversation
                | CompletionError::BackendUnavailable(_)
        )
    }
}

pub type CompletionResult<T> = Result<T, CompletionError>;
