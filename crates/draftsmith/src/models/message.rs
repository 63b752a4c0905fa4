use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageUrl {
    /// A data URL such as `data:image/png;base64,iVBOR...`
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
/// One piece of an interleaved text/image message
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

impl ContentPart {
    pub fn text<S: Into<String>>(text: S) -> Self {
        ContentPart::Text { text: text.into() }
    }

    pub fn image_url<S: Into<String>>(url: S) -> Self {
        ContentPart::ImageUrl {
            image_url: ImageUrl {
                url: url.into(),
                detail: None,
            },
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ContentPart::Text { text } => Some(text),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl MessageContent {
    /// All text in the content, with parts joined by newlines. Images are skipped.
    pub fn text(&self) -> String {
        match self {
            MessageContent::Text(text) => text.clone(),
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(ContentPart::as_text)
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// A message in the canonical chat-completion shape
pub struct Message {
    pub role: Role,
    pub content: MessageContent,
}

/// Ordered turns; the first message conventionally carries the system prompt.
pub type Conversation = Vec<Message>;

impl Message {
    pub fn new(role: Role, content: MessageContent) -> Self {
        Message { role, content }
    }

    /// A system message with plain text content
    pub fn system<S: Into<String>>(text: S) -> Self {
        Message::new(Role::System, MessageContent::Text(text.into()))
    }

    /// An empty user message, to be filled with parts
    pub fn user() -> Self {
        Message::new(Role::User, MessageContent::Parts(Vec::new()))
    }

    /// An empty assistant message, to be filled with parts
    pub fn assistant() -> Self {
        Message::new(Role::Assistant, MessageContent::Parts(Vec::new()))
    }

    /// Add any ContentPart to the message, converting plain text content to parts first
    pub fn with_part(mut self, part: ContentPart) -> Self {
        match &mut self.content {
            MessageContent::Parts(parts) => parts.push(part),
            MessageContent::Text(text) => {
                let existing = ContentPart::text(std::mem::take(text));
                self.content = MessageContent::Parts(vec![existing, part]);
            }
        }
        self
    }

    pub fn with_text<S: Into<String>>(self, text: S) -> Self {
        self.with_part(ContentPart::text(text))
    }

    pub fn with_image_url<S: Into<String>>(self, url: S) -> Self {
        self.with_part(ContentPart::image_url(url))
    }
}
