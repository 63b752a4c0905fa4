use super::request::{ClaudeContent, ClaudeContentBlock, ClaudeMessage, ImageSource, SourceEncoding};
use crate::errors::{CompletionError, CompletionResult};
use crate::models::message::{ContentPart, Message, MessageContent};

/// Convert canonical messages to the chat-completion message specification.
///   the canonical form already is that specification, so this is a copy
pub fn messages_to_openai_spec(messages: &[Message]) -> Vec<Message> {
    messages.to_vec()
}

/// Take the first message as the system prompt and return the remaining turns.
pub fn split_system_prompt(messages: &[Message]) -> CompletionResult<(String, &[Message])> {
    let (first, rest) = messages
        .split_first()
        .ok_or(CompletionError::EmptyConversation)?;
    Ok((first.content.text(), rest))
}

/// Convert canonical messages to the anthropic message specification.
///   image parts carrying a data URL are rewritten into an embedded base64 source,
///   everything else is left as it is
pub fn messages_to_claude_spec(messages: &[Message]) -> CompletionResult<Vec<ClaudeMessage>> {
    messages
        .iter()
        .map(|message| {
            let content = match &message.content {
                MessageContent::Text(text) => ClaudeContent::Text(text.clone()),
                MessageContent::Parts(parts) => ClaudeContent::Blocks(
                    parts
                        .iter()
                        .map(convert_part)
                        .collect::<CompletionResult<Vec<_>>>()?,
                ),
            };
            Ok(ClaudeMessage {
                role: message.role,
                content,
            })
        })
        .collect()
}

fn convert_part(part: &ContentPart) -> CompletionResult<ClaudeContentBlock> {
    match part {
        ContentPart::Text { text } => Ok(ClaudeContentBlock::Text { text: text.clone() }),
        ContentPart::ImageUrl { image_url } => {
            let (media_type, data) = parse_data_url(&image_url.url)?;
            Ok(ClaudeContentBlock::Image {
                source: ImageSource {
                    encoding: SourceEncoding::Base64,
                    media_type: media_type.to_string(),
                    data: data.to_string(),
                },
            })
        }
    }
}

/// Split a data URL (`data:image/png;base64,iVBOR...`) into its media type and payload.
pub fn parse_data_url(url: &str) -> CompletionResult<(&str, &str)> {
    let invalid = || CompletionError::InvalidImageUrl(truncate(url));

    let (header, data) = url.split_once(',').ok_or_else(invalid)?;
    let (scheme, _encoding) = header.split_once(';').ok_or_else(invalid)?;
    let (_, media_type) = scheme.split_once(':').ok_or_else(invalid)?;

    Ok((media_type, data))
}

// image payloads can be megabytes, keep error messages readable
fn truncate(url: &str) -> String {
    match url.char_indices().nth(64) {
        Some((idx, _)) => format!("{}...", &url[..idx]),
        None => url.to_string(),
    }
}
