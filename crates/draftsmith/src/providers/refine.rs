//! Multi-pass generation against the gateway.
//!
//! Every pass streams a full answer, then the answer and a fixed instruction to
//! improve it are appended to the conversation before the next pass. The loop
//! always runs [`MAX_PASSES`] passes unless a pass fails.
use super::base::{DeltaCallback, GatewayClient, StopInfo, Usage};
use super::claude::stream_gateway;
use super::request::{claude_body, gateway_request, ClaudeMessage};
use super::utils::{messages_to_claude_spec, split_system_prompt};
use crate::debug::{extract_html_content, DebugArtifact, DebugSink};
use crate::errors::{CompletionError, CompletionResult};
use crate::models::llm::{DeploymentMap, Llm};
use crate::models::message::{Message, Role};

pub const MAX_PASSES: u32 = 2;
pub const THINKING_PREFIX: &str = "<thinking>";
pub const THINKING_CLOSE: &str = "</thinking>";
pub const IMPROVE_INSTRUCTION: &str = "You've done a good job with a first draft. Improve this further based on the original instructions so that the app is fully functional and looks like the original video of the app we're trying to replicate.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassState {
    Pending(u32),
    Done,
}

impl PassState {
    pub fn start() -> Self {
        PassState::Pending(1)
    }

    pub fn advance(self) -> Self {
        match self {
            PassState::Pending(pass) if pass < MAX_PASSES => PassState::Pending(pass + 1),
            _ => PassState::Done,
        }
    }
}

/// What one pass produced
#[derive(Debug, Clone, PartialEq)]
pub struct PassRecord {
    pub pass: u32,
    pub text: String,
    pub thinking: String,
    pub usage: Usage,
    pub stop: Option<StopInfo>,
}

/// The text before the closing reasoning marker; all of it when the marker is absent
pub fn extract_thinking(text: &str) -> &str {
    text.split_once(THINKING_CLOSE)
        .map_or(text, |(thinking, _)| thinking)
}

pub struct RefinementLoop<'a> {
    client: &'a dyn GatewayClient,
    model_id: String,
    system: String,
    conversation: Vec<ClaudeMessage>,
    include_thinking: bool,
    debug: Option<&'a dyn DebugSink>,
    records: Vec<PassRecord>,
}

impl<'a> RefinementLoop<'a> {
    pub fn new<S: Into<String>>(
        client: &'a dyn GatewayClient,
        model_id: S,
        system: String,
        conversation: Vec<ClaudeMessage>,
    ) -> Self {
        Self {
            client,
            model_id: model_id.into(),
            system,
            conversation,
            include_thinking: false,
            debug: None,
            records: Vec::new(),
        }
    }

    /// Prefill every outgoing request with an assistant turn opening a reasoning block
    pub fn with_thinking(mut self, include_thinking: bool) -> Self {
        self.include_thinking = include_thinking;
        self
    }

    pub fn with_debug_sink(mut self, debug: Option<&'a dyn DebugSink>) -> Self {
        self.debug = debug;
        self
    }

    /// The conversation as it will be sent on the next pass, without the prefill
    pub fn conversation(&self) -> &[ClaudeMessage] {
        &self.conversation
    }

    pub fn records(&self) -> &[PassRecord] {
        &self.records
    }

    /// Run every pass and return the text of the final one.
    ///
    /// Fails with [`CompletionError::NoContent`] only when every pass was empty;
    /// an empty final pass after a non-empty one is returned as is.
    pub async fn run(&mut self, callback: &dyn DeltaCallback) -> CompletionResult<String> {
        let mut state = PassState::start();
        while let PassState::Pending(pass) = state {
            let record = self.run_pass(pass, callback).await?;
            self.records.push(record);
            state = state.advance();
        }

        let full_stream: String = self.records.iter().map(|r| r.text.as_str()).collect();
        self.record_debug(DebugArtifact::FullStream, &full_stream);

        if self.records.iter().all(|record| record.text.is_empty()) {
            return Err(CompletionError::NoContent { passes: MAX_PASSES });
        }
        Ok(self
            .records
            .last()
            .map(|record| record.text.clone())
            .unwrap_or_default())
    }

    async fn run_pass(
        &mut self,
        pass: u32,
        callback: &dyn DeltaCallback,
    ) -> CompletionResult<PassRecord> {
        tracing::info!(pass, max_passes = MAX_PASSES, model_id = %self.model_id, "starting pass");

        let body = claude_body(self.system.clone(), self.outgoing_messages());
        let request = gateway_request(&self.model_id, &body)?;
        let output = stream_gateway(self.client, &request, callback).await?;

        let thinking = extract_thinking(&output.text).to_string();
        self.record_debug(
            DebugArtifact::Content { pass },
            extract_html_content(&output.text),
        );
        self.record_debug(DebugArtifact::Thinking { pass }, &thinking);

        self.conversation.push(ClaudeMessage::text(
            Role::Assistant,
            format!("{}{}", THINKING_PREFIX, output.text),
        ));
        self.conversation
            .push(ClaudeMessage::text(Role::User, IMPROVE_INSTRUCTION));

        tracing::info!(
            pass,
            chars = output.text.len(),
            input_tokens = output.usage.input_tokens.unwrap_or(0),
            output_tokens = output.usage.output_tokens.unwrap_or(0),
            "pass finished"
        );

        Ok(PassRecord {
            pass,
            text: output.text,
            thinking,
            usage: output.usage,
            stop: output.stop,
        })
    }

    fn outgoing_messages(&self) -> Vec<ClaudeMessage> {
        let mut messages = self.conversation.clone();
        if self.include_thinking {
            messages.push(ClaudeMessage::text(Role::Assistant, THINKING_PREFIX));
        }
        messages
    }

    fn record_debug(&self, artifact: DebugArtifact, content: &str) {
        if let Some(sink) = self.debug {
            if let Err(e) = sink.record(artifact, content) {
                tracing::warn!(%artifact, error = %e, "failed to record debug artifact");
            }
        }
    }
}

/// Generate with the refinement loop against a gateway-hosted conversational model.
pub async fn stream_claude_response_native(
    messages: &[Message],
    client: &dyn GatewayClient,
    deployments: &DeploymentMap,
    callback: &dyn DeltaCallback,
    include_thinking: bool,
    model: Llm,
    debug: Option<&dyn DebugSink>,
) -> CompletionResult<String> {
    let model_id = deployments.resolve(model)?;
    let (system, rest) = split_system_prompt(messages)?;
    let conversation = messages_to_claude_spec(rest)?;

    RefinementLoop::new(client, model_id, system, conversation)
        .with_thinking(include_thinking)
        .with_debug_sink(debug)
        .run(callback)
        .await
}
