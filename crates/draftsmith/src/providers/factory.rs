use anyhow::Result;
use std::path::PathBuf;

use super::base::{ChatCompletionClient, DeltaCallback, GatewayClient};
use super::bedrock::BedrockClient;
use super::claude::stream_claude_request;
use super::openai::{stream_chat_completion, OpenAiClient};
use super::refine::stream_claude_response_native;
use super::request::{build_request, BackendRequest};
use crate::configuration::Settings;
use crate::debug::{DebugFileWriter, DebugSink};
use crate::errors::{CompletionError, CompletionResult};
use crate::models::llm::{BackendFamily, DeploymentMap, Llm};
use crate::models::message::Message;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompletionOptions {
    /// Run the multi-pass refinement loop. Only conversational models support it.
    pub refine: bool,
    /// Prefill each refinement pass with an opening reasoning block
    pub include_thinking: bool,
}

/// Where the refinement loop records its intermediate results
pub enum DebugTarget {
    Sink(Box<dyn DebugSink>),
    /// A fresh run directory below this path for every refined completion
    Directory(PathBuf),
}

/// Routes a conversation to the driver for the requested model.
pub struct Orchestrator {
    chat_client: Option<Box<dyn ChatCompletionClient>>,
    gateway_client: Option<Box<dyn GatewayClient>>,
    deployments: DeploymentMap,
    debug: Option<DebugTarget>,
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new()
    }
}

impl Orchestrator {
    pub fn new() -> Self {
        Self {
            chat_client: None,
            gateway_client: None,
            deployments: DeploymentMap::default(),
            debug: None,
        }
    }

    /// Build the HTTP clients the settings describe.
    ///
    /// The chat-completion client is only created when an API key is set.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let gateway = BedrockClient::new(
            settings.bedrock.endpoint(),
            settings.bedrock.api_key.clone(),
        )?;
        let mut orchestrator = Self::new()
            .with_gateway_client(gateway)
            .with_deployments(settings.bedrock.deployment_map()?);

        if let Some(api_key) = &settings.openai.api_key {
            orchestrator = orchestrator.with_chat_client(OpenAiClient::new(
                api_key.clone(),
                settings.openai.base_url.clone(),
            )?);
        }
        if settings.debug.enabled {
            orchestrator.debug = Some(DebugTarget::Directory(settings.debug.dir.clone()));
        }

        Ok(orchestrator)
    }

    pub fn with_chat_client<C: ChatCompletionClient + 'static>(mut self, client: C) -> Self {
        self.chat_client = Some(Box::new(client));
        self
    }

    pub fn with_gateway_client<C: GatewayClient + 'static>(mut self, client: C) -> Self {
        self.gateway_client = Some(Box::new(client));
        self
    }

    pub fn with_deployments(mut self, deployments: DeploymentMap) -> Self {
        self.deployments = deployments;
        self
    }

    pub fn with_debug_sink<S: DebugSink + 'static>(mut self, sink: S) -> Self {
        self.debug = Some(DebugTarget::Sink(Box::new(sink)));
        self
    }

    pub fn with_debug_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.debug = Some(DebugTarget::Directory(dir.into()));
        self
    }

    /// Stream a completion, forwarding every delta to `callback`, and return the text.
    pub async fn stream_completion(
        &self,
        conversation: &[Message],
        model: Llm,
        options: CompletionOptions,
        callback: &dyn DeltaCallback,
    ) -> CompletionResult<String> {
        if conversation.is_empty() {
            return Err(CompletionError::EmptyConversation);
        }

        if options.refine && model.family() == BackendFamily::Conversational {
            let run_writer;
            let debug: Option<&dyn DebugSink> = match &self.debug {
                Some(DebugTarget::Sink(sink)) => Some(&**sink),
                Some(DebugTarget::Directory(dir)) => match DebugFileWriter::new(dir) {
                    Ok(writer) => {
                        run_writer = writer;
                        Some(&run_writer)
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "debug output disabled for this run");
                        None
                    }
                },
                None => None,
            };

            return stream_claude_response_native(
                conversation,
                self.gateway_client()?,
                &self.deployments,
                callback,
                options.include_thinking,
                model,
                debug,
            )
            .await;
        }

        if options.refine {
            tracing::debug!(%model, "refinement is only available for conversational models");
        }

        match build_request(conversation, model, &self.deployments)? {
            BackendRequest::ChatCompletion(request) => {
                stream_chat_completion(self.chat_client()?, &request, callback).await
            }
            BackendRequest::Gateway(request) => {
                stream_claude_request(self.gateway_client()?, &request, callback).await
            }
        }
    }

    fn chat_client(&self) -> CompletionResult<&dyn ChatCompletionClient> {
        self.chat_client
            .as_deref()
            .ok_or(CompletionError::BackendUnavailable(BackendFamily::ChatCompletion))
    }

    fn gateway_client(&self) -> CompletionResult<&dyn GatewayClient> {
        self.gateway_client
            .as_deref()
            .ok_or(CompletionError::BackendUnavailable(BackendFamily::Conversational))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::mock::{MockChatClient, MockGatewayClient};
    use crate::providers::refine::IMPROVE_INSTRUCTION;
    use serde_json::json;
    use std::fs;
    use std::sync::{Arc, Mutex};
    use tempfile::tempdir;

    fn conversation() -> Vec<Message> {
        vec![
            Message::system("Convert this design to code"),
            Message::user().with_text("Make a button"),
        ]
    }

    // lets a test keep a handle on a client the orchestrator owns
    struct Shared<T>(Arc<T>);

    #[async_trait::async_trait]
    impl GatewayClient for Shared<MockGatewayClient> {
        async fn invoke_with_response_stream(
            &self,
            request: &crate::providers::request::GatewayRequest,
        ) -> CompletionResult<Option<crate::providers::base::EventStream>> {
            self.0.invoke_with_response_stream(request).await
        }
    }

    #[async_trait::async_trait]
    impl ChatCompletionClient for Shared<MockChatClient> {
        async fn stream_chat(
            &self,
            request: &crate::providers::request::ChatCompletionRequest,
        ) -> CompletionResult<crate::providers::base::ChunkStream> {
            self.0.stream_chat(request).await
        }
    }

    fn with_gateway(passes: Vec<Vec<&str>>) -> (Orchestrator, Arc<MockGatewayClient>) {
        let client = Arc::new(MockGatewayClient::with_texts(passes));
        let orchestrator = Orchestrator::new().with_gateway_client(Shared(client.clone()));
        (orchestrator, client)
    }

    #[tokio::test]
    async fn test_chat_completion_route_ignores_refine() -> anyhow::Result<()> {
        let client = Arc::new(MockChatClient::new(vec![vec![
            json!({"choices": [{"delta": {"content": "<p>"}}]}),
            json!({"choices": [{"delta": {"content": "</p>"}}]}),
        ]]));
        let orchestrator = Orchestrator::new().with_chat_client(Shared(client.clone()));
        let callback = |_: &str| {};

        let options = CompletionOptions {
            refine: true,
            include_thinking: true,
        };
        let text = orchestrator
            .stream_completion(&conversation(), Llm::Gpt4o20240513, options, &callback)
            .await?;

        assert_eq!(text, "<p></p>");
        assert_eq!(client.requests().len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_direct_conversational_route() -> anyhow::Result<()> {
        let (orchestrator, client) = with_gateway(vec![vec!["one"], vec!["two"]]);
        let callback = |_: &str| {};

        let text = orchestrator
            .stream_completion(
                &conversation(),
                Llm::Claude3Sonnet,
                CompletionOptions::default(),
                &callback,
            )
            .await?;

        assert_eq!(text, "one");
        assert_eq!(client.requests().len(), 1);
        assert_eq!(
            client.requests()[0].model_id,
            "anthropic.claude-3-sonnet-20240229-v1:0"
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_refinement_route() -> anyhow::Result<()> {
        let (orchestrator, client) = with_gateway(vec![vec!["draft"], vec!["final"]]);
        let seen = Mutex::new(Vec::new());
        let callback = |delta: &str| seen.lock().unwrap().push(delta.to_string());

        let options = CompletionOptions {
            refine: true,
            include_thinking: false,
        };
        let text = orchestrator
            .stream_completion(&conversation(), Llm::Claude35Sonnet, options, &callback)
            .await?;

        assert_eq!(text, "final");
        assert_eq!(*seen.lock().unwrap(), vec!["draft", "final"]);
        let bodies = client.bodies();
        assert_eq!(bodies.len(), 2);
        assert_eq!(
            bodies[1].messages.last().map(|m| &m.content),
            Some(&crate::providers::request::ClaudeContent::Text(
                IMPROVE_INSTRUCTION.to_string()
            ))
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_client_is_unavailable() {
        let callback = |_: &str| {};
        let orchestrator = Orchestrator::new();

        let err = orchestrator
            .stream_completion(
                &conversation(),
                Llm::Gpt4Vision,
                CompletionOptions::default(),
                &callback,
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CompletionError::BackendUnavailable(BackendFamily::ChatCompletion)
        ));

        let err = orchestrator
            .stream_completion(
                &conversation(),
                Llm::Claude3Opus,
                CompletionOptions {
                    refine: true,
                    include_thinking: false,
                },
                &callback,
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CompletionError::BackendUnavailable(BackendFamily::Conversational)
        ));
        assert!(err.is_configuration());
    }

    #[tokio::test]
    async fn test_empty_conversation() {
        let (orchestrator, client) = with_gateway(vec![vec!["x"]]);
        let callback = |_: &str| {};

        let err = orchestrator
            .stream_completion(&[], Llm::Claude35Sonnet, CompletionOptions::default(), &callback)
            .await
            .unwrap_err();
        assert!(matches!(err, CompletionError::EmptyConversation));
        assert!(client.requests().is_empty());
    }

    #[tokio::test]
    async fn test_debug_directory_per_run() -> anyhow::Result<()> {
        let root = tempdir()?;
        let (orchestrator, _client) = with_gateway(vec![
            vec!["<thinking>a</thinking><html>1</html>"],
            vec!["<html>2</html>"],
        ]);
        let orchestrator = orchestrator.with_debug_dir(root.path());
        let callback = |_: &str| {};

        let options = CompletionOptions {
            refine: true,
            include_thinking: true,
        };
        orchestrator
            .stream_completion(&conversation(), Llm::Claude35Sonnet, options, &callback)
            .await?;

        let runs: Vec<PathBuf> = fs::read_dir(root.path())?
            .map(|entry| entry.map(|e| e.path()))
            .collect::<std::io::Result<_>>()?;
        assert_eq!(runs.len(), 1);

        let run = &runs[0];
        assert_eq!(fs::read_to_string(run.join("pass_1.html"))?, "<html>1</html>");
        assert_eq!(fs::read_to_string(run.join("thinking_pass_1.txt"))?, "<thinking>a");
        assert_eq!(fs::read_to_string(run.join("pass_2.html"))?, "<html>2</html>");
        assert!(run.join("full_stream.txt").exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_from_default_settings() -> anyhow::Result<()> {
        let orchestrator = Orchestrator::from_settings(&Settings::default())?;
        assert!(orchestrator.chat_client.is_none());
        assert!(orchestrator.gateway_client.is_some());
        assert!(orchestrator.debug.is_none());
        assert_eq!(orchestrator.deployments, DeploymentMap::default());
        Ok(())
    }
}
