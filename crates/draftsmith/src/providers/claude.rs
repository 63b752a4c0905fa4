use super::base::{DeltaCallback, GatewayClient};
use super::request::{build_gateway_request, GatewayRequest};
use super::stream::{collect_pass, gateway_events, PassOutput};
use crate::errors::CompletionResult;
use crate::models::llm::{DeploymentMap, Llm};
use crate::models::message::Message;

/// Stream one completion from a conversational model hosted on the gateway.
///
/// The deployment is resolved before anything is sent, so an unmapped model
/// never reaches the network.
pub async fn stream_claude_response(
    messages: &[Message],
    client: &dyn GatewayClient,
    deployments: &DeploymentMap,
    callback: &dyn DeltaCallback,
    model: Llm,
) -> CompletionResult<String> {
    let request = build_gateway_request(messages, model, deployments)?;
    stream_claude_request(client, &request, callback).await
}

/// Run a prepared gateway request as a single-pass completion and return its text.
pub async fn stream_claude_request(
    client: &dyn GatewayClient,
    request: &GatewayRequest,
    callback: &dyn DeltaCallback,
) -> CompletionResult<String> {
    let output = stream_gateway(client, request, callback).await?;

    tracing::info!(model_id = %request.model_id, chars = output.text.len(), "conversational completion finished");
    Ok(output.text)
}

/// Invoke the gateway once and fold its event stream into a [`PassOutput`].
///
/// A response without a body is an empty pass, not an error.
pub async fn stream_gateway(
    client: &dyn GatewayClient,
    request: &GatewayRequest,
    callback: &dyn DeltaCallback,
) -> CompletionResult<PassOutput> {
    tracing::debug!(model_id = %request.model_id, "dispatching gateway request");

    let output = match client.invoke_with_response_stream(request).await? {
        Some(events) => collect_pass(gateway_events(events), callback).await?,
        None => {
            tracing::warn!(model_id = %request.model_id, "gateway response had no body");
            PassOutput::default()
        }
    };

    if let Some(stop) = &output.stop {
        tracing::info!(
            stop_reason = ?stop.stop_reason,
            stop_sequence = ?stop.stop_sequence,
            "gateway stream stopped"
        );
    }
    match (output.usage.input_tokens, output.usage.output_tokens) {
        (Some(input), Some(output_tokens)) => {
            tracing::info!(input_tokens = input, output_tokens, "token usage")
        }
        (input, output_tokens) => tracing::warn!(
            input_tokens = input.unwrap_or(0),
            output_tokens = output_tokens.unwrap_or(0),
            "gateway did not report full token usage"
        ),
    }

    Ok(output)
}
