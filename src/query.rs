//! One-shot query functions
//!
//! [`query`] runs a single prompt against the CLI and streams the resulting
//! conversation; [`query_stream`] does the same for a caller-supplied stream
//! of input messages. For stateful, interactive conversations use
//! [`ClaudeSDKClient`](crate::client::ClaudeSDKClient) instead.

use std::sync::Arc;

use futures::Stream;
use serde_json::{json, Value};

use crate::control::ProtocolHandler;
use crate::error::{ClaudeError, Result};
use crate::message::parse_message;
use crate::transport::{SubprocessTransport, Transport};
use crate::types::{ClaudeAgentOptions, Message};

/// Validate permission settings and configure the prompt tool.
///
/// `can_use_tool` is mutually exclusive with `permission_prompt_tool_name`;
/// when the callback is present the CLI is pointed at `stdio` so permission
/// prompts arrive over the control protocol.
pub(crate) fn validate_permission_options(
    mut options: ClaudeAgentOptions,
) -> Result<ClaudeAgentOptions> {
    if options.can_use_tool.is_some() {
        if options.permission_prompt_tool_name.is_some() {
            return Err(ClaudeError::invalid_config(
                "can_use_tool callback cannot be used with permission_prompt_tool_name",
            ));
        }
        options.permission_prompt_tool_name = Some("stdio".to_string());
    }
    Ok(options)
}

/// Wrap a prompt string in the user-message envelope the CLI expects.
pub(crate) fn user_envelope(content: &str) -> Value {
    json!({
        "type": "user",
        "message": { "role": "user", "content": content },
        "parent_tool_use_id": null,
        "session_id": "default",
    })
}

/// Perform a one-shot query to the Claude Code CLI.
///
/// Spawns the CLI, runs the initialize handshake, writes the prompt as a
/// single user message, and returns the conversation as a stream. The stream
/// ends after the CLI closes its side; a transport failure is yielded as the
/// final item. Message-schema violations are yielded as
/// [`ClaudeError::MessageParse`] without ending the stream.
///
/// # Example
///
/// ```no_run
/// use claude_agent_sdk::{query, Message};
/// use futures::StreamExt;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let stream = query("What is 2 + 2?", None).await?;
///     let mut stream = Box::pin(stream);
///
///     while let Some(message) = stream.next().await {
///         if let Message::Assistant { message, .. } = message? {
///             println!("Claude: {:?}", message.content);
///         }
///     }
///     Ok(())
/// }
/// ```
///
/// # Errors
/// Returns an error if the CLI cannot be found or spawned, or if the
/// initialize handshake fails.
pub async fn query(
    prompt: impl Into<String>,
    options: Option<ClaudeAgentOptions>,
) -> Result<impl Stream<Item = Result<Message>>> {
    let prompt = prompt.into();
    let handler = start_session(options).await?;

    if let Err(e) = handler.write_message(&user_envelope(&prompt)).await {
        let _ = handler.close().await;
        return Err(e);
    }

    // With hooks or SDK MCP servers registered the CLI may still be waiting
    // on dispatched callbacks when the prompt finishes writing; keep stdin
    // open until the first result so their responses can flow back.
    if handler.has_inbound_handlers() {
        let mut first_result = handler.first_result_watcher();
        let end_handler = handler.clone();
        tokio::spawn(async move {
            let _ = first_result.wait_for(|seen| *seen).await;
            let _ = end_handler.end_input().await;
        });
    } else if let Err(e) = handler.end_input().await {
        let _ = handler.close().await;
        return Err(e);
    }

    Ok(message_stream(handler))
}

/// Perform a streaming query with multiple input messages.
///
/// Each item of `prompts` must be a complete wire envelope (typically a
/// `user` message, see [`user_envelope`] shape). Input ends when the stream
/// does.
///
/// # Errors
/// Returns an error if the CLI cannot be found or spawned, or if the
/// initialize handshake fails.
pub async fn query_stream<S>(
    prompts: S,
    options: Option<ClaudeAgentOptions>,
) -> Result<impl Stream<Item = Result<Message>>>
where
    S: Stream<Item = Value> + Unpin + Send + 'static,
{
    let handler = start_session(options).await?;

    let input_handler = handler.clone();
    tokio::spawn(async move {
        if let Err(e) = input_handler.stream_input(prompts).await {
            tracing::warn!(error = %e, "input stream failed");
        }
    });

    Ok(message_stream(handler))
}

async fn start_session(options: Option<ClaudeAgentOptions>) -> Result<Arc<ProtocolHandler>> {
    let options = validate_permission_options(options.unwrap_or_default())?;

    let mut transport = SubprocessTransport::new(options.clone(), None)?;
    transport.connect().await?;

    let handler = Arc::new(ProtocolHandler::new(Box::new(transport), &options));

    if let Err(e) = handler.initialize().await {
        let _ = handler.close().await;
        return Err(e);
    }

    Ok(handler)
}

fn message_stream(handler: Arc<ProtocolHandler>) -> impl Stream<Item = Result<Message>> {
    let mut message_rx = handler.take_message_receiver();
    async_stream::stream! {
        if let Some(message_rx) = message_rx.as_mut() {
            while let Some(item) = message_rx.recv().await {
                match item {
                    Ok(value) => yield parse_message(value),
                    Err(e) => {
                        yield Err(e);
                        break;
                    }
                }
            }
        }
        let _ = handler.close().await;
    }
}
