//! # Claude Agent SDK for Rust
//!
//! Rust SDK for driving the Claude Code CLI over its bidirectional streaming
//! JSON protocol. Async/await, strong typing, tokio-based.
//!
//! The SDK spawns and supervises the CLI process, frames the line-delimited
//! JSON stream on its pipes, multiplexes the in-band control protocol, and
//! dispatches control requests from the CLI back into host-supplied
//! callbacks: tool-permission decisions, lifecycle hooks, and in-process MCP
//! tool servers.
//!
//! ## Quick Start
//!
//! One-shot usage with [`query()`]:
//!
//! ```no_run
//! use claude_agent_sdk::{query, Message};
//! use futures::StreamExt;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let stream = query("What is 2 + 2?", None).await?;
//!     let mut stream = Box::pin(stream);
//!
//!     while let Some(message) = stream.next().await {
//!         if let Message::Assistant { message, .. } = message? {
//!             println!("Claude: {:?}", message.content);
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Interactive sessions
//!
//! For stateful conversations with interrupts and follow-up messages, use
//! [`ClaudeSDKClient`]:
//!
//! ```no_run
//! # use claude_agent_sdk::{ClaudeAgentOptions, ClaudeSDKClient};
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let options = ClaudeAgentOptions::builder().max_turns(10).build();
//!
//! let mut client = ClaudeSDKClient::new(options, None).await?;
//! client.send_message("Hello, Claude!").await?;
//!
//! while let Some(message) = client.next_message().await {
//!     // Process messages...
//! }
//!
//! client.close().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Permission control
//!
//! A [`PermissionCallback`](callbacks::PermissionCallback) decides tool use
//! when the CLI asks over the control protocol:
//!
//! ```no_run
//! # use claude_agent_sdk::{ClaudeAgentOptions, FnPermissionCallback, PermissionResult};
//! # use std::sync::Arc;
//! let permission_callback = Arc::new(FnPermissionCallback::new(
//!     |tool_name, _input, _context| {
//!         Box::pin(async move {
//!             match tool_name.as_str() {
//!                 "Read" | "Glob" => Ok(PermissionResult::allow()),
//!                 _ => Ok(PermissionResult::deny("Tool not allowed")),
//!             }
//!         })
//!     },
//! ));
//!
//! let options = ClaudeAgentOptions::builder()
//!     .can_use_tool(permission_callback)
//!     .build();
//! ```
//!
//! ## Hooks
//!
//! Hooks attach to lifecycle events with a matcher pattern the CLI
//! interprets; the callbacks run in-process, routed by opaque ids assigned
//! during the initialize handshake. See the [`hooks`] module.
//!
//! ## SDK MCP servers
//!
//! In-process tool servers implement [`mcp::SdkMcpServer`] (or use the
//! closure-based [`mcp::SdkMcpToolServer`]); the CLI calls their tools by
//! sending `mcp_message` control requests back across the pipe. See the
//! [`mcp`] module.
//!
//! ## Architecture
//!
//! - [`transport`]: process supervision and line-JSON framing
//! - [`control`]: control-protocol multiplexing and callback dispatch
//! - [`query()`]: one-shot query functions
//! - [`client`]: interactive bidirectional client
//! - [`types`]: typed wire shapes and options
//! - [`error`]: error types and handling
//!
//! ## Logging
//!
//! This crate uses [`tracing`](https://crates.io/crates/tracing) for
//! structured logging. Events are always emitted but are zero-cost when no
//! subscriber is attached. To see logs, install a subscriber in your
//! application:
//!
//! ```rust,ignore
//! tracing_subscriber::fmt::init();
//! ```
//!
//! ## Requirements
//!
//! - Rust 1.85 or later
//! - Claude Code: `npm install -g @anthropic-ai/claude-code` (2.0.50+)
//!
//! ## Error Handling
//!
//! All fallible operations return [`Result<T, ClaudeError>`](Result):
//!
//! ```no_run
//! # use claude_agent_sdk::{query, ClaudeError};
//! # async fn example() {
//! match query("Hello", None).await {
//!     Ok(stream) => { /* ... */ }
//!     Err(ClaudeError::CliNotFound(msg)) => {
//!         eprintln!("Claude Code not installed: {}", msg);
//!     }
//!     Err(e) => {
//!         eprintln!("Error: {}", e);
//!     }
//! }
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod callbacks;
pub mod client;
pub mod control;
pub mod error;
pub mod hooks;
pub mod mcp;
pub mod message;
pub mod query;
pub mod transport;
pub mod types;
pub mod utils;

// Re-export commonly used types
pub use callbacks::{
    FnHookCallback, FnPermissionCallback, HookCallback, PermissionCallback, SharedHookCallback,
    SharedPermissionCallback,
};
pub use client::ClaudeSDKClient;
pub use control::ProtocolHandler;
pub use error::{ClaudeError, Result};
pub use futures::StreamExt;
pub use hooks::{hook_callback, HookMatcherBuilder, HookRegistry};
pub use mcp::{CallToolResult, SdkMcpServer, SdkMcpToolServer, ToolDefinition};
pub use message::parse_message;
pub use query::{query, query_stream};
pub use transport::{SubprocessTransport, Transport, TransportState, MIN_CLI_VERSION};
pub use types::{
    AgentDefinition, CanUseToolCallback, ClaudeAgentOptions, ClaudeAgentOptionsBuilder,
    ContentBlock, ContentValue, HookContext, HookEvent, HookMatcher, HookOutput,
    McpHttpServerConfig, McpServerConfig, McpServers, McpSseServerConfig, McpStdioServerConfig,
    Message, PermissionMode, PermissionResult, PermissionResultAllow, PermissionResultDeny,
    PermissionUpdate, RequestId, SdkServerConfig, SessionId, SettingSource, SystemPrompt,
    SystemPromptPreset, ToolName, ToolPermissionContext,
};

/// Version of the SDK
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
