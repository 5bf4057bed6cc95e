//! SDK-hosted MCP servers
//!
//! An SDK MCP server runs inside the host process. The CLI discovers it by
//! name (advertised via `--mcp-config` and the initialize handshake) and
//! invokes its tools by sending `mcp_message` control requests back across
//! the pipe; the protocol handler routes those requests to the
//! [`SdkMcpServer`] registered under that name.
//!
//! # Example
//!
//! ```no_run
//! use claude_agent_sdk::mcp::{CallToolResult, SdkMcpToolServer, ToolDefinition};
//! use serde_json::json;
//!
//! let server = SdkMcpToolServer::new("calculator")
//!     .tool(
//!         ToolDefinition::new(
//!             "add",
//!             "Add two numbers",
//!             json!({
//!                 "type": "object",
//!                 "properties": {
//!                     "a": {"type": "number"},
//!                     "b": {"type": "number"}
//!                 },
//!                 "required": ["a", "b"]
//!             }),
//!         ),
//!         |args| {
//!             Box::pin(async move {
//!                 let a = args["a"].as_f64().unwrap_or(0.0);
//!                 let b = args["b"].as_f64().unwrap_or(0.0);
//!                 Ok(CallToolResult::text(format!("{}", a + b)))
//!             })
//!         },
//!     );
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{ClaudeError, Result};

/// Description of one tool an SDK MCP server exposes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Tool name, unique within its server
    pub name: String,
    /// Human-readable description shown to the model
    pub description: String,
    /// JSON schema for the tool's arguments
    #[serde(rename = "inputSchema")]
    pub input_schema: serde_json::Value,
}

impl ToolDefinition {
    /// Create a new tool definition
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }
}

/// Result of a tool invocation, in MCP content-block form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallToolResult {
    /// Content blocks produced by the tool
    pub content: Vec<serde_json::Value>,
    /// Whether the result represents an error
    #[serde(rename = "isError", default, skip_serializing_if = "std::ops::Not::not")]
    pub is_error: bool,
}

impl CallToolResult {
    /// Successful result with a single text block
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![serde_json::json!({"type": "text", "text": text.into()})],
            is_error: false,
        }
    }

    /// Error result with a single text block
    pub fn error(text: impl Into<String>) -> Self {
        Self {
            content: vec![serde_json::json!({"type": "text", "text": text.into()})],
            is_error: true,
        }
    }
}

/// An in-process tool server the CLI can call through the control protocol.
///
/// The registry of servers is fixed at session construction; the dispatcher
/// answers `tools/list` from [`tools`](SdkMcpServer::tools) and `tools/call`
/// through [`call_tool`](SdkMcpServer::call_tool).
#[async_trait]
pub trait SdkMcpServer: Send + Sync {
    /// Server name advertised to the CLI
    fn name(&self) -> &str;

    /// Server version advertised during the MCP initialize exchange
    fn version(&self) -> &str {
        "1.0.0"
    }

    /// Tools this server exposes
    fn tools(&self) -> Vec<ToolDefinition>;

    /// Invoke a tool by name with a JSON argument object
    async fn call_tool(&self, name: &str, arguments: serde_json::Value) -> Result<CallToolResult>;
}

type ToolHandlerFuture =
    std::pin::Pin<Box<dyn std::future::Future<Output = Result<CallToolResult>> + Send>>;

/// Handler function for one tool of an [`SdkMcpToolServer`].
pub type ToolHandler = Arc<dyn Fn(serde_json::Value) -> ToolHandlerFuture + Send + Sync>;

/// Closure-based [`SdkMcpServer`] for the common case of a flat tool list.
#[derive(Clone)]
pub struct SdkMcpToolServer {
    name: String,
    version: String,
    definitions: Vec<ToolDefinition>,
    handlers: HashMap<String, ToolHandler>,
}

impl SdkMcpToolServer {
    /// Create an empty tool server with the given name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: "1.0.0".to_string(),
            definitions: Vec::new(),
            handlers: HashMap::new(),
        }
    }

    /// Set the advertised version
    #[must_use]
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Register a tool with its handler
    #[must_use]
    pub fn tool<F>(mut self, definition: ToolDefinition, handler: F) -> Self
    where
        F: Fn(serde_json::Value) -> ToolHandlerFuture + Send + Sync + 'static,
    {
        self.handlers
            .insert(definition.name.clone(), Arc::new(handler));
        self.definitions.push(definition);
        self
    }
}

impl std::fmt::Debug for SdkMcpToolServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SdkMcpToolServer")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("tools", &format!("[{} tools]", self.definitions.len()))
            .finish()
    }
}

#[async_trait]
impl SdkMcpServer for SdkMcpToolServer {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> &str {
        &self.version
    }

    fn tools(&self) -> Vec<ToolDefinition> {
        self.definitions.clone()
    }

    async fn call_tool(&self, name: &str, arguments: serde_json::Value) -> Result<CallToolResult> {
        let handler = self
            .handlers
            .get(name)
            .ok_or_else(|| ClaudeError::mcp(format!("unknown tool: {name}")))?;
        handler(arguments).await
    }
}
