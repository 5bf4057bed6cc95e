//! MCP (Model Context Protocol) server configuration types
//!
//! Configuration for the MCP servers a session makes available to the CLI.
//! External servers (stdio/SSE/HTTP) are fully described here and serialized
//! into `--mcp-config`; SDK servers additionally carry an in-process
//! [`SdkMcpServer`](crate::mcp::SdkMcpServer) instance that the SDK drives
//! when the CLI sends `mcp_message` control requests back over the pipe.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use crate::mcp::SdkMcpServer;

/// MCP stdio server configuration
///
/// Used to spawn an MCP server as a subprocess.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpStdioServerConfig {
    /// Server type (stdio)
    #[serde(skip_serializing_if = "Option::is_none", rename = "type")]
    pub server_type: Option<String>,
    /// Command to execute
    pub command: String,
    /// Command arguments
    #[serde(skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<String>>,
    /// Environment variables
    #[serde(skip_serializing_if = "Option::is_none")]
    pub env: Option<HashMap<String, String>>,
}

/// MCP SSE server configuration
///
/// Used to connect to an MCP server via Server-Sent Events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpSseServerConfig {
    /// Server type (sse)
    #[serde(rename = "type")]
    pub server_type: String,
    /// Server URL
    pub url: String,
    /// HTTP headers
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers: Option<HashMap<String, String>>,
}

/// MCP HTTP server configuration
///
/// Used to connect to an MCP server via HTTP.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpHttpServerConfig {
    /// Server type (http)
    #[serde(rename = "type")]
    pub server_type: String,
    /// Server URL
    pub url: String,
    /// HTTP headers
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers: Option<HashMap<String, String>>,
}

/// SDK MCP server configuration
///
/// Pairs the advertised server name with the in-process instance. Only the
/// name (and `type: "sdk"`) crosses the command line; the instance stays on
/// this side of the pipe and is invoked through the control protocol.
#[derive(Clone)]
pub struct SdkServerConfig {
    /// Server name (used as identifier on the wire)
    pub name: String,
    /// In-process server instance
    pub instance: Arc<dyn SdkMcpServer>,
}

impl std::fmt::Debug for SdkServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SdkServerConfig")
            .field("name", &self.name)
            .field("instance", &"<SdkMcpServer>")
            .finish()
    }
}

/// MCP server configuration enum
#[derive(Debug, Clone)]
pub enum McpServerConfig {
    /// Stdio-based MCP server (spawns subprocess)
    Stdio(McpStdioServerConfig),
    /// SSE-based MCP server (connects via Server-Sent Events)
    Sse(McpSseServerConfig),
    /// HTTP-based MCP server (connects via HTTP)
    Http(McpHttpServerConfig),
    /// SDK-hosted in-process MCP server
    Sdk(SdkServerConfig),
}

/// MCP servers container
#[derive(Debug, Clone, Default)]
pub enum McpServers {
    /// No MCP servers
    #[default]
    None,
    /// Dictionary of MCP servers (inline configuration)
    Dict(HashMap<String, McpServerConfig>),
    /// Path to MCP servers configuration file
    Path(PathBuf),
}

impl McpServers {
    /// Extract the in-process SDK server instances, keyed by server name.
    #[must_use]
    pub(crate) fn sdk_instances(&self) -> HashMap<String, Arc<dyn SdkMcpServer>> {
        let mut instances = HashMap::new();
        if let McpServers::Dict(servers) = self {
            for (name, config) in servers {
                if let McpServerConfig::Sdk(sdk) = config {
                    instances.insert(name.clone(), sdk.instance.clone());
                }
            }
        }
        instances
    }
}
