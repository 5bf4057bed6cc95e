//! Claude Agent configuration options

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use typed_builder::TypedBuilder;

use super::hooks::{HookEvent, HookMatcher};
use super::identifiers::{SessionId, ToolName};
use super::mcp::McpServers;
use super::permissions::{CanUseToolCallback, PermissionMode, SettingSource};

/// System prompt preset
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemPromptPreset {
    /// Prompt type (always "preset")
    #[serde(rename = "type")]
    pub prompt_type: String,
    /// Preset name (e.g., "`claude_code`")
    pub preset: String,
    /// Additional text to append to the preset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub append: Option<String>,
}

/// System prompt configuration
#[derive(Debug, Clone)]
pub enum SystemPrompt {
    /// Plain string system prompt
    String(String),
    /// Preset-based system prompt
    Preset(SystemPromptPreset),
}

impl From<String> for SystemPrompt {
    fn from(s: String) -> Self {
        SystemPrompt::String(s)
    }
}

impl From<&str> for SystemPrompt {
    fn from(s: &str) -> Self {
        SystemPrompt::String(s.to_string())
    }
}

impl From<SystemPromptPreset> for SystemPrompt {
    fn from(preset: SystemPromptPreset) -> Self {
        SystemPrompt::Preset(preset)
    }
}

/// Tools configuration - either a list of tool names or a preset
#[derive(Debug, Clone)]
pub enum ToolsConfig {
    /// Explicit list of tool names
    List(Vec<ToolName>),
    /// Use a preset (e.g., `claude_code`)
    Preset(ToolsPreset),
}

/// Tools preset configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsPreset {
    /// Type (always "preset")
    #[serde(rename = "type")]
    pub config_type: String,
    /// Preset name
    pub preset: String,
}

impl ToolsPreset {
    /// Create the Claude Code tools preset
    #[must_use]
    pub fn claude_code() -> Self {
        Self {
            config_type: "preset".to_string(),
            preset: "claude_code".to_string(),
        }
    }
}

impl From<Vec<ToolName>> for ToolsConfig {
    fn from(tools: Vec<ToolName>) -> Self {
        Self::List(tools)
    }
}

impl From<ToolsPreset> for ToolsConfig {
    fn from(preset: ToolsPreset) -> Self {
        Self::Preset(preset)
    }
}

/// Callback for stderr output
///
/// Invoked once per line the CLI writes to stderr. Setting this causes the
/// child's stderr to be piped instead of discarded.
pub type StderrCallback = Arc<dyn Fn(String) + Send + Sync>;

/// Agent definition configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentDefinition {
    /// Agent description
    pub description: String,
    /// Agent system prompt
    pub prompt: String,
    /// Tools available to the agent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<String>>,
    /// Model to use for the agent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// Configuration for loading plugins
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SdkPluginConfig {
    /// Local plugin from filesystem path
    #[serde(rename = "local")]
    Local {
        /// Path to the plugin directory
        path: String,
    },
}

/// Available beta features
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SdkBeta {
    /// 1 million token context window
    #[serde(rename = "context-1m-2025-08-07")]
    Context1M,
}

impl SdkBeta {
    /// Wire representation used on the CLI command line
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            SdkBeta::Context1M => "context-1m-2025-08-07",
        }
    }
}

/// Main options for the Claude Agent SDK
#[allow(clippy::struct_excessive_bools)]
#[derive(Clone, Default, TypedBuilder)]
#[builder(
    builder_method(doc = "Create a new builder for ClaudeAgentOptions"),
    builder_type(doc = "Builder for ClaudeAgentOptions", vis = "pub"),
    build_method(doc = "Build the ClaudeAgentOptions")
)]
pub struct ClaudeAgentOptions {
    /// System prompt configuration
    #[builder(default, setter(strip_option, into))]
    pub system_prompt: Option<SystemPrompt>,

    /// Base set of tools made available to Claude
    #[builder(default, setter(strip_option))]
    pub tools: Option<ToolsConfig>,

    /// List of tools that Claude is allowed to use
    #[builder(default, setter(into))]
    pub allowed_tools: Vec<ToolName>,

    /// List of tools that Claude is not allowed to use
    #[builder(default, setter(into))]
    pub disallowed_tools: Vec<ToolName>,

    /// Maximum number of turns before stopping
    #[builder(default, setter(strip_option))]
    pub max_turns: Option<u32>,

    /// AI model to use
    #[builder(default, setter(strip_option, into))]
    pub model: Option<String>,

    /// Model to use if primary fails
    #[builder(default, setter(strip_option, into))]
    pub fallback_model: Option<String>,

    /// Beta features to enable
    #[builder(default, setter(into))]
    pub betas: Vec<SdkBeta>,

    /// Maximum budget in USD for the query
    #[builder(default, setter(strip_option))]
    pub max_budget_usd: Option<f64>,

    /// Maximum tokens for thinking process
    #[builder(default, setter(strip_option))]
    pub max_thinking_tokens: Option<u32>,

    /// Permission mode for tool execution
    #[builder(default, setter(strip_option))]
    pub permission_mode: Option<PermissionMode>,

    /// Tool name to use for permission prompts
    ///
    /// Mutually exclusive with `can_use_tool`; when the callback is set the
    /// SDK routes permission prompts over the control protocol instead.
    #[builder(default, setter(strip_option, into))]
    pub permission_prompt_tool_name: Option<String>,

    /// Whether to continue from the previous conversation
    #[builder(default)]
    pub continue_conversation: bool,

    /// Session ID to resume from
    #[builder(default, setter(strip_option, into))]
    pub resume: Option<SessionId>,

    /// Whether to fork the session when resuming
    #[builder(default)]
    pub fork_session: bool,

    /// Settings: inline JSON (`{…}`) or a path to a settings file
    #[builder(default, setter(strip_option, into))]
    pub settings: Option<String>,

    /// Sandbox configuration, merged into the settings value
    #[builder(default, setter(strip_option))]
    pub sandbox: Option<serde_json::Value>,

    /// Additional directories to add to the context
    #[builder(default, setter(into))]
    pub add_dirs: Vec<PathBuf>,

    /// MCP server configurations
    #[builder(default)]
    pub mcp_servers: McpServers,

    /// Whether to include partial messages in stream
    #[builder(default)]
    pub include_partial_messages: bool,

    /// Custom agent definitions
    #[builder(default, setter(strip_option))]
    pub agents: Option<HashMap<String, AgentDefinition>>,

    /// Setting sources to load
    #[builder(default, setter(strip_option))]
    pub setting_sources: Option<Vec<SettingSource>>,

    /// Plugins to load from local paths
    #[builder(default, setter(into))]
    pub plugins: Vec<SdkPluginConfig>,

    /// Working directory for the CLI process
    #[builder(default, setter(strip_option, into))]
    pub cwd: Option<PathBuf>,

    /// Environment variables for the CLI process
    #[builder(default)]
    pub env: HashMap<String, String>,

    /// Extra CLI arguments to pass through verbatim
    #[builder(default)]
    pub extra_args: HashMap<String, Option<String>>,

    /// Maximum buffer size for accumulated JSON messages (default: 1 MiB)
    #[builder(default, setter(strip_option))]
    pub max_buffer_size: Option<usize>,

    /// Initial stdout line buffer size (default: 64 KiB)
    #[builder(default, setter(strip_option))]
    pub scanner_buffer_size: Option<usize>,

    /// Conversation message channel capacity (default: 100)
    #[builder(default, setter(strip_option))]
    pub message_channel_buffer_size: Option<usize>,

    /// Callback for tool permission checks
    #[builder(default, setter(strip_option))]
    pub can_use_tool: Option<CanUseToolCallback>,

    /// Hook configurations
    #[builder(default, setter(strip_option))]
    pub hooks: Option<HashMap<HookEvent, Vec<HookMatcher>>>,

    /// Enable SDK file checkpointing in the CLI
    #[builder(default)]
    pub enable_file_checkpointing: bool,

    /// Callback for stderr output
    #[builder(default, setter(strip_option))]
    pub stderr: Option<StderrCallback>,
}

#[allow(clippy::missing_fields_in_debug)]
impl std::fmt::Debug for ClaudeAgentOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClaudeAgentOptions")
            .field("system_prompt", &self.system_prompt)
            .field("allowed_tools", &self.allowed_tools)
            .field("disallowed_tools", &self.disallowed_tools)
            .field("max_turns", &self.max_turns)
            .field("model", &self.model)
            .field("fallback_model", &self.fallback_model)
            .field("betas", &self.betas)
            .field("max_budget_usd", &self.max_budget_usd)
            .field("max_thinking_tokens", &self.max_thinking_tokens)
            .field("permission_mode", &self.permission_mode)
            .field(
                "permission_prompt_tool_name",
                &self.permission_prompt_tool_name,
            )
            .field("continue_conversation", &self.continue_conversation)
            .field("resume", &self.resume)
            .field("fork_session", &self.fork_session)
            .field("settings", &self.settings)
            .field("sandbox", &self.sandbox)
            .field("add_dirs", &self.add_dirs)
            .field("mcp_servers", &self.mcp_servers)
            .field("include_partial_messages", &self.include_partial_messages)
            .field("agents", &self.agents)
            .field("setting_sources", &self.setting_sources)
            .field("plugins", &self.plugins)
            .field("cwd", &self.cwd)
            .field("env", &self.env)
            .field("extra_args", &self.extra_args)
            .field("max_buffer_size", &self.max_buffer_size)
            .field("scanner_buffer_size", &self.scanner_buffer_size)
            .field(
                "message_channel_buffer_size",
                &self.message_channel_buffer_size,
            )
            .field(
                "can_use_tool",
                &self.can_use_tool.as_ref().map(|_| "<callback>"),
            )
            .field(
                "hooks",
                &self
                    .hooks
                    .as_ref()
                    .map(|h| format!("[{} hook types]", h.len())),
            )
            .field("enable_file_checkpointing", &self.enable_file_checkpointing)
            .field("stderr", &self.stderr.as_ref().map(|_| "<callback>"))
            .finish()
    }
}
