//! Type definitions for the Claude Agent SDK
//!
//! This module contains all the type definitions used throughout the SDK:
//! identifiers for type safety, conversation message types, option types,
//! permission types, and hook types.

pub mod hooks;
pub mod identifiers;
pub mod mcp;
pub mod messages;
pub mod options;
pub mod permissions;

pub use hooks::{HookContext, HookDecision, HookEvent, HookMatcher, HookOutput};
pub use identifiers::{RequestId, SessionId, ToolName};
pub use mcp::{
    McpHttpServerConfig, McpServerConfig, McpServers, McpSseServerConfig, McpStdioServerConfig,
    SdkServerConfig,
};
pub use messages::{
    AssistantMessageContent, ContentBlock, ContentValue, Message, UserContent, UserMessageContent,
};
pub use options::{
    AgentDefinition, ClaudeAgentOptions, ClaudeAgentOptionsBuilder, SdkBeta, SdkPluginConfig,
    StderrCallback, SystemPrompt, SystemPromptPreset, ToolsConfig, ToolsPreset,
};
pub use permissions::{
    CanUseToolCallback, PermissionMode, PermissionRequest, PermissionResult, PermissionResultAllow,
    PermissionResultDeny, PermissionRuleValue, PermissionUpdate, PermissionUpdateDestination,
    SettingSource, ToolPermissionContext,
};
