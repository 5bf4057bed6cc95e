//! Trait-based callback definitions for hooks and permissions.
//!
//! This module provides idiomatic Rust traits for implementing callbacks.
//! Users can implement these traits on their own types, or use closures
//! via the provided wrappers.
//!
//! Callbacks are registered once, before the session connects, and are
//! referenced on the wire only through generated opaque ids. The registry
//! never changes for the lifetime of a session.
//!
//! # Example: Implementing `PermissionCallback`
//!
//! ```no_run
//! use claude_agent_sdk::callbacks::PermissionCallback;
//! use claude_agent_sdk::types::{PermissionResult, ToolPermissionContext};
//! use claude_agent_sdk::Result;
//! use async_trait::async_trait;
//!
//! struct AllowReadOnly;
//!
//! #[async_trait]
//! impl PermissionCallback for AllowReadOnly {
//!     async fn call(
//!         &self,
//!         tool_name: String,
//!         _input: serde_json::Value,
//!         _context: ToolPermissionContext,
//!     ) -> Result<PermissionResult> {
//!         if tool_name == "Read" || tool_name == "Glob" {
//!             Ok(PermissionResult::allow())
//!         } else {
//!             Ok(PermissionResult::deny("Only read operations allowed"))
//!         }
//!     }
//! }
//! ```

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::Result;
use crate::types::{HookContext, HookOutput, PermissionResult, ToolPermissionContext};

/// Trait for hook callbacks.
///
/// Implement this trait to create custom hook handlers. The CLI invokes a
/// registered hook by sending a `hook_callback` control request carrying the
/// callback id assigned at initialization; the SDK routes the request here.
#[async_trait]
pub trait HookCallback: Send + Sync {
    /// Called when a hook event fires.
    ///
    /// # Arguments
    ///
    /// * `input` - The hook input data (tool input for `PreToolUse`, result for `PostToolUse`, etc.)
    /// * `tool_use_id` - Optional tool use ID for tool-related hooks
    /// * `context` - Hook execution context
    ///
    /// # Returns
    ///
    /// A `HookOutput` that can optionally block the action or add system messages.
    async fn call(
        &self,
        input: serde_json::Value,
        tool_use_id: Option<String>,
        context: HookContext,
    ) -> Result<HookOutput>;
}

#[async_trait]
impl HookCallback for Box<dyn HookCallback> {
    async fn call(
        &self,
        input: serde_json::Value,
        tool_use_id: Option<String>,
        context: HookContext,
    ) -> Result<HookOutput> {
        (**self).call(input, tool_use_id, context).await
    }
}

/// Trait for permission callbacks.
///
/// Implement this trait to control which tools Claude is allowed to use.
/// The CLI asks over the control protocol (`can_use_tool`) before running a
/// tool; the decision returned here is marshalled back as the response.
#[async_trait]
pub trait PermissionCallback: Send + Sync {
    /// Called when Claude requests permission to use a tool.
    ///
    /// # Arguments
    ///
    /// * `tool_name` - Name of the tool being requested
    /// * `input` - The tool input parameters
    /// * `context` - Permission context with suggestions from the CLI
    ///
    /// # Returns
    ///
    /// A `PermissionResult` that either allows or denies the tool use.
    async fn call(
        &self,
        tool_name: String,
        input: serde_json::Value,
        context: ToolPermissionContext,
    ) -> Result<PermissionResult>;
}

#[async_trait]
impl PermissionCallback for Box<dyn PermissionCallback> {
    async fn call(
        &self,
        tool_name: String,
        input: serde_json::Value,
        context: ToolPermissionContext,
    ) -> Result<PermissionResult> {
        (**self).call(tool_name, input, context).await
    }
}

#[async_trait]
impl<T: HookCallback + ?Sized> HookCallback for Arc<T> {
    async fn call(
        &self,
        input: serde_json::Value,
        tool_use_id: Option<String>,
        context: HookContext,
    ) -> Result<HookOutput> {
        (**self).call(input, tool_use_id, context).await
    }
}

#[async_trait]
impl<T: PermissionCallback + ?Sized> PermissionCallback for Arc<T> {
    async fn call(
        &self,
        tool_name: String,
        input: serde_json::Value,
        context: ToolPermissionContext,
    ) -> Result<PermissionResult> {
        (**self).call(tool_name, input, context).await
    }
}

/// Type alias for a shared hook callback.
pub type SharedHookCallback = Arc<dyn HookCallback>;

/// Type alias for a shared permission callback.
pub type SharedPermissionCallback = Arc<dyn PermissionCallback>;

type BoxedHookFuture = std::pin::Pin<Box<dyn std::future::Future<Output = Result<HookOutput>> + Send>>;
type BoxedPermissionFuture =
    std::pin::Pin<Box<dyn std::future::Future<Output = Result<PermissionResult>> + Send>>;

/// Wrapper to convert a closure into a `HookCallback`.
///
/// # Example
///
/// ```no_run
/// use claude_agent_sdk::callbacks::{FnHookCallback, HookCallback};
/// use claude_agent_sdk::types::HookOutput;
/// use std::sync::Arc;
///
/// let callback = FnHookCallback::new(|_input, tool_id, ctx| {
///     Box::pin(async move {
///         println!("Hook for tool: {:?}, session: {:?}", tool_id, ctx.session_id);
///         Ok(HookOutput::default())
///     })
/// });
///
/// let shared: Arc<dyn HookCallback> = Arc::new(callback);
/// ```
pub struct FnHookCallback<F>
where
    F: Fn(serde_json::Value, Option<String>, HookContext) -> BoxedHookFuture + Send + Sync,
{
    func: F,
}

impl<F> FnHookCallback<F>
where
    F: Fn(serde_json::Value, Option<String>, HookContext) -> BoxedHookFuture + Send + Sync,
{
    /// Create a new function-based hook callback.
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

#[async_trait]
impl<F> HookCallback for FnHookCallback<F>
where
    F: Fn(serde_json::Value, Option<String>, HookContext) -> BoxedHookFuture + Send + Sync,
{
    async fn call(
        &self,
        input: serde_json::Value,
        tool_use_id: Option<String>,
        context: HookContext,
    ) -> Result<HookOutput> {
        (self.func)(input, tool_use_id, context).await
    }
}

/// Wrapper to convert a closure into a `PermissionCallback`.
///
/// # Example
///
/// ```no_run
/// use claude_agent_sdk::callbacks::{FnPermissionCallback, PermissionCallback};
/// use claude_agent_sdk::types::PermissionResult;
/// use std::sync::Arc;
///
/// let callback = FnPermissionCallback::new(|tool_name, _input, ctx| {
///     Box::pin(async move {
///         println!("Permission for: {}, suggestions: {:?}", tool_name, ctx.suggestions);
///         Ok(PermissionResult::allow())
///     })
/// });
///
/// let shared: Arc<dyn PermissionCallback> = Arc::new(callback);
/// ```
pub struct FnPermissionCallback<F>
where
    F: Fn(String, serde_json::Value, ToolPermissionContext) -> BoxedPermissionFuture + Send + Sync,
{
    func: F,
}

impl<F> FnPermissionCallback<F>
where
    F: Fn(String, serde_json::Value, ToolPermissionContext) -> BoxedPermissionFuture + Send + Sync,
{
    /// Create a new function-based permission callback.
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

#[async_trait]
impl<F> PermissionCallback for FnPermissionCallback<F>
where
    F: Fn(String, serde_json::Value, ToolPermissionContext) -> BoxedPermissionFuture + Send + Sync,
{
    async fn call(
        &self,
        tool_name: String,
        input: serde_json::Value,
        context: ToolPermissionContext,
    ) -> Result<PermissionResult> {
        (self.func)(tool_name, input, context).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TestHook;

    #[async_trait]
    impl HookCallback for TestHook {
        async fn call(
            &self,
            _input: serde_json::Value,
            _tool_use_id: Option<String>,
            _context: HookContext,
        ) -> Result<HookOutput> {
            Ok(HookOutput::default())
        }
    }

    struct TestPermission {
        allow_all: bool,
    }

    #[async_trait]
    impl PermissionCallback for TestPermission {
        async fn call(
            &self,
            tool_name: String,
            _input: serde_json::Value,
            _context: ToolPermissionContext,
        ) -> Result<PermissionResult> {
            if self.allow_all {
                Ok(PermissionResult::allow())
            } else {
                Ok(PermissionResult::deny(format!("Denied: {tool_name}")))
            }
        }
    }

    #[tokio::test]
    async fn test_hook_callback_trait() {
        let hook = TestHook;
        let result = hook
            .call(serde_json::json!({}), None, HookContext::default())
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_permission_callback_trait() {
        let perm = TestPermission { allow_all: true };
        let result = perm
            .call(
                "Read".to_string(),
                serde_json::json!({}),
                ToolPermissionContext::new(vec![]),
            )
            .await;
        assert!(matches!(result.unwrap(), PermissionResult::Allow(_)));
    }

    #[tokio::test]
    async fn test_arc_wrapped_callback() {
        let hook: Arc<dyn HookCallback> = Arc::new(TestHook);
        let result = hook
            .call(serde_json::json!({}), None, HookContext::default())
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_fn_permission_callback() {
        let callback = FnPermissionCallback::new(|_tool, _input, ctx| {
            Box::pin(async move {
                let _ = ctx.suggestions;
                let _ = ctx.is_cancelled();
                Ok(PermissionResult::allow())
            })
        });

        let result = callback
            .call(
                "Test".to_string(),
                serde_json::json!({}),
                ToolPermissionContext::new(vec![]),
            )
            .await;
        assert!(result.is_ok());
    }
}
