//! Hook registration for the control protocol
//!
//! Hooks are declared per event with an opaque matcher pattern. The SDK does
//! not interpret matchers or fire events itself: at initialization every
//! registered callback is assigned an opaque `callback_id`, and the
//! `{event, matcher, callback_id, timeout}` table is advertised to the CLI.
//! When an event fires on the CLI side it sends a `hook_callback` control
//! request naming one of those ids, and the dispatcher routes it back to the
//! registered callback. The registry is immutable for the session's lifetime.
//!
//! # Example
//!
//! ```no_run
//! use claude_agent_sdk::hooks::{hook_callback, HookMatcherBuilder};
//! use claude_agent_sdk::types::{HookEvent, HookOutput};
//! use std::collections::HashMap;
//!
//! let hook = hook_callback(|_input, tool_use_id, _ctx| async move {
//!     println!("Tool used: {:?}", tool_use_id);
//!     Ok(HookOutput::default())
//! });
//!
//! let matcher = HookMatcherBuilder::new(Some("Bash")).add_hook(hook).build();
//!
//! let mut hooks = HashMap::new();
//! hooks.insert(HookEvent::PreToolUse, vec![matcher]);
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use crate::callbacks::{FnHookCallback, HookCallback};
use crate::error::Result;
use crate::types::{HookContext, HookEvent, HookMatcher, HookOutput};

/// Build a shared hook callback from an async closure.
pub fn hook_callback<F, Fut>(func: F) -> Arc<dyn HookCallback>
where
    F: Fn(serde_json::Value, Option<String>, HookContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<HookOutput>> + Send + 'static,
{
    Arc::new(FnHookCallback::new(move |input, tool_use_id, context| {
        Box::pin(func(input, tool_use_id, context))
    }))
}

/// Builder for [`HookMatcher`]
pub struct HookMatcherBuilder {
    matcher: Option<String>,
    hooks: Vec<Arc<dyn HookCallback>>,
    timeout: Option<std::time::Duration>,
}

impl HookMatcherBuilder {
    /// Create a builder with an optional matcher pattern
    #[must_use]
    pub fn new(matcher: Option<&str>) -> Self {
        Self {
            matcher: matcher.map(String::from),
            hooks: Vec::new(),
            timeout: None,
        }
    }

    /// Add a hook callback
    #[must_use]
    pub fn add_hook(mut self, hook: Arc<dyn HookCallback>) -> Self {
        self.hooks.push(hook);
        self
    }

    /// Set the timeout advertised to the CLI for this matcher's hooks
    #[must_use]
    pub fn timeout(mut self, timeout: std::time::Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Build the matcher
    #[must_use]
    pub fn build(self) -> HookMatcher {
        HookMatcher {
            matcher: self.matcher,
            hooks: self.hooks,
            timeout: self.timeout,
        }
    }
}

/// Callback-id table built from the hook configuration.
///
/// Populated once before the session connects; the wire config it produces
/// goes out with the `initialize` request and inbound `hook_callback`
/// requests are resolved against it by id.
#[derive(Default)]
pub struct HookRegistry {
    callbacks: HashMap<String, Arc<dyn HookCallback>>,
    wire_config: Option<serde_json::Value>,
}

impl HookRegistry {
    /// Build the registry from the options' hook configuration
    #[must_use]
    pub fn from_config(config: Option<&HashMap<HookEvent, Vec<HookMatcher>>>) -> Self {
        let Some(config) = config else {
            return Self::default();
        };

        let mut callbacks = HashMap::new();
        let mut wire = serde_json::Map::new();
        let mut next_id = 0u64;

        for (event, matchers) in config {
            if matchers.is_empty() {
                continue;
            }

            let mut entries = Vec::with_capacity(matchers.len());
            for matcher in matchers {
                let mut ids = Vec::with_capacity(matcher.hooks.len());
                for hook in &matcher.hooks {
                    let id = format!("hook_{next_id}");
                    next_id += 1;
                    callbacks.insert(id.clone(), hook.clone());
                    ids.push(id);
                }

                let mut entry = serde_json::json!({ "hookCallbackIds": ids });
                if let Some(pattern) = &matcher.matcher {
                    entry["matcher"] = serde_json::json!(pattern);
                }
                if let Some(timeout) = matcher.timeout {
                    entry["timeout"] = serde_json::json!(timeout.as_secs_f64());
                }
                entries.push(entry);
            }

            wire.insert(event.as_str().to_string(), serde_json::json!(entries));
        }

        let wire_config = if wire.is_empty() {
            None
        } else {
            Some(serde_json::Value::Object(wire))
        };

        Self {
            callbacks,
            wire_config,
        }
    }

    /// Look up a callback by its generated id
    #[must_use]
    pub fn get(&self, callback_id: &str) -> Option<Arc<dyn HookCallback>> {
        self.callbacks.get(callback_id).cloned()
    }

    /// Hook configuration advertised to the CLI at initialization
    #[must_use]
    pub fn wire_config(&self) -> Option<&serde_json::Value> {
        self.wire_config.as_ref()
    }

    /// Whether any hooks are registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }
}

impl std::fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookRegistry")
            .field("callbacks", &format!("[{} callbacks]", self.callbacks.len()))
            .finish()
    }
}
