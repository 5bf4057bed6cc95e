//! Control protocol handler
//!
//! One bidirectional pipe carries three kinds of traffic: ordinary
//! conversation messages, correlated control request/response pairs initiated
//! by either side, and one-way cancel notifications. The [`ProtocolHandler`]
//! demultiplexes inbound traffic, correlates responses to outstanding
//! outbound requests by `request_id`, and dispatches inbound requests to the
//! host's permission callback, registered hooks, and SDK MCP servers.
//!
//! # Wire shapes
//!
//! ```json
//! { "type": "control_request", "request_id": "<id>", "request": { "subtype": "...", ... } }
//! { "type": "control_response", "response": { "request_id": "<id>", "subtype": "success", "response": { ... } } }
//! { "type": "control_response", "response": { "request_id": "<id>", "subtype": "error", "error": "<msg>" } }
//! { "type": "control_cancel_request", "request_id": "<id>" }
//! ```
//!
//! Anything whose `type` is not one of the three control envelopes is
//! forwarded to the conversation channel in read order.
//!
//! # Failure policy
//!
//! When the transport reports the child gone (`ProcessError`) every pending
//! outbound request fails immediately with that error rather than waiting
//! out its own timeout, and the conversation channel closes after carrying
//! the error. At close the pending table is drained the same way, so no
//! awaiter outlives the session.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use futures::{Stream, StreamExt};
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{ClaudeError, Result};
use crate::hooks::HookRegistry;
use crate::mcp::SdkMcpServer;
use crate::transport::Transport;
use crate::types::{
    AgentDefinition, CanUseToolCallback, ClaudeAgentOptions, HookContext, PermissionResult,
    PermissionUpdate, ToolPermissionContext,
};

/// Default timeout for outbound control requests, including `initialize`
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

const DEFAULT_MESSAGE_CHANNEL_BUFFER: usize = 100;

type PendingSender = oneshot::Sender<Result<Value>>;

#[derive(Default)]
struct SessionContext {
    session_id: Option<String>,
    cwd: Option<String>,
}

struct Shared {
    transport: Arc<dyn Transport>,
    /// request_id -> awaiter for outbound requests
    pending: StdMutex<HashMap<String, PendingSender>>,
    /// request_id -> cancel signal for in-flight inbound handlers
    inflight: StdMutex<HashMap<String, CancellationToken>>,
    counter: AtomicU64,
    nonce: String,
    can_use_tool: Option<CanUseToolCallback>,
    hooks: HookRegistry,
    sdk_mcp_servers: HashMap<String, Arc<dyn SdkMcpServer>>,
    agents: Option<HashMap<String, AgentDefinition>>,
    message_tx: mpsc::Sender<Result<Value>>,
    first_result_tx: watch::Sender<bool>,
    session: StdMutex<SessionContext>,
    cancel: CancellationToken,
}

/// Multiplexes the control protocol over one transport.
///
/// The handler owns the demux task reading the transport, the pending-request
/// table, and the callback registries. The session façade (`query`,
/// `ClaudeSDKClient`) holds it for the lifetime of a session and calls
/// [`close`](ProtocolHandler::close) exactly once on teardown (idempotent).
pub struct ProtocolHandler {
    shared: Arc<Shared>,
    message_rx: StdMutex<Option<mpsc::Receiver<Result<Value>>>>,
    first_result_rx: watch::Receiver<bool>,
    demux_task: StdMutex<Option<JoinHandle<()>>>,
}

impl ProtocolHandler {
    /// Create a handler over a connected transport.
    ///
    /// Takes ownership of the transport's message stream; conversation
    /// messages come out of [`take_message_receiver`](Self::take_message_receiver).
    #[must_use]
    pub fn new(mut transport: Box<dyn Transport>, options: &ClaudeAgentOptions) -> Self {
        let buffer = options
            .message_channel_buffer_size
            .unwrap_or(DEFAULT_MESSAGE_CHANNEL_BUFFER)
            .max(1);

        let inbound = transport.read_messages();
        let transport: Arc<dyn Transport> = Arc::from(transport);

        let (message_tx, message_rx) = mpsc::channel(buffer);
        let (first_result_tx, first_result_rx) = watch::channel(false);

        let shared = Arc::new(Shared {
            transport,
            pending: StdMutex::new(HashMap::new()),
            inflight: StdMutex::new(HashMap::new()),
            counter: AtomicU64::new(0),
            nonce: uuid::Uuid::new_v4().simple().to_string(),
            can_use_tool: options.can_use_tool.clone(),
            hooks: HookRegistry::from_config(options.hooks.as_ref()),
            sdk_mcp_servers: options.mcp_servers.sdk_instances(),
            agents: options.agents.clone(),
            message_tx,
            first_result_tx,
            session: StdMutex::new(SessionContext::default()),
            cancel: CancellationToken::new(),
        });

        let demux_task = tokio::spawn(Shared::demux(shared.clone(), inbound));

        Self {
            shared,
            message_rx: StdMutex::new(Some(message_rx)),
            first_result_rx,
            demux_task: StdMutex::new(Some(demux_task)),
        }
    }

    /// Take the conversation-message receiver. Yields `None` once.
    #[must_use]
    pub fn take_message_receiver(&self) -> Option<mpsc::Receiver<Result<Value>>> {
        self.message_rx.lock().ok().and_then(|mut rx| rx.take())
    }

    /// Watch channel that flips to `true` on the first `result` message
    #[must_use]
    pub fn first_result_watcher(&self) -> watch::Receiver<bool> {
        self.first_result_rx.clone()
    }

    /// Whether inbound control requests can arrive for this session
    /// (registered hooks or SDK MCP servers).
    #[must_use]
    pub fn has_inbound_handlers(&self) -> bool {
        !self.shared.hooks.is_empty() || !self.shared.sdk_mcp_servers.is_empty()
    }

    /// Number of outstanding outbound control requests
    #[must_use]
    pub fn pending_request_count(&self) -> usize {
        self.shared.pending.lock().map(|p| p.len()).unwrap_or(0)
    }

    /// Whether the underlying transport currently accepts writes
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.shared.transport.is_ready()
    }

    /// Run the initialize handshake.
    ///
    /// Advertises the hook table (with generated callback ids), the SDK MCP
    /// server names, and any agent definitions. Must complete before
    /// conversation traffic is sent; the response payload is returned as-is.
    ///
    /// # Errors
    /// Fails on timeout, transport failure, or an error response.
    pub async fn initialize(&self) -> Result<Value> {
        let mut payload = serde_json::Map::new();

        if let Some(hooks) = self.shared.hooks.wire_config() {
            payload.insert("hooks".to_string(), hooks.clone());
        }

        if !self.shared.sdk_mcp_servers.is_empty() {
            let mut names: Vec<&str> = self
                .shared
                .sdk_mcp_servers
                .keys()
                .map(String::as_str)
                .collect();
            names.sort_unstable();
            payload.insert("sdkMcpServers".to_string(), json!(names));
        }

        if let Some(agents) = &self.shared.agents {
            if !agents.is_empty() {
                payload.insert("agents".to_string(), agents_to_wire(agents));
            }
        }

        self.send_request("initialize", payload, DEFAULT_REQUEST_TIMEOUT)
            .await
    }

    /// Send an `interrupt` control request and wait for the acknowledgment.
    ///
    /// # Errors
    /// Fails on timeout or transport failure.
    pub async fn interrupt(&self) -> Result<()> {
        self.send_request("interrupt", serde_json::Map::new(), DEFAULT_REQUEST_TIMEOUT)
            .await
            .map(|_| ())
    }

    /// Send a `rewind_files` control request for the given user message UUID.
    ///
    /// # Errors
    /// Fails on timeout or transport failure.
    pub async fn rewind_files(&self, user_message_uuid: &str) -> Result<Value> {
        let mut payload = serde_json::Map::new();
        payload.insert("user_message_uuid".to_string(), json!(user_message_uuid));
        self.send_request("rewind_files", payload, DEFAULT_REQUEST_TIMEOUT)
            .await
    }

    /// Send an outbound control request and await its correlated response.
    ///
    /// Allocates a fresh request id, registers an awaiter, writes the
    /// envelope, and resolves on the first of: a matching response, a
    /// transport failure (fast-fail), or the timeout. On timeout a
    /// `control_cancel_request` bearing the same id is written and the call
    /// fails with [`ClaudeError::ControlTimeout`]. Dropping the returned
    /// future mid-wait also clears the table entry and emits the cancel.
    ///
    /// # Errors
    /// `ControlTimeout`, `ControlProtocol` (error response), or the
    /// transport's failure.
    pub async fn send_request(
        &self,
        subtype: &str,
        payload: serde_json::Map<String, Value>,
        timeout: Duration,
    ) -> Result<Value> {
        let shared = &self.shared;
        let request_id = format!(
            "req_{}_{}",
            shared.counter.fetch_add(1, Ordering::SeqCst) + 1,
            shared.nonce
        );

        let (tx, rx) = oneshot::channel();
        {
            let mut pending = shared
                .pending
                .lock()
                .map_err(|_| ClaudeError::control_protocol("pending table lock poisoned"))?;
            pending.insert(request_id.clone(), tx);
        }
        let mut guard = PendingGuard {
            shared: shared.clone(),
            request_id: request_id.clone(),
            armed: true,
        };

        let mut request = serde_json::Map::new();
        request.insert("subtype".to_string(), json!(subtype));
        request.extend(payload);
        let envelope = json!({
            "type": "control_request",
            "request_id": request_id,
            "request": Value::Object(request),
        });

        if let Err(e) = shared.write_line(&envelope).await {
            guard.disarm();
            if let Ok(mut pending) = shared.pending.lock() {
                pending.remove(&request_id);
            }
            return Err(e);
        }

        tracing::debug!(request_id = %request_id, subtype, "sent control request");

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(result)) => {
                guard.disarm();
                result
            }
            Ok(Err(_)) => {
                guard.disarm();
                Err(ClaudeError::connection("control channel closed"))
            }
            Err(_) => {
                guard.disarm();
                if let Ok(mut pending) = shared.pending.lock() {
                    pending.remove(&request_id);
                }
                let _ = shared.write_line(&cancel_envelope(&request_id)).await;
                Err(ClaudeError::control_timeout(timeout.as_secs(), subtype))
            }
        }
    }

    /// Write one conversation message (e.g. a `user` envelope) to the child.
    ///
    /// # Errors
    /// Fails if the transport is not writable.
    pub async fn write_message(&self, message: &Value) -> Result<()> {
        self.shared.write_line(message).await
    }

    /// Write every message from the stream, then close the input side.
    ///
    /// # Errors
    /// Fails on the first write error.
    pub async fn stream_input<S>(&self, mut messages: S) -> Result<()>
    where
        S: Stream<Item = Value> + Unpin + Send,
    {
        while let Some(message) = messages.next().await {
            self.write_message(&message).await?;
        }
        self.end_input().await
    }

    /// Close the child's stdin; buffered reads continue to drain.
    ///
    /// # Errors
    /// Fails if closing the pipe fails.
    pub async fn end_input(&self) -> Result<()> {
        self.shared.transport.end_input().await
    }

    /// Close the session: cancel in-flight work, fail all pending requests,
    /// and shut the transport down. Idempotent.
    ///
    /// # Errors
    /// Returns transport shutdown errors.
    pub async fn close(&self) -> Result<()> {
        self.shared.cancel.cancel();
        self.shared
            .fail_pending_with(|| ClaudeError::canceled("session closed"));

        let task = self.demux_task.lock().ok().and_then(|mut slot| slot.take());
        if let Some(task) = task {
            let _ = tokio::time::timeout(Duration::from_millis(100), task).await;
        }

        self.shared.transport.close().await
    }
}

impl std::fmt::Debug for ProtocolHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtocolHandler")
            .field("pending", &self.pending_request_count())
            .field("hooks", &self.shared.hooks)
            .field(
                "sdk_mcp_servers",
                &self.shared.sdk_mcp_servers.keys().collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// Removes the pending entry and emits a cancel if the awaiting future is
/// dropped before it resolves.
struct PendingGuard {
    shared: Arc<Shared>,
    request_id: String,
    armed: bool,
}

impl PendingGuard {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let removed = self
            .shared
            .pending
            .lock()
            .ok()
            .and_then(|mut pending| pending.remove(&self.request_id));
        if removed.is_none() {
            return;
        }
        let shared = self.shared.clone();
        let request_id = self.request_id.clone();
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                let _ = shared.write_line(&cancel_envelope(&request_id)).await;
            });
        }
    }
}

fn cancel_envelope(request_id: &str) -> Value {
    json!({ "type": "control_cancel_request", "request_id": request_id })
}

fn agents_to_wire(agents: &HashMap<String, AgentDefinition>) -> Value {
    let mut list: Vec<Value> = Vec::with_capacity(agents.len());
    let mut names: Vec<&String> = agents.keys().collect();
    names.sort_unstable();
    for name in names {
        let def = &agents[name];
        let mut entry = json!({
            "name": name,
            "description": def.description,
            "prompt": def.prompt,
        });
        if let Some(tools) = &def.tools {
            entry["tools"] = json!(tools);
        }
        if let Some(model) = &def.model {
            entry["model"] = json!(model);
        }
        list.push(entry);
    }
    Value::Array(list)
}

impl Shared {
    async fn write_line(&self, value: &Value) -> Result<()> {
        let mut line = serde_json::to_string(value)?;
        line.push('\n');
        self.transport.write(&line).await
    }

    fn fail_pending_with(&self, make: impl Fn() -> ClaudeError) {
        let drained: Vec<(String, PendingSender)> = self
            .pending
            .lock()
            .map(|mut pending| pending.drain().collect())
            .unwrap_or_default();
        for (request_id, sender) in drained {
            tracing::debug!(request_id = %request_id, "failing pending control request");
            let _ = sender.send(Err(make()));
        }
    }

    async fn forward_message(&self, item: Result<Value>) {
        tokio::select! {
            () = self.cancel.cancelled() => {}
            result = self.message_tx.send(item) => {
                if result.is_err() {
                    tracing::debug!("conversation receiver dropped; discarding message");
                }
            }
        }
    }

    /// Demultiplex the transport's inbound stream until it ends, errors, or
    /// the session is cancelled.
    async fn demux(
        shared: Arc<Self>,
        mut inbound: mpsc::UnboundedReceiver<Result<Value>>,
    ) {
        loop {
            let item = tokio::select! {
                () = shared.cancel.cancelled() => break,
                item = inbound.recv() => item,
            };
            let Some(item) = item else { break };

            match item {
                Ok(value) => Self::route(&shared, value).await,
                Err(err) => {
                    // Fast-fail: every pending awaiter observes the exit now
                    // rather than at its own timeout.
                    tracing::debug!(error = %err, "transport failed; failing pending requests");
                    shared.fail_pending_with(|| err.duplicate());
                    shared.forward_message(Err(err)).await;
                    return;
                }
            }
        }

        // EOF without a transport error: nothing more can resolve
        shared.fail_pending_with(|| ClaudeError::connection("transport closed"));
    }

    async fn route(shared: &Arc<Self>, value: Value) {
        match value.get("type").and_then(Value::as_str) {
            Some("control_response") => shared.resolve_response(&value),
            Some("control_request") => {
                let Some(request_id) = value.get("request_id").and_then(Value::as_str) else {
                    tracing::warn!("control request without request_id");
                    return;
                };
                let request = value.get("request").cloned().unwrap_or(Value::Null);
                tokio::spawn(Self::handle_control_request(
                    shared.clone(),
                    request_id.to_string(),
                    request,
                ));
            }
            Some("control_cancel_request") => {
                let request_id = value.get("request_id").and_then(Value::as_str);
                let token = request_id.and_then(|id| {
                    shared
                        .inflight
                        .lock()
                        .ok()
                        .and_then(|inflight| inflight.get(id).cloned())
                });
                match token {
                    Some(token) => token.cancel(),
                    None => tracing::debug!(
                        request_id = request_id.unwrap_or("<missing>"),
                        "cancel for unknown control request"
                    ),
                }
            }
            Some("system") => {
                shared.capture_session_context(&value);
                shared.forward_message(Ok(value)).await;
            }
            Some("result") => {
                shared.first_result_tx.send_replace(true);
                shared.forward_message(Ok(value)).await;
            }
            _ => shared.forward_message(Ok(value)).await,
        }
    }

    fn capture_session_context(&self, value: &Value) {
        if value.get("subtype").and_then(Value::as_str) != Some("init") {
            return;
        }
        if let Ok(mut session) = self.session.lock() {
            if let Some(session_id) = value.get("session_id").and_then(Value::as_str) {
                session.session_id = Some(session_id.to_string());
            }
            if let Some(cwd) = value.get("cwd").and_then(Value::as_str) {
                session.cwd = Some(cwd.to_string());
            }
        }
    }

    fn resolve_response(&self, value: &Value) {
        let Some(response) = value.get("response") else {
            tracing::warn!("control response without response body");
            return;
        };
        let Some(request_id) = response.get("request_id").and_then(Value::as_str) else {
            tracing::warn!("control response without request_id");
            return;
        };

        let sender = self
            .pending
            .lock()
            .ok()
            .and_then(|mut pending| pending.remove(request_id));
        let Some(sender) = sender else {
            // Late arrival after a timeout or cancel
            tracing::debug!(request_id, "dropping control response with no pending request");
            return;
        };

        let result = if response.get("subtype").and_then(Value::as_str) == Some("error") {
            Err(ClaudeError::control_protocol(
                response
                    .get("error")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown control error")
                    .to_string(),
            ))
        } else {
            Ok(response.get("response").cloned().unwrap_or(Value::Null))
        };
        let _ = sender.send(result);
    }

    /// Handle one inbound control request on its own task.
    ///
    /// Exactly one `control_response` with the same id is written unless the
    /// CLI cancels the request first (the cancel releases it from any reply)
    /// or the session closes.
    async fn handle_control_request(shared: Arc<Self>, request_id: String, request: Value) {
        let token = shared.cancel.child_token();
        if let Ok(mut inflight) = shared.inflight.lock() {
            inflight.insert(request_id.clone(), token.clone());
        }

        let outcome = tokio::select! {
            () = token.cancelled() => None,
            result = shared.dispatch(&request, &token) => Some(result),
        };

        if let Ok(mut inflight) = shared.inflight.lock() {
            inflight.remove(&request_id);
        }

        let Some(result) = outcome else {
            tracing::debug!(request_id = %request_id, "inbound control request cancelled");
            return;
        };

        let envelope = match result {
            Ok(payload) => json!({
                "type": "control_response",
                "response": {
                    "subtype": "success",
                    "request_id": request_id,
                    "response": payload,
                },
            }),
            Err(e) => json!({
                "type": "control_response",
                "response": {
                    "subtype": "error",
                    "request_id": request_id,
                    "error": e.to_string(),
                },
            }),
        };

        if let Err(e) = shared.write_line(&envelope).await {
            tracing::warn!(error = %e, "failed to write control response");
        }
    }

    async fn dispatch(&self, request: &Value, token: &CancellationToken) -> Result<Value> {
        let subtype = request
            .get("subtype")
            .and_then(Value::as_str)
            .ok_or_else(|| ClaudeError::control_protocol("control request without subtype"))?;

        match subtype {
            "can_use_tool" => self.handle_can_use_tool(request, token).await,
            "hook_callback" => self.handle_hook_callback(request, token).await,
            "mcp_message" => self.handle_mcp_message(request).await,
            other => Err(ClaudeError::control_protocol(format!(
                "unsupported control request subtype: {other}"
            ))),
        }
    }

    async fn handle_can_use_tool(
        &self,
        request: &Value,
        token: &CancellationToken,
    ) -> Result<Value> {
        let callback = self
            .can_use_tool
            .as_ref()
            .ok_or_else(|| ClaudeError::control_protocol("can_use_tool callback is not configured"))?;

        let tool_name = request
            .get("tool_name")
            .and_then(Value::as_str)
            .ok_or_else(|| ClaudeError::control_protocol("can_use_tool request without tool_name"))?
            .to_string();
        let input = request.get("input").cloned().unwrap_or_else(|| json!({}));
        let suggestions: Vec<PermissionUpdate> = request
            .get("permission_suggestions")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default();

        let context = ToolPermissionContext::with_cancellation(suggestions, token.clone());
        let decision = callback.call(tool_name, input, context).await?;
        Ok(marshal_permission_result(&decision))
    }

    async fn handle_hook_callback(
        &self,
        request: &Value,
        token: &CancellationToken,
    ) -> Result<Value> {
        let callback_id = request
            .get("callback_id")
            .and_then(Value::as_str)
            .ok_or_else(|| ClaudeError::hook("hook_callback request without callback_id"))?;
        let callback = self
            .hooks
            .get(callback_id)
            .ok_or_else(|| ClaudeError::hook(format!("no hook registered for callback id {callback_id}")))?;

        let input = request.get("input").cloned().unwrap_or_else(|| json!({}));
        let tool_use_id = request
            .get("tool_use_id")
            .and_then(Value::as_str)
            .map(String::from);

        let context = {
            let session = self.session.lock().ok();
            HookContext::new(
                session.as_ref().and_then(|s| s.session_id.clone()),
                session.as_ref().and_then(|s| s.cwd.clone()),
                Some(token.clone()),
            )
        };

        let output = callback.call(input, tool_use_id, context).await?;
        Ok(serde_json::to_value(output)?)
    }

    async fn handle_mcp_message(&self, request: &Value) -> Result<Value> {
        let server_name = request
            .get("server_name")
            .and_then(Value::as_str)
            .ok_or_else(|| ClaudeError::mcp("mcp_message request without server_name"))?;
        let server = self
            .sdk_mcp_servers
            .get(server_name)
            .ok_or_else(|| ClaudeError::mcp(format!("no SDK MCP server named {server_name}")))?;
        let message = request
            .get("message")
            .ok_or_else(|| ClaudeError::mcp("mcp_message request without message"))?;

        let response = route_mcp_message(server.as_ref(), message).await;
        Ok(json!({ "mcp_response": response }))
    }
}

/// Answer one JSON-RPC message addressed to an SDK MCP server.
async fn route_mcp_message(server: &dyn SdkMcpServer, message: &Value) -> Value {
    let id = message.get("id").cloned().unwrap_or(Value::Null);
    let method = message.get("method").and_then(Value::as_str).unwrap_or("");

    let result: std::result::Result<Value, (i64, String)> = match method {
        "initialize" => Ok(json!({
            "protocolVersion": "2024-11-05",
            "capabilities": { "tools": {} },
            "serverInfo": { "name": server.name(), "version": server.version() },
        })),
        "notifications/initialized" => Ok(json!({})),
        "tools/list" => match serde_json::to_value(server.tools()) {
            Ok(tools) => Ok(json!({ "tools": tools })),
            Err(e) => Err((-32603, format!("failed to serialize tools: {e}"))),
        },
        "tools/call" => {
            let params = message.get("params").cloned().unwrap_or_else(|| json!({}));
            let name = params.get("name").and_then(Value::as_str).unwrap_or("");
            let arguments = params.get("arguments").cloned().unwrap_or_else(|| json!({}));
            match server.call_tool(name, arguments).await {
                Ok(result) => match serde_json::to_value(result) {
                    Ok(value) => Ok(value),
                    Err(e) => Err((-32603, format!("failed to serialize tool result: {e}"))),
                },
                // Raised tool errors stay inside the result, flagged isError
                Err(e) => Ok(json!({
                    "content": [{ "type": "text", "text": e.to_string() }],
                    "isError": true,
                })),
            }
        }
        other => Err((-32601, format!("Method not found: {other}"))),
    };

    match result {
        Ok(result) => json!({ "jsonrpc": "2.0", "id": id, "result": result }),
        Err((code, msg)) => json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": { "code": code, "message": msg },
        }),
    }
}

/// Marshal a permission decision into the CLI's response shape.
fn marshal_permission_result(result: &PermissionResult) -> Value {
    match result {
        PermissionResult::Allow(allow) => {
            let mut obj = json!({ "behavior": "allow" });
            if let Some(updated_input) = &allow.updated_input {
                obj["updatedInput"] = updated_input.clone();
            }
            if let Some(updated_permissions) = &allow.updated_permissions {
                if let Ok(value) = serde_json::to_value(updated_permissions) {
                    obj["updatedPermissions"] = value;
                }
            }
            obj
        }
        PermissionResult::Deny(deny) => {
            let mut obj = json!({ "behavior": "deny", "message": deny.message });
            if deny.interrupt {
                obj["interrupt"] = json!(true);
            }
            obj
        }
    }
}
