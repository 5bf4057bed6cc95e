//! Integration tests for the control protocol handler
//!
//! These drive a `ProtocolHandler` over a mock transport: the test injects
//! what the CLI would write to stdout and captures what the SDK writes to
//! stdin, covering request/response correlation, timeouts, fast-fail on
//! child exit, and inbound callback dispatch.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use claude_agent_sdk::callbacks::FnPermissionCallback;
use claude_agent_sdk::hooks::{hook_callback, HookMatcherBuilder};
use claude_agent_sdk::mcp::{CallToolResult, SdkMcpToolServer, ToolDefinition};
use claude_agent_sdk::types::{
    CanUseToolCallback, ClaudeAgentOptions, HookEvent, HookOutput, McpServerConfig, McpServers,
    PermissionResult, PermissionResultAllow, SdkServerConfig,
};
use claude_agent_sdk::{ClaudeError, ProtocolHandler, Result, Transport};
use tokio::sync::mpsc;

// ============================================================================
// Mock transport
// ============================================================================

struct MockTransport {
    incoming: StdMutex<Option<mpsc::UnboundedReceiver<Result<Value>>>>,
    writes: mpsc::UnboundedSender<Value>,
    ready: AtomicBool,
}

impl MockTransport {
    fn new() -> (
        Self,
        mpsc::UnboundedSender<Result<Value>>,
        mpsc::UnboundedReceiver<Value>,
    ) {
        let (incoming_tx, incoming_rx) = mpsc::unbounded_channel();
        let (writes_tx, writes_rx) = mpsc::unbounded_channel();
        let transport = Self {
            incoming: StdMutex::new(Some(incoming_rx)),
            writes: writes_tx,
            ready: AtomicBool::new(true),
        };
        (transport, incoming_tx, writes_rx)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&mut self) -> Result<()> {
        self.ready.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn read_messages(&mut self) -> mpsc::UnboundedReceiver<Result<Value>> {
        self.incoming
            .lock()
            .unwrap()
            .take()
            .expect("read_messages called twice")
    }

    async fn write(&self, data: &str) -> Result<()> {
        if !self.ready.load(Ordering::SeqCst) {
            return Err(ClaudeError::connection("Transport is not ready for writing"));
        }
        let value: Value = serde_json::from_str(data.trim())?;
        self.writes
            .send(value)
            .map_err(|_| ClaudeError::connection("write channel closed"))
    }

    async fn end_input(&self) -> Result<()> {
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    async fn close(&self) -> Result<()> {
        self.ready.store(false, Ordering::SeqCst);
        Ok(())
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn handler_with(
    options: &ClaudeAgentOptions,
) -> (
    Arc<ProtocolHandler>,
    mpsc::UnboundedSender<Result<Value>>,
    mpsc::UnboundedReceiver<Value>,
) {
    let (transport, incoming, writes) = MockTransport::new();
    let handler = Arc::new(ProtocolHandler::new(Box::new(transport), options));
    (handler, incoming, writes)
}

async fn next_write(writes: &mut mpsc::UnboundedReceiver<Value>) -> Value {
    tokio::time::timeout(Duration::from_secs(1), writes.recv())
        .await
        .expect("timed out waiting for a write")
        .expect("write channel closed")
}

fn deny_callback(message: &'static str) -> CanUseToolCallback {
    Arc::new(FnPermissionCallback::new(move |_tool, _input, _ctx| {
        Box::pin(async move { Ok(PermissionResult::deny(message)) })
    }))
}

fn success_response(request_id: &str, payload: Value) -> Value {
    json!({
        "type": "control_response",
        "response": {
            "subtype": "success",
            "request_id": request_id,
            "response": payload,
        },
    })
}

// ============================================================================
// Outbound requests
// ============================================================================

#[tokio::test]
async fn initialize_advertises_hooks_servers_and_agents() {
    let hook = hook_callback(|_input, _id, _ctx| async move { Ok(HookOutput::default()) });
    let mut hooks = HashMap::new();
    hooks.insert(
        HookEvent::PreToolUse,
        vec![HookMatcherBuilder::new(Some("Bash")).add_hook(hook).build()],
    );

    let mut servers = HashMap::new();
    servers.insert(
        "calc".to_string(),
        McpServerConfig::Sdk(SdkServerConfig {
            name: "calc".to_string(),
            instance: Arc::new(SdkMcpToolServer::new("calc")),
        }),
    );

    let mut agents = HashMap::new();
    agents.insert(
        "researcher".to_string(),
        claude_agent_sdk::AgentDefinition {
            description: "Research assistant".to_string(),
            prompt: "You research things".to_string(),
            tools: Some(vec!["Read".to_string()]),
            model: None,
        },
    );

    let options = ClaudeAgentOptions::builder()
        .hooks(hooks)
        .mcp_servers(McpServers::Dict(servers))
        .agents(agents)
        .build();
    let (handler, incoming, mut writes) = handler_with(&options);

    let init_handler = handler.clone();
    let init_task = tokio::spawn(async move { init_handler.initialize().await });

    let request = next_write(&mut writes).await;
    assert_eq!(request["type"], "control_request");
    assert_eq!(request["request"]["subtype"], "initialize");

    // Hook table carries generated callback ids under the event name
    let entry = &request["request"]["hooks"]["PreToolUse"][0];
    assert_eq!(entry["matcher"], "Bash");
    let callback_id = entry["hookCallbackIds"][0].as_str().unwrap();
    assert!(callback_id.starts_with("hook_"));

    assert_eq!(request["request"]["sdkMcpServers"], json!(["calc"]));
    assert_eq!(request["request"]["agents"][0]["name"], "researcher");

    let request_id = request["request_id"].as_str().unwrap();
    incoming
        .send(Ok(success_response(request_id, json!({"commands": []}))))
        .unwrap();

    let response = init_task.await.unwrap().unwrap();
    assert_eq!(response, json!({"commands": []}));
    assert_eq!(handler.pending_request_count(), 0);
}

#[tokio::test]
async fn request_ids_are_monotonic_within_the_session() {
    let options = ClaudeAgentOptions::default();
    let (handler, incoming, mut writes) = handler_with(&options);

    for expected_n in 1..=3 {
        let h = handler.clone();
        let task = tokio::spawn(async move {
            h.send_request("interrupt", serde_json::Map::new(), Duration::from_secs(1))
                .await
        });
        let request = next_write(&mut writes).await;
        let id = request["request_id"].as_str().unwrap().to_string();
        assert!(id.starts_with(&format!("req_{expected_n}_")));
        incoming.send(Ok(success_response(&id, json!({})))).unwrap();
        task.await.unwrap().unwrap();
    }
}

#[tokio::test]
async fn request_timeout_sends_cancel_and_empties_pending_table() {
    let options = ClaudeAgentOptions::default();
    let (handler, _incoming, mut writes) = handler_with(&options);

    // Silent child: nothing ever answers
    let err = handler
        .send_request(
            "initialize",
            serde_json::Map::new(),
            Duration::from_millis(50),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ClaudeError::ControlTimeout { .. }));

    let request = next_write(&mut writes).await;
    assert_eq!(request["type"], "control_request");
    let request_id = request["request_id"].as_str().unwrap();

    let cancel = next_write(&mut writes).await;
    assert_eq!(cancel["type"], "control_cancel_request");
    assert_eq!(cancel["request_id"], request_id);

    assert_eq!(handler.pending_request_count(), 0);
}

#[tokio::test]
async fn error_response_fails_the_awaiter() {
    let options = ClaudeAgentOptions::default();
    let (handler, incoming, mut writes) = handler_with(&options);

    let h = handler.clone();
    let task = tokio::spawn(async move {
        h.send_request("rewind_files", serde_json::Map::new(), Duration::from_secs(1))
            .await
    });

    let request = next_write(&mut writes).await;
    let request_id = request["request_id"].as_str().unwrap();
    incoming
        .send(Ok(json!({
            "type": "control_response",
            "response": {
                "subtype": "error",
                "request_id": request_id,
                "error": "no checkpoint for that message",
            },
        })))
        .unwrap();

    let err = task.await.unwrap().unwrap_err();
    match err {
        ClaudeError::ControlProtocol(msg) => assert!(msg.contains("no checkpoint")),
        other => panic!("expected ControlProtocol, got {other:?}"),
    }
}

#[tokio::test]
async fn abnormal_exit_fast_fails_all_pending_requests() {
    let options = ClaudeAgentOptions::default();
    let (handler, incoming, mut writes) = handler_with(&options);

    // Three requests in flight, all with long timeouts
    let mut tasks = Vec::new();
    for _ in 0..3 {
        let h = handler.clone();
        tasks.push(tokio::spawn(async move {
            h.send_request("interrupt", serde_json::Map::new(), Duration::from_secs(60))
                .await
        }));
    }
    for _ in 0..3 {
        next_write(&mut writes).await;
    }
    assert_eq!(handler.pending_request_count(), 3);

    // Child exits with code 2; every awaiter must observe it promptly
    incoming
        .send(Err(ClaudeError::process("Command failed", 2, None)))
        .unwrap();

    for task in tasks {
        let result = tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("fast-fail did not resolve the awaiter in time")
            .unwrap();
        match result.unwrap_err() {
            ClaudeError::Process { exit_code, .. } => assert_eq!(exit_code, 2),
            other => panic!("expected ProcessError, got {other:?}"),
        }
    }
    assert_eq!(handler.pending_request_count(), 0);
}

#[tokio::test]
async fn close_fails_pending_and_is_idempotent() {
    let options = ClaudeAgentOptions::default();
    let (handler, _incoming, mut writes) = handler_with(&options);

    let h = handler.clone();
    let task = tokio::spawn(async move {
        h.send_request("interrupt", serde_json::Map::new(), Duration::from_secs(60))
            .await
    });
    next_write(&mut writes).await;
    assert_eq!(handler.pending_request_count(), 1);

    handler.close().await.unwrap();

    let result = tokio::time::timeout(Duration::from_secs(1), task)
        .await
        .expect("close did not resolve the awaiter")
        .unwrap();
    assert!(matches!(result.unwrap_err(), ClaudeError::Canceled(_)));
    assert_eq!(handler.pending_request_count(), 0);

    handler.close().await.unwrap();
}

#[tokio::test]
async fn late_control_response_is_dropped() {
    let options = ClaudeAgentOptions::default();
    let (handler, incoming, _writes) = handler_with(&options);
    let mut messages = handler.take_message_receiver().unwrap();

    incoming
        .send(Ok(success_response("req_99_stale", json!({}))))
        .unwrap();
    incoming
        .send(Ok(json!({"type": "system", "subtype": "status"})))
        .unwrap();

    // Only the conversation message comes through; the stale response is gone
    let forwarded = tokio::time::timeout(Duration::from_secs(1), messages.recv())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(forwarded["subtype"], "status");
}

// ============================================================================
// Conversation forwarding
// ============================================================================

#[tokio::test]
async fn conversation_messages_forward_in_read_order() {
    let options = ClaudeAgentOptions::default();
    let (handler, incoming, _writes) = handler_with(&options);
    let mut messages = handler.take_message_receiver().unwrap();

    let inputs = [
        json!({"type": "system", "subtype": "init", "session_id": "s1"}),
        json!({"type": "assistant", "message": {"model": "m", "content": []}}),
        json!({"type": "result", "subtype": "success", "duration_ms": 1,
               "duration_api_ms": 1, "is_error": false, "num_turns": 1, "session_id": "s1"}),
    ];
    for input in &inputs {
        incoming.send(Ok(input.clone())).unwrap();
    }

    for expected in &inputs {
        let got = tokio::time::timeout(Duration::from_secs(1), messages.recv())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(&got, expected);
    }
}

#[tokio::test]
async fn first_result_watcher_fires_on_result() {
    let options = ClaudeAgentOptions::default();
    let (handler, incoming, _writes) = handler_with(&options);
    let _messages = handler.take_message_receiver().unwrap();
    let mut watcher = handler.first_result_watcher();

    assert!(!*watcher.borrow());
    incoming
        .send(Ok(json!({"type": "result", "subtype": "success", "duration_ms": 1,
               "duration_api_ms": 1, "is_error": false, "num_turns": 1, "session_id": "s"})))
        .unwrap();

    tokio::time::timeout(Duration::from_secs(1), watcher.wait_for(|seen| *seen))
        .await
        .expect("first result was not signalled")
        .unwrap();
}

// ============================================================================
// Inbound dispatch
// ============================================================================

#[tokio::test]
async fn inbound_permission_check_denied() {
    let options = ClaudeAgentOptions::builder()
        .can_use_tool(deny_callback("no shell"))
        .build();
    let (_handler, incoming, mut writes) = handler_with(&options);

    incoming
        .send(Ok(json!({
            "type": "control_request",
            "request_id": "r1",
            "request": {
                "subtype": "can_use_tool",
                "tool_name": "Bash",
                "input": {"cmd": "ls"},
            },
        })))
        .unwrap();

    let response = next_write(&mut writes).await;
    assert_eq!(
        response,
        json!({
            "type": "control_response",
            "response": {
                "subtype": "success",
                "request_id": "r1",
                "response": {"behavior": "deny", "message": "no shell"},
            },
        })
    );
}

#[tokio::test]
async fn inbound_permission_check_allow_with_updated_input() {
    let callback: CanUseToolCallback = Arc::new(FnPermissionCallback::new(|_tool, input, _ctx| {
        Box::pin(async move {
            Ok(PermissionResult::Allow(PermissionResultAllow {
                updated_input: Some(json!({"cmd": format!("{} -la", input["cmd"].as_str().unwrap_or("")) })),
                updated_permissions: None,
            }))
        })
    }));
    let options = ClaudeAgentOptions::builder().can_use_tool(callback).build();
    let (_handler, incoming, mut writes) = handler_with(&options);

    incoming
        .send(Ok(json!({
            "type": "control_request",
            "request_id": "r2",
            "request": {
                "subtype": "can_use_tool",
                "tool_name": "Bash",
                "input": {"cmd": "ls"},
            },
        })))
        .unwrap();

    let response = next_write(&mut writes).await;
    let payload = &response["response"]["response"];
    assert_eq!(payload["behavior"], "allow");
    assert_eq!(payload["updatedInput"]["cmd"], "ls -la");
}

#[tokio::test]
async fn inbound_permission_without_callback_is_an_error_response() {
    let options = ClaudeAgentOptions::default();
    let (_handler, incoming, mut writes) = handler_with(&options);

    incoming
        .send(Ok(json!({
            "type": "control_request",
            "request_id": "r3",
            "request": {"subtype": "can_use_tool", "tool_name": "Bash", "input": {}},
        })))
        .unwrap();

    let response = next_write(&mut writes).await;
    assert_eq!(response["response"]["subtype"], "error");
    assert!(response["response"]["error"]
        .as_str()
        .unwrap()
        .contains("not configured"));
}

#[tokio::test]
async fn inbound_hook_callback_round_trip() {
    let hook = hook_callback(|input, tool_use_id, _ctx| async move {
        assert_eq!(input["tool_name"], "Bash");
        assert_eq!(tool_use_id.as_deref(), Some("tu_1"));
        Ok(HookOutput {
            system_message: Some("observed".to_string()),
            ..Default::default()
        })
    });
    let mut hooks = HashMap::new();
    hooks.insert(
        HookEvent::PreToolUse,
        vec![HookMatcherBuilder::new(Some("*")).add_hook(hook).build()],
    );
    let options = ClaudeAgentOptions::builder().hooks(hooks).build();
    let (handler, incoming, mut writes) = handler_with(&options);

    // Learn the generated callback id from the initialize request
    let init_handler = handler.clone();
    let init_task = tokio::spawn(async move { init_handler.initialize().await });
    let init_request = next_write(&mut writes).await;
    let callback_id = init_request["request"]["hooks"]["PreToolUse"][0]["hookCallbackIds"][0]
        .as_str()
        .unwrap()
        .to_string();
    let init_id = init_request["request_id"].as_str().unwrap();
    incoming
        .send(Ok(success_response(init_id, json!({}))))
        .unwrap();
    init_task.await.unwrap().unwrap();

    incoming
        .send(Ok(json!({
            "type": "control_request",
            "request_id": "r4",
            "request": {
                "subtype": "hook_callback",
                "callback_id": callback_id,
                "input": {"tool_name": "Bash"},
                "tool_use_id": "tu_1",
            },
        })))
        .unwrap();

    let response = next_write(&mut writes).await;
    assert_eq!(response["response"]["subtype"], "success");
    assert_eq!(response["response"]["response"]["systemMessage"], "observed");
}

#[tokio::test]
async fn inbound_hook_callback_unknown_id() {
    let options = ClaudeAgentOptions::default();
    let (_handler, incoming, mut writes) = handler_with(&options);

    incoming
        .send(Ok(json!({
            "type": "control_request",
            "request_id": "r5",
            "request": {"subtype": "hook_callback", "callback_id": "hook_404", "input": {}},
        })))
        .unwrap();

    let response = next_write(&mut writes).await;
    assert_eq!(response["response"]["subtype"], "error");
    assert!(response["response"]["error"].as_str().unwrap().contains("hook_404"));
}

#[tokio::test]
async fn inbound_mcp_message_tools_call() {
    let server = SdkMcpToolServer::new("calc").tool(
        ToolDefinition::new("add", "Add two numbers", json!({"type": "object"})),
        |args| {
            Box::pin(async move {
                let a = args["a"].as_i64().unwrap_or(0);
                let b = args["b"].as_i64().unwrap_or(0);
                Ok(CallToolResult::text((a + b).to_string()))
            })
        },
    );
    let mut servers = HashMap::new();
    servers.insert(
        "calc".to_string(),
        McpServerConfig::Sdk(SdkServerConfig {
            name: "calc".to_string(),
            instance: Arc::new(server),
        }),
    );
    let options = ClaudeAgentOptions::builder()
        .mcp_servers(McpServers::Dict(servers))
        .build();
    let (_handler, incoming, mut writes) = handler_with(&options);

    incoming
        .send(Ok(json!({
            "type": "control_request",
            "request_id": "r6",
            "request": {
                "subtype": "mcp_message",
                "server_name": "calc",
                "message": {
                    "jsonrpc": "2.0",
                    "id": 42,
                    "method": "tools/call",
                    "params": {"name": "add", "arguments": {"a": 20, "b": 22}},
                },
            },
        })))
        .unwrap();

    let response = next_write(&mut writes).await;
    let rpc = &response["response"]["response"]["mcp_response"];
    assert_eq!(rpc["jsonrpc"], "2.0");
    assert_eq!(rpc["id"], 42);
    assert_eq!(rpc["result"]["content"][0]["text"], "42");
}

#[tokio::test]
async fn inbound_mcp_message_unknown_server() {
    let options = ClaudeAgentOptions::default();
    let (_handler, incoming, mut writes) = handler_with(&options);

    incoming
        .send(Ok(json!({
            "type": "control_request",
            "request_id": "r7",
            "request": {
                "subtype": "mcp_message",
                "server_name": "ghost",
                "message": {"jsonrpc": "2.0", "id": 1, "method": "tools/list"},
            },
        })))
        .unwrap();

    let response = next_write(&mut writes).await;
    assert_eq!(response["response"]["subtype"], "error");
    assert!(response["response"]["error"].as_str().unwrap().contains("ghost"));
}

#[tokio::test]
async fn unsupported_subtype_gets_error_response() {
    let options = ClaudeAgentOptions::default();
    let (_handler, incoming, mut writes) = handler_with(&options);

    incoming
        .send(Ok(json!({
            "type": "control_request",
            "request_id": "r8",
            "request": {"subtype": "set_quantum_mode"},
        })))
        .unwrap();

    let response = next_write(&mut writes).await;
    assert_eq!(response["response"]["subtype"], "error");
    assert!(response["response"]["error"]
        .as_str()
        .unwrap()
        .contains("set_quantum_mode"));
}

#[tokio::test]
async fn cancel_request_suppresses_the_response() {
    // A callback slow enough that the cancel always wins
    let callback: CanUseToolCallback = Arc::new(FnPermissionCallback::new(|_tool, _input, _ctx| {
        Box::pin(async move {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(PermissionResult::allow())
        })
    }));
    let options = ClaudeAgentOptions::builder().can_use_tool(callback).build();
    let (_handler, incoming, mut writes) = handler_with(&options);

    incoming
        .send(Ok(json!({
            "type": "control_request",
            "request_id": "r9",
            "request": {"subtype": "can_use_tool", "tool_name": "Bash", "input": {}},
        })))
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    incoming
        .send(Ok(json!({"type": "control_cancel_request", "request_id": "r9"})))
        .unwrap();

    // The CLI cancelled; it no longer expects a response
    let quiet = tokio::time::timeout(Duration::from_millis(300), writes.recv()).await;
    assert!(quiet.is_err(), "cancelled handler must not respond");
}
