//! `ClaudeSDKClient` for bidirectional communication
//!
//! The client holds one session: one CLI process, one protocol handler, one
//! conversation stream. Messages can be sent while responses stream in;
//! interrupts, file rewinds, and pass-through control requests serialize
//! with respect to each other and to `send_message`.
//!
//! # Example
//!
//! ```no_run
//! use claude_agent_sdk::{ClaudeAgentOptions, ClaudeSDKClient, Message};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let options = ClaudeAgentOptions::default();
//! let mut client = ClaudeSDKClient::new(options, None).await?;
//!
//! client.send_message("Hello, Claude!").await?;
//!
//! while let Some(message) = client.next_message().await {
//!     match message? {
//!         Message::Assistant { message, .. } => {
//!             println!("Response: {:?}", message.content);
//!         }
//!         Message::Result { .. } => break,
//!         _ => {}
//!     }
//! }
//!
//! client.close().await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use futures::{Stream, StreamExt};
use serde_json::Value;
use tokio::sync::{mpsc, Mutex};

use crate::control::{ProtocolHandler, DEFAULT_REQUEST_TIMEOUT};
use crate::error::{ClaudeError, Result};
use crate::message::parse_message;
use crate::query::{user_envelope, validate_permission_options};
use crate::transport::{SubprocessTransport, Transport};
use crate::types::{ClaudeAgentOptions, Message, SessionId};

/// Client for bidirectional communication with the Claude Code CLI.
///
/// Created connected; [`close`](Self::close) tears the session down and is
/// idempotent. After `close` returns no further callbacks fire and the
/// message stream yields nothing new.
pub struct ClaudeSDKClient {
    handler: Arc<ProtocolHandler>,
    message_rx: mpsc::Receiver<Result<Value>>,
    session_id: Arc<StdMutex<Option<SessionId>>>,
    /// Serializes send_message / interrupt / rewind_files against each other
    op_lock: Mutex<()>,
}

impl ClaudeSDKClient {
    /// Spawn the CLI, connect, and run the initialize handshake.
    ///
    /// # Arguments
    /// * `options` - Configuration options
    /// * `cli_path` - Optional path to the Claude Code CLI (searched if None)
    ///
    /// # Errors
    /// Returns error if the CLI cannot be found, spawned, or initialized.
    pub async fn new(
        options: ClaudeAgentOptions,
        cli_path: Option<std::path::PathBuf>,
    ) -> Result<Self> {
        let options = validate_permission_options(options)?;

        let mut transport = SubprocessTransport::new(options.clone(), cli_path)?;
        transport.connect().await?;

        let handler = Arc::new(ProtocolHandler::new(Box::new(transport), &options));
        let message_rx = handler
            .take_message_receiver()
            .ok_or_else(|| ClaudeError::connection("message receiver unavailable"))?;

        if let Err(e) = handler.initialize().await {
            let _ = handler.close().await;
            return Err(e);
        }

        Ok(Self {
            handler,
            message_rx,
            session_id: Arc::new(StdMutex::new(None)),
            op_lock: Mutex::new(()),
        })
    }

    /// Send a user message to Claude.
    ///
    /// # Errors
    /// Returns error if the message cannot be written.
    pub async fn send_message(&self, content: impl Into<String>) -> Result<()> {
        let content = content.into();
        let _guard = self.op_lock.lock().await;
        self.handler.write_message(&user_envelope(&content)).await
    }

    /// Send a stream of raw wire envelopes.
    ///
    /// Unlike [`query_stream`](crate::query::query_stream) this does not end
    /// the input side when the stream finishes; the session stays open for
    /// further sends.
    ///
    /// # Errors
    /// Fails on the first write error.
    pub async fn send_messages<S>(&self, mut messages: S) -> Result<()>
    where
        S: Stream<Item = Value> + Unpin + Send,
    {
        while let Some(message) = messages.next().await {
            let _guard = self.op_lock.lock().await;
            self.handler.write_message(&message).await?;
        }
        Ok(())
    }

    /// Get the next message from the conversation stream.
    ///
    /// Returns `None` when the stream ends. Schema violations yield
    /// `Err(MessageParse)` and do not end the stream; transport failures
    /// yield their error as the final item.
    pub async fn next_message(&mut self) -> Option<Result<Message>> {
        let item = self.message_rx.recv().await?;
        let result = item.and_then(parse_message);
        if let Ok(message) = &result {
            self.capture_session_id(message);
        }
        Some(result)
    }

    /// Stream all conversation messages until the session ends.
    #[must_use = "receive_messages returns a stream that must be consumed"]
    pub fn receive_messages(&mut self) -> impl Stream<Item = Result<Message>> + '_ {
        async_stream::stream! {
            while let Some(result) = self.next_message().await {
                yield result;
            }
        }
    }

    /// Receive messages until (and including) the next `result` message.
    ///
    /// # Example
    ///
    /// ```no_run
    /// # use claude_agent_sdk::{ClaudeAgentOptions, ClaudeSDKClient, Message};
    /// # use futures::StreamExt;
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// # let options = ClaudeAgentOptions::default();
    /// # let mut client = ClaudeSDKClient::new(options, None).await?;
    /// client.send_message("Hello").await?;
    ///
    /// let mut messages = Box::pin(client.receive_response());
    /// while let Some(message) = messages.next().await {
    ///     match message? {
    ///         Message::Assistant { message, .. } => println!("{:?}", message),
    ///         Message::Result { .. } => println!("Done!"),
    ///         _ => {}
    ///     }
    /// }
    /// # Ok(())
    /// # }
    /// ```
    #[must_use = "receive_response returns a stream that must be consumed"]
    pub fn receive_response(&mut self) -> impl Stream<Item = Result<Message>> + '_ {
        async_stream::stream! {
            while let Some(result) = self.next_message().await {
                let is_result = matches!(&result, Ok(Message::Result { .. }));
                yield result;
                if is_result {
                    break;
                }
            }
        }
    }

    /// Interrupt the current turn.
    ///
    /// Sends an `interrupt` control request and waits for the CLI's
    /// acknowledgment.
    ///
    /// # Errors
    /// Fails on timeout or transport failure.
    pub async fn interrupt(&self) -> Result<()> {
        let _guard = self.op_lock.lock().await;
        self.handler.interrupt().await
    }

    /// Rewind checkpointed files to the state at a given user message.
    ///
    /// Requires `enable_file_checkpointing` in the options.
    ///
    /// # Errors
    /// Fails on timeout or transport failure.
    pub async fn rewind_files(&self, user_message_uuid: &str) -> Result<()> {
        let _guard = self.op_lock.lock().await;
        self.handler.rewind_files(user_message_uuid).await.map(|_| ())
    }

    /// Send a pass-through control request and return its response payload.
    ///
    /// For subtypes the SDK does not special-case (e.g.
    /// `set_permission_mode`).
    ///
    /// # Errors
    /// Fails on timeout, transport failure, or an error response.
    pub async fn send_control_request(
        &self,
        subtype: &str,
        payload: serde_json::Map<String, Value>,
        timeout: Option<Duration>,
    ) -> Result<Value> {
        let _guard = self.op_lock.lock().await;
        self.handler
            .send_request(subtype, payload, timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT))
            .await
    }

    /// Whether the transport currently accepts writes
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.handler.is_ready()
    }

    /// Session ID captured from received messages, if any yet
    #[must_use]
    pub fn session_id(&self) -> Option<SessionId> {
        self.session_id.lock().ok()?.clone()
    }

    /// Close the client and clean up resources. Idempotent.
    ///
    /// # Errors
    /// Returns error if cleanup fails.
    pub async fn close(&mut self) -> Result<()> {
        self.handler.close().await
    }

    fn capture_session_id(&self, message: &Message) {
        let sid = match message {
            Message::Result { session_id, .. } => Some(session_id.clone()),
            Message::System { subtype, data } if subtype == "init" => data
                .get("session_id")
                .and_then(Value::as_str)
                .map(SessionId::from),
            _ => None,
        };
        if let Some(sid) = sid {
            if let Ok(mut slot) = self.session_id.lock() {
                *slot = Some(sid);
            }
        }
    }
}

impl std::fmt::Debug for ClaudeSDKClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClaudeSDKClient")
            .field("connected", &self.is_connected())
            .field("session_id", &self.session_id())
            .finish()
    }
}
