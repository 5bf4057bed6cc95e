//! Subprocess transport implementation using the Claude Code CLI

use async_trait::async_trait;
use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::framer::JsonMessageAccumulator;
use super::{probe_cli_version, Transport, TransportState};
use crate::error::{ClaudeError, Result};
use crate::types::{ClaudeAgentOptions, McpServerConfig, McpServers, SystemPrompt, ToolsConfig};
use crate::VERSION;

const DEFAULT_MAX_BUFFER_SIZE: usize = 1024 * 1024; // 1MB
const DEFAULT_SCANNER_BUFFER_SIZE: usize = 64 * 1024;

// Command-line length limits; oversized --agents values are spilled to a file
const WINDOWS_CMD_LENGTH_LIMIT: usize = 8_000;
const NON_WINDOWS_CMD_LENGTH_LIMIT: usize = 100_000;

// Grace period between closing stdin / terminating and the unconditional kill
const KILL_GRACE_PERIOD: Duration = Duration::from_secs(2);

// Environment variables that must not be overridden by user options
const DANGEROUS_ENV_VARS: &[&str] = &[
    "LD_PRELOAD",
    "LD_LIBRARY_PATH",
    "DYLD_INSERT_LIBRARIES",
    "DYLD_LIBRARY_PATH",
    "PATH",
    "NODE_OPTIONS",
    "PYTHONPATH",
    "PERL5LIB",
    "RUBYLIB",
];

#[derive(Debug)]
struct StateInner {
    state: TransportState,
    exit_code: Option<i32>,
}

/// Subprocess transport for the Claude Code CLI.
///
/// Two locks coordinate access: a state mutex (short critical sections over
/// the lifecycle state and recorded exit code) and a write mutex that owns
/// the stdin handle for the full duration of a write. Writers read the state
/// and release it before taking the write lock; the close and end-input
/// paths take the write lock first and only then the state lock, so a writer
/// can never pass the ready check and then race a concurrent close.
pub struct SubprocessTransport {
    options: ClaudeAgentOptions,
    cli_path: PathBuf,
    cwd: Option<PathBuf>,
    max_buffer_size: usize,
    scanner_buffer_size: usize,
    state: Arc<StdMutex<StateInner>>,
    stdin: Arc<Mutex<Option<ChildStdin>>>,
    child: Arc<Mutex<Option<Child>>>,
    stdout: Option<ChildStdout>,
    temp_files: StdMutex<Vec<PathBuf>>,
    reader_task: StdMutex<Option<JoinHandle<()>>>,
    stderr_task: StdMutex<Option<JoinHandle<()>>>,
    cancellation_token: CancellationToken,
}

impl SubprocessTransport {
    /// Create a new subprocess transport
    ///
    /// # Arguments
    /// * `options` - Configuration options
    /// * `cli_path` - Optional path to the Claude Code CLI (searched if None)
    ///
    /// # Errors
    /// Returns error if the CLI cannot be found
    pub fn new(options: ClaudeAgentOptions, cli_path: Option<PathBuf>) -> Result<Self> {
        let cli_path = match cli_path {
            Some(path) => path,
            None => Self::find_cli()?,
        };

        let cwd = options.cwd.clone();
        let max_buffer_size = options.max_buffer_size.unwrap_or(DEFAULT_MAX_BUFFER_SIZE);
        let scanner_buffer_size = options
            .scanner_buffer_size
            .unwrap_or(DEFAULT_SCANNER_BUFFER_SIZE)
            .min(max_buffer_size);

        Ok(Self {
            options,
            cli_path,
            cwd,
            max_buffer_size,
            scanner_buffer_size,
            state: Arc::new(StdMutex::new(StateInner {
                state: TransportState::Uninitialized,
                exit_code: None,
            })),
            stdin: Arc::new(Mutex::new(None)),
            child: Arc::new(Mutex::new(None)),
            stdout: None,
            temp_files: StdMutex::new(Vec::new()),
            reader_task: StdMutex::new(None),
            stderr_task: StdMutex::new(None),
            cancellation_token: CancellationToken::new(),
        })
    }

    /// Find the Claude Code CLI binary
    fn find_cli() -> Result<PathBuf> {
        if let Ok(path) = which::which("claude") {
            return Ok(path);
        }

        let home = env::var("HOME").unwrap_or_else(|_| String::from("/root"));
        let home = PathBuf::from(home);
        let locations = [
            home.join(".npm-global/bin/claude"),
            PathBuf::from("/usr/local/bin/claude"),
            home.join(".local/bin/claude"),
            home.join("node_modules/.bin/claude"),
            home.join(".yarn/bin/claude"),
            home.join(".claude/local/claude"),
        ];

        for path in locations {
            if path.is_file() {
                return Ok(path);
            }
        }

        Err(ClaudeError::cli_not_found())
    }

    /// Get a child cancellation token for this transport
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.child_token()
    }

    /// Build the settings value, merging sandbox settings when present.
    ///
    /// Returns inline JSON when a sandbox override has to be merged in,
    /// otherwise the settings value passes through verbatim (it may be either
    /// inline JSON or a file path; the CLI accepts both). A settings path
    /// that does not exist is skipped silently, matching the upstream
    /// contract; a file that exists but does not parse is a hard error.
    fn build_settings_value(&self) -> Result<Option<String>> {
        let settings = self.options.settings.as_deref();
        let sandbox = self.options.sandbox.as_ref();

        match (settings, sandbox) {
            (None, None) => Ok(None),
            (Some(s), None) => Ok(Some(s.to_string())),
            (settings, Some(sandbox)) => {
                let mut settings_obj = serde_json::Map::new();

                if let Some(raw) = settings {
                    let trimmed = raw.trim();
                    let parsed: Option<serde_json::Map<String, serde_json::Value>> =
                        if trimmed.starts_with('{') && trimmed.ends_with('}') {
                            serde_json::from_str(trimmed).ok()
                        } else {
                            None
                        };

                    match parsed {
                        Some(obj) => settings_obj = obj,
                        None => match std::fs::read_to_string(trimmed) {
                            Ok(contents) => {
                                settings_obj =
                                    serde_json::from_str(&contents).map_err(|e| {
                                        ClaudeError::invalid_config(format!(
                                            "failed to parse settings file {trimmed}: {e}"
                                        ))
                                    })?;
                            }
                            Err(_) => {
                                tracing::debug!(settings = %trimmed, "settings value is neither JSON nor a readable file; skipping");
                            }
                        },
                    }
                }

                settings_obj.insert("sandbox".to_string(), sandbox.clone());
                Ok(Some(serde_json::Value::Object(settings_obj).to_string()))
            }
        }
    }

    /// Construct CLI arguments from the options.
    ///
    /// Input is always the streaming protocol; prompts travel over stdin as
    /// `user` messages rather than on the command line.
    #[allow(clippy::too_many_lines)]
    fn build_command(&self) -> Result<Vec<String>> {
        let mut args: Vec<String> = vec![
            "--output-format".into(),
            "stream-json".into(),
            "--verbose".into(),
        ];

        // System prompt; an explicit empty string avoids the CLI default
        match &self.options.system_prompt {
            None => {
                args.push("--system-prompt".into());
                args.push(String::new());
            }
            Some(SystemPrompt::String(s)) => {
                args.push("--system-prompt".into());
                args.push(s.clone());
            }
            Some(SystemPrompt::Preset(preset)) => {
                if let Some(append) = &preset.append {
                    args.push("--append-system-prompt".into());
                    args.push(append.clone());
                }
            }
        }

        // Base tool set
        if let Some(tools) = &self.options.tools {
            args.push("--tools".into());
            match tools {
                ToolsConfig::List(list) => {
                    args.push(
                        list.iter()
                            .map(crate::types::ToolName::as_str)
                            .collect::<Vec<_>>()
                            .join(","),
                    );
                }
                // The claude_code preset maps to the CLI's default set
                ToolsConfig::Preset(_) => args.push("default".into()),
            }
        }

        // Tool restrictions (filter from base tools)
        if !self.options.allowed_tools.is_empty() {
            args.push("--allowedTools".into());
            args.push(
                self.options
                    .allowed_tools
                    .iter()
                    .map(crate::types::ToolName::as_str)
                    .collect::<Vec<_>>()
                    .join(","),
            );
        }
        if !self.options.disallowed_tools.is_empty() {
            args.push("--disallowedTools".into());
            args.push(
                self.options
                    .disallowed_tools
                    .iter()
                    .map(crate::types::ToolName::as_str)
                    .collect::<Vec<_>>()
                    .join(","),
            );
        }

        if let Some(max_turns) = self.options.max_turns {
            args.push("--max-turns".into());
            args.push(max_turns.to_string());
        }

        if let Some(model) = &self.options.model {
            args.push("--model".into());
            args.push(model.clone());
        }
        if let Some(fallback) = &self.options.fallback_model {
            args.push("--fallback-model".into());
            args.push(fallback.clone());
        }

        if !self.options.betas.is_empty() {
            args.push("--betas".into());
            args.push(
                self.options
                    .betas
                    .iter()
                    .map(crate::types::SdkBeta::as_str)
                    .collect::<Vec<_>>()
                    .join(","),
            );
        }

        if let Some(max_budget) = self.options.max_budget_usd {
            args.push("--max-budget-usd".into());
            args.push(format!("{max_budget:.2}"));
        }
        if let Some(max_thinking) = self.options.max_thinking_tokens {
            args.push("--max-thinking-tokens".into());
            args.push(max_thinking.to_string());
        }

        if let Some(mode) = &self.options.permission_mode {
            args.push("--permission-mode".into());
            args.push(mode.as_str().into());
        }
        if let Some(tool) = &self.options.permission_prompt_tool_name {
            args.push("--permission-prompt-tool".into());
            args.push(tool.clone());
        }

        if self.options.continue_conversation {
            args.push("--continue".into());
        }
        if let Some(session_id) = &self.options.resume {
            args.push("--resume".into());
            args.push(session_id.as_str().into());
        }
        if self.options.fork_session {
            args.push("--fork-session".into());
        }

        if let Some(settings) = self.build_settings_value()? {
            args.push("--settings".into());
            args.push(settings);
        }

        for dir in &self.options.add_dirs {
            args.push("--add-dir".into());
            args.push(dir.to_string_lossy().into_owned());
        }

        // MCP servers: SDK servers cross the command line as name-only stubs
        match &self.options.mcp_servers {
            McpServers::Dict(servers) if !servers.is_empty() => {
                let mut servers_for_cli = serde_json::Map::new();
                for (name, config) in servers {
                    servers_for_cli.insert(name.clone(), serialize_mcp_config(config));
                }
                let config_json = serde_json::json!({ "mcpServers": servers_for_cli });
                args.push("--mcp-config".into());
                args.push(config_json.to_string());
            }
            McpServers::Path(path) => {
                args.push("--mcp-config".into());
                args.push(path.to_string_lossy().into_owned());
            }
            _ => {}
        }

        if self.options.include_partial_messages {
            args.push("--include-partial-messages".into());
        }

        if let Some(agents) = &self.options.agents {
            if !agents.is_empty() {
                args.push("--agents".into());
                args.push(serde_json::to_string(agents)?);
            }
        }

        args.push("--setting-sources".into());
        match &self.options.setting_sources {
            Some(sources) => args.push(
                sources
                    .iter()
                    .map(crate::types::SettingSource::as_str)
                    .collect::<Vec<_>>()
                    .join(","),
            ),
            None => args.push(String::new()),
        }

        for plugin in &self.options.plugins {
            let crate::types::SdkPluginConfig::Local { path } = plugin;
            args.push("--plugin-dir".into());
            args.push(path.clone());
        }

        for (flag, value) in &self.options.extra_args {
            args.push(format!("--{flag}"));
            if let Some(v) = value {
                args.push(v.clone());
            }
        }

        args.push("--input-format".into());
        args.push("stream-json".into());

        self.spill_oversized_agents(&mut args);

        Ok(args)
    }

    /// Replace an oversized `--agents` value with an `@file` reference.
    ///
    /// Failure to create or write the temp file is non-fatal; the original
    /// argument stays in place and the spawn gets to try its luck.
    fn spill_oversized_agents(&self, args: &mut [String]) {
        let cmd_len: usize = args.iter().map(|a| a.len() + 1).sum();
        let limit = if cfg!(windows) {
            WINDOWS_CMD_LENGTH_LIMIT
        } else {
            NON_WINDOWS_CMD_LENGTH_LIMIT
        };

        if cmd_len <= limit {
            return;
        }

        let Some(pos) = args.iter().position(|a| a == "--agents") else {
            return;
        };
        if pos + 1 >= args.len() {
            return;
        }

        match write_agents_temp_file(&args[pos + 1]) {
            Ok(path) => {
                tracing::warn!(
                    cmd_len,
                    limit,
                    path = %path.display(),
                    "command line length exceeds limit; passing --agents by file"
                );
                args[pos + 1] = format!("@{}", path.display());
                if let Ok(mut temp_files) = self.temp_files.lock() {
                    temp_files.push(path);
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to create temp file for long command line");
            }
        }
    }

    /// Construct the child's environment
    fn build_env(&self) -> Result<HashMap<String, String>> {
        let dangerous: Vec<&String> = self
            .options
            .env
            .keys()
            .filter(|key| DANGEROUS_ENV_VARS.contains(&key.as_str()))
            .collect();

        if !dangerous.is_empty() {
            let vars: Vec<&str> = dangerous.iter().map(|s| s.as_str()).collect();
            tracing::warn!(vars = ?vars, "rejected dangerous environment variables");
            return Err(ClaudeError::invalid_config(format!(
                "Dangerous environment variables detected: [{}]. These are blocked to prevent injection attacks.",
                vars.join(", ")
            )));
        }

        let mut process_env: HashMap<String, String> = env::vars().collect();
        for (key, value) in &self.options.env {
            process_env.insert(key.clone(), value.clone());
        }

        process_env.insert("CLAUDE_CODE_ENTRYPOINT".to_string(), "sdk-rust".to_string());
        process_env.insert("CLAUDE_AGENT_SDK_VERSION".to_string(), VERSION.to_string());
        if self.options.enable_file_checkpointing {
            process_env.insert(
                "CLAUDE_CODE_ENABLE_SDK_FILE_CHECKPOINTING".to_string(),
                "true".to_string(),
            );
        }
        if let Some(cwd) = &self.cwd {
            process_env.insert("PWD".to_string(), cwd.to_string_lossy().into_owned());
        }

        Ok(process_env)
    }

    fn set_state(&self, next: TransportState) {
        if let Ok(mut inner) = self.state.lock() {
            inner.state = next;
        }
    }
}

fn write_agents_temp_file(value: &str) -> std::io::Result<PathBuf> {
    use std::io::Write;

    let mut file = tempfile::Builder::new()
        .prefix("claude-agents-")
        .suffix(".json")
        .tempfile()?;
    file.write_all(value.as_bytes())?;
    let (_, path) = file.keep().map_err(|e| e.error)?;
    Ok(path)
}

/// Serialize an MCP server config for `--mcp-config`
fn serialize_mcp_config(config: &McpServerConfig) -> serde_json::Value {
    match config {
        McpServerConfig::Stdio(stdio) => {
            let mut obj = serde_json::json!({ "command": stdio.command });
            if let Some(args) = &stdio.args {
                obj["args"] = serde_json::json!(args);
            }
            if let Some(env) = &stdio.env {
                obj["env"] = serde_json::json!(env);
            }
            if let Some(server_type) = &stdio.server_type {
                obj["type"] = serde_json::json!(server_type);
            }
            obj
        }
        McpServerConfig::Sse(sse) => serde_json::json!({
            "type": sse.server_type,
            "url": sse.url,
            "headers": sse.headers,
        }),
        McpServerConfig::Http(http) => serde_json::json!({
            "type": http.server_type,
            "url": http.url,
            "headers": http.headers,
        }),
        McpServerConfig::Sdk(sdk) => serde_json::json!({
            "type": "sdk",
            "name": sdk.name,
        }),
    }
}

#[async_trait]
impl Transport for SubprocessTransport {
    async fn connect(&mut self) -> Result<()> {
        {
            let mut inner = self.state.lock().map_err(|_| poisoned_state())?;
            if inner.state != TransportState::Uninitialized {
                return Ok(());
            }
            inner.state = TransportState::Connecting;
        }

        // Non-fatal: warns when the CLI is older than the supported minimum
        probe_cli_version(&self.cli_path).await;

        let args = self.build_command()?;
        let process_env = self.build_env()?;

        let mut cmd = Command::new(&self.cli_path);
        cmd.args(&args);
        cmd.env_clear();
        cmd.envs(process_env);

        if let Some(cwd) = &self.cwd {
            if !cwd.is_dir() {
                self.set_state(TransportState::Closed);
                return Err(ClaudeError::connection(format!(
                    "working directory does not exist: {}",
                    cwd.display()
                )));
            }
            cmd.current_dir(cwd);
        }

        let pipe_stderr =
            self.options.stderr.is_some() || self.options.extra_args.contains_key("debug-to-stderr");

        cmd.stdin(Stdio::piped()).stdout(Stdio::piped()).stderr(if pipe_stderr {
            Stdio::piped()
        } else {
            Stdio::null()
        });
        cmd.kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            self.set_state(TransportState::Closed);
            ClaudeError::connection(format!("Failed to start Claude Code: {e}"))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ClaudeError::connection("Failed to get stdin handle"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ClaudeError::connection("Failed to get stdout handle"))?;

        if pipe_stderr {
            if let Some(stderr) = child.stderr.take() {
                let callback = self.options.stderr.clone();
                let task = tokio::spawn(async move {
                    let mut lines = BufReader::new(stderr).lines();
                    while let Ok(Some(line)) = lines.next_line().await {
                        if line.is_empty() {
                            continue;
                        }
                        if let Some(callback) = &callback {
                            callback(line);
                        }
                    }
                });
                if let Ok(mut slot) = self.stderr_task.lock() {
                    *slot = Some(task);
                }
            }
        }

        *self.stdin.lock().await = Some(stdin);
        self.stdout = Some(stdout);
        *self.child.lock().await = Some(child);
        self.set_state(TransportState::Ready);

        Ok(())
    }

    fn read_messages(&mut self) -> mpsc::UnboundedReceiver<Result<serde_json::Value>> {
        let (tx, rx) = mpsc::unbounded_channel();

        let Some(stdout) = self.stdout.take() else {
            let _ = tx.send(Err(ClaudeError::connection(
                "Not connected - stdout not available",
            )));
            return rx;
        };

        let state = self.state.clone();
        let child = self.child.clone();
        let max_buffer_size = self.max_buffer_size;
        let scanner_buffer_size = self.scanner_buffer_size;
        let cancel_token = self.cancellation_token.clone();

        let task = tokio::spawn(async move {
            let mut reader = BufReader::with_capacity(scanner_buffer_size, stdout);
            let mut accumulator = JsonMessageAccumulator::new(max_buffer_size);
            let mut raw = Vec::with_capacity(scanner_buffer_size);
            let mut reached_eof = false;

            loop {
                raw.clear();
                tokio::select! {
                    () = cancel_token.cancelled() => {
                        tracing::debug!("stdout reader cancelled");
                        break;
                    }
                    read = reader.read_until(b'\n', &mut raw) => match read {
                        Ok(0) => {
                            reached_eof = true;
                            break;
                        }
                        Ok(_) => {
                            if raw.len() > max_buffer_size {
                                let _ = tx.send(Err(ClaudeError::buffer_overflow(
                                    max_buffer_size,
                                    String::from_utf8_lossy(&raw[..100.min(raw.len())]),
                                )));
                                return;
                            }
                            let line = String::from_utf8_lossy(&raw);
                            match accumulator.feed_line(&line) {
                                Ok(values) => {
                                    for value in values {
                                        tracing::trace!(
                                            msg_type = value.get("type").and_then(|v| v.as_str()).unwrap_or("unknown"),
                                            "received message from CLI"
                                        );
                                        if tx.send(Ok(value)).is_err() {
                                            // Receiver dropped, stop reading
                                            return;
                                        }
                                    }
                                }
                                Err(e) => {
                                    let _ = tx.send(Err(e));
                                    return;
                                }
                            }
                        }
                        Err(e) => {
                            let _ = tx.send(Err(ClaudeError::Io(e)));
                            break;
                        }
                    }
                }
            }

            if !reached_eof {
                return;
            }

            // Stdout is drained; the write side is dead from here on
            if let Ok(mut inner) = state.lock() {
                if inner.state == TransportState::Ready {
                    inner.state = TransportState::Draining;
                }
            }

            let reaped = child.lock().await.take();
            if let Some(mut child) = reaped {
                match child.wait().await {
                    Ok(status) => {
                        if !status.success() {
                            let code = status.code().unwrap_or(-1);
                            if let Ok(mut inner) = state.lock() {
                                inner.exit_code = Some(code);
                            }
                            let _ = tx.send(Err(ClaudeError::process(
                                "Command failed",
                                code,
                                Some("Check stderr output for details".to_string()),
                            )));
                        }
                    }
                    Err(e) => {
                        let _ = tx.send(Err(ClaudeError::Io(e)));
                    }
                }
            }
        });

        if let Ok(mut slot) = self.reader_task.lock() {
            *slot = Some(task);
        }

        rx
    }

    async fn write(&self, data: &str) -> Result<()> {
        // State mutex released before the write mutex is taken; the close
        // path holds the opposite order deliberately (write lock first), so
        // a writer that passed this check still serializes behind it.
        {
            let inner = self.state.lock().map_err(|_| poisoned_state())?;
            match inner.state {
                TransportState::Ready => {}
                _ => {
                    return Err(match inner.exit_code {
                        Some(code) => ClaudeError::connection(format!(
                            "cannot write to terminated process (exit code: {code})"
                        )),
                        None => ClaudeError::connection("Transport is not ready for writing"),
                    });
                }
            }
        }

        let write_result = {
            let mut guard = self.stdin.lock().await;
            let Some(handle) = guard.as_mut() else {
                return Err(ClaudeError::connection("stdin not available"));
            };
            match handle.write_all(data.as_bytes()).await {
                Ok(()) => handle.flush().await,
                Err(e) => Err(e),
            }
            // Write lock released here, before the state lock below
        };

        if let Err(e) = write_result {
            if let Ok(mut inner) = self.state.lock() {
                if inner.state == TransportState::Ready {
                    inner.state = TransportState::Draining;
                }
            }
            return Err(ClaudeError::connection(format!(
                "failed to write to process stdin: {e}"
            )));
        }

        Ok(())
    }

    async fn end_input(&self) -> Result<()> {
        // Write mutex first, then state mutex
        let mut stdin = self.stdin.lock().await;
        {
            let mut inner = self.state.lock().map_err(|_| poisoned_state())?;
            if inner.state == TransportState::Ready {
                inner.state = TransportState::Draining;
            }
        }
        if let Some(mut handle) = stdin.take() {
            handle
                .shutdown()
                .await
                .map_err(|e| ClaudeError::connection(format!("failed to close stdin: {e}")))?;
        }
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.state
            .lock()
            .map(|inner| inner.state == TransportState::Ready)
            .unwrap_or(false)
    }

    async fn close(&self) -> Result<()> {
        // Write mutex first, then state mutex, mirroring end_input
        {
            let mut stdin = self.stdin.lock().await;
            let already_closed = {
                let mut inner = self.state.lock().map_err(|_| poisoned_state())?;
                let closed = inner.state == TransportState::Closed;
                inner.state = TransportState::Closed;
                closed
            };
            if already_closed {
                return Ok(());
            }
            if let Some(mut handle) = stdin.take() {
                let _ = handle.shutdown().await;
            }
        }

        self.cancellation_token.cancel();

        // Brief window for the reader to finish draining; cancellation has
        // already been signalled, so it exits on its next poll either way
        let reader = self.reader_task.lock().ok().and_then(|mut slot| slot.take());
        if let Some(task) = reader {
            let _ = tokio::time::timeout(Duration::from_millis(100), task).await;
        }
        let stderr = self.stderr_task.lock().ok().and_then(|mut slot| slot.take());
        if let Some(task) = stderr {
            task.abort();
        }

        // Closed stdin is the graceful signal; escalate after the grace period
        let reaped = self.child.lock().await.take();
        if let Some(mut child) = reaped {
            match tokio::time::timeout(KILL_GRACE_PERIOD, child.wait()).await {
                Ok(Ok(_status)) => {}
                Ok(Err(e)) => return Err(ClaudeError::Io(e)),
                Err(_) => {
                    let _ = child.kill().await;
                    let _ = child.wait().await;
                }
            }
        }

        let temp_files: Vec<PathBuf> = self
            .temp_files
            .lock()
            .map(|mut files| files.drain(..).collect())
            .unwrap_or_default();
        for path in temp_files {
            if let Err(e) = std::fs::remove_file(&path) {
                tracing::warn!(path = %path.display(), error = %e, "failed to remove temp file");
            }
        }

        Ok(())
    }
}

fn poisoned_state() -> ClaudeError {
    ClaudeError::connection("transport state lock poisoned")
}

impl Drop for SubprocessTransport {
    fn drop(&mut self) {
        self.cancellation_token.cancel();

        if let Ok(mut slot) = self.reader_task.lock() {
            if let Some(task) = slot.take() {
                task.abort();
            }
        }
        if let Ok(mut slot) = self.stderr_task.lock() {
            if let Some(task) = slot.take() {
                task.abort();
            }
        }

        // kill_on_drop reaps the child if close() never ran; temp files are
        // best-effort here since Drop cannot await
        if let Ok(files) = self.temp_files.lock() {
            for path in files.iter() {
                let _ = std::fs::remove_file(path);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as StdHashMap;

    fn transport_with(options: ClaudeAgentOptions) -> SubprocessTransport {
        SubprocessTransport::new(options, Some(PathBuf::from("/bin/echo")))
            .expect("transport creation should succeed")
    }

    fn arg_value(args: &[String], flag: &str) -> Option<String> {
        args.iter()
            .position(|a| a == flag)
            .and_then(|i| args.get(i + 1).cloned())
    }

    #[test]
    fn test_build_command_base_flags() {
        let transport = transport_with(ClaudeAgentOptions::default());
        let args = transport.build_command().unwrap();

        assert_eq!(arg_value(&args, "--output-format").as_deref(), Some("stream-json"));
        assert_eq!(arg_value(&args, "--input-format").as_deref(), Some("stream-json"));
        assert!(args.contains(&"--verbose".to_string()));
        // Unset system prompt is pinned to the empty string
        assert_eq!(arg_value(&args, "--system-prompt").as_deref(), Some(""));
        assert_eq!(arg_value(&args, "--setting-sources").as_deref(), Some(""));
    }

    #[test]
    fn test_build_command_tools_and_restrictions() {
        use crate::types::ToolName;
        let options = ClaudeAgentOptions::builder()
            .tools(ToolsConfig::List(vec![
                ToolName::new("Read"),
                ToolName::new("Bash"),
            ]))
            .allowed_tools(vec![ToolName::new("Read")])
            .disallowed_tools(vec![ToolName::new("Bash")])
            .build();
        let transport = transport_with(options);
        let args = transport.build_command().unwrap();

        assert_eq!(arg_value(&args, "--tools").as_deref(), Some("Read,Bash"));
        assert_eq!(arg_value(&args, "--allowedTools").as_deref(), Some("Read"));
        assert_eq!(arg_value(&args, "--disallowedTools").as_deref(), Some("Bash"));
    }

    #[test]
    fn test_build_command_tools_preset_maps_to_default() {
        let options = ClaudeAgentOptions::builder()
            .tools(ToolsConfig::Preset(crate::types::ToolsPreset::claude_code()))
            .build();
        let transport = transport_with(options);
        let args = transport.build_command().unwrap();

        assert_eq!(arg_value(&args, "--tools").as_deref(), Some("default"));
    }

    #[test]
    fn test_build_command_settings_passthrough() {
        let options = ClaudeAgentOptions::builder()
            .settings(r#"{"permissions": {}}"#)
            .build();
        let transport = transport_with(options);
        let args = transport.build_command().unwrap();

        assert_eq!(
            arg_value(&args, "--settings").as_deref(),
            Some(r#"{"permissions": {}}"#)
        );
    }

    #[test]
    fn test_build_command_settings_sandbox_merge() {
        let options = ClaudeAgentOptions::builder()
            .settings(r#"{"permissions": {"allow": []}}"#)
            .sandbox(serde_json::json!({"enabled": true}))
            .build();
        let transport = transport_with(options);
        let args = transport.build_command().unwrap();

        let merged: serde_json::Value =
            serde_json::from_str(&arg_value(&args, "--settings").unwrap()).unwrap();
        assert_eq!(merged["sandbox"]["enabled"], true);
        assert!(merged["permissions"]["allow"].is_array());
    }

    #[test]
    fn test_build_command_missing_settings_file_is_skipped() {
        let options = ClaudeAgentOptions::builder()
            .settings("/nonexistent/settings.json")
            .sandbox(serde_json::json!({"enabled": true}))
            .build();
        let transport = transport_with(options);
        let args = transport.build_command().unwrap();

        let merged: serde_json::Value =
            serde_json::from_str(&arg_value(&args, "--settings").unwrap()).unwrap();
        assert_eq!(merged["sandbox"]["enabled"], true);
    }

    #[test]
    fn test_build_command_extra_args_pass_through() {
        let mut extra = StdHashMap::new();
        extra.insert("debug-to-stderr".to_string(), None);
        extra.insert("log-level".to_string(), Some("debug".to_string()));
        let options = ClaudeAgentOptions::builder().extra_args(extra).build();
        let transport = transport_with(options);
        let args = transport.build_command().unwrap();

        assert!(args.contains(&"--debug-to-stderr".to_string()));
        assert_eq!(arg_value(&args, "--log-level").as_deref(), Some("debug"));
    }

    #[test]
    fn test_oversized_agents_spill_to_temp_file() {
        let mut agents = StdHashMap::new();
        agents.insert(
            "researcher".to_string(),
            crate::types::AgentDefinition {
                description: "research agent".to_string(),
                prompt: "x".repeat(NON_WINDOWS_CMD_LENGTH_LIMIT + 1),
                tools: None,
                model: None,
            },
        );
        let options = ClaudeAgentOptions::builder().agents(agents).build();
        let transport = transport_with(options);
        let args = transport.build_command().unwrap();

        let agents_arg = arg_value(&args, "--agents").unwrap();
        assert!(agents_arg.starts_with('@'), "expected @file, got a {} byte inline value", agents_arg.len());

        let path = PathBuf::from(&agents_arg[1..]);
        let contents = std::fs::read_to_string(&path).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&contents).unwrap();
        assert!(parsed["researcher"]["prompt"].is_string());

        // Recorded for cleanup at close
        assert_eq!(transport.temp_files.lock().unwrap().len(), 1);
        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn test_small_agents_stay_inline() {
        let mut agents = StdHashMap::new();
        agents.insert(
            "helper".to_string(),
            crate::types::AgentDefinition {
                description: "helper".to_string(),
                prompt: "be helpful".to_string(),
                tools: Some(vec!["Read".to_string()]),
                model: None,
            },
        );
        let options = ClaudeAgentOptions::builder().agents(agents).build();
        let transport = transport_with(options);
        let args = transport.build_command().unwrap();

        let agents_arg = arg_value(&args, "--agents").unwrap();
        assert!(agents_arg.starts_with('{'));
        assert!(transport.temp_files.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_dangerous_env_vars_rejected() {
        let mut env = StdHashMap::new();
        env.insert("LD_PRELOAD".to_string(), "/tmp/evil.so".to_string());
        let options = ClaudeAgentOptions::builder().env(env).build();
        let mut transport = transport_with(options);

        let err = transport.connect().await.unwrap_err();
        assert!(err.to_string().contains("Dangerous environment variables"));
        assert!(err.to_string().contains("LD_PRELOAD"));
    }

    #[tokio::test]
    async fn test_missing_cwd_is_fatal() {
        let options = ClaudeAgentOptions::builder()
            .cwd(PathBuf::from("/nonexistent/workdir"))
            .build();
        let mut transport = transport_with(options);

        let err = transport.connect().await.unwrap_err();
        assert!(err.to_string().contains("working directory does not exist"));
    }

    #[tokio::test]
    async fn test_write_before_connect_fails() {
        let transport = transport_with(ClaudeAgentOptions::default());
        let err = transport.write("{}\n").await.unwrap_err();
        assert!(matches!(err, ClaudeError::Connection(_)));
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let transport = transport_with(ClaudeAgentOptions::default());
        transport.close().await.unwrap();
        transport.close().await.unwrap();
        assert!(!transport.is_ready());
    }
}
