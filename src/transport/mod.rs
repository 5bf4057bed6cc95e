//! Transport layer for communicating with the Claude Code CLI
//!
//! This module provides the transport abstraction and the subprocess
//! implementation that spawns and supervises the CLI process.

pub(crate) mod framer;
pub mod subprocess;

use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::error::Result;

/// Minimum supported Claude Code CLI version
pub const MIN_CLI_VERSION: &str = "2.0.50";

/// Environment variable that suppresses the version probe
pub const SKIP_VERSION_CHECK_ENV: &str = "CLAUDE_AGENT_SDK_SKIP_VERSION_CHECK";

/// Lifecycle of a transport.
///
/// Transitions are monotonic; `Closed` is terminal. `Ready` is the only
/// state that accepts writes; `Draining` keeps delivering already-buffered
/// reads after the write side has shut down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    /// Created, not yet connecting
    Uninitialized,
    /// Spawn in progress
    Connecting,
    /// Connected; reads and writes flow
    Ready,
    /// Write side closed or child exited; reads may still drain
    Draining,
    /// Fully closed; terminal
    Closed,
}

/// Transport trait for communicating with the Claude Code CLI.
///
/// `connect` and `read_messages` are called once, before the transport is
/// shared; `write`, `end_input`, and `close` take `&self` so any number of
/// tasks can use them concurrently. Implementations serialize writes
/// internally so concurrent messages never interleave mid-line.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Connect to the transport
    ///
    /// # Errors
    /// Returns error if connection fails
    async fn connect(&mut self) -> Result<()>;

    /// Read messages from the transport.
    ///
    /// Returns a receiver yielding complete JSON values in the order they
    /// were read from the child, or an error when the stream fails. The
    /// channel closes when the child's stdout ends; an abnormal exit is
    /// reported as a final `ProcessError` item before the close.
    fn read_messages(&mut self) -> mpsc::UnboundedReceiver<Result<serde_json::Value>>;

    /// Write data to the transport
    ///
    /// # Arguments
    /// * `data` - String data to write (typically one JSON line)
    ///
    /// # Errors
    /// Returns error if the write fails or the transport is not ready
    async fn write(&self, data: &str) -> Result<()>;

    /// End the input stream (close stdin)
    ///
    /// # Errors
    /// Returns error if closing fails
    async fn end_input(&self) -> Result<()>;

    /// Check if transport is ready for writing
    fn is_ready(&self) -> bool;

    /// Close the transport and clean up resources. Idempotent.
    ///
    /// # Errors
    /// Returns error if cleanup fails
    async fn close(&self) -> Result<()>;
}

/// Probe the CLI version and warn when it is below [`MIN_CLI_VERSION`].
///
/// Every failure mode short of an old version is non-fatal: a missing or
/// unresponsive binary, a probe that exceeds its two-second budget, or
/// output with no recognizable version token all return `None` and the
/// session proceeds. An old version only produces a warning.
pub async fn probe_cli_version(cli_path: &std::path::Path) -> Option<String> {
    use tokio::process::Command;

    if std::env::var(SKIP_VERSION_CHECK_ENV).is_ok() {
        return None;
    }

    let output = tokio::time::timeout(
        Duration::from_secs(2),
        Command::new(cli_path).arg("-v").output(),
    )
    .await
    .ok()?
    .ok()?;

    if !output.status.success() {
        return None;
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let version = extract_semver(&stdout)?;

    if compare_versions(&version, MIN_CLI_VERSION) == std::cmp::Ordering::Less {
        tracing::warn!(
            found = %version,
            minimum = %MIN_CLI_VERSION,
            "Claude Code version is unsupported in the Agent SDK; some features may not work correctly"
        );
    }

    Some(version)
}

/// Extract the first `M.m.p` token from arbitrary output
/// (e.g. `"2.0.76 (Claude Code)"`).
pub(crate) fn extract_semver(text: &str) -> Option<String> {
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i].is_ascii_digit() {
            let start = i;
            let mut dots = 0;
            let mut j = i;
            while j < bytes.len() && (bytes[j].is_ascii_digit() || bytes[j] == b'.') {
                if bytes[j] == b'.' {
                    // A trailing dot ends the token
                    if j + 1 >= bytes.len() || !bytes[j + 1].is_ascii_digit() {
                        break;
                    }
                    dots += 1;
                }
                j += 1;
            }
            if dots >= 2 {
                // Keep only major.minor.patch even if more segments follow
                let token = &text[start..j];
                let parts: Vec<&str> = token.split('.').collect();
                return Some(parts[..3].join("."));
            }
            i = j.max(i + 1);
        } else {
            i += 1;
        }
    }
    None
}

/// Compare two semantic version strings component-wise.
pub(crate) fn compare_versions(v1: &str, v2: &str) -> std::cmp::Ordering {
    let parse = |v: &str| -> Vec<u32> { v.split('.').filter_map(|s| s.parse().ok()).collect() };

    let p1 = parse(v1);
    let p2 = parse(v2);

    for i in 0..p1.len().max(p2.len()) {
        let a = p1.get(i).copied().unwrap_or(0);
        let b = p2.get(i).copied().unwrap_or(0);
        match a.cmp(&b) {
            std::cmp::Ordering::Equal => {}
            other => return other,
        }
    }
    std::cmp::Ordering::Equal
}

pub use subprocess::SubprocessTransport;
