//! Error types for the Claude Agent SDK

use thiserror::Error;

/// Main error type for the Claude Agent SDK
#[derive(Error, Debug)]
pub enum ClaudeError {
    /// Claude Code CLI not found or not installed
    #[error("Claude Code CLI not found: {0}")]
    CliNotFound(String),

    /// Connection error when communicating with Claude Code
    #[error("Connection error: {0}")]
    Connection(String),

    /// Process execution error with exit code and stderr
    #[error("Process error (exit code {exit_code}): {message}")]
    Process {
        /// Error message
        message: String,
        /// Process exit code
        exit_code: i32,
        /// Standard error output, when captured
        stderr: Option<String>,
    },

    /// JSON decode error when parsing CLI output
    #[error("JSON decode error: {0}")]
    JsonDecode(#[from] serde_json::Error),

    /// Accumulated JSON exceeded the configured buffer cap
    #[error("JSON message exceeded maximum buffer size of {limit} bytes. Preview: {preview}")]
    BufferOverflow {
        /// Configured maximum buffer size in bytes
        limit: usize,
        /// Truncated preview of the offending data
        preview: String,
    },

    /// Message parse error with optional raw data
    #[error("Message parse error: {message}")]
    MessageParse {
        /// Error message
        message: String,
        /// Raw message data that failed to parse
        data: Option<serde_json::Value>,
    },

    /// Control protocol error
    #[error("Control protocol error: {0}")]
    ControlProtocol(String),

    /// Control protocol request timed out
    #[error("Control request timed out after {timeout_secs} seconds: {request_type}")]
    ControlTimeout {
        /// Timeout duration in seconds
        timeout_secs: u64,
        /// Subtype of the request that timed out
        request_type: String,
    },

    /// Hook execution error
    #[error("Hook error: {0}")]
    Hook(String),

    /// MCP (Model Context Protocol) error
    #[error("MCP error: {0}")]
    Mcp(String),

    /// I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Operation was canceled before completing
    #[error("Canceled: {0}")]
    Canceled(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type alias for Claude SDK operations
pub type Result<T> = std::result::Result<T, ClaudeError>;

impl ClaudeError {
    /// Create a CLI not found error with a helpful message
    #[must_use]
    pub fn cli_not_found() -> Self {
        Self::CliNotFound(
            "Claude Code not found. Install with:\n\
             npm install -g @anthropic-ai/claude-code\n\
             \n\
             If already installed locally, try:\n\
             export PATH=\"$HOME/node_modules/.bin:$PATH\"\n\
             \n\
             Or specify the path when creating transport"
                .to_string(),
        )
    }

    /// Create a connection error
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Create a process error
    pub fn process(msg: impl Into<String>, exit_code: i32, stderr: Option<String>) -> Self {
        Self::Process {
            message: msg.into(),
            exit_code,
            stderr,
        }
    }

    /// Create a buffer overflow error
    pub fn buffer_overflow(limit: usize, preview: impl Into<String>) -> Self {
        Self::BufferOverflow {
            limit,
            preview: preview.into(),
        }
    }

    /// Create a message parse error
    pub fn message_parse(msg: impl Into<String>, data: Option<serde_json::Value>) -> Self {
        Self::MessageParse {
            message: msg.into(),
            data,
        }
    }

    /// Create a control protocol error
    pub fn control_protocol(msg: impl Into<String>) -> Self {
        Self::ControlProtocol(msg.into())
    }

    /// Create a control timeout error
    pub fn control_timeout(timeout_secs: u64, request_type: impl Into<String>) -> Self {
        Self::ControlTimeout {
            timeout_secs,
            request_type: request_type.into(),
        }
    }

    /// Create a hook error
    pub fn hook(msg: impl Into<String>) -> Self {
        Self::Hook(msg.into())
    }

    /// Create an MCP error
    pub fn mcp(msg: impl Into<String>) -> Self {
        Self::Mcp(msg.into())
    }

    /// Create a canceled error
    pub fn canceled(msg: impl Into<String>) -> Self {
        Self::Canceled(msg.into())
    }

    /// Create an invalid configuration error
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Rebuild an equivalent error for fan-out to multiple waiters.
    ///
    /// Errors are not `Clone`; when the child exits every pending control
    /// request must observe the same failure, so each waiter gets a fresh
    /// value carrying the same information.
    #[must_use]
    pub(crate) fn duplicate(&self) -> Self {
        match self {
            Self::Process {
                message,
                exit_code,
                stderr,
            } => Self::Process {
                message: message.clone(),
                exit_code: *exit_code,
                stderr: stderr.clone(),
            },
            Self::BufferOverflow { limit, preview } => Self::BufferOverflow {
                limit: *limit,
                preview: preview.clone(),
            },
            other => Self::Connection(format!("transport failed: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_process_error_display() {
        let err = ClaudeError::process("command failed", 2, None);
        assert_eq!(err.to_string(), "Process error (exit code 2): command failed");
    }

    #[test]
    fn test_duplicate_preserves_exit_code() {
        let err = ClaudeError::process("command failed", 2, Some("boom".to_string()));
        match err.duplicate() {
            ClaudeError::Process {
                exit_code, stderr, ..
            } => {
                assert_eq!(exit_code, 2);
                assert_eq!(stderr.as_deref(), Some("boom"));
            }
            other => panic!("unexpected duplicate: {other:?}"),
        }
    }

    #[test]
    fn test_duplicate_downgrades_unshareable_errors() {
        let err = ClaudeError::Io(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe"));
        assert!(matches!(err.duplicate(), ClaudeError::Connection(_)));
    }
}
