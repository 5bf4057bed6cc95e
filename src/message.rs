//! Parsing of conversation messages
//!
//! Conversation payloads are open-ended JSON; only the envelope is typed.
//! A shape violation is reported as [`ClaudeError::MessageParse`] carrying
//! the raw value, and is non-fatal to the transport: the session keeps
//! delivering subsequent messages.

use serde_json::Value;

use crate::error::{ClaudeError, Result};
use crate::types::Message;

/// Parse a forwarded wire object into a typed [`Message`].
///
/// # Errors
/// Returns [`ClaudeError::MessageParse`] when the `type` field is missing,
/// unknown, or the payload does not match the message schema.
pub fn parse_message(value: Value) -> Result<Message> {
    let Some(msg_type) = value.get("type").and_then(Value::as_str) else {
        return Err(ClaudeError::message_parse(
            "message missing 'type' field",
            Some(value),
        ));
    };

    match msg_type {
        "user" | "assistant" | "system" | "result" | "stream_event" => {
            let msg_type = msg_type.to_string();
            serde_json::from_value::<Message>(value.clone()).map_err(|e| {
                ClaudeError::message_parse(
                    format!("failed to parse {msg_type} message: {e}"),
                    Some(value),
                )
            })
        }
        other => Err(ClaudeError::message_parse(
            format!("unknown message type: {other}"),
            Some(value.clone()),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_user_message() {
        let value = json!({
            "type": "user",
            "message": {"role": "user", "content": "hi"},
        });
        let message = parse_message(value).unwrap();
        match message {
            Message::User { message, .. } => {
                assert_eq!(message.role, "user");
            }
            other => panic!("expected user message, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_assistant_message() {
        let value = json!({
            "type": "assistant",
            "message": {
                "model": "claude-sonnet-4-5",
                "content": [{"type": "text", "text": "Hello!"}],
            },
            "session_id": "s1",
        });
        let message = parse_message(value).unwrap();
        assert!(matches!(message, Message::Assistant { .. }));
    }

    #[test]
    fn test_parse_result_message() {
        let value = json!({
            "type": "result",
            "subtype": "success",
            "duration_ms": 10,
            "duration_api_ms": 5,
            "is_error": false,
            "num_turns": 1,
            "session_id": "s1",
            "total_cost_usd": 0.01,
            "result": "done",
        });
        let message = parse_message(value).unwrap();
        assert!(message.is_result());
        assert_eq!(message.session_id().unwrap().as_str(), "s1");
    }

    #[test]
    fn test_parse_system_message_keeps_extra_fields() {
        let value = json!({
            "type": "system",
            "subtype": "init",
            "session_id": "s1",
            "cwd": "/work",
            "tools": ["Read", "Bash"],
        });
        let message = parse_message(value).unwrap();
        match message {
            Message::System { subtype, data } => {
                assert_eq!(subtype, "init");
                assert_eq!(data["cwd"], "/work");
            }
            other => panic!("expected system message, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_unknown_type() {
        let value = json!({"type": "telemetry"});
        let err = parse_message(value).unwrap_err();
        match err {
            ClaudeError::MessageParse { message, data } => {
                assert!(message.contains("unknown message type"));
                assert!(data.is_some());
            }
            other => panic!("expected MessageParse, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_missing_type() {
        let err = parse_message(json!({"foo": 1})).unwrap_err();
        assert!(matches!(err, ClaudeError::MessageParse { .. }));
    }

    #[test]
    fn test_parse_malformed_result_is_nonfatal_error() {
        // result without its required fields
        let err = parse_message(json!({"type": "result", "subtype": "success"})).unwrap_err();
        assert!(matches!(err, ClaudeError::MessageParse { .. }));
    }
}
