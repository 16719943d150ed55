use serde::{Deserialize, Serialize};

/// Canonical group name for the conversation between two users.
/// The pair is unordered: `conversation_key(a, b) == conversation_key(b, a)`.
pub fn conversation_key(a: i64, b: i64) -> String {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    format!("chat_{lo}_{hi}")
}

/// Personal group a user is auto-joined to on connect. Server-side
/// notifications are published here.
pub fn personal_group(user_id: i64) -> String {
    format!("user-{user_id}")
}

/// Commands sent FROM client TO server over WebSocket.
///
/// Required fields are `Option` on purpose: the dispatcher decides per
/// command whether a missing field is an error reply or a silent no-op,
/// matching the protocol rather than serde's defaults.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "command", rename_all = "lowercase")]
pub enum ChatCommand {
    /// Join the conversation with `other_id` and receive recent history.
    Join { other_id: Option<i64> },

    /// Leave the conversation with `other_id`.
    Leave { other_id: Option<i64> },

    /// Fetch recent history without joining.
    History {
        other_id: Option<i64>,
        limit: Option<u32>,
    },

    /// Send a direct message to user `to`.
    Message {
        to: Option<i64>,
        text: Option<String>,
    },
}

const KNOWN_COMMANDS: &[&str] = &["join", "leave", "history", "message"];

/// Why an inbound text frame could not be decoded into a [`ChatCommand`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvelopeError {
    /// Not a JSON object, or no string `command` discriminator.
    Malformed,
    /// The `command` value names no known command.
    Unknown(String),
    /// A known command whose payload fields could not be decoded.
    Invalid(String),
}

impl ChatCommand {
    /// Decode one inbound envelope, distinguishing an unknown command name
    /// (which gets echoed back in an error reply) from a malformed frame.
    pub fn parse(text: &str) -> Result<Self, EnvelopeError> {
        let value: serde_json::Value =
            serde_json::from_str(text).map_err(|_| EnvelopeError::Malformed)?;
        let name = value
            .get("command")
            .and_then(|v| v.as_str())
            .ok_or(EnvelopeError::Malformed)?
            .to_string();

        match serde_json::from_value::<ChatCommand>(value) {
            Ok(cmd) => Ok(cmd),
            Err(_) if KNOWN_COMMANDS.contains(&name.as_str()) => {
                Err(EnvelopeError::Invalid(name))
            }
            Err(_) => Err(EnvelopeError::Unknown(name)),
        }
    }
}

/// Events sent FROM server TO client over WebSocket.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "command", rename_all = "lowercase")]
pub enum ChatEvent {
    /// Recent messages of one conversation, oldest first.
    History { messages: Vec<MessagePayload> },

    /// A message broadcast to a conversation group.
    Message { message: MessagePayload },

    /// A server-side notification published to a personal group.
    Notification { notification: NotificationPayload },
}

/// One chat message on the wire. `created_at` is an ISO-8601 UTC string.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagePayload {
    pub id: i64,
    pub from: i64,
    pub to: i64,
    pub text: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub id: i64,
    pub user_id: i64,
    pub content: String,
    pub kind: i64,
    pub is_read: bool,
    pub created_at: String,
}

/// Error envelope. `received` carries the offending command name when the
/// client sent something unrecognized.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorReply {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub received: Option<String>,
}

impl ErrorReply {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            received: None,
        }
    }

    pub fn unknown_command(received: impl Into<String>) -> Self {
        Self {
            error: "unknown command".into(),
            received: Some(received.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversation_key_is_symmetric() {
        assert_eq!(conversation_key(7, 3), conversation_key(3, 7));
        assert_eq!(conversation_key(3, 7), "chat_3_7");
        assert_eq!(conversation_key(5, 5), "chat_5_5");
    }

    #[test]
    fn personal_group_format() {
        assert_eq!(personal_group(42), "user-42");
    }

    #[test]
    fn parse_join() {
        let cmd = ChatCommand::parse(r#"{"command":"join","other_id":42}"#).unwrap();
        match cmd {
            ChatCommand::Join { other_id } => assert_eq!(other_id, Some(42)),
            other => panic!("expected join, got {:?}", other),
        }
    }

    #[test]
    fn parse_join_without_other_id() {
        let cmd = ChatCommand::parse(r#"{"command":"join"}"#).unwrap();
        match cmd {
            ChatCommand::Join { other_id } => assert_eq!(other_id, None),
            other => panic!("expected join, got {:?}", other),
        }
    }

    #[test]
    fn parse_message() {
        let cmd = ChatCommand::parse(r#"{"command":"message","to":9,"text":"hi"}"#).unwrap();
        match cmd {
            ChatCommand::Message { to, text } => {
                assert_eq!(to, Some(9));
                assert_eq!(text.as_deref(), Some("hi"));
            }
            other => panic!("expected message, got {:?}", other),
        }
    }

    #[test]
    fn parse_unknown_command_echoes_name() {
        let err = ChatCommand::parse(r#"{"command":"dance"}"#).unwrap_err();
        assert_eq!(err, EnvelopeError::Unknown("dance".into()));
    }

    #[test]
    fn parse_known_command_bad_payload() {
        let err = ChatCommand::parse(r#"{"command":"history","limit":"lots"}"#).unwrap_err();
        assert_eq!(err, EnvelopeError::Invalid("history".into()));
    }

    #[test]
    fn parse_malformed() {
        assert_eq!(ChatCommand::parse("not json").unwrap_err(), EnvelopeError::Malformed);
        assert_eq!(
            ChatCommand::parse(r#"{"no":"command"}"#).unwrap_err(),
            EnvelopeError::Malformed
        );
        assert_eq!(
            ChatCommand::parse(r#"{"command":5}"#).unwrap_err(),
            EnvelopeError::Malformed
        );
    }

    #[test]
    fn empty_history_wire_format() {
        let json = serde_json::to_string(&ChatEvent::History { messages: vec![] }).unwrap();
        assert_eq!(json, r#"{"command":"history","messages":[]}"#);
    }

    #[test]
    fn message_wire_format() {
        let json = serde_json::to_string(&ChatEvent::Message {
            message: MessagePayload {
                id: 1,
                from: 3,
                to: 7,
                text: "hi".into(),
                created_at: "2026-01-01T00:00:00+00:00".into(),
            },
        })
        .unwrap();
        assert_eq!(
            json,
            r#"{"command":"message","message":{"id":1,"from":3,"to":7,"text":"hi","created_at":"2026-01-01T00:00:00+00:00"}}"#
        );
    }

    #[test]
    fn error_reply_wire_format() {
        let json = serde_json::to_string(&ErrorReply::new("recipient not found")).unwrap();
        assert_eq!(json, r#"{"error":"recipient not found"}"#);

        let json = serde_json::to_string(&ErrorReply::unknown_command("dance")).unwrap();
        assert_eq!(json, r#"{"error":"unknown command","received":"dance"}"#);
    }
}
