//! JSON hub protocol codec.
//!
//! Every record is a JSON object terminated by the ASCII record separator
//! (0x1E). A connection opens with a handshake record in each direction,
//! after which records carry a numeric `type`:
//!
//! | type | message |
//! |------|---------|
//! | 1 | Invocation (`target`, `arguments`, optional `invocationId`) |
//! | 3 | Completion (`invocationId`, `result` or `error`) |
//! | 6 | Ping |
//! | 7 | Close (`error`, `allowReconnect`) |
//!
//! Stream messages (2, 4, 5) are not used by the chat hub and decode as
//! [`HubMessage::Other`].

use serde_json::{json, Map, Value};
use tracing::warn;

use chat_core::error::{ChatError, ChatResult};

/// Record terminator.
pub const RECORD_SEPARATOR: char = '\u{1e}';

/// Protocol name sent in the handshake.
pub const PROTOCOL_NAME: &str = "json";

/// Protocol version sent in the handshake.
pub const PROTOCOL_VERSION: u32 = 1;

const TYPE_INVOCATION: u64 = 1;
const TYPE_COMPLETION: u64 = 3;
const TYPE_PING: u64 = 6;
const TYPE_CLOSE: u64 = 7;

/// A decoded hub protocol message.
#[derive(Debug, Clone, PartialEq)]
pub enum HubMessage {
    /// Call a named method on the other side.
    Invocation {
        invocation_id: Option<String>,
        target: String,
        arguments: Vec<Value>,
    },
    /// Result of a blocking invocation.
    Completion {
        invocation_id: String,
        result: Option<Value>,
        error: Option<String>,
    },
    /// Keepalive with no payload.
    Ping,
    /// The server is closing the connection.
    Close {
        error: Option<String>,
        allow_reconnect: bool,
    },
    /// A message type the client does not act on.
    Other(u64),
}

impl HubMessage {
    /// Build a non-blocking invocation (no completion expected).
    pub fn invocation(target: impl Into<String>, arguments: Vec<Value>) -> Self {
        HubMessage::Invocation {
            invocation_id: None,
            target: target.into(),
            arguments,
        }
    }

    /// Encode as a JSON object.
    pub fn to_json(&self) -> Value {
        match self {
            HubMessage::Invocation {
                invocation_id,
                target,
                arguments,
            } => {
                let mut obj = json!({
                    "type": TYPE_INVOCATION,
                    "target": target,
                    "arguments": arguments,
                });
                if let Some(id) = invocation_id {
                    obj["invocationId"] = Value::String(id.clone());
                }
                obj
            }
            HubMessage::Completion {
                invocation_id,
                result,
                error,
            } => {
                let mut obj = json!({ "type": TYPE_COMPLETION, "invocationId": invocation_id });
                if let Some(error) = error {
                    obj["error"] = Value::String(error.clone());
                } else if let Some(result) = result {
                    obj["result"] = result.clone();
                }
                obj
            }
            HubMessage::Ping => json!({ "type": TYPE_PING }),
            HubMessage::Close {
                error,
                allow_reconnect,
            } => {
                let mut obj = json!({ "type": TYPE_CLOSE, "allowReconnect": allow_reconnect });
                if let Some(error) = error {
                    obj["error"] = Value::String(error.clone());
                }
                obj
            }
            HubMessage::Other(kind) => json!({ "type": kind }),
        }
    }

    /// Encode as a single terminated record.
    pub fn to_frame(&self) -> String {
        let mut frame = self.to_json().to_string();
        frame.push(RECORD_SEPARATOR);
        frame
    }

    /// Decode one record (without its terminator).
    pub fn from_record(record: &str) -> ChatResult<Self> {
        let value: Value = serde_json::from_str(record)
            .map_err(|e| ChatError::Protocol(format!("invalid hub record: {e}")))?;
        let obj = value
            .as_object()
            .ok_or_else(|| ChatError::Protocol("hub record is not a JSON object".into()))?;
        let kind = obj
            .get("type")
            .and_then(Value::as_u64)
            .ok_or_else(|| ChatError::Protocol("hub record has no message type".into()))?;

        let message = match kind {
            TYPE_INVOCATION => HubMessage::Invocation {
                invocation_id: string_field(obj, "invocationId"),
                target: string_field(obj, "target")
                    .ok_or_else(|| ChatError::Protocol("invocation without target".into()))?,
                arguments: match obj.get("arguments") {
                    Some(Value::Array(args)) => args.clone(),
                    None | Some(Value::Null) => Vec::new(),
                    Some(_) => {
                        return Err(ChatError::Protocol("invocation arguments must be an array".into()))
                    }
                },
            },
            TYPE_COMPLETION => HubMessage::Completion {
                invocation_id: string_field(obj, "invocationId").unwrap_or_default(),
                result: obj.get("result").cloned(),
                error: string_field(obj, "error"),
            },
            TYPE_PING => HubMessage::Ping,
            TYPE_CLOSE => HubMessage::Close {
                error: string_field(obj, "error"),
                allow_reconnect: obj
                    .get("allowReconnect")
                    .and_then(Value::as_bool)
                    .unwrap_or(false),
            },
            other => HubMessage::Other(other),
        };
        Ok(message)
    }
}

fn string_field(obj: &Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key).and_then(Value::as_str).map(String::from)
}

/// Split a text frame into its terminated records.
///
/// An unterminated trailing fragment is logged and left out.
fn split_records(text: &str) -> Vec<&str> {
    let mut records: Vec<&str> = text.split(RECORD_SEPARATOR).collect();
    if let Some(tail) = records.pop() {
        if !tail.trim().is_empty() {
            warn!("skipping unterminated hub record ({} bytes)", tail.len());
        }
    }
    records.retain(|r| !r.is_empty());
    records
}

/// Decode every record in a text frame, in order.
///
/// A record that fails to decode is logged and skipped; the others are kept.
pub fn parse_frame(text: &str) -> Vec<HubMessage> {
    decode_records(&split_records(text))
}

fn decode_records(records: &[&str]) -> Vec<HubMessage> {
    records
        .iter()
        .filter_map(|record| match HubMessage::from_record(record) {
            Ok(message) => Some(message),
            Err(e) => {
                warn!("skipping malformed hub record: {e}");
                None
            }
        })
        .collect()
}

/// The handshake record the client sends first.
pub fn handshake_request() -> String {
    let mut frame = json!({ "protocol": PROTOCOL_NAME, "version": PROTOCOL_VERSION }).to_string();
    frame.push(RECORD_SEPARATOR);
    frame
}

/// Decode the server's handshake response.
///
/// Returns any messages that arrived in the same frame after the handshake.
pub fn parse_handshake_response(text: &str) -> ChatResult<Vec<HubMessage>> {
    let records = split_records(text);
    let (first, rest) = records
        .split_first()
        .ok_or_else(|| ChatError::Protocol("empty handshake response".into()))?;

    let value: Value = serde_json::from_str(first)
        .map_err(|e| ChatError::Protocol(format!("invalid handshake response: {e}")))?;
    if let Some(error) = value.get("error").and_then(Value::as_str) {
        return Err(ChatError::Connection(format!("handshake rejected: {error}")));
    }

    Ok(decode_records(rest))
}
