//! OCPP-J wire frame codec
//!
//! OCPP-J messages are JSON arrays of three shapes, distinguished by the
//! leading integer:
//!
//! - Call:       `[2, "<id>", "<Action>", {payload}]`
//! - CallResult: `[3, "<id>", {payload}]`
//! - CallError:  `[4, "<id>", "<code>", "<description>", {details}]`
//!
//! The codec decodes raw text frames into a tagged [`Frame`] the mediator can
//! match on, and re-encodes frames deterministically. Payload values are
//! preserved verbatim when a frame passes through the relay.

use serde_json::Value;
use thiserror::Error;

const MESSAGE_TYPE_CALL: u64 = 2;
const MESSAGE_TYPE_CALL_RESULT: u64 = 3;
const MESSAGE_TYPE_CALL_ERROR: u64 = 4;

/// A decoded OCPP frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// A request (`[2, id, action, payload]`).
    Call {
        id: String,
        action: String,
        payload: Value,
    },
    /// A successful response (`[3, id, payload]`).
    CallResult { id: String, payload: Value },
    /// An error response (`[4, id, code, description, details]`).
    CallError {
        id: String,
        code: String,
        description: String,
        details: Value,
    },
}

/// Classification of a frame by its leading integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Request,
    Response,
    ErrorResponse,
}

/// Decode failure: the outer value was not a JSON array of one of the three
/// expected shapes.
#[derive(Debug, Clone, Error)]
#[error("malformed frame: {reason}")]
pub struct MalformedFrame {
    pub reason: String,
}

impl MalformedFrame {
    fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl Frame {
    /// Decode a raw text frame.
    pub fn decode(raw: &str) -> Result<Frame, MalformedFrame> {
        let value: Value = serde_json::from_str(raw)
            .map_err(|e| MalformedFrame::new(format!("JSON parse error: {e}")))?;

        let arr = match value {
            Value::Array(arr) => arr,
            _ => return Err(MalformedFrame::new("expected JSON array")),
        };

        match arr.first().and_then(Value::as_u64) {
            Some(MESSAGE_TYPE_CALL) if arr.len() == 4 => {
                let id = as_string(&arr[1], "Call id")?;
                let action = as_string(&arr[2], "Call action")?;
                Ok(Frame::Call {
                    id,
                    action,
                    payload: arr[3].clone(),
                })
            }
            Some(MESSAGE_TYPE_CALL_RESULT) if arr.len() == 3 => {
                let id = as_string(&arr[1], "CallResult id")?;
                Ok(Frame::CallResult {
                    id,
                    payload: arr[2].clone(),
                })
            }
            Some(MESSAGE_TYPE_CALL_ERROR) if arr.len() == 5 => {
                let id = as_string(&arr[1], "CallError id")?;
                let code = as_string(&arr[2], "CallError code")?;
                let description = as_string(&arr[3], "CallError description")?;
                Ok(Frame::CallError {
                    id,
                    code,
                    description,
                    details: arr[4].clone(),
                })
            }
            _ => Err(MalformedFrame::new("unknown or malformed message shape")),
        }
    }

    /// Re-encode the frame as a compact JSON array.
    pub fn encode(&self) -> String {
        let arr = match self {
            Frame::Call {
                id,
                action,
                payload,
            } => vec![
                Value::from(MESSAGE_TYPE_CALL),
                Value::from(id.as_str()),
                Value::from(action.as_str()),
                payload.clone(),
            ],
            Frame::CallResult { id, payload } => vec![
                Value::from(MESSAGE_TYPE_CALL_RESULT),
                Value::from(id.as_str()),
                payload.clone(),
            ],
            Frame::CallError {
                id,
                code,
                description,
                details,
            } => vec![
                Value::from(MESSAGE_TYPE_CALL_ERROR),
                Value::from(id.as_str()),
                Value::from(code.as_str()),
                Value::from(description.as_str()),
                details.clone(),
            ],
        };
        Value::Array(arr).to_string()
    }

    /// The OCPP message id.
    pub fn id(&self) -> &str {
        match self {
            Frame::Call { id, .. } => id,
            Frame::CallResult { id, .. } => id,
            Frame::CallError { id, .. } => id,
        }
    }

    pub fn kind(&self) -> FrameKind {
        match self {
            Frame::Call { .. } => FrameKind::Request,
            Frame::CallResult { .. } => FrameKind::Response,
            Frame::CallError { .. } => FrameKind::ErrorResponse,
        }
    }

    /// True for CallResult and CallError frames.
    pub fn is_response(&self) -> bool {
        !matches!(self, Frame::Call { .. })
    }
}

fn as_string(value: &Value, what: &str) -> Result<String, MalformedFrame> {
    value
        .as_str()
        .map(|s| s.to_string())
        .ok_or_else(|| MalformedFrame::new(format!("{what} must be a string")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_call() {
        let frame = Frame::decode(r#"[2,"m1","Heartbeat",{}]"#).unwrap();
        assert_eq!(
            frame,
            Frame::Call {
                id: "m1".into(),
                action: "Heartbeat".into(),
                payload: json!({}),
            }
        );
        assert_eq!(frame.kind(), FrameKind::Request);
    }

    #[test]
    fn decodes_call_result() {
        let frame = Frame::decode(r#"[3,"m1",{"currentTime":"2025-01-01T00:00:00Z"}]"#).unwrap();
        assert_eq!(frame.id(), "m1");
        assert_eq!(frame.kind(), FrameKind::Response);
    }

    #[test]
    fn decodes_call_error() {
        let frame =
            Frame::decode(r#"[4,"m9","InternalError","boom",{}]"#).unwrap();
        assert_eq!(frame.kind(), FrameKind::ErrorResponse);
        assert!(frame.is_response());
    }

    #[test]
    fn round_trips_preserving_payload() {
        let raw = r#"[2,"x7","RemoteStartTransaction",{"connectorId":1,"idTag":"T"}]"#;
        let frame = Frame::decode(raw).unwrap();
        let encoded = frame.encode();
        assert_eq!(Frame::decode(&encoded).unwrap(), frame);
    }

    #[test]
    fn rejects_non_array() {
        assert!(Frame::decode(r#"{"hello":"world"}"#).is_err());
        assert!(Frame::decode("not json at all").is_err());
    }

    #[test]
    fn rejects_unknown_message_type() {
        assert!(Frame::decode(r#"[5,"m1",{}]"#).is_err());
    }

    #[test]
    fn rejects_wrong_arity() {
        // Call with a missing payload element
        assert!(Frame::decode(r#"[2,"m1","Heartbeat"]"#).is_err());
        // CallResult with an extra element
        assert!(Frame::decode(r#"[3,"m1",{},{}]"#).is_err());
    }

    #[test]
    fn rejects_non_string_id() {
        assert!(Frame::decode(r#"[2,42,"Heartbeat",{}]"#).is_err());
    }
}
