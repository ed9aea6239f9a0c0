//! Request/response envelopes exchanged over the WebSocket channel.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Error raised when an inbound message is not a usable envelope.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum EnvelopeError {
    /// The message is not a mapping, or `type`/`args` is missing or unusable.
    #[error("Method and args required")]
    Malformed,
}

/// A parsed client request.
///
/// `id` is an opaque token echoed back in the response `meta`; clients that
/// omit it get `null`. `type` is normalized to lowercase during parsing.
#[derive(Clone, Debug)]
pub struct RequestEnvelope {
    /// Opaque correlation token (`Value::Null` when the client sent none).
    pub id: Value,
    /// Lowercased message type.
    pub kind: String,
    /// Request arguments, shape owned by the individual handler.
    pub args: Value,
}

impl RequestEnvelope {
    /// Parse an already-decoded JSON value into a request envelope.
    ///
    /// Rejects anything that is not a mapping carrying a string `type` and
    /// an `args` field. The `id` field is optional and passed through as-is.
    pub fn from_value(value: &Value) -> Result<Self, EnvelopeError> {
        let obj = value.as_object().ok_or(EnvelopeError::Malformed)?;
        let kind = obj
            .get("type")
            .and_then(Value::as_str)
            .ok_or(EnvelopeError::Malformed)?
            .to_lowercase();
        let args = obj.get("args").ok_or(EnvelopeError::Malformed)?.clone();
        let id = obj.get("id").cloned().unwrap_or(Value::Null);
        Ok(Self { id, kind, args })
    }

    /// The `meta` block every response to this request must carry.
    pub fn meta(&self) -> Meta {
        Meta {
            id: Some(self.id.clone()),
            kind: Some(self.kind.clone()),
        }
    }
}

/// Correlation metadata echoed on every response.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Meta {
    /// Echo of the request `id` (`Some(Value::Null)` when the client sent
    /// none; omitted entirely on server-initiated events).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    /// Echo of the normalized request type, or the event type for
    /// server-initiated messages.
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

impl Meta {
    /// Meta for a server-initiated event (no request to correlate with).
    pub fn event(kind: impl Into<String>) -> Self {
        Self {
            id: None,
            kind: Some(kind.into()),
        }
    }
}

/// Error payload inside a response envelope.
///
/// `message` is usually a string but may carry the structured detail of a
/// store failure when one is available.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorBody {
    /// Human- or machine-readable failure description.
    pub message: Value,
}

/// An outbound message. Exactly one of `data` / `error` is populated;
/// `meta` is present on everything except the rate-limit warning.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    /// Success payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Failure payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
    /// Request correlation block.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<Meta>,
}

impl ResponseEnvelope {
    /// Build a success response.
    pub fn data(payload: Value, meta: Meta) -> Self {
        Self {
            data: Some(payload),
            error: None,
            meta: Some(meta),
        }
    }

    /// Build an error response with a plain string message.
    pub fn error(message: impl Into<String>, meta: Meta) -> Self {
        Self::error_value(Value::String(message.into()), meta)
    }

    /// Build an error response whose message is an arbitrary JSON value
    /// (used to pass through structured store failures).
    pub fn error_value(message: Value, meta: Meta) -> Self {
        Self {
            data: None,
            error: Some(ErrorBody { message }),
            meta: Some(meta),
        }
    }

    /// Build a rate-limit warning. The only outbound message without `meta`.
    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            data: None,
            error: Some(ErrorBody {
                message: Value::String(message.into()),
            }),
            meta: None,
        }
    }
}
