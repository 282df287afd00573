//! Normalization of RPM replies.
//!
//! # Design
//! Some server builds wrap every leaf as `{"text": value}`, others send flat
//! values. Replies are always run through `strip_text_wrappers`, which is a
//! no-op on the flat shape, so callers and the session logic only ever see
//! flat values.
//!
//! A body that is not JSON is not an error: it comes back as
//! `Payload::Text` and the caller decides what to make of it.

use serde_json::{Map, Value};

use crate::error::ProtocolError;

/// The status code of a successful operation.
pub const STATUS_OK: &str = "RPM_PE_STATUS_OK";

/// Key of single-entry text wrapper objects.
pub const TEXT_MARKER: &str = "text";

/// True iff `code` is exactly `RPM_PE_STATUS_OK`.
pub fn is_okay(code: Option<&str>) -> bool {
    code == Some(STATUS_OK)
}

/// A reply body after parsing.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Json(Value),
    /// The body was not valid JSON; this is its lossy UTF-8 text.
    Text(String),
}

impl Payload {
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Payload::Json(value) => Some(value),
            Payload::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Payload::Text(text) => Some(text),
            Payload::Json(_) => None,
        }
    }
}

/// A successful (or degraded, non-JSON) reply.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    payload: Payload,
}

impl Reply {
    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn into_payload(self) -> Payload {
        self.payload
    }

    pub fn json(&self) -> Option<&Value> {
        self.payload.as_json()
    }

    /// `PVResponse.PVStatus`, if present.
    pub fn status(&self) -> Option<&Map<String, Value>> {
        self.json().and_then(status_of).and_then(Value::as_object)
    }

    pub fn status_field(&self, key: &str) -> Option<&str> {
        self.status().and_then(|s| s.get(key)).and_then(text_of)
    }

    pub fn code(&self) -> Option<&str> {
        self.status_field("Code")
    }

    pub fn session_id(&self) -> Option<&str> {
        self.status_field("SessionId")
    }

    pub fn message(&self) -> Option<&str> {
        self.status_field("Message")
    }

    pub fn user(&self) -> Option<&str> {
        self.status_field("User")
    }

    pub fn user_group(&self) -> Option<&str> {
        self.status_field("UserGroup")
    }

    pub fn is_malformed(&self) -> bool {
        matches!(self.payload, Payload::Text(_))
    }
}

/// String content of a leaf, whether flat or `{text: ...}`-wrapped.
pub fn text_of(value: &Value) -> Option<&str> {
    match value {
        Value::String(s) => Some(s),
        Value::Object(map) => map.get(TEXT_MARKER).and_then(Value::as_str),
        _ => None,
    }
}

fn status_of(json: &Value) -> Option<&Value> {
    json.get("PVResponse")?.get("PVStatus")
}

/// Collapse every object whose only key is `text` into that key's value,
/// depth-first, across the whole tree.
pub fn strip_text_wrappers(value: Value) -> Value {
    match value {
        Value::Array(items) => Value::Array(items.into_iter().map(strip_text_wrappers).collect()),
        Value::Object(map) => {
            let mut map: Map<String, Value> = map
                .into_iter()
                .map(|(k, v)| (k, strip_text_wrappers(v)))
                .collect();
            if map.len() == 1 && map.contains_key(TEXT_MARKER) {
                map.remove(TEXT_MARKER).unwrap_or(Value::Null)
            } else {
                Value::Object(map)
            }
        }
        other => other,
    }
}

/// Parse a raw reply body and decide success from `PVStatus.Code`.
pub fn normalize(body: &[u8]) -> Result<Reply, ProtocolError> {
    let text = String::from_utf8_lossy(body);
    let json = match serde_json::from_str::<Value>(&text) {
        Ok(json) => strip_text_wrappers(json),
        Err(err) => {
            tracing::warn!(error = %err, bytes = body.len(), "RPM reply is not JSON, returning raw text");
            return Ok(Reply {
                payload: Payload::Text(text.into_owned()),
            });
        }
    };

    let status = status_of(&json).cloned();
    let code = status
        .as_ref()
        .and_then(|s| s.get("Code"))
        .and_then(code_text);

    if is_okay(code.as_deref()) {
        Ok(Reply {
            payload: Payload::Json(json),
        })
    } else {
        Err(ProtocolError {
            code,
            status,
            json: Payload::Json(json),
        })
    }
}

fn code_text(value: &Value) -> Option<String> {
    match value {
        Value::Number(n) => Some(n.to_string()),
        other => text_of(other).map(str::to_string),
    }
}
