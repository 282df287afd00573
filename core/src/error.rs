//! Error types for the RPM client.
//!
//! # Design
//! Transport failures (nothing came back from the server) and protocol
//! failures (the server answered with a non-OK status code) are separate
//! variants because only the latter carry server diagnostics. A
//! `ProtocolError` keeps the code, the whole `PVStatus` object and the whole
//! reply so nothing the server said is lost.

use std::fmt;

use serde_json::Value;
use thiserror::Error;

use crate::response::{text_of, Payload};

pub type Result<T> = std::result::Result<T, PvError>;

/// Errors returned by `PvServer` operations.
#[derive(Debug, Error)]
pub enum PvError {
    /// The exchange failed before any HTTP response was received.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The server answered with a status code other than `RPM_PE_STATUS_OK`.
    #[error(transparent)]
    Protocol(Box<ProtocolError>),

    #[error("invalid server url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("unsupported url scheme: {0}")]
    UnsupportedScheme(String),

    #[error("server url has no host: {0}")]
    MissingHost(String),
}

impl PvError {
    /// The structured server failure, if this is one.
    pub fn protocol(&self) -> Option<&ProtocolError> {
        match self {
            PvError::Protocol(err) => Some(err),
            _ => None,
        }
    }

    /// Server status code of a protocol failure.
    pub fn code(&self) -> Option<&str> {
        self.protocol().and_then(|err| err.code.as_deref())
    }
}

impl From<ProtocolError> for PvError {
    fn from(err: ProtocolError) -> Self {
        PvError::Protocol(Box::new(err))
    }
}

/// Network-level failures raised by a `Transport`.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("HTTP exchange failed: {0}")]
    Http(#[from] ureq::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("transport task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// A well-formed reply whose status code is not `RPM_PE_STATUS_OK`.
#[derive(Debug, Clone, PartialEq)]
pub struct ProtocolError {
    /// `PVStatus.Code`, absent when the reply had no status.
    pub code: Option<String>,
    /// The full `PVStatus` object.
    pub status: Option<Value>,
    /// The full reply.
    pub json: Payload,
}

pub const NO_MESSAGE: &str = "No relevant message";

impl ProtocolError {
    /// `PVStatus.Message`, flat or `{text: ...}`-wrapped, or a placeholder.
    pub fn message(&self) -> &str {
        self.status
            .as_ref()
            .and_then(|status| status.get("Message"))
            .and_then(text_of)
            .unwrap_or(NO_MESSAGE)
    }
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {}",
            self.code.as_deref().unwrap_or("<no status code>"),
            self.message()
        )
    }
}

impl std::error::Error for ProtocolError {}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn protocol(status: Option<Value>) -> ProtocolError {
        ProtocolError {
            code: Some("RPM_PE_INVALID_SESSION".to_string()),
            status,
            json: Payload::Json(Value::Null),
        }
    }

    #[test]
    fn message_reads_flat_field() {
        let err = protocol(Some(json!({"Code": "X", "Message": "Session expired"})));
        assert_eq!(err.message(), "Session expired");
    }

    #[test]
    fn message_reads_wrapped_field() {
        let err = protocol(Some(json!({"Code": "X", "Message": {"text": "Session expired"}})));
        assert_eq!(err.message(), "Session expired");
    }

    #[test]
    fn message_falls_back_to_placeholder() {
        assert_eq!(protocol(None).message(), NO_MESSAGE);
        assert_eq!(protocol(Some(json!({"Code": "X"}))).message(), NO_MESSAGE);
    }

    #[test]
    fn display_includes_code_and_message() {
        let err = PvError::from(protocol(Some(json!({"Message": "gone"}))));
        assert_eq!(err.to_string(), "RPM_PE_INVALID_SESSION: gone");
        assert_eq!(err.code(), Some("RPM_PE_INVALID_SESSION"));
    }
}
