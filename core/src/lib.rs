//! Client core for the PV server RPM API.
//!
//! # Overview
//! The RPM API takes an XML operation envelope in a form-encoded `POST` and
//! answers with JSON carrying a `PVResponse.PVStatus` envelope. This crate
//! turns parameter trees into that XML, executes the exchange, normalizes
//! the JSON reply and keeps the session state it implies.
//!
//! # Design
//! - `RpmClient` builds `HttpRequest` values and parses `HttpResponse`
//!   values without touching the network, so the I/O boundary is explicit.
//! - `PvServer` is the async facade: it owns a `Session` and a `Transport`
//!   and exposes `login`, `logout`, `send_request` and `send_form_request`.
//! - Replies are normalized to a flat shape whether or not the server wraps
//!   leaves as `{"text": value}`.
//! - The mock server crate implements the same wire protocol independently;
//!   integration tests catch drift between the two.

pub mod client;
pub mod config;
pub mod envelope;
pub mod error;
pub mod form;
pub mod http;
pub mod response;
pub mod server;
pub mod session;
pub mod target;
pub mod transport;
pub mod xml;

pub use client::RpmClient;
pub use config::ClientConfig;
pub use envelope::{build_envelope, Params};
pub use error::{ProtocolError, PvError, Result, TransportError};
pub use form::{FormField, FormValue};
pub use http::{HttpRequest, HttpResponse};
pub use response::{is_okay, normalize, strip_text_wrappers, Payload, Reply, STATUS_OK};
pub use server::PvServer;
pub use session::{Session, SessionState};
pub use target::{Scheme, Target};
pub use transport::{Transport, UreqTransport};
pub use xml::{serialize, Param};
