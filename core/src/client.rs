//! Request builder and response parser for the RPM API.
//!
//! # Design
//! `RpmClient` holds the connection target and client settings and nothing
//! else. Each exchange is split into a `build_*` method that produces an
//! `HttpRequest` and `parse_response`, which consumes the `HttpResponse` and
//! applies its effect to a caller-owned `Session`. No I/O happens here, so
//! everything is deterministic and testable with canned responses.

use uuid::Uuid;

use crate::config::ClientConfig;
use crate::envelope::{build_envelope, Params};
use crate::error::{PvError, Result};
use crate::form::{encode_multipart, encode_urlencoded, FormField};
use crate::http::{HttpRequest, HttpResponse};
use crate::response::{normalize, Reply};
use crate::session::{Session, LOGIN_OPERATION};
use crate::target::Target;
use crate::xml::Param;

pub const DATA_FORMAT: &str = "json";

/// Builds RPM requests and interprets replies without touching the network.
#[derive(Debug, Clone)]
pub struct RpmClient {
    target: Target,
    config: ClientConfig,
}

impl RpmClient {
    pub fn new(url: &str) -> Result<Self> {
        Self::with_config(url, ClientConfig::default())
    }

    pub fn with_config(url: &str, config: ClientConfig) -> Result<Self> {
        Ok(Self {
            target: Target::parse(url)?,
            config,
        })
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Point the client at another server. The old target is kept on error.
    pub fn set_host_url(&mut self, url: &str) -> Result<()> {
        self.target = Target::parse(url)?;
        Ok(())
    }

    /// Form-encoded `POST` carrying the operation envelope.
    pub fn build_request(&self, session: &Session, operation: &str, params: &Params) -> HttpRequest {
        let envelope = build_envelope(session.session_id.as_deref(), operation, &params.to_fragment());
        let body = encode_urlencoded(&[("dataformat", DATA_FORMAT), ("request", envelope.as_str())]);
        let headers = self.headers(
            session,
            "application/x-www-form-urlencoded".to_string(),
            body.len(),
        );
        HttpRequest {
            url: self.target.endpoint(),
            headers,
            body: body.into_bytes(),
        }
    }

    /// Login parameters: user, optional password and credential key, the
    /// requested session timeout and the device name.
    pub fn login_params(&self, user: &str, password: Option<&str>, credential_key: Option<&str>) -> Params {
        let mut entries = vec![("User".to_string(), Param::from(user))];
        if let Some(password) = password.filter(|p| !p.is_empty()) {
            entries.push(("Password".to_string(), Param::from(password)));
        }
        if let Some(key) = credential_key.filter(|k| !k.is_empty()) {
            entries.push(("CredentialKey".to_string(), Param::from(key)));
        }
        entries.push(("TimeOut".to_string(), Param::from(self.config.timeout_secs)));
        entries.push(("DeviceName".to_string(), Param::from(&self.config.device)));
        Params::Tree(Param::Map(entries))
    }

    pub fn build_login(
        &self,
        session: &Session,
        user: &str,
        password: Option<&str>,
        credential_key: Option<&str>,
    ) -> HttpRequest {
        let params = self.login_params(user, password, credential_key);
        self.build_request(session, LOGIN_OPERATION, &params)
    }

    /// Multipart `POST` for operations that upload files. `SessionId` (while
    /// a session is active), `Operation` and `dataformat` precede the
    /// caller's fields.
    pub fn build_form_request(&self, session: &Session, operation: &str, fields: &[FormField]) -> HttpRequest {
        let boundary = format!("----PVFormBoundary{}", Uuid::new_v4().simple());
        let mut all = Vec::with_capacity(fields.len() + 3);
        if let Some(id) = session.session_id.as_deref() {
            all.push(FormField::text("SessionId", id));
        }
        all.push(FormField::text("Operation", operation));
        all.push(FormField::text("dataformat", DATA_FORMAT));
        all.extend_from_slice(fields);

        let body = encode_multipart(&all, &boundary);
        let headers = self.headers(
            session,
            format!("multipart/form-data; boundary={boundary}"),
            body.len(),
        );
        HttpRequest {
            url: self.target.endpoint(),
            headers,
            body,
        }
    }

    /// Normalize a reply and apply its session effects.
    ///
    /// The HTTP status is not consulted: the server reports failures through
    /// `PVStatus.Code`, often with a 200.
    pub fn parse_response(&self, session: &mut Session, operation: &str, response: HttpResponse) -> Result<Reply> {
        tracing::trace!(operation, status = response.status, bytes = response.body.len(), "RPM reply received");
        let reply = normalize(&response.body).map_err(PvError::from)?;
        if !reply.is_malformed() {
            session.record_success(operation, &reply, response.header_values("set-cookie"));
        }
        Ok(reply)
    }

    fn headers(&self, session: &Session, content_type: String, content_length: usize) -> Vec<(String, String)> {
        let mut headers = vec![
            ("Content-Type".to_string(), content_type),
            ("Content-Length".to_string(), content_length.to_string()),
            ("Connection".to_string(), "Keep-Alive".to_string()),
            ("X-PVClient-Version".to_string(), self.config.version.clone()),
            ("X-PVClient-Platform".to_string(), self.config.device.clone()),
        ];
        if let Some(cookie) = &session.cookie {
            headers.push(("Cookie".to_string(), cookie.clone()));
        }
        headers
    }
}
