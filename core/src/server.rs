//! Session-holding facade over `RpmClient` and a `Transport`.
//!
//! # Design
//! `PvServer` owns one `Session`; there is no process-wide state. Every
//! operation takes `&mut self`, so two calls on the same client cannot be in
//! flight at once and callers sequence Login before other operations by
//! awaiting it. Logout resets local state before its result is returned,
//! whether the server accepted it or not.

use crate::client::RpmClient;
use crate::config::ClientConfig;
use crate::envelope::Params;
use crate::error::{PvError, Result};
use crate::form::FormField;
use crate::http::HttpRequest;
use crate::response::{self, Reply};
use crate::session::{Session, SessionState, LOGIN_OPERATION, LOGOUT_OPERATION};
use crate::target::Target;
use crate::transport::{Transport, UreqTransport};

/// An RPM API client bound to one server and one session.
#[derive(Debug)]
pub struct PvServer<T: Transport = UreqTransport> {
    client: RpmClient,
    session: Session,
    transport: T,
}

impl PvServer<UreqTransport> {
    pub fn new(url: &str) -> Result<Self> {
        Self::with_config(url, ClientConfig::default())
    }

    pub fn with_config(url: &str, config: ClientConfig) -> Result<Self> {
        let transport = UreqTransport::new(config.socket_timeout());
        Self::with_transport(url, config, transport)
    }
}

impl<T: Transport> PvServer<T> {
    pub fn with_transport(url: &str, config: ClientConfig, transport: T) -> Result<Self> {
        Ok(Self {
            client: RpmClient::with_config(url, config)?,
            session: Session::default(),
            transport,
        })
    }

    /// True iff `code` is exactly `RPM_PE_STATUS_OK`.
    pub fn is_okay(code: Option<&str>) -> bool {
        response::is_okay(code)
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state() == SessionState::Authenticated
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session.session_id.as_deref()
    }

    pub fn cookie(&self) -> Option<&str> {
        self.session.cookie.as_deref()
    }

    pub fn user(&self) -> Option<&str> {
        self.session.user.as_deref()
    }

    pub fn role(&self) -> Option<&str> {
        self.session.role.as_deref()
    }

    pub fn target(&self) -> &Target {
        self.client.target()
    }

    pub fn config(&self) -> &ClientConfig {
        self.client.config()
    }

    pub fn config_path(&self) -> &str {
        &self.client.config().config_path
    }

    /// Point the client at another server. The session is left alone.
    pub fn set_host_url(&mut self, url: &str) -> Result<()> {
        self.client.set_host_url(url)
    }

    /// Forget the local session without telling the server.
    pub fn reset(&mut self) {
        self.session.clear();
    }

    /// Send `operation` with either a pre-built XML string or a parameter
    /// tree.
    pub async fn send_request(&mut self, operation: &str, params: impl Into<Params>) -> Result<Reply> {
        let request = self.client.build_request(&self.session, operation, &params.into());
        self.exchange(operation, request).await
    }

    /// Send a multipart operation, typically a file upload.
    pub async fn send_form_request(&mut self, operation: &str, fields: Vec<FormField>) -> Result<Reply> {
        let request = self.client.build_form_request(&self.session, operation, &fields);
        self.exchange(operation, request).await
    }

    /// Log in and record the user and role the server reports.
    pub async fn login(
        &mut self,
        user: &str,
        password: Option<&str>,
        credential_key: Option<&str>,
    ) -> Result<Reply> {
        let request = self
            .client
            .build_login(&self.session, user, password, credential_key);
        let result = {
            let mut pending = PendingLogin::begin(&mut self.session);
            exchange(&self.client, &self.transport, pending.session(), LOGIN_OPERATION, request).await
        };

        let reply = result?;
        self.session.record_login(&reply);
        Ok(reply)
    }

    /// Log out. Local session state is cleared even when the server call
    /// fails.
    pub async fn logout(&mut self) -> Result<Reply> {
        let request = self
            .client
            .build_request(&self.session, LOGOUT_OPERATION, &Params::None);
        let result = self.exchange(LOGOUT_OPERATION, request).await;
        self.session.clear();
        result
    }

    async fn exchange(&mut self, operation: &str, request: HttpRequest) -> Result<Reply> {
        exchange(&self.client, &self.transport, &mut self.session, operation, request).await
    }
}

async fn exchange<T: Transport>(
    client: &RpmClient,
    transport: &T,
    session: &mut Session,
    operation: &str,
    request: HttpRequest,
) -> Result<Reply> {
    tracing::debug!(
        operation,
        endpoint = %request.url,
        session = session.session_id.is_some(),
        "sending RPM request"
    );
    let response = transport.execute(request).await.map_err(PvError::from)?;
    client.parse_response(session, operation, response)
}

/// Marks a session as authenticating until dropped, so a login future
/// cancelled mid-flight does not leave it stuck in that state.
struct PendingLogin<'a> {
    session: &'a mut Session,
}

impl<'a> PendingLogin<'a> {
    fn begin(session: &'a mut Session) -> Self {
        session.begin_login();
        Self { session }
    }

    fn session(&mut self) -> &mut Session {
        self.session
    }
}

impl Drop for PendingLogin<'_> {
    fn drop(&mut self) {
        self.session.end_login();
    }
}
