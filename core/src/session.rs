//! Per-client session state and its transitions.

use crate::response::Reply;

pub const LOGIN_OPERATION: &str = "Login";
pub const LOGOUT_OPERATION: &str = "Logout";

/// Where a client is in the login lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Anonymous,
    Authenticating,
    Authenticated,
}

/// Mutable session fields owned by one client.
///
/// Only successful replies change them, except `clear`, which Logout calls
/// no matter how the server answered. A failure such as
/// `RPM_PE_INVALID_SESSION` leaves everything as it was.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub session_id: Option<String>,
    /// `name=value` pair of the cookie issued at Login.
    pub cookie: Option<String>,
    pub user: Option<String>,
    pub role: Option<String>,
    pub(crate) login_pending: bool,
}

impl Session {
    pub fn state(&self) -> SessionState {
        if self.login_pending {
            SessionState::Authenticating
        } else if self.session_id.is_some() {
            SessionState::Authenticated
        } else {
            SessionState::Anonymous
        }
    }

    pub(crate) fn begin_login(&mut self) {
        self.login_pending = true;
    }

    pub(crate) fn end_login(&mut self) {
        self.login_pending = false;
    }

    /// Apply a successful reply: refresh the session id and, for Login,
    /// capture the first `Set-Cookie` value.
    pub fn record_success<'a>(
        &mut self,
        operation: &str,
        reply: &Reply,
        mut set_cookies: impl Iterator<Item = &'a str>,
    ) {
        if let Some(id) = reply.session_id() {
            if self.session_id.as_deref() != Some(id) {
                tracing::debug!(operation, session_id = id, "session id updated");
            }
            self.session_id = Some(id.to_string());
        }
        if operation == LOGIN_OPERATION {
            if let Some(cookie) = set_cookies.next() {
                self.cookie = Some(cookie_pair(cookie).to_string());
            }
        }
    }

    /// Take the user and role from a successful Login reply.
    pub fn record_login(&mut self, reply: &Reply) {
        self.user = reply.user().map(str::to_string);
        self.role = reply.user_group().map(str::to_string);
        tracing::debug!(user = ?self.user, role = ?self.role, "logged in");
    }

    pub fn clear(&mut self) {
        if self.session_id.is_some() {
            tracing::debug!("session cleared");
        }
        *self = Session::default();
    }
}

// `JSESSIONID=abc; Path=/; HttpOnly` -> `JSESSIONID=abc`
fn cookie_pair(set_cookie: &str) -> &str {
    set_cookie.split(';').next().unwrap_or(set_cookie).trim()
}
