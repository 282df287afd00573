use std::{collections::HashMap, sync::Arc};

use axum::{
    extract::{FromRequest, Multipart, Request, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Form, Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tokio::{net::TcpListener, sync::RwLock};
use uuid::Uuid;

pub const STATUS_OK: &str = "RPM_PE_STATUS_OK";
pub const INVALID_SESSION: &str = "RPM_PE_INVALID_SESSION";
pub const LOGIN_FAILED: &str = "RPM_PE_LOGIN_FAILED";
pub const INTERNAL_ERROR: &str = "RPM_PE_INTERNAL_ERROR";
pub const BAD_REQUEST: &str = "RPM_PE_BAD_REQUEST";

#[derive(Clone, Debug)]
pub struct Account {
    pub password: String,
    pub credential_key: Option<String>,
    pub group: String,
}

/// Behaviour switches for the stub.
#[derive(Clone, Debug)]
pub struct StubConfig {
    pub accounts: HashMap<String, Account>,
    /// Wrap every leaf of the reply as `{"text": value}`.
    pub wrapped_text: bool,
    /// Answer every Logout with `RPM_PE_INTERNAL_ERROR`.
    pub fail_logout: bool,
}

impl Default for StubConfig {
    fn default() -> Self {
        let mut accounts = HashMap::new();
        accounts.insert(
            "admin".to_string(),
            Account {
                password: "secret".to_string(),
                credential_key: Some("admin-key".to_string()),
                group: "Administrators".to_string(),
            },
        );
        Self {
            accounts,
            wrapped_text: false,
            fail_logout: false,
        }
    }
}

impl StubConfig {
    pub fn wrapped(mut self) -> Self {
        self.wrapped_text = true;
        self
    }

    pub fn failing_logout(mut self) -> Self {
        self.fail_logout = true;
        self
    }

    pub fn with_account(mut self, user: &str, password: &str, group: &str) -> Self {
        self.accounts.insert(
            user.to_string(),
            Account {
                password: password.to_string(),
                credential_key: None,
                group: group.to_string(),
            },
        );
        self
    }
}

/// What the stub saw of one request.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RecordedRequest {
    pub path: String,
    pub operation: String,
    pub session_id: Option<String>,
    pub cookie: Option<String>,
    pub client_version: Option<String>,
    pub client_platform: Option<String>,
    /// Raw `<Params>` content, still escaped.
    pub params: String,
    /// Multipart fields other than the RPM ones; files as `name -> filename:size`.
    pub fields: Vec<(String, String)>,
}

struct Inner {
    config: StubConfig,
    sessions: RwLock<HashMap<String, String>>,
    requests: RwLock<Vec<RecordedRequest>>,
}

/// An in-memory RPM server. Clones share state.
#[derive(Clone)]
pub struct StubServer {
    inner: Arc<Inner>,
}

impl StubServer {
    pub fn new(config: StubConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                sessions: RwLock::new(HashMap::new()),
                requests: RwLock::new(Vec::new()),
            }),
        }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/{*path}", post(rpm))
            .with_state(self.clone())
    }

    pub async fn requests(&self) -> Vec<RecordedRequest> {
        self.inner.requests.read().await.clone()
    }

    pub async fn active_sessions(&self) -> usize {
        self.inner.sessions.read().await.len()
    }
}

pub fn app() -> Router {
    StubServer::new(StubConfig::default()).router()
}

pub async fn run(listener: TcpListener, stub: StubServer) -> Result<(), std::io::Error> {
    axum::serve(listener, stub.router()).await
}

#[derive(Deserialize)]
struct RpmForm {
    #[serde(default)]
    dataformat: Option<String>,
    request: String,
}

async fn rpm(State(stub): State<StubServer>, headers: HeaderMap, request: Request) -> Response {
    let path = request.uri().path().to_string();
    if !path.ends_with("/RPM") {
        return StatusCode::NOT_FOUND.into_response();
    }

    let content_type = header_text(&headers, header::CONTENT_TYPE.as_str()).unwrap_or_default();
    let parsed = if content_type.starts_with("multipart/form-data") {
        match Multipart::from_request(request, &()).await {
            Ok(multipart) => read_multipart(multipart).await,
            Err(rejection) => Err(rejection.into_response()),
        }
    } else {
        match Form::<RpmForm>::from_request(request, &()).await {
            Ok(Form(form)) => Ok(read_envelope(form)),
            Err(rejection) => Err(rejection.into_response()),
        }
    };
    let mut recorded = match parsed {
        Ok(recorded) => recorded,
        Err(response) => return response,
    };

    recorded.path = path;
    recorded.cookie = header_text(&headers, header::COOKIE.as_str());
    recorded.client_version = header_text(&headers, "x-pvclient-version");
    recorded.client_platform = header_text(&headers, "x-pvclient-platform");
    tracing::info!(
        operation = %recorded.operation,
        session = ?recorded.session_id,
        "RPM request"
    );
    stub.inner.requests.write().await.push(recorded.clone());

    stub.dispatch(&recorded).await
}

fn header_text(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn read_envelope(form: RpmForm) -> RecordedRequest {
    if form.dataformat.as_deref() != Some("json") {
        tracing::warn!(dataformat = ?form.dataformat, "unexpected data format");
    }
    let xml = form.request;
    RecordedRequest {
        operation: between(&xml, "<Name>", "</Name>").unwrap_or_default().to_string(),
        session_id: between(&xml, "sessionId=\"", "\"").map(str::to_string),
        params: between(&xml, "<Params>", "</Params>").unwrap_or_default().to_string(),
        ..RecordedRequest::default()
    }
}

async fn read_multipart(mut multipart: Multipart) -> Result<RecordedRequest, Response> {
    let mut recorded = RecordedRequest::default();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(IntoResponse::into_response)?
    {
        let name = field.name().unwrap_or_default().to_string();
        if let Some(filename) = field.file_name().map(str::to_string) {
            let data = field.bytes().await.map_err(IntoResponse::into_response)?;
            recorded
                .fields
                .push((name, format!("{filename}:{}", data.len())));
            continue;
        }
        let text = field.text().await.map_err(IntoResponse::into_response)?;
        match name.as_str() {
            "SessionId" => recorded.session_id = Some(text),
            "Operation" => recorded.operation = text,
            "dataformat" => {}
            _ => recorded.fields.push((name, text)),
        }
    }
    Ok(recorded)
}

fn between<'a>(text: &'a str, start: &str, end: &str) -> Option<&'a str> {
    let from = text.find(start)? + start.len();
    let len = text[from..].find(end)?;
    Some(&text[from..from + len])
}

fn unescape(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&#37;", "%")
        .replace("&quot;", "\"")
        .replace("&amp;", "&")
}

impl StubServer {
    async fn dispatch(&self, req: &RecordedRequest) -> Response {
        match req.operation.as_str() {
            "Login" => self.login(req).await,
            "Logout" => self.logout(req).await,
            "Heartbeat" => (StatusCode::OK, "alive").into_response(),
            "" => self.reply(BAD_REQUEST, &[("Message", "Missing operation name")], None),
            _ => {
                let Some(session_id) = self.valid_session(req).await else {
                    return self.reply(
                        INVALID_SESSION,
                        &[("Message", "Session is invalid or has expired")],
                        None,
                    );
                };
                let extra = match req.operation.as_str() {
                    "Query" => json!({
                        "Result": {
                            "Rows": [
                                { "PV_Industry": "Retail", "PV_Order_Margin": "0.42" },
                                { "PV_Industry": "Energy", "PV_Order_Margin": "0.17" }
                            ]
                        }
                    }),
                    "UploadFile" => {
                        let files: Vec<Value> = req
                            .fields
                            .iter()
                            .map(|(name, value)| json!({ "Field": name, "Value": value }))
                            .collect();
                        json!({ "Files": files })
                    }
                    other => json!({ "Operation": other, "Params": req.params }),
                };
                self.reply(STATUS_OK, &[("SessionId", session_id.as_str())], Some(extra))
            }
        }
    }

    async fn valid_session(&self, req: &RecordedRequest) -> Option<String> {
        let id = req.session_id.as_ref()?;
        let sessions = self.inner.sessions.read().await;
        sessions.contains_key(id).then(|| id.clone())
    }

    async fn login(&self, req: &RecordedRequest) -> Response {
        let field = |tag: &str| {
            between(&req.params, &format!("<{tag}>"), &format!("</{tag}>")).map(unescape)
        };
        let user = field("User").unwrap_or_default();
        let account = self.inner.config.accounts.get(&user);
        let accepted = account.is_some_and(|account| {
            field("Password").as_deref() == Some(account.password.as_str())
                || (account.credential_key.is_some()
                    && field("CredentialKey") == account.credential_key)
        });
        let Some(account) = account.filter(|_| accepted) else {
            return self.reply(LOGIN_FAILED, &[("Message", "Invalid user or password")], None);
        };

        let session_id = Uuid::new_v4().to_string();
        self.inner
            .sessions
            .write()
            .await
            .insert(session_id.clone(), user.clone());
        let cookie = format!("JSESSIONID={}; Path=/; HttpOnly", Uuid::new_v4().simple());
        let body = self.reply(
            STATUS_OK,
            &[
                ("SessionId", session_id.as_str()),
                ("User", user.as_str()),
                ("UserGroup", account.group.as_str()),
            ],
            None,
        );
        ([(header::SET_COOKIE, cookie)], body).into_response()
    }

    async fn logout(&self, req: &RecordedRequest) -> Response {
        if self.inner.config.fail_logout {
            return self.reply(INTERNAL_ERROR, &[("Message", "Logout failed")], None);
        }
        let removed = match &req.session_id {
            Some(id) => self.inner.sessions.write().await.remove(id).is_some(),
            None => false,
        };
        if removed {
            self.reply(STATUS_OK, &[], None)
        } else {
            self.reply(
                INVALID_SESSION,
                &[("Message", "Session is invalid or has expired")],
                None,
            )
        }
    }

    fn reply(&self, code: &str, fields: &[(&str, &str)], extra: Option<Value>) -> Response {
        let mut status = Map::new();
        status.insert("Code".to_string(), json!(code));
        for (key, value) in fields {
            status.insert(key.to_string(), json!(value));
        }
        let mut response = Map::new();
        response.insert("PVStatus".to_string(), Value::Object(status));
        if let Some(Value::Object(extra)) = extra {
            response.extend(extra);
        }
        let body = json!({ "PVResponse": Value::Object(response) });
        let body = if self.inner.config.wrapped_text {
            wrap_leaves(body)
        } else {
            body
        };
        Json(body).into_response()
    }
}

/// Wrap every scalar leaf as `{"text": leaf}`, the way some server builds
/// shape their replies.
pub fn wrap_leaves(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, wrap_leaves(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(wrap_leaves).collect()),
        leaf => json!({ "text": leaf }),
    }
}
