//! Session lifecycle tests against the live stub RPM server.
//!
//! # Design
//! Starts the stub on a random port in a background thread, then drives
//! `PvServer` over real HTTP through the default ureq transport. The stub
//! records what it received, so request shape and session propagation are
//! checked from the server's side as well.

use mock_server::{StubConfig, StubServer};
use pvserver_core::{ClientConfig, FormField, Param, PvError, PvServer, SessionState};
use serde_json::json;

/// Start the stub on a random port and return it with its base URL.
fn spawn_stub(config: StubConfig) -> (StubServer, String) {
    let std_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = std_listener.local_addr().unwrap();
    std_listener.set_nonblocking(true).unwrap();

    let stub = StubServer::new(config);
    let server = stub.clone();
    std::thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let listener = tokio::net::TcpListener::from_std(std_listener).unwrap();
            mock_server::run(listener, server).await
        })
        .unwrap();
    });

    (stub, format!("http://{addr}"))
}

fn query_params() -> Param {
    Param::from(json!({
        "Currency": "USD",
        "ProfitModel": "PipelineProduct",
        "Category": "Sales",
        "Groups": { "Group": { "attributes": { "name": "Res1" }, "text": "PV_Industry" } },
        "Fields": { "Field": "PV_Order_Margin" },
        "SearchCriteria": {
            "DateRange": {
                "attributes": { "ignoreBaseQuery": "true" },
                "From": { "Year": "1000", "Month": "01" },
                "To": { "Year": "2999", "Month": "06" }
            }
        }
    }))
}

#[tokio::test]
async fn session_lifecycle() {
    // Step 1: start stub and log in.
    let (stub, url) = spawn_stub(StubConfig::default());
    let mut pv = PvServer::new(&url).unwrap();
    assert_eq!(pv.state(), SessionState::Anonymous);

    let reply = pv.login("admin", Some("secret"), None).await.unwrap();
    assert_eq!(reply.code(), Some("RPM_PE_STATUS_OK"));
    assert_eq!(pv.session_id(), reply.session_id());
    assert_eq!(pv.user(), Some("admin"));
    assert_eq!(pv.role(), Some("Administrators"));
    assert!(pv.cookie().unwrap().starts_with("JSESSIONID="));
    let session_id = pv.session_id().unwrap().to_string();
    let cookie = pv.cookie().unwrap().to_string();

    // Step 2: upload a file.
    let reply = pv
        .send_form_request(
            "UploadFile",
            vec![
                FormField::file("file", "index.js", b"console.log('hi');".to_vec()),
                FormField::text("Persistent", "true"),
            ],
        )
        .await
        .unwrap();
    let files = &reply.json().unwrap()["PVResponse"]["Files"];
    assert_eq!(files[0]["Field"], "file");
    assert_eq!(files[0]["Value"], "index.js:18");
    assert_eq!(files[1]["Value"], "true");

    // Step 3: query with a structured tree.
    let reply = pv.send_request("Query", query_params()).await.unwrap();
    let rows = reply.json().unwrap()["PVResponse"]["Result"]["Rows"].as_array().unwrap();
    assert_eq!(rows.len(), 2);

    // Step 4: log out.
    pv.logout().await.unwrap();
    assert_eq!(pv.state(), SessionState::Anonymous);
    assert!(pv.cookie().is_none());

    // Step 5: query again; the server no longer knows the session.
    let err = pv
        .send_request("Query", "<Currency>USD</Currency>")
        .await
        .unwrap_err();
    assert_eq!(err.code(), Some("RPM_PE_INVALID_SESSION"));
    assert_eq!(err.protocol().unwrap().message(), "Session is invalid or has expired");
    assert_eq!(pv.state(), SessionState::Anonymous);

    // Step 6: check what the server saw.
    let seen = stub.requests().await;
    let operations: Vec<&str> = seen.iter().map(|r| r.operation.as_str()).collect();
    assert_eq!(operations, ["Login", "UploadFile", "Query", "Logout", "Query"]);
    assert!(seen[0].session_id.is_none());
    assert!(seen[0].cookie.is_none());
    for request in &seen[1..4] {
        assert_eq!(request.session_id.as_deref(), Some(session_id.as_str()));
        assert_eq!(request.cookie.as_deref(), Some(cookie.as_str()));
        assert_eq!(request.client_version.as_deref(), Some("3.4"));
        assert_eq!(request.client_platform.as_deref(), Some("HTML5"));
    }
    assert!(seen[4].session_id.is_none());
    assert!(seen[4].cookie.is_none());
    assert!(seen[2].params.contains("<Group name='Res1'>PV_Industry</Group>"));
    assert!(seen[2]
        .params
        .contains("<DateRange ignoreBaseQuery='true'><From><Year>1000</Year><Month>01</Month></From>"));
}

#[tokio::test]
async fn wrapped_server_replies_are_flattened() {
    let (_stub, url) = spawn_stub(StubConfig::default().wrapped());
    let mut pv = PvServer::new(&url).unwrap();

    let reply = pv.login("admin", Some("secret"), None).await.unwrap();
    assert_eq!(reply.json().unwrap()["PVResponse"]["PVStatus"]["User"], "admin");
    assert_eq!(pv.user(), Some("admin"));
    assert_eq!(pv.role(), Some("Administrators"));

    let reply = pv.send_request("Query", Param::map([("Currency", "USD")])).await.unwrap();
    assert_eq!(
        reply.json().unwrap()["PVResponse"]["Result"]["Rows"][0]["PV_Industry"],
        "Retail"
    );

    pv.logout().await.unwrap();
    let err = pv.send_request("Query", "").await.unwrap_err();
    assert_eq!(err.code(), Some("RPM_PE_INVALID_SESSION"));
    assert_eq!(err.protocol().unwrap().message(), "Session is invalid or has expired");
}

#[tokio::test]
async fn credential_key_login() {
    let (_stub, url) = spawn_stub(StubConfig::default());
    let mut pv = PvServer::new(&url).unwrap();
    pv.login("admin", None, Some("admin-key")).await.unwrap();
    assert!(pv.is_authenticated());
}

#[tokio::test]
async fn rejected_login_stays_anonymous() {
    let (stub, url) = spawn_stub(StubConfig::default());
    let mut pv = PvServer::new(&url).unwrap();
    let err = pv.login("admin", Some("wrong"), None).await.unwrap_err();
    assert_eq!(err.code(), Some("RPM_PE_LOGIN_FAILED"));
    assert_eq!(pv.state(), SessionState::Anonymous);
    assert_eq!(stub.active_sessions().await, 0);
}

#[tokio::test]
async fn failed_logout_still_clears_local_session() {
    let (stub, url) = spawn_stub(StubConfig::default().failing_logout());
    let mut pv = PvServer::new(&url).unwrap();
    pv.login("admin", Some("secret"), None).await.unwrap();

    let err = pv.logout().await.unwrap_err();
    assert_eq!(err.code(), Some("RPM_PE_INTERNAL_ERROR"));
    assert!(pv.session_id().is_none());
    assert!(pv.user().is_none());
    assert!(pv.role().is_none());
    assert!(pv.cookie().is_none());
    assert_eq!(stub.active_sessions().await, 1);
}

#[tokio::test]
async fn plain_text_reply_is_degraded_success() {
    let (_stub, url) = spawn_stub(StubConfig::default());
    let mut pv = PvServer::new(&url).unwrap();
    let reply = pv.send_request("Heartbeat", "").await.unwrap();
    assert!(reply.is_malformed());
    assert_eq!(reply.payload().as_text(), Some("alive"));
}

#[tokio::test]
async fn base_path_is_preserved() {
    let (stub, url) = spawn_stub(StubConfig::default());
    let mut pv = PvServer::new(&format!("{url}/PE/")).unwrap();
    pv.login("admin", Some("secret"), None).await.unwrap();
    assert_eq!(stub.requests().await[0].path, "/PE/RPM");
}

#[tokio::test]
async fn connection_refused_is_a_transport_error() {
    // Bind then drop to get a port nothing listens on.
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let mut pv = PvServer::with_config(
        &format!("http://127.0.0.1:{port}"),
        ClientConfig::default().with_socket_timeout(std::time::Duration::from_secs(5)),
    )
    .unwrap();

    let err = pv.login("admin", Some("secret"), None).await.unwrap_err();
    assert!(matches!(err, PvError::Transport(_)), "unexpected error: {err}");
    assert_eq!(pv.state(), SessionState::Anonymous);
}

/// Serve one canned HTTP reply on a random port, then close.
fn spawn_raw_reply(body: Vec<u8>) -> String {
    use std::io::{BufRead, BufReader, Read, Write};

    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    std::thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let mut reader = BufReader::new(stream);
        let mut content_length = 0;
        loop {
            let mut line = String::new();
            reader.read_line(&mut line).unwrap();
            if line == "\r\n" {
                break;
            }
            if let Some((name, value)) = line.split_once(':') {
                if name.eq_ignore_ascii_case("content-length") {
                    content_length = value.trim().parse().unwrap();
                }
            }
        }
        let mut request_body = vec![0; content_length];
        reader.read_exact(&mut request_body).unwrap();

        let mut stream = reader.into_inner();
        let head = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            body.len()
        );
        stream.write_all(head.as_bytes()).unwrap();
        stream.write_all(&body).unwrap();
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn replies_larger_than_ten_mebibytes_are_read_whole() {
    let blob = "x".repeat(11 * 1024 * 1024);
    let body = format!(
        r#"{{"PVResponse":{{"PVStatus":{{"Code":"RPM_PE_STATUS_OK"}},"Result":"{blob}"}}}}"#
    );
    let url = spawn_raw_reply(body.into_bytes());
    let mut pv = PvServer::new(&url).unwrap();

    let reply = pv.send_request("Query", "").await.unwrap();
    assert_eq!(reply.code(), Some("RPM_PE_STATUS_OK"));
    assert_eq!(
        reply.json().unwrap()["PVResponse"]["Result"].as_str().unwrap().len(),
        blob.len()
    );
}
