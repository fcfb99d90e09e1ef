//! `FirestoreStore` against a local HTTP stub standing in for both the token
//! endpoint and the Firestore REST API.

use doc_import::{
    DocumentId, DocumentStore, FirestoreOptions, FirestoreStore, IdSource, ImportConfig,
    ImportDocument, ImportError, Importer, ServiceAccountKey,
};
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::NamedTempFile;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

const PRIVATE_KEY: &str = include_str!("fixtures/service-account-key.pem");
const PUBLIC_KEY: &str = include_str!("fixtures/service-account-key.pub.pem");
const COMMIT_PATH: &str = "/projects/labtrack/databases/(default)/documents:commit";
const COMMIT_TIME: &str = "2026-10-16T09:30:00.123456Z";

#[derive(Debug, Clone)]
struct Recorded {
    method: String,
    path: String,
    headers: Vec<(String, String)>,
    body: String,
}

impl Recorded {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    fn form_value(&self, name: &str) -> Option<&str> {
        self.body
            .split('&')
            .filter_map(|pair| pair.split_once('='))
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v)
    }
}

/// Answers one request per connection with whatever `respond` returns.
struct StubServer {
    base: String,
    requests: Arc<Mutex<Vec<Recorded>>>,
}

impl StubServer {
    async fn start<F>(respond: F) -> Self
    where
        F: Fn(&Recorded) -> (u16, String) + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("stub should bind");
        let addr = listener.local_addr().expect("stub should have an address");
        let requests = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&requests);

        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let Some(request) = read_request(&mut socket).await else {
                    continue;
                };
                let (status, body) = respond(&request);
                log.lock().push(request);
                let response = format!(
                    "HTTP/1.1 {status} Stub\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });

        Self {
            base: format!("http://{addr}"),
            requests,
        }
    }

    fn token_uri(&self) -> String {
        format!("{}/token", self.base)
    }

    fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().clone()
    }

    fn requests_to(&self, path: &str) -> Vec<Recorded> {
        self.requests()
            .into_iter()
            .filter(|r| r.path == path)
            .collect()
    }
}

async fn read_request(socket: &mut TcpStream) -> Option<Recorded> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let header_end = loop {
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).into_owned();
    let mut lines = head.split("\r\n");
    let mut request_line = lines.next()?.split_whitespace();
    let method = request_line.next()?.to_string();
    let path = request_line.next()?.to_string();
    let headers: Vec<(String, String)> = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(k, v)| (k.trim().to_ascii_lowercase(), v.trim().to_string()))
        .collect();
    let length = headers
        .iter()
        .find(|(k, _)| k == "content-length")
        .and_then(|(_, v)| v.parse::<usize>().ok())
        .unwrap_or(0);

    while buf.len() < header_end + length {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    let body = String::from_utf8_lossy(&buf[header_end..header_end + length]).into_owned();

    Some(Recorded {
        method,
        path,
        headers,
        body,
    })
}

fn token_body(token: &str, expires_in: u64) -> String {
    json!({
        "access_token": token,
        "expires_in": expires_in,
        "token_type": "Bearer",
    })
    .to_string()
}

fn commit_ok() -> (u16, String) {
    (
        200,
        json!({ "commitTime": COMMIT_TIME, "writeResults": [{}] }).to_string(),
    )
}

fn permission_denied() -> (u16, String) {
    (
        403,
        json!({ "error": {
            "code": 403,
            "message": "Missing or insufficient permissions.",
            "status": "PERMISSION_DENIED",
        } })
        .to_string(),
    )
}

fn key_for(server: &StubServer) -> ServiceAccountKey {
    let content = json!({
        "type": "service_account",
        "project_id": "labtrack",
        "private_key_id": "kid-1",
        "private_key": PRIVATE_KEY,
        "client_email": "importer@labtrack.iam.gserviceaccount.com",
        "token_uri": server.token_uri(),
    })
    .to_string();
    ServiceAccountKey::from_json(&content, Path::new("stub-key.json"))
        .expect("stub key should parse")
}

fn options_for(server: &StubServer) -> FirestoreOptions {
    FirestoreOptions {
        endpoint: server.base.clone(),
        ..FirestoreOptions::default()
    }
}

async fn connect(server: &StubServer) -> Result<FirestoreStore, ImportError> {
    FirestoreStore::connect(&key_for(server), options_for(server)).await
}

fn user(id: &str, name: &str) -> ImportDocument {
    ImportDocument::new(
        DocumentId::new("users", id),
        IdSource::Field,
        BTreeMap::from([("name".to_string(), json!(name))]),
    )
}

#[tokio::test]
async fn rejected_token_request_is_an_auth_error() {
    let server = StubServer::start(|_| (401, json!({ "error": "invalid_grant" }).to_string())).await;

    let err = match connect(&server).await {
        Ok(_) => panic!("connect should fail when the token endpoint refuses"),
        Err(e) => e,
    };

    match &err {
        ImportError::Auth(msg) => {
            assert!(msg.contains("401"), "unexpected message: {msg}");
            assert!(msg.contains("invalid_grant"), "unexpected message: {msg}");
        }
        other => panic!("expected an auth error, got {other:?}"),
    }
    assert!(server.requests_to(COMMIT_PATH).is_empty());
}

#[tokio::test]
async fn token_request_carries_signed_assertion() {
    let server = StubServer::start(|_| (200, token_body("stub-token", 3600))).await;
    connect(&server).await.expect("connect should succeed");

    let requests = server.requests();
    assert_eq!(requests.len(), 1);
    let token_request = &requests[0];
    assert_eq!(token_request.method, "POST");
    assert_eq!(token_request.path, "/token");
    assert_eq!(
        token_request.form_value("grant_type"),
        Some("urn%3Aietf%3Aparams%3Aoauth%3Agrant-type%3Ajwt-bearer")
    );

    let assertion = token_request
        .form_value("assertion")
        .expect("assertion should be sent");
    let mut validation = Validation::new(Algorithm::RS256);
    validation.set_audience(&[server.token_uri()]);
    let decoded = jsonwebtoken::decode::<Value>(
        assertion,
        &DecodingKey::from_rsa_pem(PUBLIC_KEY.as_bytes()).expect("public key should load"),
        &validation,
    )
    .expect("assertion should verify against the key pair");

    assert_eq!(decoded.header.kid.as_deref(), Some("kid-1"));
    assert_eq!(
        decoded.claims["iss"],
        json!("importer@labtrack.iam.gserviceaccount.com")
    );
    assert_eq!(
        decoded.claims["scope"],
        json!("https://www.googleapis.com/auth/datastore")
    );
}

#[tokio::test]
async fn commit_sends_bearer_token_and_returns_commit_time() {
    let server = StubServer::start(|req| match req.path.as_str() {
        "/token" => (200, token_body("stub-token", 3600)),
        _ => commit_ok(),
    })
    .await;
    let store = connect(&server).await.expect("connect should succeed");

    let receipt = store
        .commit(&[user("abc123", "A")])
        .await
        .expect("commit should succeed");
    assert_eq!(receipt.writes, 1);
    assert_eq!(receipt.commit_time.as_deref(), Some(COMMIT_TIME));

    store
        .commit(&[user("def456", "B")])
        .await
        .expect("second commit should succeed");

    let commits = server.requests_to(COMMIT_PATH);
    assert_eq!(commits.len(), 2);
    assert_eq!(commits[0].method, "POST");
    assert_eq!(commits[0].header("authorization"), Some("Bearer stub-token"));

    let body: Value = serde_json::from_str(&commits[0].body).expect("commit body should be JSON");
    assert_eq!(
        body["writes"][0]["update"]["name"],
        json!("projects/labtrack/databases/(default)/documents/users/abc123")
    );
    assert_eq!(
        body["writes"][0]["update"]["fields"]["name"],
        json!({ "stringValue": "A" })
    );
    // a long-lived token is reused
    assert_eq!(server.requests_to("/token").len(), 1);
}

#[tokio::test]
async fn expiring_token_is_renewed_before_commit() {
    let issued = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&issued);
    let server = StubServer::start(move |req| match req.path.as_str() {
        "/token" => {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            (200, token_body(&format!("stub-token-{n}"), 30))
        }
        _ => commit_ok(),
    })
    .await;
    let store = connect(&server).await.expect("connect should succeed");

    store
        .commit(&[user("a", "A")])
        .await
        .expect("first commit should succeed");
    store
        .commit(&[user("b", "B")])
        .await
        .expect("second commit should succeed");

    assert_eq!(issued.load(Ordering::SeqCst), 3);
    let commits = server.requests_to(COMMIT_PATH);
    assert_eq!(commits[0].header("authorization"), Some("Bearer stub-token-2"));
    assert_eq!(commits[1].header("authorization"), Some("Bearer stub-token-3"));
}

#[tokio::test]
async fn rejected_chunk_is_recorded_while_others_commit() {
    let server = StubServer::start(|req| match req.path.as_str() {
        "/token" => (200, token_body("stub-token", 3600)),
        _ if req.body.contains("/users/denied") => permission_denied(),
        _ => commit_ok(),
    })
    .await;

    let mut data = NamedTempFile::new().expect("temp file should be created");
    data.write_all(br#"{"users":[{"sid":"first"},{"sid":"denied"},{"sid":"last"}]}"#)
        .expect("temp file should be writable");
    let config = ImportConfig {
        data_path: data.path().to_path_buf(),
        batch_limit: 1,
        endpoint: server.base.clone(),
        project_id: Some("other-project".to_string()),
        ..ImportConfig::default()
    };
    let store = FirestoreStore::connect(&key_for(&server), config.firestore_options())
        .await
        .expect("connect should succeed");

    let report = Importer::new(&config, &store)
        .run()
        .await
        .expect("chunk failures should be reported, not returned");

    assert_eq!(report.chunks.len(), 3);
    assert!(!report.is_complete());
    assert_eq!(report.imported(), 2);
    assert_eq!(report.failed(), 1);

    match &report.chunks[1].result {
        Err(ImportError::Commit(msg)) => assert_eq!(
            msg,
            "HTTP 403 PERMISSION_DENIED: Missing or insufficient permissions."
        ),
        other => panic!("expected a commit error, got {other:?}"),
    }
    for index in [0, 2] {
        let receipt = report.chunks[index]
            .result
            .as_ref()
            .expect("other chunks should commit");
        assert_eq!(receipt.commit_time.as_deref(), Some(COMMIT_TIME));
    }

    let commits =
        server.requests_to("/projects/other-project/databases/(default)/documents:commit");
    assert_eq!(commits.len(), 3);
}
