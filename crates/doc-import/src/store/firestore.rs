//! Firestore over its REST API.
//!
//! Authenticates with a service account (JWT bearer grant) and writes through
//! `documents:commit`. An `update` write without an update mask replaces the
//! whole document, which gives `set` semantics.

use super::{CommitReceipt, DocumentStore};
use crate::credentials::ServiceAccountKey;
use crate::document::ImportDocument;
use crate::error::{ImportError, ImportResult};
use crate::values::DocumentId;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info};

pub const DEFAULT_ENDPOINT: &str = "https://firestore.googleapis.com/v1";
pub const DEFAULT_DATABASE: &str = "(default)";
pub const DATASTORE_SCOPE: &str = "https://www.googleapis.com/auth/datastore";

/// Maximum number of writes Firestore accepts in one commit.
pub const MAX_WRITES_PER_COMMIT: usize = 500;

const AUTO_ID_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
const AUTO_ID_LEN: usize = 20;

/// A token this close to expiry is replaced before the next commit.
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// Largest integer a double holds exactly (2^53 - 1).
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

#[derive(Debug, Clone)]
pub struct FirestoreOptions {
    pub endpoint: String,
    /// Overrides the project named in the key file.
    pub project_id: Option<String>,
    pub database: String,
    pub request_timeout: Duration,
}

impl Default for FirestoreOptions {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            project_id: None,
            database: DEFAULT_DATABASE.to_string(),
            request_timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Debug, Serialize)]
struct CommitRequest {
    writes: Vec<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommitResponse {
    #[serde(default)]
    commit_time: Option<String>,
    #[serde(default)]
    write_results: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    status: Option<String>,
    message: String,
}

#[derive(Debug, Clone)]
struct AccessToken {
    value: String,
    /// `None` when the token endpoint did not say.
    expires_at: Option<Instant>,
}

impl AccessToken {
    fn is_fresh(&self, now: Instant) -> bool {
        match self.expires_at {
            Some(expires_at) => now + TOKEN_REFRESH_MARGIN < expires_at,
            None => true,
        }
    }
}

pub struct FirestoreStore {
    http: reqwest::Client,
    key: ServiceAccountKey,
    endpoint: String,
    project_id: String,
    database: String,
    token: Mutex<AccessToken>,
}

impl FirestoreStore {
    /// Build an authenticated client. Exchanges a signed assertion for an
    /// access token up front so credential problems surface before any file
    /// is read. The token is renewed before a commit once it nears expiry.
    pub async fn connect(key: &ServiceAccountKey, options: FirestoreOptions) -> ImportResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(options.request_timeout)
            .build()
            .map_err(|e| ImportError::Auth(format!("failed to build HTTP client: {e}")))?;

        let token = fetch_access_token(&http, key).await?;
        let project_id = options
            .project_id
            .unwrap_or_else(|| key.project_id.clone());
        info!(project = %project_id, database = %options.database, "Connected to Firestore");

        Ok(Self {
            http,
            key: key.clone(),
            endpoint: options.endpoint.trim_end_matches('/').to_string(),
            project_id,
            database: options.database,
            token: Mutex::new(token),
        })
    }

    /// The current bearer token, fetching a new one if it is about to lapse.
    async fn bearer_token(&self) -> ImportResult<String> {
        let mut token = self.token.lock().await;
        if !token.is_fresh(Instant::now()) {
            info!("Access token is about to expire; requesting a new one");
            *token = fetch_access_token(&self.http, &self.key).await?;
        }
        Ok(token.value.clone())
    }

    fn documents_root(&self) -> String {
        documents_root(&self.project_id, &self.database)
    }

    fn commit_url(&self) -> String {
        format!("{}/{}:commit", self.endpoint, self.documents_root())
    }
}

async fn fetch_access_token(
    http: &reqwest::Client,
    key: &ServiceAccountKey,
) -> ImportResult<AccessToken> {
    let issued_at = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    let assertion = key.signed_assertion(DATASTORE_SCOPE, issued_at)?;

    let resp = http
        .post(&key.token_uri)
        .form(&[
            ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
            ("assertion", assertion.as_str()),
        ])
        .send()
        .await
        .map_err(|e| ImportError::Auth(format!("token request failed: {e}")))?;

    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(ImportError::Auth(format!("token endpoint returned {status}: {body}")));
    }

    let token: TokenResponse = resp
        .json()
        .await
        .map_err(|e| ImportError::Auth(format!("malformed token response: {e}")))?;
    debug!(expires_in = ?token.expires_in, "Obtained access token");
    Ok(AccessToken {
        value: token.access_token,
        expires_at: token
            .expires_in
            .map(|secs| Instant::now() + Duration::from_secs(secs)),
    })
}

#[async_trait::async_trait]
impl DocumentStore for FirestoreStore {
    fn generate_id(&self, collection: &str) -> DocumentId {
        DocumentId::new(collection, auto_id())
    }

    async fn commit(&self, writes: &[ImportDocument]) -> ImportResult<CommitReceipt> {
        let body = commit_request(&self.documents_root(), writes);
        let token = self.bearer_token().await?;

        let resp = self
            .http
            .post(self.commit_url())
            .bearer_auth(&token)
            .json(&body)
            .send()
            .await
            .map_err(|e| ImportError::Commit(format!("request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(ImportError::Commit(describe_error(status.as_u16(), &text)));
        }

        let parsed: CommitResponse = resp
            .json()
            .await
            .map_err(|e| ImportError::Commit(format!("malformed commit response: {e}")))?;
        debug!(
            write_results = parsed.write_results.len(),
            commit_time = ?parsed.commit_time,
            "Commit acknowledged"
        );
        Ok(CommitReceipt {
            writes: writes.len(),
            commit_time: parsed.commit_time,
        })
    }
}

fn documents_root(project_id: &str, database: &str) -> String {
    format!("projects/{project_id}/databases/{database}/documents")
}

/// A 20-character alphanumeric id, the same shape Firestore's own clients
/// generate.
pub fn auto_id() -> String {
    let mut rng = rand::rng();
    (0..AUTO_ID_LEN)
        .map(|_| AUTO_ID_ALPHABET[rng.random_range(0..AUTO_ID_ALPHABET.len())] as char)
        .collect()
}

fn commit_request(documents_root: &str, writes: &[ImportDocument]) -> CommitRequest {
    let writes = writes
        .iter()
        .map(|doc| {
            let fields: Map<String, Value> = doc
                .fields()
                .iter()
                .map(|(k, v)| (k.clone(), encode_value(v)))
                .collect();
            json!({
                "update": {
                    "name": format!(
                        "{documents_root}/{}/{}",
                        doc.id().collection(),
                        doc.id().id()
                    ),
                    "fields": fields,
                }
            })
        })
        .collect();
    CommitRequest { writes }
}

/// Encode a JSON value as a Firestore typed value.
///
/// Integers that fit in i64 become `integerValue` (string-encoded, as the
/// REST API requires), and so do floats like `1.0` that hold a safe
/// integer. Every other number becomes `doubleValue`.
pub fn encode_value(value: &Value) -> Value {
    match value {
        Value::Null => json!({ "nullValue": null }),
        Value::Bool(b) => json!({ "booleanValue": b }),
        Value::Number(n) => match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => json!({ "integerValue": i.to_string() }),
            (None, Some(f)) if is_safe_integer(f) => {
                json!({ "integerValue": (f as i64).to_string() })
            }
            (None, f) => json!({ "doubleValue": f.unwrap_or(f64::NAN) }),
        },
        Value::String(s) => json!({ "stringValue": s }),
        Value::Array(items) => {
            let values: Vec<Value> = items.iter().map(encode_value).collect();
            json!({ "arrayValue": { "values": values } })
        }
        Value::Object(obj) => {
            let fields: Map<String, Value> = obj
                .iter()
                .map(|(k, v)| (k.clone(), encode_value(v)))
                .collect();
            json!({ "mapValue": { "fields": fields } })
        }
    }
}

fn is_safe_integer(f: f64) -> bool {
    f.fract() == 0.0 && f.abs() <= MAX_SAFE_INTEGER && !(f == 0.0 && f.is_sign_negative())
}

fn describe_error(status: u16, body: &str) -> String {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(env) => match env.error.status {
            Some(code) => format!("HTTP {status} {code}: {}", env.error.message),
            None => format!("HTTP {status}: {}", env.error.message),
        },
        Err(_) if body.trim().is_empty() => format!("HTTP {status}"),
        Err(_) => format!("HTTP {status}: {}", body.trim()),
    }
}
