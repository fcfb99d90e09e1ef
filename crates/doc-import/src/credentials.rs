//! Service account key loading.
//!
//! The key file is the JSON document the cloud console hands out for a
//! service account. Only the fields needed to mint an OAuth2 assertion are
//! read; everything else in the file is ignored.

use crate::error::{ImportError, ImportResult};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Lifetime requested for the signed assertion, in seconds.
const ASSERTION_TTL_SECS: u64 = 3600;

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    #[serde(rename = "type")]
    pub key_type: String,
    pub project_id: String,
    #[serde(default)]
    pub private_key_id: Option<String>,
    pub private_key: String,
    pub client_email: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: u64,
    exp: u64,
}

impl ServiceAccountKey {
    /// Read and validate a key file.
    pub fn from_file(path: &Path) -> ImportResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ImportError::Credentials {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::from_json(&content, path)
    }

    /// Parse and validate key JSON. `origin` is only used in error messages.
    pub fn from_json(content: &str, origin: &Path) -> ImportResult<Self> {
        let key: ServiceAccountKey =
            serde_json::from_str(content).map_err(|e| ImportError::Credentials {
                path: origin.to_path_buf(),
                reason: e.to_string(),
            })?;
        key.validate(origin)?;
        Ok(key)
    }

    fn validate(&self, origin: &Path) -> ImportResult<()> {
        let invalid = |reason: String| ImportError::Credentials {
            path: PathBuf::from(origin),
            reason,
        };
        if self.key_type != "service_account" {
            return Err(invalid(format!(
                "expected type \"service_account\", found \"{}\"",
                self.key_type
            )));
        }
        for (name, value) in [
            ("project_id", &self.project_id),
            ("client_email", &self.client_email),
            ("private_key", &self.private_key),
            ("token_uri", &self.token_uri),
        ] {
            if value.trim().is_empty() {
                return Err(invalid(format!("{name} is empty")));
            }
        }
        Ok(())
    }

    /// Build an RS256-signed JWT bearer assertion for the token endpoint.
    pub fn signed_assertion(&self, scope: &str, issued_at: u64) -> ImportResult<String> {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = self.private_key_id.clone();

        let claims = AssertionClaims {
            iss: &self.client_email,
            scope,
            aud: &self.token_uri,
            iat: issued_at,
            exp: issued_at + ASSERTION_TTL_SECS,
        };
        let key = EncodingKey::from_rsa_pem(self.private_key.as_bytes())
            .map_err(|e| ImportError::Auth(format!("unusable private key: {e}")))?;
        jsonwebtoken::encode(&header, &claims, &key)
            .map_err(|e| ImportError::Auth(format!("failed to sign assertion: {e}")))
    }
}
