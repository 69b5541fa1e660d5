//! Service-account authentication for the geospatial platform.
//!
//! Reads a JSON key file, signs an RS256 OAuth2 assertion, and exchanges it
//! for a short-lived bearer token. Tokens are cached until shortly before
//! expiry so sequential per-point queries reuse one grant.

use std::fs;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

// ---

const SCOPE: &str = "https://www.googleapis.com/auth/earthengine";

/// Contents of the service-account JSON key file.
#[derive(Debug, Deserialize)]
struct ServiceAccountKey {
    // ---
    client_email: String,
    private_key: String,
    token_uri: String,
}

#[derive(Debug, Serialize)]
struct Claims<'a> {
    // ---
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    // ---
    access_token: String,
    expires_in: i64,
}

struct CachedToken {
    // ---
    token: String,
    expires_at: DateTime<Utc>,
}

/// Token source backed by one service-account key.
pub struct Authenticator {
    // ---
    key: ServiceAccountKey,
    http: reqwest::Client,
    cached: Mutex<Option<CachedToken>>,
}

impl Authenticator {
    // ---
    /// Load the key file. A missing or malformed key is a startup failure and
    /// propagates rather than being retried.
    pub fn from_key_file(path: &str) -> Result<Self> {
        // ---
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read service-account key '{}'", path))?;
        let key: ServiceAccountKey = serde_json::from_str(&raw)
            .with_context(|| format!("malformed service-account key '{}'", path))?;

        Ok(Authenticator {
            key,
            http: reqwest::Client::new(),
            cached: Mutex::new(None),
        })
    }

    /// Return a valid bearer token, refreshing through the token endpoint
    /// when the cached one is absent or within a minute of expiry.
    pub async fn bearer_token(&self) -> Result<String> {
        // ---
        let mut cached = self.cached.lock().await;

        if let Some(tok) = cached.as_ref() {
            if tok.expires_at - Duration::seconds(60) > Utc::now() {
                return Ok(tok.token.clone());
            }
        }

        let now = Utc::now();
        let claims = Claims {
            iss: &self.key.client_email,
            scope: SCOPE,
            aud: &self.key.token_uri,
            iat: now.timestamp(),
            exp: (now + Duration::hours(1)).timestamp(),
        };

        let assertion = encode(
            &Header::new(Algorithm::RS256),
            &claims,
            &EncodingKey::from_rsa_pem(self.key.private_key.as_bytes())
                .context("service-account private key is not valid RSA PEM")?,
        )?;

        tracing::debug!("Requesting bearer token for {}", self.key.client_email);

        let resp: TokenResponse = self
            .http
            .post(&self.key.token_uri)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", assertion.as_str()),
            ])
            .send()
            .await?
            .error_for_status()
            .context("token endpoint rejected the assertion")?
            .json()
            .await?;

        let token = resp.access_token.clone();
        *cached = Some(CachedToken {
            token: resp.access_token,
            expires_at: now + Duration::seconds(resp.expires_in),
        });

        Ok(token)
    }
}
