//! OAuth access tokens for the analytics API.
//!
//! A service-account key signs a short-lived RS256 assertion which the token
//! endpoint exchanges for a bearer token. Tokens are cached until shortly
//! before they expire.

use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Context};
use base64::Engine;
use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};
use trendpost_core::config::AnalyticsCredentials;

pub const ANALYTICS_READONLY_SCOPE: &str = "https://www.googleapis.com/auth/analytics.readonly";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;
const REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// The fields of a service-account JSON key that signing needs.
#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default)]
    pub private_key_id: Option<String>,
    #[serde(default)]
    pub token_uri: Option<String>,
}

impl std::fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .field("private_key_id", &self.private_key_id)
            .finish_non_exhaustive()
    }
}

impl ServiceAccountKey {
    pub fn from_json(raw: &str) -> anyhow::Result<Self> {
        serde_json::from_str(raw).context("invalid service-account JSON")
    }

    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("credentials file not found: {path}"))?;
        Self::from_json(&raw)
    }

    pub fn from_base64(encoded: &str) -> anyhow::Result<Self> {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded.trim())
            .context("service-account key is not valid base64")?;
        let raw = String::from_utf8(bytes).context("service-account key is not UTF-8")?;
        Self::from_json(&raw)
    }
}

#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Debug)]
struct CachedToken {
    value: String,
    expires_at: Instant,
}

#[derive(Debug)]
enum Source {
    Static(String),
    ServiceAccount {
        key: ServiceAccountKey,
        token_uri: String,
        cache: Mutex<Option<CachedToken>>,
    },
}

#[derive(Debug)]
pub struct TokenProvider {
    source: Source,
}

impl TokenProvider {
    /// A fixed token, e.g. one minted by `gcloud auth print-access-token`.
    pub fn fixed(token: impl Into<String>) -> Self {
        Self {
            source: Source::Static(token.into()),
        }
    }

    pub fn service_account(key: ServiceAccountKey, token_uri: Option<String>) -> Self {
        let token_uri = token_uri
            .or_else(|| key.token_uri.clone())
            .unwrap_or_else(|| DEFAULT_TOKEN_URI.to_string());
        Self {
            source: Source::ServiceAccount {
                key,
                token_uri,
                cache: Mutex::new(None),
            },
        }
    }

    pub fn from_credentials(
        credentials: &AnalyticsCredentials,
        token_uri: Option<String>,
    ) -> anyhow::Result<Self> {
        match credentials {
            AnalyticsCredentials::AccessToken(token) => Ok(Self::fixed(token.clone())),
            AnalyticsCredentials::ServiceAccountFile(path) => {
                let key = ServiceAccountKey::from_file(path)?;
                info!(client_email = %key.client_email, path = %path, "loaded service-account key");
                Ok(Self::service_account(key, token_uri))
            }
            AnalyticsCredentials::ServiceAccountBase64(encoded) => {
                let key = ServiceAccountKey::from_base64(encoded)?;
                info!(client_email = %key.client_email, "loaded service-account key from environment");
                Ok(Self::service_account(key, token_uri))
            }
        }
    }

    /// Returns a bearer token, exchanging a fresh assertion when the cached
    /// one is missing or about to expire.
    pub async fn access_token(&self, http: &reqwest::Client) -> anyhow::Result<String> {
        let (key, token_uri, cache) = match &self.source {
            Source::Static(token) => return Ok(token.clone()),
            Source::ServiceAccount {
                key,
                token_uri,
                cache,
            } => (key, token_uri, cache),
        };

        let mut cached = cache.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.expires_at > Instant::now() + REFRESH_MARGIN {
                return Ok(token.value.clone());
            }
        }

        let assertion = sign_assertion(key, token_uri)?;
        let body = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("grant_type", JWT_BEARER_GRANT)
            .append_pair("assertion", &assertion)
            .finish();
        let response = http
            .post(token_uri)
            .header(
                reqwest::header::CONTENT_TYPE,
                "application/x-www-form-urlencoded",
            )
            .body(body)
            .send()
            .await
            .context("token request failed")?;
        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            bail!("token endpoint returned {status}: {text}");
        }
        let token: TokenResponse = response
            .json()
            .await
            .context("invalid token endpoint response")?;
        if token.access_token.is_empty() {
            return Err(anyhow!("token endpoint returned an empty access token"));
        }

        let lifetime = Duration::from_secs(token.expires_in.unwrap_or(3600));
        debug!(expires_in_secs = lifetime.as_secs(), "obtained analytics access token");
        *cached = Some(CachedToken {
            value: token.access_token.clone(),
            expires_at: Instant::now() + lifetime,
        });
        Ok(token.access_token)
    }
}

fn sign_assertion(key: &ServiceAccountKey, token_uri: &str) -> anyhow::Result<String> {
    let now = Utc::now().timestamp();
    let claims = AssertionClaims {
        iss: &key.client_email,
        scope: ANALYTICS_READONLY_SCOPE,
        aud: token_uri,
        iat: now,
        exp: now + ASSERTION_LIFETIME_SECS,
    };
    let mut header = Header::new(Algorithm::RS256);
    header.kid = key.private_key_id.clone();
    let signing_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
        .context("service-account private key is not a valid RSA PEM")?;
    encode(&header, &claims, &signing_key).context("failed to sign token assertion")
}
