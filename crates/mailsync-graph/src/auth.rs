//! OAuth2 client-credentials authentication for Microsoft Graph.
//!
//! Two credential shapes are supported, certificate preferred when both
//! are configured: a shared client secret, or a private key + certificate
//! thumbprint used to sign a JWT client assertion
//! (`urn:ietf:params:oauth:client-assertion-type:jwt-bearer`). A single
//! cache entry is kept in memory, refreshed when within 60 seconds of
//! expiry; concurrent callers serialize through a single-flight mutex so
//! only one refresh request is ever in flight.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use mailsync_core::config::GraphCredential;

const DEFAULT_SCOPE_SUFFIX: &str = ".default";
const GRAPH_RESOURCE: &str = "https://graph.microsoft.com";
const TOKEN_EXPIRY_SKEW: i64 = 60;

/// A cached access token and its expiry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedToken {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
}

impl CachedToken {
    fn needs_refresh(&self) -> bool {
        Utc::now() + Duration::seconds(TOKEN_EXPIRY_SKEW) >= self.expires_at
    }
}

/// Single-entry, single-flight OAuth2 client-credentials token cache.
pub struct TokenCache {
    tenant_id: String,
    client_id: String,
    credential: GraphCredential,
    http: reqwest::Client,
    cached: Mutex<Option<CachedToken>>,
}

impl TokenCache {
    pub fn new(tenant_id: String, client_id: String, credential: GraphCredential) -> Self {
        Self {
            tenant_id,
            client_id,
            credential,
            http: reqwest::Client::new(),
            cached: Mutex::new(None),
        }
    }

    fn token_url(&self) -> String {
        format!(
            "https://login.microsoftonline.com/{}/oauth2/v2.0/token",
            self.tenant_id
        )
    }

    fn scope(&self) -> String {
        format!("{GRAPH_RESOURCE}/{DEFAULT_SCOPE_SUFFIX}")
    }

    /// Returns a valid access token, refreshing it first if absent or
    /// within 60 seconds of expiry.
    pub async fn access_token(self: &Arc<Self>) -> Result<String> {
        let mut guard = self.cached.lock().await;
        if let Some(token) = guard.as_ref() {
            if !token.needs_refresh() {
                return Ok(token.access_token.clone());
            }
        }
        let fresh = self.request_token().await?;
        let access_token = fresh.access_token.clone();
        *guard = Some(fresh);
        Ok(access_token)
    }

    /// Seeds the cache directly, bypassing the token endpoint. Used by
    /// integration tests that mock only the Graph API and not the
    /// Microsoft identity platform's token endpoint.
    pub async fn seed_for_test(&self, token: CachedToken) {
        *self.cached.lock().await = Some(token);
    }

    async fn request_token(&self) -> Result<CachedToken> {
        let mut form: Vec<(&str, String)> = vec![
            ("grant_type", "client_credentials".to_string()),
            ("client_id", self.client_id.clone()),
            ("scope", self.scope()),
        ];

        match &self.credential {
            GraphCredential::ClientSecret(secret) => {
                form.push(("client_secret", secret.clone()));
            }
            GraphCredential::Certificate {
                private_key_path,
                thumbprint,
            } => {
                let assertion = build_client_assertion(
                    &self.client_id,
                    &self.token_url(),
                    private_key_path,
                    thumbprint,
                )?;
                form.push((
                    "client_assertion_type",
                    "urn:ietf:params:oauth:client-assertion-type:jwt-bearer".to_string(),
                ));
                form.push(("client_assertion", assertion));
            }
        }

        info!("requesting Graph access token via client-credentials grant");
        let response = self
            .http
            .post(self.token_url())
            .form(&form)
            .send()
            .await
            .context("token request failed")?;

        let status = response.status();
        let body: serde_json::Value = response
            .json()
            .await
            .context("token response was not valid JSON")?;

        if !status.is_success() {
            let description = body
                .get("error_description")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown error");
            bail!("token endpoint rejected request ({status}): {description}");
        }

        let access_token = body
            .get("access_token")
            .and_then(|v| v.as_str())
            .context("token response missing access_token")?
            .to_string();
        let expires_in = body
            .get("expires_in")
            .and_then(|v| v.as_i64())
            .unwrap_or(3600);

        debug!(expires_in, "obtained fresh Graph access token");
        Ok(CachedToken {
            access_token,
            expires_at: Utc::now() + Duration::seconds(expires_in),
        })
    }
}

/// Claims for the JWT client assertion used in certificate-based
/// client-credentials auth.
#[derive(Serialize)]
struct AssertionClaims {
    sub: String,
    iss: String,
    jti: String,
    aud: String,
    iat: i64,
    exp: i64,
}

fn build_client_assertion(
    client_id: &str,
    audience: &str,
    private_key_path: &str,
    thumbprint: &str,
) -> Result<String> {
    let key_pem = std::fs::read(private_key_path)
        .with_context(|| format!("failed to read private key at {private_key_path}"))?;
    let encoding_key = EncodingKey::from_rsa_pem(&key_pem)
        .context("private key is not a valid RSA PEM key")?;

    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .context("system clock before epoch")?
        .as_secs() as i64;

    let claims = AssertionClaims {
        sub: client_id.to_string(),
        iss: client_id.to_string(),
        jti: Uuid::new_v4().to_string(),
        aud: audience.to_string(),
        iat: now,
        exp: now + 600,
    };

    let mut header = Header::new(Algorithm::RS256);
    header.x5t = Some(thumbprint.to_lowercase());

    jsonwebtoken::encode(&header, &claims, &encoding_key).context("failed to sign client assertion")
}
