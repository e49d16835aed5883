//! Low-level Microsoft Graph HTTP client: request building, auth header
//! injection, and the shared retry policy.
//!
//! Retry policy (grounded in the worker's original `graph_client.py`):
//! on `{429, 500, 502, 503, 504}` or a connect/timeout error, retry up to
//! 3 total attempts; sleep for the numeric `Retry-After` header value in
//! seconds if present, else `attempt * 2` seconds. Any other non-2xx
//! response is returned immediately as a [`crate::GraphError`] carrying
//! the status code, so callers (e.g. the delta poller) can react to a
//! `410 Gone` without retrying it.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Method, Response, StatusCode};
use serde_json::Value;
use tracing::{debug, warn};

use crate::auth::TokenCache;
use crate::GraphError;

const GRAPH_BASE_URL: &str = "https://graph.microsoft.com/v1.0";
const MAX_ATTEMPTS: u32 = 3;
const RETRYABLE_STATUSES: &[u16] = &[429, 500, 502, 503, 504];

pub struct GraphClient {
    http: reqwest::Client,
    tokens: Arc<TokenCache>,
    base_url: String,
}

impl GraphClient {
    pub fn new(tokens: Arc<TokenCache>) -> Self {
        Self {
            http: reqwest::Client::new(),
            tokens,
            base_url: GRAPH_BASE_URL.to_string(),
        }
    }

    /// Override the base URL; used by tests to point at a `wiremock`
    /// server instead of the real Graph API.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}{}", self.base_url, path)
        }
    }

    /// Performs one logical request with the shared retry policy and
    /// returns the parsed JSON body. `path` may be a relative API path or
    /// an absolute URL (e.g. an `@odata.nextLink`).
    pub async fn request_json(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value, GraphError> {
        let response = self.request_with_retry(method, path, body).await?;
        response.json::<Value>().await.map_err(GraphError::NetworkError)
    }

    /// Performs a request returning the raw response, still subject to the
    /// shared retry policy; used by callers that need headers or raw
    /// bytes rather than a parsed JSON body.
    pub async fn request_with_retry(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Response, GraphError> {
        let url = self.url(path);
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            let token = self
                .tokens
                .access_token()
                .await
                .map_err(|e| GraphError::Unauthorized(e.to_string()))?;

            let mut builder = self.http.request(method.clone(), &url).bearer_auth(token);
            if let Some(ref b) = body {
                builder = builder.json(b);
            }

            let result = builder.send().await;

            let response = match result {
                Ok(resp) => resp,
                Err(err) if attempt < MAX_ATTEMPTS && (err.is_connect() || err.is_timeout()) => {
                    let delay = Duration::from_secs((attempt * 2) as u64);
                    warn!(attempt, error = %err, "transport error, retrying after {:?}", delay);
                    tokio::time::sleep(delay).await;
                    continue;
                }
                Err(err) => return Err(GraphError::NetworkError(err)),
            };

            let status = response.status();
            if status.is_success() {
                return Ok(response);
            }

            if status == StatusCode::GONE {
                return Err(GraphError::DeltaExpired);
            }

            if RETRYABLE_STATUSES.contains(&status.as_u16()) && attempt < MAX_ATTEMPTS {
                let delay = retry_delay(&response, attempt);
                warn!(attempt, %status, "retryable Graph response, retrying after {:?}", delay);
                tokio::time::sleep(delay).await;
                continue;
            }

            return Err(classify_error(status, response).await);
        }
    }
}

fn retry_delay(response: &Response, attempt: u32) -> Duration {
    response
        .headers()
        .get("Retry-After")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or_else(|| Duration::from_secs((attempt * 2) as u64))
}

async fn classify_error(status: StatusCode, response: Response) -> GraphError {
    let body = response.text().await.unwrap_or_default();
    match status {
        StatusCode::UNAUTHORIZED => GraphError::Unauthorized(body),
        StatusCode::FORBIDDEN => GraphError::Forbidden(body),
        StatusCode::NOT_FOUND => GraphError::NotFound(body),
        StatusCode::TOO_MANY_REQUESTS => GraphError::TooManyRequests {
            retry_after: Duration::from_secs(30),
        },
        s if s.is_server_error() => GraphError::ServerError {
            status: s.as_u16(),
            body,
        },
        s => GraphError::ServerError {
            status: s.as_u16(),
            body,
        },
    }
}

/// `list_attachments` JSON-defense hardening: the upstream has been
/// observed to occasionally return a non-JSON or truncated body; retry up
/// to [`MAX_ATTEMPTS`] times with linear (`attempt * 2`s) backoff before
/// giving up.
pub async fn request_json_with_content_type_guard(
    client: &GraphClient,
    method: Method,
    path: &str,
) -> Result<Value, GraphError> {
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        let response = client.request_with_retry(method.clone(), path, None).await?;

        let content_type_ok = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.contains("application/json"))
            .unwrap_or(false);

        let bytes = response.bytes().await.map_err(GraphError::NetworkError)?;

        if content_type_ok {
            if let Ok(value) = serde_json::from_slice::<Value>(&bytes) {
                return Ok(value);
            }
        }

        if attempt >= MAX_ATTEMPTS {
            return Err(GraphError::InvalidResponse(
                "response was not valid JSON after retries".to_string(),
            ));
        }

        let delay = Duration::from_secs((attempt * 2) as u64);
        debug!(attempt, "list_attachments response wasn't JSON, retrying after {:?}", delay);
        tokio::time::sleep(delay).await;
    }
}
