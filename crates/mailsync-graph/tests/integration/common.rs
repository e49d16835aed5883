//! Shared test helpers for Graph API integration tests.
//!
//! Provides wiremock-based mock server setup for Microsoft Graph mail
//! endpoints and a `GraphClient` pointed at the mock server with a
//! pre-seeded token cache, so tests never hit the real token endpoint.

use std::sync::Arc;

use chrono::{Duration, Utc};
use mailsync_core::config::GraphCredential;
use mailsync_graph::auth::{CachedToken, TokenCache};
use mailsync_graph::client::GraphClient;
use wiremock::MockServer;

/// Starts a mock server and returns a `GraphClient` pointed at it, with a
/// token cache pre-seeded so no test ever calls the real token endpoint.
pub async fn setup_graph_mock() -> (MockServer, GraphClient) {
    let server = MockServer::start().await;
    let tokens = Arc::new(TokenCache::new(
        "tenant-id".into(),
        "client-id".into(),
        GraphCredential::ClientSecret("test-secret".into()),
    ));
    tokens
        .seed_for_test(CachedToken {
            access_token: "test-access-token".into(),
            expires_at: Utc::now() + Duration::hours(1),
        })
        .await;
    let client = GraphClient::new(tokens).with_base_url(server.uri());
    (server, client)
}
