//! Integration tests for subscription create/renew against a mocked Graph
//! API, verifying `parse_subscription_receipt` picks the right fields out
//! of the response envelope.

use mailsync_core::ports::IMailProvider;
use mailsync_graph::provider::GraphMailProvider;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common;

#[tokio::test]
async fn create_subscription_returns_receipt() {
    let (server, client) = common::setup_graph_mock().await;
    Mock::given(method("POST"))
        .and(path("/subscriptions"))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
            "id": "sub-123",
            "resource": "users/cases@example.com/mailFolders/Inbox/messages",
            "expirationDateTime": "2026-08-01T12:00:00Z",
        })))
        .mount(&server)
        .await;

    let provider = GraphMailProvider::new(client);
    let receipt = provider
        .create_subscription(
            "users/cases@example.com/mailFolders/Inbox/messages",
            "https://worker.example.com/graph/webhook",
            "shared-secret",
            "created,updated",
            60,
        )
        .await
        .expect("create_subscription failed");

    assert_eq!(receipt.subscription_id, "sub-123");
    assert_eq!(receipt.expires_at.to_rfc3339(), "2026-08-01T12:00:00+00:00");
}

#[tokio::test]
async fn renew_subscription_returns_updated_receipt() {
    let (server, client) = common::setup_graph_mock().await;
    Mock::given(method("PATCH"))
        .and(path("/subscriptions/sub-123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "sub-123",
            "expirationDateTime": "2026-08-01T15:00:00Z",
        })))
        .mount(&server)
        .await;

    let provider = GraphMailProvider::new(client);
    let receipt = provider
        .renew_subscription("sub-123", 60)
        .await
        .expect("renew_subscription failed");

    assert_eq!(receipt.subscription_id, "sub-123");
    assert_eq!(receipt.expires_at.to_rfc3339(), "2026-08-01T15:00:00+00:00");
}

#[tokio::test]
async fn create_subscription_propagates_upstream_rejection() {
    let (server, client) = common::setup_graph_mock().await;
    Mock::given(method("POST"))
        .and(path("/subscriptions"))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "error": {"code": "InvalidRequest", "message": "notificationUrl is not reachable"}
        })))
        .mount(&server)
        .await;

    let provider = GraphMailProvider::new(client);
    let result = provider
        .create_subscription(
            "users/cases@example.com/mailFolders/Inbox/messages",
            "https://unreachable.example.com/graph/webhook",
            "shared-secret",
            "created,updated",
            60,
        )
        .await;

    assert!(result.is_err());
}
