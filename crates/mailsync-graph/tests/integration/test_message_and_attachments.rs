//! Integration tests for message fetch and attachment listing, including
//! the JSON-defense retry hardening `list_attachments` needs against a
//! provider that occasionally returns a truncated or non-JSON body.

use mailsync_core::ports::IMailProvider;
use mailsync_graph::provider::GraphMailProvider;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common;

#[tokio::test]
async fn get_message_returns_projected_fields() {
    let (server, client) = common::setup_graph_mock().await;
    Mock::given(method("GET"))
        .and(path("/users/cases@example.com/messages/m1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "m1",
            "subject": "Need help",
            "conversationId": "conv-1",
            "hasAttachments": true,
        })))
        .mount(&server)
        .await;

    let provider = GraphMailProvider::new(client);
    let message = provider
        .get_message("cases@example.com", "m1")
        .await
        .expect("get_message failed");

    assert_eq!(message["subject"], "Need help");
    assert_eq!(message["hasAttachments"], true);
}

#[tokio::test]
async fn list_attachments_parses_inline_content_bytes() {
    let (server, client) = common::setup_graph_mock().await;
    Mock::given(method("GET"))
        .and(path("/users/cases@example.com/messages/m1/attachments"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "application/json")
                .set_body_json(serde_json::json!({
                    "value": [{
                        "id": "att-1",
                        "name": "invoice.pdf",
                        "contentType": "application/pdf",
                        "size": 1234,
                        "contentBytes": "SGVsbG8=",
                    }]
                })),
        )
        .mount(&server)
        .await;

    let provider = GraphMailProvider::new(client);
    let attachments = provider
        .list_attachments("cases@example.com", "m1")
        .await
        .expect("list_attachments failed");

    assert_eq!(attachments.len(), 1);
    assert_eq!(attachments[0].name, "invoice.pdf");
    assert_eq!(attachments[0].content_type.as_deref(), Some("application/pdf"));
    assert!(attachments[0].content_bytes_b64.is_some());
}

#[tokio::test]
async fn list_attachments_retries_on_wrong_content_type_then_succeeds() {
    let (server, client) = common::setup_graph_mock().await;

    // First response: wrong content-type, defended against by a retry.
    Mock::given(method("GET"))
        .and(path("/users/cases@example.com/messages/m1/attachments"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/html")
                .set_body_string("<html>upstream hiccup</html>"),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/users/cases@example.com/messages/m1/attachments"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "application/json")
                .set_body_json(serde_json::json!({ "value": [] })),
        )
        .mount(&server)
        .await;

    let provider = GraphMailProvider::new(client);
    let attachments = provider
        .list_attachments("cases@example.com", "m1")
        .await
        .expect("list_attachments should recover after retrying");

    assert!(attachments.is_empty());
}

#[tokio::test]
async fn get_attachment_bytes_decodes_base64_payload() {
    let (server, client) = common::setup_graph_mock().await;
    Mock::given(method("GET"))
        .and(path("/users/cases@example.com/messages/m1/attachments/att-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "att-1",
            "contentBytes": "SGVsbG8sIHdvcmxkIQ==",
        })))
        .mount(&server)
        .await;

    let provider = GraphMailProvider::new(client);
    let bytes = provider
        .get_attachment_bytes("cases@example.com", "m1", "att-1")
        .await
        .expect("get_attachment_bytes failed");

    assert_eq!(bytes, b"Hello, world!");
}
