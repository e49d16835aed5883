//! Integration tests for delta (incremental sync) message queries against
//! a wiremock-based Graph API mock server.

use mailsync_core::ports::IMailProvider;
use mailsync_graph::provider::GraphMailProvider;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common;

#[tokio::test]
async fn initial_delta_returns_message_ids_and_delta_link() {
    let (server, client) = common::setup_graph_mock().await;
    mount_delta(
        &server,
        "/users/cases@example.com/mailFolders/Inbox/messages/delta",
        serde_json::json!({
            "value": [{"id": "m1"}, {"id": "m2"}],
            "@odata.deltaLink": format!("{}/delta?token=abc", server.uri()),
        }),
    )
    .await;

    let provider = GraphMailProvider::new(client);
    let page = provider
        .messages_delta_page("cases@example.com", "INBOX", None, 50)
        .await
        .expect("delta page fetch failed");

    assert_eq!(page.message_ids, vec!["m1", "m2"]);
    assert!(page.next_link.is_none());
    assert!(page.delta_link.is_some());
}

#[tokio::test]
async fn delta_resume_honors_next_link() {
    let (server, client) = common::setup_graph_mock().await;
    mount_delta(
        &server,
        "/resume",
        serde_json::json!({
            "value": [{"id": "m3"}],
            "@odata.nextLink": format!("{}/resume-2", server.uri()),
        }),
    )
    .await;

    let provider = GraphMailProvider::new(client);
    let resume_url = format!("{}/resume", server.uri());
    let page = provider
        .messages_delta_page("cases@example.com", "INBOX", Some(&resume_url), 50)
        .await
        .expect("delta resume failed");

    assert_eq!(page.message_ids, vec!["m3"]);
    assert!(page.next_link.is_some());
    assert!(page.delta_link.is_none());
}

#[tokio::test]
async fn delta_skips_removed_entries() {
    let (server, client) = common::setup_graph_mock().await;
    mount_delta(
        &server,
        "/users/cases@example.com/mailFolders/Inbox/messages/delta",
        serde_json::json!({
            "value": [
                {"id": "m1"},
                {"id": "m2", "@removed": {"reason": "deleted"}},
            ],
            "@odata.deltaLink": format!("{}/delta?token=abc", server.uri()),
        }),
    )
    .await;

    let provider = GraphMailProvider::new(client);
    let page = provider
        .messages_delta_page("cases@example.com", "INBOX", None, 50)
        .await
        .expect("delta page fetch failed");

    assert_eq!(page.message_ids, vec!["m1"]);
}

#[tokio::test]
async fn delta_410_gone_is_surfaced_as_delta_expired() {
    let (server, client) = common::setup_graph_mock().await;
    Mock::given(method("GET"))
        .and(path("/users/cases@example.com/mailFolders/Inbox/messages/delta"))
        .respond_with(ResponseTemplate::new(410))
        .mount(&server)
        .await;

    let provider = GraphMailProvider::new(client);
    let result = provider
        .messages_delta_page("cases@example.com", "INBOX", None, 50)
        .await;

    assert!(result.is_err());
}

async fn mount_delta(server: &MockServer, route: &str, body: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}
