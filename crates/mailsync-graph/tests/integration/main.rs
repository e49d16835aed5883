//! Integration tests for mailsync-graph
//!
//! Uses wiremock to simulate the Microsoft Graph API and verifies the
//! end-to-end behavior of `GraphMailProvider`: message fetch, attachment
//! listing with JSON-defense retries, delta pagination, and subscription
//! create/renew.

mod common;

mod test_delta;
mod test_message_and_attachments;
mod test_subscriptions;
