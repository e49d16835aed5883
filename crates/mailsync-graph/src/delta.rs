//! Delta-page parsing helpers.
//!
//! The Graph delta API returns a `value[]` array plus at most one of
//! `@odata.nextLink` (more pages remain) or `@odata.deltaLink` (caught up,
//! use this as the resume cursor next time). Deleted items are marked with
//! an `@removed` sentinel and are skipped here rather than surfaced to the
//! ingestion pipeline, which has no delete path.

use mailsync_core::ports::DeltaPage;
use serde_json::Value;

const NEXT_LINK_KEY: &str = "@odata.nextLink";
const DELTA_LINK_KEY: &str = "@odata.deltaLink";

/// Builds the initial delta request path for a folder, honoring the
/// worker's configured page size via `$top`; `Prefer: odata.maxpagesize`
/// is set by the caller alongside this path.
pub fn initial_delta_path(mailbox_email: &str, folder_id: &str, page_size: u32) -> String {
    format!(
        "/users/{mailbox_email}/mailFolders/{folder_id}/messages/delta?$select=id&$top={page_size}"
    )
}

/// Parses a raw delta response body into a [`DeltaPage`], filtering out
/// `@removed` sentinel entries.
pub fn parse_delta_page(body: &Value) -> DeltaPage {
    let message_ids = body
        .get("value")
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter(|item| item.get("@removed").is_none())
                .filter_map(|item| item.get("id").and_then(|v| v.as_str()).map(str::to_string))
                .collect()
        })
        .unwrap_or_default();

    DeltaPage {
        message_ids,
        next_link: body
            .get(NEXT_LINK_KEY)
            .and_then(|v| v.as_str())
            .map(str::to_string),
        delta_link: body
            .get(DELTA_LINK_KEY)
            .and_then(|v| v.as_str())
            .map(str::to_string),
    }
}
