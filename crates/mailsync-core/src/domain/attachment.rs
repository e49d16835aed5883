//! Attachment entity and filename sanitization rules for the
//! content-addressed store.

use serde::{Deserialize, Serialize};

/// A file attachment persisted to the content-addressed store.
///
/// `storage_path` is relative to the store's configured base directory;
/// `sha256`/`size_bytes` must match the bytes actually on disk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Attachment {
    pub id: i64,
    pub message_id: i64,
    pub provider_attachment_id: String,
    pub filename: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub sha256: String,
    pub storage_path: String,
}

/// Maximum filename length kept after sanitization.
pub const MAX_SANITIZED_FILENAME_LEN: usize = 180;

/// Sanitizes an attachment filename for safe, collision-resistant on-disk
/// storage: strips ASCII control characters, replaces path separators with
/// `_`, trims surrounding whitespace, and truncates to
/// [`MAX_SANITIZED_FILENAME_LEN`] characters. Falls back to `attachment`
/// when the result would otherwise be empty.
pub fn sanitize_filename(raw: &str) -> String {
    let mut cleaned: String = raw
        .chars()
        .map(|c| match c {
            '/' | '\\' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    cleaned = cleaned.trim().to_string();
    if cleaned.chars().count() > MAX_SANITIZED_FILENAME_LEN {
        cleaned = cleaned.chars().take(MAX_SANITIZED_FILENAME_LEN).collect();
    }
    if cleaned.is_empty() {
        "attachment".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_path_separators() {
        assert_eq!(sanitize_filename("../../etc/passwd"), ".._.._etc_passwd");
        assert_eq!(sanitize_filename("a\\b\\c.txt"), "a_b_c.txt");
    }

    #[test]
    fn strips_control_characters() {
        assert_eq!(sanitize_filename("report\n.pdf"), "report_.pdf");
    }

    #[test]
    fn truncates_long_filenames() {
        let long = "a".repeat(400);
        let sanitized = sanitize_filename(&long);
        assert_eq!(sanitized.chars().count(), MAX_SANITIZED_FILENAME_LEN);
    }

    #[test]
    fn falls_back_on_empty_result() {
        assert_eq!(sanitize_filename("   "), "attachment");
        assert_eq!(sanitize_filename(""), "attachment");
    }

    #[test]
    fn leaves_normal_filenames_untouched() {
        assert_eq!(sanitize_filename("invoice-2026.pdf"), "invoice-2026.pdf");
    }
}
