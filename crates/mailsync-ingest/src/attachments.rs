//! Content-addressed attachment store.
//!
//! Layout: `<base>/<sha256[0:2]>/<sha256[2:4]>/<sha256>_<safe_filename>`.
//! Writes go to a `.tmp` sibling first, then an atomic rename; if the final
//! path already exists the existing content is kept (idempotent write).

use std::path::{Path, PathBuf};

use mailsync_core::domain::{sanitize_filename, DomainError};
use sha2::{Digest, Sha256};

/// A validated, persisted attachment ready to be inserted as a
/// [`mailsync_core::ports::NewAttachment`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredAttachment {
    pub storage_path: String,
    pub sha256: String,
    pub size_bytes: i64,
    pub content_type: String,
}

/// Content-addressed attachment store rooted at a configured base
/// directory, enforcing the extension/size rules from [`AttachmentConfig`].
///
/// [`AttachmentConfig`]: mailsync_core::config::AttachmentConfig
pub struct AttachmentStore {
    base_dir: PathBuf,
    max_size_bytes: u64,
    allowed_extensions: Option<Vec<String>>,
    blocked_extensions: Vec<String>,
}

impl AttachmentStore {
    pub fn new(
        base_dir: impl Into<PathBuf>,
        max_size_mb: u64,
        allowed_extensions: Option<Vec<String>>,
        blocked_extensions: Vec<String>,
    ) -> Self {
        Self {
            base_dir: base_dir.into(),
            max_size_bytes: max_size_mb * 1_048_576,
            allowed_extensions,
            blocked_extensions,
        }
    }

    /// Validates and writes `bytes` for `raw_filename`, returning the
    /// stored record. Runs validation in the documented order so the first
    /// failure short-circuits: sanitize filename, reject blocklisted
    /// extension, enforce allowlist membership (if configured), enforce
    /// the size cap.
    pub async fn save(
        &self,
        raw_filename: &str,
        content_type: Option<&str>,
        bytes: &[u8],
    ) -> Result<StoredAttachment, DomainError> {
        let safe_name = sanitize_filename(raw_filename);
        let ext = extension_of(&safe_name);

        if self.blocked_extensions.iter().any(|e| e == &ext) {
            return Err(DomainError::AttachmentRejected(format!(
                "extension .{ext} is blocked"
            )));
        }
        if let Some(allowed) = &self.allowed_extensions {
            if !allowed.iter().any(|e| e == &ext) {
                return Err(DomainError::AttachmentRejected(format!(
                    "extension .{ext} is not in the allowlist"
                )));
            }
        }
        if bytes.len() as u64 > self.max_size_bytes {
            return Err(DomainError::AttachmentRejected(format!(
                "size {} exceeds the {}-byte limit",
                bytes.len(),
                self.max_size_bytes
            )));
        }

        let sha256 = hex_sha256(bytes);
        let resolved_content_type = content_type
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| {
                mime_guess::from_path(&safe_name)
                    .first_raw()
                    .unwrap_or("application/octet-stream")
                    .to_string()
            });

        let relative = relative_path(&sha256, &safe_name);
        let absolute = self.base_dir.join(&relative);

        if !absolute.exists() {
            if let Some(parent) = absolute.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| DomainError::AttachmentRejected(format!("mkdir failed: {e}")))?;
            }
            let tmp_path = absolute.with_extension("tmp");
            tokio::fs::write(&tmp_path, bytes)
                .await
                .map_err(|e| DomainError::AttachmentRejected(format!("write failed: {e}")))?;
            set_restrictive_permissions(&tmp_path).await;
            // Another writer may have raced us to the same content hash;
            // the final file already having identical bytes is fine either way.
            if let Err(e) = tokio::fs::rename(&tmp_path, &absolute).await {
                if !absolute.exists() {
                    return Err(DomainError::AttachmentRejected(format!("rename failed: {e}")));
                }
                let _ = tokio::fs::remove_file(&tmp_path).await;
            }
        }

        Ok(StoredAttachment {
            storage_path: relative.to_string_lossy().into_owned(),
            sha256,
            size_bytes: bytes.len() as i64,
            content_type: resolved_content_type,
        })
    }
}

fn extension_of(filename: &str) -> String {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase()
}

fn hex_sha256(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex_encode(&hasher.finalize())
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn relative_path(sha256: &str, safe_name: &str) -> PathBuf {
    PathBuf::from(&sha256[0..2])
        .join(&sha256[2..4])
        .join(format!("{sha256}_{safe_name}"))
}

#[cfg(unix)]
async fn set_restrictive_permissions(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Ok(metadata) = tokio::fs::metadata(path).await {
        let mut perms = metadata.permissions();
        perms.set_mode(0o640);
        let _ = tokio::fs::set_permissions(path, perms).await;
    }
}

#[cfg(not(unix))]
async fn set_restrictive_permissions(_path: &Path) {}
