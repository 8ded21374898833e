//! Download and delete executors.
//!
//! Download hands fetched bytes to a storage collaborator and reports a bare
//! boolean. Delete trusts the server's verdict; on success it re-browses so
//! the listing never diverges from the server.

use std::path::{Path, PathBuf};

use crate::client::ServerClient;
use crate::error::Result;
use crate::listing::{self, FileRecord};

/// Storage collaborator for downloaded images.
pub trait ImageStore {
    fn save(&self, name: &str, bytes: &[u8]) -> std::io::Result<PathBuf>;
}

/// Saves images into a local directory, creating it on first use.
pub struct DirStore {
    root: PathBuf,
}

impl DirStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ImageStore for DirStore {
    fn save(&self, name: &str, bytes: &[u8]) -> std::io::Result<PathBuf> {
        std::fs::create_dir_all(&self.root)?;
        let target = self.root.join(sanitize_filename(name));
        std::fs::write(&target, bytes)?;
        Ok(target)
    }
}

/// Make a display name safe to use as a local filename.
fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' => '_',
            _ => c,
        })
        .collect();
    let trimmed = cleaned.trim_start_matches('.').to_string();
    if trimmed.is_empty() {
        "unnamed".to_string()
    } else {
        trimmed
    }
}

/// Fetch the full bytes for `record` and hand them to the store. Failure
/// reasons are logged but not distinguished beyond "failed".
pub async fn download_record(
    client: &ServerClient,
    store: &dyn ImageStore,
    record: &FileRecord,
) -> bool {
    let bytes = match client.fetch_bytes(&record.path).await {
        Ok(bytes) => bytes,
        Err(e) => {
            log::warn!("Failed to download {}: {}", record.path, e);
            return false;
        }
    };

    match store.save(&record.name, &bytes) {
        Ok(target) => {
            log::info!("Saved {} ({} bytes) to {:?}", record.name, bytes.len(), target);
            true
        }
        Err(e) => {
            log::warn!("Failed to save {}: {}", record.name, e);
            false
        }
    }
}

/// Result of a delete request.
#[derive(Debug)]
pub enum DeleteOutcome {
    /// The server deleted the file; carries the re-browsed listing so the
    /// caller resynchronizes instead of removing the entry locally.
    Deleted(Vec<FileRecord>),
    /// The server refused; the caller keeps its current listing.
    Refused(String),
}

/// Delete `record` on the server. On reported success the listing at
/// `browse_path` is fetched again and returned.
pub async fn delete_record(
    client: &ServerClient,
    record: &FileRecord,
    browse_path: &str,
) -> Result<DeleteOutcome> {
    let verdict = client.delete(&record.path).await?;

    if !verdict.success {
        let message = verdict
            .message
            .unwrap_or_else(|| "Server refused deletion".to_string());
        log::warn!("Delete of {} refused: {}", record.path, message);
        return Ok(DeleteOutcome::Refused(message));
    }

    let body = client.browse(browse_path).await?;
    Ok(DeleteOutcome::Deleted(listing::parse_listing(&body)))
}
