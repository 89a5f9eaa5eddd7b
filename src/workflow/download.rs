//! Saving downloaded payloads with deterministic filenames.

use bytes::Bytes;
use std::path::{Path, PathBuf};

use crate::common::AppError;

pub const ALL_ARCHIVE_NAME: &str = "converted_output.zip";
pub const MODIFIED_ARCHIVE_NAME: &str = "modified_output.zip";

/// Filename for a per-group archive.
pub fn group_archive_name(group: &str) -> String {
    format!("{group}_group.zip")
}

/// Write a downloaded payload into the downloads directory, creating it on
/// first use. Returns the path written.
pub(crate) async fn save_bytes(
    dir: &Path,
    filename: &str,
    bytes: Bytes,
) -> Result<PathBuf, AppError> {
    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(filename);
    tokio::fs::write(&path, &bytes).await?;
    tracing::info!(path = %path.display(), bytes = bytes.len(), "Saved download");
    Ok(path)
}
