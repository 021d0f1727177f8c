//! Picking up files the browser saves into its download directory

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::Instant;

use crate::error::BrowserError;
use crate::Result;

/// Extensions browsers use for downloads still in progress
const PARTIAL_EXTENSIONS: [&str; 3] = ["crdownload", "part", "tmp"];

/// Files currently in `dir`; a missing directory is empty
pub async fn snapshot(dir: &Path) -> std::io::Result<HashSet<PathBuf>> {
    let mut files = HashSet::new();
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(files),
        Err(e) => return Err(e),
    };
    while let Some(entry) = entries.next_entry().await? {
        files.insert(entry.path());
    }
    Ok(files)
}

fn is_partial(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| PARTIAL_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
}

/// Wait for a finished file that was not in `known`
///
/// A file counts as finished once it has no in-progress extension and its
/// size is unchanged between two polls.
pub async fn wait_for_download(
    dir: &Path,
    known: &HashSet<PathBuf>,
    timeout: Duration,
    poll: Duration,
) -> Result<PathBuf> {
    let deadline = Instant::now() + timeout;
    let mut sizes: HashMap<PathBuf, u64> = HashMap::new();

    loop {
        for path in snapshot(dir).await? {
            if known.contains(&path) || is_partial(&path) {
                continue;
            }
            let Ok(metadata) = tokio::fs::metadata(&path).await else {
                continue;
            };
            if !metadata.is_file() {
                continue;
            }
            let size = metadata.len();
            if sizes.insert(path.clone(), size) == Some(size) {
                tracing::debug!(path = %path.display(), size, "download finished");
                return Ok(path);
            }
        }

        if Instant::now() >= deadline {
            return Err(BrowserError::Timeout {
                what: format!("download in {}", dir.display()),
                seconds: timeout.as_secs(),
            }
            .into());
        }
        tokio::time::sleep(poll).await;
    }
}

/// Move a downloaded file to its final location
///
/// Falls back to copy-and-delete when a rename crosses filesystems.
pub async fn move_into_place(from: &Path, to: &Path) -> Result<()> {
    if tokio::fs::rename(from, to).await.is_ok() {
        return Ok(());
    }
    tokio::fs::copy(from, to).await.map_err(|e| {
        BrowserError::Download(format!(
            "failed to copy {} to {}: {}",
            from.display(),
            to.display(),
            e
        ))
    })?;
    if let Err(e) = tokio::fs::remove_file(from).await {
        tracing::warn!(path = %from.display(), error = %e, "could not remove downloaded file");
    }
    Ok(())
}
