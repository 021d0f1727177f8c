//! Export file placement and row counting

use std::path::{Path, PathBuf};

use crate::types::BatchId;

/// Where an identifier's export is saved
///
/// The path is unique per (batch, code) so workflows never overwrite each
/// other's files.
pub fn export_path(results_dir: &Path, batch_id: BatchId, code: &str) -> PathBuf {
    results_dir
        .join(format!("batch_{}", batch_id))
        .join(code)
        .join(format!("scopus_export_{}.csv", code))
}

/// Number of data rows in an exported CSV: lines minus the header, floored at 0
///
/// A final line without a trailing newline still counts. Bytes are counted
/// rather than decoded, so encoding problems in the export cannot fail it.
pub async fn count_data_rows(path: &Path) -> std::io::Result<u64> {
    let bytes = tokio::fs::read(path).await?;
    Ok(data_rows(&bytes))
}

fn data_rows(bytes: &[u8]) -> u64 {
    let newlines = bytes.iter().filter(|b| **b == b'\n').count() as u64;
    let unterminated = u64::from(bytes.last().is_some_and(|b| *b != b'\n'));
    (newlines + unterminated).saturating_sub(1)
}
