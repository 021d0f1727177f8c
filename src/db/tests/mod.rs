mod migrations;

use crate::db::{Database, NewBatch};
use crate::types::{BatchId, BatchStatus};
use tempfile::NamedTempFile;

/// Open a fresh database backed by a temp file (kept alive by the returned handle)
async fn open_db() -> (Database, NamedTempFile) {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();
    (db, temp_file)
}

async fn insert_pending_batch(db: &Database, filename: &str) -> BatchId {
    db.insert_batch(&NewBatch {
        original_filename: Some(filename.to_string()),
        status: BatchStatus::Pending,
        notes: None,
    })
    .await
    .unwrap()
}
