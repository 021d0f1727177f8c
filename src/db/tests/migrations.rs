use super::open_db;
use crate::db::Database;

#[tokio::test]
async fn test_database_creation() {
    let (db, _file) = open_db().await;

    let tables: Vec<String> =
        sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .fetch_all(db.pool())
            .await
            .unwrap();

    assert!(tables.contains(&"batches".to_string()));
    assert!(tables.contains(&"identifiers".to_string()));
    assert!(tables.contains(&"runtime_state".to_string()));
    assert!(tables.contains(&"schema_version".to_string()));

    db.close().await;
}

#[tokio::test]
async fn test_reopening_does_not_reapply_migrations() {
    let temp_file = tempfile::NamedTempFile::new().unwrap();

    let db = Database::new(temp_file.path()).await.unwrap();
    db.close().await;

    let db = Database::new(temp_file.path()).await.unwrap();
    let versions: Vec<i64> = sqlx::query_scalar("SELECT version FROM schema_version ORDER BY version")
        .fetch_all(db.pool())
        .await
        .unwrap();
    assert_eq!(versions, vec![1, 2]);

    db.close().await;
}

#[tokio::test]
async fn test_database_creates_missing_parent_directory() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("harvester.db");

    let db = Database::new(&path).await.unwrap();
    assert!(path.exists());

    db.close().await;
}
