//! Database lifecycle and schema migrations.

use crate::error::DatabaseError;
use crate::{Error, Result};
use sqlx::SqliteConnection;
use sqlx::sqlite::SqlitePool;
use std::path::Path;

use super::Database;

impl Database {
    /// Create a new database connection
    ///
    /// Creates the database file if it doesn't exist and runs migrations.
    pub async fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                Error::Database(DatabaseError::ConnectionFailed(format!(
                    "Failed to create database directory: {}",
                    e
                )))
            })?;
        }

        // Foreign keys are required for batch -> identifier cascades
        use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode};
        use std::str::FromStr;

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))
            .map_err(|e| {
                Error::Database(DatabaseError::ConnectionFailed(format!(
                    "Failed to parse database path: {}",
                    e
                )))
            })?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePool::connect_with(options).await.map_err(|e| {
            Error::Database(DatabaseError::ConnectionFailed(format!(
                "Failed to connect to database: {}",
                e
            )))
        })?;

        let db = Self { pool };
        db.run_migrations().await?;

        Ok(db)
    }

    /// Run database migrations
    async fn run_migrations(&self) -> Result<()> {
        let mut conn = self.pool.acquire().await.map_err(|e| {
            Error::Database(DatabaseError::ConnectionFailed(format!(
                "Failed to acquire connection: {}",
                e
            )))
        })?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY,
                applied_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&mut *conn)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::MigrationFailed(format!(
                "Failed to create schema_version table: {}",
                e
            )))
        })?;

        let current_version: Option<i64> =
            sqlx::query_scalar("SELECT MAX(version) FROM schema_version")
                .fetch_optional(&mut *conn)
                .await
                .map_err(|e| {
                    Error::Database(DatabaseError::QueryFailed(format!(
                        "Failed to query schema version: {}",
                        e
                    )))
                })?
                .flatten();

        let current_version = current_version.unwrap_or(0);

        if current_version < 1 {
            Self::migrate_v1(&mut conn).await?;
        }
        if current_version < 2 {
            Self::migrate_v2(&mut conn).await?;
        }

        Ok(())
    }

    /// Migration v1: batches and identifiers
    async fn migrate_v1(conn: &mut SqliteConnection) -> Result<()> {
        tracing::info!("Applying database migration v1");
        Self::begin_migration(conn).await?;

        let result = async {
            Self::create_batches_schema(conn).await?;
            Self::create_identifiers_schema(conn).await?;
            Self::record_migration(conn, 1).await?;
            Ok::<(), Error>(())
        }
        .await;

        Self::finish_migration(conn, 1, result).await
    }

    /// Migration v2: runtime state table for shutdown tracking
    async fn migrate_v2(conn: &mut SqliteConnection) -> Result<()> {
        tracing::info!("Applying database migration v2");
        Self::begin_migration(conn).await?;

        let result = async {
            Self::execute_ddl(
                conn,
                r#"
                CREATE TABLE runtime_state (
                    key TEXT PRIMARY KEY,
                    value TEXT NOT NULL,
                    updated_at INTEGER NOT NULL
                )
                "#,
                "runtime_state table",
            )
            .await?;
            Self::record_migration(conn, 2).await?;
            Ok::<(), Error>(())
        }
        .await;

        Self::finish_migration(conn, 2, result).await
    }

    async fn begin_migration(conn: &mut SqliteConnection) -> Result<()> {
        // Partial failures must not leave the schema half-applied
        sqlx::query("BEGIN")
            .execute(&mut *conn)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::MigrationFailed(format!(
                    "Failed to begin transaction: {}",
                    e
                )))
            })?;
        Ok(())
    }

    async fn finish_migration(
        conn: &mut SqliteConnection,
        version: i32,
        result: Result<()>,
    ) -> Result<()> {
        match result {
            Ok(()) => {
                sqlx::query("COMMIT")
                    .execute(&mut *conn)
                    .await
                    .map_err(|e| {
                        Error::Database(DatabaseError::MigrationFailed(format!(
                            "Failed to commit migration v{}: {}",
                            version, e
                        )))
                    })?;
            }
            Err(e) => {
                let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
                return Err(e);
            }
        }

        tracing::info!("Database migration v{} complete", version);
        Ok(())
    }

    async fn create_batches_schema(conn: &mut SqliteConnection) -> Result<()> {
        Self::execute_ddl(
            conn,
            r#"
            CREATE TABLE batches (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                uploaded_at INTEGER NOT NULL,
                original_filename TEXT,
                status TEXT NOT NULL DEFAULT 'PENDING',
                notes TEXT
            )
            "#,
            "batches table",
        )
        .await?;

        Self::execute_ddl(
            conn,
            "CREATE INDEX idx_batches_uploaded_at ON batches(uploaded_at DESC)",
            "batches index",
        )
        .await
    }

    async fn create_identifiers_schema(conn: &mut SqliteConnection) -> Result<()> {
        Self::execute_ddl(
            conn,
            r#"
            CREATE TABLE identifiers (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                batch_id INTEGER NOT NULL REFERENCES batches(id) ON DELETE CASCADE,
                code TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'PENDING',
                task_id TEXT UNIQUE,
                result_path TEXT,
                article_count INTEGER,
                error_message TEXT,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                processing_started_at INTEGER,
                processing_finished_at INTEGER,
                UNIQUE(batch_id, code)
            )
            "#,
            "identifiers table",
        )
        .await?;

        Self::execute_ddl(
            conn,
            "CREATE INDEX idx_identifiers_batch_status ON identifiers(batch_id, status)",
            "identifiers index",
        )
        .await?;

        Self::execute_ddl(
            conn,
            "CREATE INDEX idx_identifiers_status ON identifiers(status)",
            "identifiers index",
        )
        .await
    }

    async fn execute_ddl(conn: &mut SqliteConnection, sql: &str, what: &str) -> Result<()> {
        sqlx::query(sql).execute(&mut *conn).await.map_err(|e| {
            Error::Database(DatabaseError::MigrationFailed(format!(
                "Failed to create {}: {}",
                what, e
            )))
        })?;
        Ok(())
    }

    async fn record_migration(conn: &mut SqliteConnection, version: i32) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query("INSERT INTO schema_version (version, applied_at) VALUES (?, ?)")
            .bind(version)
            .bind(now)
            .execute(&mut *conn)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::MigrationFailed(format!(
                    "Failed to record migration: {}",
                    e
                )))
            })?;

        Ok(())
    }

    /// Close the database connection
    pub async fn close(self) {
        self.pool.close().await;
    }

    /// Get the underlying connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
