//! Database Module
//!
//! SQLite connection pool, embedded migrations and transaction helpers

pub mod repository;

use shared::error::AppError;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::{Sqlite, SqlitePool, Transaction};
use std::str::FromStr;

/// Database service: owns a SQLite connection pool
#[derive(Clone, Debug)]
pub struct DbService {
    pub pool: SqlitePool,
}

impl DbService {
    /// Open (or create) a database file with WAL mode and apply migrations
    pub async fn new(db_path: &str) -> Result<Self, AppError> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{db_path}"))
            .map_err(|e| AppError::database(format!("Invalid database path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            // busy_timeout: 写冲突时等待 5s 而非立即失败
            .busy_timeout(std::time::Duration::from_secs(5))
            .optimize_on_close(true, None);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| AppError::database(format!("Failed to open database: {e}")))?;

        tracing::info!(path = %db_path, "Database connection established (SQLite WAL, busy_timeout=5000ms)");

        let service = Self { pool };
        service.migrate().await?;
        Ok(service)
    }

    /// Private in-memory database on a single connection.
    ///
    /// Every connection to `sqlite::memory:` is its own database, so the pool
    /// is pinned to one connection that never idles out.
    pub async fn in_memory() -> Result<Self, AppError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| AppError::database(format!("Invalid database url: {e}")))?
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| AppError::database(format!("Failed to open database: {e}")))?;

        let service = Self { pool };
        service.migrate().await?;
        Ok(service)
    }

    async fn migrate(&self) -> Result<(), AppError> {
        sqlx::migrate!("./migrations")
            .set_ignore_missing(true)
            .run(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Failed to apply migrations: {e}")))?;
        tracing::info!("Database migrations applied");
        Ok(())
    }
}

/// Roll back a transaction whose unit of work failed.
///
/// Dropping a transaction also rolls back; this variant exists so a failed
/// rollback reaches the operator channel.
pub async fn rollback(tx: Transaction<'_, Sqlite>, context: &str) {
    if let Err(e) = tx.rollback().await {
        tracing::error!(
            target: "alert",
            context,
            error = %e,
            "Rollback failed, store may hold a partial write"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_has_schema() {
        let db = DbService::in_memory().await.unwrap();
        let tables: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name",
        )
        .fetch_all(&db.pool)
        .await
        .unwrap();
        for expected in [
            "activity_log",
            "job_execution_log",
            "listing",
            "notification",
            "offer",
            "offer_archive",
            "reservation",
            "reservation_archive",
        ] {
            assert!(tables.iter().any(|t| t == expected), "missing {expected}");
        }
    }

    #[tokio::test]
    async fn test_file_database_reopens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("offers.db");
        let path = path.to_string_lossy().to_string();

        let db = DbService::new(&path).await.unwrap();
        sqlx::query("INSERT INTO job_execution_log (job_type, executed_at) VALUES ('probe', 1)")
            .execute(&db.pool)
            .await
            .unwrap();
        db.pool.close().await;

        let db = DbService::new(&path).await.unwrap();
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM job_execution_log")
            .fetch_one(&db.pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }
}
