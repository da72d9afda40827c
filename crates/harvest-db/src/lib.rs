//! Harvest Database Layer
//!
//! `SQLite` document store for the harvester. Uses `SQLx` with embedded
//! migrations.
//!
//! # Example
//!
//! ```ignore
//! use harvest_db::{Database, Store};
//!
//! let db = Database::open("harvester.db").await?;
//! if !db.is_content_fetched(&doc_id).await? {
//!     // fetch it
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod documents;
pub mod error;
pub mod migrations;
pub mod raw_payloads;
pub mod rotations;
pub mod store;

pub use documents::{DocumentContent, DocumentSummary};
pub use error::{DatabaseError, Result};
pub use raw_payloads::RawPayload;
pub use rotations::RotationRecord;
pub use store::Store;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;

/// Connection pool over the harvester database.
#[derive(Debug, Clone)]
pub struct Database {
    pool: Pool<Sqlite>,
}

impl Database {
    /// Open (creating if missing) and migrate the database at `path`.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    DatabaseError::Open(format!("failed to create {}: {e}", parent.display()))
                })?;
            }
        }
        let db = Self::connect(path).await?;
        db.run_migrations().await?;
        Ok(db)
    }

    /// Connect without running migrations.
    ///
    /// `:memory:` gets a single connection so every query sees the same
    /// in-memory database.
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self> {
        let path_str = path.as_ref().to_str().ok_or_else(|| {
            DatabaseError::Open("invalid database path: not valid UTF-8".to_string())
        })?;

        let connect_options = SqliteConnectOptions::from_str(path_str)
            .map_err(|e| DatabaseError::Open(format!("invalid connection string: {e}")))?
            .create_if_missing(true);

        let max_connections = if path_str == ":memory:" { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(connect_options)
            .await
            .map_err(|e| DatabaseError::Open(format!("failed to open {path_str}: {e}")))?;

        tracing::info!("Database pool created at {}", path_str);
        Ok(Self { pool })
    }

    /// Run all pending database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        migrations::run_migrations(&self.pool).await
    }

    /// Get a reference to the underlying connection pool.
    #[must_use]
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    /// Close the database connection gracefully.
    pub async fn close(self) {
        self.pool.close().await;
        tracing::info!("Database pool closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_open_file_database() {
        let tmp = TempDir::new().expect("create temp dir");
        let path = tmp.path().join("nested").join("harvester.db");

        let db = Database::open(&path).await.expect("open database");
        assert!(path.exists());
        assert_eq!(
            migrations::get_schema_version(db.pool())
                .await
                .expect("version"),
            3
        );
        db.close().await;
    }

    #[tokio::test]
    async fn test_memory_database() {
        let db = Database::open(":memory:").await.expect("open database");
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
            .fetch_one(db.pool())
            .await
            .expect("query");
        assert_eq!(count, 0);
    }
}
