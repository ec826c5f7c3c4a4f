//! Embedded relational state for the Bakery daemon: pies, slices, resources
//! and the audit log, backed by a single SQLite file via `sqlx`.

mod audit;
mod host_route;
mod migrations;
mod pies;
pub mod slices;

pub use slices::NewResource;

use std::path::Path;

use bakery_core::error::BakeryError;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteConnectOptions};
use tracing::info;

#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open (creating if absent) the `bakery.db` file under `data_dir`,
    /// run pending migrations, and set the WAL pragmas.
    pub async fn open(data_dir: &Path) -> Result<Self, BakeryError> {
        std::fs::create_dir_all(data_dir)
            .map_err(|e| BakeryError::Internal(format!("failed to create data dir: {e}")))?;
        let db_path = data_dir.join("bakery.db");

        info!(path = %db_path.display(), "store: opening database");

        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .min_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| BakeryError::Internal(format!("failed to open database: {e}")))?;

        migrations::run_migrations(&pool)
            .await
            .map_err(|e| BakeryError::Internal(format!("migration failed: {e}")))?;

        sqlx::query("PRAGMA journal_mode = WAL")
            .execute(&pool)
            .await
            .map_err(db_err)?;
        sqlx::query("PRAGMA synchronous = NORMAL")
            .execute(&pool)
            .await
            .map_err(db_err)?;
        sqlx::query("PRAGMA foreign_keys = ON")
            .execute(&pool)
            .await
            .map_err(db_err)?;

        info!("store: ready");
        Ok(Self { pool })
    }

    /// In-memory store for tests; migrations and pragmas applied the same way.
    #[cfg(any(test, feature = "test-util"))]
    pub async fn open_in_memory() -> Result<Self, BakeryError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(db_err)?;
        migrations::run_migrations(&pool).await.map_err(db_err)?;
        sqlx::query("PRAGMA foreign_keys = ON")
            .execute(&pool)
            .await
            .map_err(db_err)?;
        Ok(Self { pool })
    }
}

/// Maps a bare `sqlx::Error` to `BakeryError::Internal`. Call sites that need
/// to distinguish unique-constraint violations use `conflict_err` instead.
fn db_err(e: sqlx::Error) -> BakeryError {
    BakeryError::Internal(format!("database error: {e}"))
}

/// Maps a `sqlx::Error` to `BakeryError::Conflict(label)` if it is a unique
/// constraint violation, else to `BakeryError::Internal`.
fn conflict_or_internal(e: sqlx::Error, label: &str) -> BakeryError {
    if let sqlx::Error::Database(ref db) = e {
        if db.message().contains("UNIQUE constraint failed") {
            return BakeryError::Conflict(format!("{label} already exists"));
        }
    }
    db_err(e)
}
