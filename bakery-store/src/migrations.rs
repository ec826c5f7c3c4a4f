//! Schema migration, in the style of `crab_city`'s manual `run_migrations`:
//! a `schema_version` table tracks the applied version, and each version
//! bump is a single idempotent block of DDL. A failed foreign-key integrity
//! check aborts the migration without committing.

use sqlx::SqlitePool;

/// Current schema version. Bump when adding a migration block below.
pub const SCHEMA_VERSION: i64 = 1;

pub async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        "#,
    )
    .execute(pool)
    .await?;

    let current_version: i64 =
        sqlx::query_scalar("SELECT COALESCE(MAX(version), 0) FROM schema_version")
            .fetch_one(pool)
            .await
            .unwrap_or(0);

    if current_version >= SCHEMA_VERSION {
        tracing::debug!(version = current_version, "store: schema up to date");
        return Ok(());
    }

    tracing::info!(
        from = current_version,
        to = SCHEMA_VERSION,
        "store: migrating schema"
    );

    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        CREATE TABLE pies (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            slug TEXT NOT NULL UNIQUE,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE slices (
            id TEXT PRIMARY KEY,
            pie_id TEXT NOT NULL REFERENCES pies(id) ON DELETE CASCADE,
            ordinal INTEGER NOT NULL,
            host TEXT NOT NULL UNIQUE,
            status TEXT NOT NULL,
            created_at TEXT NOT NULL,
            stopped_at TEXT,
            UNIQUE (pie_id, ordinal)
        )
        "#,
    )
    .execute(&mut *tx)
    .await?;
    sqlx::query("CREATE INDEX idx_slices_pie_id ON slices(pie_id)")
        .execute(&mut *tx)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE slice_resources (
            id TEXT PRIMARY KEY,
            slice_id TEXT NOT NULL REFERENCES slices(id) ON DELETE CASCADE,
            key TEXT NOT NULL,
            allocated_port INTEGER NOT NULL UNIQUE,
            protocol TEXT NOT NULL,
            expose TEXT NOT NULL,
            route_host TEXT UNIQUE,
            created_at TEXT NOT NULL,
            UNIQUE (slice_id, key)
        )
        "#,
    )
    .execute(&mut *tx)
    .await?;
    sqlx::query("CREATE INDEX idx_resources_slice_id ON slice_resources(slice_id)")
        .execute(&mut *tx)
        .await?;
    // At most one primary-http resource per slice (spec invariant).
    sqlx::query(
        r#"
        CREATE UNIQUE INDEX idx_resources_one_primary_http
        ON slice_resources(slice_id)
        WHERE protocol = 'http' AND expose = 'primary'
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE audit_log (
            id TEXT PRIMARY KEY,
            pie_id TEXT REFERENCES pies(id) ON DELETE SET NULL,
            slice_id TEXT REFERENCES slices(id) ON DELETE SET NULL,
            kind TEXT NOT NULL,
            payload TEXT NOT NULL,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(&mut *tx)
    .await?;
    sqlx::query("CREATE INDEX idx_audit_created_at ON audit_log(created_at DESC)")
        .execute(&mut *tx)
        .await?;

    sqlx::query("INSERT INTO schema_version (version) VALUES (?)")
        .bind(SCHEMA_VERSION)
        .execute(&mut *tx)
        .await?;

    let violations: i64 = sqlx::query_scalar("PRAGMA foreign_key_check")
        .fetch_optional(&mut *tx)
        .await?
        .unwrap_or(0);
    if violations != 0 {
        tx.rollback().await?;
        return Err(sqlx::Error::Protocol(
            "foreign key integrity check failed during migration".into(),
        ));
    }

    tx.commit().await?;
    tracing::info!(version = SCHEMA_VERSION, "store: migration complete");
    Ok(())
}
