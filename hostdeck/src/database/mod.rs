//! Persistence boundary for hostdeck.
//!
//! The relational store is an external collaborator; the core only depends on
//! the repository traits in [`repositories`]. Two implementations ship with
//! the crate: an in-memory store and a SQLite store built on sqlx.

pub mod models;
pub mod repositories;
pub mod retry;
pub mod time;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Row, Sqlite};
use std::str::FromStr;
use std::time::Duration;

/// Database connection pool type alias.
pub type DbPool = Pool<Sqlite>;

/// Default connection pool size.
const DEFAULT_POOL_SIZE: u32 = 10;

/// Default busy timeout in milliseconds.
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 30_000;

/// Schema statements, applied in order and idempotent.
const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS servers (
        id TEXT PRIMARY KEY NOT NULL,
        organization_id TEXT NOT NULL,
        name TEXT NOT NULL,
        provider TEXT NOT NULL,
        instance_type TEXT NOT NULL,
        region TEXT NOT NULL,
        cpu_cores INTEGER NOT NULL,
        memory_gb INTEGER NOT NULL,
        storage_gb INTEGER NOT NULL,
        bandwidth_tb REAL NOT NULL,
        monthly_price REAL NOT NULL,
        status TEXT NOT NULL,
        ip_address TEXT,
        failure_reason TEXT,
        generation INTEGER NOT NULL DEFAULT 0,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_servers_organization ON servers (organization_id, status)",
    "CREATE TABLE IF NOT EXISTS deployments (
        id TEXT PRIMARY KEY NOT NULL,
        server_id TEXT NOT NULL,
        organization_id TEXT NOT NULL,
        name TEXT NOT NULL,
        repository_url TEXT,
        branch TEXT NOT NULL,
        status TEXT NOT NULL,
        build_log TEXT NOT NULL DEFAULT '',
        generation INTEGER NOT NULL DEFAULT 0,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_deployments_server ON deployments (server_id, created_at)",
    "CREATE TABLE IF NOT EXISTS metrics (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        id TEXT NOT NULL UNIQUE,
        server_id TEXT NOT NULL,
        timestamp INTEGER NOT NULL,
        cpu_usage REAL NOT NULL,
        memory_usage REAL NOT NULL,
        disk_usage REAL NOT NULL,
        network_in INTEGER NOT NULL,
        network_out INTEGER NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_metrics_server_time ON metrics (server_id, timestamp)",
];

fn is_memory_url(database_url: &str) -> bool {
    database_url.contains(":memory:") || database_url.contains("mode=memory")
}

/// Initialize the database connection pool.
///
/// In-memory databases live as long as their connection, so they get a single
/// connection that is never recycled.
pub async fn init_pool(database_url: &str) -> Result<DbPool, sqlx::Error> {
    let in_memory = is_memory_url(database_url);

    let connect_options = SqliteConnectOptions::from_str(database_url)?
        // Enable WAL mode for concurrent reads during writes
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))
        .create_if_missing(true);

    let mut pool_options = SqlitePoolOptions::new().acquire_timeout(Duration::from_secs(30));
    pool_options = if in_memory {
        pool_options
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        pool_options.max_connections(DEFAULT_POOL_SIZE)
    };

    let pool = pool_options.connect_with(connect_options).await?;

    let row = sqlx::query("PRAGMA journal_mode").fetch_one(&pool).await?;
    let mode: String = row.get(0);
    tracing::info!(journal_mode = %mode, in_memory, "Database pool initialized");

    Ok(pool)
}

/// Create tables and indexes if they do not exist.
pub async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::Error> {
    tracing::info!("Running database migrations...");
    for statement in SCHEMA {
        sqlx::query(statement).execute(pool).await?;
    }
    tracing::info!("Database migrations completed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_init_pool_and_migrate() {
        let pool = init_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        // Second run is a no-op.
        run_migrations(&pool).await.unwrap();

        let tables: Vec<(String,)> =
            sqlx::query_as("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
                .fetch_all(&pool)
                .await
                .unwrap();
        let names: Vec<&str> = tables.iter().map(|t| t.0.as_str()).collect();
        assert!(names.contains(&"servers"));
        assert!(names.contains(&"deployments"));
        assert!(names.contains(&"metrics"));
    }

    #[test]
    fn test_is_memory_url() {
        assert!(is_memory_url("sqlite::memory:"));
        assert!(is_memory_url("sqlite:file:test?mode=memory&cache=shared"));
        assert!(!is_memory_url("sqlite:hostdeck.db?mode=rwc"));
    }
}
