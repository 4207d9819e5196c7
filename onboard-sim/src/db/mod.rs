//! Database access for onboard-sim
//!
//! SQLite stands in for the reference corpus and the session archive:
//! `document_chunks` backs keyword search, `simulation_sessions` and
//! `competency_evaluations` receive completed sessions.

pub mod documents;
pub mod sessions;

pub use documents::SqliteDocumentStore;
pub use sessions::{SessionStore, SqliteSessionStore, StoredSession};

use onboard_common::Result;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::path::Path;

/// Initialize database connection pool at `db_path`, creating it if missing
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // mode=rwc: read, write, create
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    tracing::debug!("Connecting to database: {}", db_url);

    let pool = SqlitePool::connect(&db_url).await?;
    init_tables(&pool).await?;

    Ok(pool)
}

/// Single-connection in-memory database with all tables
///
/// One connection only: every SQLite `:memory:` connection is its own database.
pub async fn init_memory_pool() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    init_tables(&pool).await?;
    Ok(pool)
}

/// Create onboard-sim tables if they don't exist
pub async fn init_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS document_chunks (
            document_id TEXT NOT NULL,
            chunk_index INTEGER NOT NULL,
            title TEXT NOT NULL,
            category TEXT NOT NULL DEFAULT '',
            content TEXT NOT NULL,
            PRIMARY KEY (document_id, chunk_index)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_document_chunks_title ON document_chunks (title)")
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS simulation_sessions (
            session_id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            persona_id TEXT NOT NULL,
            situation_id TEXT NOT NULL,
            state TEXT NOT NULL,
            transcript TEXT NOT NULL DEFAULT '[]',
            achieved_goals TEXT NOT NULL DEFAULT '[]',
            stuck_counter INTEGER NOT NULL DEFAULT 0,
            goal_score REAL NOT NULL DEFAULT 0.0,
            started_at TEXT NOT NULL,
            ended_at TEXT,
            duration_seconds INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS competency_evaluations (
            session_id TEXT PRIMARY KEY REFERENCES simulation_sessions(session_id),
            overall_score REAL NOT NULL,
            grade TEXT NOT NULL,
            performance_level TEXT NOT NULL,
            per_competency TEXT NOT NULL,
            summary TEXT NOT NULL DEFAULT '',
            improvements TEXT NOT NULL DEFAULT '[]',
            evaluated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    tracing::info!("Database tables initialized (document_chunks, simulation_sessions, competency_evaluations)");

    Ok(())
}
