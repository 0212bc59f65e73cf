//! Database connection and operations

pub mod episode_set;
pub mod library;
pub mod missing;
pub mod wanted;

use anyhow::Result;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

pub use library::LibraryRepository;
pub use missing::{MissingMovieRecord, MissingRepository, MissingTvRecord};
pub use wanted::WantedRepository;

/// Everything the engine persists, created up front so a fresh database file
/// is usable immediately. The `wanted_*` tables are written by the external
/// subscription feed and only read here; sharing one schema keeps local runs
/// and tests self-contained.
const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS lib_movies (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        title TEXT NOT NULL,
        year INTEGER NOT NULL,
        UNIQUE(title, year)
    )",
    "CREATE TABLE IF NOT EXISTS lib_tvs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        title TEXT NOT NULL UNIQUE,
        year INTEGER
    )",
    "CREATE TABLE IF NOT EXISTS lib_tv_seasons (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        tv_id INTEGER NOT NULL REFERENCES lib_tvs(id),
        season INTEGER NOT NULL,
        episodes TEXT NOT NULL DEFAULT '',
        UNIQUE(tv_id, season)
    )",
    "CREATE TABLE IF NOT EXISTS wanted_movies (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        title TEXT NOT NULL,
        year INTEGER NOT NULL,
        UNIQUE(title, year)
    )",
    "CREATE TABLE IF NOT EXISTS wanted_tvs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        title TEXT NOT NULL,
        season INTEGER NOT NULL,
        total_episodes INTEGER,
        year INTEGER,
        UNIQUE(title, season)
    )",
    "CREATE TABLE IF NOT EXISTS missing_movies (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        title TEXT NOT NULL,
        year INTEGER NOT NULL,
        UNIQUE(title, year)
    )",
    "CREATE TABLE IF NOT EXISTS missing_tvs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        title TEXT NOT NULL,
        season INTEGER NOT NULL,
        missing_episodes TEXT NOT NULL DEFAULT '',
        UNIQUE(title, season)
    )",
];

/// Database wrapper providing connection pool access
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Get the maximum connection pool size from environment or default
    fn get_max_connections() -> u32 {
        std::env::var("DATABASE_MAX_CONNECTIONS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(5)
    }

    /// Open (creating if missing) the database file and ensure the schema.
    pub async fn connect(path: &str) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(Self::get_max_connections())
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.init_schema().await?;
        Ok(db)
    }

    /// In-memory database for tests. Pinned to a single pooled connection
    /// that never expires, since every SQLite `:memory:` connection is its
    /// own database.
    #[cfg(test)]
    pub async fn connect_in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;

        let db = Self { pool };
        db.init_schema().await?;
        Ok(db)
    }

    async fn init_schema(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Get a library inventory repository
    pub fn library(&self) -> LibraryRepository {
        LibraryRepository::new(self.pool.clone())
    }

    /// Get a wanted-record repository
    pub fn wanted(&self) -> WantedRepository {
        WantedRepository::new(self.pool.clone())
    }

    /// Get a missing-ledger repository
    pub fn missing(&self) -> MissingRepository {
        MissingRepository::new(self.pool.clone())
    }
}
