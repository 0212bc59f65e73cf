//! Missing-ledger repository
//!
//! The outbound ledger of gaps: one row per movie not yet owned, one row per
//! season with episodes still to fetch. All writes here go through
//! reconciliation or a confirmed download; nothing else mutates the ledger.

use std::collections::BTreeSet;

use anyhow::Result;
use serde::Serialize;
use sqlx::SqlitePool;

use super::episode_set::parse_episode_set;

/// A movie the library lacks entirely
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct MissingMovieRecord {
    pub id: i64,
    pub title: String,
    pub year: i64,
}

/// A season with missing episodes
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct MissingTvRecord {
    pub id: i64,
    pub title: String,
    pub season: i64,
    pub missing_episodes: String,
}

impl MissingTvRecord {
    /// Missing episodes as a real set.
    pub fn episode_set(&self) -> BTreeSet<u32> {
        parse_episode_set(&self.missing_episodes)
    }
}

pub struct MissingRepository {
    pool: SqlitePool,
}

impl MissingRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn list_movies(&self) -> Result<Vec<MissingMovieRecord>> {
        let records = sqlx::query_as::<_, MissingMovieRecord>(
            r#"
            SELECT id, title, year
            FROM missing_movies
            ORDER BY title, year
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    pub async fn get_movie(&self, title: &str, year: i64) -> Result<Option<MissingMovieRecord>> {
        let record = sqlx::query_as::<_, MissingMovieRecord>(
            r#"
            SELECT id, title, year
            FROM missing_movies
            WHERE title = ? AND year = ?
            "#,
        )
        .bind(title)
        .bind(year)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    /// Open a movie gap; duplicate (title, year) is a no-op.
    pub async fn insert_movie(&self, title: &str, year: i64) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO missing_movies (title, year) VALUES (?, ?)
            "#,
        )
        .bind(title)
        .bind(year)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn delete_movie(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM missing_movies WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub async fn list_tvs(&self) -> Result<Vec<MissingTvRecord>> {
        let records = sqlx::query_as::<_, MissingTvRecord>(
            r#"
            SELECT id, title, season, missing_episodes
            FROM missing_tvs
            ORDER BY title, season
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    pub async fn get_tv(&self, title: &str, season: i64) -> Result<Option<MissingTvRecord>> {
        let record = sqlx::query_as::<_, MissingTvRecord>(
            r#"
            SELECT id, title, season, missing_episodes
            FROM missing_tvs
            WHERE title = ? AND season = ?
            "#,
        )
        .bind(title)
        .bind(season)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    /// Open a season gap with its initial missing set.
    pub async fn insert_tv(&self, title: &str, season: i64, missing_episodes: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO missing_tvs (title, season, missing_episodes)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(title)
        .bind(season)
        .bind(missing_episodes)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Rewrite a season's missing set.
    pub async fn update_tv_episodes(&self, id: i64, missing_episodes: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE missing_tvs SET missing_episodes = ? WHERE id = ?
            "#,
        )
        .bind(missing_episodes)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn delete_tv(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM missing_tvs WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
