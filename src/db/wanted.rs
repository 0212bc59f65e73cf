//! Wanted-record repository (subscription wishlist)
//!
//! Rows are produced by the external subscription feed; the engine treats
//! them as immutable input to reconciliation.

use anyhow::Result;
use sqlx::SqlitePool;

/// A subscribed movie
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct WantedMovieRecord {
    pub title: String,
    pub year: i64,
}

/// A subscribed TV season. The feed does not always know the episode
/// count, so `total_episodes` may be absent. Feed-owned columns the engine
/// never consumes (row id, year) are not mapped; seasons are matched by
/// title alone.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct WantedTvRecord {
    pub title: String,
    pub season: i64,
    pub total_episodes: Option<i64>,
}

pub struct WantedRepository {
    pool: SqlitePool,
}

impl WantedRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// All subscribed movies
    pub async fn list_movies(&self) -> Result<Vec<WantedMovieRecord>> {
        let records = sqlx::query_as::<_, WantedMovieRecord>(
            r#"
            SELECT title, year
            FROM wanted_movies
            ORDER BY title, year
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    /// All subscribed seasons
    pub async fn list_tvs(&self) -> Result<Vec<WantedTvRecord>> {
        let records = sqlx::query_as::<_, WantedTvRecord>(
            r#"
            SELECT title, season, total_episodes
            FROM wanted_tvs
            ORDER BY title, season
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    /// Seed a movie subscription. The feed normally writes these rows;
    /// kept for tests and local seeding.
    #[allow(dead_code)]
    pub async fn add_movie(&self, title: &str, year: i64) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO wanted_movies (title, year) VALUES (?, ?)
            "#,
        )
        .bind(title)
        .bind(year)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Seed a season subscription. See [`Self::add_movie`].
    #[allow(dead_code)]
    pub async fn add_tv(
        &self,
        title: &str,
        season: i64,
        total_episodes: Option<i64>,
        year: Option<i64>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO wanted_tvs (title, season, total_episodes, year)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(title)
        .bind(season)
        .bind(total_episodes)
        .bind(year)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::Database;

    #[tokio::test]
    async fn test_seed_and_list() {
        let db = Database::connect_in_memory().await.unwrap();
        let wanted = db.wanted();

        wanted.add_movie("Hero", 2002).await.unwrap();
        wanted.add_tv("Show", 1, Some(12), Some(2020)).await.unwrap();
        wanted.add_tv("Show", 1, Some(12), Some(2020)).await.unwrap();

        let movies = wanted.list_movies().await.unwrap();
        assert_eq!(movies.len(), 1);
        assert_eq!(movies[0].title, "Hero");

        let tvs = wanted.list_tvs().await.unwrap();
        assert_eq!(tvs.len(), 1);
        assert_eq!(tvs[0].total_episodes, Some(12));
    }
}
