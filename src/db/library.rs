//! Library inventory repository (movies, shows, seasons)
//!
//! Rows mirror what the filesystem scanner last observed. Reconciliation
//! treats this inventory as the authoritative truth about what is owned.

use std::collections::BTreeSet;

use anyhow::Result;
use sqlx::SqlitePool;

use super::episode_set::parse_episode_set;

/// A movie present in the library
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct LibraryMovieRecord {
    pub id: i64,
    pub title: String,
    pub year: i64,
}

/// A TV show present in the library
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct LibraryTvRecord {
    pub id: i64,
    pub title: String,
    pub year: Option<i64>,
}

/// One season of a library show, with its owned-episode set
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct LibrarySeasonRecord {
    pub id: i64,
    pub season: i64,
    pub episodes: String,
}

impl LibrarySeasonRecord {
    /// Owned episodes as a real set.
    pub fn episode_set(&self) -> BTreeSet<u32> {
        parse_episode_set(&self.episodes)
    }
}

pub struct LibraryRepository {
    pool: SqlitePool,
}

impl LibraryRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// All library movies
    pub async fn list_movies(&self) -> Result<Vec<LibraryMovieRecord>> {
        let records = sqlx::query_as::<_, LibraryMovieRecord>(
            r#"
            SELECT id, title, year
            FROM lib_movies
            ORDER BY title, year
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    /// Whether a movie with this exact title and year is owned
    pub async fn movie_exists(&self, title: &str, year: i64) -> Result<bool> {
        let row: Option<(i64,)> = sqlx::query_as(
            r#"
            SELECT id FROM lib_movies WHERE title = ? AND year = ?
            "#,
        )
        .bind(title)
        .bind(year)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.is_some())
    }

    /// Record a movie; a duplicate (title, year) is a no-op
    pub async fn insert_movie(&self, title: &str, year: i64) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO lib_movies (title, year) VALUES (?, ?)
            "#,
        )
        .bind(title)
        .bind(year)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn delete_movie(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM lib_movies WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// All library shows
    pub async fn list_tvs(&self) -> Result<Vec<LibraryTvRecord>> {
        let records = sqlx::query_as::<_, LibraryTvRecord>(
            r#"
            SELECT id, title, year
            FROM lib_tvs
            ORDER BY title
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    pub async fn get_tv_by_title(&self, title: &str) -> Result<Option<LibraryTvRecord>> {
        let record = sqlx::query_as::<_, LibraryTvRecord>(
            r#"
            SELECT id, title, year
            FROM lib_tvs
            WHERE title = ?
            "#,
        )
        .bind(title)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    /// Insert or refresh a show, returning its row id.
    pub async fn upsert_tv(&self, title: &str, year: Option<i64>) -> Result<i64> {
        let row: (i64,) = sqlx::query_as(
            r#"
            INSERT INTO lib_tvs (title, year) VALUES (?, ?)
            ON CONFLICT(title) DO UPDATE SET year = COALESCE(excluded.year, lib_tvs.year)
            RETURNING id
            "#,
        )
        .bind(title)
        .bind(year)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.0)
    }

    /// Delete a show and every season row under it.
    pub async fn delete_tv(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM lib_tv_seasons WHERE tv_id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        sqlx::query("DELETE FROM lib_tvs WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// All seasons of one show
    pub async fn list_seasons(&self, tv_id: i64) -> Result<Vec<LibrarySeasonRecord>> {
        let records = sqlx::query_as::<_, LibrarySeasonRecord>(
            r#"
            SELECT id, season, episodes
            FROM lib_tv_seasons
            WHERE tv_id = ?
            ORDER BY season
            "#,
        )
        .bind(tv_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    /// One season of a show looked up by show title, the reconciliation
    /// hot path.
    pub async fn get_season_by_title(
        &self,
        title: &str,
        season: i64,
    ) -> Result<Option<LibrarySeasonRecord>> {
        let record = sqlx::query_as::<_, LibrarySeasonRecord>(
            r#"
            SELECT s.id, s.season, s.episodes
            FROM lib_tv_seasons s
            JOIN lib_tvs t ON t.id = s.tv_id
            WHERE t.title = ? AND s.season = ?
            "#,
        )
        .bind(title)
        .bind(season)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    /// Replace (not merge) a season's owned-episode set.
    pub async fn upsert_season(&self, tv_id: i64, season: i64, episodes: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO lib_tv_seasons (tv_id, season, episodes) VALUES (?, ?, ?)
            ON CONFLICT(tv_id, season) DO UPDATE SET episodes = excluded.episodes
            "#,
        )
        .bind(tv_id)
        .bind(season)
        .bind(episodes)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn delete_season(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM lib_tv_seasons WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::Database;
    use std::collections::BTreeSet;

    #[tokio::test]
    async fn test_movie_insert_is_idempotent() {
        let db = Database::connect_in_memory().await.unwrap();
        let library = db.library();

        library.insert_movie("Hero", 2002).await.unwrap();
        library.insert_movie("Hero", 2002).await.unwrap();

        let movies = library.list_movies().await.unwrap();
        assert_eq!(movies.len(), 1);
        assert!(library.movie_exists("Hero", 2002).await.unwrap());
        assert!(!library.movie_exists("Hero", 2003).await.unwrap());
    }

    #[tokio::test]
    async fn test_tv_upsert_keeps_known_year() {
        let db = Database::connect_in_memory().await.unwrap();
        let library = db.library();

        let id = library.upsert_tv("Show", Some(2020)).await.unwrap();
        let again = library.upsert_tv("Show", None).await.unwrap();
        assert_eq!(id, again);

        let record = library.get_tv_by_title("Show").await.unwrap().unwrap();
        assert_eq!(record.year, Some(2020));
    }

    #[tokio::test]
    async fn test_season_replace_semantics() {
        let db = Database::connect_in_memory().await.unwrap();
        let library = db.library();

        let tv_id = library.upsert_tv("Show", Some(2020)).await.unwrap();
        library.upsert_season(tv_id, 1, "1,2,3").await.unwrap();
        library.upsert_season(tv_id, 1, "2,3").await.unwrap();

        let season = library
            .get_season_by_title("Show", 1)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(season.episode_set(), BTreeSet::from([2, 3]));
    }

    #[tokio::test]
    async fn test_delete_tv_drops_seasons() {
        let db = Database::connect_in_memory().await.unwrap();
        let library = db.library();

        let tv_id = library.upsert_tv("Show", None).await.unwrap();
        library.upsert_season(tv_id, 1, "1").await.unwrap();
        library.delete_tv(tv_id).await.unwrap();

        assert!(library.list_tvs().await.unwrap().is_empty());
        assert!(library.list_seasons(tv_id).await.unwrap().is_empty());
    }
}
