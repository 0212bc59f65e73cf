//! Library scanner service
//!
//! Walks the movie and TV library roots, parses media filenames, and
//! rebuilds the library inventory tables so they mirror what is actually
//! on disk. The scan is the source of truth: episode sets are replaced,
//! not merged, and rows with no backing file are pruned. A root that
//! cannot be reached skips the pass instead of reading as empty.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use anyhow::Result;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::db::episode_set::join_episode_set;
use crate::db::Database;

/// Video file extensions we recognize
const VIDEO_EXTENSIONS: &[&str] = &["mkv", "mp4"];

/// `Title - (Year) 1080p.mkv`
static MOVIE_FILE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(.+) - \((\d{4})\) \d+p\.(?:mkv|mp4)$").unwrap());

/// `Show - S01E03 - Episode Title.mkv`
static EPISODE_FILE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(.+) - S(\d+)E(\d+) - .+\.(?:mkv|mp4)$").unwrap());

/// `Show (2022)` directory names carry the year the episode files drop.
static SHOW_DIR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(.+?)\s+\((\d{4})\)").unwrap());

/// What one scan pass changed.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ScanSummary {
    pub movies_added: u64,
    pub movies_removed: u64,
    pub shows_added: u64,
    pub shows_removed: u64,
    pub seasons_updated: u64,
    pub seasons_removed: u64,
}

impl ScanSummary {
    pub fn is_unchanged(&self) -> bool {
        *self == Self::default()
    }
}

/// Everything one walk over the roots observed.
#[derive(Debug, Default)]
struct LibraryInventory {
    movies: BTreeSet<(String, i64)>,
    /// show title -> season -> episode numbers
    shows: BTreeMap<String, BTreeMap<i64, BTreeSet<u32>>>,
    /// Years parsed from top-level show directory names.
    show_years: BTreeMap<String, i64>,
}

/// Scanner for the on-disk media libraries.
pub struct LibraryScanner {
    db: Database,
    movie_root: PathBuf,
    tv_root: PathBuf,
}

impl LibraryScanner {
    pub fn new(db: Database, movie_root: impl Into<PathBuf>, tv_root: impl Into<PathBuf>) -> Self {
        Self {
            db,
            movie_root: movie_root.into(),
            tv_root: tv_root.into(),
        }
    }

    /// Walk both roots and reconcile the inventory tables with what is on
    /// disk. Re-running over an unchanged tree performs no row mutations;
    /// if either root is unreachable the pass is skipped and every table
    /// stays untouched.
    pub async fn scan(&self) -> Result<ScanSummary> {
        info!(
            movie_root = %self.movie_root.display(),
            tv_root = %self.tv_root.display(),
            "starting library scan"
        );

        for root in [&self.movie_root, &self.tv_root] {
            if !root.is_dir() {
                warn!(path = %root.display(), "library root unreachable, scan skipped");
                return Ok(ScanSummary::default());
            }
        }

        let mut inventory = LibraryInventory::default();
        // Movies count only under the movie root; stray episode files in
        // either root still belong to their show.
        collect_tree(&self.movie_root, true, &mut inventory);
        collect_tree(&self.tv_root, false, &mut inventory);
        collect_show_years(&self.tv_root, &mut inventory);

        let mut summary = ScanSummary::default();
        self.sync_movies(&inventory, &mut summary).await?;
        self.sync_shows(&inventory, &mut summary).await?;
        self.prune_shows(&inventory, &mut summary).await?;

        if summary.is_unchanged() {
            debug!("library scan found no changes");
        } else {
            info!(
                movies_added = summary.movies_added,
                movies_removed = summary.movies_removed,
                shows_added = summary.shows_added,
                shows_removed = summary.shows_removed,
                seasons_updated = summary.seasons_updated,
                seasons_removed = summary.seasons_removed,
                "library scan completed"
            );
        }
        Ok(summary)
    }

    async fn sync_movies(&self, inventory: &LibraryInventory, summary: &mut ScanSummary) -> Result<()> {
        let library = self.db.library();

        for (title, year) in &inventory.movies {
            if library.movie_exists(title, *year).await? {
                debug!(title = %title, year = year, "movie already tracked");
                continue;
            }
            library.insert_movie(title, *year).await?;
            info!(title = %title, year = year, "movie added to library");
            summary.movies_added += 1;
        }

        for record in library.list_movies().await? {
            if !inventory.movies.contains(&(record.title.clone(), record.year)) {
                library.delete_movie(record.id).await?;
                info!(title = %record.title, year = record.year, "movie removed from library");
                summary.movies_removed += 1;
            }
        }

        Ok(())
    }

    async fn sync_shows(&self, inventory: &LibraryInventory, summary: &mut ScanSummary) -> Result<()> {
        let library = self.db.library();

        for (title, seasons) in &inventory.shows {
            let year = inventory.show_years.get(title).copied();
            let known = library.get_tv_by_title(title).await?;
            let needs_year = match &known {
                Some(record) => year.is_some() && record.year != year,
                None => true,
            };
            let tv_id = if known.is_none() || needs_year {
                library.upsert_tv(title, year).await?
            } else {
                known.as_ref().map(|record| record.id).unwrap_or_default()
            };
            if known.is_none() {
                info!(title = %title, "show added to library");
                summary.shows_added += 1;
            }

            let existing: BTreeMap<i64, _> = library
                .list_seasons(tv_id)
                .await?
                .into_iter()
                .map(|record| (record.season, record))
                .collect();

            for (season, episodes) in seasons {
                match existing.get(season) {
                    Some(record) if record.episode_set() == *episodes => {
                        debug!(title = %title, season = season, "season unchanged");
                    }
                    _ => {
                        let joined = join_episode_set(episodes);
                        library.upsert_season(tv_id, *season, &joined).await?;
                        info!(title = %title, season = season, episodes = %joined, "season updated");
                        summary.seasons_updated += 1;
                    }
                }
            }

            for (season, record) in &existing {
                if !seasons.contains_key(season) {
                    library.delete_season(record.id).await?;
                    info!(title = %title, season = season, "season removed from library");
                    summary.seasons_removed += 1;
                }
            }
        }

        Ok(())
    }

    async fn prune_shows(&self, inventory: &LibraryInventory, summary: &mut ScanSummary) -> Result<()> {
        let library = self.db.library();

        for record in library.list_tvs().await? {
            if !inventory.shows.contains_key(&record.title) {
                library.delete_tv(record.id).await?;
                info!(title = %record.title, "show removed from library");
                summary.shows_removed += 1;
            }
        }

        Ok(())
    }
}

/// Walk one root, filing every recognized media file into the inventory.
fn collect_tree(root: &Path, collect_movies: bool, inventory: &mut LibraryInventory) {
    if !root.exists() {
        warn!(path = %root.display(), "library root does not exist");
        return;
    }

    for entry in WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            continue;
        };
        if !VIDEO_EXTENSIONS.contains(&ext.to_lowercase().as_str()) {
            continue;
        }
        let Some(filename) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };

        if let Some((show, season, episode)) = parse_episode_filename(filename) {
            inventory
                .shows
                .entry(show)
                .or_default()
                .entry(season)
                .or_default()
                .insert(episode);
            continue;
        }
        if collect_movies
            && let Some((title, year)) = parse_movie_filename(filename)
        {
            inventory.movies.insert((title, year));
        }
    }
}

/// Top-level show directories are the only place the year appears.
fn collect_show_years(tv_root: &Path, inventory: &mut LibraryInventory) {
    if !tv_root.exists() {
        return;
    }

    for entry in WalkDir::new(tv_root)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        if !entry.path().is_dir() {
            continue;
        }
        let Some(name) = entry.file_name().to_str() else {
            continue;
        };
        if let Some((title, year)) = parse_show_dirname(name) {
            inventory.show_years.insert(title, year);
        }
    }
}

pub fn parse_movie_filename(filename: &str) -> Option<(String, i64)> {
    let caps = MOVIE_FILE_RE.captures(filename)?;
    let title = caps.get(1)?.as_str().trim().to_string();
    let year = caps.get(2)?.as_str().parse().ok()?;
    Some((title, year))
}

pub fn parse_episode_filename(filename: &str) -> Option<(String, i64, u32)> {
    let caps = EPISODE_FILE_RE.captures(filename)?;
    let show = caps.get(1)?.as_str().trim().to_string();
    let season = caps.get(2)?.as_str().parse().ok()?;
    let episode = caps.get(3)?.as_str().parse().ok()?;
    Some((show, season, episode))
}

pub fn parse_show_dirname(name: &str) -> Option<(String, i64)> {
    let caps = SHOW_DIR_RE.captures(name)?;
    let title = caps.get(1)?.as_str().trim().to_string();
    let year = caps.get(2)?.as_str().parse().ok()?;
    Some((title, year))
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;
    use crate::db::episode_set::parse_episode_set;
    use crate::reconcile::ReconciliationStore;

    #[test]
    fn test_parse_movie_filename() {
        assert_eq!(
            parse_movie_filename("Interstellar - (2014) 2160p.mkv"),
            Some(("Interstellar".to_string(), 2014))
        );
        assert_eq!(
            parse_movie_filename("interstellar - (2014) 1080P.MP4"),
            Some(("interstellar".to_string(), 2014))
        );
        assert_eq!(parse_movie_filename("Interstellar (2014).mkv"), None);
        assert_eq!(parse_movie_filename("Interstellar - (2014) 2160p.avi"), None);
    }

    #[test]
    fn test_parse_episode_filename() {
        assert_eq!(
            parse_episode_filename("Severance - S01E03 - In Perpetuity.mkv"),
            Some(("Severance".to_string(), 1, 3))
        );
        assert_eq!(
            parse_episode_filename("severance - s01e03 - x.mp4"),
            Some(("severance".to_string(), 1, 3))
        );
        assert_eq!(parse_episode_filename("Severance S01E03.mkv"), None);
    }

    #[test]
    fn test_parse_show_dirname() {
        assert_eq!(
            parse_show_dirname("Severance (2022)"),
            Some(("Severance".to_string(), 2022))
        );
        assert_eq!(parse_show_dirname("Severance"), None);
    }

    struct Tree {
        _dir: TempDir,
        movie_root: PathBuf,
        tv_root: PathBuf,
    }

    fn seed_tree() -> Tree {
        let dir = TempDir::new().unwrap();
        let movie_root = dir.path().join("Movie");
        let tv_root = dir.path().join("TV");

        let movie_dir = movie_root.join("Interstellar - (2014)");
        fs::create_dir_all(&movie_dir).unwrap();
        fs::write(movie_dir.join("Interstellar - (2014) 2160p.mkv"), b"").unwrap();

        let season_dir = tv_root.join("Severance (2022)").join("Season 01");
        fs::create_dir_all(&season_dir).unwrap();
        fs::write(season_dir.join("Severance - S01E01 - Good News About Hell.mkv"), b"").unwrap();
        fs::write(season_dir.join("Severance - S01E02 - Half Loop.mkv"), b"").unwrap();
        fs::write(season_dir.join("notes.txt"), b"").unwrap();

        Tree {
            _dir: dir,
            movie_root,
            tv_root,
        }
    }

    #[tokio::test]
    async fn test_scan_populates_inventory() {
        let db = Database::connect_in_memory().await.unwrap();
        let tree = seed_tree();
        let scanner = LibraryScanner::new(db.clone(), &tree.movie_root, &tree.tv_root);

        let summary = scanner.scan().await.unwrap();
        assert_eq!(summary.movies_added, 1);
        assert_eq!(summary.shows_added, 1);
        assert_eq!(summary.seasons_updated, 1);

        let library = db.library();
        assert!(library.movie_exists("Interstellar", 2014).await.unwrap());
        let show = library.get_tv_by_title("Severance").await.unwrap().unwrap();
        assert_eq!(show.year, Some(2022));
        let season = library
            .get_season_by_title("Severance", 1)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(season.episode_set(), parse_episode_set("1,2"));
    }

    #[tokio::test]
    async fn test_rescan_is_idempotent() {
        let db = Database::connect_in_memory().await.unwrap();
        let tree = seed_tree();
        let scanner = LibraryScanner::new(db, &tree.movie_root, &tree.tv_root);

        scanner.scan().await.unwrap();
        let second = scanner.scan().await.unwrap();
        assert!(second.is_unchanged());
    }

    #[tokio::test]
    async fn test_scan_prunes_vanished_files() {
        let db = Database::connect_in_memory().await.unwrap();
        let tree = seed_tree();
        let scanner = LibraryScanner::new(db.clone(), &tree.movie_root, &tree.tv_root);
        scanner.scan().await.unwrap();

        fs::remove_dir_all(tree.movie_root.join("Interstellar - (2014)")).unwrap();
        fs::remove_file(
            tree.tv_root
                .join("Severance (2022)")
                .join("Season 01")
                .join("Severance - S01E02 - Half Loop.mkv"),
        )
        .unwrap();

        let summary = scanner.scan().await.unwrap();
        assert_eq!(summary.movies_removed, 1);
        assert_eq!(summary.seasons_updated, 1);

        let library = db.library();
        assert!(!library.movie_exists("Interstellar", 2014).await.unwrap());
        let season = library
            .get_season_by_title("Severance", 1)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(season.episode_set(), parse_episode_set("1"));
    }

    #[tokio::test]
    async fn test_scan_prunes_vanished_show() {
        let db = Database::connect_in_memory().await.unwrap();
        let tree = seed_tree();
        let scanner = LibraryScanner::new(db.clone(), &tree.movie_root, &tree.tv_root);
        scanner.scan().await.unwrap();

        fs::remove_dir_all(tree.tv_root.join("Severance (2022)")).unwrap();

        let summary = scanner.scan().await.unwrap();
        assert_eq!(summary.shows_removed, 1);
        assert!(db.library().get_tv_by_title("Severance").await.unwrap().is_none());
        assert!(db.library().list_tvs().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_stray_episode_in_movie_root_counts() {
        let db = Database::connect_in_memory().await.unwrap();
        let tree = seed_tree();
        fs::write(
            tree.movie_root.join("Severance - S02E01 - Hello, Ms. Cobel.mkv"),
            b"",
        )
        .unwrap();
        let scanner = LibraryScanner::new(db.clone(), &tree.movie_root, &tree.tv_root);

        scanner.scan().await.unwrap();
        let season = db
            .library()
            .get_season_by_title("Severance", 2)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(season.episode_set(), parse_episode_set("1"));
    }

    #[tokio::test]
    async fn test_unreachable_roots_leave_library_untouched() {
        let db = Database::connect_in_memory().await.unwrap();
        let tree = seed_tree();
        let scanner = LibraryScanner::new(db.clone(), &tree.movie_root, &tree.tv_root);
        scanner.scan().await.unwrap();

        let gone = LibraryScanner::new(db.clone(), "/nonexistent/movie", "/nonexistent/tv");
        let summary = gone.scan().await.unwrap();
        assert!(summary.is_unchanged());

        assert!(db.library().movie_exists("Interstellar", 2014).await.unwrap());
        let season = db
            .library()
            .get_season_by_title("Severance", 1)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(season.episode_set(), parse_episode_set("1,2"));
    }

    #[tokio::test]
    async fn test_unreachable_root_does_not_resubscribe_owned_seasons() {
        let db = Database::connect_in_memory().await.unwrap();
        let tree = seed_tree();
        let scanner = LibraryScanner::new(db.clone(), &tree.movie_root, &tree.tv_root);
        scanner.scan().await.unwrap();

        db.wanted().add_tv("Severance", 1, Some(2), None).await.unwrap();
        let reconciler = ReconciliationStore::new(db.clone());
        reconciler.run().await.unwrap();
        assert!(db.missing().list_tvs().await.unwrap().is_empty());

        // One root falling off must not surface owned episodes as gaps.
        let gone = LibraryScanner::new(db.clone(), &tree.movie_root, "/nonexistent/tv");
        gone.scan().await.unwrap();
        reconciler.run().await.unwrap();
        assert!(db.missing().list_tvs().await.unwrap().is_empty());
    }
}
