//! Wanted-versus-library reconciliation
//!
//! Keeps the missing-episode ledger in step with two inputs it does not
//! own: the subscription wishlist and the library inventory. New gaps are
//! subscribed, gaps the library has since filled are shrunk or retired,
//! and confirmed downloads are folded in as they land. The library is
//! always authoritative: a ledger row never claims an episode the library
//! already owns.

use std::collections::BTreeSet;

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::db::Database;
use crate::db::episode_set::{full_episode_range, join_episode_set};
use crate::services::ranker::EpisodeRange;

/// How a declared season compares against what the library owns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeasonDiff {
    Complete,
    Missing(BTreeSet<u32>),
    /// The library owns episodes outside the declared range. Usually a
    /// wrong episode count upstream; flagged instead of guessed at.
    Inconsistent { stray_episodes: BTreeSet<u32> },
}

/// Compare a declared episode count against the owned set.
pub fn derive_season_diff(total_episodes: u32, owned: &BTreeSet<u32>) -> SeasonDiff {
    let declared = full_episode_range(total_episodes);
    let stray: BTreeSet<u32> = owned.difference(&declared).copied().collect();
    if !stray.is_empty() {
        return SeasonDiff::Inconsistent {
            stray_episodes: stray,
        };
    }

    let missing: BTreeSet<u32> = declared.difference(owned).copied().collect();
    if missing.is_empty() {
        SeasonDiff::Complete
    } else {
        SeasonDiff::Missing(missing)
    }
}

/// What one reconciliation pass changed.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub movies_subscribed: u64,
    pub seasons_subscribed: u64,
    pub inconsistent_seasons: u64,
    pub movies_completed: u64,
    pub seasons_completed: u64,
    pub seasons_updated: u64,
}

impl ReconcileSummary {
    pub fn is_unchanged(&self) -> bool {
        *self == Self::default()
    }

    fn merge(&mut self, other: ReconcileSummary) {
        self.movies_subscribed += other.movies_subscribed;
        self.seasons_subscribed += other.seasons_subscribed;
        self.inconsistent_seasons += other.inconsistent_seasons;
        self.movies_completed += other.movies_completed;
        self.seasons_completed += other.seasons_completed;
        self.seasons_updated += other.seasons_updated;
    }
}

/// Owner of the missing-episode ledger.
#[derive(Clone)]
pub struct ReconciliationStore {
    db: Database,
}

impl ReconciliationStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Full pass: subscribe new gaps, then fold current library truth back
    /// into the ledger. Idempotent for unchanged inputs.
    pub async fn run(&self) -> Result<ReconcileSummary> {
        let mut summary = self.diff_wanted_against_library().await?;
        summary.merge(self.reconcile_with_library().await?);

        if summary.is_unchanged() {
            debug!("reconciliation made no changes");
        } else {
            info!(
                movies_subscribed = summary.movies_subscribed,
                seasons_subscribed = summary.seasons_subscribed,
                inconsistent_seasons = summary.inconsistent_seasons,
                movies_completed = summary.movies_completed,
                seasons_completed = summary.seasons_completed,
                seasons_updated = summary.seasons_updated,
                "reconciliation completed"
            );
        }
        Ok(summary)
    }

    /// Create ledger rows for wanted titles the library lacks.
    pub async fn diff_wanted_against_library(&self) -> Result<ReconcileSummary> {
        let mut summary = ReconcileSummary::default();
        self.subscribe_movies(&mut summary).await?;
        self.subscribe_seasons(&mut summary).await?;
        Ok(summary)
    }

    /// Re-derive ledger rows from current library truth, shrinking or
    /// retiring rows whose episodes have since appeared on disk.
    pub async fn reconcile_with_library(&self) -> Result<ReconcileSummary> {
        let mut summary = ReconcileSummary::default();
        self.retire_satisfied_movies(&mut summary).await?;
        self.shrink_season_records(&mut summary).await?;
        Ok(summary)
    }

    async fn subscribe_movies(&self, summary: &mut ReconcileSummary) -> Result<()> {
        let wanted = self.db.wanted();
        let library = self.db.library();
        let missing = self.db.missing();

        for record in wanted.list_movies().await? {
            if library.movie_exists(&record.title, record.year).await? {
                debug!(title = %record.title, year = record.year, "movie already in library");
                continue;
            }
            if missing.get_movie(&record.title, record.year).await?.is_some() {
                debug!(title = %record.title, year = record.year, "movie already subscribed");
                continue;
            }
            missing.insert_movie(&record.title, record.year).await?;
            info!(title = %record.title, year = record.year, "movie subscription added");
            summary.movies_subscribed += 1;
        }

        Ok(())
    }

    async fn subscribe_seasons(&self, summary: &mut ReconcileSummary) -> Result<()> {
        let wanted = self.db.wanted();
        let library = self.db.library();
        let missing = self.db.missing();

        for record in wanted.list_tvs().await? {
            let total = match record.total_episodes.map(u32::try_from) {
                Some(Ok(total)) if total > 0 => total,
                _ => {
                    warn!(
                        title = %record.title,
                        season = record.season,
                        "subscription lacks a usable episode count, skipping"
                    );
                    continue;
                }
            };

            let owned = match library
                .get_season_by_title(&record.title, record.season)
                .await?
            {
                Some(season) => season.episode_set(),
                None => BTreeSet::new(),
            };

            match derive_season_diff(total, &owned) {
                SeasonDiff::Inconsistent { stray_episodes } => {
                    warn!(
                        title = %record.title,
                        season = record.season,
                        total = total,
                        stray = %join_episode_set(&stray_episodes),
                        "library owns episodes outside the declared range"
                    );
                    summary.inconsistent_seasons += 1;
                }
                SeasonDiff::Complete => {
                    debug!(title = %record.title, season = record.season, "season already in library");
                }
                SeasonDiff::Missing(episodes) => {
                    if missing
                        .get_tv(&record.title, record.season)
                        .await?
                        .is_some()
                    {
                        debug!(title = %record.title, season = record.season, "season already subscribed");
                        continue;
                    }
                    let joined = join_episode_set(&episodes);
                    missing.insert_tv(&record.title, record.season, &joined).await?;
                    info!(
                        title = %record.title,
                        season = record.season,
                        missing = %joined,
                        "season subscription added"
                    );
                    summary.seasons_subscribed += 1;
                }
            }
        }

        Ok(())
    }

    async fn retire_satisfied_movies(&self, summary: &mut ReconcileSummary) -> Result<()> {
        let library = self.db.library();
        let missing = self.db.missing();

        for record in missing.list_movies().await? {
            if library.movie_exists(&record.title, record.year).await? {
                missing.delete_movie(record.id).await?;
                info!(title = %record.title, year = record.year, "movie subscription satisfied");
                summary.movies_completed += 1;
            }
        }

        Ok(())
    }

    async fn shrink_season_records(&self, summary: &mut ReconcileSummary) -> Result<()> {
        let library = self.db.library();
        let missing = self.db.missing();

        for record in missing.list_tvs().await? {
            let Some(season) = library
                .get_season_by_title(&record.title, record.season)
                .await?
            else {
                debug!(title = %record.title, season = record.season, "library has no episodes yet");
                continue;
            };

            let owned = season.episode_set();
            let before = record.episode_set();
            let remaining: BTreeSet<u32> = before.difference(&owned).copied().collect();

            if remaining.is_empty() {
                missing.delete_tv(record.id).await?;
                info!(title = %record.title, season = record.season, "season subscription satisfied");
                summary.seasons_completed += 1;
            } else if remaining != before {
                let joined = join_episode_set(&remaining);
                missing.update_tv_episodes(record.id, &joined).await?;
                info!(
                    title = %record.title,
                    season = record.season,
                    missing = %joined,
                    "season subscription updated from library"
                );
                summary.seasons_updated += 1;
            } else {
                debug!(title = %record.title, season = record.season, "season subscription unchanged");
            }
        }

        Ok(())
    }

    /// Fold a confirmed download into a season's ledger row. Returns the
    /// episodes still missing; an empty set means the row was retired.
    pub async fn apply_series_download(
        &self,
        title: &str,
        season: i64,
        range: EpisodeRange,
    ) -> Result<BTreeSet<u32>> {
        let missing = self.db.missing();
        let Some(record) = missing.get_tv(title, season).await? else {
            warn!(title = %title, season = season, "no outstanding subscription for downloaded season");
            return Ok(BTreeSet::new());
        };

        let before = record.episode_set();
        let remaining: BTreeSet<u32> = before
            .iter()
            .copied()
            .filter(|episode| !range.contains(*episode))
            .collect();

        if remaining.is_empty() {
            missing.delete_tv(record.id).await?;
            info!(
                title = %title,
                season = season,
                start = range.start,
                end = range.end,
                "season subscription satisfied"
            );
        } else if remaining != before {
            let joined = join_episode_set(&remaining);
            missing.update_tv_episodes(record.id, &joined).await?;
            info!(
                title = %title,
                season = season,
                start = range.start,
                end = range.end,
                missing = %joined,
                "recorded downloaded episodes"
            );
        } else {
            debug!(
                title = %title,
                season = season,
                "downloaded range did not overlap the missing set"
            );
        }

        Ok(remaining)
    }

    /// A movie subscription is satisfied entirely by its first successful
    /// download.
    pub async fn apply_movie_download(&self, title: &str, year: i64) -> Result<()> {
        let missing = self.db.missing();
        if let Some(record) = missing.get_movie(title, year).await? {
            missing.delete_movie(record.id).await?;
            info!(title = %title, year = year, "movie subscription satisfied");
        }
        Ok(())
    }
}
