//! Scheduled acquisition job
//!
//! Works the missing-episode ledger title by title against the configured
//! resource sites: authenticate, search, rank, download, then fold each
//! confirmed download back into the ledger before moving on. A failure
//! abandons the current title until the next scheduled run; nothing is
//! committed for it. There is no in-process retry.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use tracing::{debug, error, info, warn};

use crate::config::{Config, MediaKind, SiteProfile};
use crate::db::{Database, MissingMovieRecord, MissingTvRecord};
use crate::error::HuntError;
use crate::reconcile::ReconciliationStore;
use crate::services::ranker::{self, EpisodeRange, RankRequest};
use crate::site::{SessionStore, SiteDriver};

/// Counters for one acquisition pass.
#[derive(Debug, Default, Clone, Copy)]
pub struct RunStats {
    pub searched: u64,
    pub downloaded: u64,
    pub satisfied: u64,
    pub skipped: u64,
    pub failed: u64,
}

/// Drives search and download for every outstanding ledger row.
pub struct AcquisitionOrchestrator {
    db: Database,
    store: ReconciliationStore,
    movie_driver: Option<SiteDriver>,
    tv_driver: Option<SiteDriver>,
    torrent_dir: PathBuf,
    preferred_resolution: String,
    fallback_resolution: String,
    exclude_keywords: Vec<String>,
}

impl AcquisitionOrchestrator {
    pub fn new(config: &Config, db: Database) -> Result<Self> {
        let timeout = Duration::from_secs(config.http_timeout_secs);
        let build = |profile: &SiteProfile| {
            SiteDriver::new(
                profile.clone(),
                SessionStore::new(&config.session_cache_dir),
                timeout,
            )
        };
        let movie_driver = config.movie_site.as_ref().map(&build).transpose()?;
        let tv_driver = config.tv_site.as_ref().map(&build).transpose()?;

        Ok(Self {
            store: ReconciliationStore::new(db.clone()),
            db,
            movie_driver,
            tv_driver,
            torrent_dir: PathBuf::from(&config.torrent_dir),
            preferred_resolution: config.preferred_resolution.clone(),
            fallback_resolution: config.fallback_resolution.clone(),
            exclude_keywords: config.exclude_keywords.clone(),
        })
    }

    /// One full pass over the ledger: seasons first, then movies.
    pub async fn run(&self) -> Result<RunStats> {
        let mut stats = RunStats::default();
        self.acquire_seasons(&mut stats).await?;
        self.acquire_movies(&mut stats).await?;

        info!(
            job = "acquisition",
            searched = stats.searched,
            downloaded = stats.downloaded,
            satisfied = stats.satisfied,
            skipped = stats.skipped,
            failed = stats.failed,
            "acquisition pass complete"
        );
        Ok(stats)
    }

    async fn acquire_seasons(&self, stats: &mut RunStats) -> Result<()> {
        let Some(driver) = &self.tv_driver else {
            debug!(job = "acquisition", "no TV site configured");
            return Ok(());
        };
        let records = self.db.missing().list_tvs().await?;
        if records.is_empty() {
            debug!(job = "acquisition", "no seasons outstanding");
            return Ok(());
        }

        info!(job = "acquisition", outstanding = records.len(), "hunting missing seasons");
        for record in records {
            if let Err(error) = self.hunt_season(driver, &record, stats).await {
                let category = categorize(&error);
                error!(
                    job = "acquisition",
                    title = %record.title,
                    season = record.season,
                    category,
                    error = %error,
                    "season acquisition failed"
                );
                stats.failed += 1;
                if category == "auth" {
                    warn!(
                        job = "acquisition",
                        site = "tv",
                        "authentication unavailable, abandoning site for this run"
                    );
                    break;
                }
            }
        }
        Ok(())
    }

    /// Chase one season's missing set until it is satisfied or something
    /// fails. Each successful download is committed before the next search
    /// so the anchor always reflects the remaining gap.
    async fn hunt_season(
        &self,
        driver: &SiteDriver,
        record: &MissingTvRecord,
        stats: &mut RunStats,
    ) -> Result<()> {
        let mut missing = record.episode_set();
        if missing.is_empty() {
            debug!(
                job = "acquisition",
                title = %record.title,
                season = record.season,
                "ledger row has no episodes"
            );
            return Ok(());
        }

        let session = driver.ensure_authenticated().await?;

        while let Some(anchor) = missing.iter().next().copied() {
            info!(
                job = "acquisition",
                title = %record.title,
                season = record.season,
                episode = anchor,
                "searching"
            );
            stats.searched += 1;
            let html = driver.search(&session, &record.title).await?;

            let request = RankRequest {
                kind: MediaKind::Tv,
                title: &record.title,
                year: None,
                exclude_keywords: &self.exclude_keywords,
                preferred_resolution: &self.preferred_resolution,
                fallback_resolution: &self.fallback_resolution,
                episode_hint: Some(anchor),
            };
            let candidates = ranker::rank(&html, &request);
            let Some(winner) = ranker::select_widest(&candidates) else {
                info!(
                    job = "acquisition",
                    title = %record.title,
                    season = record.season,
                    episode = anchor,
                    "no matching release, moving on"
                );
                stats.skipped += 1;
                return Ok(());
            };
            let range = winner.episode_range.unwrap_or(EpisodeRange::single(anchor));
            debug!(
                job = "acquisition",
                release = %winner.title,
                start = range.start,
                end = range.end,
                complete = range.complete,
                size_gb = ?winner.size_gb,
                "selected release"
            );

            let (_, links) = driver.fetch_detail(&session, &winner.link).await?;
            let Some(link) = links.first() else {
                warn!(
                    job = "acquisition",
                    release = %winner.title,
                    "no download links on detail page, abandoning title"
                );
                stats.skipped += 1;
                return Ok(());
            };

            let outcome = driver.download(&session, link, &self.torrent_dir).await?;
            stats.downloaded += 1;
            info!(
                job = "acquisition",
                title = %record.title,
                season = record.season,
                start = range.start,
                end = range.end,
                file = %outcome.path.display(),
                "episodes acquired"
            );

            missing = self
                .store
                .apply_series_download(&record.title, record.season, range)
                .await?;
            if missing.is_empty() {
                info!(
                    job = "acquisition",
                    title = %record.title,
                    season = record.season,
                    "season complete"
                );
                stats.satisfied += 1;
            }
        }

        Ok(())
    }

    async fn acquire_movies(&self, stats: &mut RunStats) -> Result<()> {
        let Some(driver) = &self.movie_driver else {
            debug!(job = "acquisition", "no movie site configured");
            return Ok(());
        };
        let records = self.db.missing().list_movies().await?;
        if records.is_empty() {
            debug!(job = "acquisition", "no movies outstanding");
            return Ok(());
        }

        info!(job = "acquisition", outstanding = records.len(), "hunting missing movies");
        for record in records {
            if let Err(error) = self.hunt_movie(driver, &record, stats).await {
                let category = categorize(&error);
                error!(
                    job = "acquisition",
                    title = %record.title,
                    year = record.year,
                    category,
                    error = %error,
                    "movie acquisition failed"
                );
                stats.failed += 1;
                if category == "auth" {
                    warn!(
                        job = "acquisition",
                        site = "movie",
                        "authentication unavailable, abandoning site for this run"
                    );
                    break;
                }
            }
        }
        Ok(())
    }

    /// One movie needs exactly one successful download; candidates and
    /// their links are tried in rank order until one lands.
    async fn hunt_movie(
        &self,
        driver: &SiteDriver,
        record: &MissingMovieRecord,
        stats: &mut RunStats,
    ) -> Result<()> {
        let session = driver.ensure_authenticated().await?;

        info!(job = "acquisition", title = %record.title, year = record.year, "searching");
        stats.searched += 1;
        let html = driver.search(&session, &record.title).await?;

        let request = RankRequest {
            kind: MediaKind::Movie,
            title: &record.title,
            year: Some(record.year),
            exclude_keywords: &self.exclude_keywords,
            preferred_resolution: &self.preferred_resolution,
            fallback_resolution: &self.fallback_resolution,
            episode_hint: None,
        };
        let candidates = ranker::rank(&html, &request);
        if candidates.is_empty() {
            info!(
                job = "acquisition",
                title = %record.title,
                year = record.year,
                "no matching release, moving on"
            );
            stats.skipped += 1;
            return Ok(());
        }

        for candidate in &candidates {
            debug!(
                job = "acquisition",
                release = %candidate.title,
                year = ?candidate.year,
                "trying ranked result"
            );
            let links = match driver.fetch_detail(&session, &candidate.link).await {
                Ok((_, links)) => links,
                Err(error) => {
                    warn!(
                        job = "acquisition",
                        release = %candidate.title,
                        error = %error,
                        "detail page fetch failed, trying next result"
                    );
                    continue;
                }
            };
            if links.is_empty() {
                warn!(
                    job = "acquisition",
                    release = %candidate.title,
                    "no download links on detail page"
                );
                continue;
            }

            for link in &links {
                match driver.download(&session, link, &self.torrent_dir).await {
                    Ok(outcome) => {
                        stats.downloaded += 1;
                        stats.satisfied += 1;
                        info!(
                            job = "acquisition",
                            title = %record.title,
                            year = record.year,
                            file = %outcome.path.display(),
                            "movie acquired"
                        );
                        self.store
                            .apply_movie_download(&record.title, record.year)
                            .await?;
                        return Ok(());
                    }
                    Err(error) => {
                        warn!(
                            job = "acquisition",
                            url = %link.url,
                            error = %error,
                            "download failed, trying next link"
                        );
                    }
                }
            }
        }

        info!(
            job = "acquisition",
            title = %record.title,
            year = record.year,
            "no candidate produced a download"
        );
        stats.skipped += 1;
        Ok(())
    }
}

/// Error-taxonomy bucket for log records; opaque wrapper errors count as
/// internal.
fn categorize(error: &anyhow::Error) -> &'static str {
    error
        .downcast_ref::<HuntError>()
        .map(HuntError::category)
        .unwrap_or("internal")
}
