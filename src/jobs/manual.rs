//! Operator-driven search and grab
//!
//! The CLI surface for one-off requests. Shares the site driver and the
//! ranking primitives with the scheduled job, but never touches the
//! missing-episode ledger: what an operator pulls by hand is theirs to
//! reconcile.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::config::MediaKind;
use crate::services::ranker::{self, RankRequest, SearchCandidate};
use crate::site::SiteDriver;

/// One authenticated search pass, returning every candidate in both
/// resolution buckets for operator display. No episode gating: an operator
/// query has no anchor episode, so entries are filtered the way movie
/// results are regardless of which site answered.
pub async fn search_once(
    driver: &SiteDriver,
    title: &str,
    year: Option<i64>,
    preferred_resolution: &str,
    fallback_resolution: &str,
    exclude_keywords: &[String],
) -> Result<Vec<SearchCandidate>> {
    let session = driver.ensure_authenticated().await?;
    info!(job = "manual", site = %driver.profile().kind, title, "searching");
    let html = driver.search(&session, title).await?;

    let request = RankRequest {
        kind: MediaKind::Movie,
        title,
        year,
        exclude_keywords,
        preferred_resolution,
        fallback_resolution,
        episode_hint: None,
    };
    let candidates = ranker::rank_inclusive(&html, &request);
    info!(
        job = "manual",
        title,
        results = candidates.len(),
        "search complete"
    );
    Ok(candidates)
}

/// Fetch an operator-chosen detail page and land every attachment it
/// lists, in order. The first failed transfer aborts the grab; the error
/// names whatever already landed.
pub async fn grab(driver: &SiteDriver, link: &str, dest_dir: &Path) -> Result<Vec<PathBuf>> {
    let session = driver.ensure_authenticated().await?;
    let (_, links) = driver.fetch_detail(&session, link).await?;
    if links.is_empty() {
        warn!(job = "manual", link, "no download links on detail page");
        return Ok(Vec::new());
    }

    let mut landed = Vec::with_capacity(links.len());
    for attachment in &links {
        let outcome = driver
            .download(&session, attachment, dest_dir)
            .await
            .with_context(|| abort_report(&landed, links.len()))?;
        info!(
            job = "manual",
            file = %outcome.path.display(),
            "attachment downloaded"
        );
        landed.push(outcome.path);
    }
    Ok(landed)
}

/// Error context for an aborted grab, naming the files that already landed.
fn abort_report(landed: &[PathBuf], total: usize) -> String {
    if landed.is_empty() {
        return format!("grab aborted before any of {total} attachments landed");
    }
    let kept = landed
        .iter()
        .filter_map(|path| path.file_name())
        .map(|name| name.to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "grab aborted with {} of {total} attachments landed: {kept}",
        landed.len()
    )
}
