//! Search-result ranking.
//!
//! A pure pass over one forum results page: parse the listing entries, drop
//! everything that cannot be the wanted title, then hand back the best
//! resolution bucket. No network, no state; the orchestrator feeds it raw
//! HTML and picks a winner from what survives.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};

use crate::config::MediaKind;

static LISTING_ITEM: Lazy<Selector> = Lazy::new(|| Selector::parse("li.pbw").unwrap());
static LISTING_LINK: Lazy<Selector> = Lazy::new(|| Selector::parse("h3.xs3 a").unwrap());

/// `第a-b集` / `第a,b集` / `第n集` (episode descriptor) or `全N集` (complete
/// season). Two digits are all the sites ever use.
static EPISODE_DESCRIPTOR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:第(\d{1,2}-\d{1,2}|\d{1,2},\d{1,2}|\d{1,2})集|全(\d{1,2})集)").unwrap()
});

static FILE_SIZE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+(?:\.\d+)?)\s*(GB|MB)").unwrap());

static YEAR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(19|20)\d{2}\b").unwrap());

/// Episode span a release claims to contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EpisodeRange {
    pub start: u32,
    pub end: u32,
    /// True for `全N集` releases that declare a whole season.
    pub complete: bool,
}

impl EpisodeRange {
    pub fn single(episode: u32) -> Self {
        Self {
            start: episode,
            end: episode,
            complete: false,
        }
    }

    pub fn width(&self) -> u32 {
        self.end - self.start
    }

    pub fn contains(&self, episode: u32) -> bool {
        (self.start..=self.end).contains(&episode)
    }
}

/// One surviving listing entry.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchCandidate {
    pub title: String,
    pub link: String,
    pub year: Option<i64>,
    /// Which configured resolution tag matched.
    pub resolution: Option<String>,
    /// Series releases only.
    pub episode_range: Option<EpisodeRange>,
    pub size_gb: Option<f64>,
}

/// Everything `rank` filters against.
#[derive(Debug, Clone)]
pub struct RankRequest<'a> {
    pub kind: MediaKind,
    pub title: &'a str,
    pub year: Option<i64>,
    pub exclude_keywords: &'a [String],
    pub preferred_resolution: &'a str,
    pub fallback_resolution: &'a str,
    /// Lowest wanted episode; series mode only.
    pub episode_hint: Option<u32>,
}

/// Filter and bucket the listing entries of one results page.
///
/// Returns the preferred-resolution bucket when non-empty, else the fallback
/// bucket, else nothing — in listing order either way.
pub fn rank(html: &str, request: &RankRequest<'_>) -> Vec<SearchCandidate> {
    let (preferred, fallback) = split_resolution_buckets(
        collect_candidates(html, request),
        request.preferred_resolution,
        request.fallback_resolution,
    );
    if preferred.is_empty() { fallback } else { preferred }
}

/// Like [`rank`], but keeps both buckets: preferred-resolution entries first,
/// fallback entries after. Used where an operator picks from the list instead
/// of the engine picking one winner.
pub fn rank_inclusive(html: &str, request: &RankRequest<'_>) -> Vec<SearchCandidate> {
    let (mut preferred, mut fallback) = split_resolution_buckets(
        collect_candidates(html, request),
        request.preferred_resolution,
        request.fallback_resolution,
    );
    preferred.append(&mut fallback);
    preferred
}

fn collect_candidates(html: &str, request: &RankRequest<'_>) -> Vec<SearchCandidate> {
    let mut survivors = Vec::new();
    let wanted_title = request.title.to_lowercase();
    let year_literal = request.year.map(|y| y.to_string());

    let document = Html::parse_document(html);
    for item in document.select(&LISTING_ITEM) {
        let Some(anchor) = item.select(&LISTING_LINK).next() else {
            continue;
        };
        let Some(link) = anchor.value().attr("href") else {
            continue;
        };
        let entry_title = anchor.text().collect::<String>();
        let entry_title = entry_title.trim();
        let entry_lower = entry_title.to_lowercase();

        if !entry_lower.contains(&wanted_title) {
            continue;
        }
        if should_exclude(&entry_lower, request.exclude_keywords) {
            continue;
        }
        if let Some(year) = &year_literal
            && !entry_title.contains(year)
        {
            continue;
        }

        let episode_range = match request.kind {
            MediaKind::Movie => None,
            MediaKind::Tv => match series_range(entry_title, request.episode_hint) {
                Some(range) => Some(range),
                None => continue,
            },
        };

        survivors.push(SearchCandidate {
            title: entry_title.to_string(),
            link: link.to_string(),
            year: infer_year(entry_title),
            resolution: None,
            episode_range,
            size_gb: parse_file_size(entry_title),
        });
    }

    survivors
}

/// Range an entry claims, honoring the wanted-episode constraint. None means
/// the entry is out.
fn series_range(entry_title: &str, episode_hint: Option<u32>) -> Option<EpisodeRange> {
    if EPISODE_DESCRIPTOR_RE.is_match(entry_title) {
        // A malformed descriptor disqualifies the entry outright rather than
        // falling back to the hint.
        let range = parse_episode_descriptor(entry_title)?;
        if let Some(wanted) = episode_hint
            && !range.contains(wanted)
        {
            return None;
        }
        return Some(range);
    }

    // No descriptor at all: only the literal single-episode marker keeps
    // it. Sites zero-pad episode numbers under ten.
    let wanted = episode_hint?;
    if entry_title.contains(&format!("第{wanted:02}集")) {
        Some(EpisodeRange::single(wanted))
    } else {
        None
    }
}

/// Parse the first episode descriptor in a title.
///
/// `全N集` → [1, N] complete; `第a-b集` → [a, b]; `第a,b集` → [min, max];
/// `第n集` → [n, n]. Zero or inverted bounds are malformed, not defaulted.
pub fn parse_episode_descriptor(title: &str) -> Option<EpisodeRange> {
    let caps = EPISODE_DESCRIPTOR_RE.captures(title)?;

    if let Some(total) = caps.get(2) {
        let total: u32 = total.as_str().parse().ok()?;
        if total == 0 {
            return None;
        }
        return Some(EpisodeRange {
            start: 1,
            end: total,
            complete: true,
        });
    }

    let descriptor = caps.get(1)?.as_str();
    if let Some((start, end)) = descriptor.split_once('-') {
        let start: u32 = start.parse().ok()?;
        let end: u32 = end.parse().ok()?;
        if start == 0 || end == 0 || start > end {
            return None;
        }
        return Some(EpisodeRange {
            start,
            end,
            complete: false,
        });
    }
    if let Some((a, b)) = descriptor.split_once(',') {
        let a: u32 = a.parse().ok()?;
        let b: u32 = b.parse().ok()?;
        if a == 0 || b == 0 {
            return None;
        }
        return Some(EpisodeRange {
            start: a.min(b),
            end: a.max(b),
            complete: false,
        });
    }
    let episode: u32 = descriptor.parse().ok()?;
    if episode == 0 {
        return None;
    }
    Some(EpisodeRange::single(episode))
}

/// File size in GB from a release title; MB figures are normalized.
pub fn parse_file_size(text: &str) -> Option<f64> {
    let caps = FILE_SIZE_RE.captures(text)?;
    let size: f64 = caps.get(1)?.as_str().parse().ok()?;
    match caps.get(2)?.as_str() {
        "MB" => Some(size / 1024.0),
        _ => Some(size),
    }
}

fn infer_year(title: &str) -> Option<i64> {
    YEAR_RE.find(title).and_then(|m| m.as_str().parse().ok())
}

fn should_exclude(entry_lower: &str, exclude_keywords: &[String]) -> bool {
    exclude_keywords
        .iter()
        .any(|keyword| !keyword.is_empty() && entry_lower.contains(&keyword.to_lowercase()))
}

/// Partition survivors by resolution tag, stamping the matched tag on each.
/// Entries matching neither tag are dropped.
fn split_resolution_buckets(
    candidates: Vec<SearchCandidate>,
    preferred: &str,
    fallback: &str,
) -> (Vec<SearchCandidate>, Vec<SearchCandidate>) {
    let mut preferred_bucket = Vec::new();
    let mut fallback_bucket = Vec::new();
    let preferred_lower = preferred.to_lowercase();
    let fallback_lower = fallback.to_lowercase();

    for mut candidate in candidates {
        let title_lower = candidate.title.to_lowercase();
        if !preferred_lower.is_empty() && title_lower.contains(&preferred_lower) {
            candidate.resolution = Some(preferred.to_string());
            preferred_bucket.push(candidate);
        } else if !fallback_lower.is_empty() && title_lower.contains(&fallback_lower) {
            candidate.resolution = Some(fallback.to_string());
            fallback_bucket.push(candidate);
        }
    }

    (preferred_bucket, fallback_bucket)
}

/// The candidate claiming the widest episode span; first wins ties.
pub fn select_widest(candidates: &[SearchCandidate]) -> Option<&SearchCandidate> {
    let mut best: Option<(&SearchCandidate, u32)> = None;
    for candidate in candidates {
        let Some(range) = candidate.episode_range else {
            continue;
        };
        let width = range.width();
        match best {
            Some((_, best_width)) if width <= best_width => {}
            _ => best = Some((candidate, width)),
        }
    }
    best.map(|(candidate, _)| candidate)
}
