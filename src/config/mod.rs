//! Application configuration management

use std::env;

use anyhow::{Context, Result, bail};

use crate::site::codec::Codec;

/// Which kind of media a resource site serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Movie,
    Tv,
}

impl MediaKind {
    /// Stable identifier used for session cache keys and log fields.
    pub fn as_str(self) -> &'static str {
        match self {
            MediaKind::Movie => "movie",
            MediaKind::Tv => "tv",
        }
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything the driver needs to talk to one forum site.
#[derive(Debug, Clone)]
pub struct SiteProfile {
    pub kind: MediaKind,
    /// Base URL without a trailing slash.
    pub base_url: String,
    pub username: String,
    pub password: String,
    /// Wire charset for form bodies, redirect queries and response pages.
    pub codec: Codec,
    /// Substring of the login response that confirms a successful login.
    pub greeting_marker: String,
}

impl SiteProfile {
    /// Session cache identity for this site.
    pub fn site_id(&self) -> &'static str {
        self.kind.as_str()
    }
}

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite database file path
    pub database_path: String,

    /// Directory holding per-site cookie blobs
    pub session_cache_dir: String,

    /// Directory downloads are streamed into
    pub torrent_dir: String,

    /// Movie library root (library scanner input)
    pub movie_library_path: String,

    /// TV library root (library scanner input)
    pub tv_library_path: String,

    /// Movie resource site, if configured
    pub movie_site: Option<SiteProfile>,

    /// TV resource site, if configured
    pub tv_site: Option<SiteProfile>,

    /// First-choice resolution tag for ranking
    pub preferred_resolution: String,

    /// Second-choice resolution tag for ranking
    pub fallback_resolution: String,

    /// Title substrings that disqualify a candidate outright
    pub exclude_keywords: Vec<String>,

    /// Hours between scheduled pipeline runs
    pub run_interval_hours: u64,

    /// Per-request HTTP timeout in seconds
    pub http_timeout_secs: u64,
}

/// Login-success marker served by the forum engine both sites run.
const DEFAULT_GREETING_MARKER: &str = "欢迎您回来";

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            database_path: env::var("DATABASE_PATH")
                .unwrap_or_else(|_| "huntsman.db".to_string()),

            session_cache_dir: env::var("SESSION_CACHE_DIR")
                .unwrap_or_else(|_| "sessions".to_string()),

            torrent_dir: env::var("TORRENT_DIR").unwrap_or_else(|_| "Torrent".to_string()),

            movie_library_path: env::var("MOVIE_LIBRARY_PATH")
                .unwrap_or_else(|_| "Movie".to_string()),

            tv_library_path: env::var("TV_LIBRARY_PATH").unwrap_or_else(|_| "TV".to_string()),

            movie_site: site_from_env(MediaKind::Movie, "MOVIE_SITE", "gbk")?,

            tv_site: site_from_env(MediaKind::Tv, "TV_SITE", "utf-8")?,

            preferred_resolution: env::var("PREFERRED_RESOLUTION")
                .unwrap_or_else(|_| "2160p".to_string()),

            fallback_resolution: env::var("FALLBACK_RESOLUTION")
                .unwrap_or_else(|_| "1080p".to_string()),

            exclude_keywords: env::var("EXCLUDE_KEYWORDS")
                .unwrap_or_else(|_| "60帧,高码版".to_string())
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),

            run_interval_hours: env::var("RUN_INTERVAL_HOURS")
                .unwrap_or_else(|_| "6".to_string())
                .parse()
                .context("Invalid RUN_INTERVAL_HOURS")?,

            http_timeout_secs: env::var("HTTP_TIMEOUT_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .context("Invalid HTTP_TIMEOUT_SECS")?,
        })
    }

    pub fn site(&self, kind: MediaKind) -> Option<&SiteProfile> {
        match kind {
            MediaKind::Movie => self.movie_site.as_ref(),
            MediaKind::Tv => self.tv_site.as_ref(),
        }
    }
}

/// Build one site profile from `{prefix}_URL`, `{prefix}_USERNAME`,
/// `{prefix}_PASSWORD` and `{prefix}_CHARSET`. A missing URL disables the
/// site; a present URL makes the credentials required.
fn site_from_env(
    kind: MediaKind,
    prefix: &str,
    default_charset: &str,
) -> Result<Option<SiteProfile>> {
    let Ok(url) = env::var(format!("{prefix}_URL")) else {
        return Ok(None);
    };
    let base_url = url.trim_end_matches('/').to_string();
    if base_url.is_empty() {
        return Ok(None);
    }

    let username = env::var(format!("{prefix}_USERNAME"))
        .with_context(|| format!("{prefix}_USERNAME is required when {prefix}_URL is set"))?;
    let password = env::var(format!("{prefix}_PASSWORD"))
        .with_context(|| format!("{prefix}_PASSWORD is required when {prefix}_URL is set"))?;

    let charset_label =
        env::var(format!("{prefix}_CHARSET")).unwrap_or_else(|_| default_charset.to_string());
    let Some(codec) = Codec::from_label(&charset_label) else {
        bail!("{prefix}_CHARSET: unsupported charset {charset_label:?}");
    };

    Ok(Some(SiteProfile {
        kind,
        base_url,
        username,
        password,
        codec,
        greeting_marker: env::var(format!("{prefix}_GREETING"))
            .unwrap_or_else(|_| DEFAULT_GREETING_MARKER.to_string()),
    }))
}
