//! Per-site session persistence and liveness checks.
//!
//! A session is nothing but the cookies a successful login left behind. They
//! are kept as an explicit name→value map and sent as a single `Cookie`
//! header; the drivers never rely on an ambient cookie jar, so what goes over
//! the wire is exactly what was persisted.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use reqwest::header::{COOKIE, HeaderMap, SET_COOKIE};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::codec::Codec;

/// Cookies for one authenticated site session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CookieJar {
    cookies: BTreeMap<String, String>,
}

impl CookieJar {
    /// Merge every `Set-Cookie` header on a response into the jar. Only the
    /// name=value pair matters; attributes like Path and Expires are the
    /// site's business, not ours.
    pub fn absorb(&mut self, headers: &HeaderMap) {
        for value in headers.get_all(SET_COOKIE) {
            let Ok(text) = value.to_str() else { continue };
            let pair = text.split(';').next().unwrap_or_default();
            if let Some((name, value)) = pair.split_once('=') {
                let name = name.trim();
                if !name.is_empty() {
                    self.cookies.insert(name.to_string(), value.trim().to_string());
                }
            }
        }
    }

    /// `Cookie` header value, or None when the jar is empty.
    pub fn header_value(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }
        Some(
            self.cookies
                .iter()
                .map(|(name, value)| format!("{name}={value}"))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }
}

/// A persisted site session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteSession {
    pub site_id: String,
    pub cookies: CookieJar,
    pub saved_at: DateTime<Utc>,
}

impl SiteSession {
    pub fn new(site_id: impl Into<String>, cookies: CookieJar) -> Self {
        Self {
            site_id: site_id.into(),
            cookies,
            saved_at: Utc::now(),
        }
    }
}

/// Loads, saves and probes per-site sessions under one cache directory.
pub struct SessionStore {
    dir: PathBuf,
}

impl SessionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, site_id: &str) -> PathBuf {
        self.dir.join(format!("session_{site_id}.json"))
    }

    /// A stored session, or None when absent or unreadable. A corrupt blob
    /// just means logging in again, so it is never an error.
    pub fn load(&self, site_id: &str) -> Option<SiteSession> {
        let path = self.path_for(site_id);
        let raw = fs::read_to_string(&path).ok()?;
        match serde_json::from_str::<SiteSession>(&raw) {
            Ok(session) => Some(session),
            Err(err) => {
                debug!(site = site_id, error = %err, "discarding unreadable session blob");
                None
            }
        }
    }

    pub fn save(&self, session: &SiteSession) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("creating session dir {}", self.dir.display()))?;
        let path = self.path_for(&session.site_id);
        let blob = serde_json::to_string_pretty(session)?;
        fs::write(&path, blob).with_context(|| format!("writing {}", path.display()))?;
        Ok(())
    }

    /// Drop a stored session so the next run logs in fresh.
    pub fn clear(&self, site_id: &str) {
        let _ = fs::remove_file(self.path_for(site_id));
    }

    /// Live liveness probe: GET an authenticated-only page and look for the
    /// expected username marker in the body. Any transport failure counts as
    /// invalid; the caller falls back to a fresh login.
    pub async fn is_valid(
        &self,
        client: &reqwest::Client,
        session: &SiteSession,
        profile_url: &str,
        expected_marker: &str,
        codec: Codec,
    ) -> bool {
        let mut request = client.get(profile_url);
        if let Some(cookie) = session.cookies.header_value() {
            request = request.header(COOKIE, cookie);
        }
        match request.send().await {
            Ok(response) if response.status().is_success() => match response.bytes().await {
                Ok(body) => codec.decode_body(&body).contains(expected_marker),
                Err(_) => false,
            },
            _ => false,
        }
    }
}
