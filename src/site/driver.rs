//! Forum site driver: login, search, detail fetch and download.
//!
//! Both resource sites run the same Discuz-style forum engine, so there is a
//! single driver parameterized by [`SiteProfile`]; everything that differs
//! between sites (base URL, wire charset, markers, credentials) is profile
//! data, never code. The charset rides along as an explicit [`Codec`] on
//! every encode/decode step.
//!
//! # Authentication
//!
//! Cookie-based, bootstrapped from a normal form login:
//! 1. GET the login page, harvesting its cookies and CSRF token (formhash)
//! 2. POST the credentials plus token, form-encoded in the site charset
//! 3. Confirm the greeting marker in the response, then persist the cookies
//!
//! A stored session is revalidated against the member profile page before
//! each run; any failure there falls back to a fresh login.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::header::{CONTENT_TYPE, COOKIE, LOCATION};
use reqwest::redirect::Policy;
use reqwest::Client;
use scraper::{Html, Selector};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::SiteProfile;
use crate::error::HuntError;
use crate::site::codec::Codec;
use crate::site::session::{CookieJar, SessionStore, SiteSession};

/// Browser identity presented to the sites.
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

const LOGIN_PAGE: &str = "member.php?mod=logging&action=login";
const LOGIN_POST: &str = "member.php?mod=logging&action=login&loginsubmit=yes&inajax=1";
const SEARCH_PAGE: &str = "search.php?mod=forum";
const PROFILE_PAGE: &str = "home.php?mod=space";

/// Requested site-side cookie lifetime, in seconds (30 days).
const COOKIE_TIME: &str = "2592000";

/// Cap on the hand-followed redirect chain so a loop cannot hang a run.
const MAX_REDIRECTS: usize = 5;

static FORMHASH_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"input[name="formhash"]"#).unwrap());
static ATTACHMENT_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"div.button span[id^="attach_"] a[href]"#).unwrap());
static TORRENT_NAME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)(.*?\.torrent)").unwrap());

/// A download link found on a detail page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadLink {
    pub url: String,
    pub filename: String,
}

/// A finished download on disk.
#[derive(Debug, Clone)]
pub struct DownloadOutcome {
    pub path: PathBuf,
}

/// Authenticated client for one resource site.
pub struct SiteDriver {
    profile: SiteProfile,
    client: Client,
    store: SessionStore,
    /// Serializes session refresh so concurrent callers cannot double-login.
    auth_lock: Mutex<()>,
}

impl SiteDriver {
    pub fn new(profile: SiteProfile, store: SessionStore, timeout: Duration) -> Result<Self> {
        // Redirects stay off for the whole client: the search flow must
        // follow them by hand to keep the keyword bytes intact.
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .redirect(Policy::none())
            .gzip(true)
            .build()
            .context("building HTTP client")?;

        Ok(Self {
            profile,
            client,
            store,
            auth_lock: Mutex::new(()),
        })
    }

    pub fn profile(&self) -> &SiteProfile {
        &self.profile
    }

    fn site_id(&self) -> &'static str {
        self.profile.site_id()
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.profile.base_url, path)
    }

    /// Load a live session or log in for a fresh one.
    pub async fn ensure_authenticated(&self) -> Result<SiteSession, HuntError> {
        let _guard = self.auth_lock.lock().await;

        if let Some(session) = self.store.load(self.site_id()) {
            let valid = self
                .store
                .is_valid(
                    &self.client,
                    &session,
                    &self.url(PROFILE_PAGE),
                    &self.profile.username,
                    self.profile.codec,
                )
                .await;
            if valid {
                debug!(
                    site = self.site_id(),
                    saved_at = %session.saved_at,
                    "stored session still valid"
                );
                return Ok(session);
            }
            debug!(site = self.site_id(), "stored session rejected, logging in again");
            self.store.clear(self.site_id());
        }

        self.login().await
    }

    /// Full login flow against the forum's member endpoint.
    async fn login(&self) -> Result<SiteSession, HuntError> {
        info!(site = self.site_id(), "logging in");
        let mut jar = CookieJar::default();

        // The login page hands out both the pre-login cookies and the CSRF
        // token the POST must echo back.
        let login_url = self.url(LOGIN_PAGE);
        let response = self.client.get(&login_url).send().await?;
        if !response.status().is_success() {
            return Err(HuntError::bad_status(&login_url, response.status()));
        }
        jar.absorb(response.headers());
        let body = self.profile.codec.decode_body(&response.bytes().await?);
        let formhash = extract_formhash(&body).ok_or_else(|| HuntError::TokenNotFound {
            site: self.site_id().to_string(),
        })?;

        let referer = format!("{}/", self.profile.base_url);
        let form = self.profile.codec.encode_form(&[
            ("formhash", formhash.as_str()),
            ("referer", referer.as_str()),
            ("loginfield", "username"),
            ("username", self.profile.username.as_str()),
            ("password", self.profile.password.as_str()),
            ("questionid", "0"),
            ("answer", ""),
            ("cookietime", COOKIE_TIME),
        ]);

        let post_url = self.url(LOGIN_POST);
        let mut request = self
            .client
            .post(&post_url)
            .header(CONTENT_TYPE, self.form_content_type())
            .body(form);
        if let Some(cookie) = jar.header_value() {
            request = request.header(COOKIE, cookie);
        }
        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(HuntError::bad_status(&post_url, response.status()));
        }
        jar.absorb(response.headers());
        let body = self.profile.codec.decode_body(&response.bytes().await?);
        if !body.contains(&self.profile.greeting_marker) {
            return Err(HuntError::LoginRejected {
                site: self.site_id().to_string(),
            });
        }

        let session = SiteSession::new(self.site_id(), jar);
        if let Err(err) = self.store.save(&session) {
            // The in-memory session still works for this run.
            warn!(site = self.site_id(), error = %err, "could not persist session");
        }
        info!(site = self.site_id(), "login succeeded");
        Ok(session)
    }

    /// Search the forum, returning the decoded results page.
    ///
    /// The engine answers the POST with a redirect whose query string carries
    /// the keyword re-encoded in the site charset; the chain is followed by
    /// hand so those bytes survive the round trip.
    pub async fn search(
        &self,
        session: &SiteSession,
        keyword: &str,
    ) -> Result<String, HuntError> {
        let search_url = self.url(SEARCH_PAGE);

        // Fresh token scoped to the search form; distinct from the login one.
        let response = self.get_with_session(&search_url, session).await?;
        if !response.status().is_success() {
            return Err(HuntError::bad_status(&search_url, response.status()));
        }
        let body = self.profile.codec.decode_body(&response.bytes().await?);
        let formhash = extract_formhash(&body).ok_or_else(|| HuntError::SearchTokenNotFound {
            site: self.site_id().to_string(),
        })?;

        debug!(site = self.site_id(), keyword, "submitting search");
        let form = self.profile.codec.encode_form(&[
            ("formhash", formhash.as_str()),
            ("srchtxt", keyword),
            ("searchsubmit", "yes"),
        ]);
        let mut request = self
            .client
            .post(&search_url)
            .header(CONTENT_TYPE, self.form_content_type())
            .body(form);
        if let Some(cookie) = session.cookies.header_value() {
            request = request.header(COOKIE, cookie);
        }
        let mut response = request.send().await?;

        let mut current_url =
            Url::parse(&search_url).map_err(|err| HuntError::Network {
                url: search_url.clone(),
                reason: format!("bad search URL: {err}"),
            })?;
        let mut hops = 0;
        while response.status().is_redirection() {
            hops += 1;
            if hops > MAX_REDIRECTS {
                return Err(HuntError::Network {
                    url: current_url.to_string(),
                    reason: "too many redirects".to_string(),
                });
            }
            let location = response
                .headers()
                .get(LOCATION)
                .ok_or_else(|| HuntError::MarkupNotFound {
                    site: self.site_id().to_string(),
                    what: "redirect target",
                })?;
            let target =
                repair_redirect_target(&current_url, location.as_bytes(), self.profile.codec)?;
            debug!(site = self.site_id(), url = %target, "following search redirect");
            response = self.get_with_session(target.as_str(), session).await?;
            current_url = target;
        }

        if !response.status().is_success() {
            return Err(HuntError::bad_status(current_url.as_str(), response.status()));
        }
        Ok(self.profile.codec.decode_body(&response.bytes().await?))
    }

    /// Fetch a result's detail page and pull out its attachment links.
    pub async fn fetch_detail(
        &self,
        session: &SiteSession,
        link: &str,
    ) -> Result<(String, Vec<DownloadLink>), HuntError> {
        let page_url = self.absolutize(link)?;
        let response = self.get_with_session(page_url.as_str(), session).await?;
        if !response.status().is_success() {
            return Err(HuntError::bad_status(page_url.as_str(), response.status()));
        }
        let html = self.profile.codec.decode_body(&response.bytes().await?);
        let links = extract_attachment_links(&html, &page_url);
        debug!(
            site = self.site_id(),
            url = %page_url,
            attachments = links.len(),
            "detail page fetched"
        );
        Ok((html, links))
    }

    /// Stream one attachment to `dest_dir/filename`.
    ///
    /// No partial-file cleanup on failure: a failed outcome only guarantees
    /// that nothing was committed to the ledger, not that no bytes landed.
    pub async fn download(
        &self,
        session: &SiteSession,
        link: &DownloadLink,
        dest_dir: &Path,
    ) -> Result<DownloadOutcome, HuntError> {
        std::fs::create_dir_all(dest_dir).map_err(|source| HuntError::Io {
            path: dest_dir.to_path_buf(),
            source,
        })?;

        let mut response = self.get_with_session(&link.url, session).await?;
        if !response.status().is_success() {
            return Err(HuntError::bad_status(&link.url, response.status()));
        }

        let path = dest_dir.join(&link.filename);
        let mut file = tokio::fs::File::create(&path)
            .await
            .map_err(|source| HuntError::Io {
                path: path.clone(),
                source,
            })?;
        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk)
                .await
                .map_err(|source| HuntError::Io {
                    path: path.clone(),
                    source,
                })?;
        }
        file.flush().await.map_err(|source| HuntError::Io {
            path: path.clone(),
            source,
        })?;

        info!(site = self.site_id(), file = %path.display(), "download complete");
        Ok(DownloadOutcome { path })
    }

    fn form_content_type(&self) -> String {
        format!(
            "application/x-www-form-urlencoded; charset={}",
            self.profile.codec.charset_token()
        )
    }

    async fn get_with_session(
        &self,
        url: &str,
        session: &SiteSession,
    ) -> Result<reqwest::Response, HuntError> {
        let mut request = self.client.get(url);
        if let Some(cookie) = session.cookies.header_value() {
            request = request.header(COOKIE, cookie);
        }
        Ok(request.send().await?)
    }

    /// Resolve a possibly-relative listing link against the site base.
    fn absolutize(&self, link: &str) -> Result<Url, HuntError> {
        let base = Url::parse(&format!("{}/", self.profile.base_url)).map_err(|err| {
            HuntError::Network {
                url: self.profile.base_url.clone(),
                reason: format!("bad base URL: {err}"),
            }
        })?;
        base.join(link).map_err(|err| HuntError::Network {
            url: link.to_string(),
            reason: format!("bad link: {err}"),
        })
    }
}

/// CSRF token from a hidden form field.
fn extract_formhash(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    document
        .select(&FORMHASH_SELECTOR)
        .next()
        .and_then(|input| input.value().attr("value"))
        .map(|value| value.to_string())
}

/// Attachment anchors on a detail page: kept when text or href carries the
/// torrent marker in any letter case, with the filename taken from the
/// visible text when it names one and from the URL path otherwise.
fn extract_attachment_links(html: &str, page_url: &Url) -> Vec<DownloadLink> {
    let document = Html::parse_document(html);
    let mut links = Vec::new();

    for anchor in document.select(&ATTACHMENT_SELECTOR) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        let text = anchor.text().collect::<String>();
        let text = text.trim();
        if !text.to_lowercase().contains(".torrent") && !href.to_lowercase().contains(".torrent") {
            continue;
        }

        let url = match page_url.join(href) {
            Ok(absolute) => absolute.to_string(),
            Err(_) => continue,
        };
        let filename = TORRENT_NAME_RE
            .captures(text)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
            .unwrap_or_else(|| filename_from_url(&url));
        let filename = sanitize_filename::sanitize(filename.trim());
        if filename.is_empty() {
            continue;
        }

        links.push(DownloadLink { url, filename });
    }

    links
}

/// Last path segment of a URL, percent-decoded.
fn filename_from_url(url: &str) -> String {
    let tail = url
        .rsplit('/')
        .next()
        .unwrap_or(url)
        .split('?')
        .next()
        .unwrap_or_default();
    let bytes = urlencoding::decode_binary(tail.as_bytes());
    String::from_utf8_lossy(&bytes).into_owned()
}

/// Resolve a Location header against the current URL and re-encode its query
/// values byte-wise so site-charset escapes survive the hop.
fn repair_redirect_target(
    base: &Url,
    location: &[u8],
    codec: Codec,
) -> Result<Url, HuntError> {
    // Raw non-ASCII octets in the header become percent-escapes up front,
    // keeping the target parseable without ever reinterpreting the bytes.
    let mut printable = String::with_capacity(location.len());
    for &byte in location {
        match byte {
            0x21..=0x7E => printable.push(byte as char),
            _ => printable.push_str(&format!("%{byte:02X}")),
        }
    }

    let mut target = base.join(&printable).map_err(|err| HuntError::Network {
        url: printable.clone(),
        reason: format!("bad redirect target: {err}"),
    })?;

    if let Some(query) = target.query().map(str::to_owned) {
        let repaired = repair_query(&query, codec);
        target.set_query(Some(&repaired));
    }
    Ok(target)
}

fn repair_query(query: &str, codec: Codec) -> String {
    query
        .split('&')
        .map(|pair| match pair.split_once('=') {
            Some((key, value)) => format!("{key}={}", codec.reencode_query_value(value)),
            None => pair.to_string(),
        })
        .collect::<Vec<_>>()
        .join("&")
}
