//! Failure taxonomy for site interaction and downloads.
//!
//! Nothing here is retried in-process. The scheduled re-run is the retry
//! policy, so every variant is terminal for the operation that raised it and
//! the ledger is only ever mutated after a confirmed success.

use std::path::PathBuf;

/// Errors surfaced by the site driver and the download path.
#[derive(Debug, thiserror::Error)]
pub enum HuntError {
    /// Login POST completed but the greeting marker never appeared.
    #[error("login rejected by {site}")]
    LoginRejected { site: String },

    /// The login page carried no CSRF token field.
    #[error("login token missing on {site}")]
    TokenNotFound { site: String },

    /// The search form carried no CSRF token field.
    #[error("search token missing on {site}")]
    SearchTokenNotFound { site: String },

    /// Expected markup absent: the site layout has drifted.
    #[error("{what} missing on {site}")]
    MarkupNotFound { site: String, what: &'static str },

    /// Timeout, connection failure, or a non-success terminal status.
    #[error("request to {url} failed: {reason}")]
    Network { url: String, reason: String },

    /// Disk-side failure while landing a download.
    #[error("could not write {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl HuntError {
    /// A terminal non-success HTTP status.
    pub fn bad_status(url: impl Into<String>, status: reqwest::StatusCode) -> Self {
        HuntError::Network {
            url: url.into(),
            reason: format!("status {status}"),
        }
    }

    /// Short category tag for structured logs.
    pub fn category(&self) -> &'static str {
        match self {
            HuntError::LoginRejected { .. } => "auth",
            HuntError::TokenNotFound { .. }
            | HuntError::SearchTokenNotFound { .. }
            | HuntError::MarkupNotFound { .. } => "protocol",
            HuntError::Network { .. } => "network",
            HuntError::Io { .. } => "io",
        }
    }
}

impl From<reqwest::Error> for HuntError {
    fn from(err: reqwest::Error) -> Self {
        let url = err
            .url()
            .map(|u| u.to_string())
            .unwrap_or_else(|| "<unknown>".to_string());
        let reason = if err.is_timeout() {
            "timeout".to_string()
        } else if err.is_connect() {
            "connection failure".to_string()
        } else {
            err.to_string()
        };
        HuntError::Network { url, reason }
    }
}
