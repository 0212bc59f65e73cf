//! Minimal CLI parsing for run mode and manual operations.

use std::env;

use anyhow::{Context, Result, bail};

use crate::config::MediaKind;

/// What this invocation should do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run the pipeline on the configured schedule (default).
    Daemon,
    /// Run one pipeline pass and exit.
    RunOnce,
    /// One authenticated search against a site, printing candidates.
    Search {
        kind: MediaKind,
        title: String,
        year: Option<i64>,
    },
    /// Download every attachment behind a detail-page link.
    Grab { kind: MediaKind, link: String },
}

#[derive(Debug)]
pub struct CliOptions {
    pub command: Command,
}

impl CliOptions {
    pub fn from_args() -> Result<Self> {
        Self::parse(env::args().skip(1))
    }

    fn parse(args: impl IntoIterator<Item = String>) -> Result<Self> {
        let mut args = args.into_iter();
        let mut subcommand: Option<String> = None;
        let mut kind: Option<MediaKind> = None;
        let mut title: Option<String> = None;
        let mut year: Option<i64> = None;
        let mut link: Option<String> = None;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--movie" => kind = Some(MediaKind::Movie),
                "--tv" => kind = Some(MediaKind::Tv),
                "--title" => title = args.next(),
                "--year" => {
                    if let Some(value) = args.next() {
                        year = Some(parse_year(&value)?);
                    }
                }
                "--link" => link = args.next(),
                _ if arg.starts_with("--title=") => {
                    title = arg.split_once('=').map(|(_, v)| v.to_string());
                }
                _ if arg.starts_with("--year=") => {
                    if let Some((_, value)) = arg.split_once('=') {
                        year = Some(parse_year(value)?);
                    }
                }
                _ if arg.starts_with("--link=") => {
                    link = arg.split_once('=').map(|(_, v)| v.to_string());
                }
                _ if !arg.starts_with('-') && subcommand.is_none() => {
                    subcommand = Some(arg);
                }
                _ => {}
            }
        }

        let command = match subcommand.as_deref() {
            None => Command::Daemon,
            Some("run-once") => Command::RunOnce,
            Some("search") => {
                let Some(title) = title else {
                    bail!("search requires --title");
                };
                Command::Search {
                    kind: require_kind(kind, "search")?,
                    title,
                    year,
                }
            }
            Some("grab") => {
                let Some(link) = link else {
                    bail!("grab requires --link");
                };
                Command::Grab {
                    kind: require_kind(kind, "grab")?,
                    link,
                }
            }
            Some(other) => bail!("unknown command {other:?} (expected run-once, search or grab)"),
        };

        Ok(CliOptions { command })
    }
}

fn require_kind(kind: Option<MediaKind>, command: &str) -> Result<MediaKind> {
    match kind {
        Some(kind) => Ok(kind),
        None => bail!("{command} requires --movie or --tv"),
    }
}

fn parse_year(value: &str) -> Result<i64> {
    value
        .parse()
        .with_context(|| format!("invalid --year {value:?}"))
}
