//! Integration tests for the acquisition pipeline
//!
//! These tests verify the rules the pipeline is built around:
//! - Missing-ledger lifecycle (tracked only while a gap exists)
//! - Canonical episode-set text form
//! - Episode descriptor interpretation in release titles
//! - Candidate filtering and release selection

// ============================================================================
// Ledger Lifecycle Tests
// ============================================================================

/// States a (title, season) pair can be in with respect to the ledger
const LEDGER_STATES: &[&str] = &["absent", "tracked"];

mod ledger_transitions {
    use super::*;

    /// Check whether an event may move a ledger row between states
    fn is_valid_transition(from: &str, event: &str, to: &str) -> bool {
        match (from, event, to) {
            // absent -> tracked: reconciliation finds a gap between a wanted
            // title and the library
            ("absent", "reconcile_gap", "tracked") => true,
            // tracked -> tracked: a confirmed download covers part of the gap
            ("tracked", "download_partial", "tracked") => true,
            // tracked -> absent: a confirmed download covers the rest
            ("tracked", "download_full", "absent") => true,
            // tracked -> absent: the library grew to cover the whole gap
            ("tracked", "library_covers", "absent") => true,
            // tracked -> tracked: a failed download leaves the row alone
            ("tracked", "download_failed", "tracked") => true,
            // tracked -> tracked: a failed search leaves the row alone
            ("tracked", "search_empty", "tracked") => true,
            // absent -> absent: reconciliation of a satisfied title is a no-op
            ("absent", "reconcile_satisfied", "absent") => true,
            _ => false,
        }
    }

    #[test]
    fn test_happy_path() {
        // gap found -> partial fill -> final fill
        assert!(is_valid_transition("absent", "reconcile_gap", "tracked"));
        assert!(is_valid_transition("tracked", "download_partial", "tracked"));
        assert!(is_valid_transition("tracked", "download_full", "absent"));
    }

    #[test]
    fn test_library_growth_retires_row() {
        assert!(is_valid_transition("tracked", "library_covers", "absent"));
    }

    #[test]
    fn test_failures_never_commit() {
        // No failure event may change the row
        assert!(is_valid_transition("tracked", "download_failed", "tracked"));
        assert!(is_valid_transition("tracked", "search_empty", "tracked"));
        assert!(!is_valid_transition("tracked", "download_failed", "absent"));
        assert!(!is_valid_transition("tracked", "search_empty", "absent"));
    }

    #[test]
    fn test_no_event_resurrects_a_satisfied_row() {
        for state in LEDGER_STATES {
            assert!(
                !is_valid_transition(state, "download_full", "tracked"),
                "download_full must never leave a row behind from {}",
                state
            );
        }
    }
}

// ============================================================================
// Episode Set Text Form Tests
// ============================================================================

mod episode_set_form {
    use pretty_assertions::assert_eq;
    use std::collections::BTreeSet;

    /// Canonical storage form: ascending, comma-joined, no spaces
    fn format_set(episodes: &BTreeSet<u32>) -> String {
        episodes
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Lenient read: junk tokens are dropped, duplicates collapse
    fn parse_set(text: &str) -> BTreeSet<u32> {
        text.split(',')
            .filter_map(|token| token.trim().parse().ok())
            .collect()
    }

    #[test]
    fn test_format_is_sorted_ascending() {
        let set: BTreeSet<u32> = [9, 2, 11, 5].into_iter().collect();
        assert_eq!(format_set(&set), "2,5,9,11");
    }

    #[test]
    fn test_parse_tolerates_junk_and_spacing() {
        let set = parse_set("3, 1,,x, 2");
        assert_eq!(set, [1, 2, 3].into_iter().collect());
    }

    #[test]
    fn test_duplicates_collapse() {
        let set = parse_set("4,4,4,5");
        assert_eq!(format_set(&set), "4,5");
    }

    #[test]
    fn test_empty_text_is_empty_set() {
        assert!(parse_set("").is_empty());
    }

    #[test]
    fn test_round_trip_is_stable() {
        let canonical = "1,2,3,7,8,12";
        assert_eq!(format_set(&parse_set(canonical)), canonical);
    }
}

// ============================================================================
// Release Title Descriptor Tests
// ============================================================================

mod release_descriptors {
    use assert_matches::assert_matches;
    use regex::Regex;

    /// Episode coverage claimed by a release title, if any
    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Coverage {
        start: u32,
        end: u32,
        complete: bool,
    }

    /// Interpret the episode marker in a listing title. `Ok(None)` means no
    /// marker is present; a present but nonsensical marker (inverted or
    /// zero-based range) disqualifies the release outright.
    fn parse_coverage(title: &str) -> Result<Option<Coverage>, ()> {
        let re =
            Regex::new(r"(?:第(\d{1,2}-\d{1,2}|\d{1,2},\d{1,2}|\d{1,2})集|全(\d{1,2})集)").unwrap();
        let Some(caps) = re.captures(title) else {
            return Ok(None);
        };

        if let Some(total) = caps.get(2) {
            let total: u32 = total.as_str().parse().map_err(|_| ())?;
            if total == 0 {
                return Err(());
            }
            return Ok(Some(Coverage {
                start: 1,
                end: total,
                complete: true,
            }));
        }

        let body = caps.get(1).ok_or(())?.as_str();
        if let Some((a, b)) = body.split_once('-') {
            let start: u32 = a.parse().map_err(|_| ())?;
            let end: u32 = b.parse().map_err(|_| ())?;
            if start == 0 || start > end {
                return Err(());
            }
            return Ok(Some(Coverage {
                start,
                end,
                complete: false,
            }));
        }
        if let Some((a, b)) = body.split_once(',') {
            let a: u32 = a.parse().map_err(|_| ())?;
            let b: u32 = b.parse().map_err(|_| ())?;
            if a.min(b) == 0 {
                return Err(());
            }
            return Ok(Some(Coverage {
                start: a.min(b),
                end: a.max(b),
                complete: false,
            }));
        }
        let single: u32 = body.parse().map_err(|_| ())?;
        if single == 0 {
            return Err(());
        }
        Ok(Some(Coverage {
            start: single,
            end: single,
            complete: false,
        }))
    }

    #[test]
    fn test_single_episode_marker() {
        assert_matches!(
            parse_coverage("风骚律师 第一季 1080p 第04集"),
            Ok(Some(Coverage {
                start: 4,
                end: 4,
                complete: false
            }))
        );
    }

    #[test]
    fn test_dash_range_marker() {
        let coverage = parse_coverage("风骚律师 第一季 2160p 第01-05集")
            .unwrap()
            .unwrap();
        assert_eq!((coverage.start, coverage.end), (1, 5));
    }

    #[test]
    fn test_comma_pair_marker() {
        // A pair claims the span between its endpoints
        let coverage = parse_coverage("怪奇物语 第四季 第8,9集 2160p").unwrap().unwrap();
        assert_eq!((coverage.start, coverage.end), (8, 9));
    }

    #[test]
    fn test_full_run_marker() {
        let coverage = parse_coverage("风骚律师 第一季 全10集 1080p").unwrap().unwrap();
        assert_eq!((coverage.start, coverage.end), (1, 10));
        assert!(coverage.complete);
    }

    #[test]
    fn test_inverted_range_disqualifies() {
        assert!(parse_coverage("某剧 第08-03集 1080p").is_err());
    }

    #[test]
    fn test_zero_episode_disqualifies() {
        assert!(parse_coverage("某剧 第0集 1080p").is_err());
    }

    #[test]
    fn test_three_digit_marker_is_not_a_descriptor() {
        // Markers cap at two digits; longer runs fall back to literal search
        assert_eq!(parse_coverage("神探狄仁杰 第100集 1080p"), Ok(None));
    }

    #[test]
    fn test_plain_movie_title_has_no_marker() {
        assert_eq!(parse_coverage("沙丘2 Dune Part Two 2024 2160p"), Ok(None));
    }
}

// ============================================================================
// Candidate Filtering and Selection Tests
// ============================================================================

mod release_selection {
    /// A listing entry as scraped from a search results page
    #[derive(Debug, Clone)]
    struct Entry {
        title: String,
    }

    impl Entry {
        fn new(title: &str) -> Self {
            Self {
                title: title.to_string(),
            }
        }
    }

    /// Title / year / exclusion gate applied before any ranking
    fn matches_query(
        entry: &Entry,
        wanted_title: &str,
        wanted_year: Option<i64>,
        exclude: &[&str],
    ) -> bool {
        let lower = entry.title.to_lowercase();
        if !lower.contains(&wanted_title.to_lowercase()) {
            return false;
        }
        if let Some(year) = wanted_year {
            if !entry.title.contains(&year.to_string()) {
                return false;
            }
        }
        !exclude.iter().any(|kw| lower.contains(&kw.to_lowercase()))
    }

    /// Two-tier resolution preference: preferred bucket wins outright,
    /// fallback only fills an empty preferred bucket
    fn pick_bucket<'a>(
        entries: &'a [Entry],
        preferred: &str,
        fallback: &str,
    ) -> Vec<&'a Entry> {
        let preferred_hits: Vec<&Entry> = entries
            .iter()
            .filter(|e| e.title.to_lowercase().contains(&preferred.to_lowercase()))
            .collect();
        if !preferred_hits.is_empty() {
            return preferred_hits;
        }
        entries
            .iter()
            .filter(|e| e.title.to_lowercase().contains(&fallback.to_lowercase()))
            .collect()
    }

    /// Widest span wins; the earliest listing wins a width tie
    fn select_widest(spans: &[(u32, u32)]) -> Option<usize> {
        let mut best: Option<(usize, u32)> = None;
        for (index, (start, end)) in spans.iter().enumerate() {
            let width = end - start;
            match best {
                Some((_, best_width)) if width <= best_width => {}
                _ => best = Some((index, width)),
            }
        }
        best.map(|(index, _)| index)
    }

    #[test]
    fn test_movie_search_scenario() {
        // Simulate a movie-site results page for 沙丘 (2021)
        let entries = vec![
            Entry::new("沙丘 Dune 2021 2160p HDR 蓝光原盘 [55.6GB]"),
            Entry::new("沙丘 Dune 2021 1080p BluRay [12.3GB]"),
            Entry::new("沙丘2 Dune Part Two 2024 2160p [60.1GB]"),
            Entry::new("沙丘 Dune 2021 2160p 60帧 高码版 [82.0GB]"),
            Entry::new("异星灾变 第一季 2020 1080p"),
        ];

        let matched: Vec<&Entry> = entries
            .iter()
            .filter(|e| matches_query(e, "沙丘", Some(2021), &["60帧", "高码版"]))
            .collect();

        // The sequel lacks 2021, the reframed cut is excluded, the stray
        // series never mentions the title
        assert_eq!(matched.len(), 2, "exactly the two 2021 editions survive");
        assert!(matched.iter().all(|e| e.title.contains("2021")));
    }

    #[test]
    fn test_preferred_bucket_shadows_fallback() {
        let entries = vec![
            Entry::new("沙丘 Dune 2021 1080p BluRay"),
            Entry::new("沙丘 Dune 2021 2160p HDR"),
        ];
        let picked = pick_bucket(&entries, "2160p", "1080p");
        assert_eq!(picked.len(), 1);
        assert!(picked[0].title.contains("2160p"));
    }

    #[test]
    fn test_fallback_bucket_fills_empty_preferred() {
        let entries = vec![
            Entry::new("沙丘 Dune 2021 1080p BluRay"),
            Entry::new("沙丘 Dune 2021 720p WEB-DL"),
        ];
        let picked = pick_bucket(&entries, "2160p", "1080p");
        assert_eq!(picked.len(), 1);
        assert!(picked[0].title.contains("1080p"));
    }

    #[test]
    fn test_no_resolution_match_yields_nothing() {
        let entries = vec![Entry::new("沙丘 Dune 2021 720p WEB-DL")];
        assert!(pick_bucket(&entries, "2160p", "1080p").is_empty());
    }

    #[test]
    fn test_widest_span_wins() {
        // 第01-08集 beats 第03集 and 第05-06集
        let spans = vec![(3, 3), (1, 8), (5, 6)];
        assert_eq!(select_widest(&spans), Some(1));
    }

    #[test]
    fn test_first_listing_wins_width_tie() {
        let spans = vec![(1, 4), (5, 8), (2, 2)];
        assert_eq!(select_widest(&spans), Some(0));
    }

    #[test]
    fn test_empty_spans_select_nothing() {
        assert_eq!(select_widest(&[]), None);
    }
}

// ============================================================================
// Download Window Application Tests
// ============================================================================

mod download_windows {
    use assert_matches::assert_matches;
    use std::collections::BTreeSet;

    /// What a confirmed download does to a ledger row's missing set
    #[derive(Debug, PartialEq)]
    enum LedgerAction {
        /// Every missing episode is covered: the row is deleted
        Delete,
        /// Part of the gap is covered: the row keeps the remainder
        Shrink(BTreeSet<u32>),
        /// The window missed the row entirely
        Untouched,
    }

    fn apply_window(missing: &BTreeSet<u32>, start: u32, end: u32) -> LedgerAction {
        let remaining: BTreeSet<u32> = missing
            .iter()
            .copied()
            .filter(|e| *e < start || *e > end)
            .collect();
        if remaining.is_empty() {
            LedgerAction::Delete
        } else if remaining.len() == missing.len() {
            LedgerAction::Untouched
        } else {
            LedgerAction::Shrink(remaining)
        }
    }

    fn set(episodes: &[u32]) -> BTreeSet<u32> {
        episodes.iter().copied().collect()
    }

    #[test]
    fn test_partial_window_shrinks() {
        let missing = set(&[1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12]);
        assert_matches!(
            apply_window(&missing, 1, 4),
            LedgerAction::Shrink(rest) if rest == set(&[5, 6, 7, 8, 9, 10, 11, 12])
        );
    }

    #[test]
    fn test_final_window_deletes() {
        let missing = set(&[5, 6, 7, 8, 9, 10, 11, 12]);
        assert_eq!(apply_window(&missing, 5, 12), LedgerAction::Delete);
    }

    #[test]
    fn test_oversized_window_deletes() {
        // A full-run release covers more than the gap; the row still just
        // goes away
        let missing = set(&[3, 4]);
        assert_eq!(apply_window(&missing, 1, 12), LedgerAction::Delete);
    }

    #[test]
    fn test_disjoint_window_is_untouched() {
        let missing = set(&[7, 8, 9]);
        assert_eq!(apply_window(&missing, 1, 4), LedgerAction::Untouched);
    }

    #[test]
    fn test_single_episode_window() {
        let missing = set(&[4, 9]);
        assert_matches!(apply_window(&missing, 4, 4), LedgerAction::Shrink(rest) if rest == set(&[9]));
    }

    #[test]
    fn test_windows_never_grow_the_gap() {
        // Whatever the window, the remainder is a subset of the original
        let missing = set(&[2, 5, 8]);
        for (start, end) in [(1, 3), (5, 5), (1, 12), (9, 10)] {
            if let LedgerAction::Shrink(remaining) = apply_window(&missing, start, end) {
                assert!(remaining.is_subset(&missing));
                assert!(remaining.len() < missing.len());
            }
        }
    }
}
