//! Canonical text form for episode-number sets.
//!
//! SQLite rows store an episode set as a sorted comma-joined string
//! ("1,2,5"). In memory it is always a real integer set; these helpers are
//! the only place the two representations meet.

use std::collections::BTreeSet;

/// Parse the stored text form into a set. Blank fragments and duplicates are
/// tolerated; anything non-numeric is dropped rather than failing the row.
pub fn parse_episode_set(text: &str) -> BTreeSet<u32> {
    text.split(',')
        .filter_map(|part| part.trim().parse::<u32>().ok())
        .collect()
}

/// Join a set back into the canonical sorted text form.
pub fn join_episode_set(set: &BTreeSet<u32>) -> String {
    set.iter()
        .map(|episode| episode.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

/// The full range 1..=total as a set.
pub fn full_episode_range(total: u32) -> BTreeSet<u32> {
    (1..=total).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_canonical() {
        let set = parse_episode_set("1,2,5");
        assert_eq!(set, BTreeSet::from([1, 2, 5]));
    }

    #[test]
    fn test_parse_is_lenient() {
        assert_eq!(parse_episode_set(""), BTreeSet::new());
        assert_eq!(parse_episode_set(" 3 , 1 ,,x,3"), BTreeSet::from([1, 3]));
    }

    #[test]
    fn test_join_sorts() {
        let set = BTreeSet::from([5, 1, 2]);
        assert_eq!(join_episode_set(&set), "1,2,5");
        assert_eq!(join_episode_set(&BTreeSet::new()), "");
    }

    #[test]
    fn test_round_trip() {
        let set = BTreeSet::from([1, 4, 12]);
        assert_eq!(parse_episode_set(&join_episode_set(&set)), set);
    }

    #[test]
    fn test_full_range() {
        assert_eq!(full_episode_range(3), BTreeSet::from([1, 2, 3]));
        assert!(full_episode_range(0).is_empty());
    }
}
