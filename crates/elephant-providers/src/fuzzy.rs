//! Scoring front-end shared by the built-in providers. The dispatcher only
//! ever sees the resulting numbers on the item.

use std::sync::OnceLock;

use fuzzy_matcher::skim::SkimMatcherV2;
use fuzzy_matcher::FuzzyMatcher;

/// A scored match against one display field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Match {
    pub score: i32,
    /// Character positions to highlight.
    pub positions: Vec<i32>,
    pub start: i32,
}

fn matcher() -> &'static SkimMatcherV2 {
    static MATCHER: OnceLock<SkimMatcherV2> = OnceLock::new();
    MATCHER.get_or_init(SkimMatcherV2::default)
}

/// Score `query` against `target`. `exact` requires a case-insensitive
/// substring match instead of subsequence matching. Empty queries and
/// non-matches yield `None`.
pub fn score(query: &str, target: &str, exact: bool) -> Option<Match> {
    if query.is_empty() {
        return None;
    }

    if exact {
        return exact_match(query, target);
    }

    let (score, indices) = matcher().fuzzy_indices(target, query)?;
    let positions: Vec<i32> = indices.iter().map(|&i| i as i32).collect();
    let start = positions.first().copied().unwrap_or(0);
    Some(Match {
        score: score.clamp(0, i32::MAX as i64) as i32,
        positions,
        start,
    })
}

fn exact_match(query: &str, target: &str) -> Option<Match> {
    let haystack = target.to_lowercase();
    let needle = query.to_lowercase();
    let byte_start = haystack.find(&needle)?;

    let start = target[..byte_start].chars().count() as i32;
    let len = query.chars().count() as i32;
    let positions: Vec<i32> = (start..start + len).collect();

    // earlier matches rank higher
    Some(Match {
        score: (100 - start).max(1),
        positions,
        start,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_query_matches_nothing() {
        assert!(score("", "firefox", false).is_none());
        assert!(score("", "firefox", true).is_none());
    }

    #[test]
    fn fuzzy_subsequence_matches() {
        let m = score("ffx", "Firefox", false).expect("subsequence should match");
        assert!(m.score > 0);
        assert_eq!(m.positions.len(), 3);
    }

    #[test]
    fn fuzzy_miss_is_none() {
        assert!(score("xyz", "Firefox", false).is_none());
    }

    #[test]
    fn exact_requires_substring() {
        assert!(score("ffx", "Firefox", true).is_none());
        let m = score("fox", "Firefox", true).expect("substring should match");
        assert_eq!(m.start, 4);
        assert_eq!(m.positions, vec![4, 5, 6]);
    }

    #[test]
    fn exact_is_case_insensitive() {
        assert!(score("FIRE", "firefox", true).is_some());
    }

    #[test]
    fn earlier_exact_match_scores_higher() {
        let early = score("fire", "Firefox", true).unwrap();
        let late = score("fox", "Firefox", true).unwrap();
        assert!(early.score > late.score);
    }

    #[test]
    fn better_fuzzy_match_scores_higher() {
        let tight = score("firefox", "Firefox", false).unwrap();
        let loose = score("ffx", "Firefox", false).unwrap();
        assert!(tight.score > loose.score);
    }
}
