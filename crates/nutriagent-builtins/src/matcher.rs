//! Lexical scoring for matching user queries against food descriptions.

use std::collections::HashSet;

/// Score how well `candidate` matches `query`, in `0.0..=1.0`.
///
/// Both sides are tokenised and crudely singularised, then scored by the
/// harmonic mean of query coverage and candidate precision. A candidate that
/// contains every query token scores high; long descriptions that bury the
/// match among unrelated tokens score lower than tight ones.
pub fn match_score(query: &str, candidate: &str) -> f64 {
    let q = tokens(query);
    let c = tokens(candidate);
    if q.is_empty() || c.is_empty() {
        return 0.0;
    }

    let common = q.intersection(&c).count() as f64;
    if common == 0.0 {
        return 0.0;
    }

    let coverage = common / q.len() as f64;
    let precision = common / c.len() as f64;
    2.0 * coverage * precision / (coverage + precision)
}

/// Pick the best-scoring candidate, if any scores above zero.
pub fn best_match<'a, T>(query: &str, candidates: &'a [T], describe: impl Fn(&T) -> &str) -> Option<&'a T> {
    let mut best: Option<(&T, f64)> = None;
    for candidate in candidates {
        let score = match_score(query, describe(candidate));
        if score <= 0.0 {
            continue;
        }
        match best {
            Some((_, top)) if top >= score => {}
            _ => best = Some((candidate, score)),
        }
    }
    best.map(|(c, _)| c)
}

fn tokens(text: &str) -> HashSet<String> {
    text.split(|ch: char| !ch.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(normalize)
        .collect()
}

/// Lowercase and trim a plural 's'. Keeps short words intact so "as" or
/// "is" are not mangled.
fn normalize(token: &str) -> String {
    let lower = token.to_lowercase();
    if lower.len() > 3 && lower.ends_with('s') && !lower.ends_with("ss") {
        lower[..lower.len() - 1].to_string()
    } else {
        lower
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plural_queries_match_singular_descriptions() {
        assert!(match_score("apples", "Apple, raw") > 0.0);
        assert!(match_score("apple", "Apples, raw, with skin") > 0.0);
    }

    #[test]
    fn test_tighter_descriptions_score_higher() {
        let tight = match_score("chicken breast", "Chicken, breast, roasted");
        let loose = match_score(
            "chicken breast",
            "Soup, chicken noodle, canned, condensed, with breast meat and extras",
        );
        assert!(tight > loose);
    }

    #[test]
    fn test_disjoint_tokens_score_zero() {
        assert_eq!(match_score("banana", "Spinach, raw"), 0.0);
        assert_eq!(match_score("", "Spinach, raw"), 0.0);
    }

    #[test]
    fn test_best_match_skips_zero_scores() {
        let candidates = vec!["Spinach, raw", "Bananas, raw", "Banana chips"];
        let best = best_match("banana", &candidates, |c| c);
        assert_eq!(best, Some(&"Bananas, raw"));

        assert!(best_match("quinoa", &candidates, |c| c).is_none());
    }

    #[test]
    fn test_double_s_words_keep_their_suffix() {
        assert_eq!(normalize("glass"), "glass");
        assert_eq!(normalize("Oats"), "oat");
    }
}
