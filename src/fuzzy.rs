//! Fuzzy Matcher. Lexical near-match fallback over Hot Index candidates.
//!
//! Disabled by default: the Normalizer already handles case and
//! diacritics, so exact match on normalized text is typically sufficient.

use std::collections::HashSet;

/// Runtime fuzzy-matching configuration (mirrors [`crate::config::FuzzyConfig`]
/// but detached from serde so callers can build one ad hoc, e.g. in tests).
#[derive(Debug, Clone)]
pub struct FuzzyConfig {
    pub enabled: bool,
    pub threshold: u32,
    pub scorer: String,
}

impl From<&crate::config::FuzzyConfig> for FuzzyConfig {
    fn from(c: &crate::config::FuzzyConfig) -> Self {
        Self {
            enabled: c.enabled,
            threshold: c.threshold,
            scorer: c.scorer.clone(),
        }
    }
}

/// Result of a successful fuzzy lookup.
#[derive(Debug, Clone)]
pub struct FuzzyMatch {
    pub matched_text: String,
    pub path: String,
    pub score: u32,
}

/// Resolve a scorer function by name from the registry.
/// Unknown names fall back to `ratio`.
fn scorer_by_name(name: &str) -> fn(&str, &str) -> u32 {
    match name {
        "partial_ratio" => partial_ratio,
        "token_set_ratio" => token_set_ratio,
        _ => ratio,
    }
}

/// Whole-string similarity, 0..100.
pub fn ratio(a: &str, b: &str) -> u32 {
    let score = strsim::normalized_levenshtein(a, b);
    (score * 100.0).round().clamp(0.0, 100.0) as u32
}

/// Best ratio of `a` against any equal-length window of the longer string,
/// approximating fuzzywuzzy's "partial ratio" with strsim primitives.
pub fn partial_ratio(a: &str, b: &str) -> u32 {
    let (shorter, longer) = if a.chars().count() <= b.chars().count() {
        (a, b)
    } else {
        (b, a)
    };

    let short_len = shorter.chars().count();
    let long_chars: Vec<char> = longer.chars().collect();

    if short_len == 0 || long_chars.is_empty() {
        return ratio(a, b);
    }
    if long_chars.len() <= short_len {
        return ratio(a, b);
    }

    let mut best = 0u32;
    for start in 0..=(long_chars.len() - short_len) {
        let window: String = long_chars[start..start + short_len].iter().collect();
        best = best.max(ratio(shorter, &window));
    }
    best
}

/// Tokenize, dedupe, and sort both strings before comparing — insensitive
/// to word order and repeated words (fuzzywuzzy's "token set ratio").
pub fn token_set_ratio(a: &str, b: &str) -> u32 {
    let sorted_unique = |s: &str| -> String {
        let set: HashSet<&str> = s.split_whitespace().collect();
        let mut tokens: Vec<&str> = set.into_iter().collect();
        tokens.sort_unstable();
        tokens.join(" ")
    };
    ratio(&sorted_unique(a), &sorted_unique(b))
}

/// Scan `candidates`, score each against `input_normalized` with the
/// configured scorer, and return the best match meeting `threshold`.
/// Ties are broken by lexicographically-smallest candidate for determinism.
pub fn best_match<'a, I>(
    input_normalized: &str,
    candidates: I,
    config: &FuzzyConfig,
) -> Option<FuzzyMatch>
where
    I: IntoIterator<Item = &'a String>,
{
    if !config.enabled {
        return None;
    }

    let scorer = scorer_by_name(&config.scorer);
    let mut best: Option<(String, u32)> = None;

    for candidate in candidates {
        let score = scorer(input_normalized, candidate);
        if score < config.threshold {
            continue;
        }
        best = match best {
            None => Some((candidate.clone(), score)),
            Some((best_text, best_score)) => {
                if score > best_score || (score == best_score && *candidate < best_text) {
                    Some((candidate.clone(), score))
                } else {
                    Some((best_text, best_score))
                }
            }
        };
    }

    best.map(|(matched_text, score)| FuzzyMatch {
        matched_text,
        path: String::new(),
        score,
    })
}
