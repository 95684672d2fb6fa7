//! Normalizer. Canonicalizes raw text into a lookup key.
//!
//! Pure, deterministic, and idempotent: `normalize(normalize(t)) == normalize(t)`
//! for any fixed [`NormalizeConfig`].

use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

use crate::config::NormalizeConfig;

/// Canonical form of user input text, used as the Hot Index / DB lookup key.
pub type NormalizedText = String;

const NUMBER_PLACEHOLDER: &str = "<num>";

static MINIMAX_PAUSE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<#[0-9.]+#>").unwrap());
static MINIMAX_INTERJECTION: Lazy<Regex> = Lazy::new(|| Regex::new(r"\([a-z_]+\)").unwrap());
static PUNCTUATION: Lazy<Regex> = Lazy::new(|| Regex::new(r"\p{P}").unwrap());
static WHITESPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
static DIGIT_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[0-9]+").unwrap());

/// Normalize `text` according to `config`. Stages run in the fixed order
/// below so that later stages never consume a fragment an earlier stage
/// would have removed.
pub fn normalize(text: &str, config: &NormalizeConfig) -> NormalizedText {
    let mut out = text.to_string();

    if config.strip_minimax {
        out = MINIMAX_PAUSE.replace_all(&out, "").into_owned();
        out = MINIMAX_INTERJECTION.replace_all(&out, "").into_owned();
    }

    if config.lowercase {
        out = locale_aware_lowercase(&out);
    }

    if config.strip_punctuation {
        out = PUNCTUATION.replace_all(&out, "").into_owned();
    }

    if config.collapse_whitespace {
        out = WHITESPACE_RUN.replace_all(&out, " ").trim().to_string();
    }

    if config.replace_numbers {
        out = DIGIT_RUN.replace_all(&out, NUMBER_PLACEHOLDER).into_owned();
    }

    out
}

/// Case-fold with a Turkish-aware dotted/dotless-I rule, then fold
/// diacritics to their ASCII-adjacent base letter via NFKD decomposition
/// and combining-mark removal.
fn locale_aware_lowercase(s: &str) -> String {
    let mut folded = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            // Turkish dotted capital İ → dotted lowercase i (not the
            // dotless ı that plain `to_lowercase` would not produce either,
            // but explicit so the rule is visible and testable).
            '\u{0130}' => folded.push('i'),
            // Turkish dotless capital I maps to dotless lowercase ı in a
            // Turkish locale; outside that locale this is the same as the
            // default mapping. We keep the default (ASCII-compatible) path
            // since no locale is threaded through the config.
            other => {
                for lower in other.to_lowercase() {
                    folded.push(lower);
                }
            }
        }
    }

    // Decompose to NFKD and drop combining marks, folding diacritics to
    // their base letter (e.g. "café" -> "cafe").
    folded
        .nfkd()
        .filter(|c| !is_combining_mark(*c))
        .collect()
}

fn is_combining_mark(c: char) -> bool {
    matches!(c as u32,
        0x0300..=0x036F | 0x1AB0..=0x1AFF | 0x1DC0..=0x1DFF | 0x20D0..=0x20FF | 0xFE20..=0xFE2F
    )
}
