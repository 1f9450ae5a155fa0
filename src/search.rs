//! Query normalization, per-field scoring, and ranking.
//!
//! Matching is tiered: a substring hit scores highest (plus a bonus when the
//! field starts with the token), and a Levenshtein pass over the field's
//! leading characters catches near-miss typos. Field scores are combined with
//! fixed weights so title hits dominate tag hits, which dominate description
//! hits.

use crate::catalog::Entry;
use rapidfuzz::distance::levenshtein;

pub const SUBSTRING_POINTS: u32 = 10;
pub const PREFIX_BONUS: u32 = 3;
pub const FUZZY_POINTS: u32 = 3;
pub const MAX_EDIT_DISTANCE: usize = 2;

pub const TITLE_WEIGHT: u32 = 5;
pub const TAG_WEIGHT: u32 = 4;
pub const DESCRIPTION_WEIGHT: u32 = 1;

/// A ranked entry with its weighted total.
#[derive(Debug, Clone, Copy)]
pub struct Scored<'a> {
    pub entry: &'a Entry,
    pub score: u32,
}

fn is_token_char(c: char) -> bool {
    // ASCII word characters plus CJK Unified Ideographs.
    c.is_ascii_alphanumeric() || c == '_' || ('\u{4e00}'..='\u{9fff}').contains(&c)
}

/// Splits a raw query on whitespace and cleans each piece: math-delimiter
/// dollars are dropped, leading escape backslashes are stripped so `\gcd`
/// matches `gcd`, edge punctuation is trimmed, and the result is lowercased.
/// Empty pieces vanish; duplicates survive and score additively.
pub fn normalize(query: &str) -> Vec<String> {
    query
        .split_whitespace()
        .filter_map(|piece| {
            let no_dollars: String = piece.chars().filter(|&c| c != '$').collect();
            let no_escape = no_dollars.trim_start_matches('\\');
            let trimmed = no_escape.trim_matches(|c: char| !is_token_char(c));
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_lowercase())
            }
        })
        .collect()
}

/// Edit distance between the token and the field's leading characters
/// (the whole field when it is shorter than the token). Deliberately not a
/// fuzzy substring search: typos deep inside a long field stay unmatched.
fn prefix_edit_distance(haystack: &str, token: &str) -> usize {
    let token_len = token.chars().count();
    let prefix: String = haystack.chars().take(token_len).collect();
    levenshtein::distance(prefix.chars(), token.chars())
}

/// Scores one text field against the token list. An absent field is scored
/// as the empty string rather than failing.
pub fn score_field(text: &str, tokens: &[String]) -> u32 {
    let haystack = text.to_lowercase();
    let mut total = 0;
    for token in tokens {
        if token.is_empty() {
            continue;
        }
        if let Some(position) = haystack.find(token.as_str()) {
            total += SUBSTRING_POINTS;
            if position == 0 {
                total += PREFIX_BONUS;
            }
        } else if prefix_edit_distance(&haystack, token) <= MAX_EDIT_DISTANCE {
            total += FUZZY_POINTS;
        }
    }
    total
}

/// Weighted total across the three scoreable fields.
pub fn entry_score(entry: &Entry, tokens: &[String]) -> u32 {
    TITLE_WEIGHT * score_field(&entry.title, tokens)
        + TAG_WEIGHT * score_field(&entry.joined_tags(), tokens)
        + DESCRIPTION_WEIGHT * score_field(&entry.description, tokens)
}

/// Ranks entries against the token list, keeping scores for display.
///
/// An empty token list short-circuits to the full catalog in original order;
/// running the zero-score filter instead would return nothing. With tokens
/// present, zero-total entries are dropped and the survivors are stable-sorted
/// by total descending, so equal totals retain their catalog order.
pub fn rank_scored<'a>(entries: &'a [Entry], tokens: &[String]) -> Vec<Scored<'a>> {
    if tokens.is_empty() {
        return entries
            .iter()
            .map(|entry| Scored { entry, score: 0 })
            .collect();
    }
    let mut scored: Vec<Scored<'a>> = entries
        .iter()
        .filter_map(|entry| {
            let score = entry_score(entry, tokens);
            (score > 0).then_some(Scored { entry, score })
        })
        .collect();
    scored.sort_by(|a, b| b.score.cmp(&a.score));
    scored
}

/// Ranks entries and returns them without scores.
pub fn rank<'a>(entries: &'a [Entry], tokens: &[String]) -> Vec<&'a Entry> {
    rank_scored(entries, tokens)
        .into_iter()
        .map(|scored| scored.entry)
        .collect()
}
