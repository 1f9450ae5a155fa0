//! Match-span computation and pre-render highlighting.
//!
//! Tokens are compiled once per query into escaped, case-insensitive
//! patterns, so no token value can produce a malformed or unintentionally
//! powerful pattern. All token matches in a text segment are collected in a
//! single pass and union-merged (leftmost span wins the start, longest reach
//! wins the end) before any markup is emitted; sequential per-token
//! replacement could otherwise corrupt markers inserted by an earlier token.

use crate::segment::{self, Segment};
use regex::{Regex, RegexBuilder};
use std::ops::Range;

/// Element name used for highlight markers.
pub const MARK_TAG: &str = "mark";
pub const MARK_OPEN: &str = "<mark>";
pub const MARK_CLOSE: &str = "</mark>";

/// Compiled per-query token patterns. Empty tokens are dropped at
/// compilation so downstream passes never special-case them.
#[derive(Debug, Default)]
pub struct TokenPatterns {
    patterns: Vec<Regex>,
}

impl TokenPatterns {
    pub fn compile(tokens: &[String]) -> Self {
        let patterns = tokens
            .iter()
            .filter(|token| !token.is_empty())
            .map(|token| {
                RegexBuilder::new(&regex::escape(token))
                    .case_insensitive(true)
                    .build()
                    .expect("escaped token pattern compiles")
            })
            .collect();
        Self { patterns }
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Regex> {
        self.patterns.iter()
    }
}

/// All token match spans in `text`, merged into non-overlapping byte ranges
/// in ascending order.
pub fn match_spans(text: &str, patterns: &TokenPatterns) -> Vec<Range<usize>> {
    let mut spans = Vec::new();
    for pattern in patterns.iter() {
        for found in pattern.find_iter(text) {
            if found.start() < found.end() {
                spans.push(found.start()..found.end());
            }
        }
    }
    merge_spans(spans)
}

fn merge_spans(mut spans: Vec<Range<usize>>) -> Vec<Range<usize>> {
    spans.sort_by(|a, b| a.start.cmp(&b.start).then(b.end.cmp(&a.end)));
    let mut merged: Vec<Range<usize>> = Vec::new();
    for span in spans {
        match merged.last_mut() {
            Some(last) if span.start <= last.end => {
                if span.end > last.end {
                    last.end = span.end;
                }
            }
            _ => merged.push(span),
        }
    }
    merged
}

/// Pre-render highlighting over a raw field: math segments pass through
/// untouched, text segments get each merged match span wrapped in a marker.
/// The output replaces the field in the generated card markup.
pub fn highlight_segments(text: &str, tokens: &[String]) -> String {
    let patterns = TokenPatterns::compile(tokens);
    highlight_segments_with(text, &patterns, |piece| piece.to_string())
}

/// Same as [`highlight_segments`] but with an output encoder applied to
/// every emitted slice (marker markup excluded), so callers embedding the
/// result in HTML can entity-escape content without touching the pipeline.
pub fn highlight_segments_with(
    text: &str,
    patterns: &TokenPatterns,
    encode: impl Fn(&str) -> String,
) -> String {
    let mut out = String::with_capacity(text.len());
    for segment in segment::split(text) {
        match segment {
            Segment::Math(content) => out.push_str(&encode(&content)),
            Segment::Text(content) => {
                let mut cursor = 0;
                for span in match_spans(&content, patterns) {
                    out.push_str(&encode(&content[cursor..span.start]));
                    out.push_str(MARK_OPEN);
                    out.push_str(&encode(&content[span.clone()]));
                    out.push_str(MARK_CLOSE);
                    cursor = span.end;
                }
                out.push_str(&encode(&content[cursor..]));
            }
        }
    }
    out
}
