//! Splits entry text into alternating literal-text and math-notation
//! segments. Highlighting only ever touches text segments; math segments
//! carry their delimiters verbatim so the typesetting engine sees exactly
//! the source the author wrote.

use once_cell::sync::Lazy;
use regex::Regex;

// Block $$...$$ must come before inline $...$ so a block opener is never
// consumed as an empty inline expression. The inline form requires a first
// inner character that is neither `$` nor a newline.
static MATH_DELIMITERS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$\$[\s\S]+?\$\$|\\\[[\s\S]+?\\\]|\\\([\s\S]+?\\\)|\$[^$\n][^$]*\$")
        .expect("math delimiter pattern compiles")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Text(String),
    Math(String),
}

impl Segment {
    pub fn content(&self) -> &str {
        match self {
            Segment::Text(content) | Segment::Math(content) => content,
        }
    }

    pub fn is_math(&self) -> bool {
        matches!(self, Segment::Math(_))
    }
}

/// Partitions `text` into segments whose concatenation reproduces it
/// exactly. Empty slices between adjacent matches are not emitted; a fully
/// empty input still surfaces one empty text segment so callers always see
/// at least one segment.
pub fn split(text: &str) -> Vec<Segment> {
    if text.is_empty() {
        return vec![Segment::Text(String::new())];
    }
    let mut segments = Vec::new();
    let mut cursor = 0;
    for found in MATH_DELIMITERS.find_iter(text) {
        if found.start() > cursor {
            segments.push(Segment::Text(text[cursor..found.start()].to_string()));
        }
        segments.push(Segment::Math(found.as_str().to_string()));
        cursor = found.end();
    }
    if cursor < text.len() {
        segments.push(Segment::Text(text[cursor..].to_string()));
    }
    segments
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rejoin(segments: &[Segment]) -> String {
        segments.iter().map(Segment::content).collect()
    }

    #[test]
    fn plain_text_is_one_segment() {
        let segments = split("no math here");
        assert_eq!(segments, vec![Segment::Text("no math here".to_string())]);
    }

    #[test]
    fn empty_input_yields_one_empty_text_segment() {
        assert_eq!(split(""), vec![Segment::Text(String::new())]);
    }

    #[test]
    fn inline_dollars_become_math() {
        let segments = split("Let $p$ be prime.");
        assert_eq!(
            segments,
            vec![
                Segment::Text("Let ".to_string()),
                Segment::Math("$p$".to_string()),
                Segment::Text(" be prime.".to_string()),
            ]
        );
    }

    #[test]
    fn block_dollars_win_over_inline() {
        let segments = split("so $$a^2 + b^2 = c^2$$ holds");
        assert_eq!(segments[1], Segment::Math("$$a^2 + b^2 = c^2$$".to_string()));
        assert_eq!(segments.len(), 3);
    }

    #[test]
    fn bracket_and_paren_delimiters_are_recognized() {
        let segments = split(r"before \[ x \] middle \( y \) after");
        let math: Vec<&str> = segments
            .iter()
            .filter(|s| s.is_math())
            .map(|s| s.content())
            .collect();
        assert_eq!(math, [r"\[ x \]", r"\( y \)"]);
    }

    #[test]
    fn adjacent_math_emits_no_empty_text_between() {
        let segments = split("$a$$b$");
        // `$a$` then `$b$`: the block form cannot match because the middle
        // `$$` belongs to two different inline expressions.
        assert_eq!(
            segments,
            vec![
                Segment::Math("$a$".to_string()),
                Segment::Math("$b$".to_string()),
            ]
        );
    }

    #[test]
    fn unterminated_delimiters_stay_text() {
        let segments = split("costs $5 at most");
        assert_eq!(segments, vec![Segment::Text("costs $5 at most".to_string())]);
    }

    #[test]
    fn round_trip_over_catalog_descriptions() {
        let catalog = crate::catalog::Catalog::embedded();
        for entry in catalog.entries() {
            let segments = split(&entry.description);
            assert_eq!(rejoin(&segments), entry.description, "{}", entry.title);
            assert!(segments.iter().any(|s| !s.content().is_empty()));
        }
    }

    #[test]
    fn math_is_never_split_across_segments() {
        let segments = split("x $\\int_a^b f$ y $$z$$");
        let math: Vec<&str> = segments
            .iter()
            .filter(|s| s.is_math())
            .map(|s| s.content())
            .collect();
        assert_eq!(math, ["$\\int_a^b f$", "$$z$$"]);
        assert_eq!(rejoin(&segments), "x $\\int_a^b f$ y $$z$$");
    }
}
