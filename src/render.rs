//! Card rendering and typesetting.
//!
//! `build_cards` turns a ranked entry list into a card subtree with
//! pre-render highlight markers already in place. Typesetting is external
//! behind [`Typesetter`]: engines offer an asynchronous typeset with a
//! completion signal and a synchronous legacy variant. `run_typeset` chains
//! onto whichever is available and never lets an engine failure block
//! rendering; math source simply stays in place.

use crate::catalog::Entry;
use crate::dom::{Document, NodeId};
use crate::highlight::{MARK_TAG, TokenPatterns, match_spans};
use crate::segment::{self, Segment};
use async_trait::async_trait;
use std::error::Error;
use std::fmt;
use tracing::warn;

#[derive(Debug)]
pub enum TypesetError {
    Engine(String),
}

impl fmt::Display for TypesetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypesetError::Engine(message) => write!(f, "typeset error: {message}"),
        }
    }
}

impl Error for TypesetError {}

/// An external math-typesetting engine operating on a rendered subtree.
#[async_trait]
pub trait Typesetter: Send + Sync {
    /// Asynchronous typeset with a fulfilled/rejected completion.
    async fn typeset(&self, doc: &mut Document, root: NodeId) -> Result<(), TypesetError>;

    /// Synchronous legacy variant.
    fn typeset_sync(&self, doc: &mut Document, root: NodeId) -> Result<(), TypesetError>;

    /// Whether the asynchronous variant is available at all.
    fn has_promise(&self) -> bool {
        true
    }
}

/// Builds one card per ranked entry under a fresh grid element and returns
/// the grid id. Title, description, and tags carry pre-render highlight
/// markers; math runs stay plain text so the typesetting engine finds them.
pub fn build_cards(doc: &mut Document, entries: &[&Entry], patterns: &TokenPatterns) -> NodeId {
    let grid = doc.create_element_with("div", &[("class", "theorem-grid")]);
    for entry in entries {
        let card = doc.create_element_with("div", &[("class", "theorem-card")]);

        let title = doc.create_element("h3");
        append_highlighted(doc, title, &entry.title, patterns);
        doc.append_child(card, title);

        let description = doc.create_element("p");
        append_highlighted(doc, description, &entry.description, patterns);
        doc.append_child(card, description);

        let tags = doc.create_element_with("div", &[("class", "tags")]);
        for tag in &entry.tags {
            let chip = doc.create_element_with("span", &[("class", "tag")]);
            append_highlighted(doc, chip, tag, patterns);
            doc.append_child(tags, chip);
        }
        doc.append_child(card, tags);

        // Opens in a new, unrelated browsing context.
        let anchor = doc.create_element_with(
            "a",
            &[
                ("class", "read-more"),
                ("href", &entry.link),
                ("target", "_blank"),
                ("rel", "noopener noreferrer"),
            ],
        );
        let label = doc.create_text("Read the proof →");
        doc.append_child(anchor, label);
        doc.append_child(card, anchor);

        doc.append_child(grid, card);
    }
    grid
}

/// Appends a field's content under `parent`: math segments as verbatim text
/// nodes, text segments split around merged match spans with markers.
fn append_highlighted(doc: &mut Document, parent: NodeId, text: &str, patterns: &TokenPatterns) {
    for piece in segment::split(text) {
        match piece {
            Segment::Math(content) => {
                let node = doc.create_text(&content);
                doc.append_child(parent, node);
            }
            Segment::Text(content) => {
                let mut cursor = 0;
                for span in match_spans(&content, patterns) {
                    if span.start > cursor {
                        let before = doc.create_text(&content[cursor..span.start]);
                        doc.append_child(parent, before);
                    }
                    let marker = doc.create_element(MARK_TAG);
                    let matched = doc.create_text(&content[span.clone()]);
                    doc.append_child(marker, matched);
                    doc.append_child(parent, marker);
                    cursor = span.end;
                }
                if cursor < content.len() {
                    let rest = doc.create_text(&content[cursor..]);
                    doc.append_child(parent, rest);
                }
            }
        }
    }
}

/// Runs the typesetting chain: the promise variant when offered, the legacy
/// fallback on rejection or when only the legacy call exists, and nothing at
/// all without an engine. Failures are logged and swallowed so the caller
/// always proceeds to post-render highlighting.
pub async fn run_typeset(doc: &mut Document, root: NodeId, engine: Option<&dyn Typesetter>) {
    let Some(engine) = engine else { return };
    if engine.has_promise() {
        match engine.typeset(doc, root).await {
            Ok(()) => {}
            Err(err) => {
                warn!(%err, "typeset promise rejected; retrying with the legacy call");
                if let Err(err) = engine.typeset_sync(doc, root) {
                    warn!(%err, "legacy typeset failed; leaving math source in place");
                }
            }
        }
    } else if let Err(err) = engine.typeset_sync(doc, root) {
        warn!(%err, "typeset failed; leaving math source in place");
    }
}

/// Replaces every math segment in the subtree's text nodes with a rendered
/// `span.math` element produced by `render`. Shared by engine impls.
pub fn typeset_subtree_with(
    doc: &mut Document,
    root: NodeId,
    render: &dyn Fn(&str) -> Result<String, TypesetError>,
) -> Result<(), TypesetError> {
    for node in doc.text_nodes(root) {
        let Some(content) = doc.text(node) else { continue };
        let segments = segment::split(content);
        if !segments.iter().any(Segment::is_math) {
            continue;
        }
        let Some(parent) = doc.parent(node) else { continue };
        doc.set_text(node, "");
        let mut anchor = node;
        for piece in segments {
            match piece {
                Segment::Text(text) => {
                    let next = doc.create_text(&text);
                    doc.insert_after(parent, next, anchor);
                    anchor = next;
                }
                Segment::Math(source) => {
                    let rendered = render(&source)?;
                    let span = doc.create_element_with("span", &[("class", "math")]);
                    let text = doc.create_text(&rendered);
                    doc.append_child(span, text);
                    doc.insert_after(parent, span, anchor);
                    anchor = span;
                }
            }
        }
    }
    Ok(())
}

/// Terminal typesetting engine: renders TeX-ish math source to plain
/// Unicode. Good enough for card output in a terminal; anything it does not
/// recognize passes through with the backslash dropped.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnicodeTypesetter;

#[async_trait]
impl Typesetter for UnicodeTypesetter {
    async fn typeset(&self, doc: &mut Document, root: NodeId) -> Result<(), TypesetError> {
        self.typeset_sync(doc, root)
    }

    fn typeset_sync(&self, doc: &mut Document, root: NodeId) -> Result<(), TypesetError> {
        typeset_subtree_with(doc, root, &|source| Ok(render_math(source)))
    }
}

const SYMBOLS: &[(&str, &str)] = &[
    ("alpha", "α"),
    ("beta", "β"),
    ("gamma", "γ"),
    ("delta", "δ"),
    ("epsilon", "ε"),
    ("varepsilon", "ε"),
    ("theta", "θ"),
    ("lambda", "λ"),
    ("mu", "μ"),
    ("pi", "π"),
    ("sigma", "σ"),
    ("varphi", "φ"),
    ("phi", "φ"),
    ("omega", "ω"),
    ("Sigma", "Σ"),
    ("infty", "∞"),
    ("sum", "Σ"),
    ("prod", "Π"),
    ("int", "∫"),
    ("sqrt", "√"),
    ("cdot", "·"),
    ("cdots", "⋯"),
    ("dots", "…"),
    ("ldots", "…"),
    ("times", "×"),
    ("equiv", "≡"),
    ("le", "≤"),
    ("leq", "≤"),
    ("ge", "≥"),
    ("geq", "≥"),
    ("ne", "≠"),
    ("approx", "≈"),
    ("pm", "±"),
    ("mid", "∣"),
    ("nmid", "∤"),
    ("langle", "⟨"),
    ("rangle", "⟩"),
    ("to", "→"),
    ("rightarrow", "→"),
    ("in", "∈"),
    ("subset", "⊂"),
    ("cup", "∪"),
    ("cap", "∩"),
    ("forall", "∀"),
    ("exists", "∃"),
];

const BLACKBOARD: &[(char, char)] = &[
    ('C', 'ℂ'),
    ('N', 'ℕ'),
    ('Q', 'ℚ'),
    ('R', 'ℝ'),
    ('Z', 'ℤ'),
];

const SUPERSCRIPTS: &[(char, char)] = &[
    ('0', '⁰'),
    ('1', '¹'),
    ('2', '²'),
    ('3', '³'),
    ('4', '⁴'),
    ('5', '⁵'),
    ('6', '⁶'),
    ('7', '⁷'),
    ('8', '⁸'),
    ('9', '⁹'),
    ('+', '⁺'),
    ('-', '⁻'),
    ('(', '⁽'),
    (')', '⁾'),
    ('n', 'ⁿ'),
    ('i', 'ⁱ'),
];

const SUBSCRIPTS: &[(char, char)] = &[
    ('0', '₀'),
    ('1', '₁'),
    ('2', '₂'),
    ('3', '₃'),
    ('4', '₄'),
    ('5', '₅'),
    ('6', '₆'),
    ('7', '₇'),
    ('8', '₈'),
    ('9', '₉'),
    ('+', '₊'),
    ('-', '₋'),
    ('a', 'ₐ'),
    ('e', 'ₑ'),
    ('i', 'ᵢ'),
    ('k', 'ₖ'),
    ('n', 'ₙ'),
];

fn strip_delimiters(source: &str) -> &str {
    for (open, close) in [("$$", "$$"), ("\\[", "\\]"), ("\\(", "\\)"), ("$", "$")] {
        if source.len() >= open.len() + close.len()
            && source.starts_with(open)
            && source.ends_with(close)
        {
            return &source[open.len()..source.len() - close.len()];
        }
    }
    source
}

/// Renders one delimited math expression to Unicode text.
pub fn render_math(source: &str) -> String {
    render_tex(strip_delimiters(source).trim())
}

fn render_tex(input: &str) -> String {
    let mut out = String::new();
    let mut chars = input.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                let mut name = String::new();
                while let Some(&next) = chars.peek() {
                    if next.is_ascii_alphabetic() {
                        name.push(next);
                        chars.next();
                    } else {
                        break;
                    }
                }
                if name.is_empty() {
                    match chars.next() {
                        Some(',') | Some(';') | Some(' ') => out.push(' '),
                        Some('|') => out.push('‖'),
                        Some(other) => out.push(other),
                        None => {}
                    }
                } else {
                    render_command(&name, &mut chars, &mut out);
                }
            }
            '^' => render_script(&mut chars, &mut out, SUPERSCRIPTS, '^'),
            '_' => render_script(&mut chars, &mut out, SUBSCRIPTS, '_'),
            '{' | '}' => {}
            other => out.push(other),
        }
    }
    out
}

fn render_command(
    name: &str,
    chars: &mut std::iter::Peekable<std::str::Chars<'_>>,
    out: &mut String,
) {
    match name {
        "frac" => {
            let numerator = render_tex(&read_group(chars));
            let denominator = render_tex(&read_group(chars));
            out.push_str(&numerator);
            out.push('/');
            out.push_str(&denominator);
        }
        "binom" => {
            let top = render_tex(&read_group(chars));
            let bottom = render_tex(&read_group(chars));
            out.push_str(&format!("C({top}, {bottom})"));
        }
        "pmod" => {
            let modulus = render_tex(&read_group(chars));
            out.push_str(&format!("(mod {modulus})"));
        }
        "mathbb" => {
            let letters = read_group(chars);
            for letter in letters.chars() {
                match BLACKBOARD.iter().find(|(plain, _)| *plain == letter) {
                    Some((_, bb)) => out.push(*bb),
                    None => out.push(letter),
                }
            }
        }
        "mathrm" | "text" | "operatorname" => {
            out.push_str(&read_group(chars));
        }
        _ => match SYMBOLS.iter().find(|(command, _)| *command == name) {
            Some((_, symbol)) => out.push_str(symbol),
            // Unknown command: keep the bare name, so \gcd reads as gcd.
            None => out.push_str(name),
        },
    }
}

fn render_script(
    chars: &mut std::iter::Peekable<std::str::Chars<'_>>,
    out: &mut String,
    table: &[(char, char)],
    operator: char,
) {
    let argument = match chars.peek() {
        Some('{') => render_tex(&read_group(chars)),
        Some(_) => chars.next().map(String::from).unwrap_or_default(),
        None => String::new(),
    };
    let mapped: Option<String> = argument
        .chars()
        .map(|c| table.iter().find(|(plain, _)| *plain == c).map(|(_, s)| *s))
        .collect();
    match mapped {
        Some(script) if !script.is_empty() => out.push_str(&script),
        _ => {
            out.push(operator);
            if argument.chars().count() > 1 {
                out.push('(');
                out.push_str(&argument);
                out.push(')');
            } else {
                out.push_str(&argument);
            }
        }
    }
}

/// Reads one balanced `{...}` group, or a single character when the
/// argument is unbraced.
fn read_group(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> String {
    match chars.peek() {
        Some('{') => {
            chars.next();
            let mut depth = 1;
            let mut group = String::new();
            for c in chars.by_ref() {
                match c {
                    '{' => depth += 1,
                    '}' => {
                        depth -= 1;
                        if depth == 0 {
                            break;
                        }
                    }
                    _ => {}
                }
                group.push(c);
            }
            group
        }
        Some(_) => chars.next().map(String::from).unwrap_or_default(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Entry;
    use crate::search::normalize;

    fn entry() -> Entry {
        Entry {
            title: "Fermat's Little Theorem".to_string(),
            description: "If $p$ is prime, then $a^{p-1} \\equiv 1 \\pmod{p}$.".to_string(),
            tags: vec!["number theory".to_string()],
            link: "proofs/fermat-little.html".to_string(),
        }
    }

    #[test]
    fn cards_carry_premarked_fields_and_outbound_links() {
        let fermat = entry();
        let mut doc = Document::new();
        let patterns = TokenPatterns::compile(&normalize("fermat"));
        let grid = build_cards(&mut doc, &[&fermat], &patterns);
        let html = doc.to_html(grid);
        assert!(html.contains("<h3><mark>Fermat</mark>"));
        assert!(html.contains("class=\"tag\""));
        assert!(html.contains("target=\"_blank\""));
        assert!(html.contains("rel=\"noopener noreferrer\""));
        // Math source is intact before typesetting.
        assert!(doc.text_content(grid).contains("$a^{p-1} \\equiv 1 \\pmod{p}$"));
    }

    #[test]
    fn highlight_never_marks_inside_math() {
        let mut card = entry();
        card.title = "About $p$".to_string();
        let mut doc = Document::new();
        let patterns = TokenPatterns::compile(&normalize("p"));
        let grid = build_cards(&mut doc, &[&card], &patterns);
        let html = doc.to_html(grid);
        assert!(html.contains("$p$"));
        assert!(!html.contains("$<mark>p</mark>$"));
    }

    #[test]
    fn render_math_handles_symbols_and_scripts() {
        assert_eq!(render_math("$a^{p-1} \\equiv 1 \\pmod{p}$"), "a^(p-1) ≡ 1 (mod p)");
        assert_eq!(render_math("$$a^2 + b^2 = c^2$$"), "a² + b² = c²");
        assert_eq!(render_math("\\(\\varphi\\)"), "φ");
        assert_eq!(render_math("$\\gcd(a, p) = 1$"), "gcd(a, p) = 1");
        assert_eq!(render_math("$\\mathbb{R}^n$"), "ℝⁿ");
        assert_eq!(render_math("$\\frac{a}{b}$"), "a/b");
    }

    #[test]
    fn unicode_typesetter_replaces_math_runs() {
        let fermat = entry();
        let mut doc = Document::new();
        let patterns = TokenPatterns::default();
        let grid = build_cards(&mut doc, &[&fermat], &patterns);
        UnicodeTypesetter.typeset_sync(&mut doc, grid).unwrap();
        let text = doc.text_content(grid);
        assert!(!text.contains('$'));
        assert!(text.contains("≡ 1 (mod p)"));
        let html = doc.to_html(grid);
        assert!(html.contains("<span class=\"math\">"));
    }

    #[tokio::test]
    async fn run_typeset_survives_a_rejecting_engine() {
        struct Rejecting;
        #[async_trait]
        impl Typesetter for Rejecting {
            async fn typeset(&self, _: &mut Document, _: NodeId) -> Result<(), TypesetError> {
                Err(TypesetError::Engine("promise rejected".to_string()))
            }
            fn typeset_sync(&self, doc: &mut Document, root: NodeId) -> Result<(), TypesetError> {
                typeset_subtree_with(doc, root, &|source| Ok(render_math(source)))
            }
        }

        let fermat = entry();
        let mut doc = Document::new();
        let grid = build_cards(&mut doc, &[&fermat], &TokenPatterns::default());
        run_typeset(&mut doc, grid, Some(&Rejecting)).await;
        // Legacy fallback still typeset the subtree.
        assert!(!doc.text_content(grid).contains('$'));
    }

    #[tokio::test]
    async fn run_typeset_uses_legacy_when_promise_is_missing() {
        struct LegacyOnly;
        #[async_trait]
        impl Typesetter for LegacyOnly {
            async fn typeset(&self, _: &mut Document, _: NodeId) -> Result<(), TypesetError> {
                Err(TypesetError::Engine("no promise variant".to_string()))
            }
            fn typeset_sync(&self, doc: &mut Document, root: NodeId) -> Result<(), TypesetError> {
                typeset_subtree_with(doc, root, &|source| Ok(render_math(source)))
            }
            fn has_promise(&self) -> bool {
                false
            }
        }

        let fermat = entry();
        let mut doc = Document::new();
        let grid = build_cards(&mut doc, &[&fermat], &TokenPatterns::default());
        run_typeset(&mut doc, grid, Some(&LegacyOnly)).await;
        assert!(!doc.text_content(grid).contains('$'));
    }

    #[tokio::test]
    async fn run_typeset_without_engine_is_a_no_op() {
        let fermat = entry();
        let mut doc = Document::new();
        let grid = build_cards(&mut doc, &[&fermat], &TokenPatterns::default());
        let before = doc.to_html(grid);
        run_typeset(&mut doc, grid, None).await;
        assert_eq!(doc.to_html(grid), before);
    }
}
