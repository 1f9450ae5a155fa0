//! A small retained document tree for rendered cards.
//!
//! Nodes live in a flat arena addressed by index, the same id-into-flat-vec
//! layout the catalog store uses elsewhere in the pack. The tree carries the
//! rendered output of a search: element nodes with attributes and text nodes.
//! The post-render highlighter mutates it in place after typesetting.

use crate::highlight::{MARK_TAG, TokenPatterns};

pub type NodeId = usize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Element {
        tag: String,
        attrs: Vec<(String, String)>,
    },
    Text(String),
}

#[derive(Debug, Clone)]
struct Node {
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    kind: NodeKind,
}

#[derive(Debug, Clone, Default)]
pub struct Document {
    nodes: Vec<Node>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, kind: NodeKind) -> NodeId {
        self.nodes.push(Node {
            parent: None,
            children: Vec::new(),
            kind,
        });
        self.nodes.len() - 1
    }

    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.push(NodeKind::Element {
            tag: tag.to_string(),
            attrs: Vec::new(),
        })
    }

    pub fn create_element_with(&mut self, tag: &str, attrs: &[(&str, &str)]) -> NodeId {
        self.push(NodeKind::Element {
            tag: tag.to_string(),
            attrs: attrs
                .iter()
                .map(|(name, value)| (name.to_string(), value.to_string()))
                .collect(),
        })
    }

    pub fn create_text(&mut self, content: &str) -> NodeId {
        self.push(NodeKind::Text(content.to_string()))
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.nodes[child].parent = Some(parent);
        self.nodes[parent].children.push(child);
    }

    /// Inserts `node` as a sibling immediately after `reference`.
    pub fn insert_after(&mut self, parent: NodeId, node: NodeId, reference: NodeId) {
        self.nodes[node].parent = Some(parent);
        let children = &mut self.nodes[parent].children;
        let position = children
            .iter()
            .position(|&child| child == reference)
            .map(|index| index + 1)
            .unwrap_or(children.len());
        children.insert(position, node);
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id].parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id].children
    }

    pub fn tag(&self, id: NodeId) -> Option<&str> {
        match &self.nodes[id].kind {
            NodeKind::Element { tag, .. } => Some(tag),
            NodeKind::Text(_) => None,
        }
    }

    pub fn text(&self, id: NodeId) -> Option<&str> {
        match &self.nodes[id].kind {
            NodeKind::Text(content) => Some(content),
            NodeKind::Element { .. } => None,
        }
    }

    pub fn set_text(&mut self, id: NodeId, content: &str) {
        if let NodeKind::Text(existing) = &mut self.nodes[id].kind {
            *existing = content.to_string();
        }
    }

    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        match &self.nodes[id].kind {
            NodeKind::Element { attrs, .. } => attrs
                .iter()
                .find(|(attr, _)| attr == name)
                .map(|(_, value)| value.as_str()),
            NodeKind::Text(_) => None,
        }
    }

    pub fn has_ancestor_tag(&self, id: NodeId, tag: &str) -> bool {
        let mut current = self.nodes[id].parent;
        while let Some(ancestor) = current {
            if self.tag(ancestor) == Some(tag) {
                return true;
            }
            current = self.nodes[ancestor].parent;
        }
        false
    }

    /// Node ids under `root` (inclusive) in document order.
    pub fn descendants(&self, root: NodeId) -> Vec<NodeId> {
        let mut order = Vec::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            order.push(id);
            for &child in self.nodes[id].children.iter().rev() {
                stack.push(child);
            }
        }
        order
    }

    /// Text node ids under `root` in document order.
    pub fn text_nodes(&self, root: NodeId) -> Vec<NodeId> {
        self.descendants(root)
            .into_iter()
            .filter(|&id| matches!(self.nodes[id].kind, NodeKind::Text(_)))
            .collect()
    }

    /// Concatenated text content of the subtree, in document order.
    pub fn text_content(&self, root: NodeId) -> String {
        self.text_nodes(root)
            .into_iter()
            .filter_map(|id| self.text(id))
            .collect()
    }

    /// Serializes the subtree as HTML; text content and attribute values are
    /// entity-escaped, empty text nodes left over from splits are dropped.
    pub fn to_html(&self, root: NodeId) -> String {
        let mut out = String::new();
        self.write_html(root, &mut out);
        out
    }

    fn write_html(&self, id: NodeId, out: &mut String) {
        match &self.nodes[id].kind {
            NodeKind::Text(content) => {
                if !content.is_empty() {
                    out.push_str(&html_escape(content));
                }
            }
            NodeKind::Element { tag, attrs } => {
                out.push('<');
                out.push_str(tag);
                for (name, value) in attrs {
                    out.push(' ');
                    out.push_str(name);
                    out.push_str("=\"");
                    out.push_str(&html_escape(value));
                    out.push('"');
                }
                out.push('>');
                for &child in &self.nodes[id].children {
                    self.write_html(child, out);
                }
                out.push_str("</");
                out.push_str(tag);
                out.push('>');
            }
        }
    }
}

pub fn html_escape(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

/// Post-render highlighting: wraps literal token matches that only became
/// visible after typesetting, without disturbing existing markers.
///
/// Per token, text nodes under `root` are visited in document order.
/// Whitespace-only nodes and nodes inside a marker are skipped. A match is
/// split out of its text node into a fresh marker element, and scanning
/// continues in the remainder node after the marker until the chain is
/// exhausted, so the pass is idempotent per token per chain.
pub fn highlight_rendered(doc: &mut Document, root: NodeId, patterns: &TokenPatterns) {
    for pattern in patterns.iter() {
        for node in doc.text_nodes(root) {
            let mut current = node;
            loop {
                let Some(content) = doc.text(current) else { break };
                if content.trim().is_empty() {
                    break;
                }
                if doc.has_ancestor_tag(current, MARK_TAG) {
                    break;
                }
                let Some(found) = pattern.find(content) else { break };
                let (start, end) = (found.start(), found.end());
                let Some(parent) = doc.parent(current) else { break };
                let content = content.to_string();

                doc.set_text(current, &content[..start]);
                let marker = doc.create_element(MARK_TAG);
                let matched = doc.create_text(&content[start..end]);
                doc.append_child(marker, matched);
                doc.insert_after(parent, marker, current);

                let rest = &content[end..];
                if rest.is_empty() {
                    break;
                }
                let remainder = doc.create_text(rest);
                doc.insert_after(parent, remainder, marker);
                current = remainder;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patterns(tokens: &[&str]) -> TokenPatterns {
        let owned: Vec<String> = tokens.iter().map(|t| t.to_string()).collect();
        TokenPatterns::compile(&owned)
    }

    fn paragraph(doc: &mut Document, content: &str) -> NodeId {
        let p = doc.create_element("p");
        let text = doc.create_text(content);
        doc.append_child(p, text);
        p
    }

    #[test]
    fn wraps_every_occurrence_in_a_chain() {
        let mut doc = Document::new();
        let p = paragraph(&mut doc, "prime, prime, and PRIME again");
        highlight_rendered(&mut doc, p, &patterns(&["prime"]));
        assert_eq!(
            doc.to_html(p),
            "<p><mark>prime</mark>, <mark>prime</mark>, and <mark>PRIME</mark> again</p>"
        );
        assert_eq!(doc.text_content(p), "prime, prime, and PRIME again");
    }

    #[test]
    fn existing_markers_are_not_reentered() {
        let mut doc = Document::new();
        let p = doc.create_element("p");
        let marker = doc.create_element(MARK_TAG);
        let inside = doc.create_text("prime");
        doc.append_child(marker, inside);
        doc.append_child(p, marker);
        let tail = doc.create_text(" prime tail");
        doc.append_child(p, tail);

        highlight_rendered(&mut doc, p, &patterns(&["prime"]));
        assert_eq!(
            doc.to_html(p),
            "<p><mark>prime</mark> <mark>prime</mark> tail</p>"
        );
    }

    #[test]
    fn repeated_pass_is_idempotent() {
        let mut doc = Document::new();
        let p = paragraph(&mut doc, "one prime here");
        let tokens = patterns(&["prime"]);
        highlight_rendered(&mut doc, p, &tokens);
        let first = doc.to_html(p);
        highlight_rendered(&mut doc, p, &tokens);
        assert_eq!(doc.to_html(p), first);
    }

    #[test]
    fn whitespace_only_nodes_are_skipped() {
        let mut doc = Document::new();
        let p = paragraph(&mut doc, "   ");
        highlight_rendered(&mut doc, p, &patterns(&[" "]));
        assert_eq!(doc.to_html(p), "<p>   </p>");
    }

    #[test]
    fn multiple_tokens_highlight_independently() {
        let mut doc = Document::new();
        let p = paragraph(&mut doc, "euler and fermat");
        highlight_rendered(&mut doc, p, &patterns(&["euler", "fermat"]));
        assert_eq!(
            doc.to_html(p),
            "<p><mark>euler</mark> and <mark>fermat</mark></p>"
        );
    }

    #[test]
    fn serialization_escapes_text_and_attrs() {
        let mut doc = Document::new();
        let a = doc.create_element_with("a", &[("href", "x.html?a=1&b=2")]);
        let text = doc.create_text("a < b & c");
        doc.append_child(a, text);
        assert_eq!(
            doc.to_html(a),
            "<a href=\"x.html?a=1&amp;b=2\">a &lt; b &amp; c</a>"
        );
    }

    #[test]
    fn descendants_are_in_document_order() {
        let mut doc = Document::new();
        let root = doc.create_element("div");
        let first = paragraph(&mut doc, "one");
        let second = paragraph(&mut doc, "two");
        doc.append_child(root, first);
        doc.append_child(root, second);
        assert_eq!(doc.text_content(root), "onetwo");
    }
}
