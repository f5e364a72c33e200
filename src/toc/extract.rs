//! Extraction & filter stage.
//!
//! Walks the host document in order, keeps the nodes that match one of the
//! conversation selectors, and drops anything that would be useless in a
//! TOC: no rendering box, no text, or inside a hidden subtree. The order
//! returned here is the canonical order for identifiers and links.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::dom::css::hides_subtree;
use crate::dom::{Document, NodeId};
use crate::toc::{ContentNode, ConversationSelectors, NodeKind, SIDEBAR_ID};

/// Category of `node`, if it is a conversation node at all.
/// Prompt wins over heading when both match.
pub fn classify(doc: &Document, node: NodeId, selectors: &ConversationSelectors) -> Option<NodeKind> {
    if selectors.prompt.matches(doc, node) {
        Some(NodeKind::Prompt)
    } else if selectors.heading.matches(doc, node) {
        Some(NodeKind::Heading)
    } else if selectors.subheading.matches(doc, node) {
        Some(NodeKind::Subheading)
    } else {
        None
    }
}

/// Whether the node or any ancestor hides its subtree.
pub fn in_hidden_subtree(doc: &Document, node: NodeId) -> bool {
    std::iter::once(node)
        .chain(doc.ancestors(node))
        .any(|n| hides_subtree(doc.node(n)))
}

/// Whether the node lives inside our own sidebar.
pub fn in_sidebar(doc: &Document, node: NodeId) -> bool {
    std::iter::once(node)
        .chain(doc.ancestors(node))
        .any(|n| doc.attr(n, "id") == Some(SIDEBAR_ID))
}

fn has_rendering_box(doc: &Document, node: NodeId) -> bool {
    doc.layout_box(node).map(|b| !b.is_empty()).unwrap_or(false)
}

/// Extract the ordered conversation nodes. Reads layout boxes, so the
/// caller must have run `Document::ensure_layout` since the last change.
pub fn extract(doc: &Document, selectors: &ConversationSelectors) -> Vec<ContentNode> {
    let mut out = Vec::new();
    for node in doc.descendant_elements(doc.root()) {
        let Some(kind) = classify(doc, node, selectors) else {
            continue;
        };
        if in_sidebar(doc, node) || in_hidden_subtree(doc, node) || !has_rendering_box(doc, node) {
            continue;
        }
        let text = doc.text_content(node).trim().to_string();
        if text.is_empty() {
            continue;
        }
        let index = out.len();
        out.push(ContentNode {
            node,
            kind,
            text,
            index,
        });
    }
    out
}

/// Order-sensitive hash of what an extraction pass saw: kind, text and the
/// id each node carries right now. Two passes with the same fingerprint
/// would render the same list onto the same identified nodes.
pub fn fingerprint(doc: &Document, nodes: &[ContentNode]) -> u64 {
    let mut hasher = DefaultHasher::new();
    nodes.len().hash(&mut hasher);
    for n in nodes {
        n.kind.hash(&mut hasher);
        n.text.hash(&mut hasher);
        doc.attr(n.node, "id").hash(&mut hasher);
    }
    hasher.finish()
}
