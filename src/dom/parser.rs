use crate::dom::{Document, NodeId};
use scraper::{ElementRef, Html, Node};
use std::collections::HashMap;

/// Tags whose children should be stripped (invisible/script content)
const SKIP_CHILDREN: &[&str] = &["script", "style", "noscript", "svg", "template"];

/// Parse raw HTML into a host `Document`.
///
/// The returned document has an empty mutation queue: parsing is the
/// initial state, not a change anyone should observe.
pub fn parse_html(html: &str) -> Document {
    let parsed = Html::parse_document(html);
    let mut doc = Document::new();
    let root = doc.root();
    convert_element(&mut doc, root, parsed.root_element());
    doc.take_mutations();
    doc
}

/// Parse an HTML fragment and return its top-level nodes, detached and
/// ready to be inserted into `doc`.
pub fn parse_fragment(doc: &mut Document, html: &str) -> Vec<NodeId> {
    let fragment = Html::parse_fragment(html);
    let holder = doc.create_element("#fragment");
    convert_children(doc, holder, fragment.root_element());
    let top: Vec<NodeId> = doc.children(holder).to_vec();
    for node in &top {
        doc.remove(*node);
    }
    doc.release(holder);
    top
}

fn convert_element(doc: &mut Document, parent: NodeId, el: ElementRef<'_>) {
    let tag = el.value().name.local.as_ref().to_string();
    let attributes: HashMap<String, String> = el
        .value()
        .attrs()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

    let id = doc.create_element_with(tag.as_str(), attributes);
    doc.append_child(parent, id);

    // Skip children of invisible elements
    if SKIP_CHILDREN.contains(&tag.as_str()) {
        return;
    }

    convert_children(doc, id, el);
}

fn convert_children(doc: &mut Document, parent: NodeId, el: ElementRef<'_>) {
    for child_ref in el.children() {
        match child_ref.value() {
            Node::Element(_) => {
                if let Some(child_el) = ElementRef::wrap(child_ref) {
                    convert_element(doc, parent, child_el);
                }
            }
            Node::Text(t) => {
                let s = t.text.to_string();
                if !s.trim().is_empty() {
                    let text = doc.create_text(s);
                    doc.append_child(parent, text);
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_simple_html() {
        let html = r#"
        <html>
            <head><title>Test Page</title></head>
            <body>
                <h1 id="top">Hello</h1>
                <p>Content paragraph</p>
            </body>
        </html>
        "#;

        let doc = parse_html(html);
        let body = doc.body().unwrap();
        let h1 = doc.get_element_by_id("top").unwrap();
        assert!(doc.is_descendant_of(h1, body));
        assert_eq!(doc.text_content(h1), "Hello");
        assert!(!doc.has_pending_mutations());
    }

    #[test]
    fn strips_script_children() {
        let html = r#"
        <html><body>
            <p>Visible</p>
            <script>alert("hidden");</script>
        </body></html>
        "#;

        let doc = parse_html(html);
        let text = doc.text_content(doc.root());
        assert!(text.contains("Visible"));
        assert!(!text.contains("alert"));
    }

    #[test]
    fn fragment_nodes_come_back_detached() {
        let mut doc = parse_html("<html><body></body></html>");
        let nodes = parse_fragment(&mut doc, r#"<div class="a">x</div><h2>y</h2>"#);
        assert_eq!(nodes.len(), 2);
        assert!(nodes.iter().all(|n| !doc.is_connected(*n)));
        assert_eq!(doc.tag(nodes[1]), "h2");
    }

    #[test]
    fn repeated_fragments_reuse_the_holder_slot() {
        let mut doc = parse_html("<html><body></body></html>");
        let body = doc.body().unwrap();
        let mut sizes = Vec::new();
        for _ in 0..4 {
            for node in parse_fragment(&mut doc, "<p>x</p>") {
                doc.append_child(body, node);
            }
            doc.take_mutations();
            sizes.push(doc.len());
        }
        // Each round adds <p> and its text; the holder slot is recycled
        // once the queue has moved past it.
        assert_eq!(sizes[3] - sizes[2], 2);
        assert_eq!(sizes[2] - sizes[1], 2);
    }
}
