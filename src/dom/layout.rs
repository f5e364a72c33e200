use crate::dom::css::node_style;
use crate::dom::{Document, NodeId, NodeType};

/// Bounding box for a laid-out DOM node (document coordinates).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayoutBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl LayoutBox {
    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    /// A box with no area does not count as rendered.
    pub fn is_empty(&self) -> bool {
        self.height <= 0.0 || self.width <= 0.0
    }
}

const BLOCK_TAGS: &[&str] = &[
    "html",
    "body",
    "div",
    "p",
    "h1",
    "h2",
    "h3",
    "h4",
    "h5",
    "h6",
    "ul",
    "ol",
    "li",
    "table",
    "tr",
    "td",
    "th",
    "form",
    "section",
    "article",
    "aside",
    "main",
    "header",
    "footer",
    "nav",
    "blockquote",
    "pre",
    "figure",
    "figcaption",
    "details",
    "summary",
];

/// Tags that never produce a box.
const NON_RENDERED: &[&str] = &["head", "script", "style", "noscript", "template", "title", "meta", "link"];

/// Per-tag vertical margins (top, bottom) in pixels.
fn tag_margins(tag: &str) -> (f32, f32) {
    match tag {
        "h1" => (24.0, 16.0),
        "h2" => (20.0, 12.0),
        "h3" | "h4" => (16.0, 10.0),
        "h5" | "h6" => (12.0, 8.0),
        "p" => (4.0, 10.0),
        "ul" | "ol" => (8.0, 8.0),
        "li" => (2.0, 2.0),
        "section" | "article" | "main" => (16.0, 16.0),
        "nav" | "header" | "footer" => (12.0, 12.0),
        "blockquote" => (12.0, 12.0),
        "pre" => (8.0, 8.0),
        _ => (0.0, 0.0),
    }
}

/// Per-tag padding in pixels.
fn tag_padding(tag: &str, is_block: bool) -> f32 {
    match tag {
        "section" | "article" | "main" | "aside" => 16.0,
        "nav" | "header" | "footer" => 12.0,
        "blockquote" => 20.0,
        _ if is_block => 4.0,
        _ => 0.0,
    }
}

fn tag_font_size(tag: &str, parent_font_size: f32) -> f32 {
    match tag {
        "h1" => 32.0,
        "h2" => 24.0,
        "h3" => 20.0,
        "h4" => 18.0,
        "h5" | "h6" => 16.0,
        "small" => 12.0,
        _ => parent_font_size,
    }
}

/// Compute layout for the whole document (simple top-to-bottom block model)
/// and store each node's box on the node. Nodes that render nothing get
/// `None`.
pub fn compute_layout(doc: &mut Document) {
    let width = doc.viewport_width();
    let mut cursor_y = 0.0;
    let root = doc.root();
    let children = doc.children(root).to_vec();
    for child in children {
        layout_node(doc, child, 0.0, &mut cursor_y, width, 16.0);
    }
}

fn clear_subtree(doc: &mut Document, id: NodeId) {
    for n in doc.subtree(id) {
        doc.set_layout_box(n, None);
    }
}

fn layout_node(
    doc: &mut Document,
    id: NodeId,
    x: f32,
    cursor_y: &mut f32,
    available_width: f32,
    parent_font_size: f32,
) {
    let node = doc.node(id);

    if node.node_type == NodeType::Text {
        let text_len = node.text.trim().chars().count();
        let start_y = *cursor_y;
        if text_len > 0 {
            let line_height = parent_font_size * 1.4;
            let chars_per_line = (available_width / (parent_font_size * 0.6)).max(1.0) as usize;
            let lines = (text_len as f32 / chars_per_line as f32).ceil().max(1.0);
            *cursor_y += lines * line_height;
        }
        let height = *cursor_y - start_y;
        doc.set_layout_box(
            id,
            Some(LayoutBox {
                x,
                y: start_y,
                width: available_width,
                height,
            }),
        );
        return;
    }

    let tag = node.tag.clone();
    let style = node_style(node);
    if NON_RENDERED.contains(&tag.as_str()) || node.attr("hidden").is_some() || style.display_none
    {
        clear_subtree(doc, id);
        return;
    }

    // Out-of-flow boxes start at the top and leave the parent cursor alone.
    let mut own_cursor = 0.0;
    let cursor: &mut f32 = if style.out_of_flow {
        &mut own_cursor
    } else {
        cursor_y
    };

    let is_block = BLOCK_TAGS.contains(&tag.as_str());
    let font_size = tag_font_size(&tag, parent_font_size);
    let (margin_top, margin_bottom) = tag_margins(&tag);
    let padding = tag_padding(&tag, is_block);

    if is_block {
        *cursor += margin_top;
    }

    let start_y = *cursor;

    if padding > 0.0 {
        *cursor += padding;
    }

    let child_x = x + padding;
    let child_width = (available_width - padding * 2.0).max(0.0);
    let children = doc.children(id).to_vec();
    for child in children {
        layout_node(doc, child, child_x, cursor, child_width, font_size);
    }

    if padding > 0.0 {
        *cursor += padding;
    }

    // An explicit height overrides the content height.
    let height = match style.height {
        Some(h) => {
            *cursor = start_y + h.max(0.0);
            h.max(0.0)
        }
        None => *cursor - start_y,
    };

    if is_block {
        *cursor += margin_bottom;
    }

    doc.set_layout_box(
        id,
        Some(LayoutBox {
            x,
            y: start_y,
            width: available_width,
            height,
        }),
    );
}

#[cfg(test)]
mod tests {
    use crate::dom::parser::parse_html;

    #[test]
    fn blocks_stack_downwards() {
        let mut doc = parse_html(
            r#"<html><body><h1 id="a">First</h1><p id="b">Second</p></body></html>"#,
        );
        doc.ensure_layout();
        let a = doc.layout_box(doc.get_element_by_id("a").unwrap()).unwrap();
        let b = doc.layout_box(doc.get_element_by_id("b").unwrap()).unwrap();
        assert!(a.height > 0.0);
        assert!(b.y >= a.bottom());
    }

    #[test]
    fn display_none_has_no_box() {
        let mut doc = parse_html(
            r#"<html><body><div style="display:none"><h2 id="x">Hidden</h2></div></body></html>"#,
        );
        doc.ensure_layout();
        assert!(doc.layout_box(doc.get_element_by_id("x").unwrap()).is_none());
    }

    #[test]
    fn zero_height_is_an_empty_box() {
        let mut doc = parse_html(
            r#"<html><body><h2 id="x" style="height: 0">Squashed</h2><p id="y">After</p></body></html>"#,
        );
        doc.ensure_layout();
        let x = doc.layout_box(doc.get_element_by_id("x").unwrap()).unwrap();
        assert!(x.is_empty());
    }

    #[test]
    fn fixed_position_does_not_push_content() {
        let mut doc = parse_html(
            r#"<html><body><aside style="position: fixed"><p>Side</p></aside><p id="y">Main</p></body></html>"#,
        );
        doc.ensure_layout();
        let without_offset = doc.layout_box(doc.get_element_by_id("y").unwrap()).unwrap();
        // body padding + p margin only
        assert!(without_offset.y < 20.0);
    }
}
