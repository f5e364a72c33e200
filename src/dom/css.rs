//! Lightweight CSS property extraction.
//!
//! Parses inline `style=""` attributes and extracts the handful of
//! properties that decide whether (and how) an element gets a box.

use crate::dom::DomNode;

/// Extracted CSS layout properties.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StyleProps {
    pub display_none: bool,
    pub visibility_hidden: bool,
    /// `position: fixed` / `absolute`: laid out without pushing siblings down.
    pub out_of_flow: bool,
    pub height: Option<f32>,
}

/// Parse an inline `style="..."` attribute value.
pub fn parse_inline_style(style: &str) -> StyleProps {
    let mut props = StyleProps::default();
    for decl in style.split(';') {
        let parts: Vec<&str> = decl.splitn(2, ':').collect();
        if parts.len() != 2 {
            continue;
        }
        let prop = parts[0].trim().to_lowercase();
        let val = parts[1].trim().trim_end_matches("!important").trim().to_lowercase();
        match prop.as_str() {
            "display" => props.display_none = val == "none",
            "visibility" => props.visibility_hidden = val == "hidden" || val == "collapse",
            "position" => props.out_of_flow = val == "fixed" || val == "absolute",
            "height" => props.height = parse_css_size(&val),
            _ => {}
        }
    }
    props
}

/// Style of a node, read from its `style` attribute.
pub fn node_style(node: &DomNode) -> StyleProps {
    node.attr("style").map(parse_inline_style).unwrap_or_default()
}

/// Whether this element hides itself and its whole subtree: the `hidden`
/// attribute, `aria-hidden="true"`, `display:none` or `visibility:hidden`.
pub fn hides_subtree(node: &DomNode) -> bool {
    if !node.is_element() {
        return false;
    }
    if node.attr("hidden").is_some() {
        return true;
    }
    if node
        .attr("aria-hidden")
        .map(|v| v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
    {
        return true;
    }
    let style = node_style(node);
    style.display_none || style.visibility_hidden
}

/// Parse a CSS size value (px or plain number).
fn parse_css_size(val: &str) -> Option<f32> {
    let v = val.trim().to_lowercase();
    let num_str = v.trim_end_matches("px").trim_end_matches("rem").trim_end_matches("em");
    num_str.trim().parse::<f32>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::Document;

    #[test]
    fn parse_inline() {
        let props = parse_inline_style("display: none; height: 20px; position: fixed");
        assert!(props.display_none);
        assert!(props.out_of_flow);
        assert_eq!(props.height, Some(20.0));
    }

    #[test]
    fn important_and_case_are_ignored() {
        let props = parse_inline_style("VISIBILITY: Hidden !important");
        assert!(props.visibility_hidden);
        assert!(!props.display_none);
    }

    #[test]
    fn hidden_markers() {
        let mut doc = Document::new();
        let a = doc.create_element("div");
        doc.set_attr(a, "hidden", "");
        let b = doc.create_element("div");
        doc.set_attr(b, "aria-hidden", "true");
        let c = doc.create_element("div");
        doc.set_attr(c, "style", "color: red");

        assert!(hides_subtree(doc.node(a)));
        assert!(hides_subtree(doc.node(b)));
        assert!(!hides_subtree(doc.node(c)));
    }

    #[test]
    fn bare_numbers_parse_as_px() {
        assert_eq!(parse_css_size("0"), Some(0.0));
        assert_eq!(parse_css_size("1.5em"), Some(1.5));
        assert_eq!(parse_css_size("auto"), None);
    }
}
