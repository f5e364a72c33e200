//! List renderer and sidebar shell.
//!
//! The sidebar is one `<aside>` appended to `<body>`; everything the TOC
//! writes into the page lives below it. The link list is rebuilt from
//! scratch on every render: conversation-sized lists are small, and a full
//! replace means no entry can outlive the generation that produced it. The
//! previous generation's items go back to the document arena, so link
//! handles from an older `TocEntry` must not be used after a re-render.

use crate::dom::{Document, NodeId};
use crate::toc::assign::AssignedNode;
use crate::toc::{
    display_text, NodeKind, TocError, ACTIVE_CLASS, COLLAPSED_CLASS, LINK_CLASS,
    PROMPT_ITEM_CLASS, PROMPT_LINK_CLASS, SIDEBAR_ID, SUBTITLE_ITEM_CLASS,
};

const TITLE: &str = "Thread index";

/// One rendered sidebar link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TocEntry {
    /// Identifier of the target node (`href` without the `#`).
    pub id: String,
    pub text: String,
    pub kind: NodeKind,
    /// The `<a>` element.
    pub link: NodeId,
    /// The content node it points at, as of render time.
    pub target: NodeId,
}

/// Handles to the sidebar's fixed structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SidebarShell {
    pub root: NodeId,
    pub toggle: NodeId,
    pub list: NodeId,
}

impl SidebarShell {
    /// Build the sidebar skeleton and append it to `<body>`. Reuses an
    /// existing shell if one is already in the document.
    pub fn create(doc: &mut Document, collapsed: bool) -> Result<Self, TocError> {
        if let Some(existing) = Self::find(doc) {
            existing.apply_collapsed(doc, collapsed);
            return Ok(existing);
        }
        let body = doc.body().ok_or(TocError::MissingBody)?;

        let root = doc.create_element("aside");
        doc.set_attr(root, "id", SIDEBAR_ID);
        doc.set_attr(root, "style", "position: fixed");

        let inner = doc.create_element("div");
        doc.set_attr(inner, "class", "perplexity-toc-inner");

        let header = doc.create_element("div");
        doc.set_attr(header, "class", "perplexity-toc-header");
        let title = doc.create_element("h3");
        doc.set_attr(title, "class", "perplexity-toc-title");
        doc.set_text_content(title, TITLE);
        let toggle = doc.create_element("button");
        doc.set_attr(toggle, "class", "perplexity-toc-toggle");
        doc.set_attr(toggle, "type", "button");

        let list = doc.create_element("ul");
        doc.set_attr(list, "class", "perplexity-toc-list");

        doc.append_child(header, title);
        doc.append_child(header, toggle);
        doc.append_child(inner, header);
        doc.append_child(inner, list);
        doc.append_child(root, inner);
        // Attach last so observers see a single insertion.
        doc.append_child(body, root);

        let shell = Self { root, toggle, list };
        shell.apply_collapsed(doc, collapsed);
        Ok(shell)
    }

    /// Locate a shell left in the document by an earlier generation.
    pub fn find(doc: &Document) -> Option<Self> {
        let root = doc.get_element_by_id(SIDEBAR_ID)?;
        let elements = doc.descendant_elements(root);
        let toggle = elements.iter().copied().find(|n| doc.tag(*n) == "button")?;
        let list = elements.iter().copied().find(|n| doc.tag(*n) == "ul")?;
        Some(Self { root, toggle, list })
    }

    pub fn apply_collapsed(&self, doc: &mut Document, collapsed: bool) {
        if collapsed {
            doc.add_class(self.root, COLLAPSED_CLASS);
        } else {
            doc.remove_class(self.root, COLLAPSED_CLASS);
        }
        doc.set_attr(self.toggle, "aria-expanded", if collapsed { "false" } else { "true" });
        doc.set_text_content(self.toggle, if collapsed { "»" } else { "«" });
    }

    /// Remove the whole sidebar from the document.
    pub fn remove(&self, doc: &mut Document) {
        doc.remove(self.root);
    }

    pub fn is_attached(&self, doc: &Document) -> bool {
        doc.is_connected(self.root)
    }
}

/// Replace the list contents with one link per assigned node.
pub fn render(
    doc: &mut Document,
    list: NodeId,
    assigned: &[AssignedNode],
    truncate_chars: usize,
) -> Vec<TocEntry> {
    let previous = doc.children(list).to_vec();
    doc.clear_children(list);
    for item in previous {
        doc.release(item);
    }

    let mut entries = Vec::with_capacity(assigned.len());
    for a in assigned {
        let kind = a.content.kind;
        let text = display_text(kind, &a.content.text, truncate_chars);

        let li = doc.create_element("li");
        let link = doc.create_element("a");
        doc.set_attr(link, "href", format!("#{}", a.id));
        doc.set_attr(link, "class", LINK_CLASS);
        doc.set_text_content(link, &text);

        match kind {
            NodeKind::Prompt => {
                doc.add_class(link, PROMPT_LINK_CLASS);
                doc.add_class(li, PROMPT_ITEM_CLASS);
            }
            NodeKind::Subheading => doc.add_class(li, SUBTITLE_ITEM_CLASS),
            NodeKind::Heading => {}
        }

        doc.append_child(li, link);
        doc.append_child(list, li);

        entries.push(TocEntry {
            id: a.id.clone(),
            text,
            kind,
            link,
            target: a.content.node,
        });
    }
    entries
}

/// All `<a>` links currently in the list.
pub fn links(doc: &Document, list: NodeId) -> Vec<NodeId> {
    doc.descendant_elements(list)
        .into_iter()
        .filter(|n| doc.tag(*n) == "a")
        .collect()
}

/// The link whose `href` targets `id`.
pub fn link_for(doc: &Document, list: NodeId, id: &str) -> Option<NodeId> {
    let href = format!("#{}", id);
    links(doc, list)
        .into_iter()
        .find(|n| doc.attr(*n, "href") == Some(href.as_str()))
}

/// Identifier a link points at.
pub fn link_target_id(doc: &Document, link: NodeId) -> Option<String> {
    doc.attr(link, "href")
        .and_then(|h| h.strip_prefix('#'))
        .map(str::to_string)
}

/// Kind a rendered link was styled as.
pub fn link_kind(doc: &Document, link: NodeId) -> NodeKind {
    if doc.has_class(link, PROMPT_LINK_CLASS) {
        return NodeKind::Prompt;
    }
    let subtitle = doc
        .parent(link)
        .map(|li| doc.has_class(li, SUBTITLE_ITEM_CLASS))
        .unwrap_or(false);
    if subtitle {
        NodeKind::Subheading
    } else {
        NodeKind::Heading
    }
}

/// Clear the active flag from every link, then set it on `active`.
pub fn set_active_link(doc: &mut Document, list: NodeId, active: NodeId) {
    for link in links(doc, list) {
        doc.remove_class(link, ACTIVE_CLASS);
    }
    doc.add_class(active, ACTIVE_CLASS);
}

/// Links currently flagged active (at most one after `set_active_link`).
pub fn active_links(doc: &Document, list: NodeId) -> Vec<NodeId> {
    links(doc, list)
        .into_iter()
        .filter(|n| doc.has_class(*n, ACTIVE_CLASS))
        .collect()
}

/// Scroll offset of a region `height` tall, currently at `offset`, after
/// bringing the span `top..bottom` into it with the least movement
/// (`block: "nearest"`). A span taller than the region aligns its top.
pub fn nearest_scroll_offset(offset: f32, height: f32, top: f32, bottom: f32) -> f32 {
    if top < offset || bottom - top >= height {
        top.max(0.0)
    } else if bottom > offset + height {
        bottom - height
    } else {
        offset
    }
}
