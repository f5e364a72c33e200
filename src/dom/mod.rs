pub mod parser;
pub mod css;
pub mod layout;
pub mod query;

use std::collections::HashMap;
use std::fmt;

use self::layout::LayoutBox;

/// Handle into a `Document` arena. Stays valid after the node is detached,
/// so removed subtrees can still be inspected (the way a mutation record
/// keeps removed nodes alive), until the owner hands it back with
/// `Document::release`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeType {
    Document,
    Element,
    Text,
}

/// Internal DOM node representation.
#[derive(Debug, Clone)]
pub struct DomNode {
    pub tag: String,
    pub attributes: HashMap<String, String>,
    pub text: String,
    pub node_type: NodeType,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    layout: Option<LayoutBox>,
    /// Host refuses `id` writes on this node (sealed by a framework, frozen
    /// proxy, etc). Writes are dropped without an error.
    id_locked: bool,
    /// Queued for reuse by `Document::release`.
    released: bool,
}

impl DomNode {
    fn new(tag: impl Into<String>, node_type: NodeType) -> Self {
        Self {
            tag: tag.into(),
            attributes: HashMap::new(),
            text: String::new(),
            node_type,
            parent: None,
            children: Vec::new(),
            layout: None,
            id_locked: false,
            released: false,
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(|s| s.as_str())
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.attr("class")
            .map(|c| c.split_ascii_whitespace().any(|token| token == class))
            .unwrap_or(false)
    }

    pub fn is_element(&self) -> bool {
        self.node_type == NodeType::Element
    }
}

fn affects_layout(attr: &str) -> bool {
    matches!(attr, "style" | "hidden")
}

/// A childList mutation, as a MutationObserver would deliver it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationRecord {
    pub target: NodeId,
    pub added_nodes: Vec<NodeId>,
    pub removed_nodes: Vec<NodeId>,
}

/// Arena-backed host document.
///
/// Every structural change under the root is queued as a `MutationRecord`
/// (changes inside detached subtrees are not); the owner drains
/// the queue with `take_mutations` and hands the batch to whoever observes.
///
/// Detached nodes are never reclaimed on their own, since a caller may still
/// hold their ids. Subtrees handed back with `release` are recycled two
/// drains later, so a batch that mentions them is processed before the
/// slot is reused.
#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<DomNode>,
    root: NodeId,
    pending: Vec<MutationRecord>,
    layout_dirty: bool,
    viewport_width: f32,
    released: Vec<NodeId>,
    retired: Vec<NodeId>,
    free: Vec<NodeId>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    pub fn new() -> Self {
        Self {
            nodes: vec![DomNode::new("#document", NodeType::Document)],
            root: NodeId(0),
            pending: Vec::new(),
            layout_dirty: true,
            viewport_width: 1280.0,
            released: Vec::new(),
            retired: Vec::new(),
            free: Vec::new(),
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> &DomNode {
        &self.nodes[id.0]
    }

    /// Arena slots in use, detached and recyclable nodes included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    // ─── Construction ────────────────────────────────────────────────────────

    /// Create a detached element.
    pub fn create_element(&mut self, tag: impl Into<String>) -> NodeId {
        self.push(DomNode::new(tag, NodeType::Element))
    }

    /// Create a detached element with attributes.
    pub fn create_element_with(
        &mut self,
        tag: impl Into<String>,
        attrs: HashMap<String, String>,
    ) -> NodeId {
        let mut node = DomNode::new(tag, NodeType::Element);
        node.attributes = attrs;
        self.push(node)
    }

    /// Create a detached text node.
    pub fn create_text(&mut self, content: impl Into<String>) -> NodeId {
        let mut node = DomNode::new(String::new(), NodeType::Text);
        node.text = content.into();
        self.push(node)
    }

    fn push(&mut self, node: DomNode) -> NodeId {
        if let Some(id) = self.free.pop() {
            self.nodes[id.0] = node;
            return id;
        }
        let id = NodeId(self.nodes.len());
        self.nodes.push(node);
        id
    }

    /// Give a detached subtree back to the arena. Its ids must not be used
    /// afterwards. Connected nodes and the root are left alone.
    pub fn release(&mut self, id: NodeId) {
        if id == self.root || self.nodes[id.0].parent.is_some() {
            log::debug!("release of attached node {} ignored", id);
            return;
        }
        for n in self.subtree(id) {
            let node = &mut self.nodes[n.0];
            if !node.released {
                node.released = true;
                self.released.push(n);
            }
        }
    }

    // ─── Tree structure ──────────────────────────────────────────────────────

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    /// Append `child` as the last child of `parent`, detaching it first if
    /// it already has a parent.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        if self.nodes[child.0].parent.is_some() {
            self.remove(child);
        }
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.push(child);
        self.record(parent, vec![child], Vec::new());
    }

    /// Detach a node from its parent. The subtree stays in the arena.
    pub fn remove(&mut self, id: NodeId) {
        let Some(parent) = self.nodes[id.0].parent.take() else {
            return;
        };
        self.nodes[parent.0].children.retain(|c| *c != id);
        self.record(parent, Vec::new(), vec![id]);
    }

    /// Detach every child of `id` in a single mutation record.
    pub fn clear_children(&mut self, id: NodeId) {
        let removed = std::mem::take(&mut self.nodes[id.0].children);
        if removed.is_empty() {
            return;
        }
        for child in &removed {
            self.nodes[child.0].parent = None;
        }
        self.record(id, Vec::new(), removed);
    }

    /// Swap `old` for `new` in place (a wholesale subtree replace).
    pub fn replace_child(&mut self, old: NodeId, new: NodeId) {
        let Some(parent) = self.nodes[old.0].parent else {
            return;
        };
        if self.nodes[new.0].parent.is_some() {
            self.remove(new);
        }
        let Some(pos) = self.nodes[parent.0].children.iter().position(|c| *c == old) else {
            return;
        };
        self.nodes[parent.0].children[pos] = new;
        self.nodes[old.0].parent = None;
        self.nodes[new.0].parent = Some(parent);
        self.record(parent, vec![new], vec![old]);
    }

    /// Whether the node is attached to the document root.
    pub fn is_connected(&self, id: NodeId) -> bool {
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            if current == self.root {
                return true;
            }
            cursor = self.nodes[current.0].parent;
        }
        false
    }

    pub fn is_descendant_of(&self, id: NodeId, ancestor: NodeId) -> bool {
        let mut cursor = self.parent(id);
        while let Some(current) = cursor {
            if current == ancestor {
                return true;
            }
            cursor = self.parent(current);
        }
        false
    }

    /// Ancestors from parent up to the root.
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.parent(id), move |n| self.parent(*n))
    }

    /// Pre-order walk of `id` and its descendants (document order).
    pub fn subtree(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            out.push(current);
            for child in self.nodes[current.0].children.iter().rev() {
                stack.push(*child);
            }
        }
        out
    }

    /// Elements below `id` (excluding `id`) in document order.
    pub fn descendant_elements(&self, id: NodeId) -> Vec<NodeId> {
        self.subtree(id)
            .into_iter()
            .skip(1)
            .filter(|n| self.nodes[n.0].is_element())
            .collect()
    }

    // ─── Attributes ──────────────────────────────────────────────────────────

    pub fn tag(&self, id: NodeId) -> &str {
        &self.nodes[id.0].tag
    }

    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        self.nodes[id.0].attr(name)
    }

    /// Write an attribute. `id` writes on a locked node are silently dropped,
    /// so callers that care must read back.
    pub fn set_attr(&mut self, id: NodeId, name: &str, value: impl Into<String>) {
        let node = &mut self.nodes[id.0];
        if name == "id" && node.id_locked {
            return;
        }
        let value = value.into();
        if affects_layout(name) {
            self.layout_dirty = true;
        }
        self.nodes[id.0].attributes.insert(name.to_string(), value);
    }

    pub fn remove_attr(&mut self, id: NodeId, name: &str) {
        let node = &mut self.nodes[id.0];
        if name == "id" && node.id_locked {
            return;
        }
        if node.attributes.remove(name).is_some() && affects_layout(name) {
            self.layout_dirty = true;
        }
    }

    /// Make the host reject (or accept again) `id` writes on this node.
    pub fn lock_id(&mut self, id: NodeId, locked: bool) {
        self.nodes[id.0].id_locked = locked;
    }

    pub fn has_class(&self, id: NodeId, class: &str) -> bool {
        self.nodes[id.0].has_class(class)
    }

    pub fn add_class(&mut self, id: NodeId, class: &str) {
        if self.has_class(id, class) {
            return;
        }
        let joined = match self.attr(id, "class") {
            Some(existing) if !existing.trim().is_empty() => format!("{} {}", existing.trim(), class),
            _ => class.to_string(),
        };
        self.set_attr(id, "class", joined);
    }

    pub fn remove_class(&mut self, id: NodeId, class: &str) {
        let Some(existing) = self.attr(id, "class") else {
            return;
        };
        let kept: Vec<&str> = existing
            .split_ascii_whitespace()
            .filter(|token| *token != class)
            .collect();
        let joined = kept.join(" ");
        self.set_attr(id, "class", joined);
    }

    // ─── Text ────────────────────────────────────────────────────────────────

    /// Concatenated text of all descendant text nodes (like `textContent`).
    pub fn text_content(&self, id: NodeId) -> String {
        let mut buf = String::new();
        for n in self.subtree(id) {
            let node = &self.nodes[n.0];
            if node.node_type == NodeType::Text {
                buf.push_str(&node.text);
            }
        }
        buf
    }

    /// Replace children with a single text node. The old children are
    /// released.
    pub fn set_text_content(&mut self, id: NodeId, value: &str) {
        let old = self.nodes[id.0].children.clone();
        self.clear_children(id);
        for child in old {
            self.release(child);
        }
        if !value.is_empty() {
            let text = self.create_text(value);
            self.append_child(id, text);
        }
    }

    // ─── Lookup ──────────────────────────────────────────────────────────────

    /// First connected element (document order) carrying this `id`.
    pub fn get_element_by_id(&self, value: &str) -> Option<NodeId> {
        self.elements_by_id(value).into_iter().next()
    }

    /// Every connected element carrying this `id`, in document order.
    pub fn elements_by_id(&self, value: &str) -> Vec<NodeId> {
        if value.is_empty() {
            return Vec::new();
        }
        self.descendant_elements(self.root)
            .into_iter()
            .filter(|n| self.attr(*n, "id") == Some(value))
            .collect()
    }

    /// First connected element with this tag.
    pub fn find_first_tag(&self, tag: &str) -> Option<NodeId> {
        self.descendant_elements(self.root)
            .into_iter()
            .find(|n| self.tag(*n) == tag)
    }

    pub fn body(&self) -> Option<NodeId> {
        self.find_first_tag("body")
    }

    // ─── Mutation queue ──────────────────────────────────────────────────────

    fn record(&mut self, target: NodeId, added_nodes: Vec<NodeId>, removed_nodes: Vec<NodeId>) {
        self.layout_dirty = true;
        // Detached subtrees are invisible to observers.
        if !self.is_connected(target) {
            return;
        }
        self.pending.push(MutationRecord {
            target,
            added_nodes,
            removed_nodes,
        });
    }

    /// Drain queued mutation records. Also advances the release queue by
    /// one step.
    pub fn take_mutations(&mut self) -> Vec<MutationRecord> {
        self.free.append(&mut self.retired);
        self.retired = std::mem::take(&mut self.released);
        std::mem::take(&mut self.pending)
    }

    pub fn has_pending_mutations(&self) -> bool {
        !self.pending.is_empty()
    }

    // ─── Layout ──────────────────────────────────────────────────────────────

    pub fn layout_box(&self, id: NodeId) -> Option<LayoutBox> {
        self.nodes[id.0].layout
    }

    pub(crate) fn set_layout_box(&mut self, id: NodeId, bounds: Option<LayoutBox>) {
        self.nodes[id.0].layout = bounds;
    }

    pub fn viewport_width(&self) -> f32 {
        self.viewport_width
    }

    pub fn set_viewport_width(&mut self, width: f32) {
        if (self.viewport_width - width).abs() > f32::EPSILON {
            self.viewport_width = width;
            self.layout_dirty = true;
        }
    }

    /// Recompute layout boxes if anything changed since the last pass.
    pub fn ensure_layout(&mut self) {
        if self.layout_dirty {
            layout::compute_layout(self);
            self.layout_dirty = false;
        }
    }

    /// Serialize a subtree back to markup (diagnostics and the CLI).
    pub fn outer_html(&self, id: NodeId) -> String {
        let mut buf = String::new();
        self.write_html(id, &mut buf);
        buf
    }

    fn write_html(&self, id: NodeId, buf: &mut String) {
        let node = &self.nodes[id.0];
        match node.node_type {
            NodeType::Text => buf.push_str(&node.text),
            NodeType::Document => {
                for child in &node.children {
                    self.write_html(*child, buf);
                }
            }
            NodeType::Element => {
                buf.push('<');
                buf.push_str(&node.tag);
                let mut attrs: Vec<_> = node.attributes.iter().collect();
                attrs.sort();
                for (k, v) in attrs {
                    buf.push_str(&format!(" {}=\"{}\"", k, v.replace('"', "&quot;")));
                }
                buf.push('>');
                for child in &node.children {
                    self.write_html(*child, buf);
                }
                buf.push_str(&format!("</{}>", node.tag));
            }
        }
    }
}
