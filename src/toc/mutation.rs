//! Mutation coordinator.
//!
//! Classifies batches of childList records and decides which pipeline a
//! burst should trigger. Timing lives in the controller's timer queue;
//! this module only tracks what the pending burst has asked for.

use crate::dom::{Document, MutationRecord, NodeId};
use crate::toc::extract::in_sidebar;
use crate::toc::{ConversationSelectors, TocConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum BatchClass {
    Insignificant,
    /// New conversation nodes showed up.
    AdditionSignificant,
    /// A node carrying a TOC identifier went away.
    RemovalSignificant,
}

/// Work owed once the debounce settles. `Reevaluate` dominates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PendingAction {
    /// Content pipeline only.
    Rerender,
    /// Full lifecycle evaluation.
    Reevaluate,
}

impl BatchClass {
    pub fn action(self) -> Option<PendingAction> {
        match self {
            BatchClass::Insignificant => None,
            BatchClass::AdditionSignificant => Some(PendingAction::Rerender),
            BatchClass::RemovalSignificant => Some(PendingAction::Reevaluate),
        }
    }
}

/// Root the content observer attaches to: `<main>`, else `<body>`.
pub fn observe_root(doc: &Document) -> Option<NodeId> {
    doc.find_first_tag("main").or_else(|| doc.body())
}

fn subtree_has_scheme_id(doc: &Document, root: NodeId, config: &TocConfig) -> bool {
    doc.subtree(root)
        .into_iter()
        .any(|n| doc.attr(n, "id").map(|v| config.is_scheme_id(v)).unwrap_or(false))
}

fn subtree_has_conversation_node(doc: &Document, root: NodeId, selectors: &ConversationSelectors) -> bool {
    [&selectors.prompt, &selectors.heading, &selectors.subheading]
        .iter()
        .any(|s| s.matches_in_subtree(doc, root))
}

/// Classify one batch of records observed below `root`.
pub fn classify_batch(
    doc: &Document,
    root: NodeId,
    records: &[MutationRecord],
    config: &TocConfig,
) -> BatchClass {
    let relevant: Vec<&MutationRecord> = records
        .iter()
        .filter(|r| r.target == root || doc.is_descendant_of(r.target, root))
        .filter(|r| !in_sidebar(doc, r.target))
        .collect();

    let removal = relevant
        .iter()
        .flat_map(|r| r.removed_nodes.iter())
        .any(|n| subtree_has_scheme_id(doc, *n, config));
    if removal {
        return BatchClass::RemovalSignificant;
    }

    let addition = relevant
        .iter()
        .flat_map(|r| r.added_nodes.iter())
        .filter(|n| !in_sidebar(doc, **n))
        .any(|n| subtree_has_conversation_node(doc, *n, &config.selectors));
    if addition {
        BatchClass::AdditionSignificant
    } else {
        BatchClass::Insignificant
    }
}

/// Content-level observer state.
#[derive(Debug, Clone, Default)]
pub struct MutationCoordinator {
    root: Option<NodeId>,
    pending: Option<PendingAction>,
}

impl MutationCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start observing. Reconnecting replaces the previous root and drops
    /// whatever the old burst had asked for.
    pub fn connect(&mut self, doc: &Document) -> bool {
        self.disconnect();
        self.root = observe_root(doc);
        match self.root {
            Some(root) => {
                log::debug!("content observer attached to <{}> {}", doc.tag(root), root);
                true
            }
            None => false,
        }
    }

    /// Follow the page when it swaps out the observed root (a replaced
    /// `<main>`, or a `<main>` appearing under an observed `<body>`).
    /// Returns whether the root moved. A disconnected coordinator stays
    /// disconnected.
    pub fn reattach_if_stale(&mut self, doc: &Document) -> bool {
        let Some(root) = self.root else {
            return false;
        };
        if doc.is_connected(root) && observe_root(doc) == Some(root) {
            return false;
        }
        log::info!("content root {} is gone or superseded; re-attaching", root);
        if !self.connect(doc) {
            log::warn!("no content root left to observe");
        }
        true
    }

    pub fn disconnect(&mut self) {
        self.root = None;
        self.pending = None;
    }

    pub fn is_connected(&self) -> bool {
        self.root.is_some()
    }

    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    /// Feed a batch. Returns the escalated pending action when the batch was
    /// significant (the caller restarts the debounce), `None` otherwise.
    pub fn observe(
        &mut self,
        doc: &Document,
        records: &[MutationRecord],
        config: &TocConfig,
    ) -> Option<PendingAction> {
        let root = self.root?;
        let class = classify_batch(doc, root, records, config);
        let action = class.action()?;
        let escalated = self.pending.map_or(action, |p| p.max(action));
        log::debug!("mutation batch {:?}, pending {:?}", class, escalated);
        self.pending = Some(escalated);
        Some(escalated)
    }

    pub fn pending(&self) -> Option<PendingAction> {
        self.pending
    }

    /// Claim the burst's action when the debounce fires.
    pub fn take_pending(&mut self) -> Option<PendingAction> {
        self.pending.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::parser::{parse_fragment, parse_html};
    use crate::toc::render::SidebarShell;

    const PAGE: &str = r#"<html><body><main>
        <div class="group/query" id="pp-toc-item-0">question</div>
        <div id="markdown-content-0"><p>thinking</p></div>
    </main><footer></footer></body></html>"#;

    fn setup() -> (Document, MutationCoordinator, TocConfig) {
        let doc = parse_html(PAGE);
        let mut coord = MutationCoordinator::new();
        assert!(coord.connect(&doc));
        (doc, coord, TocConfig::default())
    }

    fn append_html(doc: &mut Document, parent: NodeId, html: &str) {
        for node in parse_fragment(doc, html) {
            doc.append_child(parent, node);
        }
    }

    #[test]
    fn observes_main_when_present() {
        let (doc, coord, _) = setup();
        assert_eq!(coord.root(), doc.find_first_tag("main"));

        let bare = parse_html("<html><body><p>x</p></body></html>");
        assert_eq!(observe_root(&bare), bare.body());
    }

    #[test]
    fn heading_insertion_is_addition_significant() {
        let (mut doc, _, config) = setup();
        let answer = doc.get_element_by_id("markdown-content-0").unwrap();
        append_html(&mut doc, answer, "<h2>New section</h2>");
        let records = doc.take_mutations();
        let root = observe_root(&doc).unwrap();
        assert_eq!(classify_batch(&doc, root, &records, &config), BatchClass::AdditionSignificant);
    }

    #[test]
    fn removing_an_identified_node_is_removal_significant() {
        let (mut doc, _, config) = setup();
        let prompt = doc.get_element_by_id("pp-toc-item-0").unwrap();
        doc.remove(prompt);
        let records = doc.take_mutations();
        let root = observe_root(&doc).unwrap();
        assert_eq!(classify_batch(&doc, root, &records, &config), BatchClass::RemovalSignificant);
    }

    #[test]
    fn plain_text_churn_is_insignificant() {
        let (mut doc, _, config) = setup();
        let answer = doc.get_element_by_id("markdown-content-0").unwrap();
        append_html(&mut doc, answer, "<p>more tokens</p>");
        let records = doc.take_mutations();
        let root = observe_root(&doc).unwrap();
        assert_eq!(classify_batch(&doc, root, &records, &config), BatchClass::Insignificant);
    }

    #[test]
    fn changes_outside_root_and_in_sidebar_are_ignored() {
        let (mut doc, mut coord, config) = setup();
        let footer = doc.find_first_tag("footer").unwrap();
        append_html(&mut doc, footer, r#"<div class="group/query">outside</div>"#);
        let shell = SidebarShell::create(&mut doc, false).unwrap();
        append_html(&mut doc, shell.list, r#"<li><div class="group/query">mirror</div></li>"#);
        let records = doc.take_mutations();
        assert_eq!(coord.observe(&doc, &records, &config), None);
        assert_eq!(coord.pending(), None);
    }

    #[test]
    fn mixed_burst_escalates_to_reevaluate() {
        let (mut doc, mut coord, config) = setup();
        let answer = doc.get_element_by_id("markdown-content-0").unwrap();
        append_html(&mut doc, answer, "<h1>Heading</h1>");
        let first = doc.take_mutations();
        assert_eq!(coord.observe(&doc, &first, &config), Some(PendingAction::Rerender));

        let prompt = doc.get_element_by_id("pp-toc-item-0").unwrap();
        doc.remove(prompt);
        let second = doc.take_mutations();
        assert_eq!(coord.observe(&doc, &second, &config), Some(PendingAction::Reevaluate));

        // A later addition does not downgrade the burst.
        append_html(&mut doc, answer, "<h2>Another</h2>");
        let third = doc.take_mutations();
        assert_eq!(coord.observe(&doc, &third, &config), Some(PendingAction::Reevaluate));
        assert_eq!(coord.take_pending(), Some(PendingAction::Reevaluate));
        assert_eq!(coord.pending(), None);
    }

    #[test]
    fn replaced_main_is_followed() {
        let (mut doc, mut coord, config) = setup();
        let old_main = coord.root().unwrap();
        assert!(!coord.reattach_if_stale(&doc));

        let new_main = parse_fragment(&mut doc, r#"<main><div id="markdown-content-0"></div></main>"#)[0];
        doc.replace_child(old_main, new_main);
        doc.take_mutations();
        assert!(coord.reattach_if_stale(&doc));
        assert_eq!(coord.root(), Some(new_main));

        let answer = doc.get_element_by_id("markdown-content-0").unwrap();
        append_html(&mut doc, answer, "<h1>After swap</h1>");
        let records = doc.take_mutations();
        assert_eq!(coord.observe(&doc, &records, &config), Some(PendingAction::Rerender));
    }

    #[test]
    fn disconnected_coordinator_ignores_batches() {
        let (mut doc, mut coord, config) = setup();
        coord.disconnect();
        let answer = doc.get_element_by_id("markdown-content-0").unwrap();
        append_html(&mut doc, answer, "<h1>Heading</h1>");
        let records = doc.take_mutations();
        assert_eq!(coord.observe(&doc, &records, &config), None);
    }
}
