//! Navigation controller: sidebar link clicks.
//!
//! A click resolves its identifier against the live document. When the
//! host has replaced the node since the last render, the link's text and
//! kind are used to find its successor and re-stamp the identifier on it.

use crate::dom::{Document, NodeId};
use crate::toc::assign::write_id_confirmed;
use crate::toc::extract::extract;
use crate::toc::render::{link_for, link_kind, set_active_link};
use crate::toc::{display_text, TocConfig, BROKEN_CLASS};
use crate::window::{ScrollBehavior, Window};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickOutcome {
    /// The viewport was scrolled to `target`.
    Navigated { target: NodeId, restamped: bool },
    /// No node could be found; the link was flagged broken.
    Broken { link: NodeId },
    /// No sidebar link carries this identifier.
    NoLink,
}

#[derive(Debug, Clone, Default)]
pub struct NavigationController {
    suppressing: bool,
}

impl NavigationController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start (or extend) the window during which intersection updates are
    /// ignored. The caller owns the timer that ends it.
    pub fn suppress(&mut self) {
        self.suppressing = true;
    }

    pub fn release(&mut self) {
        self.suppressing = false;
    }

    pub fn is_suppressing(&self) -> bool {
        self.suppressing
    }

    pub fn on_link_click(
        &mut self,
        doc: &mut Document,
        window: &mut Window,
        list: NodeId,
        identifier: &str,
        config: &TocConfig,
    ) -> ClickOutcome {
        let Some(link) = link_for(doc, list, identifier) else {
            log::debug!("click on unknown identifier {:?}", identifier);
            return ClickOutcome::NoLink;
        };

        let (target, restamped) = match doc.get_element_by_id(identifier) {
            Some(node) => (node, false),
            None => match relocate(doc, link, identifier, config) {
                Some(node) => (node, true),
                None => {
                    log::warn!("link {:?} has no target; marking broken", identifier);
                    doc.add_class(link, BROKEN_CLASS);
                    return ClickOutcome::Broken { link };
                }
            },
        };

        self.suppress();
        doc.remove_class(link, BROKEN_CLASS);
        set_active_link(doc, list, link);

        doc.ensure_layout();
        let y = doc.layout_box(target).map(|b| b.y).unwrap_or(0.0);
        window.scroll_to(y, ScrollBehavior::Smooth);

        ClickOutcome::Navigated { target, restamped }
    }
}

/// Find the node a stale link meant and give it the identifier back.
fn relocate(doc: &mut Document, link: NodeId, identifier: &str, config: &TocConfig) -> Option<NodeId> {
    let kind = link_kind(doc, link);
    let label = doc.text_content(link);

    doc.ensure_layout();
    let candidate = extract(doc, &config.selectors)
        .into_iter()
        .find(|c| c.kind == kind && display_text(c.kind, &c.text, config.truncate_chars) == label)?;

    match write_id_confirmed(doc, candidate.node, identifier, config.assign_retries) {
        Ok(()) => {
            log::info!("re-stamped {:?} onto {}", identifier, candidate.node);
            Some(candidate.node)
        }
        Err(e) => {
            log::warn!("re-stamp of {:?} failed after {} attempts", identifier, e.attempts);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::parser::{parse_fragment, parse_html};
    use crate::toc::assign::assign;
    use crate::toc::render::{active_links, render, SidebarShell};
    use crate::window::Viewport;

    fn page() -> String {
        let filler = "<p>".to_string() + &"words ".repeat(300) + "</p>";
        format!(
            r#"<html><body><main>
                <div class="group/query">How do I set up a cargo workspace for three crates?</div>{f}
                <div id="markdown-content-0"><h1>Workspace layout</h1>{f}</div>
                <div class="group/query">second question</div>{f}
            </main></body></html>"#,
            f = filler
        )
    }

    fn setup() -> (Document, Window, SidebarShell, TocConfig) {
        let mut doc = parse_html(&page());
        let config = TocConfig::default();
        let shell = SidebarShell::create(&mut doc, false).unwrap();
        doc.ensure_layout();
        let nodes = extract(&doc, &config.selectors);
        let outcome = assign(&mut doc, nodes, &config);
        render(&mut doc, shell.list, &outcome.assigned, config.truncate_chars);
        let window = Window::new("https://www.perplexity.ai/search/abc", Viewport::new(1280.0, 800.0)).unwrap();
        (doc, window, shell, config)
    }

    #[test]
    fn direct_hit_scrolls_and_activates() {
        let (mut doc, mut window, shell, config) = setup();
        let mut nav = NavigationController::new();
        let target = doc.get_element_by_id("pp-toc-item-2").unwrap();

        let outcome = nav.on_link_click(&mut doc, &mut window, shell.list, "pp-toc-item-2", &config);
        assert_eq!(outcome, ClickOutcome::Navigated { target, restamped: false });
        assert!(nav.is_suppressing());
        assert_eq!(window.last_scroll(), Some(ScrollBehavior::Smooth));
        assert_eq!(window.viewport.scroll_y, doc.layout_box(target).unwrap().y);
        let link = link_for(&doc, shell.list, "pp-toc-item-2").unwrap();
        assert_eq!(active_links(&doc, shell.list), vec![link]);
    }

    #[test]
    fn replaced_node_is_found_by_text_and_restamped() {
        let (mut doc, mut window, shell, config) = setup();
        let mut nav = NavigationController::new();
        let old = doc.get_element_by_id("pp-toc-item-0").unwrap();
        // The host re-renders the prompt block without our id.
        let fresh = parse_fragment(
            &mut doc,
            r#"<div class="group/query">How do I set up a cargo workspace for three crates?</div>"#,
        )[0];
        doc.replace_child(old, fresh);

        let outcome = nav.on_link_click(&mut doc, &mut window, shell.list, "pp-toc-item-0", &config);
        assert_eq!(outcome, ClickOutcome::Navigated { target: fresh, restamped: true });
        assert_eq!(doc.get_element_by_id("pp-toc-item-0"), Some(fresh));
    }

    #[test]
    fn missing_target_marks_link_broken() {
        let (mut doc, mut window, shell, config) = setup();
        let mut nav = NavigationController::new();
        let heading = doc.get_element_by_id("pp-toc-item-1").unwrap();
        doc.remove(heading);

        let outcome = nav.on_link_click(&mut doc, &mut window, shell.list, "pp-toc-item-1", &config);
        let link = link_for(&doc, shell.list, "pp-toc-item-1").unwrap();
        assert_eq!(outcome, ClickOutcome::Broken { link });
        assert!(doc.has_class(link, BROKEN_CLASS));
        assert!(!nav.is_suppressing());
        assert_eq!(window.last_scroll(), None);
        assert!(active_links(&doc, shell.list).is_empty());
    }

    #[test]
    fn unknown_identifier_is_ignored() {
        let (mut doc, mut window, shell, config) = setup();
        let mut nav = NavigationController::new();
        let outcome = nav.on_link_click(&mut doc, &mut window, shell.list, "pp-toc-item-99", &config);
        assert_eq!(outcome, ClickOutcome::NoLink);
        nav.suppress();
        nav.release();
        assert!(!nav.is_suppressing());
    }
}
