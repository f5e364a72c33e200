//! Visibility tracker.
//!
//! `IntersectionWatch` plays the role of an IntersectionObserver: it is
//! given a set of targets and a trigger band, and reports a target every
//! time it crosses the band (plus once for every target on registration).
//! `VisibilityTracker` owns at most one watch at a time and turns
//! intersection entries into the sidebar's active-link state.

use std::collections::HashMap;

use crate::dom::{Document, NodeId};
use crate::toc::render::{link_for, set_active_link};
use crate::window::Viewport;

/// Delivered when a target enters or leaves the trigger band.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntersectionEntry {
    pub target: NodeId,
    pub is_intersecting: bool,
}

/// The part of the viewport that counts as "current section", given as
/// root margins (fractions of the viewport height cut from the top and
/// bottom). With 0.2 / 0.8 the band is the single line 20% down the
/// viewport: a node is current while its box spans that line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TriggerBand {
    pub top: f32,
    pub bottom: f32,
}

impl TriggerBand {
    pub fn new(top: f32, bottom: f32) -> Self {
        Self { top, bottom }
    }

    /// Band edges in document coordinates.
    pub fn edges(&self, viewport: &Viewport) -> (f32, f32) {
        let start = viewport.scroll_y + viewport.height * self.top;
        let end = viewport.scroll_y + viewport.height * (1.0 - self.bottom);
        (start, end.max(start))
    }

    pub fn intersects(&self, viewport: &Viewport, top: f32, bottom: f32) -> bool {
        let (start, end) = self.edges(viewport);
        if end - start <= f32::EPSILON {
            top <= start && bottom > start
        } else {
            top < end && bottom > start
        }
    }
}

impl Default for TriggerBand {
    fn default() -> Self {
        Self::new(0.2, 0.8)
    }
}

/// One registration: a fixed target set observed against a band.
#[derive(Debug, Clone)]
pub struct IntersectionWatch {
    band: TriggerBand,
    targets: Vec<NodeId>,
    last: HashMap<NodeId, bool>,
}

impl IntersectionWatch {
    pub fn observe(band: TriggerBand, targets: &[NodeId]) -> Self {
        Self {
            band,
            targets: targets.to_vec(),
            last: HashMap::new(),
        }
    }

    pub fn targets(&self) -> &[NodeId] {
        &self.targets
    }

    /// Entries for targets whose state changed since the last call. The
    /// first call reports every target. Targets without a box report as
    /// not intersecting.
    pub fn take_records(&mut self, doc: &Document, viewport: &Viewport) -> Vec<IntersectionEntry> {
        let mut out = Vec::new();
        for target in &self.targets {
            let now = doc
                .layout_box(*target)
                .filter(|b| doc.is_connected(*target) && !b.is_empty())
                .map(|b| self.band.intersects(viewport, b.y, b.bottom()))
                .unwrap_or(false);
            if self.last.insert(*target, now) != Some(now) {
                out.push(IntersectionEntry {
                    target: *target,
                    is_intersecting: now,
                });
            }
        }
        out
    }
}

/// Active link change produced by a batch of intersection entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveChange {
    pub id: String,
    pub link: NodeId,
}

#[derive(Debug, Clone)]
pub struct VisibilityTracker {
    band: TriggerBand,
    watch: Option<IntersectionWatch>,
    generation: u64,
}

impl VisibilityTracker {
    pub fn new(band: TriggerBand) -> Self {
        Self {
            band,
            watch: None,
            generation: 0,
        }
    }

    /// Replace the current registration with one over `targets`. The old
    /// watch is dropped first; registrations never stack.
    pub fn track(&mut self, targets: &[NodeId], generation: u64) {
        self.disconnect();
        self.watch = Some(IntersectionWatch::observe(self.band, targets));
        self.generation = generation;
    }

    pub fn disconnect(&mut self) {
        if let Some(old) = self.watch.take() {
            log::debug!("tracker: dropping watch over {} nodes", old.targets().len());
        }
    }

    pub fn is_tracking(&self) -> bool {
        self.watch.is_some()
    }

    /// Currently registered nodes.
    pub fn tracked(&self) -> &[NodeId] {
        self.watch.as_ref().map(|w| w.targets()).unwrap_or(&[])
    }

    /// Generation of the render that produced the current registration.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Pull pending entries from the watch (empty when not tracking).
    pub fn take_records(&mut self, doc: &Document, viewport: &Viewport) -> Vec<IntersectionEntry> {
        match self.watch.as_mut() {
            Some(w) => w.take_records(doc, viewport),
            None => Vec::new(),
        }
    }

    /// Apply a batch of entries to the sidebar. Entries are handled in
    /// delivery order and the last intersecting one wins. Nothing happens
    /// while `suppressed`.
    pub fn on_intersections(
        &self,
        doc: &mut Document,
        list: NodeId,
        entries: &[IntersectionEntry],
        suppressed: bool,
    ) -> Option<ActiveChange> {
        if suppressed || self.watch.is_none() {
            return None;
        }
        let mut change = None;
        for entry in entries.iter().filter(|e| e.is_intersecting) {
            let Some(id) = doc.attr(entry.target, "id").map(str::to_string) else {
                continue;
            };
            let Some(link) = link_for(doc, list, &id) else {
                continue;
            };
            set_active_link(doc, list, link);
            change = Some(ActiveChange { id, link });
        }
        change
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::parser::parse_html;
    use crate::toc::assign::assign;
    use crate::toc::extract::extract;
    use crate::toc::render::{active_links, render, SidebarShell};
    use crate::toc::TocConfig;

    fn page() -> String {
        let filler = "<p>".to_string() + &"lorem ipsum ".repeat(400) + "</p>";
        format!(
            r#"<html><body><main>
                <div class="group/query">first</div>{f}
                <div class="group/query">second</div>{f}
                <div class="group/query">third</div>{f}
            </main></body></html>"#,
            f = filler
        )
    }

    fn setup() -> (Document, SidebarShell, Vec<NodeId>, VisibilityTracker) {
        let mut doc = parse_html(&page());
        let config = TocConfig::default();
        let shell = SidebarShell::create(&mut doc, false).unwrap();
        doc.ensure_layout();
        let nodes = extract(&doc, &config.selectors);
        let outcome = assign(&mut doc, nodes, &config);
        render(&mut doc, shell.list, &outcome.assigned, config.truncate_chars);
        let targets: Vec<_> = outcome.assigned.iter().map(|a| a.content.node).collect();
        let mut tracker = VisibilityTracker::new(TriggerBand::default());
        tracker.track(&targets, 1);
        (doc, shell, targets, tracker)
    }

    fn scroll_to_node(doc: &Document, node: NodeId, viewport: &mut Viewport) {
        let b = doc.layout_box(node).unwrap();
        // Put the node's top just above the 20% line.
        viewport.scroll_y = b.y - viewport.height * 0.2 + 1.0;
    }

    #[test]
    fn band_is_a_line_at_twenty_percent() {
        let band = TriggerBand::default();
        let vp = Viewport {
            scroll_y: 100.0,
            width: 800.0,
            height: 1000.0,
        };
        assert_eq!(band.edges(&vp), (300.0, 300.0));
        assert!(band.intersects(&vp, 250.0, 350.0));
        assert!(!band.intersects(&vp, 301.0, 400.0));
        assert!(!band.intersects(&vp, 200.0, 300.0));
    }

    #[test]
    fn watch_reports_only_changes() {
        let (doc, _, targets, mut tracker) = setup();
        let mut vp = Viewport::new(1280.0, 800.0);
        let first = tracker.take_records(&doc, &vp);
        assert_eq!(first.len(), targets.len());
        assert!(tracker.take_records(&doc, &vp).is_empty());

        scroll_to_node(&doc, targets[1], &mut vp);
        let moved = tracker.take_records(&doc, &vp);
        assert!(moved
            .iter()
            .any(|e| e.target == targets[1] && e.is_intersecting));
    }

    #[test]
    fn last_intersecting_entry_wins() {
        let (mut doc, shell, targets, tracker) = setup();
        let entries = vec![
            IntersectionEntry {
                target: targets[0],
                is_intersecting: true,
            },
            IntersectionEntry {
                target: targets[2],
                is_intersecting: true,
            },
            IntersectionEntry {
                target: targets[1],
                is_intersecting: false,
            },
        ];
        let change = tracker
            .on_intersections(&mut doc, shell.list, &entries, false)
            .unwrap();
        assert_eq!(change.id, "pp-toc-item-2");
        assert_eq!(active_links(&doc, shell.list), vec![change.link]);
    }

    #[test]
    fn suppressed_batches_are_ignored() {
        let (mut doc, shell, targets, tracker) = setup();
        let entries = [IntersectionEntry {
            target: targets[0],
            is_intersecting: true,
        }];
        assert!(tracker
            .on_intersections(&mut doc, shell.list, &entries, true)
            .is_none());
        assert!(active_links(&doc, shell.list).is_empty());
    }

    #[test]
    fn track_replaces_registration() {
        let (_, _, targets, mut tracker) = setup();
        tracker.track(&targets[..1], 2);
        assert_eq!(tracker.tracked(), &targets[..1]);
        assert_eq!(tracker.generation(), 2);
        tracker.disconnect();
        assert!(tracker.tracked().is_empty());
        assert!(!tracker.is_tracking());
    }
}
