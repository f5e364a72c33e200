//! The TOC controller.
//!
//! A single owner for everything the content script keeps between events:
//! the host document and window, the sidebar state, the observers and the
//! timers. Callers feed it `TocEvent`s and advance the virtual clock; all
//! sequencing of the toc stages happens here.

use std::fmt;

use crate::dom::{Document, MutationRecord, NodeId};
use crate::engine::timer::TimerQueue;
use crate::storage::{read_flag, write_flag, KeyValueStore};
use crate::toc::assign::{assign, release_stale_ids};
use crate::toc::extract::{extract, fingerprint};
use crate::toc::lifecycle::{decide, route_qualifies, LifecycleDecision, SidebarPresence, SidebarState};
use crate::toc::mutation::{MutationCoordinator, PendingAction};
use crate::toc::navigation::{ClickOutcome, NavigationController};
use crate::toc::render::{link_for, nearest_scroll_offset, render, set_active_link, SidebarShell, TocEntry};
use crate::toc::visibility::{IntersectionEntry, TriggerBand, VisibilityTracker};
use crate::toc::{TocConfig, TocError};
use crate::window::{NavigationSignal, Window};

/// Timer slots. At most one of each is pending at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    ContentDebounce,
    BodyDebounce,
    NavigationSettle,
    IntegrityCheck,
    IntegrityRetry,
    SelfHeal,
}

/// Everything that can happen to the page from the controller's view.
#[derive(Debug, Clone, PartialEq)]
pub enum TocEvent {
    /// The document changed; drain its mutation records.
    DomChanged,
    /// The user scrolled the main viewport.
    Scrolled { y: f32 },
    /// Entries from an external intersection source.
    Intersections(Vec<IntersectionEntry>),
    /// A sidebar link with this target identifier was clicked.
    LinkClicked(String),
    Navigation(NavigationSignal),
    ToggleCollapse,
    Unload,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ControllerStats {
    pub renders: u64,
    pub evaluations: u64,
    pub skips: u64,
}

/// Snapshot of how well the rendered list matches the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntegrityReport {
    pub generation: u64,
    pub tracker_generation: u64,
    pub entries: usize,
    pub tracked: usize,
    pub resolved: usize,
    /// Entry ids no connected node carries.
    pub unresolved: Vec<String>,
    /// Entry ids carried by more than one connected node.
    pub duplicates: Vec<String>,
    /// Tracked nodes are exactly the entries' targets.
    pub tracking_matches: bool,
}

impl IntegrityReport {
    pub fn is_healthy(&self) -> bool {
        self.unresolved.is_empty()
            && self.duplicates.is_empty()
            && self.tracking_matches
            && self.generation == self.tracker_generation
    }
}

impl fmt::Display for IntegrityReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "generation {} (tracker {}): {} entries, {} tracked, {} resolved",
            self.generation, self.tracker_generation, self.entries, self.tracked, self.resolved
        )?;
        if !self.unresolved.is_empty() {
            write!(f, ", unresolved {:?}", self.unresolved)?;
        }
        if !self.duplicates.is_empty() {
            write!(f, ", duplicates {:?}", self.duplicates)?;
        }
        if !self.tracking_matches {
            write!(f, ", tracking out of sync")?;
        }
        Ok(())
    }
}

pub struct TocController<S: KeyValueStore> {
    config: TocConfig,
    doc: Document,
    window: Window,
    store: S,
    timers: TimerQueue<TimerKind>,
    state: SidebarState,
    tracker: VisibilityTracker,
    coordinator: MutationCoordinator,
    nav: NavigationController,
    entries: Vec<TocEntry>,
    generation: u64,
    body_observer: bool,
    integrity_retry_used: bool,
    /// Link the sidebar last brought into view, and the sidebar's own
    /// scroll offset after doing so. The main viewport is never moved.
    sidebar_scroll: Option<NodeId>,
    sidebar_scroll_top: f32,
    stats: ControllerStats,
}

impl<S: KeyValueStore> TocController<S> {
    pub fn new(mut doc: Document, window: Window, store: S, config: TocConfig) -> Self {
        doc.set_viewport_width(window.viewport.width);
        let band = TriggerBand::new(config.trigger_top, config.trigger_bottom);
        Self {
            config,
            doc,
            window,
            store,
            timers: TimerQueue::new(),
            state: SidebarState::default(),
            tracker: VisibilityTracker::new(band),
            coordinator: MutationCoordinator::new(),
            nav: NavigationController::new(),
            entries: Vec::new(),
            generation: 0,
            body_observer: false,
            integrity_retry_used: false,
            sidebar_scroll: None,
            sidebar_scroll_top: 0.0,
            stats: ControllerStats::default(),
        }
    }

    /// Attach the body-level observer and run the first evaluation.
    pub fn start(&mut self) {
        self.body_observer = true;
        // Whatever built the page so far is the initial state.
        self.doc.take_mutations();
        self.evaluate();
    }

    pub fn handle(&mut self, event: TocEvent) {
        match event {
            TocEvent::DomChanged => self.sync(),
            TocEvent::Scrolled { y } => {
                self.window.viewport.scroll_y = y.max(0.0);
                self.deliver_intersections();
            }
            TocEvent::Intersections(entries) => self.apply_intersections(&entries),
            TocEvent::LinkClicked(id) => {
                self.click(&id);
            }
            TocEvent::Navigation(signal) => {
                log::info!("navigation ({:?}) to {}", signal.kind, signal.url);
                self.sync();
                self.evaluate();
            }
            TocEvent::ToggleCollapse => self.toggle_collapsed(),
            TocEvent::Unload => self.unload(),
        }
    }

    /// Move the virtual clock forward, firing every timer that comes due
    /// (including ones armed by timers that fire on the way).
    pub fn advance_time(&mut self, ms: u64) {
        let until = self.timers.now() + ms;
        loop {
            self.sync();
            let Some(timer) = self.timers.pop_due(until) else {
                break;
            };
            self.fire(timer);
        }
    }

    /// Hand pending document mutations to both observers.
    pub fn sync(&mut self) {
        let records = self.doc.take_mutations();
        if records.is_empty() {
            return;
        }
        if self.coordinator.observe(&self.doc, &records, &self.config).is_some() {
            self.timers.schedule(TimerKind::ContentDebounce, self.config.content_debounce_ms);
        }
        if self.body_observer && self.touches_body(&records) {
            self.timers.schedule(TimerKind::BodyDebounce, self.config.body_debounce_ms);
        }
    }

    fn touches_body(&self, records: &[MutationRecord]) -> bool {
        let Some(body) = self.doc.body() else {
            return false;
        };
        records
            .iter()
            .any(|r| r.target == body || self.doc.is_descendant_of(r.target, body))
    }

    fn fire(&mut self, timer: TimerKind) {
        log::debug!("timer {:?} fired at {}ms", timer, self.timers.now());
        match timer {
            TimerKind::ContentDebounce => match self.coordinator.take_pending() {
                Some(PendingAction::Rerender) => self.rerender("content change"),
                Some(PendingAction::Reevaluate) => self.evaluate(),
                None => {}
            },
            TimerKind::BodyDebounce => self.evaluate(),
            TimerKind::NavigationSettle => self.nav.release(),
            TimerKind::IntegrityCheck => self.check_integrity(),
            TimerKind::IntegrityRetry => {
                self.rerender("integrity retry");
                // The check after a retry does not earn another one.
                self.integrity_retry_used = self.state.is_present();
            }
            TimerKind::SelfHeal => self.rerender("broken link"),
        }
    }

    // ─── Lifecycle ───────────────────────────────────────────────────────────

    fn evaluate(&mut self) {
        self.stats.evaluations += 1;
        let location = self.window.location().clone();
        let qualifies = route_qualifies(&location, &self.config);
        let nodes = if qualifies {
            self.doc.ensure_layout();
            extract(&self.doc, &self.config.selectors)
        } else {
            Vec::new()
        };
        let print = fingerprint(&self.doc, &nodes);

        let mut decision = decide(&self.state, &location, qualifies, nodes.len(), print);
        if decision == LifecycleDecision::Skip && self.tracking_is_stale() {
            log::debug!("a tracked node left the document; refreshing");
            decision = LifecycleDecision::Refresh;
        }
        match decision {
            LifecycleDecision::Skip => {
                self.stats.skips += 1;
                log::debug!("unchanged ({} nodes at {}), skipping", nodes.len(), location.path());
            }
            LifecycleDecision::StayAbsent => {
                log::debug!("no TOC for {} ({} nodes)", location.path(), nodes.len());
            }
            LifecycleDecision::Enter => {
                if let Err(e) = self.enter() {
                    log::error!("sidebar setup failed: {}", e);
                    self.teardown();
                }
            }
            LifecycleDecision::Refresh => {
                if self.timers.is_pending(TimerKind::ContentDebounce) {
                    // The pending burst renders once it settles.
                    log::debug!("refresh deferred to pending content debounce");
                } else if let Err(e) = self.render_content() {
                    log::error!("refresh failed: {}", e);
                    self.teardown();
                }
            }
            LifecycleDecision::Leave => {
                log::info!("leaving {}: removing sidebar", location.path());
                self.teardown();
            }
        }
    }

    fn tracking_is_stale(&self) -> bool {
        self.tracker.tracked().iter().any(|n| !self.doc.is_connected(*n))
    }

    fn enter(&mut self) -> Result<(), TocError> {
        self.state.collapsed = read_flag(&self.store, &self.config.storage_key);
        self.ensure_shell()?;
        self.state.presence = SidebarPresence::Present;
        self.render_content()?;
        if !self.coordinator.connect(&self.doc) {
            return Err(TocError::MissingBody);
        }
        log::info!(
            "sidebar attached for {} with {} entries",
            self.window.pathname(),
            self.entries.len()
        );
        Ok(())
    }

    fn ensure_shell(&mut self) -> Result<SidebarShell, TocError> {
        if let Some(shell) = self.state.shell {
            if shell.is_attached(&self.doc) {
                return Ok(shell);
            }
            log::warn!("sidebar was removed by the page; rebuilding");
        }
        let shell = SidebarShell::create(&mut self.doc, self.state.collapsed)?;
        self.state.shell = Some(shell);
        Ok(shell)
    }

    /// Present -> Absent, or cleanup after a failed setup.
    fn teardown(&mut self) {
        if let Some(shell) = self.state.shell.take() {
            shell.remove(&mut self.doc);
        }
        if let Some(stray) = SidebarShell::find(&self.doc) {
            stray.remove(&mut self.doc);
        }
        self.tracker.disconnect();
        self.coordinator.disconnect();
        self.nav.release();
        for timer in [
            TimerKind::ContentDebounce,
            TimerKind::NavigationSettle,
            TimerKind::IntegrityCheck,
            TimerKind::IntegrityRetry,
            TimerKind::SelfHeal,
        ] {
            self.timers.cancel(timer);
        }
        self.entries.clear();
        self.sidebar_scroll = None;
        self.sidebar_scroll_top = 0.0;
        self.integrity_retry_used = false;
        self.state.clear();
    }

    fn unload(&mut self) {
        log::info!("unload: tearing down");
        self.teardown();
        self.body_observer = false;
        self.timers.clear();
        self.doc.take_mutations();
    }

    // ─── Content pipeline ────────────────────────────────────────────────────

    fn rerender(&mut self, reason: &str) {
        if !self.state.is_present() {
            log::debug!("{}: sidebar absent, nothing to render", reason);
            return;
        }
        log::debug!("re-render ({})", reason);
        if let Err(e) = self.render_content() {
            log::error!("re-render failed: {}", e);
            self.teardown();
        }
    }

    /// Extract, assign, render and re-track as one generation.
    fn render_content(&mut self) -> Result<(), TocError> {
        let shell = self.ensure_shell()?;

        self.doc.ensure_layout();
        let nodes = extract(&self.doc, &self.config.selectors);
        release_stale_ids(&mut self.doc, &nodes, &self.config);
        let outcome = assign(&mut self.doc, nodes.clone(), &self.config);
        // Taken after the writes, so an unchanged page fingerprints the same
        // on the next evaluation.
        let print = fingerprint(&self.doc, &nodes);

        self.generation += 1;
        self.sidebar_scroll = None;
        self.entries = render(&mut self.doc, shell.list, &outcome.assigned, self.config.truncate_chars);
        let targets: Vec<NodeId> = outcome.assigned.iter().map(|a| a.content.node).collect();
        self.tracker.track(&targets, self.generation);
        self.coordinator.reattach_if_stale(&self.doc);
        self.stats.renders += 1;
        self.integrity_retry_used = false;

        let location = self.window.location().clone();
        self.state.record(&location, print);

        if self.entries.is_empty() {
            log::warn!("no conversation nodes on {}; sidebar left empty", location.path());
        }
        if !outcome.failures.is_empty() {
            log::warn!(
                "generation {}: {} node(s) left out of the TOC",
                self.generation,
                outcome.failures.len()
            );
        }

        if let Some(id) = self.state.active_id.clone() {
            if let Some(link) = link_for(&self.doc, shell.list, &id) {
                set_active_link(&mut self.doc, shell.list, link);
            }
        }
        self.deliver_intersections();

        self.timers.cancel(TimerKind::IntegrityRetry);
        self.timers.schedule(TimerKind::IntegrityCheck, self.config.integrity_check_ms);
        log::debug!("generation {}: {} entries", self.generation, self.entries.len());
        Ok(())
    }

    fn deliver_intersections(&mut self) {
        self.doc.ensure_layout();
        let entries = self.tracker.take_records(&self.doc, &self.window.viewport);
        self.apply_intersections(&entries);
    }

    fn apply_intersections(&mut self, entries: &[IntersectionEntry]) {
        let Some(shell) = self.state.shell else {
            return;
        };
        let suppressed = self.nav.is_suppressing();
        if let Some(change) = self.tracker.on_intersections(&mut self.doc, shell.list, entries, suppressed) {
            self.scroll_sidebar_to(shell, change.link);
            self.state.active_id = Some(change.id);
        }
    }

    /// Nearest-block scroll of the sidebar so `link` is visible. The sidebar
    /// is fixed and as tall as the viewport.
    fn scroll_sidebar_to(&mut self, shell: SidebarShell, link: NodeId) {
        self.sidebar_scroll = Some(link);
        self.doc.ensure_layout();
        let (Some(frame), Some(item)) = (self.doc.layout_box(shell.root), self.doc.layout_box(link)) else {
            return;
        };
        let top = item.y - frame.y;
        self.sidebar_scroll_top = nearest_scroll_offset(
            self.sidebar_scroll_top,
            self.window.viewport.height,
            top,
            top + item.height,
        );
    }

    fn check_integrity(&mut self) {
        if !self.state.is_present() {
            return;
        }
        let report = self.integrity_report();
        if report.is_healthy() {
            self.integrity_retry_used = false;
            return;
        }
        if self.integrity_retry_used {
            log::warn!("integrity still failing after retry: {}", report);
            return;
        }
        log::warn!("integrity check failed, retrying: {}", report);
        self.integrity_retry_used = true;
        self.timers.schedule(TimerKind::IntegrityRetry, self.config.integrity_retry_ms);
    }

    // ─── User actions ────────────────────────────────────────────────────────

    /// Follow a sidebar link.
    pub fn click(&mut self, identifier: &str) -> ClickOutcome {
        let Some(shell) = self.state.shell.filter(|s| s.is_attached(&self.doc)) else {
            log::debug!("click on {:?} with no sidebar", identifier);
            return ClickOutcome::NoLink;
        };
        let outcome = self
            .nav
            .on_link_click(&mut self.doc, &mut self.window, shell.list, identifier, &self.config);
        match outcome {
            ClickOutcome::Navigated { .. } => {
                self.timers.schedule(TimerKind::NavigationSettle, self.config.nav_settle_ms);
                self.state.active_id = Some(identifier.to_string());
                self.deliver_intersections();
            }
            ClickOutcome::Broken { .. } => {
                self.timers.schedule(TimerKind::SelfHeal, self.config.self_heal_ms);
            }
            ClickOutcome::NoLink => {}
        }
        outcome
    }

    fn toggle_collapsed(&mut self) {
        let Some(shell) = self.state.shell else {
            return;
        };
        self.state.collapsed = !self.state.collapsed;
        shell.apply_collapsed(&mut self.doc, self.state.collapsed);
        if let Err(e) = write_flag(&mut self.store, &self.config.storage_key, self.state.collapsed) {
            log::warn!("collapse state not saved: {}", e);
        }
    }

    // ─── Diagnostics ─────────────────────────────────────────────────────────

    pub fn integrity_report(&self) -> IntegrityReport {
        let mut resolved = 0;
        let mut unresolved = Vec::new();
        let mut duplicates = Vec::new();
        for entry in &self.entries {
            match self.doc.elements_by_id(&entry.id).len() {
                0 => unresolved.push(entry.id.clone()),
                1 => resolved += 1,
                _ => duplicates.push(entry.id.clone()),
            }
        }
        let tracked = self.tracker.tracked();
        let tracking_matches =
            tracked.len() == self.entries.len() && self.entries.iter().all(|e| tracked.contains(&e.target));
        IntegrityReport {
            generation: self.generation,
            tracker_generation: self.tracker.generation(),
            entries: self.entries.len(),
            tracked: tracked.len(),
            resolved,
            unresolved,
            duplicates,
            tracking_matches,
        }
    }

    /// Re-run the content pipeline now. A no-op while the sidebar is absent.
    pub fn force_rerender(&mut self) -> Result<(), TocError> {
        if !self.state.is_present() {
            log::debug!("force_rerender: sidebar absent");
            return Ok(());
        }
        self.render_content()
    }

    // ─── Accessors ───────────────────────────────────────────────────────────

    pub fn config(&self) -> &TocConfig {
        &self.config
    }

    pub fn document(&self) -> &Document {
        &self.doc
    }

    /// Host-side access to the page. Call `sync` (or send `DomChanged`)
    /// after editing so the observers see the change.
    pub fn document_mut(&mut self) -> &mut Document {
        &mut self.doc
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    pub fn window_mut(&mut self) -> &mut Window {
        &mut self.window
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn state(&self) -> &SidebarState {
        &self.state
    }

    pub fn is_present(&self) -> bool {
        self.state.is_present()
    }

    pub fn entries(&self) -> &[TocEntry] {
        &self.entries
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn tracked(&self) -> &[NodeId] {
        self.tracker.tracked()
    }

    pub fn is_suppressing(&self) -> bool {
        self.nav.is_suppressing()
    }

    /// Link the sidebar last brought into view in this generation.
    pub fn sidebar_scroll_target(&self) -> Option<NodeId> {
        self.sidebar_scroll
    }

    /// The sidebar list's scroll offset.
    pub fn sidebar_scroll_top(&self) -> f32 {
        self.sidebar_scroll_top
    }

    pub fn is_timer_pending(&self, timer: TimerKind) -> bool {
        self.timers.is_pending(timer)
    }

    pub fn pending_timers(&self) -> usize {
        self.timers.len()
    }

    pub fn now(&self) -> u64 {
        self.timers.now()
    }

    pub fn stats(&self) -> ControllerStats {
        self.stats
    }
}
