//! Sidebar lifecycle.
//!
//! `decide` is the pure transition function; the controller applies the
//! decision to the document. Keeping it free of DOM access keeps the
//! no-op guard and the Absent/Present rules testable on their own.

use url::Url;

use crate::toc::render::SidebarShell;
use crate::toc::TocConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SidebarPresence {
    #[default]
    Absent,
    Present,
}

/// Everything the lifecycle remembers between evaluations.
#[derive(Debug, Clone, Default)]
pub struct SidebarState {
    pub presence: SidebarPresence,
    pub collapsed: bool,
    pub active_id: Option<String>,
    pub last_location: Option<String>,
    pub last_fingerprint: Option<u64>,
    pub shell: Option<SidebarShell>,
}

impl SidebarState {
    pub fn is_present(&self) -> bool {
        self.presence == SidebarPresence::Present
    }

    /// Remember what the last successful render was based on.
    pub fn record(&mut self, location: &Url, fingerprint: u64) {
        self.last_location = Some(location.as_str().to_string());
        self.last_fingerprint = Some(fingerprint);
    }

    /// Forget everything tied to the current page.
    pub fn clear(&mut self) {
        self.presence = SidebarPresence::Absent;
        self.active_id = None;
        self.last_location = None;
        self.last_fingerprint = None;
        self.shell = None;
    }
}

/// Whether `url` is a thread page that can carry a TOC.
pub fn route_qualifies(url: &Url, config: &TocConfig) -> bool {
    let path = url.path();
    path.starts_with(config.route_prefix.as_str()) && path.len() >= config.min_path_len
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleDecision {
    /// Present, and nothing changed since the last evaluation.
    Skip,
    /// Absent -> Present.
    Enter,
    /// Present -> Present with a change: re-run the pipeline.
    Refresh,
    /// Present -> Absent.
    Leave,
    /// Absent, and not (yet) eligible.
    StayAbsent,
}

/// Pick the transition for one evaluation. `extractable` is the number of
/// nodes a fresh extraction found; `fingerprint` its content hash.
pub fn decide(
    state: &SidebarState,
    location: &Url,
    qualifies: bool,
    extractable: usize,
    fingerprint: u64,
) -> LifecycleDecision {
    match (state.presence, qualifies) {
        (SidebarPresence::Present, false) => LifecycleDecision::Leave,
        (SidebarPresence::Absent, false) => LifecycleDecision::StayAbsent,
        (SidebarPresence::Absent, true) if extractable == 0 => LifecycleDecision::StayAbsent,
        (SidebarPresence::Absent, true) => LifecycleDecision::Enter,
        (SidebarPresence::Present, true) => {
            let same_location = state.last_location.as_deref() == Some(location.as_str());
            let same_content = state.last_fingerprint == Some(fingerprint);
            if same_location && same_content {
                LifecycleDecision::Skip
            } else {
                LifecycleDecision::Refresh
            }
        }
    }
}
