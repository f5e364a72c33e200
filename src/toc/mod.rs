//! Table-of-contents core: extraction, identifier assignment, sidebar
//! rendering, visibility tracking, mutation scheduling, click navigation
//! and the sidebar lifecycle.
//!
//! Each stage is a plain function or a small state holder; the
//! `engine::controller::TocController` owns them all and is the only
//! place that sequences them.

pub mod extract;
pub mod assign;
pub mod render;
pub mod visibility;
pub mod mutation;
pub mod navigation;
pub mod lifecycle;

use std::fmt;

use crate::dom::query::{Selector, SelectorError};
use crate::dom::NodeId;
use crate::storage::StorageError;

/// Id of the sidebar container appended to the body.
pub const SIDEBAR_ID: &str = "perplexity-index-sidebar";
pub const LINK_CLASS: &str = "perplexity-toc-link";
pub const PROMPT_LINK_CLASS: &str = "perplexity-toc-prompt";
pub const PROMPT_ITEM_CLASS: &str = "perplexity-toc-prompt-item";
pub const SUBTITLE_ITEM_CLASS: &str = "perplexity-toc-subtitle";
pub const ACTIVE_CLASS: &str = "toc-active-link";
pub const BROKEN_CLASS: &str = "toc-broken-link";
pub const COLLAPSED_CLASS: &str = "collapsed";

pub const PROMPT_SELECTOR: &str = r".group\/query";
pub const HEADING_SELECTOR: &str = r#"div[id^="markdown-content"] h1"#;
pub const SUBHEADING_SELECTOR: &str = r#"div[id^="markdown-content"] h2"#;

/// Category of a conversation node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// A user prompt block.
    Prompt,
    /// Top-level heading of an assistant answer.
    Heading,
    /// Second-level heading of an assistant answer.
    Subheading,
}

impl NodeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            NodeKind::Prompt => "prompt",
            NodeKind::Heading => "heading",
            NodeKind::Subheading => "subheading",
        }
    }

    /// Label shown when a node has no text of its own.
    pub fn placeholder(self) -> &'static str {
        match self {
            NodeKind::Prompt => "(prompt)",
            NodeKind::Heading => "(heading)",
            NodeKind::Subheading => "(subheading)",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A host-document node picked up by one extraction pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentNode {
    pub node: NodeId,
    pub kind: NodeKind,
    /// Trimmed `textContent`.
    pub text: String,
    /// Rank within this extraction pass only.
    pub index: usize,
}

/// Selectors for the three conversation node categories.
#[derive(Debug, Clone)]
pub struct ConversationSelectors {
    pub prompt: Selector,
    pub heading: Selector,
    pub subheading: Selector,
}

impl ConversationSelectors {
    pub fn parse(prompt: &str, heading: &str, subheading: &str) -> Result<Self, TocError> {
        Ok(Self {
            prompt: Selector::parse(prompt)?,
            heading: Selector::parse(heading)?,
            subheading: Selector::parse(subheading)?,
        })
    }
}

impl Default for ConversationSelectors {
    fn default() -> Self {
        // The built-in selectors are known to parse.
        match Self::parse(PROMPT_SELECTOR, HEADING_SELECTOR, SUBHEADING_SELECTOR) {
            Ok(s) => s,
            Err(e) => unreachable!("built-in selectors: {}", e),
        }
    }
}

/// Tunables for the whole TOC engine.
#[derive(Debug, Clone)]
pub struct TocConfig {
    /// Prompt text budget in characters before the `...` marker.
    pub truncate_chars: usize,
    pub id_prefix: String,
    /// Write-and-read-back attempts per node.
    pub assign_retries: usize,
    /// Path prefix of a thread page.
    pub route_prefix: String,
    /// A thread page path must be at least this long.
    pub min_path_len: usize,
    pub content_debounce_ms: u64,
    pub body_debounce_ms: u64,
    pub nav_settle_ms: u64,
    pub integrity_check_ms: u64,
    pub integrity_retry_ms: u64,
    pub self_heal_ms: u64,
    /// Root margins of the trigger band, as fractions of viewport height.
    pub trigger_top: f32,
    pub trigger_bottom: f32,
    pub storage_key: String,
    pub selectors: ConversationSelectors,
}

impl Default for TocConfig {
    fn default() -> Self {
        Self {
            truncate_chars: 24,
            id_prefix: "pp-toc-item-".to_string(),
            assign_retries: 3,
            route_prefix: "/search/".to_string(),
            min_path_len: 9,
            content_debounce_ms: 200,
            body_debounce_ms: 100,
            nav_settle_ms: 1000,
            integrity_check_ms: 100,
            integrity_retry_ms: 500,
            self_heal_ms: 100,
            trigger_top: 0.2,
            trigger_bottom: 0.8,
            storage_key: "perplexity-toc-collapsed".to_string(),
            selectors: ConversationSelectors::default(),
        }
    }
}

impl TocConfig {
    pub fn with_truncate_chars(mut self, chars: usize) -> Self {
        self.truncate_chars = chars;
        self
    }

    pub fn with_id_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.id_prefix = prefix.into();
        self
    }

    /// Thread pages are paths under `prefix` with at least one more character.
    pub fn with_route_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.route_prefix = prefix.into();
        self.min_path_len = self.route_prefix.len() + 1;
        self
    }

    pub fn with_selectors(mut self, selectors: ConversationSelectors) -> Self {
        self.selectors = selectors;
        self
    }

    pub fn with_trigger_band(mut self, top: f32, bottom: f32) -> Self {
        self.trigger_top = top.clamp(0.0, 1.0);
        self.trigger_bottom = bottom.clamp(0.0, 1.0);
        self
    }

    /// Canonical identifier for extraction rank `index`.
    pub fn canonical_id(&self, index: usize) -> String {
        format!("{}{}", self.id_prefix, index)
    }

    /// Whether `value` follows the identifier scheme (prefix + digits).
    pub fn is_scheme_id(&self, value: &str) -> bool {
        value
            .strip_prefix(self.id_prefix.as_str())
            .map(|rest| !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit()))
            .unwrap_or(false)
    }
}

/// Sidebar text for a node: placeholder when empty, prompts cut to the
/// budget with a `...` marker. Headings are never cut.
pub fn display_text(kind: NodeKind, raw: &str, budget: usize) -> String {
    let text = raw.trim();
    if text.is_empty() {
        return kind.placeholder().to_string();
    }
    if kind == NodeKind::Prompt && text.chars().count() > budget {
        let mut cut: String = text.chars().take(budget).collect();
        cut.push_str("...");
        return cut;
    }
    text.to_string()
}

/// Errors surfaced by the TOC engine. Everything else degrades silently.
#[derive(Debug)]
pub enum TocError {
    /// The document has no `<body>` to attach the sidebar to.
    MissingBody,
    InvalidSelector(SelectorError),
    Storage(StorageError),
}

impl fmt::Display for TocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TocError::MissingBody => write!(f, "document has no <body>"),
            TocError::InvalidSelector(e) => write!(f, "{}", e),
            TocError::Storage(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for TocError {}

impl From<SelectorError> for TocError {
    fn from(e: SelectorError) -> Self {
        TocError::InvalidSelector(e)
    }
}

impl From<StorageError> for TocError {
    fn from(e: StorageError) -> Self {
        TocError::Storage(e)
    }
}
