//! Host window: location, session history and the scrolling viewport.
//!
//! Programmatic history changes (`push_state` / `replace_state`) raise no
//! event in a real page, so every method here returns the
//! `NavigationSignal` the content script would otherwise have had to
//! synthesize. The caller forwards it to the controller.

use std::fmt;

use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationKind {
    /// `history.pushState`
    Push,
    /// `history.replaceState`
    Replace,
    /// back / forward (`popstate`)
    Pop,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationSignal {
    pub kind: NavigationKind,
    pub url: Url,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollBehavior {
    Smooth,
    Instant,
}

/// Visible region of the document.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub scroll_y: f32,
    pub width: f32,
    pub height: f32,
}

impl Viewport {
    pub fn new(width: f32, height: f32) -> Self {
        Self {
            scroll_y: 0.0,
            width,
            height,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowError {
    pub message: String,
}

impl fmt::Display for WindowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for WindowError {}

#[derive(Debug, Clone)]
pub struct Window {
    history: Vec<Url>,
    history_idx: usize,
    pub viewport: Viewport,
    last_scroll: Option<ScrollBehavior>,
}

impl Window {
    pub fn new(location: &str, viewport: Viewport) -> Result<Self, WindowError> {
        let url = parse_location(location)?;
        Ok(Self {
            history: vec![url],
            history_idx: 0,
            viewport,
            last_scroll: None,
        })
    }

    pub fn location(&self) -> &Url {
        &self.history[self.history_idx]
    }

    pub fn pathname(&self) -> &str {
        self.location().path()
    }

    /// Push a new entry, resolving `target` against the current location.
    pub fn push_state(&mut self, target: &str) -> Result<NavigationSignal, WindowError> {
        let url = self.resolve(target)?;
        // Truncate forward history before pushing
        self.history.truncate(self.history_idx + 1);
        self.history.push(url.clone());
        self.history_idx = self.history.len() - 1;
        Ok(NavigationSignal {
            kind: NavigationKind::Push,
            url,
        })
    }

    /// Replace the current entry in place.
    pub fn replace_state(&mut self, target: &str) -> Result<NavigationSignal, WindowError> {
        let url = self.resolve(target)?;
        self.history[self.history_idx] = url.clone();
        Ok(NavigationSignal {
            kind: NavigationKind::Replace,
            url,
        })
    }

    /// Navigate one step back in history.
    pub fn back(&mut self) -> Option<NavigationSignal> {
        if self.history_idx == 0 {
            return None;
        }
        self.history_idx -= 1;
        Some(self.pop_signal())
    }

    /// Navigate one step forward in history.
    pub fn forward(&mut self) -> Option<NavigationSignal> {
        if self.history_idx + 1 >= self.history.len() {
            return None;
        }
        self.history_idx += 1;
        Some(self.pop_signal())
    }

    fn pop_signal(&self) -> NavigationSignal {
        NavigationSignal {
            kind: NavigationKind::Pop,
            url: self.location().clone(),
        }
    }

    fn resolve(&self, target: &str) -> Result<Url, WindowError> {
        self.location().join(target).map_err(|e| WindowError {
            message: format!("Invalid URL {:?}: {}", target, e),
        })
    }

    // ─── Scrolling ───────────────────────────────────────────────────────────

    /// Scroll the main viewport so that document offset `y` is at the top.
    pub fn scroll_to(&mut self, y: f32, behavior: ScrollBehavior) {
        self.viewport.scroll_y = y.max(0.0);
        self.last_scroll = Some(behavior);
    }

    /// Behavior of the most recent programmatic scroll, if any.
    pub fn last_scroll(&self) -> Option<ScrollBehavior> {
        self.last_scroll
    }
}

fn parse_location(location: &str) -> Result<Url, WindowError> {
    // Normalize URL
    let full = if location.contains("://") {
        location.to_string()
    } else {
        format!("https://{}", location)
    };
    Url::parse(&full).map_err(|e| WindowError {
        message: format!("Invalid URL: {}", e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window() -> Window {
        Window::new("https://www.perplexity.ai/", Viewport::new(1280.0, 800.0)).unwrap()
    }

    #[test]
    fn push_then_back_and_forward() {
        let mut w = window();
        let sig = w.push_state("/search/abc-123").unwrap();
        assert_eq!(sig.kind, NavigationKind::Push);
        assert_eq!(w.pathname(), "/search/abc-123");

        let back = w.back().unwrap();
        assert_eq!(back.kind, NavigationKind::Pop);
        assert_eq!(w.pathname(), "/");
        assert!(w.back().is_none());

        let fwd = w.forward().unwrap();
        assert_eq!(fwd.url.path(), "/search/abc-123");
        assert!(w.forward().is_none());
    }

    #[test]
    fn push_truncates_forward_entries() {
        let mut w = window();
        w.push_state("/a").unwrap();
        w.push_state("/b").unwrap();
        w.back();
        w.push_state("/c").unwrap();
        assert!(w.forward().is_none());
        assert_eq!(w.pathname(), "/c");
    }

    #[test]
    fn replace_keeps_history_length() {
        let mut w = window();
        w.push_state("/a").unwrap();
        let sig = w.replace_state("/search/zzz-999").unwrap();
        assert_eq!(sig.kind, NavigationKind::Replace);
        let back = w.back().unwrap();
        assert_eq!(back.url.path(), "/");
    }

    #[test]
    fn bare_host_is_normalized() {
        let w = Window::new("example.com/search/x", Viewport::new(800.0, 600.0)).unwrap();
        assert_eq!(w.location().scheme(), "https");
        assert_eq!(w.pathname(), "/search/x");
    }
}
