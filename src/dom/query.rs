//! Minimal CSS selector engine over the arena `Document`.
//!
//! Supports what structural queries on a chat page need: type selectors,
//! `#id`, `.class` (with `\` escapes, e.g. `.group\/query`), attribute
//! presence / equality / prefix (`[id^="markdown-content"]`), the
//! descendant and child combinators, and comma-separated groups.

use std::fmt;

use crate::dom::{Document, NodeId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectorError {
    pub selector: String,
}

impl fmt::Display for SelectorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unsupported selector: {}", self.selector)
    }
}

impl std::error::Error for SelectorError {}

#[derive(Debug, Clone, PartialEq, Eq)]
enum AttrCondition {
    Exists(String),
    Eq(String, String),
    StartsWith(String, String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Step {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attrs: Vec<AttrCondition>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Combinator {
    Descendant,
    Child,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Part {
    step: Step,
    /// Relation to the part on the left.
    combinator: Option<Combinator>,
}

/// A parsed selector list (`a, b c, d > e`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    source: String,
    groups: Vec<Vec<Part>>,
}

impl Selector {
    pub fn parse(source: &str) -> Result<Self, SelectorError> {
        let err = || SelectorError {
            selector: source.to_string(),
        };
        let mut groups = Vec::new();
        for group in split_outside_brackets(source, ',').ok_or_else(err)? {
            let group = group.trim();
            if group.is_empty() {
                return Err(err());
            }
            groups.push(parse_chain(group).ok_or_else(err)?);
        }
        if groups.is_empty() {
            return Err(err());
        }
        Ok(Self {
            source: source.to_string(),
            groups,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Whether `node` matches any group of this selector.
    pub fn matches(&self, doc: &Document, node: NodeId) -> bool {
        self.groups.iter().any(|chain| matches_chain(doc, node, chain))
    }

    /// Every element below `scope` (exclusive) that matches, in document order.
    pub fn select_all(&self, doc: &Document, scope: NodeId) -> Vec<NodeId> {
        doc.descendant_elements(scope)
            .into_iter()
            .filter(|n| self.matches(doc, *n))
            .collect()
    }

    /// Whether `root` or anything below it matches.
    pub fn matches_in_subtree(&self, doc: &Document, root: NodeId) -> bool {
        doc.subtree(root)
            .into_iter()
            .any(|n| doc.node(n).is_element() && self.matches(doc, n))
    }
}

fn matches_chain(doc: &Document, node: NodeId, chain: &[Part]) -> bool {
    let Some(last) = chain.last() else {
        return false;
    };
    if !matches_step(doc, node, &last.step) {
        return false;
    }
    let mut current = node;
    for idx in (1..chain.len()).rev() {
        let prev = &chain[idx - 1].step;
        let matched = match chain[idx].combinator.unwrap_or(Combinator::Descendant) {
            Combinator::Child => doc.parent(current).filter(|p| matches_step(doc, *p, prev)),
            Combinator::Descendant => doc.ancestors(current).find(|p| matches_step(doc, *p, prev)),
        };
        let Some(matched) = matched else {
            return false;
        };
        current = matched;
    }
    true
}

fn matches_step(doc: &Document, node: NodeId, step: &Step) -> bool {
    let n = doc.node(node);
    if !n.is_element() {
        return false;
    }
    if let Some(tag) = &step.tag {
        if !n.tag.eq_ignore_ascii_case(tag) {
            return false;
        }
    }
    if let Some(id) = &step.id {
        if n.attr("id") != Some(id.as_str()) {
            return false;
        }
    }
    if step.classes.iter().any(|c| !n.has_class(c)) {
        return false;
    }
    step.attrs.iter().all(|cond| match cond {
        AttrCondition::Exists(key) => n.attr(key).is_some(),
        AttrCondition::Eq(key, value) => n.attr(key) == Some(value.as_str()),
        AttrCondition::StartsWith(key, value) => {
            n.attr(key).is_some_and(|v| v.starts_with(value.as_str()))
        }
    })
}

/// Split on `sep` when not inside `[...]`. Returns `None` on unbalanced brackets.
fn split_outside_brackets(src: &str, sep: char) -> Option<Vec<String>> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut escaped = false;
    for ch in src.chars() {
        if escaped {
            current.push(ch);
            escaped = false;
            continue;
        }
        match ch {
            '\\' => {
                escaped = true;
                current.push(ch);
            }
            '[' => {
                depth += 1;
                current.push(ch);
            }
            ']' => {
                depth = depth.checked_sub(1)?;
                current.push(ch);
            }
            c if c == sep && depth == 0 => out.push(std::mem::take(&mut current)),
            c => current.push(c),
        }
    }
    if depth != 0 {
        return None;
    }
    out.push(current);
    Some(out)
}

fn parse_chain(group: &str) -> Option<Vec<Part>> {
    // Make `>` its own token, then split on whitespace outside brackets.
    let spaced: String = {
        let mut buf = String::new();
        let mut depth = 0usize;
        for ch in group.chars() {
            match ch {
                '[' => depth += 1,
                ']' => depth = depth.saturating_sub(1),
                _ => {}
            }
            if ch == '>' && depth == 0 {
                buf.push_str(" > ");
            } else {
                buf.push(ch);
            }
        }
        buf
    };

    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    for ch in spaced.chars() {
        match ch {
            '[' => depth += 1,
            ']' => depth = depth.saturating_sub(1),
            _ => {}
        }
        if ch.is_ascii_whitespace() && depth == 0 {
            if !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
        } else {
            current.push(ch);
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }

    let mut parts = Vec::new();
    let mut pending: Option<Combinator> = None;
    for token in tokens {
        if token == ">" {
            if pending.is_some() || parts.is_empty() {
                return None;
            }
            pending = Some(Combinator::Child);
            continue;
        }
        let step = parse_step(&token)?;
        let combinator = if parts.is_empty() {
            None
        } else {
            Some(pending.take().unwrap_or(Combinator::Descendant))
        };
        parts.push(Part { step, combinator });
    }
    if parts.is_empty() || pending.is_some() {
        return None;
    }
    Some(parts)
}

fn parse_step(token: &str) -> Option<Step> {
    let chars: Vec<char> = token.chars().collect();
    let mut i = 0;
    let mut step = Step::default();
    while i < chars.len() {
        match chars[i] {
            '#' => {
                let (ident, next) = parse_ident(&chars, i + 1)?;
                step.id = Some(ident);
                i = next;
            }
            '.' => {
                let (ident, next) = parse_ident(&chars, i + 1)?;
                step.classes.push(ident);
                i = next;
            }
            '[' => {
                let close = chars[i..].iter().position(|c| *c == ']')? + i;
                let inner: String = chars[i + 1..close].iter().collect();
                step.attrs.push(parse_attr(&inner)?);
                i = close + 1;
            }
            '*' if i == 0 => i += 1,
            _ if i == 0 => {
                let (ident, next) = parse_ident(&chars, i)?;
                step.tag = Some(ident.to_ascii_lowercase());
                i = next;
            }
            _ => return None,
        }
    }
    Some(step)
}

fn parse_ident(chars: &[char], start: usize) -> Option<(String, usize)> {
    let mut out = String::new();
    let mut i = start;
    while i < chars.len() {
        let c = chars[i];
        if c == '\\' {
            out.push(*chars.get(i + 1)?);
            i += 2;
        } else if c.is_alphanumeric() || c == '-' || c == '_' {
            out.push(c);
            i += 1;
        } else {
            break;
        }
    }
    if out.is_empty() {
        None
    } else {
        Some((out, i))
    }
}

fn parse_attr(inner: &str) -> Option<AttrCondition> {
    let unquote = |v: &str| v.trim().trim_matches('"').trim_matches('\'').to_string();
    if let Some((key, value)) = inner.split_once("^=") {
        return Some(AttrCondition::StartsWith(key.trim().to_string(), unquote(value)));
    }
    if let Some((key, value)) = inner.split_once('=') {
        return Some(AttrCondition::Eq(key.trim().to_string(), unquote(value)));
    }
    let key = inner.trim();
    if key.is_empty() {
        None
    } else {
        Some(AttrCondition::Exists(key.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::parser::parse_html;

    const PAGE: &str = r#"
        <html><body><main>
            <div class="group/query" id="q1">first question</div>
            <div id="markdown-content-0">
                <h1 id="h1">Answer</h1>
                <section><h2 id="h2">Detail</h2></section>
            </div>
            <h2 id="stray">Not in markdown</h2>
        </main></body></html>
    "#;

    #[test]
    fn escaped_class_selector() {
        let doc = parse_html(PAGE);
        let sel = Selector::parse(r".group\/query").unwrap();
        let q1 = doc.get_element_by_id("q1").unwrap();
        assert_eq!(sel.select_all(&doc, doc.root()), vec![q1]);
    }

    #[test]
    fn prefix_attribute_with_descendant() {
        let doc = parse_html(PAGE);
        let sel = Selector::parse(r#"div[id^="markdown-content"] h2"#).unwrap();
        let h2 = doc.get_element_by_id("h2").unwrap();
        assert_eq!(sel.select_all(&doc, doc.root()), vec![h2]);
    }

    #[test]
    fn selector_list_keeps_document_order() {
        let doc = parse_html(PAGE);
        let sel = Selector::parse(
            r#".group\/query, div[id^="markdown-content"] h1, div[id^="markdown-content"] h2"#,
        )
        .unwrap();
        let ids: Vec<_> = sel
            .select_all(&doc, doc.root())
            .into_iter()
            .map(|n| doc.attr(n, "id").unwrap().to_string())
            .collect();
        assert_eq!(ids, vec!["q1", "h1", "h2"]);
    }

    #[test]
    fn child_combinator_is_strict() {
        let doc = parse_html(PAGE);
        let sel = Selector::parse(r#"div[id^="markdown-content"] > h2"#).unwrap();
        assert!(sel.select_all(&doc, doc.root()).is_empty());
    }

    #[test]
    fn rejects_garbage() {
        assert!(Selector::parse("div[").is_err());
        assert!(Selector::parse("a,,b").is_err());
        assert!(Selector::parse("> a").is_err());
    }
}
