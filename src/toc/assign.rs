//! Identifier assigner.
//!
//! Stamps `id = prefix + rank` on every extracted node. Hosts can drop
//! attribute writes without telling anyone, so each write is read back and
//! retried a bounded number of times; after the pass, every id is resolved
//! through the document again to catch duplicates. Nodes that fail either
//! check are left out of this generation instead of failing the pass.

use std::fmt;

use crate::dom::{Document, NodeId};
use crate::toc::extract::in_sidebar;
use crate::toc::{ContentNode, TocConfig};

/// A node together with the identifier it verifiably carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignedNode {
    pub content: ContentNode,
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssignFailure {
    /// The write never stuck.
    WriteRejected {
        node: NodeId,
        id: String,
        attempts: usize,
    },
    /// The id resolves to some other node, or to more than one.
    Collision {
        node: NodeId,
        id: String,
        holders: usize,
    },
}

impl fmt::Display for AssignFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssignFailure::WriteRejected { node, id, attempts } => {
                write!(f, "{}: id {:?} not accepted after {} attempts", node, id, attempts)
            }
            AssignFailure::Collision { node, id, holders } => {
                write!(f, "{}: id {:?} resolves to {} nodes", node, id, holders)
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssignOutcome {
    pub assigned: Vec<AssignedNode>,
    pub failures: Vec<AssignFailure>,
}

/// Returned by `retry_bounded` when every attempt failed; carries the last error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryExhausted<E> {
    pub attempts: usize,
    pub last_error: E,
}

/// Run `op` until it succeeds, at most `attempts` times (at least once).
/// `op` receives the 1-based attempt number.
pub fn retry_bounded<T, E>(
    attempts: usize,
    mut op: impl FnMut(usize) -> Result<T, E>,
) -> Result<T, RetryExhausted<E>> {
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        match op(attempt) {
            Ok(value) => return Ok(value),
            Err(e) if attempt >= attempts => {
                return Err(RetryExhausted {
                    attempts,
                    last_error: e,
                })
            }
            Err(_) => attempt += 1,
        }
    }
}

/// Write `id` on `node` and confirm it by reading it back.
pub fn write_id_confirmed(
    doc: &mut Document,
    node: NodeId,
    id: &str,
    attempts: usize,
) -> Result<(), RetryExhausted<()>> {
    retry_bounded(attempts, |attempt| {
        doc.set_attr(node, "id", id);
        if doc.attr(node, "id") == Some(id) {
            Ok(())
        } else {
            log::debug!("id write on {} not observed (attempt {})", node, attempt);
            Err(())
        }
    })
}

/// Strip scheme ids from connected nodes outside this pass, so a node that
/// dropped out of the TOC (hidden, emptied) cannot shadow the new holder
/// of its old id.
pub fn release_stale_ids(doc: &mut Document, nodes: &[ContentNode], config: &TocConfig) {
    let stale: Vec<NodeId> = doc
        .descendant_elements(doc.root())
        .into_iter()
        .filter(|n| doc.attr(*n, "id").map(|v| config.is_scheme_id(v)).unwrap_or(false))
        .filter(|n| !nodes.iter().any(|c| c.node == *n))
        .filter(|n| !in_sidebar(doc, *n))
        .collect();
    for node in stale {
        log::debug!("releasing stale id on {}", node);
        doc.remove_attr(node, "id");
    }
}

/// Assign canonical identifiers to `nodes` (already in extraction order).
pub fn assign(doc: &mut Document, nodes: Vec<ContentNode>, config: &TocConfig) -> AssignOutcome {
    let mut outcome = AssignOutcome::default();
    let mut written = Vec::with_capacity(nodes.len());

    for content in nodes {
        let canonical = config.canonical_id(content.index);
        if doc.attr(content.node, "id") == Some(canonical.as_str()) {
            written.push(AssignedNode {
                content,
                id: canonical,
            });
            continue;
        }
        match write_id_confirmed(doc, content.node, &canonical, config.assign_retries) {
            Ok(()) => written.push(AssignedNode {
                content,
                id: canonical,
            }),
            Err(exhausted) => {
                log::warn!(
                    "dropping {} from TOC: id {:?} rejected {} times",
                    content.node,
                    canonical,
                    exhausted.attempts
                );
                outcome.failures.push(AssignFailure::WriteRejected {
                    node: content.node,
                    id: canonical,
                    attempts: exhausted.attempts,
                });
            }
        }
    }

    // Re-resolve every id globally once all writes are done.
    for entry in written {
        let holders = doc.elements_by_id(&entry.id);
        if holders.len() == 1 && holders[0] == entry.content.node {
            outcome.assigned.push(entry);
        } else {
            log::warn!(
                "dropping {} from TOC: id {:?} held by {} nodes",
                entry.content.node,
                entry.id,
                holders.len()
            );
            outcome.failures.push(AssignFailure::Collision {
                node: entry.content.node,
                id: entry.id,
                holders: holders.len(),
            });
        }
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::parser::parse_html;
    use crate::toc::extract::extract;

    const PAGE: &str = r#"<html><body><main>
        <div class="group/query" id="q-a">first</div>
        <div id="markdown-content-0"><h1>Answer</h1><h2 id="pp-toc-item-7">Stale</h2></div>
        <div class="group/query">second</div>
    </main></body></html>"#;

    fn setup(html: &str) -> (Document, Vec<ContentNode>, TocConfig) {
        let mut doc = parse_html(html);
        doc.ensure_layout();
        let config = TocConfig::default();
        let nodes = extract(&doc, &config.selectors);
        (doc, nodes, config)
    }

    #[test]
    fn kth_node_gets_kth_identifier() {
        let (mut doc, nodes, config) = setup(PAGE);
        let outcome = assign(&mut doc, nodes.clone(), &config);
        assert!(outcome.failures.is_empty());
        for (k, a) in outcome.assigned.iter().enumerate() {
            assert_eq!(a.id, format!("pp-toc-item-{}", k));
            assert_eq!(doc.get_element_by_id(&a.id), Some(nodes[k].node));
        }
    }

    #[test]
    fn canonical_ids_are_left_alone() {
        let (mut doc, nodes, config) = setup(PAGE);
        assign(&mut doc, nodes.clone(), &config);
        // Lock every node: a second pass must not need to write at all.
        for n in &nodes {
            doc.lock_id(n.node, true);
        }
        let outcome = assign(&mut doc, nodes, &config);
        assert_eq!(outcome.assigned.len(), 4);
        assert!(outcome.failures.is_empty());
    }

    #[test]
    fn rejected_write_drops_only_that_node() {
        let (mut doc, nodes, config) = setup(PAGE);
        let locked = nodes[1].node;
        doc.lock_id(locked, true);
        let outcome = assign(&mut doc, nodes, &config);
        assert_eq!(outcome.assigned.len(), 3);
        assert_eq!(
            outcome.failures,
            vec![AssignFailure::WriteRejected {
                node: locked,
                id: "pp-toc-item-1".into(),
                attempts: 3,
            }]
        );
        let ids: Vec<_> = outcome.assigned.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["pp-toc-item-0", "pp-toc-item-2", "pp-toc-item-3"]);
    }

    #[test]
    fn foreign_holder_of_an_id_is_a_collision() {
        let (mut doc, nodes, config) = setup(PAGE);
        // A node outside the TOC that the host will not let us rename.
        let body = doc.body().unwrap();
        let squatter = doc.create_element("span");
        doc.append_child(body, squatter);
        doc.set_attr(squatter, "id", "pp-toc-item-0");
        doc.lock_id(squatter, true);

        release_stale_ids(&mut doc, &nodes, &config);
        let outcome = assign(&mut doc, nodes, &config);
        assert!(matches!(
            outcome.failures.as_slice(),
            [AssignFailure::Collision { id, holders: 2, .. }] if id == "pp-toc-item-0"
        ));
        assert_eq!(outcome.assigned.len(), 3);
    }

    #[test]
    fn stale_ids_are_released() {
        let (mut doc, nodes, config) = setup(PAGE);
        let body = doc.body().unwrap();
        let old = doc.create_element("p");
        doc.append_child(body, old);
        doc.set_attr(old, "id", "pp-toc-item-2");

        release_stale_ids(&mut doc, &nodes, &config);
        assert_eq!(doc.attr(old, "id"), None);
        // Non-scheme ids are untouched.
        assert!(doc.get_element_by_id("q-a").is_some());
    }

    #[test]
    fn retry_bounded_counts_attempts() {
        let mut calls = 0;
        let res: Result<(), _> = retry_bounded(3, |_| {
            calls += 1;
            Err("nope")
        });
        assert_eq!(calls, 3);
        assert_eq!(
            res,
            Err(RetryExhausted {
                attempts: 3,
                last_error: "nope"
            })
        );

        let ok = retry_bounded(3, |attempt| if attempt == 2 { Ok(attempt) } else { Err(()) });
        assert_eq!(ok, Ok(2));
    }
}
