// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use sidecar_editor::Pos;

use crate::mount::MountedNode;
use crate::node::{Action, Key};

/// Find the deepest node whose range contains `cursor` and whose bindings
/// define `key`.  Zero-width nodes contain nothing.
pub fn binding_at<'a>(node: &'a MountedNode, cursor: Pos, key: &Key) -> Option<&'a Action> {
    if !(node.start <= cursor && cursor < node.end) {
        return None;
    }
    for child in node.children() {
        if let Some(action) = binding_at(child, cursor, key) {
            return Some(action);
        }
    }
    node.bindings.as_ref().and_then(|b| b.get(key))
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::mount::mount;
    use crate::node::Node;
    use crate::template;
    use sidecar_editor::{BufferId, Editor, MockEditor};

    async fn mounted(node: Node) -> (Arc<MockEditor>, BufferId, crate::mount::MountedView) {
        let mock = Arc::new(MockEditor::new());
        let ed: Arc<dyn Editor> = mock.clone();
        let buf = mock.create_buffer("t").await.unwrap();
        let view = mount(&ed, buf, Pos::origin(), Pos::origin(), node)
            .await
            .unwrap();
        (mock, buf, view)
    }

    fn tracker() -> (Arc<AtomicU32>, Action) {
        let hits = Arc::new(AtomicU32::new(0));
        let h = hits.clone();
        (hits, Action::new(move || {
            h.fetch_add(1, Ordering::SeqCst);
        }))
    }

    #[tokio::test]
    async fn binding_fires_inside_range() {
        let (_, action) = tracker();
        let node = template![
            "before ",
            Node::text("[link]").with_binding("<CR>", action),
            " after",
        ];
        let (_, _, view) = mounted(node).await;
        // "[link]" occupies cols 7..13 on row 0.
        assert!(binding_at(&view.root, Pos::new(0, 7), &Key::from("<CR>")).is_some());
        assert!(binding_at(&view.root, Pos::new(0, 12), &Key::from("<CR>")).is_some());
        assert!(binding_at(&view.root, Pos::new(0, 13), &Key::from("<CR>")).is_none());
        assert!(binding_at(&view.root, Pos::new(0, 0), &Key::from("<CR>")).is_none());
    }

    #[tokio::test]
    async fn deeper_binding_shadows_outer() {
        let (outer_hits, outer) = tracker();
        let (inner_hits, inner) = tracker();
        let node = template![
            Node::text("inner").with_binding("x", inner),
            " rest",
        ]
        .with_binding("x", outer);
        let (_, _, view) = mounted(node).await;

        binding_at(&view.root, Pos::new(0, 2), &Key::from("x"))
            .unwrap()
            .invoke();
        assert_eq!(inner_hits.load(Ordering::SeqCst), 1);
        assert_eq!(outer_hits.load(Ordering::SeqCst), 0);

        // Outside the inner node the outer binding applies.
        binding_at(&view.root, Pos::new(0, 7), &Key::from("x"))
            .unwrap()
            .invoke();
        assert_eq!(outer_hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unbound_key_is_ignored() {
        let (_, action) = tracker();
        let node = template![Node::text("zone").with_binding("a", action)];
        let (_, _, view) = mounted(node).await;
        assert!(binding_at(&view.root, Pos::new(0, 1), &Key::from("b")).is_none());
    }

    #[tokio::test]
    async fn deeper_node_without_key_falls_back_to_ancestor() {
        let (hits, action) = tracker();
        let node = template![template!["nested text"]].with_binding("q", action);
        let (_, _, view) = mounted(node).await;
        binding_at(&view.root, Pos::new(0, 3), &Key::from("q"))
            .unwrap()
            .invoke();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
