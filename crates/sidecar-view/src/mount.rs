// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::sync::Arc;

use async_recursion::async_recursion;

use sidecar_editor::{BufferId, Editor, ExtmarkId, ExtmarkOptions, Pos};

use crate::node::{Bindings, Content, Node, TemplateKey};

/// The reconciled tree for a live buffer range.  Invariants: siblings'
/// ranges are contiguous and non-overlapping; a parent's range is the union
/// of its children's, or a zero-width point when empty; a node whose text is
/// empty never owns an extmark.
#[derive(Debug)]
pub struct MountedNode {
    pub content: MountedContent,
    pub bindings: Option<Bindings>,
    pub extmark_opts: Option<ExtmarkOptions>,
    pub start: Pos,
    pub end: Pos,
    pub extmark_id: Option<ExtmarkId>,
}

#[derive(Debug)]
pub enum MountedContent {
    Text(String),
    Template {
        key: TemplateKey,
        children: Vec<MountedNode>,
    },
    Array(Vec<MountedNode>),
}

impl MountedNode {
    pub fn children(&self) -> &[MountedNode] {
        match &self.content {
            MountedContent::Text(_) => &[],
            MountedContent::Template { children, .. } | MountedContent::Array(children) => {
                children
            }
        }
    }

    pub(crate) fn children_mut(&mut self) -> &mut [MountedNode] {
        match &mut self.content {
            MountedContent::Text(_) => &mut [],
            MountedContent::Template { children, .. } | MountedContent::Array(children) => {
                children
            }
        }
    }

    /// Concatenated text of the subtree, reconstructed from the tree alone.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        self.write_text(&mut out);
        out
    }

    fn write_text(&self, out: &mut String) {
        match &self.content {
            MountedContent::Text(t) => out.push_str(t),
            MountedContent::Template { children, .. } | MountedContent::Array(children) => {
                for c in children {
                    c.write_text(out);
                }
            }
        }
    }

    /// Extmark ids owned by this subtree.
    pub fn collect_extmark_ids(&self, out: &mut Vec<ExtmarkId>) {
        if let Some(id) = self.extmark_id {
            out.push(id);
        }
        for c in self.children() {
            c.collect_extmark_ids(out);
        }
    }
}

/// Walk `node` in document order, assigning each node the range the cursor
/// sweeps over its text.
pub(crate) fn assign_positions(node: Node, cursor: &mut Pos) -> MountedNode {
    let start = *cursor;
    let content = match node.content {
        Content::Text(t) => {
            *cursor = cursor.advance_str(&t);
            MountedContent::Text(t)
        }
        Content::Template { key, children } => MountedContent::Template {
            key,
            children: children
                .into_iter()
                .map(|c| assign_positions(c, cursor))
                .collect(),
        },
        Content::Array(children) => MountedContent::Array(
            children
                .into_iter()
                .map(|c| assign_positions(c, cursor))
                .collect(),
        ),
    };
    MountedNode {
        content,
        bindings: node.bindings,
        extmark_opts: node.extmark,
        start,
        end: *cursor,
        extmark_id: None,
    }
}

/// Allocate extmarks for every node that requests one and covers a
/// non-empty range.  Zero-width nodes never own an extmark.
#[async_recursion]
pub(crate) async fn allocate_extmarks(
    editor: &Arc<dyn Editor>,
    buffer: BufferId,
    node: &mut MountedNode,
) -> anyhow::Result<()> {
    if let Some(opts) = &node.extmark_opts {
        if node.start != node.end {
            let id = editor
                .create_extmark(buffer, node.start, node.end, opts)
                .await?;
            node.extmark_id = Some(id);
        }
    }
    match &mut node.content {
        MountedContent::Text(_) => {}
        MountedContent::Template { children, .. } | MountedContent::Array(children) => {
            for c in children {
                allocate_extmarks(editor, buffer, c).await?;
            }
        }
    }
    Ok(())
}

pub(crate) async fn free_extmarks(
    editor: &Arc<dyn Editor>,
    buffer: BufferId,
    node: &MountedNode,
) -> anyhow::Result<()> {
    let mut ids = Vec::new();
    node.collect_extmark_ids(&mut ids);
    for id in ids {
        editor.delete_extmark(buffer, id).await?;
    }
    Ok(())
}

/// A view mounted into a buffer range.
#[derive(Debug)]
pub struct MountedView {
    pub buffer: BufferId,
    pub root: MountedNode,
}

/// Render `node` into `[start, end)` of `buffer` and return the mounted
/// tree: write the concatenated text, assign positions by document-order
/// scan, allocate extmarks.
pub async fn mount(
    editor: &Arc<dyn Editor>,
    buffer: BufferId,
    start: Pos,
    end: Pos,
    node: Node,
) -> anyhow::Result<MountedView> {
    let text = node.render_text();
    let lines: Vec<String> = text.split('\n').map(str::to_string).collect();
    editor.set_text(buffer, start, end, &lines).await?;

    let mut cursor = start;
    let mut root = assign_positions(node, &mut cursor);
    allocate_extmarks(editor, buffer, &mut root).await?;

    Ok(MountedView { buffer, root })
}

/// Remove a mounted view: free its extmarks and clear its text range.
pub async fn unmount(editor: &Arc<dyn Editor>, view: MountedView) -> anyhow::Result<()> {
    free_extmarks(editor, view.buffer, &view.root).await?;
    editor
        .set_text(view.buffer, view.root.start, view.root.end, &[String::new()])
        .await
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
