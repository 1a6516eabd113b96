// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Incremental reconciliation of a freshly produced VDOM against the prior
//! mounted tree.  Walks both trees in document order emitting minimal
//! `set_text` calls, and tracks the row/column drift every edit introduces
//! so later nodes' positions can be remapped without re-scanning the buffer.

use std::sync::Arc;

use async_recursion::async_recursion;
use tracing::warn;

use sidecar_editor::{BufferId, Editor, ExtmarkOptions, Pos};

use crate::mount::{
    allocate_extmarks, assign_positions, free_extmarks, MountedContent, MountedNode, MountedView,
};
use crate::node::{Bindings, Content, Node};

/// Drift accumulated by the edits applied so far in one reconciliation
/// pass.  `last_edit_row` is the terminal row of the most recent edit, in
/// the *new* coordinate space; `delta_col` is only meaningful for positions
/// on that row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AccumulatedEdit {
    pub delta_row: i64,
    pub delta_col: i64,
    pub last_edit_row: i64,
}

/// Remap a position recorded before the accumulated edits into the updated
/// buffer.  Positions past the last edited row shift by whole rows only;
/// positions on the last edited row also shift by the column delta.
pub fn remap_pos(acc: &AccumulatedEdit, p: Pos) -> Pos {
    let old_edit_row = acc.last_edit_row - acc.delta_row;
    let row = i64::from(p.row);
    if row == old_edit_row {
        Pos::new(
            (row + acc.delta_row) as u32,
            (i64::from(p.col) + acc.delta_col) as u32,
        )
    } else if row > old_edit_row {
        Pos::new((row + acc.delta_row) as u32, p.col)
    } else {
        p
    }
}

pub fn remap_range(acc: &AccumulatedEdit, start: Pos, end: Pos) -> (Pos, Pos) {
    (remap_pos(acc, start), remap_pos(acc, end))
}

/// Fold one applied edit into the accumulator.  `old` is the replaced range
/// in the pre-pass coordinates, `remapped_old` the same range remapped into
/// the current buffer, `new` the range of the replacement text.
pub fn apply_edit(
    acc: &mut AccumulatedEdit,
    old: (Pos, Pos),
    remapped_old: (Pos, Pos),
    new: (Pos, Pos),
) {
    acc.delta_row += i64::from(new.1.row) - i64::from(remapped_old.1.row);

    let old_single_line = old.0.row == old.1.row;
    let new_single_line = new.0.row == new.1.row;
    if old_single_line && new_single_line {
        acc.delta_col += i64::from(new.1.col) - i64::from(remapped_old.1.col);
    }
    if new.1.row != old.1.row {
        // The edit moved the terminal row; the column delta is now absolute
        // for that row.
        acc.delta_col = i64::from(new.1.col) - i64::from(old.1.col);
    }
    acc.last_edit_row = i64::from(new.1.row);
}

/// Reconcile `next` against the mounted view in place.
pub async fn update(
    editor: &Arc<dyn Editor>,
    view: &mut MountedView,
    next: Node,
) -> anyhow::Result<()> {
    let mut acc = AccumulatedEdit::default();
    reconcile_node(editor, view.buffer, &mut view.root, next, &mut acc).await
}

#[async_recursion]
async fn reconcile_node(
    editor: &Arc<dyn Editor>,
    buffer: BufferId,
    cur: &mut MountedNode,
    next: Node,
    acc: &mut AccumulatedEdit,
) -> anyhow::Result<()> {
    let Node {
        content: next_content,
        bindings: next_bindings,
        extmark: next_extmark,
    } = next;

    match next_content {
        Content::Text(nt) => {
            if matches!(&cur.content, MountedContent::Text(ct) if *ct == nt) {
                let (s, e) = remap_range(acc, cur.start, cur.end);
                cur.start = s;
                cur.end = e;
                sync_annotations(editor, buffer, cur, next_bindings, next_extmark).await
            } else {
                replace(
                    editor,
                    buffer,
                    cur,
                    Node {
                        content: Content::Text(nt),
                        bindings: next_bindings,
                        extmark: next_extmark,
                    },
                    acc,
                )
                .await
            }
        }
        Content::Template {
            key: nk,
            children: nc,
        } => {
            let same_key =
                matches!(&cur.content, MountedContent::Template { key, .. } if *key == nk);
            let compatible = matches!(
                &cur.content,
                MountedContent::Template { key, children } if *key == nk && children.len() == nc.len()
            );
            if !compatible {
                if same_key {
                    // Identical template key with a different child count
                    // should not happen; recover by replacing the subtree.
                    warn!(template = nk, "template child count mismatch for identical key");
                }
                return replace(
                    editor,
                    buffer,
                    cur,
                    Node {
                        content: Content::Template {
                            key: nk,
                            children: nc,
                        },
                        bindings: next_bindings,
                        extmark: next_extmark,
                    },
                    acc,
                )
                .await;
            }

            for (child, next_child) in cur.children_mut().iter_mut().zip(nc) {
                reconcile_node(editor, buffer, child, next_child, acc).await?;
            }
            refresh_parent_range(cur, acc);
            sync_annotations(editor, buffer, cur, next_bindings, next_extmark).await
        }
        Content::Array(nc) => {
            if !matches!(&cur.content, MountedContent::Array(_)) {
                return replace(
                    editor,
                    buffer,
                    cur,
                    Node {
                        content: Content::Array(nc),
                        bindings: next_bindings,
                        extmark: next_extmark,
                    },
                    acc,
                )
                .await;
            }
            reconcile_array(editor, buffer, cur, nc, acc).await?;
            sync_annotations(editor, buffer, cur, next_bindings, next_extmark).await
        }
    }
}

/// Pairwise reconcile up to the common length; delete excess mounted
/// children; insert excess new children at the end of the array's range.
async fn reconcile_array(
    editor: &Arc<dyn Editor>,
    buffer: BufferId,
    cur: &mut MountedNode,
    nc: Vec<Node>,
    acc: &mut AccumulatedEdit,
) -> anyhow::Result<()> {
    let old_start = cur.start;
    let old_end = cur.end;
    let n_next = nc.len();

    let mut empty_point: Option<Pos> = None;
    {
        let MountedContent::Array(cc) = &mut cur.content else {
            unreachable!("caller checked array shape");
        };
        let n_cur = cc.len();
        let common = n_cur.min(n_next);

        let mut next_iter = nc.into_iter();
        for child in cc.iter_mut().take(common) {
            let next_child = next_iter.next().expect("common bound");
            reconcile_node(editor, buffer, child, next_child, acc).await?;
        }

        if n_cur > n_next {
            let del_old = (cc[common].start, cc[n_cur - 1].end);
            let remapped = remap_range(acc, del_old.0, del_old.1);
            editor
                .set_text(buffer, remapped.0, remapped.1, &[String::new()])
                .await?;
            for child in &cc[common..] {
                free_extmarks(editor, buffer, child).await?;
            }
            apply_edit(acc, del_old, remapped, (remapped.0, remapped.0));
            cc.truncate(common);
            if common == 0 {
                empty_point = Some(remapped.0);
            }
        } else if n_next > n_cur {
            let insert_old = old_end;
            let insert_at = remap_pos(acc, insert_old);
            let rest: Vec<Node> = next_iter.collect();
            let text: String = rest.iter().map(Node::render_text).collect();
            let lines: Vec<String> = text.split('\n').map(str::to_string).collect();
            editor.set_text(buffer, insert_at, insert_at, &lines).await?;
            let mut cursor = insert_at;
            for n in rest {
                let mut mounted = assign_positions(n, &mut cursor);
                allocate_extmarks(editor, buffer, &mut mounted).await?;
                cc.push(mounted);
            }
            apply_edit(
                acc,
                (insert_old, insert_old),
                (insert_at, insert_at),
                (insert_at, cursor),
            );
        }
    }

    let children = cur.children();
    let range = match (children.first(), children.last()) {
        (Some(first), Some(last)) => Some((first.start, last.end)),
        _ => None,
    };
    match range {
        Some((start, end)) => {
            cur.start = start;
            cur.end = end;
        }
        None => {
            let point = empty_point.unwrap_or_else(|| remap_pos(acc, old_start));
            cur.start = point;
            cur.end = point;
        }
    }
    Ok(())
}

/// Replace the mounted subtree wholesale: write the new text over the
/// remapped old range, re-scan positions, move the drift accumulator.
async fn replace(
    editor: &Arc<dyn Editor>,
    buffer: BufferId,
    cur: &mut MountedNode,
    next: Node,
    acc: &mut AccumulatedEdit,
) -> anyhow::Result<()> {
    let old = (cur.start, cur.end);
    let remapped = remap_range(acc, old.0, old.1);

    let text = next.render_text();
    let lines: Vec<String> = text.split('\n').map(str::to_string).collect();
    editor.set_text(buffer, remapped.0, remapped.1, &lines).await?;
    free_extmarks(editor, buffer, cur).await?;

    let mut cursor = remapped.0;
    let mut mounted = assign_positions(next, &mut cursor);
    allocate_extmarks(editor, buffer, &mut mounted).await?;

    apply_edit(acc, old, remapped, (mounted.start, mounted.end));
    *cur = mounted;
    Ok(())
}

/// A parent's range is the union of its children's ranges; with no children
/// it collapses to its own remapped zero-width point.
fn refresh_parent_range(cur: &mut MountedNode, acc: &AccumulatedEdit) {
    let children = cur.children();
    let range = match (children.first(), children.last()) {
        (Some(first), Some(last)) => Some((first.start, last.end)),
        _ => None,
    };
    match range {
        Some((start, end)) => {
            cur.start = start;
            cur.end = end;
        }
        None => {
            let (s, e) = remap_range(acc, cur.start, cur.end);
            cur.start = s;
            cur.end = e;
        }
    }
}

/// Carry bindings over and adjust the extmark to the node's new options and
/// range.  An empty node never keeps an extmark.
async fn sync_annotations(
    editor: &Arc<dyn Editor>,
    buffer: BufferId,
    cur: &mut MountedNode,
    next_bindings: Option<Bindings>,
    next_extmark: Option<ExtmarkOptions>,
) -> anyhow::Result<()> {
    cur.bindings = next_bindings;

    if cur.start == cur.end {
        if let Some(id) = cur.extmark_id.take() {
            editor.delete_extmark(buffer, id).await?;
        }
        cur.extmark_opts = next_extmark;
        return Ok(());
    }

    if cur.extmark_opts != next_extmark {
        match (&next_extmark, cur.extmark_id) {
            (None, Some(id)) => {
                editor.delete_extmark(buffer, id).await?;
                cur.extmark_id = None;
            }
            (Some(opts), Some(id)) => {
                editor
                    .update_extmark(buffer, id, cur.start, cur.end, opts)
                    .await?;
            }
            (Some(opts), None) => {
                cur.extmark_id = Some(
                    editor
                        .create_extmark(buffer, cur.start, cur.end, opts)
                        .await?,
                );
            }
            (None, None) => {}
        }
        cur.extmark_opts = next_extmark;
    } else if cur.extmark_opts.is_some() && cur.extmark_id.is_none() {
        // The node was previously empty and has grown a range.
        let opts = cur.extmark_opts.clone().expect("checked above");
        cur.extmark_id = Some(
            editor
                .create_extmark(buffer, cur.start, cur.end, &opts)
                .await?,
        );
    }
    Ok(())
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
