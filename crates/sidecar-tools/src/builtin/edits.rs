// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! File edit tools: `insert`, `replace`, and the batched `edl`.
//!
//! Replace semantics: `find` must occur in the file and only the first
//! occurrence changes; an empty `find` replaces the whole file.  Insert
//! semantics: `content` lands after the first occurrence of `insertAfter`;
//! an empty anchor appends at end of file.  When the target file is loaded
//! in a modified buffer the edit is applied on top of the buffer content
//! and written back through the editor, so outside changes are never
//! clobbered silently.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use sidecar_provider::{ResultContent, ToolResultBlock};
use sidecar_view::{Action, Node};

use crate::executor::{
    aborted_result, glyph, parse_input, progress_result, ToolCtx, ToolEffectMsg, ToolExecutor,
    ToolMsg, ToolRequest,
};
use crate::name::ToolName;
use crate::util::{line_delta, unified_diff};

/// One concrete edit against one file.
#[derive(Debug, Clone)]
pub enum EditSpec {
    Replace { find: String, replace: String },
    Insert { insert_after: String, content: String },
}

impl EditSpec {
    /// Lines removed/added, computed from the edit description itself (the
    /// whole-file replace counts as removing nothing until applied).
    pub fn delta(&self) -> (usize, usize) {
        match self {
            EditSpec::Replace { find, replace } => line_delta(find, replace),
            EditSpec::Insert { content, .. } => line_delta("", content),
        }
    }
}

/// Apply one edit to `content`.  Pure; all failure modes are input errors.
pub fn apply_edit_spec(content: &str, spec: &EditSpec) -> Result<String, String> {
    match spec {
        EditSpec::Replace { find, replace } => {
            if find.is_empty() {
                return Ok(replace.clone());
            }
            match content.find(find.as_str()) {
                Some(at) => {
                    let mut out = String::with_capacity(content.len());
                    out.push_str(&content[..at]);
                    out.push_str(replace);
                    out.push_str(&content[at + find.len()..]);
                    Ok(out)
                }
                None => Err("`find` does not occur in the file".to_string()),
            }
        }
        EditSpec::Insert {
            insert_after,
            content: insertion,
        } => {
            if insert_after.is_empty() {
                let mut out = content.to_string();
                out.push_str(insertion);
                return Ok(out);
            }
            match content.find(insert_after.as_str()) {
                Some(at) => {
                    let end = at + insert_after.len();
                    let mut out = String::with_capacity(content.len() + insertion.len());
                    out.push_str(&content[..end]);
                    out.push_str(insertion);
                    out.push_str(&content[end..]);
                    Ok(out)
                }
                None => Err("`insertAfter` does not occur in the file".to_string()),
            }
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InsertInput {
    file_path: String,
    insert_after: String,
    content: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReplaceInput {
    file_path: String,
    find: String,
    replace: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EdlInput {
    edits: Vec<EdlEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EdlEntry {
    file_path: String,
    find: Option<String>,
    replace: Option<String>,
    insert_after: Option<String>,
    content: Option<String>,
}

enum State {
    PendingUserAction,
    Processing,
    Done(ToolResultBlock),
}

/// Executor shared by `insert`, `replace`, and `edl`.
pub struct FileEditTool {
    request: ToolRequest,
    edits: Vec<(PathBuf, EditSpec)>,
    label: String,
    removed: usize,
    added: usize,
    state: State,
    cx: ToolCtx,
}

impl FileEditTool {
    pub fn new(request: ToolRequest, cx: &ToolCtx) -> Self {
        let parsed = Self::parse_edits(&request, cx);
        let edits = match parsed {
            Ok(e) => e,
            Err(result) => {
                return Self {
                    request,
                    edits: Vec::new(),
                    label: String::new(),
                    removed: 0,
                    added: 0,
                    state: State::Done(result),
                    cx: cx.clone(),
                }
            }
        };
        let label = if edits.len() == 1 {
            cx.rel_path(&edits[0].0).display().to_string()
        } else {
            format!("{} files", edits.len())
        };
        let (removed, added) = edits
            .iter()
            .fold((0, 0), |(r, a), (_, spec)| {
                let (dr, da) = spec.delta();
                (r + dr, a + da)
            });

        let mut tool = Self {
            request,
            edits,
            label,
            removed,
            added,
            state: State::PendingUserAction,
            cx: cx.clone(),
        };
        let auto = tool
            .edits
            .iter()
            .all(|(p, _)| cx.env.file_policy.can_write_auto(p));
        if auto {
            tool.start();
        }
        tool
    }

    fn parse_edits(
        request: &ToolRequest,
        cx: &ToolCtx,
    ) -> Result<Vec<(PathBuf, EditSpec)>, ToolResultBlock> {
        match &request.name {
            ToolName::Insert => {
                let i: InsertInput = parse_input(request)?;
                Ok(vec![(
                    cx.resolve_path(Path::new(&i.file_path)),
                    EditSpec::Insert {
                        insert_after: i.insert_after,
                        content: i.content,
                    },
                )])
            }
            ToolName::Replace => {
                let i: ReplaceInput = parse_input(request)?;
                Ok(vec![(
                    cx.resolve_path(Path::new(&i.file_path)),
                    EditSpec::Replace {
                        find: i.find,
                        replace: i.replace,
                    },
                )])
            }
            ToolName::Edl => {
                let i: EdlInput = parse_input(request)?;
                if i.edits.is_empty() {
                    return Err(ToolResultBlock::err(
                        request.id.clone(),
                        "edl requires at least one edit",
                    ));
                }
                i.edits
                    .into_iter()
                    .map(|e| {
                        let path = cx.resolve_path(Path::new(&e.file_path));
                        let spec = match (e.find, e.replace, e.insert_after, e.content) {
                            (Some(find), Some(replace), None, None) => {
                                EditSpec::Replace { find, replace }
                            }
                            (None, None, Some(insert_after), Some(content)) => {
                                EditSpec::Insert {
                                    insert_after,
                                    content,
                                }
                            }
                            _ => {
                                return Err(ToolResultBlock::err(
                                    request.id.clone(),
                                    format!(
                                        "edit for {} must be either find/replace or \
                                         insertAfter/content",
                                        e.file_path
                                    ),
                                ))
                            }
                        };
                        Ok((path, spec))
                    })
                    .collect()
            }
            other => Err(ToolResultBlock::err(
                request.id.clone(),
                format!("not an edit tool: {other}"),
            )),
        }
    }

    fn start(&mut self) {
        self.state = State::Processing;
        let edits = self.edits.clone();
        let id = self.request.id.clone();
        let cx = self.cx.clone();
        tokio::spawn(async move {
            let outcome = apply_file_edits(&cx, &id, edits).await;
            cx.send_self(&id, ToolMsg::Finished(outcome));
        });
    }

    fn counts(&self) -> String {
        if matches!(self.request.name, ToolName::Insert) {
            format!("[[ +{} ]]", self.added)
        } else {
            format!("[[ -{} / +{} ]]", self.removed, self.added)
        }
    }

    fn tool_label(&self) -> &'static str {
        match self.request.name {
            ToolName::Insert => "Insert",
            ToolName::Replace => "Replace",
            _ => "Edit",
        }
    }

    fn approval_bindings(&self, node: Node) -> Node {
        let approve = |approved: bool| {
            let cx = self.cx.clone();
            let tid = cx.thread_id;
            let rid = self.request.id.clone();
            Action::new(move || {
                cx.env.dispatch.send(ToolEffectMsg::Tool {
                    thread_id: tid,
                    request_id: rid.clone(),
                    msg: ToolMsg::UserApproval {
                        approved,
                        remember: false,
                    },
                });
            })
        };
        node.with_binding("n", approve(false))
            .with_binding("y", approve(true))
    }
}

/// Apply each edit to its file, preferring a loaded modified buffer's
/// content over the on-disk bytes, and record a diff artifact per file.
async fn apply_file_edits(
    cx: &ToolCtx,
    request_id: &sidecar_provider::ToolRequestId,
    edits: Vec<(PathBuf, EditSpec)>,
) -> Result<Vec<ResultContent>, String> {
    let mut applied = 0usize;
    for (path, spec) in &edits {
        let editor = &cx.env.editor;
        let buffer = editor
            .buffer_for_path(path)
            .await
            .map_err(|e| e.to_string())?;
        let buffer = match buffer {
            Some(b) => {
                if editor.buffer_is_modified(b).await.map_err(|e| e.to_string())? {
                    Some(b)
                } else {
                    None
                }
            }
            None => None,
        };

        let old = match buffer {
            Some(b) => editor
                .get_lines(b, 0, -1)
                .await
                .map_err(|e| e.to_string())?
                .join("\n"),
            None => match tokio::fs::read_to_string(path).await {
                Ok(c) => c,
                // A missing target is only valid for whole-file creation.
                Err(_) if creates_file(spec) => String::new(),
                Err(e) => return Err(format!("cannot read {}: {e}", path.display())),
            },
        };

        let new = apply_edit_spec(&old, spec)
            .map_err(|e| format!("{} in {}", e, path.display()))?;

        match buffer {
            Some(b) => {
                let lines: Vec<String> = new.split('\n').map(str::to_string).collect();
                let old_lines = editor
                    .get_lines(b, 0, -1)
                    .await
                    .map_err(|e| e.to_string())?;
                let end = sidecar_editor::Pos::new(
                    (old_lines.len() - 1) as u32,
                    old_lines.last().map(|l| l.len() as u32).unwrap_or(0),
                );
                editor
                    .set_text(b, sidecar_editor::Pos::origin(), end, &lines)
                    .await
                    .map_err(|e| e.to_string())?;
                debug!(path = %path.display(), "edit applied on top of modified buffer");
            }
            None => {
                if let Some(parent) = path.parent() {
                    tokio::fs::create_dir_all(parent)
                        .await
                        .map_err(|e| e.to_string())?;
                }
                tokio::fs::write(path, &new)
                    .await
                    .map_err(|e| format!("cannot write {}: {e}", path.display()))?;
            }
        }

        let artifact_dir = cx.artifacts_dir(request_id);
        if tokio::fs::create_dir_all(&artifact_dir).await.is_ok() {
            let diff = unified_diff(&old, &new, &cx.rel_path(path));
            let name = format!("edit-{applied}.diff");
            let _ = tokio::fs::write(artifact_dir.join(name), diff).await;
        }
        applied += 1;
    }
    Ok(vec![ResultContent::Text {
        text: format!("Applied {applied} edit(s)."),
    }])
}

fn creates_file(spec: &EditSpec) -> bool {
    matches!(
        spec,
        EditSpec::Replace { find, .. } if find.is_empty()
    ) || matches!(
        spec,
        EditSpec::Insert { insert_after, .. } if insert_after.is_empty()
    )
}

impl ToolExecutor for FileEditTool {
    fn request(&self) -> &ToolRequest {
        &self.request
    }

    fn is_done(&self) -> bool {
        matches!(self.state, State::Done(_))
    }

    fn is_pending_user_action(&self) -> bool {
        matches!(self.state, State::PendingUserAction)
    }

    fn update(&mut self, msg: ToolMsg, _cx: &ToolCtx) {
        match (&self.state, msg) {
            (State::PendingUserAction, ToolMsg::UserApproval { approved, .. }) => {
                if approved {
                    self.start();
                } else {
                    self.state = State::Done(ToolResultBlock::err(
                        self.request.id.clone(),
                        "The user did not allow this edit.",
                    ));
                }
            }
            (State::Processing, ToolMsg::Finished(outcome)) => {
                self.state = State::Done(match outcome {
                    Ok(content) => {
                        ToolResultBlock::with_content(self.request.id.clone(), content)
                    }
                    Err(e) => ToolResultBlock::err(self.request.id.clone(), e),
                });
            }
            _ => {}
        }
    }

    fn abort(&mut self) -> ToolResultBlock {
        if let State::Done(r) = &self.state {
            return r.clone();
        }
        let r = aborted_result(&self.request.id);
        self.state = State::Done(r.clone());
        r
    }

    fn tool_result(&self) -> ToolResultBlock {
        match &self.state {
            State::Done(r) => r.clone(),
            State::PendingUserAction => {
                progress_result(&self.request.id, "Awaiting edit approval.")
            }
            State::Processing => progress_result(&self.request.id, "Applying edit."),
        }
    }

    fn render_summary(&self) -> Node {
        let counts = self.counts();
        let label = &self.label;
        let name = self.tool_label();
        match &self.state {
            State::PendingUserAction => self.approval_bindings(Node::text(format!(
                "✏️{} May I edit `{label}`? {counts} [ NO ] [ YES ]",
                glyph::AWAITING_APPROVAL
            ))),
            State::Processing => {
                Node::text(format!("✏️{} {name} {counts} in `{label}`", glyph::PROCESSING))
            }
            State::Done(r) if r.is_error => {
                Node::text(format!("✏️{} {name} {counts} in `{label}`", glyph::ERROR))
            }
            State::Done(_) => {
                Node::text(format!("✏️{} {name} {counts} in `{label}`", glyph::SUCCESS))
            }
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{harness, request_for, ToolHarness};

    // ── Edit semantics ────────────────────────────────────────────────────────

    #[test]
    fn replace_changes_first_occurrence_only() {
        let spec = EditSpec::Replace {
            find: "aa".into(),
            replace: "XX".into(),
        };
        assert_eq!(apply_edit_spec("aa bb aa", &spec).unwrap(), "XX bb aa");
    }

    #[test]
    fn replace_missing_find_is_error() {
        let spec = EditSpec::Replace {
            find: "zz".into(),
            replace: "XX".into(),
        };
        assert!(apply_edit_spec("aa", &spec).is_err());
    }

    #[test]
    fn empty_find_replaces_whole_file() {
        let spec = EditSpec::Replace {
            find: String::new(),
            replace: "fresh".into(),
        };
        assert_eq!(apply_edit_spec("old content", &spec).unwrap(), "fresh");
    }

    #[test]
    fn insert_after_anchor() {
        let spec = EditSpec::Insert {
            insert_after: "fn main() {".into(),
            content: "\n    init();".into(),
        };
        assert_eq!(
            apply_edit_spec("fn main() {\n}", &spec).unwrap(),
            "fn main() {\n    init();\n}"
        );
    }

    #[test]
    fn empty_anchor_appends_at_end() {
        let spec = EditSpec::Insert {
            insert_after: String::new(),
            content: "\ntail".into(),
        };
        assert_eq!(apply_edit_spec("head", &spec).unwrap(), "head\ntail");
    }

    // ── Executor ──────────────────────────────────────────────────────────────

    async fn drive(tool: &mut FileEditTool, h: &ToolHarness) {
        for _ in 0..200 {
            let ready = h
                .sent
                .lock()
                .unwrap()
                .iter()
                .any(|m| matches!(m, ToolEffectMsg::Tool { .. }));
            if ready {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        for m in std::mem::take(&mut *h.sent.lock().unwrap()) {
            if let ToolEffectMsg::Tool { msg, .. } = m {
                tool.update(msg, &h.cx);
            }
        }
    }

    #[tokio::test]
    async fn insert_into_new_file_creates_it() {
        let dir = tempfile::tempdir().unwrap();
        let h = harness(dir.path());
        let mut tool = FileEditTool::new(
            request_for(
                ToolName::Insert,
                serde_json::json!({
                    "filePath": "test_note.txt",
                    "insertAfter": "",
                    "content": "This is a test note\nWith multiple lines"
                }),
            ),
            &h.cx,
        );
        drive(&mut tool, &h).await;
        assert!(!tool.tool_result().is_error, "{}", tool.tool_result().text());
        let written = std::fs::read_to_string(dir.path().join("test_note.txt")).unwrap();
        assert_eq!(written, "This is a test note\nWith multiple lines");
        // A per-request diff artifact exists.
        let artifacts = h.cx.artifacts_dir(&tool.request().id);
        assert!(artifacts.join("edit-0.diff").exists());
    }

    #[tokio::test]
    async fn replace_updates_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "one two three").unwrap();
        let h = harness(dir.path());
        let mut tool = FileEditTool::new(
            request_for(
                ToolName::Replace,
                serde_json::json!({"filePath": "a.txt", "find": "two", "replace": "2"}),
            ),
            &h.cx,
        );
        drive(&mut tool, &h).await;
        assert_eq!(
            std::fs::read_to_string(dir.path().join("a.txt")).unwrap(),
            "one 2 three"
        );
    }

    #[tokio::test]
    async fn replace_missing_find_reports_error_and_leaves_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "content").unwrap();
        let h = harness(dir.path());
        let mut tool = FileEditTool::new(
            request_for(
                ToolName::Replace,
                serde_json::json!({"filePath": "a.txt", "find": "absent", "replace": "x"}),
            ),
            &h.cx,
        );
        drive(&mut tool, &h).await;
        assert!(tool.tool_result().is_error);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("a.txt")).unwrap(),
            "content"
        );
    }

    #[tokio::test]
    async fn modified_buffer_takes_precedence_over_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("b.txt");
        std::fs::write(&path, "disk content").unwrap();
        let h = harness(dir.path());
        let buf = h.editor.open_file(path.clone(), "buffer content");
        h.editor.mark_modified(buf);
        let mut tool = FileEditTool::new(
            request_for(
                ToolName::Replace,
                serde_json::json!({"filePath": "b.txt", "find": "buffer", "replace": "BUFFER"}),
            ),
            &h.cx,
        );
        drive(&mut tool, &h).await;
        assert!(!tool.tool_result().is_error, "{}", tool.tool_result().text());
        assert_eq!(h.editor.text(buf), "BUFFER content");
        // Disk is left to the user's save; outside changes are not clobbered.
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "disk content");
    }

    #[tokio::test]
    async fn edl_applies_batched_edits() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("x.txt"), "alpha").unwrap();
        std::fs::write(dir.path().join("y.txt"), "beta").unwrap();
        let h = harness(dir.path());
        let mut tool = FileEditTool::new(
            request_for(
                ToolName::Edl,
                serde_json::json!({"edits": [
                    {"filePath": "x.txt", "find": "alpha", "replace": "ALPHA"},
                    {"filePath": "y.txt", "insertAfter": "", "content": "!"}
                ]}),
            ),
            &h.cx,
        );
        drive(&mut tool, &h).await;
        assert!(!tool.tool_result().is_error);
        assert_eq!(std::fs::read_to_string(dir.path().join("x.txt")).unwrap(), "ALPHA");
        assert_eq!(std::fs::read_to_string(dir.path().join("y.txt")).unwrap(), "beta!");
    }

    #[tokio::test]
    async fn edl_mixed_edit_shape_is_input_error() {
        let dir = tempfile::tempdir().unwrap();
        let h = harness(dir.path());
        let tool = FileEditTool::new(
            request_for(
                ToolName::Edl,
                serde_json::json!({"edits": [
                    {"filePath": "x.txt", "find": "a", "content": "b"}
                ]}),
            ),
            &h.cx,
        );
        assert!(tool.tool_result().is_error);
    }

    #[tokio::test]
    async fn gitignored_target_requires_approval() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(".gitignore"), "secret.txt\n").unwrap();
        std::fs::write(dir.path().join("secret.txt"), "v1").unwrap();
        let h = harness(dir.path());
        let mut tool = FileEditTool::new(
            request_for(
                ToolName::Replace,
                serde_json::json!({"filePath": "secret.txt", "find": "v1", "replace": "v2"}),
            ),
            &h.cx,
        );
        assert!(tool.is_pending_user_action());
        tool.update(
            ToolMsg::UserApproval {
                approved: false,
                remember: false,
            },
            &h.cx,
        );
        assert!(tool.tool_result().is_error);
        assert_eq!(std::fs::read_to_string(dir.path().join("secret.txt")).unwrap(), "v1");
    }

    #[tokio::test]
    async fn summary_shows_line_counts() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("c.txt"), "a\nb\nc\nd\ne\nf\ng").unwrap();
        let h = harness(dir.path());
        let mut tool = FileEditTool::new(
            request_for(
                ToolName::Replace,
                serde_json::json!({
                    "filePath": "c.txt",
                    "find": "a\nb\nc\nd\ne\nf\ng",
                    "replace": "1\n2\n3\n4\n5\n6"
                }),
            ),
            &h.cx,
        );
        drive(&mut tool, &h).await;
        let summary = tool.render_summary().render_text();
        assert!(summary.contains("[[ -7 / +6 ]]"), "{summary}");
        assert!(summary.contains("✏️"), "{summary}");
        assert!(summary.contains("c.txt"), "{summary}");
    }
}
