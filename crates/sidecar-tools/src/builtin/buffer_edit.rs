// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Buffer-targeted edits: `inline_edit` rewrites the buffer displaying a
//! file; `replace_selection` rewrites the user's visual selection.  Both
//! mutate the buffer in place through the editor and leave saving to the
//! user.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use sidecar_editor::Pos;
use sidecar_provider::{ResultContent, ToolResultBlock};
use sidecar_view::Node;

use crate::builtin::edits::{apply_edit_spec, EditSpec};
use crate::executor::{
    aborted_result, glyph, parse_input, progress_result, ToolCtx, ToolExecutor, ToolMsg,
    ToolRequest,
};
use crate::name::ToolName;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineEditInput {
    file_path: String,
    find: String,
    replace: String,
}

#[derive(Debug, Deserialize)]
struct ReplaceSelectionInput {
    replace: String,
}

enum State {
    Processing,
    Done(ToolResultBlock),
}

pub struct BufferEditTool {
    request: ToolRequest,
    label: String,
    state: State,
}

impl BufferEditTool {
    pub fn new(request: ToolRequest, cx: &ToolCtx) -> Self {
        match request.name.clone() {
            ToolName::InlineEdit => Self::new_inline(request, cx),
            ToolName::ReplaceSelection => Self::new_selection(request, cx),
            other => Self {
                label: String::new(),
                state: State::Done(ToolResultBlock::err(
                    request.id.clone(),
                    format!("not a buffer edit tool: {other}"),
                )),
                request,
            },
        }
    }

    fn new_inline(request: ToolRequest, cx: &ToolCtx) -> Self {
        let input = match parse_input::<InlineEditInput>(&request) {
            Ok(i) => i,
            Err(result) => {
                return Self {
                    request,
                    label: String::new(),
                    state: State::Done(result),
                }
            }
        };
        let label = input.file_path.clone();
        let path: PathBuf = cx.resolve_path(Path::new(&input.file_path));
        let id = request.id.clone();
        let cx2 = cx.clone();
        tokio::spawn(async move {
            let outcome = run_inline(&cx2, &path, &input).await;
            cx2.send_self(&id, ToolMsg::Finished(outcome));
        });
        Self {
            request,
            label,
            state: State::Processing,
        }
    }

    fn new_selection(request: ToolRequest, cx: &ToolCtx) -> Self {
        let input = match parse_input::<ReplaceSelectionInput>(&request) {
            Ok(i) => i,
            Err(result) => {
                return Self {
                    request,
                    label: String::new(),
                    state: State::Done(result),
                }
            }
        };
        let id = request.id.clone();
        let cx2 = cx.clone();
        tokio::spawn(async move {
            let outcome = run_selection(&cx2, &input.replace).await;
            cx2.send_self(&id, ToolMsg::Finished(outcome));
        });
        Self {
            request,
            label: "selection".to_string(),
            state: State::Processing,
        }
    }
}

async fn run_inline(
    cx: &ToolCtx,
    path: &Path,
    input: &InlineEditInput,
) -> Result<Vec<ResultContent>, String> {
    let editor = &cx.env.editor;
    let buffer = editor
        .buffer_for_path(path)
        .await
        .map_err(|e| e.to_string())?
        .ok_or_else(|| format!("{} is not loaded in any buffer", path.display()))?;

    let lines = editor.get_lines(buffer, 0, -1).await.map_err(|e| e.to_string())?;
    let old = lines.join("\n");
    let new = apply_edit_spec(
        &old,
        &EditSpec::Replace {
            find: input.find.clone(),
            replace: input.replace.clone(),
        },
    )?;
    let end = Pos::new(
        (lines.len() - 1) as u32,
        lines.last().map(|l| l.len() as u32).unwrap_or(0),
    );
    let new_lines: Vec<String> = new.split('\n').map(str::to_string).collect();
    editor
        .set_text(buffer, Pos::origin(), end, &new_lines)
        .await
        .map_err(|e| e.to_string())?;
    Ok(vec![ResultContent::Text {
        text: format!("Edited buffer for {}.", path.display()),
    }])
}

async fn run_selection(cx: &ToolCtx, replacement: &str) -> Result<Vec<ResultContent>, String> {
    let editor = &cx.env.editor;
    let (buffer, start, end) = editor
        .visual_selection()
        .await
        .map_err(|e| e.to_string())?
        .ok_or("no visual selection is active")?;
    let lines: Vec<String> = replacement.split('\n').map(str::to_string).collect();
    editor
        .set_text(buffer, start, end, &lines)
        .await
        .map_err(|e| e.to_string())?;
    Ok(vec![ResultContent::Text {
        text: "Replaced the selection.".to_string(),
    }])
}

impl ToolExecutor for BufferEditTool {
    fn request(&self) -> &ToolRequest {
        &self.request
    }

    fn is_done(&self) -> bool {
        matches!(self.state, State::Done(_))
    }

    fn is_pending_user_action(&self) -> bool {
        false
    }

    fn update(&mut self, msg: ToolMsg, _cx: &ToolCtx) {
        if matches!(self.state, State::Done(_)) {
            return;
        }
        if let ToolMsg::Finished(outcome) = msg {
            self.state = State::Done(match outcome {
                Ok(content) => ToolResultBlock::with_content(self.request.id.clone(), content),
                Err(e) => ToolResultBlock::err(self.request.id.clone(), e),
            });
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
            State::Processing => progress_result(&self.request.id, "Editing buffer."),
        }
    }

    fn render_summary(&self) -> Node {
        let g = match &self.state {
            State::Processing => glyph::PROCESSING,
            State::Done(r) if r.is_error => glyph::ERROR,
            State::Done(_) => glyph::SUCCESS,
        };
        Node::text(format!("✏️{g} Edit `{}`", self.label))
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::ToolEffectMsg;
    use crate::testing::{harness, request_for, ToolHarness};

    async fn drive(tool: &mut BufferEditTool, h: &ToolHarness) {
        for _ in 0..200 {
            if !h.sent.lock().unwrap().is_empty() {
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
    async fn inline_edit_rewrites_loaded_buffer() {
        let dir = tempfile::tempdir().unwrap();
        let h = harness(dir.path());
        let buf = h
            .editor
            .open_file(dir.path().join("view.tsx"), "let width = 10;\nlet height = 20;");
        let mut tool = BufferEditTool::new(
            request_for(
                ToolName::InlineEdit,
                serde_json::json!({
                    "filePath": "view.tsx",
                    "find": "width = 10",
                    "replace": "width = 42"
                }),
            ),
            &h.cx,
        );
        drive(&mut tool, &h).await;
        assert!(!tool.tool_result().is_error, "{}", tool.tool_result().text());
        assert_eq!(h.editor.text(buf), "let width = 42;\nlet height = 20;");
    }

    #[tokio::test]
    async fn inline_edit_without_loaded_buffer_errors() {
        let dir = tempfile::tempdir().unwrap();
        let h = harness(dir.path());
        let mut tool = BufferEditTool::new(
            request_for(
                ToolName::InlineEdit,
                serde_json::json!({"filePath": "ghost.rs", "find": "a", "replace": "b"}),
            ),
            &h.cx,
        );
        drive(&mut tool, &h).await;
        let r = tool.tool_result();
        assert!(r.is_error);
        assert!(r.text().contains("not loaded"));
    }

    #[tokio::test]
    async fn replace_selection_overwrites_range() {
        let dir = tempfile::tempdir().unwrap();
        let h = harness(dir.path());
        let buf = h.editor.open_file(dir.path().join("s.txt"), "keep REPLACE keep");
        h.editor.set_selection(buf, Pos::new(0, 5), Pos::new(0, 12));
        let mut tool = BufferEditTool::new(
            request_for(
                ToolName::ReplaceSelection,
                serde_json::json!({"replace": "NEW"}),
            ),
            &h.cx,
        );
        drive(&mut tool, &h).await;
        assert!(!tool.tool_result().is_error);
        assert_eq!(h.editor.text(buf), "keep NEW keep");
    }

    #[tokio::test]
    async fn replace_selection_without_selection_errors() {
        let dir = tempfile::tempdir().unwrap();
        let h = harness(dir.path());
        let mut tool = BufferEditTool::new(
            request_for(
                ToolName::ReplaceSelection,
                serde_json::json!({"replace": "NEW"}),
            ),
            &h.cx,
        );
        drive(&mut tool, &h).await;
        assert!(tool.tool_result().is_error);
    }
}
