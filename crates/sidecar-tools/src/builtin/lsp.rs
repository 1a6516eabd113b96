// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Language-server backed tools: `hover`, `find_references`, and
//! `diagnostics`.  All three are side-effect free and therefore skip the
//! approval edge entirely (`processing → done`).  The symbol position sent
//! to the bridge is derived by scanning the file for the first occurrence
//! of the symbol and taking its rightmost character, so dotted paths
//! resolve to their final segment.

use serde::Deserialize;

use sidecar_provider::{ResultContent, ToolResultBlock};
use sidecar_view::Node;

use crate::executor::{
    aborted_result, glyph, parse_input, progress_result, ToolCtx, ToolExecutor, ToolMsg,
    ToolRequest,
};
use crate::util::symbol_pos;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SymbolInput {
    file_path: String,
    symbol: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LspOp {
    Hover,
    FindReferences,
    Diagnostics,
}

enum State {
    Processing,
    Done(ToolResultBlock),
}

pub struct LspTool {
    request: ToolRequest,
    op: LspOp,
    label: String,
    state: State,
}

impl LspTool {
    pub fn new(request: ToolRequest, cx: &ToolCtx, op: LspOp) -> Self {
        match op {
            LspOp::Diagnostics => Self::spawn_diagnostics(request, cx),
            LspOp::Hover | LspOp::FindReferences => Self::spawn_symbol_op(request, cx, op),
        }
    }

    fn spawn_symbol_op(request: ToolRequest, cx: &ToolCtx, op: LspOp) -> Self {
        let input = match parse_input::<SymbolInput>(&request) {
            Ok(i) => i,
            Err(result) => {
                return Self {
                    request,
                    op,
                    label: String::new(),
                    state: State::Done(result),
                }
            }
        };
        let label = input.symbol.clone();
        let path = cx.resolve_path(std::path::Path::new(&input.file_path));
        let id = request.id.clone();
        let cx2 = cx.clone();
        tokio::spawn(async move {
            let outcome = run_symbol_op(&cx2, op, &path, &input.symbol).await;
            cx2.send_self(&id, ToolMsg::Finished(outcome));
        });
        Self {
            request,
            op,
            label,
            state: State::Processing,
        }
    }

    fn spawn_diagnostics(request: ToolRequest, cx: &ToolCtx) -> Self {
        let id = request.id.clone();
        let cx2 = cx.clone();
        tokio::spawn(async move {
            let outcome = run_diagnostics(&cx2).await;
            cx2.send_self(&id, ToolMsg::Finished(outcome));
        });
        Self {
            request,
            op: LspOp::Diagnostics,
            label: String::new(),
            state: State::Processing,
        }
    }

    fn op_name(&self) -> &'static str {
        match self.op {
            LspOp::Hover => "Hover",
            LspOp::FindReferences => "References",
            LspOp::Diagnostics => "Diagnostics",
        }
    }
}

async fn run_symbol_op(
    cx: &ToolCtx,
    op: LspOp,
    path: &std::path::Path,
    symbol: &str,
) -> Result<Vec<ResultContent>, String> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| format!("cannot read {}: {e}", path.display()))?;
    let pos = symbol_pos(&content, symbol)
        .ok_or_else(|| format!("symbol `{symbol}` not found in {}", path.display()))?;
    let text = match op {
        LspOp::Hover => cx.env.lsp.hover(path, pos).await,
        LspOp::FindReferences => cx.env.lsp.find_references(path, pos).await,
        LspOp::Diagnostics => unreachable!("diagnostics has no symbol"),
    }
    .map_err(|e| e.to_string())?;
    Ok(vec![ResultContent::Text { text }])
}

async fn run_diagnostics(cx: &ToolCtx) -> Result<Vec<ResultContent>, String> {
    let all = cx.env.lsp.diagnostics().await.map_err(|e| e.to_string())?;
    let root = &cx.env.project_root;
    let mut lines: Vec<String> = all
        .iter()
        .filter(|d| d.path.starts_with(root))
        .map(|d| {
            format!(
                "{}:{}:{} {} {}",
                cx.rel_path(&d.path).display(),
                d.pos.row + 1,
                d.pos.col + 1,
                d.severity,
                d.message
            )
        })
        .collect();
    lines.sort();
    let text = if lines.is_empty() {
        "No diagnostics.".to_string()
    } else {
        lines.join("\n")
    };
    Ok(vec![ResultContent::Text { text }])
}

impl ToolExecutor for LspTool {
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
        match msg {
            ToolMsg::Finished(Ok(content)) => {
                self.state = State::Done(ToolResultBlock::with_content(
                    self.request.id.clone(),
                    content,
                ));
            }
            ToolMsg::Finished(Err(e)) => {
                self.state = State::Done(ToolResultBlock::err(self.request.id.clone(), e));
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
            State::Processing => progress_result(&self.request.id, "Query in progress."),
        }
    }

    fn render_summary(&self) -> Node {
        let g = match &self.state {
            State::Processing => glyph::PROCESSING,
            State::Done(r) if r.is_error => glyph::ERROR,
            State::Done(_) => glyph::SUCCESS,
        };
        let label = if self.label.is_empty() {
            format!("{g} {}", self.op_name())
        } else {
            format!("{g} {} `{}`", self.op_name(), self.label)
        };
        Node::text(label)
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{harness, request_for, wait_for_effects};
    use crate::executor::ToolEffectMsg;
    use crate::ToolName;

    fn drive(tool: &mut LspTool, cx: &ToolCtx, msgs: Vec<ToolEffectMsg>) {
        for m in msgs {
            if let ToolEffectMsg::Tool { msg, .. } = m {
                tool.update(msg, cx);
            }
        }
    }

    #[tokio::test]
    async fn hover_reports_missing_symbol() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("lib.rs"), "fn real() {}\n").unwrap();
        let h = harness(dir.path());
        let mut tool = LspTool::new(
            request_for(
                ToolName::Hover,
                serde_json::json!({"filePath": "lib.rs", "symbol": "imaginary"}),
            ),
            &h.cx,
            LspOp::Hover,
        );
        assert!(!tool.is_done());
        wait_for_effects(&h.sent, 1).await;
        let msgs = std::mem::take(&mut *h.sent.lock().unwrap());
        drive(&mut tool, &h.cx, msgs);
        let r = tool.tool_result();
        assert!(r.is_error);
        assert!(r.text().contains("imaginary"));
    }

    #[tokio::test]
    async fn hover_on_null_bridge_errors_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("lib.rs"), "fn real() {}\n").unwrap();
        let h = harness(dir.path());
        let mut tool = LspTool::new(
            request_for(
                ToolName::Hover,
                serde_json::json!({"filePath": "lib.rs", "symbol": "real"}),
            ),
            &h.cx,
            LspOp::Hover,
        );
        wait_for_effects(&h.sent, 1).await;
        let msgs = std::mem::take(&mut *h.sent.lock().unwrap());
        drive(&mut tool, &h.cx, msgs);
        let r = tool.tool_result();
        assert!(r.is_error);
        assert!(r.text().contains("no language server"));
    }

    #[tokio::test]
    async fn diagnostics_with_empty_store_reports_none() {
        let dir = tempfile::tempdir().unwrap();
        let h = harness(dir.path());
        let mut tool = LspTool::new(
            request_for(ToolName::Diagnostics, serde_json::json!({})),
            &h.cx,
            LspOp::Diagnostics,
        );
        wait_for_effects(&h.sent, 1).await;
        let msgs = std::mem::take(&mut *h.sent.lock().unwrap());
        drive(&mut tool, &h.cx, msgs);
        let r = tool.tool_result();
        assert!(!r.is_error);
        assert_eq!(r.text(), "No diagnostics.");
    }

    #[tokio::test]
    async fn abort_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let h = harness(dir.path());
        let mut tool = LspTool::new(
            request_for(
                ToolName::Hover,
                serde_json::json!({"filePath": "none.rs", "symbol": "x"}),
            ),
            &h.cx,
            LspOp::Hover,
        );
        let first = tool.abort();
        let second = tool.abort();
        assert!(first.is_error);
        assert_eq!(first.text(), second.text());
        assert!(tool.is_done());
    }

    #[tokio::test]
    async fn result_in_processing_state_is_progress_notice() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("lib.rs"), "x").unwrap();
        let h = harness(dir.path());
        let tool = LspTool::new(
            request_for(
                ToolName::Hover,
                serde_json::json!({"filePath": "lib.rs", "symbol": "x"}),
            ),
            &h.cx,
            LspOp::Hover,
        );
        let r = tool.tool_result();
        assert!(!r.is_error);
        assert!(r.text().contains("progress"));
    }
}
