// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::path::PathBuf;

use serde::Deserialize;

use sidecar_provider::ToolResultBlock;
use sidecar_view::Node;

use crate::executor::{
    glyph, parse_input, ToolCtx, ToolEffectMsg, ToolExecutor, ToolMsg, ToolRequest,
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CompactInput {
    summary: String,
    #[serde(default)]
    context_files: Vec<PathBuf>,
    continuation: Option<String>,
}

/// Requests a checkpoint-bounded rewrite of the thread's message log.  The
/// thread performs the rewrite; listed context files are unioned with the
/// surviving context.
pub struct CompactTool {
    request: ToolRequest,
    result: ToolResultBlock,
}

impl CompactTool {
    pub fn new(request: ToolRequest, cx: &ToolCtx) -> Self {
        let result = match parse_input::<CompactInput>(&request) {
            Ok(input) => {
                if input.summary.trim().is_empty() {
                    ToolResultBlock::err(request.id.clone(), "summary must not be empty")
                } else {
                    cx.env.dispatch.send(ToolEffectMsg::CompactThread {
                        thread_id: cx.thread_id,
                        summary: input.summary,
                        context_files: input.context_files,
                        continuation: input.continuation,
                    });
                    ToolResultBlock::ok(request.id.clone(), "Compacted conversation.")
                }
            }
            Err(r) => r,
        };
        Self { request, result }
    }
}

impl ToolExecutor for CompactTool {
    fn request(&self) -> &ToolRequest {
        &self.request
    }

    fn is_done(&self) -> bool {
        true
    }

    fn is_pending_user_action(&self) -> bool {
        false
    }

    fn update(&mut self, _msg: ToolMsg, _cx: &ToolCtx) {}

    fn abort(&mut self) -> ToolResultBlock {
        self.result.clone()
    }

    fn tool_result(&self) -> ToolResultBlock {
        self.result.clone()
    }

    fn render_summary(&self) -> Node {
        if self.result.is_error {
            Node::text(format!("{} Compact failed", glyph::ERROR))
        } else {
            Node::text(format!("{} Compacted", glyph::SUCCESS))
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{recorded_ctx, request_for};
    use crate::ToolName;

    #[tokio::test]
    async fn dispatches_compact_with_continuation() {
        let (cx, sent) = recorded_ctx();
        let tool = CompactTool::new(
            request_for(
                ToolName::Compact,
                serde_json::json!({
                    "summary": "We fixed the parser.",
                    "contextFiles": ["src/parser.rs"],
                    "continuation": "Now add tests."
                }),
            ),
            &cx,
        );
        assert!(!tool.tool_result().is_error);
        let msgs = sent.lock().unwrap();
        match &msgs[0] {
            ToolEffectMsg::CompactThread {
                summary,
                context_files,
                continuation,
                ..
            } => {
                assert_eq!(summary, "We fixed the parser.");
                assert_eq!(context_files, &[PathBuf::from("src/parser.rs")]);
                assert_eq!(continuation.as_deref(), Some("Now add tests."));
            }
            other => panic!("unexpected effect {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_summary_is_rejected() {
        let (cx, sent) = recorded_ctx();
        let tool = CompactTool::new(
            request_for(ToolName::Compact, serde_json::json!({"summary": "  "})),
            &cx,
        );
        assert!(tool.tool_result().is_error);
        assert!(sent.lock().unwrap().is_empty());
    }
}
