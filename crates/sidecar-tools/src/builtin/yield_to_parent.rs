// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use serde::Deserialize;

use sidecar_provider::ToolResultBlock;
use sidecar_view::Node;

use crate::executor::{
    glyph, parse_input, ToolCtx, ToolEffectMsg, ToolExecutor, ToolMsg, ToolRequest,
};

#[derive(Debug, Deserialize)]
struct YieldInput {
    result: String,
}

/// Terminates the subagent thread and delivers `result` to the parent's
/// spawning tool call.  The chat performs the actual transition; any other
/// in-flight tools in this thread are aborted by it.
pub struct YieldToParentTool {
    request: ToolRequest,
    result: ToolResultBlock,
}

impl YieldToParentTool {
    pub fn new(request: ToolRequest, cx: &ToolCtx) -> Self {
        let result = match parse_input::<YieldInput>(&request) {
            Ok(input) => {
                cx.env.dispatch.send(ToolEffectMsg::YieldToParent {
                    thread_id: cx.thread_id,
                    result: input.result,
                });
                ToolResultBlock::ok(request.id.clone(), "Yielded to parent.")
            }
            Err(r) => r,
        };
        Self { request, result }
    }
}

impl ToolExecutor for YieldToParentTool {
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
            Node::text(format!("{} Yield: invalid input", glyph::ERROR))
        } else {
            Node::text(format!("{} Yielded to parent", glyph::SUCCESS))
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
