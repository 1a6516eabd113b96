// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use serde::Deserialize;

use sidecar_provider::ToolResultBlock;
use sidecar_view::Node;

use crate::executor::{glyph, parse_input, ToolCtx, ToolEffectMsg, ToolExecutor, ToolMsg, ToolRequest};

#[derive(Debug, Deserialize)]
struct TitleInput {
    title: String,
}

/// Idempotently sets the thread's title.  No side effects beyond the
/// dispatched rename, so it completes immediately.
pub struct ThreadTitleTool {
    request: ToolRequest,
    result: ToolResultBlock,
    title: Option<String>,
}

impl ThreadTitleTool {
    pub fn new(request: ToolRequest, cx: &ToolCtx) -> Self {
        match parse_input::<TitleInput>(&request) {
            Ok(input) => {
                cx.env.dispatch.send(ToolEffectMsg::SetThreadTitle {
                    thread_id: cx.thread_id,
                    title: input.title.clone(),
                });
                let result = ToolResultBlock::ok(request.id.clone(), "Title set.");
                Self {
                    request,
                    result,
                    title: Some(input.title),
                }
            }
            Err(result) => Self {
                request,
                result,
                title: None,
            },
        }
    }
}

impl ToolExecutor for ThreadTitleTool {
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
        match &self.title {
            Some(t) => Node::text(format!("{} Title: {t}", glyph::SUCCESS)),
            None => Node::text(format!("{} Title: invalid input", glyph::ERROR)),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
