// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use sidecar_provider::{ResultContent, ToolResultBlock};
use sidecar_view::Node;

use crate::executor::{
    aborted_result, glyph, progress_result, ToolCtx, ToolExecutor, ToolMsg, ToolRequest,
};

enum State {
    Processing,
    Done(ToolResultBlock),
}

/// Opaque passthrough for `mcp_`-prefixed tools: the input is forwarded
/// verbatim to the MCP host and the result is whatever the host returns.
pub struct McpPassthroughTool {
    request: ToolRequest,
    state: State,
}

impl McpPassthroughTool {
    pub fn new(request: ToolRequest, cx: &ToolCtx) -> Self {
        let name = request.name.as_str().to_string();
        let input = request.input.clone();
        let id = request.id.clone();
        let cx2 = cx.clone();
        tokio::spawn(async move {
            let outcome = match cx2.env.mcp.call_tool(&name, input).await {
                Ok(value) => {
                    let text = match value {
                        serde_json::Value::String(s) => s,
                        other => other.to_string(),
                    };
                    Ok(vec![ResultContent::Text { text }])
                }
                Err(e) => Err(e.to_string()),
            };
            cx2.send_self(&id, ToolMsg::Finished(outcome));
        });
        Self {
            request,
            state: State::Processing,
        }
    }
}

impl ToolExecutor for McpPassthroughTool {
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
            State::Processing => progress_result(&self.request.id, "Calling MCP tool."),
        }
    }

    fn render_summary(&self) -> Node {
        let g = match &self.state {
            State::Processing => glyph::PROCESSING,
            State::Done(r) if r.is_error => glyph::ERROR,
            State::Done(_) => glyph::SUCCESS,
        };
        Node::text(format!("{g} {}", self.request.name))
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
