// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use serde::Deserialize;

use sidecar_provider::{ThreadId, ToolResultBlock};
use sidecar_view::Node;

use crate::builtin::spawn_subagent::parse_agent_type;
use crate::executor::{
    aborted_result, glyph, parse_input, progress_result, ToolCtx, ToolEffectMsg, ToolExecutor,
    ToolMsg, ToolRequest,
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ForeachInput {
    prompt: String,
    inputs: Vec<String>,
    agent_type: Option<String>,
}

enum State {
    Spawning,
    Done(ToolResultBlock),
}

/// Fan-out of `spawn_subagent` over a list of inputs.  All children are
/// spawned non-blocking; the tool completes once every child id is known,
/// returning the ids for a follow-up `wait_for_subagents`.
pub struct SpawnForeachTool {
    request: ToolRequest,
    expected: usize,
    children: Vec<ThreadId>,
    state: State,
}

impl SpawnForeachTool {
    pub fn new(request: ToolRequest, cx: &ToolCtx) -> Self {
        let input = match parse_input::<ForeachInput>(&request) {
            Ok(i) => i,
            Err(result) => {
                return Self {
                    expected: 0,
                    children: Vec::new(),
                    state: State::Done(result),
                    request,
                }
            }
        };
        if input.inputs.is_empty() {
            return Self {
                expected: 0,
                children: Vec::new(),
                state: State::Done(ToolResultBlock::err(
                    request.id.clone(),
                    "inputs must not be empty",
                )),
                request,
            };
        }
        let agent_type = match parse_agent_type(input.agent_type.as_deref()) {
            Ok(t) => t,
            Err(e) => {
                return Self {
                    expected: 0,
                    children: Vec::new(),
                    state: State::Done(ToolResultBlock::err(request.id.clone(), e)),
                    request,
                }
            }
        };
        for item in &input.inputs {
            cx.env.dispatch.send(ToolEffectMsg::SpawnSubagent {
                parent: cx.thread_id,
                request_id: request.id.clone(),
                prompt: format!("{}\n\nInput: {item}", input.prompt),
                context_files: Vec::new(),
                agent_type,
                blocking: false,
            });
        }
        Self {
            expected: input.inputs.len(),
            children: Vec::new(),
            state: State::Spawning,
            request,
        }
    }
}

impl ToolExecutor for SpawnForeachTool {
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
        if let (State::Spawning, ToolMsg::SubagentSpawned { thread_id }) = (&self.state, msg) {
            self.children.push(thread_id);
            if self.children.len() == self.expected {
                let ids = self
                    .children
                    .iter()
                    .map(|t| t.0.to_string())
                    .collect::<Vec<_>>()
                    .join(", ");
                self.state = State::Done(ToolResultBlock::ok(
                    self.request.id.clone(),
                    format!(
                        "Spawned {} sub-agents (thread ids: {ids}). Use \
                         wait_for_subagents to collect their results.",
                        self.expected
                    ),
                ));
            }
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
            State::Spawning => progress_result(
                &self.request.id,
                &format!("Spawning {}/{} sub-agents.", self.children.len(), self.expected),
            ),
        }
    }

    fn render_summary(&self) -> Node {
        match &self.state {
            State::Spawning => Node::text(format!(
                "{} Spawn {} sub-agents ({} ready)",
                glyph::PROCESSING,
                self.expected,
                self.children.len()
            )),
            State::Done(r) => {
                let g = if r.is_error { glyph::ERROR } else { glyph::SUCCESS };
                Node::text(format!("{g} Spawned {} sub-agents", self.children.len()))
            }
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
