// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! `spawn_subagent`: create a child thread.  Blocking spawns stay in
//! `waiting-for-subagent` until the child reaches a terminal state and the
//! child's yield payload becomes this tool's result; non-blocking spawns
//! complete as soon as the chat reports the child's id.

use std::path::PathBuf;

use serde::Deserialize;

use sidecar_config::ThreadType;
use sidecar_provider::{ThreadId, ToolResultBlock};
use sidecar_view::{Action, Node};

use crate::executor::{
    aborted_result, glyph, parse_input, progress_result, SubagentOutcome, ToolCtx, ToolEffectMsg,
    ToolExecutor, ToolMsg, ToolRequest,
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SpawnInput {
    prompt: String,
    #[serde(default)]
    context_files: Vec<PathBuf>,
    agent_type: Option<String>,
    #[serde(default)]
    blocking: bool,
}

pub(crate) fn parse_agent_type(s: Option<&str>) -> Result<ThreadType, String> {
    match s {
        None | Some("default") => Ok(ThreadType::SubagentDefault),
        Some("fast") => Ok(ThreadType::SubagentFast),
        Some("explore") => Ok(ThreadType::SubagentExplore),
        Some(other) => Err(format!("unknown agentType: {other}")),
    }
}

enum State {
    /// Spawn requested; the chat has not yet reported the child id.
    Spawning,
    WaitingForSubagent { child: ThreadId },
    Done(ToolResultBlock),
}

pub struct SpawnSubagentTool {
    request: ToolRequest,
    blocking: bool,
    child: Option<ThreadId>,
    state: State,
    cx: ToolCtx,
}

impl SpawnSubagentTool {
    pub fn new(request: ToolRequest, cx: &ToolCtx) -> Self {
        let input = match parse_input::<SpawnInput>(&request) {
            Ok(i) => i,
            Err(result) => {
                return Self {
                    blocking: false,
                    child: None,
                    state: State::Done(result),
                    cx: cx.clone(),
                    request,
                }
            }
        };
        let agent_type = match parse_agent_type(input.agent_type.as_deref()) {
            Ok(t) => t,
            Err(e) => {
                return Self {
                    blocking: false,
                    child: None,
                    state: State::Done(ToolResultBlock::err(request.id.clone(), e)),
                    cx: cx.clone(),
                    request,
                }
            }
        };
        cx.env.dispatch.send(ToolEffectMsg::SpawnSubagent {
            parent: cx.thread_id,
            request_id: request.id.clone(),
            prompt: input.prompt,
            context_files: input.context_files,
            agent_type,
            blocking: input.blocking,
        });
        Self {
            blocking: input.blocking,
            child: None,
            state: State::Spawning,
            cx: cx.clone(),
            request,
        }
    }

    fn child_link(&self, text: String) -> Node {
        match self.child {
            Some(child) => {
                let cx = self.cx.clone();
                Node::text(text).with_binding(
                    "<CR>",
                    Action::new(move || {
                        cx.env
                            .dispatch
                            .send(ToolEffectMsg::SelectThread { thread_id: child });
                    }),
                )
            }
            None => Node::text(text),
        }
    }
}

impl ToolExecutor for SpawnSubagentTool {
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
        match (&self.state, msg) {
            (State::Spawning, ToolMsg::SubagentSpawned { thread_id }) => {
                self.child = Some(thread_id);
                if self.blocking {
                    self.state = State::WaitingForSubagent { child: thread_id };
                } else {
                    self.state = State::Done(ToolResultBlock::ok(
                        self.request.id.clone(),
                        format!("Spawned sub-agent ({thread_id})."),
                    ));
                }
            }
            (
                State::WaitingForSubagent { child },
                ToolMsg::SubagentTerminal { thread_id, outcome },
            ) if *child == thread_id => {
                self.state = State::Done(match outcome {
                    SubagentOutcome::Yielded(result) => ToolResultBlock::ok(
                        self.request.id.clone(),
                        format!("Sub-agent ({thread_id}) completed:\n{result}"),
                    ),
                    SubagentOutcome::Stopped(reason) => ToolResultBlock::err(
                        self.request.id.clone(),
                        format!("Sub-agent ({thread_id}) stopped: {reason}"),
                    ),
                    SubagentOutcome::Errored(e) => ToolResultBlock::err(
                        self.request.id.clone(),
                        format!("Sub-agent ({thread_id}) errored: {e}"),
                    ),
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
            State::Spawning => progress_result(&self.request.id, "Spawning sub-agent."),
            State::WaitingForSubagent { child } => {
                progress_result(&self.request.id, &format!("Waiting for {child}."))
            }
        }
    }

    fn render_summary(&self) -> Node {
        match &self.state {
            State::Spawning => Node::text(format!("{} Spawn sub-agent", glyph::PROCESSING)),
            State::WaitingForSubagent { child } => {
                self.child_link(format!("{} Waiting for {child}", glyph::PROCESSING))
            }
            State::Done(r) => {
                let g = if r.is_error { glyph::ERROR } else { glyph::SUCCESS };
                match self.child {
                    Some(child) => self.child_link(format!("{g} Sub-agent {child}")),
                    None => Node::text(format!("{g} Spawn sub-agent")),
                }
            }
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
