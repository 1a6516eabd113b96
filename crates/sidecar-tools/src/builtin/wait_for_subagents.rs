// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::BTreeMap;

use serde::Deserialize;

use sidecar_provider::{ThreadId, ToolResultBlock};
use sidecar_view::Node;

use crate::executor::{
    glyph, parse_input, progress_result, SubagentOutcome, ThreadPoll, ToolCtx, ToolExecutor,
    ToolMsg, ToolRequest,
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WaitInput {
    thread_ids: Vec<u32>,
}

enum State {
    Waiting,
    Done(ToolResultBlock),
}

/// Completes once every listed child thread is terminal.  Event driven:
/// the chat broadcasts every child's terminal transition, and already
/// terminal children are resolved from the status snapshot at creation.
/// Abort does not cancel the children, it only aggregates what has
/// arrived so far.
pub struct WaitForSubagentsTool {
    request: ToolRequest,
    outcomes: BTreeMap<ThreadId, Result<String, String>>,
    waiting_for: Vec<ThreadId>,
    state: State,
}

impl WaitForSubagentsTool {
    pub fn new(request: ToolRequest, cx: &ToolCtx) -> Self {
        let input = match parse_input::<WaitInput>(&request) {
            Ok(i) => i,
            Err(result) => {
                return Self {
                    outcomes: BTreeMap::new(),
                    waiting_for: Vec::new(),
                    state: State::Done(result),
                    request,
                }
            }
        };
        if input.thread_ids.is_empty() {
            return Self {
                outcomes: BTreeMap::new(),
                waiting_for: Vec::new(),
                state: State::Done(ToolResultBlock::err(
                    request.id.clone(),
                    "threadIds must not be empty",
                )),
                request,
            };
        }

        let mut tool = Self {
            outcomes: BTreeMap::new(),
            waiting_for: input.thread_ids.iter().map(|id| ThreadId(*id)).collect(),
            state: State::Waiting,
            request,
        };
        // Children that finished before this tool was created.
        for id in tool.waiting_for.clone() {
            match cx.thread_results.get(&id) {
                Some(ThreadPoll::Done(result)) => {
                    tool.outcomes.insert(id, result.clone());
                }
                Some(ThreadPoll::Missing) | None => {
                    tool.outcomes
                        .insert(id, Err("no such thread".to_string()));
                }
                Some(ThreadPoll::Pending) => {}
            }
        }
        tool.check_complete();
        tool
    }

    fn check_complete(&mut self) {
        if !matches!(self.state, State::Waiting) {
            return;
        }
        if self.waiting_for.iter().all(|id| self.outcomes.contains_key(id)) {
            self.state = State::Done(self.aggregate(false));
        }
    }

    fn aggregate(&self, partial: bool) -> ToolResultBlock {
        let mut lines = vec!["Sub-agent results:".to_string()];
        let mut any_error = false;
        for id in &self.waiting_for {
            match self.outcomes.get(id) {
                Some(Ok(result)) => lines.push(format!("- {id}: completed: {result}")),
                Some(Err(e)) => {
                    any_error = true;
                    lines.push(format!("- {id}: error: {e}"));
                }
                None => {
                    any_error = true;
                    lines.push(format!("- {id}: still running"));
                }
            }
        }
        if partial {
            any_error = true;
            lines.push("(aborted before all sub-agents finished)".to_string());
        }
        let text = lines.join("\n");
        if any_error {
            ToolResultBlock::err(self.request.id.clone(), text)
        } else {
            ToolResultBlock::ok(self.request.id.clone(), text)
        }
    }
}

impl ToolExecutor for WaitForSubagentsTool {
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
        if let ToolMsg::SubagentTerminal { thread_id, outcome } = msg {
            if self.waiting_for.contains(&thread_id) {
                let entry = match outcome {
                    SubagentOutcome::Yielded(r) => Ok(r),
                    SubagentOutcome::Stopped(reason) => Err(format!("stopped: {reason}")),
                    SubagentOutcome::Errored(e) => Err(e),
                };
                self.outcomes.insert(thread_id, entry);
                self.check_complete();
            }
        }
    }

    fn abort(&mut self) -> ToolResultBlock {
        if let State::Done(r) = &self.state {
            return r.clone();
        }
        let r = self.aggregate(true);
        self.state = State::Done(r.clone());
        r
    }

    fn tool_result(&self) -> ToolResultBlock {
        match &self.state {
            State::Done(r) => r.clone(),
            State::Waiting => progress_result(
                &self.request.id,
                &format!(
                    "Waiting for {}/{} sub-agents.",
                    self.waiting_for.len() - self.outcomes.len(),
                    self.waiting_for.len()
                ),
            ),
        }
    }

    fn render_summary(&self) -> Node {
        match &self.state {
            State::Waiting => Node::text(format!(
                "{} Waiting for sub-agents ({}/{})",
                glyph::PROCESSING,
                self.outcomes.len(),
                self.waiting_for.len()
            )),
            State::Done(r) => {
                let g = if r.is_error { glyph::ERROR } else { glyph::SUCCESS };
                Node::text(format!("{g} {} sub-agents finished", self.waiting_for.len()))
            }
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
