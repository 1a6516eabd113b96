// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Per-thread tool manager: instantiates one executor per `ToolUse`,
//! routes messages to them, and collects their results for the next user
//! message.  Executors live until the thread is destroyed; aborting makes
//! them terminal without deleting them.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use tracing::warn;

use sidecar_provider::{ThreadId, ToolRequestId, ToolResultBlock};

use crate::builtin::bash_command::BashCommandTool;
use crate::builtin::buffer_edit::BufferEditTool;
use crate::builtin::compact::CompactTool;
use crate::builtin::edits::FileEditTool;
use crate::builtin::get_file::GetFileTool;
use crate::builtin::list_directory::ListDirectoryTool;
use crate::builtin::lsp::{LspOp, LspTool};
use crate::builtin::mcp::McpPassthroughTool;
use crate::builtin::spawn_foreach::SpawnForeachTool;
use crate::builtin::spawn_subagent::SpawnSubagentTool;
use crate::builtin::thread_title::ThreadTitleTool;
use crate::builtin::wait_for_subagents::WaitForSubagentsTool;
use crate::builtin::yield_to_parent::YieldToParentTool;
use crate::executor::{ToolCtx, ToolExecutor, ToolMsg, ToolRequest};
use crate::name::ToolName;

pub fn create_executor(request: ToolRequest, cx: &ToolCtx) -> Box<dyn ToolExecutor> {
    match request.name.clone() {
        ToolName::GetFile => Box::new(GetFileTool::new(request, cx)),
        ToolName::ListDirectory => Box::new(ListDirectoryTool::new(request, cx)),
        ToolName::Hover => Box::new(LspTool::new(request, cx, LspOp::Hover)),
        ToolName::FindReferences => Box::new(LspTool::new(request, cx, LspOp::FindReferences)),
        ToolName::Diagnostics => Box::new(LspTool::new(request, cx, LspOp::Diagnostics)),
        ToolName::BashCommand => Box::new(BashCommandTool::new(request, cx)),
        ToolName::Insert | ToolName::Replace | ToolName::Edl => {
            Box::new(FileEditTool::new(request, cx))
        }
        ToolName::InlineEdit | ToolName::ReplaceSelection => {
            Box::new(BufferEditTool::new(request, cx))
        }
        ToolName::SpawnSubagent => Box::new(SpawnSubagentTool::new(request, cx)),
        ToolName::SpawnForeach => Box::new(SpawnForeachTool::new(request, cx)),
        ToolName::WaitForSubagents => Box::new(WaitForSubagentsTool::new(request, cx)),
        ToolName::YieldToParent => Box::new(YieldToParentTool::new(request, cx)),
        ToolName::Compact => Box::new(CompactTool::new(request, cx)),
        ToolName::ThreadTitle => Box::new(ThreadTitleTool::new(request, cx)),
        ToolName::Mcp(_) => Box::new(McpPassthroughTool::new(request, cx)),
    }
}

pub struct ToolManager {
    thread_id: ThreadId,
    executors: Vec<Box<dyn ToolExecutor>>,
    remembered: Arc<Mutex<HashSet<String>>>,
}

impl ToolManager {
    pub fn new(thread_id: ThreadId) -> Self {
        Self {
            thread_id,
            executors: Vec::new(),
            remembered: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn thread_id(&self) -> ThreadId {
        self.thread_id
    }

    /// The remembered-commands set shared with bash executors via the
    /// per-dispatch context.
    pub fn remembered(&self) -> Arc<Mutex<HashSet<String>>> {
        self.remembered.clone()
    }

    pub fn init_tool_use(&mut self, request: ToolRequest, cx: &ToolCtx) {
        if self.executor(&request.id).is_some() {
            warn!(request_id = %request.id, "duplicate tool request id; ignoring");
            return;
        }
        self.executors.push(create_executor(request, cx));
    }

    pub fn update(&mut self, request_id: &ToolRequestId, msg: ToolMsg, cx: &ToolCtx) {
        match self
            .executors
            .iter_mut()
            .find(|e| e.request().id == *request_id)
        {
            Some(executor) => executor.update(msg, cx),
            None => warn!(request_id = %request_id, "message for unknown tool request"),
        }
    }

    /// Deliver a message to every non-terminal executor (subagent terminal
    /// notifications fan out this way).
    pub fn broadcast(&mut self, msg: ToolMsg, cx: &ToolCtx) {
        for executor in &mut self.executors {
            if !executor.is_done() {
                executor.update(msg.clone(), cx);
            }
        }
    }

    /// Abort every non-terminal executor.  Idempotent.
    pub fn abort_all(&mut self) {
        for executor in &mut self.executors {
            if !executor.is_done() {
                executor.abort();
            }
        }
    }

    pub fn all_done(&self) -> bool {
        self.executors.iter().all(|e| e.is_done())
    }

    pub fn any_pending_user_action(&self) -> bool {
        self.executors.iter().any(|e| e.is_pending_user_action())
    }

    pub fn executor(&self, request_id: &ToolRequestId) -> Option<&dyn ToolExecutor> {
        self.executors
            .iter()
            .find(|e| e.request().id == *request_id)
            .map(|e| &**e)
    }

    pub fn executors(&self) -> impl Iterator<Item = &dyn ToolExecutor> {
        self.executors.iter().map(|e| &**e)
    }

    /// Results for the given requests, in request order.  Safe in any
    /// state; non-terminal executors produce progress notices.
    pub fn results_for(&self, ids: &[ToolRequestId]) -> Vec<ToolResultBlock> {
        ids.iter()
            .map(|id| match self.executor(id) {
                Some(e) => e.tool_result(),
                None => ToolResultBlock::err(id.clone(), "no executor for this request"),
            })
            .collect()
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
