// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The tool executor framework.  One executor exists per `ToolUse` part;
//! each is a small state machine (`pending → (user approval)? → processing
//! → done`) that mutates only inside `update` and performs I/O exclusively
//! through spawned tasks reporting back via the dispatch port, so a tool
//! never dispatches a message inside the dispatch that created it.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use sidecar_config::{Config, ThreadType};
use sidecar_editor::{Editor, LspBridge};
use sidecar_provider::{ResultContent, ThreadId, ToolRequestId, ToolResultBlock};
use sidecar_view::Node;

use crate::name::ToolName;
use crate::policy::{CommandPolicy, FilePolicy};

/// One tool invocation as decoded from the provider stream.
#[derive(Debug, Clone)]
pub struct ToolRequest {
    pub id: ToolRequestId,
    pub name: ToolName,
    pub input: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// Terminal outcome of a subagent thread, as reported to parent executors.
#[derive(Debug, Clone)]
pub enum SubagentOutcome {
    Yielded(String),
    Stopped(String),
    Errored(String),
}

/// Messages delivered to a tool executor.
#[derive(Debug, Clone)]
pub enum ToolMsg {
    /// The user answered an approval prompt.
    UserApproval { approved: bool, remember: bool },
    /// A spawned effect finished with content or an error message.
    Finished(Result<Vec<ResultContent>, String>),
    /// Batched output lines from a child process.
    OutputLines {
        stream: OutputStream,
        lines: Vec<String>,
    },
    /// The child process exited.
    Exited {
        code: Option<i32>,
        signal: Option<i32>,
        timed_out: bool,
    },
    /// 1 Hz heartbeat while a process runs; triggers a pure re-render.
    Tick,
    /// User-initiated termination of a running process.
    Terminate,
    /// The chat created the requested subagent thread.
    SubagentSpawned { thread_id: ThreadId },
    /// A subagent this thread is related to reached a terminal state.
    SubagentTerminal {
        thread_id: ThreadId,
        outcome: SubagentOutcome,
    },
}

/// Effects a tool may dispatch.  The core converts these into root messages
/// enqueued for the next dispatcher iteration.
#[derive(Debug, Clone)]
pub enum ToolEffectMsg {
    Tool {
        thread_id: ThreadId,
        request_id: ToolRequestId,
        msg: ToolMsg,
    },
    SpawnSubagent {
        parent: ThreadId,
        request_id: ToolRequestId,
        prompt: String,
        context_files: Vec<PathBuf>,
        agent_type: ThreadType,
        blocking: bool,
    },
    YieldToParent {
        thread_id: ThreadId,
        result: String,
    },
    CompactThread {
        thread_id: ThreadId,
        summary: String,
        context_files: Vec<PathBuf>,
        continuation: Option<String>,
    },
    SetThreadTitle {
        thread_id: ThreadId,
        title: String,
    },
    /// Switch the chat view to another thread (subagent summary links).
    SelectThread { thread_id: ThreadId },
    AddFileToContext {
        thread_id: ThreadId,
        rel_path: PathBuf,
        pdf_page: Option<u32>,
        summary_only: bool,
    },
}

/// The single mutation path out of a tool: enqueue a message for the next
/// dispatcher iteration.
pub trait ToolDispatch: Send + Sync {
    fn send(&self, msg: ToolEffectMsg);
}

/// Host for dynamically discovered tools.  Input is forwarded verbatim;
/// the result is whatever the host returns.
#[async_trait]
pub trait McpHost: Send + Sync {
    async fn call_tool(
        &self,
        name: &str,
        input: serde_json::Value,
    ) -> anyhow::Result<serde_json::Value>;

    fn tool_schemas(&self) -> Vec<sidecar_provider::ToolSchema> {
        Vec::new()
    }
}

/// Host used when no MCP servers are configured.
pub struct NullMcpHost;

#[async_trait]
impl McpHost for NullMcpHost {
    async fn call_tool(
        &self,
        name: &str,
        _input: serde_json::Value,
    ) -> anyhow::Result<serde_json::Value> {
        anyhow::bail!("no MCP host attached (tool {name})")
    }
}

/// Everything invariant across a thread's tool invocations.
pub struct ToolEnv {
    pub config: Arc<Config>,
    pub editor: Arc<dyn Editor>,
    pub lsp: Arc<dyn LspBridge>,
    pub mcp: Arc<dyn McpHost>,
    pub dispatch: Arc<dyn ToolDispatch>,
    pub file_policy: FilePolicy,
    pub command_policy: CommandPolicy,
    pub project_root: PathBuf,
    /// Base temp directory; per-request artifacts live under
    /// `<root>/threads/<threadId>/tools/<requestId>/`.
    pub artifacts_root: PathBuf,
}

/// A context-manager view sufficient for `get_file`'s "already attached"
/// notice, snapshotted per dispatch.
#[derive(Debug, Clone, Default)]
pub struct AttachedFile {
    pub pdf_pages: Option<BTreeSet<u32>>,
    pub summary_only: bool,
}

/// Poll status of another thread, for spawn/wait executors.
#[derive(Debug, Clone)]
pub enum ThreadPoll {
    Missing,
    Pending,
    Done(Result<String, String>),
}

/// Per-dispatch context handed to executors.  Cheap to clone.
#[derive(Clone)]
pub struct ToolCtx {
    pub env: Arc<ToolEnv>,
    pub thread_id: ThreadId,
    /// Commands the user chose to remember for this thread.
    pub remembered: Arc<Mutex<HashSet<String>>>,
    pub attached: Arc<HashMap<PathBuf, AttachedFile>>,
    pub thread_results: Arc<HashMap<ThreadId, ThreadPoll>>,
}

impl ToolCtx {
    /// Route a message back to the executor that scheduled the effect.
    pub fn send_self(&self, request_id: &ToolRequestId, msg: ToolMsg) {
        self.env.dispatch.send(ToolEffectMsg::Tool {
            thread_id: self.thread_id,
            request_id: request_id.clone(),
            msg,
        });
    }

    pub fn artifacts_dir(&self, request_id: &ToolRequestId) -> PathBuf {
        self.env
            .artifacts_root
            .join("threads")
            .join(self.thread_id.to_string())
            .join("tools")
            .join(&request_id.0)
    }

    /// Resolve a (possibly relative) tool path against the project root.
    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.env.project_root.join(path)
        }
    }

    /// Path relative to the project root when inside it.
    pub fn rel_path(&self, path: &Path) -> PathBuf {
        path.strip_prefix(&self.env.project_root)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| path.to_path_buf())
    }
}

/// Status glyphs shown in the sidebar.
pub mod glyph {
    pub const PROCESSING: &str = "⚙️";
    pub const AWAITING_APPROVAL: &str = "⏳";
    pub const SUCCESS: &str = "✅";
    pub const ERROR: &str = "❌";
}

/// The contract every tool implements.
///
/// `update` is a pure state transition plus optionally a scheduled effect;
/// it never performs blocking I/O.  `abort` is idempotent and forces a
/// terminal error state.  `tool_result` is safe to call in any state; in
/// non-terminal states it returns a short progress notice so the provider
/// always receives a well-formed result.
pub trait ToolExecutor: Send {
    fn request(&self) -> &ToolRequest;
    fn is_done(&self) -> bool;
    fn is_pending_user_action(&self) -> bool;
    fn update(&mut self, msg: ToolMsg, cx: &ToolCtx);
    fn abort(&mut self) -> ToolResultBlock;
    fn tool_result(&self) -> ToolResultBlock;
    fn render_summary(&self) -> Node;
    fn render_preview(&self) -> Node {
        Node::empty()
    }
    fn render_detail(&self) -> Node {
        self.render_summary()
    }
}

/// Canonical abort result.
pub fn aborted_result(request_id: &ToolRequestId) -> ToolResultBlock {
    ToolResultBlock::err(request_id.clone(), "aborted")
}

/// Progress notice returned while a tool is still running.
pub fn progress_result(request_id: &ToolRequestId, note: &str) -> ToolResultBlock {
    ToolResultBlock::ok(request_id.clone(), note)
}

/// Validate tool input up front.  A malformed input produces an immediate
/// `done(error)` without side effects.
pub fn parse_input<T: DeserializeOwned>(request: &ToolRequest) -> Result<T, ToolResultBlock> {
    serde_json::from_value(request.input.clone()).map_err(|e| {
        ToolResultBlock::err(
            request.id.clone(),
            format!("invalid input for {}: {e}", request.name),
        )
    })
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
