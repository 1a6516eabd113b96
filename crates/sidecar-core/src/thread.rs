// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! One conversation state machine: request assembly, streaming decode,
//! tool fan-out, stop-reason handling, and parent/child coupling.
//!
//! ```text
//! idle ─send─▶ awaiting-stream ─▶ streaming ─▶ tool-wait ─▶ awaiting-stream
//!                                    │
//!                                    └─ end_turn ─▶ idle
//! any ─abort─▶ stopped    any ─error─▶ errored    subagent ─yield─▶ yielded
//! ```

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use futures::StreamExt;
use regex::Regex;
use tracing::{debug, warn};

use sidecar_config::ThreadType;
use sidecar_provider::{
    BlockDelta, BlockStart, CompletionRequest, Message, MessageId, Part, Profile, Provider, Role,
    StopReason, StreamEvent, ThreadId, ToolRequestId, Usage,
};
use sidecar_tools::{tool_specs, ToolCtx, ToolManager, ToolName, ToolRequest};

use crate::msg::{ContextMsg, Dispatcher, RootMsg, ThreadMsg, ToolManagerMsg};
use crate::context::ContextManager;
use crate::prompts::system_prompt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThreadStatus {
    Idle,
    AwaitingStream,
    Streaming,
    ToolWait,
    Stopped { reason: String },
    Yielded { response: String },
    Errored { message: String },
}

impl ThreadStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ThreadStatus::Stopped { .. } | ThreadStatus::Yielded { .. } | ThreadStatus::Errored { .. }
        )
    }

    pub fn activity(&self) -> &'static str {
        match self {
            ThreadStatus::Idle => "idle",
            ThreadStatus::AwaitingStream => "awaiting stream",
            ThreadStatus::Streaming => "streaming",
            ThreadStatus::ToolWait => "running tools",
            ThreadStatus::Stopped { .. } => "stopped",
            ThreadStatus::Yielded { .. } => "yielded",
            ThreadStatus::Errored { .. } => "errored",
        }
    }
}

/// Parent linkage is by id only; lookups go through the chat's thread map.
#[derive(Debug, Clone)]
pub struct ParentLink {
    pub thread_id: ThreadId,
    pub spawn_request_id: ToolRequestId,
}

#[derive(Debug)]
enum PendingBlock {
    Text { part: usize },
    Thinking { part: usize },
    ToolUse { id: ToolRequestId, name: String, json: String },
}

/// Live `[[ -N / +M ]]` counts scraped from a streaming edit tool call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditPreview {
    pub tool: String,
    pub file: Option<String>,
    pub minus: usize,
    pub plus: usize,
}

pub struct Thread {
    pub id: ThreadId,
    pub thread_type: ThreadType,
    pub profile: Profile,
    provider: Arc<dyn Provider>,
    pub context: ContextManager,
    pub messages: Vec<Message>,
    pub status: ThreadStatus,
    pub parent: Option<ParentLink>,
    pub title: Option<String>,
    pub tool_manager: ToolManager,
    pub usage: Usage,

    dispatcher: Dispatcher,
    stream_task: Option<tokio::task::JoinHandle<()>>,
    blocks: HashMap<usize, PendingBlock>,
    assistant_index: Option<usize>,
    /// Tool uses of the current assistant turn still owed a result.
    outstanding: Vec<ToolRequestId>,
    last_stop_reason: Option<StopReason>,
    /// The turn called `yield_to_parent` or `compact`; the follow-up
    /// stream is deferred until the chat processes that effect.
    hold_next_stream: bool,
    next_message_id: u32,
    checkpoints: Vec<usize>,
}

impl Thread {
    pub fn new(
        id: ThreadId,
        thread_type: ThreadType,
        profile: Profile,
        provider: Arc<dyn Provider>,
        parent: Option<ParentLink>,
        dispatcher: Dispatcher,
    ) -> Self {
        Self {
            id,
            thread_type,
            profile,
            provider,
            context: ContextManager::new(),
            messages: Vec::new(),
            status: ThreadStatus::Idle,
            parent,
            title: None,
            tool_manager: ToolManager::new(id),
            usage: Usage::default(),
            dispatcher,
            stream_task: None,
            blocks: HashMap::new(),
            assistant_index: None,
            outstanding: Vec::new(),
            last_stop_reason: None,
            hold_next_stream: false,
            next_message_id: 0,
            checkpoints: Vec::new(),
        }
    }

    fn alloc_message_id(&mut self) -> MessageId {
        let id = MessageId(self.next_message_id);
        self.next_message_id += 1;
        id
    }

    pub fn handle_msg(&mut self, msg: ThreadMsg, cx: &ToolCtx) {
        match msg {
            ThreadMsg::SendMessage { text } => self.send_message(text, cx),
            ThreadMsg::StreamEvent(ev) => self.on_stream_event(ev, cx),
            ThreadMsg::StreamError(e) => self.on_stream_error(e),
            ThreadMsg::ToolManager(tm) => {
                match tm {
                    ToolManagerMsg::InitToolUse(request) => {
                        self.tool_manager.init_tool_use(request, cx)
                    }
                    ToolManagerMsg::Tool { request_id, msg } => {
                        self.tool_manager.update(&request_id, msg, cx)
                    }
                    ToolManagerMsg::Broadcast(msg) => self.tool_manager.broadcast(msg, cx),
                }
                self.after_tool_progress(cx);
            }
            ThreadMsg::Context(ContextMsg::AddFile {
                rel_path,
                pdf_page,
                summary_only,
            }) => {
                let abs = cx.env.project_root.join(&rel_path);
                self.context.add_file(rel_path, abs, pdf_page, summary_only);
            }
            ThreadMsg::Abort => self.abort(),
            ThreadMsg::SetTitle(title) => self.title = Some(title),
        }
    }

    /// Append the user turn (with context reminders) and open a stream.
    fn send_message(&mut self, text: String, cx: &ToolCtx) {
        if self.status.is_terminal() {
            warn!(thread = %self.id, "send into terminal thread ignored");
            return;
        }
        if self.status != ThreadStatus::Idle || self.stream_task.is_some() {
            warn!(thread = %self.id, status = ?self.status, "send during an active turn ignored");
            return;
        }
        self.checkpoints.push(self.messages.len());

        let mut parts = vec![Part::Text { text }];
        if let Some(listing) = self.context.listing() {
            parts.push(Part::SystemReminder { text: listing });
        }
        let changed = self.context.changed_files();
        if !changed.is_empty() {
            let list = changed
                .iter()
                .map(|p| format!("- `{}`", p.display()))
                .collect::<Vec<_>>()
                .join("\n");
            parts.push(Part::SystemReminder {
                text: format!("Files changed on disk since last read:\n{list}\n"),
            });
        }
        let id = self.alloc_message_id();
        self.messages
            .push(Message::with_parts(id, Role::User, parts));

        self.start_stream(cx);
    }

    /// Build the provider request from the persisted log and open the
    /// streaming response.  A thread never has two in-flight streams.
    pub(crate) fn start_stream(&mut self, cx: &ToolCtx) {
        if self.stream_task.is_some() {
            warn!(thread = %self.id, "refusing to open a second stream");
            return;
        }
        self.status = ThreadStatus::AwaitingStream;
        self.blocks.clear();
        self.assistant_index = None;
        self.outstanding.clear();
        self.last_stop_reason = None;
        self.hold_next_stream = false;

        let req = CompletionRequest {
            model: self.profile.model.clone(),
            system: system_prompt(self.thread_type),
            messages: self.messages.clone(),
            tools: tool_specs(self.thread_type, cx.env.mcp.as_ref()),
        };
        let provider = self.provider.clone();
        let dispatcher = self.dispatcher.clone();
        let thread_id = self.id;
        let task = tokio::spawn(async move {
            match provider.stream(req).await {
                Err(e) => dispatcher.send(RootMsg::Thread {
                    id: thread_id,
                    msg: ThreadMsg::StreamError(e.to_string()),
                }),
                Ok(mut stream) => {
                    while let Some(event) = stream.next().await {
                        match event {
                            Ok(ev) => dispatcher.send(RootMsg::Thread {
                                id: thread_id,
                                msg: ThreadMsg::StreamEvent(ev),
                            }),
                            Err(e) => {
                                dispatcher.send(RootMsg::Thread {
                                    id: thread_id,
                                    msg: ThreadMsg::StreamError(e.to_string()),
                                });
                                break;
                            }
                        }
                    }
                }
            }
        });
        self.stream_task = Some(task);
    }

    fn current_assistant(&mut self) -> usize {
        match self.assistant_index {
            Some(i) => i,
            None => {
                let id = self.alloc_message_id();
                self.messages.push(Message::assistant(id));
                let i = self.messages.len() - 1;
                self.assistant_index = Some(i);
                i
            }
        }
    }

    fn on_stream_event(&mut self, event: StreamEvent, cx: &ToolCtx) {
        if self.status.is_terminal() {
            return;
        }
        if self.status == ThreadStatus::AwaitingStream {
            self.status = ThreadStatus::Streaming;
        }
        match event {
            StreamEvent::ContentBlockStart { index, block } => {
                let msg_idx = self.current_assistant();
                match block {
                    BlockStart::Text { text } => {
                        self.messages[msg_idx].parts.push(Part::Text { text });
                        let part = self.messages[msg_idx].parts.len() - 1;
                        self.blocks.insert(index, PendingBlock::Text { part });
                    }
                    BlockStart::Thinking { thinking } => {
                        self.messages[msg_idx]
                            .parts
                            .push(Part::Thinking { text: thinking });
                        let part = self.messages[msg_idx].parts.len() - 1;
                        self.blocks.insert(index, PendingBlock::Thinking { part });
                    }
                    BlockStart::ToolUse { id, name } => {
                        self.blocks.insert(
                            index,
                            PendingBlock::ToolUse {
                                id,
                                name,
                                json: String::new(),
                            },
                        );
                    }
                }
            }
            StreamEvent::ContentBlockDelta { index, delta } => {
                let Some(block) = self.blocks.get_mut(&index) else {
                    warn!(thread = %self.id, index, "delta for unopened block");
                    return;
                };
                let msg_idx = match self.assistant_index {
                    Some(i) => i,
                    None => return,
                };
                match (block, delta) {
                    (PendingBlock::Text { part }, BlockDelta::TextDelta { text }) => {
                        if let Some(Part::Text { text: t }) =
                            self.messages[msg_idx].parts.get_mut(*part)
                        {
                            t.push_str(&text);
                        }
                    }
                    (PendingBlock::Thinking { part }, BlockDelta::ThinkingDelta { thinking }) => {
                        if let Some(Part::Thinking { text: t }) =
                            self.messages[msg_idx].parts.get_mut(*part)
                        {
                            t.push_str(&thinking);
                        }
                    }
                    (
                        PendingBlock::ToolUse { json, .. },
                        BlockDelta::InputJsonDelta { partial_json },
                    ) => {
                        json.push_str(&partial_json);
                    }
                    (block, delta) => {
                        warn!(thread = %self.id, ?block, ?delta, "mismatched stream delta")
                    }
                }
            }
            StreamEvent::ContentBlockStop { index } => {
                if let Some(PendingBlock::ToolUse { id, name, json }) = self.blocks.remove(&index)
                {
                    self.finish_tool_use(id, name, json, cx);
                }
            }
            StreamEvent::MessageDelta { stop_reason, usage } => {
                if stop_reason.is_some() {
                    self.last_stop_reason = stop_reason;
                }
                self.usage.input_tokens += usage.input_tokens;
                self.usage.output_tokens += usage.output_tokens;
            }
            StreamEvent::MessageStop => {
                self.stream_task = None;
                self.blocks.clear();
                self.assistant_index = None;
                if self.outstanding.is_empty() {
                    self.status = ThreadStatus::Idle;
                } else {
                    self.status = ThreadStatus::ToolWait;
                    self.after_tool_progress(cx);
                }
            }
        }
    }

    /// A `tool_use` block finished streaming: parse the accumulated JSON,
    /// record the part, and hand the request to the tool manager.
    fn finish_tool_use(&mut self, id: ToolRequestId, name: String, json: String, cx: &ToolCtx) {
        let input: serde_json::Value = if json.is_empty() {
            serde_json::Value::Object(Default::default())
        } else {
            match serde_json::from_str(&json) {
                Ok(v) => v,
                Err(e) => {
                    // Keep the raw text so the executor reports a clean
                    // input error and the log stays inspectable.
                    warn!(thread = %self.id, tool = %name, error = %e, "unparseable tool input");
                    serde_json::Value::String(json)
                }
            }
        };

        let msg_idx = self.current_assistant();
        self.messages[msg_idx].parts.push(Part::ToolUse {
            request_id: id.clone(),
            name: name.clone(),
            input: input.clone(),
        });
        self.outstanding.push(id.clone());

        match ToolName::parse(&name) {
            Some(tool_name) => {
                if matches!(tool_name, ToolName::YieldToParent | ToolName::Compact) {
                    self.hold_next_stream = true;
                }
                self.tool_manager.init_tool_use(
                    ToolRequest {
                        id,
                        name: tool_name,
                        input,
                    },
                    cx,
                );
            }
            None => {
                debug!(thread = %self.id, tool = %name, "unknown tool name from model");
            }
        }
    }

    /// When all tools of the turn are terminal, emit the results message
    /// and either loop into a new stream or come to rest.
    fn after_tool_progress(&mut self, cx: &ToolCtx) {
        if self.status != ThreadStatus::ToolWait || self.outstanding.is_empty() {
            return;
        }
        let all_done = self
            .outstanding
            .iter()
            .all(|id| self.tool_manager.executor(id).map_or(true, |e| e.is_done()));
        if !all_done {
            return;
        }

        let results = self.tool_manager.results_for(&self.outstanding);
        let id = self.alloc_message_id();
        let parts = results.into_iter().map(Part::ToolResult).collect();
        self.messages
            .push(Message::with_parts(id, Role::User, parts));
        self.outstanding.clear();

        let stop_ends_turn = matches!(
            self.last_stop_reason,
            Some(StopReason::EndTurn) | Some(StopReason::MaxTokens) | Some(StopReason::Aborted)
        );
        if stop_ends_turn {
            self.status = ThreadStatus::Idle;
        } else if self.hold_next_stream {
            // yield/compact is queued; the chat decides what happens next.
            self.status = ThreadStatus::Idle;
        } else {
            self.start_stream(cx);
        }
    }

    fn on_stream_error(&mut self, message: String) {
        warn!(thread = %self.id, error = %message, "provider stream error");
        self.stream_task = None;
        self.blocks.clear();
        self.assistant_index = None;
        let id = self.alloc_message_id();
        self.messages.push(Message::with_parts(
            id,
            Role::Assistant,
            vec![Part::Text {
                text: format!("Provider error: {message}"),
            }],
        ));
        self.status = ThreadStatus::Errored { message };
    }

    /// Cancel the in-flight stream, abort every non-terminal tool, and
    /// reply to any unreplied `tool_use` with error results.
    pub fn abort(&mut self) {
        if let Some(task) = self.stream_task.take() {
            task.abort();
        }
        self.tool_manager.abort_all();
        if !self.outstanding.is_empty() {
            let results = self.tool_manager.results_for(&self.outstanding);
            let id = self.alloc_message_id();
            let parts = results.into_iter().map(Part::ToolResult).collect();
            self.messages
                .push(Message::with_parts(id, Role::User, parts));
            self.outstanding.clear();
        }
        self.blocks.clear();
        self.assistant_index = None;
        if !self.status.is_terminal() {
            self.status = ThreadStatus::Stopped {
                reason: "aborted".to_string(),
            };
        }
    }

    /// Subagent termination via `yield_to_parent`: like abort, but the
    /// payload is preserved and the status is `yielded`.
    pub fn mark_yielded(&mut self, response: String) {
        self.abort();
        self.status = ThreadStatus::Yielded { response };
    }

    pub fn mark_errored(&mut self, message: String) {
        self.abort();
        self.status = ThreadStatus::Errored { message };
    }

    /// Rewrite everything before the last checkpoint into a single
    /// synthetic summary message, stripping reminders and thinking from
    /// the kept tail.
    pub fn apply_compact(
        &mut self,
        summary: String,
        context_files: Vec<PathBuf>,
        continuation: Option<String>,
        cx: &ToolCtx,
    ) {
        let boundary = self
            .checkpoints
            .last()
            .copied()
            .unwrap_or(0)
            .min(self.messages.len());
        eprintln!("DEBUG checkpoints={:?} boundary={} messages={:?}", self.checkpoints, boundary, self.messages.iter().map(|m| m.text()).collect::<Vec<_>>());
        let kept: Vec<Message> = self.messages[boundary..]
            .iter()
            .map(Message::stripped_for_compaction)
            .collect();

        let mut rebuilt = Vec::with_capacity(kept.len() + 2);
        let summary_id = self.alloc_message_id();
        rebuilt.push(Message::with_parts(
            summary_id,
            Role::Assistant,
            vec![Part::Text { text: summary }],
        ));
        if let Some(text) = continuation {
            let id = self.alloc_message_id();
            rebuilt.push(Message::user(id, text));
        }
        let new_boundary = rebuilt.len();
        rebuilt.extend(kept);
        self.messages = rebuilt;
        self.checkpoints = vec![new_boundary];

        self.context.union_paths(&context_files, &cx.env.project_root);
    }

    /// Best-effort counts for edit tools whose JSON input is still
    /// streaming.  Cosmetic only.
    pub fn streaming_previews(&self) -> Vec<EditPreview> {
        let mut previews: Vec<(usize, EditPreview)> = self
            .blocks
            .iter()
            .filter_map(|(index, block)| match block {
                PendingBlock::ToolUse { name, json, .. }
                    if name == "insert" || name == "replace" =>
                {
                    Some((*index, scan_edit_preview(name, json)))
                }
                _ => None,
            })
            .collect();
        previews.sort_by_key(|(index, _)| *index);
        previews.into_iter().map(|(_, p)| p).collect()
    }

    /// The payload a parent polls for.  `None` while the thread still runs.
    pub fn terminal_result(&self) -> Option<Result<String, String>> {
        match &self.status {
            ThreadStatus::Yielded { response } => Some(Ok(response.clone())),
            ThreadStatus::Errored { message } => Some(Err(message.clone())),
            ThreadStatus::Stopped { reason } => Some(Err(format!("stopped: {reason}"))),
            _ => None,
        }
    }
}

/// Scan partial tool-input JSON for `filePath`, `find`, `replace`, and
/// `content` string fields; newline escapes inside them drive the
/// `[[ -N / +M ]]` display.
fn scan_edit_preview(tool: &str, partial_json: &str) -> EditPreview {
    fn field(json: &str, name: &str) -> Option<String> {
        // Values may be truncated mid-string; accept a missing closing quote.
        let re = Regex::new(&format!(
            r#""{name}"\s*:\s*"((?:[^"\\]|\\.)*)"#
        ))
        .expect("static regex");
        re.captures(json).map(|c| c[1].to_string())
    }
    fn lines(raw: &Option<String>) -> usize {
        match raw {
            Some(s) if !s.is_empty() => s.matches("\\n").count() + 1,
            _ => 0,
        }
    }

    let file = field(partial_json, "filePath");
    let find = field(partial_json, "find");
    let replace = field(partial_json, "replace");
    let content = field(partial_json, "content");

    let (minus, plus) = match tool {
        "replace" => (lines(&find), lines(&replace)),
        _ => (0, lines(&content)),
    };
    EditPreview {
        tool: tool.to_string(),
        file,
        minus,
        plus,
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
