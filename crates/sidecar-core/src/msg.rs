// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The root message union.  Every state mutation in the core flows through
//! exactly one of these, applied serially by the dispatcher loop.

use std::path::PathBuf;

use tokio::sync::mpsc;

use sidecar_config::ThreadType;
use sidecar_provider::{StreamEvent, ThreadId, ToolRequestId};
use sidecar_tools::{ToolDispatch, ToolEffectMsg, ToolMsg, ToolRequest};
use sidecar_view::Key;

#[derive(Debug)]
pub enum RootMsg {
    Chat(ChatMsg),
    Thread { id: ThreadId, msg: ThreadMsg },
    Key(Key),
    Tick,
}

#[derive(Debug)]
pub enum ChatMsg {
    NewThread {
        thread_type: ThreadType,
        profile: Option<String>,
    },
    SelectThread(ThreadId),
    ThreadsOverview,
    CompactThread {
        thread_id: ThreadId,
        summary: String,
        context_files: Vec<PathBuf>,
        continuation: Option<String>,
    },
    SpawnSubagentThread {
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
    ThreadInitialized {
        thread_id: ThreadId,
    },
    ThreadError {
        thread_id: ThreadId,
        message: String,
    },
}

#[derive(Debug)]
pub enum ThreadMsg {
    SendMessage { text: String },
    StreamEvent(StreamEvent),
    StreamError(String),
    ToolManager(ToolManagerMsg),
    Context(ContextMsg),
    Abort,
    SetTitle(String),
}

#[derive(Debug)]
pub enum ToolManagerMsg {
    InitToolUse(ToolRequest),
    Tool {
        request_id: ToolRequestId,
        msg: ToolMsg,
    },
    Broadcast(ToolMsg),
}

#[derive(Debug)]
pub enum ContextMsg {
    AddFile {
        rel_path: PathBuf,
        pdf_page: Option<u32>,
        summary_only: bool,
    },
}

impl From<ToolEffectMsg> for RootMsg {
    fn from(effect: ToolEffectMsg) -> Self {
        match effect {
            ToolEffectMsg::Tool {
                thread_id,
                request_id,
                msg,
            } => RootMsg::Thread {
                id: thread_id,
                msg: ThreadMsg::ToolManager(ToolManagerMsg::Tool { request_id, msg }),
            },
            ToolEffectMsg::SpawnSubagent {
                parent,
                request_id,
                prompt,
                context_files,
                agent_type,
                blocking,
            } => RootMsg::Chat(ChatMsg::SpawnSubagentThread {
                parent,
                request_id,
                prompt,
                context_files,
                agent_type,
                blocking,
            }),
            ToolEffectMsg::YieldToParent { thread_id, result } => {
                RootMsg::Chat(ChatMsg::YieldToParent { thread_id, result })
            }
            ToolEffectMsg::CompactThread {
                thread_id,
                summary,
                context_files,
                continuation,
            } => RootMsg::Chat(ChatMsg::CompactThread {
                thread_id,
                summary,
                context_files,
                continuation,
            }),
            ToolEffectMsg::SetThreadTitle { thread_id, title } => RootMsg::Thread {
                id: thread_id,
                msg: ThreadMsg::SetTitle(title),
            },
            ToolEffectMsg::SelectThread { thread_id } => {
                RootMsg::Chat(ChatMsg::SelectThread(thread_id))
            }
            ToolEffectMsg::AddFileToContext {
                thread_id,
                rel_path,
                pdf_page,
                summary_only,
            } => RootMsg::Thread {
                id: thread_id,
                msg: ThreadMsg::Context(ContextMsg::AddFile {
                    rel_path,
                    pdf_page,
                    summary_only,
                }),
            },
        }
    }
}

/// The outbound message port.  Sends enqueue on the single root queue and
/// are processed after the current handler returns, which is what gives
/// tools their "no dispatch-in-dispatch" guarantee.
#[derive(Clone)]
pub struct Dispatcher {
    tx: mpsc::UnboundedSender<RootMsg>,
}

impl Dispatcher {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<RootMsg>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn send(&self, msg: RootMsg) {
        // A closed queue only happens during shutdown; drops are fine then.
        let _ = self.tx.send(msg);
    }
}

impl ToolDispatch for Dispatcher {
    fn send(&self, msg: ToolEffectMsg) {
        Dispatcher::send(self, msg.into());
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
