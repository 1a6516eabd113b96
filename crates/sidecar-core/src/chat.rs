// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The chat owns every thread, routes root messages to the owning thread,
//! and coordinates spawn / yield / compact across the parent–child graph.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use sidecar_config::{Config, ThreadType};
use sidecar_provider::{ProviderRegistry, ThreadId, ToolRequestId};
use sidecar_tools::{SubagentOutcome, ThreadPoll, ToolCtx, ToolEffectMsg, ToolEnv, ToolMsg};

use crate::msg::{ChatMsg, ContextMsg, Dispatcher, RootMsg, ThreadMsg, ToolManagerMsg};
use crate::thread::{ParentLink, Thread, ThreadStatus};

/// Wrapper states for threads whose initialization is in flight or failed.
pub enum ThreadWrapper {
    Pending,
    Ready(Box<Thread>),
    Failed(String),
}

/// Summary handed to overview views and parent tools.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThreadSummaryStatus {
    Missing,
    Pending,
    Running { activity: &'static str },
    Stopped { reason: String },
    Yielded { response: String },
    Errored { message: String },
}

#[derive(Debug, Clone)]
pub struct ThreadSummary {
    pub id: ThreadId,
    pub title: Option<String>,
    pub status: ThreadSummaryStatus,
}

pub struct Chat {
    threads: HashMap<ThreadId, ThreadWrapper>,
    order: Vec<ThreadId>,
    counter: u32,
    pub active: Option<ThreadId>,
    pub show_overview: bool,
    config: Arc<Config>,
    registry: Arc<ProviderRegistry>,
    dispatcher: Dispatcher,
}

impl Chat {
    pub fn new(
        config: Arc<Config>,
        registry: Arc<ProviderRegistry>,
        dispatcher: Dispatcher,
    ) -> Self {
        Self {
            threads: HashMap::new(),
            order: Vec::new(),
            counter: 0,
            active: None,
            show_overview: false,
            config,
            registry,
            dispatcher,
        }
    }

    pub fn thread(&self, id: ThreadId) -> Option<&Thread> {
        match self.threads.get(&id) {
            Some(ThreadWrapper::Ready(t)) => Some(t.as_ref()),
            _ => None,
        }
    }

    pub fn active_thread(&self) -> Option<&Thread> {
        self.active.and_then(|id| self.thread(id))
    }

    /// Create a thread and seed it with context files and an optional
    /// initial message (both delivered as queued messages so creation
    /// itself never dispatches into the new thread).
    pub fn create_thread_with_context(
        &mut self,
        thread_type: ThreadType,
        profile_name: Option<&str>,
        parent: Option<ParentLink>,
        context_files: &[std::path::PathBuf],
        initial_message: Option<String>,
    ) -> ThreadId {
        self.counter += 1;
        let id = ThreadId(self.counter);
        self.order.push(id);
        self.threads.insert(id, ThreadWrapper::Pending);

        match self.registry.resolve(&self.config, profile_name) {
            Ok((profile, provider)) => {
                let thread = Thread::new(
                    id,
                    thread_type,
                    profile,
                    provider,
                    parent,
                    self.dispatcher.clone(),
                );
                self.threads.insert(id, ThreadWrapper::Ready(Box::new(thread)));
                for rel in context_files {
                    self.dispatcher.send(RootMsg::Thread {
                        id,
                        msg: ThreadMsg::Context(ContextMsg::AddFile {
                            rel_path: rel.clone(),
                            pdf_page: None,
                            summary_only: false,
                        }),
                    });
                }
                if let Some(text) = initial_message {
                    self.dispatcher.send(RootMsg::Thread {
                        id,
                        msg: ThreadMsg::SendMessage { text },
                    });
                }
                self.dispatcher
                    .send(RootMsg::Chat(ChatMsg::ThreadInitialized { thread_id: id }));
            }
            Err(e) => {
                warn!(thread = %id, error = %e, "thread initialization failed");
                self.threads.insert(id, ThreadWrapper::Failed(e.to_string()));
                self.dispatcher.send(RootMsg::Chat(ChatMsg::ThreadError {
                    thread_id: id,
                    message: e.to_string(),
                }));
            }
        }
        if self.active.is_none() {
            self.active = Some(id);
        }
        id
    }

    pub fn handle_chat_msg(&mut self, msg: ChatMsg, env: &Arc<ToolEnv>) {
        match msg {
            ChatMsg::NewThread {
                thread_type,
                profile,
            } => {
                let id = self.create_thread_with_context(
                    thread_type,
                    profile.as_deref(),
                    None,
                    &[],
                    None,
                );
                self.active = Some(id);
                self.show_overview = false;
            }
            ChatMsg::SelectThread(id) => {
                if self.threads.contains_key(&id) {
                    self.active = Some(id);
                    self.show_overview = false;
                }
            }
            ChatMsg::ThreadsOverview => {
                self.show_overview = true;
            }
            ChatMsg::SpawnSubagentThread {
                parent,
                request_id,
                prompt,
                context_files,
                agent_type,
                blocking: _,
            } => {
                let link = ParentLink {
                    thread_id: parent,
                    spawn_request_id: request_id.clone(),
                };
                let child = self.create_thread_with_context(
                    agent_type,
                    None,
                    Some(link),
                    &context_files,
                    Some(prompt),
                );
                debug!(parent = %parent, child = %child, "spawned subagent");
                self.dispatcher.send(
                    ToolEffectMsg::Tool {
                        thread_id: parent,
                        request_id,
                        msg: ToolMsg::SubagentSpawned { thread_id: child },
                    }
                    .into(),
                );
            }
            ChatMsg::YieldToParent { thread_id, result } => {
                if let Some(ThreadWrapper::Ready(thread)) = self.threads.get_mut(&thread_id) {
                    thread.mark_yielded(result);
                }
                self.notify_parent_of_terminal(thread_id);
            }
            ChatMsg::CompactThread {
                thread_id,
                summary,
                context_files,
                continuation,
            } => {
                let cx = self.ctx_for(thread_id, env);
                if let (Some(cx), Some(ThreadWrapper::Ready(thread))) =
                    (cx, self.threads.get_mut(&thread_id))
                {
                    thread.apply_compact(summary, context_files, continuation, &cx);
                    if !thread.status.is_terminal() {
                        thread.start_stream(&cx);
                    }
                }
            }
            ChatMsg::ThreadInitialized { thread_id } => {
                debug!(thread = %thread_id, "thread initialized");
            }
            ChatMsg::ThreadError { thread_id, message } => {
                warn!(thread = %thread_id, error = %message, "thread errored");
                self.notify_parent_of_terminal(thread_id);
            }
        }
    }

    pub fn handle_thread_msg(&mut self, id: ThreadId, msg: ThreadMsg, env: &Arc<ToolEnv>) {
        let Some(cx) = self.ctx_for(id, env) else {
            warn!(thread = %id, "message for unknown thread dropped");
            return;
        };
        let was_terminal = match self.threads.get_mut(&id) {
            Some(ThreadWrapper::Ready(thread)) => {
                let was = thread.status.is_terminal();
                thread.handle_msg(msg, &cx);
                was
            }
            _ => return,
        };
        // A thread that just became terminal notifies its parent exactly once.
        let now_terminal = self
            .thread(id)
            .map(|t| t.status.is_terminal())
            .unwrap_or(false);
        if now_terminal && !was_terminal {
            self.notify_parent_of_terminal(id);
        }
    }

    /// Parent notification on child terminal transition; the parent's
    /// pending spawn/wait executors recompute from the broadcast.
    fn notify_parent_of_terminal(&mut self, child_id: ThreadId) {
        let Some(ThreadWrapper::Ready(child)) = self.threads.get(&child_id) else {
            return;
        };
        let Some(parent) = child.parent.clone() else {
            return;
        };
        let outcome = match &child.status {
            ThreadStatus::Yielded { response } => SubagentOutcome::Yielded(response.clone()),
            ThreadStatus::Errored { message } => SubagentOutcome::Errored(message.clone()),
            ThreadStatus::Stopped { reason } => SubagentOutcome::Stopped(reason.clone()),
            _ => return,
        };
        self.dispatcher.send(RootMsg::Thread {
            id: parent.thread_id,
            msg: ThreadMsg::ToolManager(ToolManagerMsg::Broadcast(ToolMsg::SubagentTerminal {
                thread_id: child_id,
                outcome,
            })),
        });
    }

    /// Build the per-dispatch tool context for one thread.
    fn ctx_for(&self, id: ThreadId, env: &Arc<ToolEnv>) -> Option<ToolCtx> {
        let Some(ThreadWrapper::Ready(thread)) = self.threads.get(&id) else {
            return None;
        };
        Some(ToolCtx {
            env: env.clone(),
            thread_id: id,
            remembered: thread.tool_manager.remembered(),
            attached: Arc::new(thread.context.attached_snapshot()),
            thread_results: Arc::new(self.poll_snapshot()),
        })
    }

    fn poll_snapshot(&self) -> HashMap<ThreadId, ThreadPoll> {
        self.order
            .iter()
            .map(|id| (*id, self.get_thread_result(*id)))
            .collect()
    }

    /// `{status: pending|done, result?}` for parent tools to poll.
    pub fn get_thread_result(&self, id: ThreadId) -> ThreadPoll {
        match self.threads.get(&id) {
            None => ThreadPoll::Missing,
            Some(ThreadWrapper::Pending) => ThreadPoll::Pending,
            Some(ThreadWrapper::Failed(e)) => ThreadPoll::Done(Err(e.clone())),
            Some(ThreadWrapper::Ready(thread)) => match thread.terminal_result() {
                Some(result) => ThreadPoll::Done(result),
                None => ThreadPoll::Pending,
            },
        }
    }

    pub fn get_thread_summary(&self, id: ThreadId) -> ThreadSummary {
        let status = match self.threads.get(&id) {
            None => ThreadSummaryStatus::Missing,
            Some(ThreadWrapper::Pending) => ThreadSummaryStatus::Pending,
            Some(ThreadWrapper::Failed(e)) => ThreadSummaryStatus::Errored { message: e.clone() },
            Some(ThreadWrapper::Ready(thread)) => match &thread.status {
                ThreadStatus::Stopped { reason } => ThreadSummaryStatus::Stopped {
                    reason: reason.clone(),
                },
                ThreadStatus::Yielded { response } => ThreadSummaryStatus::Yielded {
                    response: response.clone(),
                },
                ThreadStatus::Errored { message } => ThreadSummaryStatus::Errored {
                    message: message.clone(),
                },
                status => ThreadSummaryStatus::Running {
                    activity: status.activity(),
                },
            },
        };
        ThreadSummary {
            id,
            title: self.thread(id).and_then(|t| t.title.clone()),
            status,
        }
    }

    pub fn summaries(&self) -> Vec<ThreadSummary> {
        self.order
            .iter()
            .map(|id| self.get_thread_summary(*id))
            .collect()
    }

    /// A subagent's spawn link, for parent-side bookkeeping and tests.
    pub fn parent_of(&self, id: ThreadId) -> Option<(ThreadId, ToolRequestId)> {
        self.thread(id)
            .and_then(|t| t.parent.clone())
            .map(|p| (p.thread_id, p.spawn_request_id))
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
