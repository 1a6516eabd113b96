// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Sidebar view functions.  Pure: model in, VDOM out.  Keybindings carry
//! actions that enqueue root messages through the dispatcher; nothing here
//! mutates state.

use sidecar_provider::Part;
use sidecar_view::{template, Action, Node};

use crate::chat::{Chat, ThreadSummaryStatus};
use crate::msg::{ChatMsg, Dispatcher, RootMsg, ThreadMsg};
use crate::thread::{EditPreview, Thread, ThreadStatus};

pub fn root_view(chat: &Chat, dispatcher: &Dispatcher) -> Node {
    let body = if chat.show_overview {
        overview_view(chat, dispatcher)
    } else {
        match chat.active_thread() {
            Some(thread) => thread_view(thread),
            None => template!["(no thread)\n"],
        }
    };
    let d = dispatcher.clone();
    template!["# Sidecar\n", body].with_binding(
        "T",
        Action::new(move || d.send(RootMsg::Chat(ChatMsg::ThreadsOverview))),
    )
}

fn overview_view(chat: &Chat, dispatcher: &Dispatcher) -> Node {
    let rows: Vec<Node> = chat
        .summaries()
        .into_iter()
        .map(|summary| {
            let label = summary
                .title
                .clone()
                .unwrap_or_else(|| summary.id.to_string());
            let status = match &summary.status {
                ThreadSummaryStatus::Missing => "missing".to_string(),
                ThreadSummaryStatus::Pending => "pending".to_string(),
                ThreadSummaryStatus::Running { activity } => (*activity).to_string(),
                ThreadSummaryStatus::Stopped { reason } => format!("stopped: {reason}"),
                ThreadSummaryStatus::Yielded { .. } => "yielded".to_string(),
                ThreadSummaryStatus::Errored { message } => format!("error: {message}"),
            };
            let d = dispatcher.clone();
            let id = summary.id;
            template!["- ", label, " (", status, ")\n"].with_binding(
                "<CR>",
                Action::new(move || d.send(RootMsg::Chat(ChatMsg::SelectThread(id)))),
            )
        })
        .collect();
    template!["## Threads\n", rows]
}

fn thread_view(thread: &Thread) -> Node {
    let title = thread
        .title
        .clone()
        .unwrap_or_else(|| thread.id.to_string());
    let messages: Vec<Node> = thread
        .messages
        .iter()
        .map(|m| message_view(thread, m))
        .collect();
    let previews: Vec<Node> = thread
        .streaming_previews()
        .into_iter()
        .map(preview_view)
        .collect();
    template![
        "## ",
        title,
        " — ",
        status_line(&thread.status),
        "\n",
        messages,
        previews,
    ]
}

fn status_line(status: &ThreadStatus) -> String {
    match status {
        ThreadStatus::Errored { message } => format!("error: {message}"),
        ThreadStatus::Stopped { reason } => format!("stopped ({reason})"),
        other => other.activity().to_string(),
    }
}

fn message_view(thread: &Thread, message: &sidecar_provider::Message) -> Node {
    let header = match message.role {
        sidecar_provider::Role::User => "\n### user\n",
        sidecar_provider::Role::Assistant => "\n### assistant\n",
    };
    // Messages that carry only tool results render no header of their own;
    // the results live under the originating tool summaries.
    let visible = message.parts.iter().any(|p| {
        !matches!(p, Part::ToolResult(_) | Part::SystemReminder { .. })
    });
    let parts: Vec<Node> = message
        .parts
        .iter()
        .map(|p| part_view(thread, p))
        .collect();
    if visible {
        template![header, parts]
    } else {
        template![parts]
    }
}

fn part_view(thread: &Thread, part: &Part) -> Node {
    match part {
        Part::Text { text } => template![text.clone(), "\n"],
        Part::Thinking { .. } => template!["…thinking…\n"],
        Part::ToolUse {
            request_id, name, ..
        } => match thread.tool_manager.executor(request_id) {
            Some(executor) => template![executor.render_summary(), "\n"],
            None => template![format!("❌ unknown tool `{name}`"), "\n"],
        },
        Part::ToolResult(_) | Part::SystemReminder { .. } => Node::empty(),
        Part::Image { .. } => template!["[image]\n"],
        Part::Document { title, .. } => {
            let label = title.clone().unwrap_or_else(|| "attachment".to_string());
            template!["[", label, "]\n"]
        }
    }
}

fn preview_view(preview: EditPreview) -> Node {
    let tool = match preview.tool.as_str() {
        "insert" => "Insert",
        "replace" => "Replace",
        other => other,
    };
    let counts = if preview.tool == "insert" {
        format!("[[ +{} ]]", preview.plus)
    } else {
        format!("[[ -{} / +{} ]]", preview.minus, preview.plus)
    };
    match &preview.file {
        Some(file) => template!["⚙️ ", tool, " ", counts, " in `", file.clone(), "`\n"],
        None => template!["⚙️ ", tool, " ", counts, "\n"],
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
