// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use sidecar_config::ThreadType;

/// System prompt for a thread, derived from its type.
pub fn system_prompt(thread_type: ThreadType) -> String {
    let base = "You are a coding assistant embedded in a text editor. \
                You converse with the user and act through tool calls that \
                read files, search, edit buffers, and run shell commands. \
                Prefer tools over guessing; keep replies terse.";
    let role = match thread_type {
        ThreadType::Root => {
            "You drive the main conversation. Delegate focused sub-tasks to \
             sub-agents with spawn_subagent and collect their results with \
             wait_for_subagents. Use thread_title early to name the thread, \
             and compact when the conversation grows long."
        }
        ThreadType::SubagentDefault => {
            "You are a sub-agent working on one focused task. When the task \
             is complete, call yield_to_parent with a concise result; that \
             is the only way to report back."
        }
        ThreadType::SubagentFast => {
            "You are a fast lookup sub-agent. Answer with as few tool calls \
             as possible and yield_to_parent immediately with the answer."
        }
        ThreadType::SubagentExplore => {
            "You are an exploration sub-agent. Read and search the codebase \
             without modifying anything, then yield_to_parent with your \
             findings."
        }
    };
    format!("{base}\n\n{role}")
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
