// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Tool schemas offered to the provider, filtered by thread type.

use serde_json::json;

use sidecar_config::ThreadType;
use sidecar_provider::ToolSchema;

use crate::executor::McpHost;
use crate::name::ToolName;

/// The tools a thread of the given type may call.
pub fn allowed_tools(thread_type: ThreadType) -> Vec<ToolName> {
    use ToolName::*;
    match thread_type {
        ThreadType::Root => vec![
            GetFile,
            ListDirectory,
            Hover,
            FindReferences,
            Diagnostics,
            BashCommand,
            Insert,
            Replace,
            InlineEdit,
            ReplaceSelection,
            Edl,
            SpawnSubagent,
            SpawnForeach,
            WaitForSubagents,
            Compact,
            ThreadTitle,
        ],
        ThreadType::SubagentDefault => vec![
            GetFile,
            ListDirectory,
            Hover,
            FindReferences,
            Diagnostics,
            BashCommand,
            Insert,
            Replace,
            Edl,
            Compact,
            YieldToParent,
        ],
        ThreadType::SubagentFast => vec![GetFile, ListDirectory, Diagnostics, YieldToParent],
        ThreadType::SubagentExplore => vec![
            GetFile,
            ListDirectory,
            Hover,
            FindReferences,
            Diagnostics,
            BashCommand,
            YieldToParent,
        ],
    }
}

/// Full schema list for a request: the static registry for this thread
/// type, plus whatever the MCP host has discovered (root and default
/// subagents only).
pub fn tool_specs(thread_type: ThreadType, mcp: &dyn McpHost) -> Vec<ToolSchema> {
    let mut specs: Vec<ToolSchema> = allowed_tools(thread_type)
        .iter()
        .map(schema_for)
        .collect();
    if matches!(
        thread_type,
        ThreadType::Root | ThreadType::SubagentDefault
    ) {
        specs.extend(mcp.tool_schemas());
    }
    specs
}

pub fn schema_for(name: &ToolName) -> ToolSchema {
    let (description, input_schema) = match name {
        ToolName::GetFile => (
            "Read a file and attach it to the conversation context. \
             For PDFs, call once without pdfPage for a descriptor, then with \
             pdfPage to fetch a single page.",
            json!({
                "type": "object",
                "properties": {
                    "filePath": { "type": "string", "description": "Path relative to the project root" },
                    "pdfPage": { "type": "integer", "description": "1-based page to extract from a PDF" },
                    "force": { "type": "boolean", "description": "Re-read even when already in context" }
                },
                "required": ["filePath"]
            }),
        ),
        ToolName::ListDirectory => (
            "List a directory as a bounded tree.",
            json!({
                "type": "object",
                "properties": {
                    "path": { "type": "string", "description": "Directory relative to the project root" }
                },
                "required": ["path"]
            }),
        ),
        ToolName::Hover => (
            "Language-server hover information for a symbol in a file.",
            json!({
                "type": "object",
                "properties": {
                    "filePath": { "type": "string" },
                    "symbol": { "type": "string", "description": "Symbol to look up; dotted paths resolve to the final segment" }
                },
                "required": ["filePath", "symbol"]
            }),
        ),
        ToolName::FindReferences => (
            "Find references to a symbol via the language server.",
            json!({
                "type": "object",
                "properties": {
                    "filePath": { "type": "string" },
                    "symbol": { "type": "string" }
                },
                "required": ["filePath", "symbol"]
            }),
        ),
        ToolName::Diagnostics => (
            "Snapshot of workspace diagnostics.",
            json!({ "type": "object", "properties": {} }),
        ),
        ToolName::BashCommand => (
            "Run a shell command under /bin/sh. Output is logged in full to a \
             file; a head/tail summary is returned.",
            json!({
                "type": "object",
                "properties": {
                    "command": { "type": "string" }
                },
                "required": ["command"]
            }),
        ),
        ToolName::Insert => (
            "Insert content after an anchor string in a file. An empty \
             insertAfter appends at end of file.",
            json!({
                "type": "object",
                "properties": {
                    "filePath": { "type": "string" },
                    "insertAfter": { "type": "string" },
                    "content": { "type": "string" }
                },
                "required": ["filePath", "insertAfter", "content"]
            }),
        ),
        ToolName::Replace => (
            "Replace the first occurrence of `find` in a file. An empty \
             `find` replaces the whole file.",
            json!({
                "type": "object",
                "properties": {
                    "filePath": { "type": "string" },
                    "find": { "type": "string" },
                    "replace": { "type": "string" }
                },
                "required": ["filePath", "find", "replace"]
            }),
        ),
        ToolName::InlineEdit => (
            "Find-and-replace inside the buffer currently displaying a file.",
            json!({
                "type": "object",
                "properties": {
                    "filePath": { "type": "string" },
                    "find": { "type": "string" },
                    "replace": { "type": "string" }
                },
                "required": ["filePath", "find", "replace"]
            }),
        ),
        ToolName::ReplaceSelection => (
            "Replace the user's current visual selection.",
            json!({
                "type": "object",
                "properties": {
                    "replace": { "type": "string" }
                },
                "required": ["replace"]
            }),
        ),
        ToolName::Edl => (
            "Apply a batched list of edits. Each entry is either a \
             find/replace or an insertAfter/content pair.",
            json!({
                "type": "object",
                "properties": {
                    "edits": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {
                                "filePath": { "type": "string" },
                                "find": { "type": "string" },
                                "replace": { "type": "string" },
                                "insertAfter": { "type": "string" },
                                "content": { "type": "string" }
                            },
                            "required": ["filePath"]
                        }
                    }
                },
                "required": ["edits"]
            }),
        ),
        ToolName::SpawnSubagent => (
            "Spawn a subagent thread. With blocking=true the tool completes \
             when the subagent yields; otherwise it returns the thread id \
             immediately.",
            json!({
                "type": "object",
                "properties": {
                    "prompt": { "type": "string" },
                    "contextFiles": { "type": "array", "items": { "type": "string" } },
                    "agentType": { "type": "string", "enum": ["default", "fast", "explore"] },
                    "blocking": { "type": "boolean" }
                },
                "required": ["prompt"]
            }),
        ),
        ToolName::SpawnForeach => (
            "Spawn one subagent per input, sharing a prompt template.",
            json!({
                "type": "object",
                "properties": {
                    "prompt": { "type": "string", "description": "Template; each spawn appends its input" },
                    "inputs": { "type": "array", "items": { "type": "string" } },
                    "agentType": { "type": "string", "enum": ["default", "fast", "explore"] }
                },
                "required": ["prompt", "inputs"]
            }),
        ),
        ToolName::WaitForSubagents => (
            "Wait until every listed subagent thread reaches a terminal \
             state; returns an aggregated summary.",
            json!({
                "type": "object",
                "properties": {
                    "threadIds": { "type": "array", "items": { "type": "integer" } }
                },
                "required": ["threadIds"]
            }),
        ),
        ToolName::YieldToParent => (
            "Terminate this subagent and deliver `result` to the parent's \
             spawning tool call.",
            json!({
                "type": "object",
                "properties": {
                    "result": { "type": "string" }
                },
                "required": ["result"]
            }),
        ),
        ToolName::Compact => (
            "Replace the conversation up to the last checkpoint with a \
             summary, keeping listed context files attached.",
            json!({
                "type": "object",
                "properties": {
                    "summary": { "type": "string" },
                    "contextFiles": { "type": "array", "items": { "type": "string" } },
                    "continuation": { "type": "string" }
                },
                "required": ["summary"]
            }),
        ),
        ToolName::ThreadTitle => (
            "Set the title of this thread.",
            json!({
                "type": "object",
                "properties": {
                    "title": { "type": "string" }
                },
                "required": ["title"]
            }),
        ),
        ToolName::Mcp(_) => (
            "Dynamically discovered tool; input is forwarded verbatim.",
            json!({ "type": "object" }),
        ),
    };
    ToolSchema {
        name: name.as_str().to_string(),
        description: description.to_string(),
        input_schema,
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::NullMcpHost;

    #[test]
    fn root_threads_cannot_yield() {
        let tools = allowed_tools(ThreadType::Root);
        assert!(!tools.contains(&ToolName::YieldToParent));
        assert!(tools.contains(&ToolName::SpawnSubagent));
    }

    #[test]
    fn subagents_cannot_spawn_but_can_yield() {
        for t in [
            ThreadType::SubagentDefault,
            ThreadType::SubagentFast,
            ThreadType::SubagentExplore,
        ] {
            let tools = allowed_tools(t);
            assert!(!tools.contains(&ToolName::SpawnSubagent), "{t}");
            assert!(!tools.contains(&ToolName::WaitForSubagents), "{t}");
            assert!(tools.contains(&ToolName::YieldToParent), "{t}");
        }
    }

    #[test]
    fn fast_subagents_are_read_only() {
        let tools = allowed_tools(ThreadType::SubagentFast);
        assert!(!tools.contains(&ToolName::Insert));
        assert!(!tools.contains(&ToolName::BashCommand));
    }

    #[test]
    fn every_allowed_tool_has_a_schema() {
        for t in [
            ThreadType::Root,
            ThreadType::SubagentDefault,
            ThreadType::SubagentFast,
            ThreadType::SubagentExplore,
        ] {
            for name in allowed_tools(t) {
                let s = schema_for(&name);
                assert_eq!(s.name, name.as_str());
                assert!(!s.description.is_empty());
                assert!(s.input_schema.is_object());
            }
        }
    }

    #[test]
    fn tool_specs_without_mcp_matches_allowed_set() {
        let specs = tool_specs(ThreadType::SubagentFast, &NullMcpHost);
        assert_eq!(specs.len(), allowed_tools(ThreadType::SubagentFast).len());
    }
}
