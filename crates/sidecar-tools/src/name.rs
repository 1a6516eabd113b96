// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use serde::{Deserialize, Serialize};

/// Prefix that namespaces dynamically discovered MCP tools.
pub const MCP_PREFIX: &str = "mcp_";

/// The static tool registry plus the opaque MCP passthrough.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ToolName {
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
    YieldToParent,
    Compact,
    ThreadTitle,
    /// A dynamically discovered tool; the full `mcp_`-prefixed name is kept
    /// opaque and forwarded verbatim.
    Mcp(String),
}

impl ToolName {
    pub fn as_str(&self) -> &str {
        match self {
            ToolName::GetFile => "get_file",
            ToolName::ListDirectory => "list_directory",
            ToolName::Hover => "hover",
            ToolName::FindReferences => "find_references",
            ToolName::Diagnostics => "diagnostics",
            ToolName::BashCommand => "bash_command",
            ToolName::Insert => "insert",
            ToolName::Replace => "replace",
            ToolName::InlineEdit => "inline_edit",
            ToolName::ReplaceSelection => "replace_selection",
            ToolName::Edl => "edl",
            ToolName::SpawnSubagent => "spawn_subagent",
            ToolName::SpawnForeach => "spawn_foreach",
            ToolName::WaitForSubagents => "wait_for_subagents",
            ToolName::YieldToParent => "yield_to_parent",
            ToolName::Compact => "compact",
            ToolName::ThreadTitle => "thread_title",
            ToolName::Mcp(name) => name,
        }
    }

    /// Parse a wire name.  Unknown names are accepted only under the MCP
    /// prefix; anything else is rejected so a mistyped static tool becomes
    /// an immediate input error rather than a silent passthrough.
    pub fn parse(name: &str) -> Option<ToolName> {
        let t = match name {
            "get_file" => ToolName::GetFile,
            "list_directory" => ToolName::ListDirectory,
            "hover" => ToolName::Hover,
            "find_references" => ToolName::FindReferences,
            "diagnostics" => ToolName::Diagnostics,
            "bash_command" => ToolName::BashCommand,
            "insert" => ToolName::Insert,
            "replace" => ToolName::Replace,
            "inline_edit" => ToolName::InlineEdit,
            "replace_selection" => ToolName::ReplaceSelection,
            "edl" => ToolName::Edl,
            "spawn_subagent" => ToolName::SpawnSubagent,
            "spawn_foreach" => ToolName::SpawnForeach,
            "wait_for_subagents" => ToolName::WaitForSubagents,
            "yield_to_parent" => ToolName::YieldToParent,
            "compact" => ToolName::Compact,
            "thread_title" => ToolName::ThreadTitle,
            other if other.starts_with(MCP_PREFIX) => ToolName::Mcp(other.to_string()),
            _ => return None,
        };
        Some(t)
    }
}

impl std::fmt::Display for ToolName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
