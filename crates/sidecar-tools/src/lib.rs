// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Tool executors for the sidecar core: the common lifecycle framework
//! (pending → approval → processing → done, with abort and timeout
//! semantics), the permission policy engine, the static tool catalogue,
//! the MCP passthrough, and the per-thread [`ToolManager`].

pub mod builtin;
mod executor;
mod manager;
mod name;
mod policy;
mod spec;
pub mod testing;
mod util;

pub use executor::{
    aborted_result, glyph, parse_input, progress_result, AttachedFile, McpHost, NullMcpHost,
    OutputStream, SubagentOutcome, ThreadPoll, ToolCtx, ToolDispatch, ToolEffectMsg, ToolEnv,
    ToolExecutor, ToolMsg, ToolRequest,
};
pub use manager::{create_executor, ToolManager};
pub use name::{ToolName, MCP_PREFIX};
pub use policy::{CommandDecision, CommandPolicy, FilePolicy};
pub use spec::{allowed_tools, schema_for, tool_specs};
pub use util::{approx_tokens, line_delta, strip_ansi, symbol_pos, truncate_preview};
