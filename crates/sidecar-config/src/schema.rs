// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

fn default_display_width() -> usize {
    100
}

fn default_bash_timeout_secs() -> u64 {
    300
}

fn default_max_file_size_bytes() -> u64 {
    10 * 1024 * 1024
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Named provider/model profiles selectable per thread.
    ///
    /// ```yaml
    /// profiles:
    ///   - name: default
    ///     provider: anthropic
    ///     model: claude-opus-4-5
    ///   - name: fast
    ///     provider: anthropic
    ///     model: claude-haiku-4-5
    /// active_profile: default
    /// ```
    #[serde(default)]
    pub profiles: Vec<ProfileConfig>,
    #[serde(default)]
    pub active_profile: String,
    #[serde(default)]
    pub command: CommandConfig,
    /// Globs (relative to the project root) that `get_file` may read without
    /// asking the user, e.g. `["**/*.md", "doc/**"]`.
    #[serde(default)]
    pub get_file_auto_allow_globs: Vec<String>,
    /// Directories whose files are always auto-allowed for reads.
    /// `~` and `$VAR` are expanded by the loader.
    #[serde(default)]
    pub skills_paths: Vec<PathBuf>,
    /// MCP server descriptors keyed by server name.  Opaque to the core:
    /// the host discovers tools and the core only routes `mcp_`-prefixed
    /// calls through verbatim.
    #[serde(default)]
    pub mcp_servers: HashMap<String, serde_yaml::Value>,
    /// Editor display width used to truncate one-line tool previews.
    #[serde(default = "default_display_width")]
    pub display_width: usize,
    /// Hard wall-clock timeout for `bash_command`, in seconds.
    #[serde(default = "default_bash_timeout_secs")]
    pub bash_timeout_secs: u64,
    /// `get_file` rejects files larger than this.
    #[serde(default = "default_max_file_size_bytes")]
    pub max_file_size_bytes: u64,
}

impl Config {
    /// Resolve the active profile, falling back to the first configured one.
    pub fn active_profile(&self) -> Option<&ProfileConfig> {
        self.profiles
            .iter()
            .find(|p| p.name == self.active_profile)
            .or_else(|| self.profiles.first())
    }

    pub fn profile(&self, name: &str) -> Option<&ProfileConfig> {
        self.profiles.iter().find(|p| p.name == name)
    }
}

/// One selectable provider/model pairing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProfileConfig {
    pub name: String,
    /// Provider identifier, e.g. "anthropic" | "openai" | "mock".
    /// Wire adapters register themselves under these names at bootstrap.
    pub provider: String,
    /// Model name forwarded to the provider API.
    pub model: String,
    /// Environment variable holding the API key (read by the adapter).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

/// Allow/deny rules for `bash_command`.
///
/// Patterns are simple shell globs (`*` matches anything, `?` one char)
/// matched against the full command string.  Deny wins over allow; a
/// command matching neither list prompts the user.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommandConfig {
    #[serde(default)]
    pub allow: Vec<String>,
    #[serde(default)]
    pub deny: Vec<String>,
}

/// The conversation kinds a thread can have.  Determines the system prompt
/// and the allowed toolset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreadType {
    Root,
    SubagentDefault,
    SubagentFast,
    SubagentExplore,
}

impl ThreadType {
    pub fn is_subagent(self) -> bool {
        !matches!(self, ThreadType::Root)
    }
}

impl std::fmt::Display for ThreadType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ThreadType::Root => "root",
            ThreadType::SubagentDefault => "subagent_default",
            ThreadType::SubagentFast => "subagent_fast",
            ThreadType::SubagentExplore => "subagent_explore",
        };
        f.write_str(s)
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
