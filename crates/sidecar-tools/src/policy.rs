// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::{Path, PathBuf};

use regex::Regex;
use tracing::warn;

use sidecar_config::{CommandConfig, Config};

/// Decision for one `bash_command` invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandDecision {
    /// Run without asking.
    Auto,
    /// Ask the user before running.
    Ask,
    /// Never run; return an error result.
    Deny,
}

/// Maps a command string to an approval decision from the config's
/// allow/deny globs.  Deny wins; a command matching neither list asks.
#[derive(Debug, Default)]
pub struct CommandPolicy {
    allow: Vec<Regex>,
    deny: Vec<Regex>,
}

impl CommandPolicy {
    pub fn from_config(cfg: &CommandConfig) -> Self {
        let compile = |patterns: &[String]| -> Vec<Regex> {
            patterns.iter().filter_map(|p| glob_to_regex(p)).collect()
        };
        Self {
            allow: compile(&cfg.allow),
            deny: compile(&cfg.deny),
        }
    }

    pub fn decide(&self, command: &str) -> CommandDecision {
        for re in &self.deny {
            if re.is_match(command) {
                return CommandDecision::Deny;
            }
        }
        for re in &self.allow {
            if re.is_match(command) {
                return CommandDecision::Auto;
            }
        }
        CommandDecision::Ask
    }
}

/// Convert a simple shell glob pattern to a [`Regex`].
/// Only `*` (match anything) and `?` (match one char) are supported.
fn glob_to_regex(pattern: &str) -> Option<Regex> {
    let mut re = String::from("^");
    for ch in pattern.chars() {
        match ch {
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            c => {
                for esc in regex::escape(&c.to_string()).chars() {
                    re.push(esc);
                }
            }
        }
    }
    re.push('$');
    Regex::new(&re).ok()
}

/// Read/write permission policy for file-touching tools.
///
/// Reads are auto-allowed for files matching the configured globs, files
/// under a skills path, and files inside the project root that the VCS
/// would track (not gitignored).  Writes are auto-allowed only for
/// trackable files inside the project root.  Everything else prompts.
pub struct FilePolicy {
    auto_allow: Vec<glob::Pattern>,
    skills_paths: Vec<PathBuf>,
    project_root: PathBuf,
    gitignore: ignore::gitignore::Gitignore,
}

impl FilePolicy {
    pub fn new(config: &Config, project_root: &Path) -> Self {
        let auto_allow = config
            .get_file_auto_allow_globs
            .iter()
            .filter_map(|g| match glob::Pattern::new(g) {
                Ok(p) => Some(p),
                Err(e) => {
                    warn!(glob = %g, error = %e, "ignoring unparseable auto-allow glob");
                    None
                }
            })
            .collect();

        let mut builder = ignore::gitignore::GitignoreBuilder::new(project_root);
        builder.add(project_root.join(".gitignore"));
        let gitignore = builder
            .build()
            .unwrap_or_else(|_| ignore::gitignore::Gitignore::empty());

        Self {
            auto_allow,
            skills_paths: config.skills_paths.clone(),
            project_root: project_root.to_path_buf(),
            gitignore,
        }
    }

    fn in_project_root(&self, abs: &Path) -> bool {
        abs.starts_with(&self.project_root)
    }

    fn is_ignored(&self, abs: &Path) -> bool {
        self.gitignore
            .matched_path_or_any_parents(abs, false)
            .is_ignore()
    }

    /// Whether `get_file` may read `abs` without prompting.
    pub fn can_read_auto(&self, abs: &Path) -> bool {
        let rel = abs
            .strip_prefix(&self.project_root)
            .unwrap_or(abs)
            .to_path_buf();
        if self.auto_allow.iter().any(|p| p.matches_path(&rel)) {
            return true;
        }
        if self.skills_paths.iter().any(|s| abs.starts_with(s)) {
            return true;
        }
        self.in_project_root(abs) && !self.is_ignored(abs)
    }

    /// Whether write-capable tools may modify `abs` without prompting.
    pub fn can_write_auto(&self, abs: &Path) -> bool {
        self.in_project_root(abs) && !self.is_ignored(abs)
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
