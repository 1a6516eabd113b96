// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::pos::Pos;

/// Handle to a buffer owned by the host editor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BufferId(pub u64);

/// Handle to a position-tracking annotation allocated by the host editor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExtmarkId(pub u64);

impl std::fmt::Display for BufferId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "buf#{}", self.0)
    }
}

/// Presentation options attached to an extmark range.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtmarkOptions {
    pub hl_group: Option<String>,
    pub line_hl_group: Option<String>,
    pub priority: Option<u16>,
    pub sign_text: Option<String>,
    pub sign_hl_group: Option<String>,
}

impl ExtmarkOptions {
    pub fn highlight(group: impl Into<String>) -> Self {
        Self {
            hl_group: Some(group.into()),
            ..Default::default()
        }
    }
}

/// The buffer/window surface the core consumes from the host editor.
///
/// Concrete implementations (an RPC bridge, or [`crate::MockEditor`] in
/// tests) are the only suspension points for buffer I/O; everything above
/// this trait is synchronous math.
#[async_trait]
pub trait Editor: Send + Sync {
    /// Lines `[start_row, end_row)`; `end_row = -1` means end-of-buffer.
    async fn get_lines(
        &self,
        buffer: BufferId,
        start_row: i64,
        end_row: i64,
    ) -> anyhow::Result<Vec<String>>;

    /// Atomic replace of the byte range `[start, end)` with `lines`.
    /// The buffer is made modifiable for the duration of the write and
    /// restored afterwards.
    async fn set_text(
        &self,
        buffer: BufferId,
        start: Pos,
        end: Pos,
        lines: &[String],
    ) -> anyhow::Result<()>;

    async fn create_extmark(
        &self,
        buffer: BufferId,
        start: Pos,
        end: Pos,
        opts: &ExtmarkOptions,
    ) -> anyhow::Result<ExtmarkId>;

    async fn update_extmark(
        &self,
        buffer: BufferId,
        id: ExtmarkId,
        start: Pos,
        end: Pos,
        opts: &ExtmarkOptions,
    ) -> anyhow::Result<()>;

    async fn delete_extmark(&self, buffer: BufferId, id: ExtmarkId) -> anyhow::Result<()>;

    async fn buffer_is_valid(&self, buffer: BufferId) -> anyhow::Result<bool>;

    /// Create a scratch buffer (the conversation sidebar).
    async fn create_buffer(&self, name: &str) -> anyhow::Result<BufferId>;

    /// The buffer, if any, that currently displays `path`.
    async fn buffer_for_path(&self, path: &Path) -> anyhow::Result<Option<BufferId>>;

    /// Whether the buffer has unsaved modifications.
    async fn buffer_is_modified(&self, buffer: BufferId) -> anyhow::Result<bool>;

    /// Buffer under the cursor in the current window.
    async fn current_buffer(&self) -> anyhow::Result<BufferId>;

    /// Cursor of the current window, 0-indexed with a byte column.
    async fn cursor(&self) -> anyhow::Result<Pos>;

    /// The active visual selection, if any: buffer plus endpoints.  Column
    /// endpoints are clamped to line length by the implementation.
    async fn visual_selection(&self) -> anyhow::Result<Option<(BufferId, Pos, Pos)>>;
}

/// A single diagnostic from the editor's diagnostic store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnostic {
    pub path: PathBuf,
    pub pos: Pos,
    pub severity: DiagnosticSeverity,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticSeverity {
    Error,
    Warn,
    Info,
    Hint,
}

impl std::fmt::Display for DiagnosticSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DiagnosticSeverity::Error => "ERROR",
            DiagnosticSeverity::Warn => "WARN",
            DiagnosticSeverity::Info => "INFO",
            DiagnosticSeverity::Hint => "HINT",
        };
        f.write_str(s)
    }
}

/// Interface to the language-server bridge.  The concrete bridge lives with
/// the host; the core only consumes these three calls.
#[async_trait]
pub trait LspBridge: Send + Sync {
    async fn hover(&self, path: &Path, pos: Pos) -> anyhow::Result<String>;
    async fn find_references(&self, path: &Path, pos: Pos) -> anyhow::Result<String>;
    async fn diagnostics(&self) -> anyhow::Result<Vec<Diagnostic>>;
}

/// Bridge used when no language server is wired up.
pub struct NullLspBridge;

#[async_trait]
impl LspBridge for NullLspBridge {
    async fn hover(&self, _path: &Path, _pos: Pos) -> anyhow::Result<String> {
        anyhow::bail!("no language server attached")
    }
    async fn find_references(&self, _path: &Path, _pos: Pos) -> anyhow::Result<String> {
        anyhow::bail!("no language server attached")
    }
    async fn diagnostics(&self) -> anyhow::Result<Vec<Diagnostic>> {
        Ok(Vec::new())
    }
}
