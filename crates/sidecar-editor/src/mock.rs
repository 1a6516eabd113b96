// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Deterministic in-memory editor for tests.  Implements the full
//! [`Editor`] trait over line vectors and an extmark table, and records
//! enough state for assertions (buffer text, live extmark set, cursor).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::buffer::{BufferId, Editor, ExtmarkId, ExtmarkOptions};
use crate::pos::Pos;

#[derive(Debug, Clone)]
pub struct MockExtmark {
    pub buffer: BufferId,
    pub start: Pos,
    pub end: Pos,
    pub opts: ExtmarkOptions,
}

#[derive(Debug)]
struct MockBuffer {
    lines: Vec<String>,
    valid: bool,
    modified: bool,
}

#[derive(Default)]
struct Inner {
    buffers: HashMap<BufferId, MockBuffer>,
    paths: HashMap<PathBuf, BufferId>,
    extmarks: HashMap<ExtmarkId, MockExtmark>,
    next_buffer: u64,
    next_extmark: u64,
    current: Option<BufferId>,
    cursor: Pos,
    selection: Option<(BufferId, Pos, Pos)>,
}

#[derive(Default)]
pub struct MockEditor {
    inner: Mutex<Inner>,
}

impl MockEditor {
    pub fn new() -> Self {
        Self::default()
    }

    fn alloc_buffer(inner: &mut Inner, lines: Vec<String>) -> BufferId {
        inner.next_buffer += 1;
        let id = BufferId(inner.next_buffer);
        inner.buffers.insert(
            id,
            MockBuffer {
                lines,
                valid: true,
                modified: false,
            },
        );
        if inner.current.is_none() {
            inner.current = Some(id);
        }
        id
    }

    /// Open `path` as a loaded buffer with the given content.
    pub fn open_file(&self, path: impl Into<PathBuf>, text: &str) -> BufferId {
        let mut inner = self.inner.lock().unwrap();
        let lines = text.split('\n').map(str::to_string).collect();
        let id = Self::alloc_buffer(&mut inner, lines);
        inner.paths.insert(path.into(), id);
        id
    }

    /// Full buffer text joined with newlines.
    pub fn text(&self, buffer: BufferId) -> String {
        let inner = self.inner.lock().unwrap();
        inner.buffers[&buffer].lines.join("\n")
    }

    pub fn set_cursor(&self, pos: Pos) {
        self.inner.lock().unwrap().cursor = pos;
    }

    pub fn set_current_buffer(&self, buffer: BufferId) {
        self.inner.lock().unwrap().current = Some(buffer);
    }

    pub fn set_selection(&self, buffer: BufferId, start: Pos, end: Pos) {
        self.inner.lock().unwrap().selection = Some((buffer, start, end));
    }

    pub fn mark_modified(&self, buffer: BufferId) {
        if let Some(b) = self.inner.lock().unwrap().buffers.get_mut(&buffer) {
            b.modified = true;
        }
    }

    pub fn invalidate(&self, buffer: BufferId) {
        if let Some(b) = self.inner.lock().unwrap().buffers.get_mut(&buffer) {
            b.valid = false;
        }
    }

    pub fn extmark_count(&self) -> usize {
        self.inner.lock().unwrap().extmarks.len()
    }

    pub fn extmark(&self, id: ExtmarkId) -> Option<MockExtmark> {
        self.inner.lock().unwrap().extmarks.get(&id).cloned()
    }
}

#[async_trait]
impl Editor for MockEditor {
    async fn get_lines(
        &self,
        buffer: BufferId,
        start_row: i64,
        end_row: i64,
    ) -> anyhow::Result<Vec<String>> {
        let inner = self.inner.lock().unwrap();
        let buf = inner
            .buffers
            .get(&buffer)
            .ok_or_else(|| anyhow::anyhow!("unknown buffer {buffer}"))?;
        let len = buf.lines.len() as i64;
        let end = if end_row < 0 { len } else { end_row.min(len) };
        let start = start_row.clamp(0, len);
        Ok(buf.lines[start as usize..end.max(start) as usize].to_vec())
    }

    async fn set_text(
        &self,
        buffer: BufferId,
        start: Pos,
        end: Pos,
        lines: &[String],
    ) -> anyhow::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let buf = inner
            .buffers
            .get_mut(&buffer)
            .ok_or_else(|| anyhow::anyhow!("unknown buffer {buffer}"))?;
        anyhow::ensure!(buf.valid, "buffer {buffer} is not valid");
        anyhow::ensure!(
            (end.row as usize) < buf.lines.len(),
            "set_text end row {} out of range ({} lines)",
            end.row,
            buf.lines.len()
        );
        anyhow::ensure!(start <= end, "set_text start {start} after end {end}");

        let prefix = buf.lines[start.row as usize][..start.col as usize].to_string();
        let suffix = buf.lines[end.row as usize][end.col as usize..].to_string();

        let replacement: Vec<String> = if lines.is_empty() {
            vec![format!("{prefix}{suffix}")]
        } else if lines.len() == 1 {
            vec![format!("{}{}{}", prefix, lines[0], suffix)]
        } else {
            let mut out = Vec::with_capacity(lines.len());
            out.push(format!("{}{}", prefix, lines[0]));
            out.extend(lines[1..lines.len() - 1].iter().cloned());
            out.push(format!("{}{}", lines[lines.len() - 1], suffix));
            out
        };

        buf.lines
            .splice(start.row as usize..=end.row as usize, replacement);
        Ok(())
    }

    async fn create_extmark(
        &self,
        buffer: BufferId,
        start: Pos,
        end: Pos,
        opts: &ExtmarkOptions,
    ) -> anyhow::Result<ExtmarkId> {
        let mut inner = self.inner.lock().unwrap();
        inner.next_extmark += 1;
        let id = ExtmarkId(inner.next_extmark);
        inner.extmarks.insert(
            id,
            MockExtmark {
                buffer,
                start,
                end,
                opts: opts.clone(),
            },
        );
        Ok(id)
    }

    async fn update_extmark(
        &self,
        buffer: BufferId,
        id: ExtmarkId,
        start: Pos,
        end: Pos,
        opts: &ExtmarkOptions,
    ) -> anyhow::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let mark = inner
            .extmarks
            .get_mut(&id)
            .ok_or_else(|| anyhow::anyhow!("unknown extmark {id:?}"))?;
        mark.buffer = buffer;
        mark.start = start;
        mark.end = end;
        mark.opts = opts.clone();
        Ok(())
    }

    async fn delete_extmark(&self, _buffer: BufferId, id: ExtmarkId) -> anyhow::Result<()> {
        self.inner.lock().unwrap().extmarks.remove(&id);
        Ok(())
    }

    async fn buffer_is_valid(&self, buffer: BufferId) -> anyhow::Result<bool> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.buffers.get(&buffer).map(|b| b.valid).unwrap_or(false))
    }

    async fn create_buffer(&self, _name: &str) -> anyhow::Result<BufferId> {
        let mut inner = self.inner.lock().unwrap();
        Ok(Self::alloc_buffer(&mut inner, vec![String::new()]))
    }

    async fn buffer_for_path(&self, path: &Path) -> anyhow::Result<Option<BufferId>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.paths.get(path).copied())
    }

    async fn buffer_is_modified(&self, buffer: BufferId) -> anyhow::Result<bool> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .buffers
            .get(&buffer)
            .map(|b| b.modified)
            .unwrap_or(false))
    }

    async fn current_buffer(&self) -> anyhow::Result<BufferId> {
        let inner = self.inner.lock().unwrap();
        inner
            .current
            .ok_or_else(|| anyhow::anyhow!("no current buffer"))
    }

    async fn cursor(&self) -> anyhow::Result<Pos> {
        Ok(self.inner.lock().unwrap().cursor)
    }

    async fn visual_selection(&self) -> anyhow::Result<Option<(BufferId, Pos, Pos)>> {
        Ok(self.inner.lock().unwrap().selection)
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
