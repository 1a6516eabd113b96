// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Per-thread context manager: the set of files attached to the
//! conversation, with PDF page tracking and mtime-based change detection.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use sidecar_tools::AttachedFile;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Text,
    Image,
    Pdf,
    Other,
}

#[derive(Debug, Clone)]
pub struct ContextEntry {
    pub abs_path: PathBuf,
    pub kind: FileKind,
    /// For PDFs: which pages the agent has fetched.
    pub pages: BTreeSet<u32>,
    /// PDF attached as descriptor only (no full content in context).
    pub summary_only: bool,
    pub mtime_seen: Option<SystemTime>,
}

/// The files/images/PDFs attached to one conversation.  Owned by exactly
/// one thread.
#[derive(Debug, Default)]
pub struct ContextManager {
    files: HashMap<PathBuf, ContextEntry>,
}

impl ContextManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, rel_path: &Path) -> bool {
        self.files.contains_key(rel_path)
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Attach a file, or for PDFs union the fetched page into the entry.
    pub fn add_file(
        &mut self,
        rel_path: PathBuf,
        abs_path: PathBuf,
        pdf_page: Option<u32>,
        summary_only: bool,
    ) {
        let kind = kind_of(&abs_path, pdf_page.is_some() || summary_only);
        let mtime = std::fs::metadata(&abs_path)
            .and_then(|m| m.modified())
            .ok();
        let entry = self.files.entry(rel_path).or_insert_with(|| ContextEntry {
            abs_path,
            kind,
            pages: BTreeSet::new(),
            summary_only,
            mtime_seen: None,
        });
        entry.mtime_seen = mtime;
        if let Some(page) = pdf_page {
            entry.pages.insert(page);
            entry.summary_only = false;
            entry.kind = FileKind::Pdf;
        }
        if summary_only && entry.pages.is_empty() {
            entry.summary_only = true;
            entry.kind = FileKind::Pdf;
        }
    }

    /// Snapshot consumed by `get_file`'s already-attached check.
    pub fn attached_snapshot(&self) -> HashMap<PathBuf, AttachedFile> {
        self.files
            .iter()
            .map(|(rel, entry)| {
                (
                    rel.clone(),
                    AttachedFile {
                        pdf_pages: (entry.kind == FileKind::Pdf).then(|| entry.pages.clone()),
                        summary_only: entry.summary_only && entry.pages.is_empty(),
                    },
                )
            })
            .collect()
    }

    /// The context listing appended to outgoing user messages:
    ///
    /// ```text
    /// Files in context:
    /// - `src/main.rs`
    /// - `multipage.pdf` (summary, pages 1-3, 5)
    /// ```
    pub fn listing(&self) -> Option<String> {
        if self.files.is_empty() {
            return None;
        }
        let mut paths: Vec<&PathBuf> = self.files.keys().collect();
        paths.sort();
        let mut out = String::from("Files in context:\n");
        for rel in paths {
            let entry = &self.files[rel];
            out.push_str(&format!("- `{}`", rel.display()));
            if entry.kind == FileKind::Pdf {
                let mut attrs = Vec::new();
                attrs.push("summary".to_string());
                if !entry.pages.is_empty() {
                    attrs.push(page_ranges(&entry.pages));
                }
                out.push_str(&format!(" ({})", attrs.join(", ")));
            }
            out.push('\n');
        }
        Some(out)
    }

    /// Files whose on-disk mtime moved past the one recorded at attach
    /// time.  The caller turns these into a change-notice reminder.
    pub fn changed_files(&self) -> Vec<PathBuf> {
        let mut changed: Vec<PathBuf> = self
            .files
            .iter()
            .filter(|(_, entry)| {
                let Some(seen) = entry.mtime_seen else {
                    return false;
                };
                match std::fs::metadata(&entry.abs_path).and_then(|m| m.modified()) {
                    Ok(now) => now > seen,
                    Err(_) => true,
                }
            })
            .map(|(rel, _)| rel.clone())
            .collect();
        changed.sort();
        changed
    }

    /// Union another set of files into this context (compaction keeps the
    /// survivors attached).
    pub fn union_paths(&mut self, rel_paths: &[PathBuf], project_root: &Path) {
        for rel in rel_paths {
            if !self.contains(rel) {
                self.add_file(rel.clone(), project_root.join(rel), None, false);
            }
        }
    }
}

fn kind_of(path: &Path, pdf_hint: bool) -> FileKind {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("pdf") => FileKind::Pdf,
        Some("png" | "jpg" | "jpeg" | "gif" | "webp" | "bmp") => FileKind::Image,
        _ if pdf_hint => FileKind::Pdf,
        _ => FileKind::Text,
    }
}

/// Collapse a sorted page set into `1-3, 5` form; a single page renders as
/// `page 2`, several as `pages 1-3, 5`.
fn page_ranges(pages: &BTreeSet<u32>) -> String {
    let mut ranges: Vec<(u32, u32)> = Vec::new();
    for &p in pages {
        match ranges.last_mut() {
            Some((_, end)) if *end + 1 == p => *end = p,
            _ => ranges.push((p, p)),
        }
    }
    let body = ranges
        .iter()
        .map(|(a, b)| {
            if a == b {
                a.to_string()
            } else {
                format!("{a}-{b}")
            }
        })
        .collect::<Vec<_>>()
        .join(", ");
    if pages.len() == 1 {
        format!("page {body}")
    } else {
        format!("pages {body}")
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
