// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;

use sidecar_editor::Pos;

/// Strip ANSI escape sequences (CSI and OSC) from process output.
pub fn strip_ansi(s: &str) -> String {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"\x1b(\[[0-9;?]*[ -/]*[@-~]|\][^\x07\x1b]*(\x07|\x1b\\))").expect("static regex")
    });
    re.replace_all(s, "").into_owned()
}

/// 4-chars-per-token estimate used wherever output must fit a token budget.
pub fn approx_tokens(s: &str) -> usize {
    s.len() / 4
}

/// Locate `symbol` in `content` for LSP requests: the position of the first
/// occurrence, pointing at the rightmost character so dotted paths resolve
/// to their final segment.
pub fn symbol_pos(content: &str, symbol: &str) -> Option<Pos> {
    if symbol.is_empty() {
        return None;
    }
    let byte_off = content.find(symbol)?;
    let last_char_off = byte_off + symbol.len() - symbol.chars().last().map(char::len_utf8)?;
    let before = &content[..last_char_off];
    let row = before.matches('\n').count() as u32;
    let col = match before.rfind('\n') {
        Some(nl) => (last_char_off - nl - 1) as u32,
        None => last_char_off as u32,
    };
    Some(Pos::new(row, col))
}

/// Count the lines a tool edit removes and adds, for the `[[ -N / +M ]]`
/// summary decoration.
pub fn line_delta(removed: &str, added: &str) -> (usize, usize) {
    let count = |s: &str| {
        if s.is_empty() {
            0
        } else {
            s.matches('\n').count() + 1
        }
    };
    (count(removed), count(added))
}

/// Unified diff of an edit, written next to the tool's other artifacts so
/// the user can inspect exactly what changed on disk.
pub fn unified_diff(old: &str, new: &str, path: &Path) -> String {
    let diff = similar::TextDiff::from_lines(old, new);
    let name = path.display().to_string();
    diff.unified_diff()
        .context_radius(3)
        .header(&format!("a/{name}"), &format!("b/{name}"))
        .to_string()
}

/// Truncate a one-line preview to the configured display width.
pub fn truncate_preview(s: &str, width: usize) -> String {
    if s.chars().count() <= width {
        return s.to_string();
    }
    let mut out: String = s.chars().take(width.saturating_sub(1)).collect();
    out.push('…');
    out
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
