// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use serde::Deserialize;
use walkdir::WalkDir;

use sidecar_provider::{ResultContent, ToolResultBlock};
use sidecar_view::Node;

use crate::executor::{
    aborted_result, glyph, parse_input, progress_result, ToolCtx, ToolExecutor, ToolMsg,
    ToolRequest,
};

/// Depth and entry bounds keep the tree listing a bounded context cost even
/// for enormous directories.
const MAX_DEPTH: usize = 3;
const MAX_ENTRIES: usize = 250;

#[derive(Debug, Deserialize)]
struct ListInput {
    path: String,
}

enum State {
    Processing,
    Done(ToolResultBlock),
}

/// Side-effect free; goes straight to `processing → done`.
pub struct ListDirectoryTool {
    request: ToolRequest,
    path: String,
    state: State,
}

impl ListDirectoryTool {
    pub fn new(request: ToolRequest, cx: &ToolCtx) -> Self {
        let input = match parse_input::<ListInput>(&request) {
            Ok(i) => i,
            Err(result) => {
                return Self {
                    request,
                    path: String::new(),
                    state: State::Done(result),
                }
            }
        };
        let abs = cx.resolve_path(std::path::Path::new(&input.path));
        let id = request.id.clone();
        let cx2 = cx.clone();
        tokio::spawn(async move {
            let outcome =
                tokio::task::spawn_blocking(move || render_tree(&abs))
                    .await
                    .unwrap_or_else(|e| Err(format!("listing panicked: {e}")));
            cx2.send_self(&id, ToolMsg::Finished(outcome));
        });
        Self {
            request,
            path: input.path,
            state: State::Processing,
        }
    }
}

fn render_tree(root: &std::path::Path) -> Result<Vec<ResultContent>, String> {
    if !root.is_dir() {
        return Err(format!("{} is not a directory", root.display()));
    }
    let mut out = format!("{}/\n", root.display());
    let mut entries = 0usize;
    let mut truncated = false;
    for entry in WalkDir::new(root)
        .min_depth(1)
        .max_depth(MAX_DEPTH)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !e.file_name().to_string_lossy().starts_with(".git"))
    {
        let entry = entry.map_err(|e| e.to_string())?;
        if entries >= MAX_ENTRIES {
            truncated = true;
            break;
        }
        entries += 1;
        let depth = entry.depth();
        let indent = "  ".repeat(depth);
        let name = entry.file_name().to_string_lossy();
        if entry.file_type().is_dir() {
            out.push_str(&format!("{indent}{name}/\n"));
        } else {
            out.push_str(&format!("{indent}{name}\n"));
        }
    }
    if truncated {
        out.push_str(&format!("… (truncated at {MAX_ENTRIES} entries)\n"));
    }
    Ok(vec![ResultContent::Text { text: out }])
}

impl ToolExecutor for ListDirectoryTool {
    fn request(&self) -> &ToolRequest {
        &self.request
    }

    fn is_done(&self) -> bool {
        matches!(self.state, State::Done(_))
    }

    fn is_pending_user_action(&self) -> bool {
        false
    }

    fn update(&mut self, msg: ToolMsg, _cx: &ToolCtx) {
        if matches!(self.state, State::Done(_)) {
            return;
        }
        match msg {
            ToolMsg::Finished(Ok(content)) => {
                self.state = State::Done(ToolResultBlock::with_content(
                    self.request.id.clone(),
                    content,
                ))
            }
            ToolMsg::Finished(Err(e)) => {
                self.state = State::Done(ToolResultBlock::err(self.request.id.clone(), e))
            }
            _ => {}
        }
    }

    fn abort(&mut self) -> ToolResultBlock {
        if let State::Done(r) = &self.state {
            return r.clone();
        }
        let r = aborted_result(&self.request.id);
        self.state = State::Done(r.clone());
        r
    }

    fn tool_result(&self) -> ToolResultBlock {
        match &self.state {
            State::Done(r) => r.clone(),
            State::Processing => progress_result(&self.request.id, "Listing directory."),
        }
    }

    fn render_summary(&self) -> Node {
        let g = match &self.state {
            State::Processing => glyph::PROCESSING,
            State::Done(r) if r.is_error => glyph::ERROR,
            State::Done(_) => glyph::SUCCESS,
        };
        Node::text(format!("{g} List `{}`", self.path))
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
