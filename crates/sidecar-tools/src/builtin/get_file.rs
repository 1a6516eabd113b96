// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! `get_file`: read a file into the conversation context.  Text files are
//! returned whole, PDFs as a descriptor (or a single page as a binary
//! document part), images as binary parts.  Reads are auto-allowed by
//! policy or gated behind a user prompt.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use sidecar_provider::{ResultContent, ToolResultBlock};
use sidecar_view::{Action, Node};

use crate::executor::{
    aborted_result, glyph, parse_input, progress_result, ToolCtx, ToolEffectMsg, ToolExecutor,
    ToolMsg, ToolRequest,
};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GetFileInput {
    file_path: String,
    pdf_page: Option<u32>,
    #[serde(default)]
    force: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileCategory {
    Text,
    Image,
    Pdf,
    Other,
}

pub fn categorize(path: &Path) -> FileCategory {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("pdf") => FileCategory::Pdf,
        Some("png" | "jpg" | "jpeg" | "gif" | "webp" | "bmp") => FileCategory::Image,
        Some(_) | None => FileCategory::Text,
    }
}

/// Count page objects in a raw PDF: `/Type /Page` entries that are not
/// `/Type /Pages` (the page-tree nodes).
pub fn count_pdf_pages(bytes: &[u8]) -> usize {
    let mut count = 0;
    for marker in [&b"/Type /Page"[..], &b"/Type/Page"[..]] {
        let mut at = 0;
        while let Some(i) = find_from(bytes, marker, at) {
            let after = i + marker.len();
            if bytes.get(after) != Some(&b's') {
                count += 1;
            }
            at = after;
        }
    }
    count
}

fn find_from(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if from >= haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|i| i + from)
}

enum State {
    PendingUserAction,
    Processing,
    Done(ToolResultBlock),
}

pub struct GetFileTool {
    request: ToolRequest,
    input: Option<GetFileInput>,
    abs_path: PathBuf,
    state: State,
    cx: ToolCtx,
}

impl GetFileTool {
    pub fn new(request: ToolRequest, cx: &ToolCtx) -> Self {
        let input = match parse_input::<GetFileInput>(&request) {
            Ok(i) => i,
            Err(result) => {
                return Self {
                    request,
                    input: None,
                    abs_path: PathBuf::new(),
                    state: State::Done(result),
                    cx: cx.clone(),
                }
            }
        };
        let abs_path = cx.resolve_path(Path::new(&input.file_path));
        let rel = cx.rel_path(&abs_path);

        // Already attached and not forced: short notice instead of a re-read.
        if !input.force && input.pdf_page.is_none() {
            if let Some(attached) = cx.attached.get(&rel) {
                let notice = if attached.summary_only {
                    format!(
                        "`{}` is already in context (summary). Pass pdfPage to fetch a page \
                         or force to re-read.",
                        input.file_path
                    )
                } else {
                    format!(
                        "`{}` is already in context. Pass force to re-read.",
                        input.file_path
                    )
                };
                return Self {
                    request: request.clone(),
                    input: Some(input),
                    abs_path,
                    state: State::Done(ToolResultBlock::ok(request.id, notice)),
                    cx: cx.clone(),
                };
            }
        }

        let mut tool = Self {
            request,
            input: Some(input),
            abs_path,
            state: State::PendingUserAction,
            cx: cx.clone(),
        };
        if cx.env.file_policy.can_read_auto(&tool.abs_path) {
            tool.start();
        }
        tool
    }

    fn start(&mut self) {
        self.state = State::Processing;
        let input = self.input.clone().expect("validated in new");
        let abs = self.abs_path.clone();
        let id = self.request.id.clone();
        let cx = self.cx.clone();
        let max_bytes = cx.env.config.max_file_size_bytes;
        tokio::spawn(async move {
            let outcome = read_file(&cx, &abs, &input, max_bytes).await;
            cx.send_self(&id, ToolMsg::Finished(outcome));
        });
    }

    fn file_label(&self) -> String {
        self.input
            .as_ref()
            .map(|i| i.file_path.clone())
            .unwrap_or_default()
    }

    fn approval_bindings(&self, node: Node) -> Node {
        let approve = |approved: bool| {
            let cx = self.cx.clone();
            let tid = cx.thread_id;
            let rid = self.request.id.clone();
            Action::new(move || {
                cx.env.dispatch.send(ToolEffectMsg::Tool {
                    thread_id: tid,
                    request_id: rid.clone(),
                    msg: ToolMsg::UserApproval {
                        approved,
                        remember: false,
                    },
                });
            })
        };
        node.with_binding("n", approve(false))
            .with_binding("y", approve(true))
    }
}

async fn read_file(
    cx: &ToolCtx,
    abs: &Path,
    input: &GetFileInput,
    max_bytes: u64,
) -> Result<Vec<ResultContent>, String> {
    let meta = tokio::fs::metadata(abs)
        .await
        .map_err(|e| format!("cannot read {}: {e}", abs.display()))?;
    if !meta.is_file() {
        return Err(format!("{} is not a file", abs.display()));
    }
    if meta.len() > max_bytes {
        return Err(format!(
            "{} is {} bytes, larger than the {} byte limit",
            abs.display(),
            meta.len(),
            max_bytes
        ));
    }

    let rel = cx.rel_path(abs);
    let file_name = abs
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| abs.display().to_string());

    match categorize(abs) {
        FileCategory::Pdf => {
            let bytes = tokio::fs::read(abs).await.map_err(|e| e.to_string())?;
            let pages = count_pdf_pages(&bytes);
            match input.pdf_page {
                None => {
                    cx.env.dispatch.send(ToolEffectMsg::AddFileToContext {
                        thread_id: cx.thread_id,
                        rel_path: rel,
                        pdf_page: None,
                        summary_only: true,
                    });
                    Ok(vec![ResultContent::Text {
                        text: format!(
                            "PDF file: {file_name}\nPages: {pages}\nCall get_file again with \
                             pdfPage to fetch a specific page."
                        ),
                    }])
                }
                Some(page) => {
                    if page == 0 || (pages > 0 && page as usize > pages) {
                        return Err(format!(
                            "page {page} out of range; {file_name} has {pages} pages"
                        ));
                    }
                    cx.env.dispatch.send(ToolEffectMsg::AddFileToContext {
                        thread_id: cx.thread_id,
                        rel_path: rel,
                        pdf_page: Some(page),
                        summary_only: false,
                    });
                    Ok(vec![ResultContent::Document {
                        mime: "application/pdf".into(),
                        data: bytes,
                        title: Some(format!("{file_name} - Page {page}")),
                    }])
                }
            }
        }
        FileCategory::Image => {
            let bytes = tokio::fs::read(abs).await.map_err(|e| e.to_string())?;
            let mime = match abs.extension().and_then(|e| e.to_str()) {
                Some("png") => "image/png",
                Some("gif") => "image/gif",
                Some("webp") => "image/webp",
                Some("bmp") => "image/bmp",
                _ => "image/jpeg",
            };
            cx.env.dispatch.send(ToolEffectMsg::AddFileToContext {
                thread_id: cx.thread_id,
                rel_path: rel,
                pdf_page: None,
                summary_only: false,
            });
            Ok(vec![ResultContent::Document {
                mime: mime.into(),
                data: bytes,
                title: Some(file_name),
            }])
        }
        FileCategory::Text | FileCategory::Other => {
            let text = tokio::fs::read_to_string(abs)
                .await
                .map_err(|e| format!("cannot read {} as UTF-8: {e}", abs.display()))?;
            cx.env.dispatch.send(ToolEffectMsg::AddFileToContext {
                thread_id: cx.thread_id,
                rel_path: rel,
                pdf_page: None,
                summary_only: false,
            });
            Ok(vec![ResultContent::Text { text }])
        }
    }
}

impl ToolExecutor for GetFileTool {
    fn request(&self) -> &ToolRequest {
        &self.request
    }

    fn is_done(&self) -> bool {
        matches!(self.state, State::Done(_))
    }

    fn is_pending_user_action(&self) -> bool {
        matches!(self.state, State::PendingUserAction)
    }

    fn update(&mut self, msg: ToolMsg, _cx: &ToolCtx) {
        match (&self.state, msg) {
            (State::PendingUserAction, ToolMsg::UserApproval { approved, .. }) => {
                if approved {
                    self.start();
                } else {
                    self.state = State::Done(ToolResultBlock::err(
                        self.request.id.clone(),
                        "The user did not allow reading this file.",
                    ));
                }
            }
            (State::Processing, ToolMsg::Finished(outcome)) => {
                self.state = State::Done(match outcome {
                    Ok(content) => {
                        ToolResultBlock::with_content(self.request.id.clone(), content)
                    }
                    Err(e) => ToolResultBlock::err(self.request.id.clone(), e),
                });
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
            State::PendingUserAction => {
                progress_result(&self.request.id, "Awaiting read approval.")
            }
            State::Processing => progress_result(&self.request.id, "Reading file."),
        }
    }

    fn render_summary(&self) -> Node {
        let label = self.file_label();
        match &self.state {
            State::PendingUserAction => self.approval_bindings(Node::text(format!(
                "{} May I read `{label}`? [ NO ] [ YES ]",
                glyph::AWAITING_APPROVAL
            ))),
            State::Processing => Node::text(format!("{} Read `{label}`", glyph::PROCESSING)),
            State::Done(r) if r.is_error => {
                Node::text(format!("{} Read `{label}`", glyph::ERROR))
            }
            State::Done(_) => Node::text(format!("{} Read `{label}`", glyph::SUCCESS)),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::AttachedFile;
    use crate::testing::{harness, request_for, wait_for_effects, ToolHarness};
    use crate::ToolName;
    use std::collections::HashMap;
    use std::sync::Arc;

    async fn drive_to_done(tool: &mut GetFileTool, h: &ToolHarness) {
        for _ in 0..200 {
            let has_tool_msg = h
                .sent
                .lock()
                .unwrap()
                .iter()
                .any(|m| matches!(m, ToolEffectMsg::Tool { .. }));
            if has_tool_msg {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        for m in std::mem::take(&mut *h.sent.lock().unwrap()) {
            if let ToolEffectMsg::Tool { msg, .. } = m {
                tool.update(msg, &h.cx);
            }
        }
    }

    #[tokio::test]
    async fn reads_tracked_text_file_without_prompting() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.txt"), "line one\nline two").unwrap();
        let h = harness(dir.path());
        let mut tool = GetFileTool::new(
            request_for(ToolName::GetFile, serde_json::json!({"filePath": "notes.txt"})),
            &h.cx,
        );
        assert!(!tool.is_pending_user_action());
        wait_for_effects(&h.sent, 2).await;
        let msgs = std::mem::take(&mut *h.sent.lock().unwrap());
        assert!(msgs.iter().any(|m| matches!(
            m,
            ToolEffectMsg::AddFileToContext { rel_path, .. }
                if rel_path == Path::new("notes.txt")
        )));
        for m in msgs {
            if let ToolEffectMsg::Tool { msg, .. } = m {
                tool.update(msg, &h.cx);
            }
        }
        let r = tool.tool_result();
        assert!(!r.is_error);
        assert_eq!(r.text(), "line one\nline two");
    }

    #[tokio::test]
    async fn gitignored_file_prompts_and_denial_errors() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(".gitignore"), "ignored-file.txt\n").unwrap();
        std::fs::write(dir.path().join("ignored-file.txt"), "hidden").unwrap();
        let h = harness(dir.path());
        let mut tool = GetFileTool::new(
            request_for(
                ToolName::GetFile,
                serde_json::json!({"filePath": "ignored-file.txt"}),
            ),
            &h.cx,
        );
        assert!(tool.is_pending_user_action());
        tool.update(
            ToolMsg::UserApproval {
                approved: false,
                remember: false,
            },
            &h.cx,
        );
        let r = tool.tool_result();
        assert!(r.is_error);
        assert!(r.text().contains("did not allow"));
    }

    #[tokio::test]
    async fn gitignored_file_approved_returns_content() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(".gitignore"), "ignored-file.txt\n").unwrap();
        std::fs::write(dir.path().join("ignored-file.txt"), "hidden").unwrap();
        let h = harness(dir.path());
        let mut tool = GetFileTool::new(
            request_for(
                ToolName::GetFile,
                serde_json::json!({"filePath": "ignored-file.txt"}),
            ),
            &h.cx,
        );
        tool.update(
            ToolMsg::UserApproval {
                approved: true,
                remember: false,
            },
            &h.cx,
        );
        drive_to_done(&mut tool, &h).await;
        let r = tool.tool_result();
        assert!(!r.is_error, "{}", r.text());
        assert_eq!(r.text(), "hidden");
    }

    #[tokio::test]
    async fn already_attached_file_returns_notice() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "content").unwrap();
        let mut h = harness(dir.path());
        let mut attached = HashMap::new();
        attached.insert(PathBuf::from("a.txt"), AttachedFile::default());
        h.cx.attached = Arc::new(attached);
        let tool = GetFileTool::new(
            request_for(ToolName::GetFile, serde_json::json!({"filePath": "a.txt"})),
            &h.cx,
        );
        assert!(tool.is_done());
        let r = tool.tool_result();
        assert!(!r.is_error);
        assert!(r.text().contains("already in context"));
    }

    #[tokio::test]
    async fn oversized_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("big.txt"), vec![b'x'; 4096]).unwrap();
        let mut cfg: sidecar_config::Config = serde_json::from_str("{}").unwrap();
        cfg.max_file_size_bytes = 1024;
        let h = crate::testing::harness_with_config(dir.path(), cfg);
        let mut tool = GetFileTool::new(
            request_for(ToolName::GetFile, serde_json::json!({"filePath": "big.txt"})),
            &h.cx,
        );
        drive_to_done(&mut tool, &h).await;
        let r = tool.tool_result();
        assert!(r.is_error);
        assert!(r.text().contains("larger than"));
    }

    // ── PDF handling ──────────────────────────────────────────────────────────

    fn fake_pdf(pages: usize) -> Vec<u8> {
        let mut out = b"%PDF-1.4\n1 0 obj << /Type /Pages /Count 3 >> endobj\n".to_vec();
        for i in 0..pages {
            out.extend_from_slice(
                format!("{} 0 obj << /Type /Page /Parent 1 0 R >> endobj\n", i + 2).as_bytes(),
            );
        }
        out.extend_from_slice(b"%%EOF");
        out
    }

    #[test]
    fn pdf_page_count_ignores_page_tree_nodes() {
        assert_eq!(count_pdf_pages(&fake_pdf(3)), 3);
        assert_eq!(count_pdf_pages(&fake_pdf(0)), 0);
        assert_eq!(count_pdf_pages(b"no pdf markers"), 0);
    }

    #[tokio::test]
    async fn pdf_without_page_returns_descriptor() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("doc.pdf"), fake_pdf(3)).unwrap();
        let h = harness(dir.path());
        let mut tool = GetFileTool::new(
            request_for(ToolName::GetFile, serde_json::json!({"filePath": "doc.pdf"})),
            &h.cx,
        );
        wait_for_effects(&h.sent, 2).await;
        let msgs = std::mem::take(&mut *h.sent.lock().unwrap());
        assert!(msgs.iter().any(|m| matches!(
            m,
            ToolEffectMsg::AddFileToContext { summary_only: true, .. }
        )));
        for m in msgs {
            if let ToolEffectMsg::Tool { msg, .. } = m {
                tool.update(msg, &h.cx);
            }
        }
        let r = tool.tool_result();
        assert!(r.text().contains("Pages: 3"), "{}", r.text());
    }

    #[tokio::test]
    async fn pdf_page_returns_titled_document_part() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("multipage.pdf"), fake_pdf(3)).unwrap();
        let h = harness(dir.path());
        let mut tool = GetFileTool::new(
            request_for(
                ToolName::GetFile,
                serde_json::json!({"filePath": "multipage.pdf", "pdfPage": 2}),
            ),
            &h.cx,
        );
        drive_to_done(&mut tool, &h).await;
        let r = tool.tool_result();
        assert!(!r.is_error);
        match &r.content[0] {
            ResultContent::Document { mime, title, .. } => {
                assert_eq!(mime, "application/pdf");
                assert_eq!(title.as_deref(), Some("multipage.pdf - Page 2"));
            }
            other => panic!("expected document, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn pdf_page_out_of_range_errors() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("doc.pdf"), fake_pdf(2)).unwrap();
        let h = harness(dir.path());
        let mut tool = GetFileTool::new(
            request_for(
                ToolName::GetFile,
                serde_json::json!({"filePath": "doc.pdf", "pdfPage": 9}),
            ),
            &h.cx,
        );
        drive_to_done(&mut tool, &h).await;
        assert!(tool.tool_result().is_error);
    }
}
