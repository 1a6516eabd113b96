// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! `bash_command`: run a shell command under `/bin/sh -c`.
//!
//! The full output goes line-wise (ANSI stripped) to a per-request log
//! file; the model receives a bounded summary (first 10 + last 20 lines,
//! token-trimmed) plus the exit status and the log path.  Approval consults
//! the config allowlist and the thread's remembered commands; the user can
//! approve once or remember the command.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;

use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::Notify;
use tracing::{debug, warn};

use sidecar_provider::ToolResultBlock;
use sidecar_view::{Action, Node};

use crate::executor::{
    aborted_result, glyph, parse_input, progress_result, OutputStream, ToolCtx, ToolEffectMsg,
    ToolExecutor, ToolMsg, ToolRequest,
};
use crate::policy::CommandDecision;
use crate::util::{approx_tokens, strip_ansi, truncate_preview};

/// Lines of the summary kept from the head and tail of the output.
const HEAD_LINES: usize = 10;
const TAIL_LINES: usize = 20;

/// Token ceiling for the summary sent to the model (4 chars ≈ 1 token).
const SUMMARY_TOKEN_CAP: usize = 10_000;

const LOG_FILE_NAME: &str = "bashCommand.log";

#[derive(Debug, Deserialize)]
struct BashInput {
    command: String,
}

enum State {
    PendingUserAction,
    Processing(Running),
    Done(ToolResultBlock),
}

struct Running {
    head: Vec<String>,
    tail: VecDeque<String>,
    total_lines: usize,
    started: std::time::Instant,
    terminate: Arc<Notify>,
}

pub struct BashCommandTool {
    request: ToolRequest,
    command: String,
    log_path: PathBuf,
    state: State,
    cx: ToolCtx,
}

impl BashCommandTool {
    pub fn new(request: ToolRequest, cx: &ToolCtx) -> Self {
        let input = match parse_input::<BashInput>(&request) {
            Ok(i) => i,
            Err(result) => {
                return Self {
                    log_path: PathBuf::new(),
                    command: String::new(),
                    state: State::Done(result),
                    cx: cx.clone(),
                    request,
                }
            }
        };
        let log_path = cx.artifacts_dir(&request.id).join(LOG_FILE_NAME);
        let mut tool = Self {
            request,
            command: input.command,
            log_path,
            state: State::PendingUserAction,
            cx: cx.clone(),
        };

        let remembered = cx
            .remembered
            .lock()
            .unwrap()
            .contains(&tool.command);
        let decision = if remembered {
            CommandDecision::Auto
        } else {
            cx.env.command_policy.decide(&tool.command)
        };
        match decision {
            CommandDecision::Deny => {
                tool.state = State::Done(ToolResultBlock::err(
                    tool.request.id.clone(),
                    "This command is denied by configuration.",
                ));
            }
            CommandDecision::Auto => tool.start(),
            CommandDecision::Ask => {}
        }
        tool
    }

    fn start(&mut self) {
        let terminate = Arc::new(Notify::new());
        self.state = State::Processing(Running {
            head: Vec::new(),
            tail: VecDeque::new(),
            total_lines: 0,
            started: std::time::Instant::now(),
            terminate: terminate.clone(),
        });

        let command = self.command.clone();
        let log_path = self.log_path.clone();
        let id = self.request.id.clone();
        let cx = self.cx.clone();
        let timeout_secs = match cx.env.config.bash_timeout_secs {
            0 => 300,
            t => t,
        };
        let workdir = cx.env.project_root.clone();

        tokio::spawn(async move {
            if let Err(e) = run_command(
                &cx,
                &id,
                &command,
                &log_path,
                &workdir,
                timeout_secs,
                terminate,
            )
            .await
            {
                cx.send_self(&id, ToolMsg::Finished(Err(e)));
            }
        });
    }

    fn finish(&mut self, code: Option<i32>, signal: Option<i32>, timed_out: bool) {
        let State::Processing(run) = &self.state else {
            return;
        };
        let elapsed = run.started.elapsed().as_secs();
        let exit_desc = if timed_out {
            format!("timed out after {elapsed}s")
        } else if let Some(sig) = signal {
            format!("terminated by signal {sig}")
        } else {
            format!("exit code {} ({elapsed}s)", code.unwrap_or(-1))
        };

        let summary = build_summary(
            &run.head,
            run.tail.iter().cloned().collect::<Vec<_>>().as_slice(),
            run.total_lines,
            &exit_desc,
            &self.log_path,
        );

        let is_error = timed_out || signal.is_some();
        self.state = State::Done(if is_error {
            ToolResultBlock::err(self.request.id.clone(), summary)
        } else {
            ToolResultBlock::ok(self.request.id.clone(), summary)
        });
    }

    fn approval_bindings(&self, node: Node) -> Node {
        let answer = |approved: bool, remember: bool| {
            let cx = self.cx.clone();
            let tid = cx.thread_id;
            let rid = self.request.id.clone();
            Action::new(move || {
                cx.env.dispatch.send(ToolEffectMsg::Tool {
                    thread_id: tid,
                    request_id: rid.clone(),
                    msg: ToolMsg::UserApproval { approved, remember },
                });
            })
        };
        node.with_binding("n", answer(false, false))
            .with_binding("y", answer(true, false))
            .with_binding("a", answer(true, true))
    }
}

/// Build the bounded model-facing summary in the documented layout.
fn build_summary(
    head: &[String],
    tail: &[String],
    total_lines: usize,
    exit_desc: &str,
    log_path: &std::path::Path,
) -> String {
    let mut body = String::new();
    let shown = head.len() + tail.len();
    if total_lines > shown {
        let omitted = total_lines - shown;
        body.push_str(&head.join("\n"));
        body.push_str(&format!("\n... ({omitted} lines omitted) ...\n\n"));
        body.push_str(&tail.join("\n"));
    } else {
        // All lines fit; head holds the first 10, tail the rest.
        let mut all: Vec<&str> = head.iter().map(String::as_str).collect();
        all.extend(tail.iter().map(String::as_str));
        body.push_str(&all.join("\n"));
    }

    // Token trim: drop remaining lines from the front until under the cap.
    if approx_tokens(&body) > SUMMARY_TOKEN_CAP {
        let lines: Vec<&str> = body.lines().collect();
        let mut kept = lines.len();
        let mut size: usize = lines.iter().map(|l| l.len() + 1).sum();
        let mut dropped = 0;
        while kept > 1 && size / 4 > SUMMARY_TOKEN_CAP {
            size -= lines[dropped].len() + 1;
            dropped += 1;
            kept -= 1;
        }
        body = format!(
            "... ({dropped} lines omitted due to length) ...\n\n{}",
            lines[dropped..].join("\n")
        );
    }

    if !body.is_empty() {
        body.push('\n');
    }
    body.push_str(exit_desc);
    body.push('\n');
    body.push_str(&format!(
        "\nFull output ({total_lines} lines): {}",
        log_path.display()
    ));
    body
}

async fn run_command(
    cx: &ToolCtx,
    id: &sidecar_provider::ToolRequestId,
    command: &str,
    log_path: &std::path::Path,
    workdir: &std::path::Path,
    timeout_secs: u64,
    terminate: Arc<Notify>,
) -> Result<(), String> {
    if let Some(dir) = log_path.parent() {
        tokio::fs::create_dir_all(dir).await.map_err(|e| e.to_string())?;
    }
    let mut log = tokio::fs::File::create(log_path)
        .await
        .map_err(|e| format!("cannot create log file: {e}"))?;
    log.write_all(format!("$ {command}\n").as_bytes())
        .await
        .map_err(|e| e.to_string())?;

    let mut cmd = Command::new("/bin/sh");
    cmd.arg("-c").arg(command);
    cmd.current_dir(workdir);
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());
    cmd.kill_on_drop(true);
    // New session: detaches the child from the controlling terminal so it
    // cannot write escape sequences past the log capture.
    #[cfg(unix)]
    unsafe {
        cmd.pre_exec(|| {
            libc::setsid();
            Ok(())
        });
    }

    let mut child = cmd.spawn().map_err(|e| format!("spawn error: {e}"))?;
    debug!(cmd = %command, pid = child.id().unwrap_or(0), "bash_command started");

    let mut out_lines = BufReader::new(child.stdout.take().expect("piped")).lines();
    let mut err_lines = BufReader::new(child.stderr.take().expect("piped")).lines();
    let mut out_done = false;
    let mut err_done = false;
    let mut killed = false;
    let mut timed_out = false;
    let mut current_block: Option<OutputStream> = None;
    let deadline = tokio::time::sleep(std::time::Duration::from_secs(timeout_secs));
    tokio::pin!(deadline);
    // 1 Hz heartbeat for elapsed-time re-renders; dies with this task on
    // terminate/finish/abort.
    let mut ticker = tokio::time::interval(std::time::Duration::from_secs(1));
    ticker.tick().await;

    while !(out_done && err_done) {
        tokio::select! {
            _ = ticker.tick() => {
                cx.send_self(id, ToolMsg::Tick);
            }
            line = out_lines.next_line(), if !out_done => match line {
                Ok(Some(l)) => {
                    write_line(&mut log, &mut current_block, OutputStream::Stdout, &l).await;
                    cx.send_self(id, ToolMsg::OutputLines {
                        stream: OutputStream::Stdout,
                        lines: vec![strip_ansi(&l)],
                    });
                }
                _ => out_done = true,
            },
            line = err_lines.next_line(), if !err_done => match line {
                Ok(Some(l)) => {
                    write_line(&mut log, &mut current_block, OutputStream::Stderr, &l).await;
                    cx.send_self(id, ToolMsg::OutputLines {
                        stream: OutputStream::Stderr,
                        lines: vec![strip_ansi(&l)],
                    });
                }
                _ => err_done = true,
            },
            _ = &mut deadline, if !killed => {
                warn!(cmd = %command, "bash_command timeout; killing");
                timed_out = true;
                killed = true;
                let _ = child.start_kill();
            }
            _ = terminate.notified(), if !killed => {
                killed = true;
                let _ = child.start_kill();
            }
        }
    }

    let status = child.wait().await.map_err(|e| e.to_string())?;
    let code = status.code();
    #[cfg(unix)]
    let signal = {
        use std::os::unix::process::ExitStatusExt;
        status.signal()
    };
    #[cfg(not(unix))]
    let signal: Option<i32> = None;

    let exit_line = if let Some(sig) = signal {
        format!("terminated by signal {sig}\n")
    } else {
        format!("exit code {}\n", code.unwrap_or(-1))
    };
    let _ = log.write_all(exit_line.as_bytes()).await;
    let _ = log.flush().await;

    cx.send_self(
        id,
        ToolMsg::Exited {
            code,
            signal,
            timed_out,
        },
    );
    Ok(())
}

async fn write_line(
    log: &mut tokio::fs::File,
    current: &mut Option<OutputStream>,
    stream: OutputStream,
    line: &str,
) {
    if *current != Some(stream) {
        let header = match stream {
            OutputStream::Stdout => "stdout:\n",
            OutputStream::Stderr => "stderr:\n",
        };
        let _ = log.write_all(header.as_bytes()).await;
        *current = Some(stream);
    }
    let _ = log.write_all(strip_ansi(line).as_bytes()).await;
    let _ = log.write_all(b"\n").await;
}

impl ToolExecutor for BashCommandTool {
    fn request(&self) -> &ToolRequest {
        &self.request
    }

    fn is_done(&self) -> bool {
        matches!(self.state, State::Done(_))
    }

    fn is_pending_user_action(&self) -> bool {
        matches!(self.state, State::PendingUserAction)
    }

    fn update(&mut self, msg: ToolMsg, cx: &ToolCtx) {
        match (&mut self.state, msg) {
            (State::PendingUserAction, ToolMsg::UserApproval { approved, remember }) => {
                if approved {
                    if remember {
                        cx.remembered.lock().unwrap().insert(self.command.clone());
                    }
                    self.start();
                } else {
                    self.state = State::Done(ToolResultBlock::err(
                        self.request.id.clone(),
                        "The user did not allow running this command.",
                    ));
                }
            }
            (State::Processing(run), ToolMsg::OutputLines { lines, .. }) => {
                for line in lines {
                    run.total_lines += 1;
                    if run.head.len() < HEAD_LINES {
                        run.head.push(line);
                    } else {
                        run.tail.push_back(line);
                        if run.tail.len() > TAIL_LINES {
                            run.tail.pop_front();
                        }
                    }
                }
            }
            (
                State::Processing(_),
                ToolMsg::Exited {
                    code,
                    signal,
                    timed_out,
                },
            ) => self.finish(code, signal, timed_out),
            (State::Processing(run), ToolMsg::Terminate) => {
                run.terminate.notify_one();
            }
            (State::Processing(_), ToolMsg::Finished(Err(e))) => {
                self.state = State::Done(ToolResultBlock::err(self.request.id.clone(), e));
            }
            (State::Processing(_), ToolMsg::Tick) => {}
            _ => {}
        }
    }

    fn abort(&mut self) -> ToolResultBlock {
        if let State::Done(r) = &self.state {
            return r.clone();
        }
        if let State::Processing(run) = &self.state {
            run.terminate.notify_one();
        }
        let r = aborted_result(&self.request.id);
        self.state = State::Done(r.clone());
        r
    }

    fn tool_result(&self) -> ToolResultBlock {
        match &self.state {
            State::Done(r) => r.clone(),
            State::PendingUserAction => {
                progress_result(&self.request.id, "Awaiting command approval.")
            }
            State::Processing(run) => progress_result(
                &self.request.id,
                &format!("Running ({} lines so far).", run.total_lines),
            ),
        }
    }

    fn render_summary(&self) -> Node {
        let width = self.cx.env.config.display_width.max(20);
        let cmd = truncate_preview(&self.command, width);
        match &self.state {
            State::PendingUserAction => self.approval_bindings(Node::text(format!(
                "{} May I run command `{cmd}`? [ NO ] [ YES ] [ ALWAYS ]",
                glyph::AWAITING_APPROVAL
            ))),
            State::Processing(run) => Node::text(format!(
                "{} `{cmd}` ({}s, {} lines)",
                glyph::PROCESSING,
                run.started.elapsed().as_secs(),
                run.total_lines
            )),
            State::Done(r) if r.is_error => Node::text(format!("{} `{cmd}`", glyph::ERROR)),
            State::Done(_) => Node::text(format!("{} `{cmd}`", glyph::SUCCESS)),
        }
    }

    fn render_detail(&self) -> Node {
        match &self.state {
            State::Processing(run) => {
                let recent: Vec<String> = run.tail.iter().rev().take(5).rev().cloned().collect();
                Node::text(recent.join("\n"))
            }
            _ => self.render_summary(),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{harness, harness_with_config, request_for, ToolHarness};
    use crate::ToolName;

    fn bash_request(cmd: &str) -> ToolRequest {
        request_for(ToolName::BashCommand, serde_json::json!({"command": cmd}))
    }

    /// Feed effect messages back into the executor until it is done.
    async fn drive(tool: &mut BashCommandTool, h: &ToolHarness) {
        for _ in 0..600 {
            for m in std::mem::take(&mut *h.sent.lock().unwrap()) {
                if let ToolEffectMsg::Tool { msg, .. } = m {
                    tool.update(msg, &h.cx);
                }
            }
            if tool.is_done() {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        panic!("bash tool did not finish");
    }

    #[tokio::test]
    async fn denied_by_user_returns_canonical_error() {
        let dir = tempfile::tempdir().unwrap();
        let h = harness(dir.path());
        let mut tool = BashCommandTool::new(bash_request("echo test"), &h.cx);
        assert!(tool.is_pending_user_action());
        let summary = tool.render_summary().render_text();
        assert!(summary.contains("May I run command"), "{summary}");
        assert!(summary.contains("[ NO ] [ YES ] [ ALWAYS ]"), "{summary}");
        tool.update(
            ToolMsg::UserApproval {
                approved: false,
                remember: false,
            },
            &h.cx,
        );
        let r = tool.tool_result();
        assert!(r.is_error);
        assert_eq!(r.text(), "The user did not allow running this command.");
    }

    #[tokio::test]
    async fn allowlisted_command_runs_and_logs() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg: sidecar_config::Config = serde_json::from_str("{}").unwrap();
        cfg.command.allow = vec!["echo *".into()];
        let h = harness_with_config(dir.path(), cfg);
        let mut tool = BashCommandTool::new(bash_request("echo hello && echo world"), &h.cx);
        assert!(!tool.is_pending_user_action());
        drive(&mut tool, &h).await;
        let r = tool.tool_result();
        assert!(!r.is_error, "{}", r.text());
        let text = r.text();
        assert!(text.contains("hello"));
        assert!(text.contains("exit code 0"));
        assert!(text.contains("Full output (2 lines):"));

        let log = std::fs::read_to_string(&tool.log_path).unwrap();
        assert!(log.starts_with("$ echo hello && echo world\n"), "{log}");
        assert!(log.contains("stdout:\nhello\nworld\n"), "{log}");
        assert!(log.ends_with("exit code 0\n"), "{log}");
    }

    #[tokio::test]
    async fn remembered_command_skips_prompt() {
        let dir = tempfile::tempdir().unwrap();
        let h = harness(dir.path());
        h.cx.remembered.lock().unwrap().insert("true".to_string());
        let mut tool = BashCommandTool::new(bash_request("true"), &h.cx);
        assert!(!tool.is_pending_user_action());
        drive(&mut tool, &h).await;
        assert!(!tool.tool_result().is_error);
    }

    #[tokio::test]
    async fn approve_with_remember_records_command() {
        let dir = tempfile::tempdir().unwrap();
        let h = harness(dir.path());
        let mut tool = BashCommandTool::new(bash_request("true"), &h.cx);
        assert!(tool.is_pending_user_action());
        tool.update(
            ToolMsg::UserApproval {
                approved: true,
                remember: true,
            },
            &h.cx,
        );
        drive(&mut tool, &h).await;
        assert!(h.cx.remembered.lock().unwrap().contains("true"));
    }

    #[tokio::test]
    async fn denied_by_config_never_prompts() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg: sidecar_config::Config = serde_json::from_str("{}").unwrap();
        cfg.command.deny = vec!["rm *".into()];
        let h = harness_with_config(dir.path(), cfg);
        let tool = BashCommandTool::new(bash_request("rm -rf /tmp/x"), &h.cx);
        assert!(tool.is_done());
        assert!(tool.tool_result().is_error);
    }

    #[tokio::test]
    async fn long_output_is_summarized_head_and_tail() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg: sidecar_config::Config = serde_json::from_str("{}").unwrap();
        cfg.command.allow = vec!["seq *".into()];
        let h = harness_with_config(dir.path(), cfg);
        let mut tool = BashCommandTool::new(bash_request("seq 1 100"), &h.cx);
        drive(&mut tool, &h).await;
        let text = tool.tool_result().text();
        assert!(text.contains("1\n2\n"), "head preserved: {text}");
        assert!(text.contains("... (70 lines omitted) ..."), "{text}");
        assert!(text.contains("\n100\n"), "tail preserved: {text}");
        assert!(text.contains("Full output (100 lines):"), "{text}");
    }

    #[tokio::test]
    async fn nonzero_exit_is_reported_but_not_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg: sidecar_config::Config = serde_json::from_str("{}").unwrap();
        cfg.command.allow = vec!["*".into()];
        let h = harness_with_config(dir.path(), cfg);
        let mut tool = BashCommandTool::new(bash_request("exit 3"), &h.cx);
        drive(&mut tool, &h).await;
        let r = tool.tool_result();
        assert!(!r.is_error);
        assert!(r.text().contains("exit code 3"));
    }

    #[tokio::test]
    async fn terminate_kills_running_command() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg: sidecar_config::Config = serde_json::from_str("{}").unwrap();
        cfg.command.allow = vec!["*".into()];
        let h = harness_with_config(dir.path(), cfg);
        let mut tool = BashCommandTool::new(bash_request("sleep 30"), &h.cx);
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        tool.update(ToolMsg::Terminate, &h.cx);
        drive(&mut tool, &h).await;
        let r = tool.tool_result();
        assert!(r.is_error);
        assert!(r.text().contains("signal"), "{}", r.text());
    }

    #[tokio::test]
    async fn abort_is_idempotent_and_stops_process() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg: sidecar_config::Config = serde_json::from_str("{}").unwrap();
        cfg.command.allow = vec!["*".into()];
        let h = harness_with_config(dir.path(), cfg);
        let mut tool = BashCommandTool::new(bash_request("sleep 30"), &h.cx);
        let first = tool.abort();
        let second = tool.abort();
        assert!(first.is_error);
        assert_eq!(first.text(), second.text());
    }

    // ── Summary layout ────────────────────────────────────────────────────────

    #[test]
    fn summary_without_omission_joins_all_lines() {
        let head: Vec<String> = (1..=3).map(|i| i.to_string()).collect();
        let s = build_summary(&head, &[], 3, "exit code 0 (1s)", std::path::Path::new("/tmp/l"));
        assert!(s.starts_with("1\n2\n3\nexit code 0 (1s)\n"), "{s}");
        assert!(s.ends_with("Full output (3 lines): /tmp/l"), "{s}");
    }

    #[test]
    fn summary_token_trim_prepends_marker() {
        let long_line = "x".repeat(2000);
        let head: Vec<String> = (0..10).map(|_| long_line.clone()).collect();
        let tail: Vec<String> = (0..20).map(|_| long_line.clone()).collect();
        let s = build_summary(&head, &tail, 100, "exit code 0 (1s)", std::path::Path::new("/l"));
        assert!(s.contains("lines omitted due to length"), "trim marker missing");
        assert!(approx_tokens(&s) <= SUMMARY_TOKEN_CAP + 100);
    }
}
