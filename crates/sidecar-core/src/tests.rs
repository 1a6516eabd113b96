// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! End-to-end scenarios: a full app shell over the mock editor and the
//! scripted provider, driven through the root queue exactly as the host
//! editor would drive it.

use std::path::Path;
use std::sync::Arc;

use sidecar_config::Config;
use sidecar_editor::{MockEditor, NullLspBridge, Pos};
use sidecar_provider::mock::ScriptedProvider;
use sidecar_provider::{
    BlockDelta, BlockStart, Part, ProviderRegistry, StopReason, StreamEvent, ThreadId,
    ToolRequestId, Usage,
};
use sidecar_tools::NullMcpHost;
use sidecar_view::Key;

use crate::app::App;
use crate::msg::{RootMsg, ThreadMsg};
use crate::thread::ThreadStatus;

struct Fixture {
    app: App,
    editor: Arc<MockEditor>,
    provider: Arc<ScriptedProvider>,
    dir: tempfile::TempDir,
}

async fn fixture(scripts: Vec<Vec<StreamEvent>>) -> Fixture {
    fixture_with_config("{}", scripts).await
}

async fn fixture_with_config(extra_json: &str, scripts: Vec<Vec<StreamEvent>>) -> Fixture {
    // RUST_LOG=sidecar_core=debug makes failing scenarios traceable.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();

    let dir = tempfile::tempdir().unwrap();
    let mut config: Config = serde_json::from_str(extra_json).unwrap();
    config.profiles = vec![serde_json::from_str(
        r#"{"name":"default","provider":"scripted-mock","model":"test-model"}"#,
    )
    .unwrap()];
    config.active_profile = "default".into();

    let provider = Arc::new(ScriptedProvider::new(scripts));
    let mut registry = ProviderRegistry::new();
    registry.register(provider.clone());

    let editor = Arc::new(MockEditor::new());
    let mut app = App::start(
        editor.clone(),
        Arc::new(NullLspBridge),
        Arc::new(NullMcpHost),
        Arc::new(config),
        Arc::new(registry),
        dir.path().to_path_buf(),
    )
    .await
    .unwrap();
    app.settle().await;

    Fixture {
        app,
        editor,
        provider,
        dir,
    }
}

impl Fixture {
    fn send_user(&self, text: &str) {
        self.app.dispatcher().send(RootMsg::Thread {
            id: ThreadId(1),
            msg: ThreadMsg::SendMessage { text: text.into() },
        });
    }

    fn root_thread(&self) -> &crate::thread::Thread {
        self.app.chat.thread(ThreadId(1)).expect("root thread")
    }

    /// Place the cursor on the first sidebar row containing `needle` and
    /// press `key`.
    async fn press_on(&mut self, needle: &str, key: &str) {
        let text = self.app.rendered_text();
        let row = text
            .lines()
            .position(|l| l.contains(needle))
            .unwrap_or_else(|| panic!("`{needle}` not rendered:\n{text}")) as u32;
        self.editor.set_cursor(Pos::new(row, 2));
        self.app.dispatcher().send(RootMsg::Key(Key::from(key)));
        self.app.settle().await;
    }

    fn tool_results(&self) -> Vec<(ToolRequestId, bool, String)> {
        self.root_thread()
            .messages
            .iter()
            .flat_map(|m| m.parts.iter())
            .filter_map(|p| match p {
                Part::ToolResult(r) => {
                    Some((r.request_id.clone(), r.is_error, r.text()))
                }
                _ => None,
            })
            .collect()
    }
}

fn end_turn_with_tool(text: &str, request_id: &str, tool: &str, input: &str) -> Vec<StreamEvent> {
    vec![
        StreamEvent::ContentBlockStart {
            index: 0,
            block: BlockStart::Text {
                text: String::new(),
            },
        },
        StreamEvent::ContentBlockDelta {
            index: 0,
            delta: BlockDelta::TextDelta { text: text.into() },
        },
        StreamEvent::ContentBlockStop { index: 0 },
        StreamEvent::ContentBlockStart {
            index: 1,
            block: BlockStart::ToolUse {
                id: ToolRequestId(request_id.into()),
                name: tool.into(),
            },
        },
        StreamEvent::ContentBlockDelta {
            index: 1,
            delta: BlockDelta::InputJsonDelta {
                partial_json: input.into(),
            },
        },
        StreamEvent::ContentBlockStop { index: 1 },
        StreamEvent::MessageDelta {
            stop_reason: Some(StopReason::EndTurn),
            usage: Usage::default(),
        },
        StreamEvent::MessageStop,
    ]
}

// ── Scenario 1: insert into a new file ───────────────────────────────────────

#[tokio::test]
async fn insert_into_new_file() {
    let mut f = fixture(vec![end_turn_with_tool(
        "Creating…",
        "tr-1",
        "insert",
        r#"{"filePath":"test_note.txt","insertAfter":"","content":"This is a test note\nWith multiple lines"}"#,
    )])
    .await;

    f.send_user("Write a test note in a new file.");
    f.app.settle().await;

    let written = std::fs::read_to_string(f.dir.path().join("test_note.txt")).unwrap();
    assert_eq!(written, "This is a test note\nWith multiple lines");

    let sidebar = f.app.rendered_text();
    assert!(sidebar.contains("Insert [[ +2 ]]"), "{sidebar}");
    assert!(sidebar.contains("Creating…"), "{sidebar}");

    // Exactly one ok ToolResult matched to the request, thread back at idle.
    let results = f.tool_results();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].0 .0, "tr-1");
    assert!(!results[0].1);
    assert_eq!(f.root_thread().status, ThreadStatus::Idle);

    // A per-thread diff artifact exists.
    let artifacts = std::env::temp_dir()
        .join("sidecar/threads/thread-1/tools/tr-1");
    assert!(artifacts.join("edit-0.diff").exists());
}

// ── Scenario 2: streaming replace renders live counts ────────────────────────

#[tokio::test]
async fn streaming_replace_renders_live_counts() {
    let find = "a\\nb\\nc\\nd\\ne\\nf\\ng";
    let replace = "1\\n2\\n3\\n4\\n5\\n6";
    let mut f = fixture(vec![]).await;
    std::fs::write(
        f.dir.path().join("measure-selection-box.tsx"),
        "a\nb\nc\nd\ne\nf\ng",
    )
    .unwrap();

    let d = f.app.dispatcher();
    let ev = |e: StreamEvent| {
        d.send(RootMsg::Thread {
            id: ThreadId(1),
            msg: ThreadMsg::StreamEvent(e),
        })
    };

    ev(StreamEvent::ContentBlockStart {
        index: 0,
        block: BlockStart::ToolUse {
            id: ToolRequestId("tr-2".into()),
            name: "replace".into(),
        },
    });
    ev(StreamEvent::ContentBlockDelta {
        index: 0,
        delta: BlockDelta::InputJsonDelta {
            partial_json: format!(
                r#"{{"filePath":"measure-selection-box.tsx","find":"{find}","#
            ),
        },
    });
    f.app.settle().await;
    let mid = f.app.rendered_text();
    assert!(mid.contains("Replace [[ -7 / +0 ]]"), "{mid}");

    ev(StreamEvent::ContentBlockDelta {
        index: 0,
        delta: BlockDelta::InputJsonDelta {
            partial_json: format!(r#""replace":"{replace}"}}"#),
        },
    });
    f.app.settle().await;
    let late = f.app.rendered_text();
    assert!(late.contains("Replace [[ -7 / +6 ]]"), "{late}");

    ev(StreamEvent::ContentBlockStop { index: 0 });
    ev(StreamEvent::MessageDelta {
        stop_reason: Some(StopReason::EndTurn),
        usage: Usage::default(),
    });
    ev(StreamEvent::MessageStop);
    f.app.settle().await;

    let done = f.app.rendered_text();
    assert!(
        done.contains("✏️✅ Replace [[ -7 / +6 ]] in `measure-selection-box.tsx`"),
        "{done}"
    );
    assert_eq!(
        std::fs::read_to_string(f.dir.path().join("measure-selection-box.tsx")).unwrap(),
        "1\n2\n3\n4\n5\n6"
    );
}

// ── Scenario 3: bash denial ──────────────────────────────────────────────────

#[tokio::test]
async fn bash_denial_keeps_thread_alive() {
    let mut f = fixture(vec![
        ScriptedProvider::tool_use_turn(
            "",
            "tr-3",
            "bash_command",
            r#"{"command":"echo test"}"#,
        ),
        ScriptedProvider::text_turn("Understood.", StopReason::EndTurn),
    ])
    .await;

    f.send_user("run echo please");
    f.app.settle().await;

    let prompt = f.app.rendered_text();
    assert!(
        prompt.contains("May I run command `echo test`? [ NO ] [ YES ] [ ALWAYS ]"),
        "{prompt}"
    );

    f.press_on("May I run command", "n").await;

    let results = f.tool_results();
    assert_eq!(results.len(), 1);
    assert!(results[0].1, "denial is an error result");
    assert_eq!(results[0].2, "The user did not allow running this command.");

    // The thread looped into the follow-up turn and finished normally.
    assert_eq!(f.root_thread().status, ThreadStatus::Idle);
    assert!(f.app.rendered_text().contains("Understood."));
}

// ── Scenario 4: gitignored read requires approval ────────────────────────────

#[tokio::test]
async fn gitignored_read_approval_adds_to_context() {
    let mut f = fixture(vec![
        ScriptedProvider::tool_use_turn(
            "",
            "tr-4",
            "get_file",
            r#"{"filePath":"ignored-file.txt"}"#,
        ),
        ScriptedProvider::text_turn("Got it.", StopReason::EndTurn),
    ])
    .await;
    std::fs::write(f.dir.path().join(".gitignore"), "ignored-file.txt\n").unwrap();
    std::fs::write(f.dir.path().join("ignored-file.txt"), "tip: hidden").unwrap();

    f.send_user("read the ignored file");
    f.app.settle().await;
    assert!(f
        .app
        .rendered_text()
        .contains("May I read `ignored-file.txt`?"));

    f.press_on("May I read", "y").await;

    let results = f.tool_results();
    assert!(!results[0].1, "{}", results[0].2);
    assert_eq!(results[0].2, "tip: hidden");

    let listing = f.root_thread().context.listing().unwrap();
    assert!(listing.contains("- `ignored-file.txt`"), "{listing}");
}

// ── Scenario 5: PDF page extraction ──────────────────────────────────────────

#[tokio::test]
async fn pdf_descriptor_then_page_fetch() {
    fn fake_pdf(pages: usize) -> Vec<u8> {
        let mut out = b"%PDF-1.4\n1 0 obj << /Type /Pages >> endobj\n".to_vec();
        for i in 0..pages {
            out.extend_from_slice(
                format!("{} 0 obj << /Type /Page >> endobj\n", i + 2).as_bytes(),
            );
        }
        out
    }

    let mut f = fixture(vec![
        ScriptedProvider::tool_use_turn("", "tr-5", "get_file", r#"{"filePath":"multipage.pdf"}"#),
        ScriptedProvider::tool_use_turn(
            "",
            "tr-6",
            "get_file",
            r#"{"filePath":"multipage.pdf","pdfPage":2}"#,
        ),
        ScriptedProvider::text_turn("Read page two.", StopReason::EndTurn),
    ])
    .await;
    std::fs::write(f.dir.path().join("multipage.pdf"), fake_pdf(3)).unwrap();

    f.send_user("what's in the pdf?");
    f.app.settle().await;

    let results = f.tool_results();
    assert!(results[0].2.contains("Pages: 3"), "{}", results[0].2);

    let page_result = f
        .root_thread()
        .messages
        .iter()
        .flat_map(|m| m.parts.iter())
        .find_map(|p| match p {
            Part::ToolResult(r) if r.request_id.0 == "tr-6" => Some(r.clone()),
            _ => None,
        })
        .expect("page fetch result");
    match &page_result.content[0] {
        sidecar_provider::ResultContent::Document { mime, title, .. } => {
            assert_eq!(mime, "application/pdf");
            assert_eq!(title.as_deref(), Some("multipage.pdf - Page 2"));
        }
        other => panic!("expected document part, got {other:?}"),
    }

    let listing = f.root_thread().context.listing().unwrap();
    assert!(
        listing.contains("- `multipage.pdf` (summary, page 2)"),
        "{listing}"
    );
}

// ── Scenario 6: blocking subagent ────────────────────────────────────────────

#[tokio::test]
async fn blocking_subagent_yields_to_parent() {
    let mut f = fixture(vec![
        // Root turn: spawn a blocking subagent.
        ScriptedProvider::tool_use_turn(
            "",
            "tr-7",
            "spawn_subagent",
            r#"{"prompt":"count the files","blocking":true}"#,
        ),
        // Child turn: immediately yield a result.
        ScriptedProvider::tool_use_turn(
            "",
            "tr-8",
            "yield_to_parent",
            r#"{"result":"42 files"}"#,
        ),
        // Root follow-up after the child's result arrives.
        ScriptedProvider::text_turn("The sub-agent found 42 files.", StopReason::EndTurn),
    ])
    .await;

    f.send_user("delegate the counting");
    f.app.settle().await;

    // Parent tool completed with the yielded payload.
    let results = f.tool_results();
    assert!(results.iter().any(|(id, is_err, text)| {
        id.0 == "tr-7" && !is_err && text == "Sub-agent (thread-2) completed:\n42 files"
    }), "{results:?}");

    // The child is yielded, not deleted; its messages stay browsable.
    let child = f.app.chat.thread(ThreadId(2)).expect("child thread");
    assert_eq!(
        child.status,
        ThreadStatus::Yielded {
            response: "42 files".into()
        }
    );
    assert!(!child.messages.is_empty());

    // No further assistant turns in the child: exactly one provider call
    // carried the child's model (the other two belong to the root).
    assert_eq!(f.provider.requests.lock().unwrap().len(), 3);

    // Selecting the link on the summary switches to the child thread.
    f.press_on("Sub-agent thread-2", "<CR>").await;
    assert_eq!(f.app.chat.active, Some(ThreadId(2)));

    // Parent finished its follow-up turn.
    assert!(f
        .app
        .chat
        .thread(ThreadId(1))
        .unwrap()
        .messages
        .iter()
        .any(|m| m.text().contains("The sub-agent found 42 files.")));
}

// ── Thread invariants ────────────────────────────────────────────────────────

#[tokio::test]
async fn abort_terminates_every_executor_and_replies() {
    let mut f = fixture(vec![
        // Root spawns a blocking subagent that never yields.
        ScriptedProvider::tool_use_turn(
            "",
            "tr-9",
            "spawn_subagent",
            r#"{"prompt":"stall","blocking":true}"#,
        ),
        // Child turn ends without yielding.
        ScriptedProvider::text_turn("thinking about it", StopReason::EndTurn),
    ])
    .await;

    f.send_user("spawn and stall");
    f.app.settle().await;
    assert_eq!(f.root_thread().status, ThreadStatus::ToolWait);

    f.app.dispatcher().send(RootMsg::Thread {
        id: ThreadId(1),
        msg: ThreadMsg::Abort,
    });
    f.app.settle().await;

    let root = f.root_thread();
    assert_eq!(
        root.status,
        ThreadStatus::Stopped {
            reason: "aborted".into()
        }
    );
    assert!(root.tool_manager.all_done(), "no executor left non-terminal");
    let results = f.tool_results();
    assert_eq!(results.len(), 1);
    assert!(results[0].1);
    assert_eq!(results[0].2, "aborted");
}

#[tokio::test]
async fn provider_error_marks_thread_errored_but_inspectable() {
    let dir = tempfile::tempdir().unwrap();
    let mut config: Config = serde_json::from_str("{}").unwrap();
    config.profiles = vec![serde_json::from_str(
        r#"{"name":"default","provider":"failing-mock","model":"m"}"#,
    )
    .unwrap()];
    config.active_profile = "default".into();
    let mut registry = ProviderRegistry::new();
    registry.register(Arc::new(sidecar_provider::mock::FailingProvider));
    let editor = Arc::new(MockEditor::new());
    let mut app = App::start(
        editor,
        Arc::new(NullLspBridge),
        Arc::new(NullMcpHost),
        Arc::new(config),
        Arc::new(registry),
        dir.path().to_path_buf(),
    )
    .await
    .unwrap();
    app.settle().await;

    app.dispatcher().send(RootMsg::Thread {
        id: ThreadId(1),
        msg: ThreadMsg::SendMessage {
            text: "hello?".into(),
        },
    });
    app.settle().await;

    let thread = app.chat.thread(ThreadId(1)).unwrap();
    assert!(matches!(thread.status, ThreadStatus::Errored { .. }));
    // The error surfaced as a synthetic assistant text part.
    assert!(thread
        .messages
        .iter()
        .any(|m| m.text().contains("Provider error:")));
    // And the sidebar still renders something.
    assert!(app.rendered_text().contains("error"));
}

#[tokio::test]
async fn sidebar_streams_text_deltas_incrementally() {
    let mut f = fixture(vec![]).await;
    let d = f.app.dispatcher();
    let ev = |e: StreamEvent| {
        d.send(RootMsg::Thread {
            id: ThreadId(1),
            msg: ThreadMsg::StreamEvent(e),
        })
    };

    ev(StreamEvent::ContentBlockStart {
        index: 0,
        block: BlockStart::Text {
            text: String::new(),
        },
    });
    ev(StreamEvent::ContentBlockDelta {
        index: 0,
        delta: BlockDelta::TextDelta {
            text: "Hello".into(),
        },
    });
    f.app.settle().await;
    assert!(f.app.rendered_text().contains("Hello"));

    ev(StreamEvent::ContentBlockDelta {
        index: 0,
        delta: BlockDelta::TextDelta {
            text: ", world".into(),
        },
    });
    f.app.settle().await;
    assert!(f.app.rendered_text().contains("Hello, world"));

    // The buffer text always equals the view of the current model state.
    let editor_text = f.editor.text(f.app.buffer());
    assert_eq!(editor_text, f.app.rendered_text());
}

#[tokio::test]
async fn thread_title_tool_sets_title() {
    let mut f = fixture(vec![ScriptedProvider::tool_use_turn(
        "",
        "tr-10",
        "thread_title",
        r#"{"title":"Note taking"}"#,
    ), ScriptedProvider::text_turn("done", StopReason::EndTurn)])
    .await;

    f.send_user("title this thread");
    f.app.settle().await;

    assert_eq!(f.root_thread().title.as_deref(), Some("Note taking"));
    assert!(f.app.rendered_text().contains("Note taking"));
}

#[tokio::test]
async fn compact_rewrites_history_and_continues() {
    let mut f = fixture(vec![
        ScriptedProvider::text_turn("first answer", StopReason::EndTurn),
        ScriptedProvider::tool_use_turn(
            "",
            "tr-11",
            "compact",
            r#"{"summary":"We discussed the plan.","continuation":"Carry on."}"#,
        ),
        ScriptedProvider::text_turn("carrying on", StopReason::EndTurn),
    ])
    .await;

    f.send_user("let's plan");
    f.app.settle().await;
    f.send_user("now compact yourself");
    f.app.settle().await;

    let thread = f.root_thread();
    // The rewritten head is a single synthetic assistant summary, followed
    // by the continuation user message.
    assert_eq!(thread.messages[0].text(), "We discussed the plan.");
    assert_eq!(thread.messages[1].text(), "Carry on.");
    // The pre-compaction turn is gone.
    assert!(!thread
        .messages
        .iter()
        .any(|m| m.text().contains("first answer")));
    // The post-compaction stream ran.
    assert!(thread
        .messages
        .iter()
        .any(|m| m.text().contains("carrying on")));
}

#[tokio::test]
async fn spawn_foreach_and_wait_collects_results() {
    // The fan-out turn ends the root's turn so the two children drain
    // their scripts before the root streams again; the wait turn is then
    // driven by a second user message.
    let mut f = fixture(vec![
        end_turn_with_tool(
            "",
            "tr-12",
            "spawn_foreach",
            r#"{"prompt":"inspect","inputs":["a.rs","b.rs"]}"#,
        ),
        // The two children each consume one of these, in spawn order.
        ScriptedProvider::tool_use_turn("", "tr-13", "yield_to_parent", r#"{"result":"inspected"}"#),
        ScriptedProvider::tool_use_turn("", "tr-14", "yield_to_parent", r#"{"result":"inspected"}"#),
        ScriptedProvider::tool_use_turn(
            "",
            "tr-15",
            "wait_for_subagents",
            r#"{"threadIds":[2,3]}"#,
        ),
        ScriptedProvider::text_turn("all collected", StopReason::EndTurn),
    ])
    .await;

    f.send_user("review both files");
    f.app.settle().await;

    let foreach = f
        .tool_results()
        .into_iter()
        .find(|(id, _, _)| id.0 == "tr-12")
        .expect("foreach result");
    assert!(!foreach.1, "{}", foreach.2);
    assert!(foreach.2.contains("thread ids: 2, 3"), "{}", foreach.2);

    f.send_user("now collect the results");
    f.app.settle().await;

    let results = f.tool_results();
    let wait = results
        .iter()
        .find(|(id, _, _)| id.0 == "tr-15")
        .expect("wait result");
    assert!(!wait.1, "{}", wait.2);
    assert!(wait.2.contains("thread-2: completed: inspected"), "{}", wait.2);
    assert!(wait.2.contains("thread-3: completed: inspected"), "{}", wait.2);
    assert_eq!(f.root_thread().status, ThreadStatus::Idle);
}
