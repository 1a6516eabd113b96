// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Test support: a recording dispatch port and ready-made tool contexts.
//! Compiled unconditionally (like the scripted providers) so downstream
//! crates can drive executors in their own tests.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use sidecar_config::Config;
use sidecar_editor::{MockEditor, NullLspBridge};
use sidecar_provider::{ThreadId, ToolRequestId};

use crate::executor::{
    NullMcpHost, ToolCtx, ToolDispatch, ToolEffectMsg, ToolEnv, ToolRequest,
};
use crate::name::ToolName;
use crate::policy::{CommandPolicy, FilePolicy};

/// Dispatch port that records every effect for assertions.
pub struct RecordingDispatch(pub Arc<Mutex<Vec<ToolEffectMsg>>>);

impl ToolDispatch for RecordingDispatch {
    fn send(&self, msg: ToolEffectMsg) {
        self.0.lock().unwrap().push(msg);
    }
}

static SCRATCH_COUNTER: AtomicU64 = AtomicU64::new(0);

fn scratch_dir() -> PathBuf {
    let n = SCRATCH_COUNTER.fetch_add(1, Ordering::Relaxed);
    let dir = std::env::temp_dir().join(format!("sidecar-tools-test-{}-{n}", std::process::id()));
    std::fs::create_dir_all(&dir).expect("scratch dir");
    dir
}

/// A tool context plus the handles tests assert against.
pub struct ToolHarness {
    pub cx: ToolCtx,
    pub sent: Arc<Mutex<Vec<ToolEffectMsg>>>,
    pub editor: Arc<MockEditor>,
    pub project_root: PathBuf,
}

/// Build a harness rooted at `project_root` with default config.
pub fn harness(project_root: &Path) -> ToolHarness {
    harness_with_config(project_root, default_config())
}

pub fn harness_with_config(project_root: &Path, config: Config) -> ToolHarness {
    let sent = Arc::new(Mutex::new(Vec::new()));
    let editor = Arc::new(MockEditor::new());
    let config = Arc::new(config);
    let env = Arc::new(ToolEnv {
        file_policy: FilePolicy::new(&config, project_root),
        command_policy: CommandPolicy::from_config(&config.command),
        config,
        editor: editor.clone(),
        lsp: Arc::new(NullLspBridge),
        mcp: Arc::new(NullMcpHost),
        dispatch: Arc::new(RecordingDispatch(sent.clone())),
        project_root: project_root.to_path_buf(),
        artifacts_root: scratch_dir(),
    });
    let cx = ToolCtx {
        env,
        thread_id: ThreadId(1),
        remembered: Arc::new(Mutex::new(Default::default())),
        attached: Arc::new(HashMap::new()),
        thread_results: Arc::new(HashMap::new()),
    };
    ToolHarness {
        cx,
        sent,
        editor,
        project_root: project_root.to_path_buf(),
    }
}

fn default_config() -> Config {
    serde_json::from_str("{}").expect("empty config")
}

/// Context rooted in a scratch directory, for tools that never touch the
/// project tree.
pub fn recorded_ctx() -> (ToolCtx, Arc<Mutex<Vec<ToolEffectMsg>>>) {
    let root = scratch_dir();
    let h = harness(&root);
    (h.cx, h.sent)
}

pub fn request_for(name: ToolName, input: serde_json::Value) -> ToolRequest {
    ToolRequest {
        id: ToolRequestId("tr-test".into()),
        name,
        input,
    }
}

/// Wait until at least `n` effects have been recorded (effects run on
/// spawned tasks, so tests must yield to the runtime).
pub async fn wait_for_effects(sent: &Arc<Mutex<Vec<ToolEffectMsg>>>, n: usize) {
    for _ in 0..200 {
        if sent.lock().unwrap().len() >= n {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!(
        "timed out waiting for {n} effects; got {}",
        sent.lock().unwrap().len()
    );
}
