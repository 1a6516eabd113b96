// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The app shell: owns the root model and the mounted sidebar view,
//! drains the single root queue, and coalesces renders.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, error};

use sidecar_config::{Config, ThreadType};
use sidecar_editor::{BufferId, Editor, LspBridge, Pos};
use sidecar_provider::ProviderRegistry;
use sidecar_tools::{CommandPolicy, FilePolicy, McpHost, ToolEnv};
use sidecar_view::{binding_at, mount, unmount, Key, MountedView, RenderScheduler};

use crate::chat::Chat;
use crate::msg::{ChatMsg, Dispatcher, RootMsg};
use crate::view::root_view;

pub struct App {
    pub chat: Chat,
    env: Arc<ToolEnv>,
    editor: Arc<dyn Editor>,
    dispatcher: Dispatcher,
    rx: tokio::sync::mpsc::UnboundedReceiver<RootMsg>,
    buffer: BufferId,
    mounted: Option<MountedView>,
    scheduler: RenderScheduler,
    errored: bool,
}

impl App {
    /// Mount the sidebar buffer, wire the model tree, and queue creation
    /// of the initial root thread.
    pub async fn start(
        editor: Arc<dyn Editor>,
        lsp: Arc<dyn LspBridge>,
        mcp: Arc<dyn McpHost>,
        config: Arc<Config>,
        registry: Arc<ProviderRegistry>,
        project_root: PathBuf,
    ) -> anyhow::Result<Self> {
        let (dispatcher, rx) = Dispatcher::new();
        let buffer = editor.create_buffer("sidecar://chat").await?;
        let env = Arc::new(ToolEnv {
            file_policy: FilePolicy::new(&config, &project_root),
            command_policy: CommandPolicy::from_config(&config.command),
            config: config.clone(),
            editor: editor.clone(),
            lsp,
            mcp,
            dispatch: Arc::new(dispatcher.clone()),
            project_root,
            artifacts_root: std::env::temp_dir().join("sidecar"),
        });
        let chat = Chat::new(config, registry, dispatcher.clone());
        dispatcher.send(RootMsg::Chat(ChatMsg::NewThread {
            thread_type: ThreadType::Root,
            profile: None,
        }));
        Ok(Self {
            chat,
            env,
            editor,
            dispatcher,
            rx,
            buffer,
            mounted: None,
            scheduler: RenderScheduler::new(),
            errored: false,
        })
    }

    /// The outbound port handed to the host (key handler, timers, tests).
    pub fn dispatcher(&self) -> Dispatcher {
        self.dispatcher.clone()
    }

    pub fn buffer(&self) -> BufferId {
        self.buffer
    }

    /// Drain the root queue until shutdown.
    pub async fn run(mut self) {
        while let Some(msg) = self.rx.recv().await {
            self.step(msg).await;
        }
    }

    /// Apply one message and schedule a render.
    pub async fn step(&mut self, msg: RootMsg) {
        self.handle_msg(msg).await;
        self.render().await;
    }

    async fn handle_msg(&mut self, msg: RootMsg) {
        match msg {
            RootMsg::Chat(m) => self.chat.handle_chat_msg(m, &self.env),
            RootMsg::Thread { id, msg } => self.chat.handle_thread_msg(id, msg, &self.env),
            RootMsg::Key(key) => self.on_key(key).await,
            RootMsg::Tick => {}
        }
    }

    /// Resolve the cursor in the sidebar and invoke the deepest binding
    /// that defines this key.  Keys outside the sidebar are ignored.
    pub async fn on_key(&mut self, key: Key) {
        let Ok(current) = self.editor.current_buffer().await else {
            return;
        };
        if current != self.buffer {
            return;
        }
        let Ok(cursor) = self.editor.cursor().await else {
            return;
        };
        if let Some(mounted) = &self.mounted {
            if let Some(action) = binding_at(&mounted.root, cursor, &key) {
                action.invoke();
            }
        }
    }

    /// Coalesced render: at most one in flight, one follow-up for any
    /// burst.  Render errors against an invalid buffer are swallowed;
    /// against a valid buffer they park the app in the error state.
    async fn render(&mut self) {
        if self.errored || !self.scheduler.request() {
            return;
        }
        loop {
            if let Err(e) = self.render_once().await {
                let buffer_alive = self
                    .editor
                    .buffer_is_valid(self.buffer)
                    .await
                    .unwrap_or(false);
                if buffer_alive {
                    error!(error = %e, "render failed; stopping further renders");
                    self.errored = true;
                } else {
                    debug!(error = %e, "render against dead buffer ignored");
                }
                self.scheduler.complete();
                return;
            }
            if !self.scheduler.complete() {
                return;
            }
        }
    }

    async fn render_once(&mut self) -> anyhow::Result<()> {
        let vdom = root_view(&self.chat, &self.dispatcher);
        match &mut self.mounted {
            Some(view) => sidecar_view::update(&self.editor, view, vdom).await,
            None => {
                let view = mount(
                    &self.editor,
                    self.buffer,
                    Pos::origin(),
                    Pos::origin(),
                    vdom,
                )
                .await?;
                self.mounted = Some(view);
                Ok(())
            }
        }
    }

    /// Unmount the view and stop handling messages.
    pub async fn destroy(mut self) {
        if let Some(view) = self.mounted.take() {
            let _ = unmount(&self.editor, view).await;
        }
        self.rx.close();
    }

    /// Test support: process queued messages until the queue stays empty
    /// for a short idle window (spawned effects settle in between).
    pub async fn settle(&mut self) {
        loop {
            match tokio::time::timeout(
                std::time::Duration::from_millis(150),
                self.rx.recv(),
            )
            .await
            {
                Ok(Some(msg)) => self.step(msg).await,
                Ok(None) | Err(_) => return,
            }
        }
    }

    /// Test support: the rendered sidebar text, reconstructed from the
    /// mounted tree.
    pub fn rendered_text(&self) -> String {
        self.mounted
            .as_ref()
            .map(|m| m.root.render_text())
            .unwrap_or_default()
    }

    pub fn is_errored(&self) -> bool {
        self.errored
    }
}
