// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Pre-scripted providers for tests.  Each call to `stream` pops the next
//! event script from the front of the queue, so tests can specify exact
//! envelope sequences, including streamed tool calls, without network
//! access.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::stream;

use crate::events::{BlockDelta, BlockStart, StopReason, StreamEvent, Usage};
use crate::ids::ToolRequestId;
use crate::provider::{CompletionRequest, EventStream, Provider};

pub struct ScriptedProvider {
    scripts: Arc<Mutex<Vec<Vec<StreamEvent>>>>,
    /// The last `CompletionRequest` seen by this provider.  Written on each
    /// `stream()` call so tests can inspect what was sent.
    pub last_request: Arc<Mutex<Option<CompletionRequest>>>,
    /// Every request seen, in order.
    pub requests: Arc<Mutex<Vec<CompletionRequest>>>,
}

impl ScriptedProvider {
    /// Build a provider from a list of scripts.  The outer `Vec` is the
    /// ordered list of calls; the inner `Vec` the events emitted per call.
    pub fn new(scripts: Vec<Vec<StreamEvent>>) -> Self {
        Self {
            scripts: Arc::new(Mutex::new(scripts)),
            last_request: Arc::new(Mutex::new(None)),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Append another script after construction (for multi-turn tests that
    /// decide later rounds on the fly).
    pub fn push_script(&self, script: Vec<StreamEvent>) {
        self.scripts.lock().unwrap().push(script);
    }

    /// Events for a single complete text turn ending in `stop_reason`.
    pub fn text_turn(text: &str, stop_reason: StopReason) -> Vec<StreamEvent> {
        vec![
            StreamEvent::ContentBlockStart {
                index: 0,
                block: BlockStart::Text { text: String::new() },
            },
            StreamEvent::ContentBlockDelta {
                index: 0,
                delta: BlockDelta::TextDelta { text: text.into() },
            },
            StreamEvent::ContentBlockStop { index: 0 },
            StreamEvent::MessageDelta {
                stop_reason: Some(stop_reason),
                usage: Usage {
                    input_tokens: 5,
                    output_tokens: 5,
                },
            },
            StreamEvent::MessageStop,
        ]
    }

    /// Events for a turn that emits `text` then a complete tool call whose
    /// JSON input streams in one delta.
    pub fn tool_use_turn(
        text: &str,
        request_id: &str,
        tool_name: &str,
        input_json: &str,
    ) -> Vec<StreamEvent> {
        vec![
            StreamEvent::ContentBlockStart {
                index: 0,
                block: BlockStart::Text { text: String::new() },
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
                    name: tool_name.into(),
                },
            },
            StreamEvent::ContentBlockDelta {
                index: 1,
                delta: BlockDelta::InputJsonDelta {
                    partial_json: input_json.into(),
                },
            },
            StreamEvent::ContentBlockStop { index: 1 },
            StreamEvent::MessageDelta {
                stop_reason: Some(StopReason::ToolUse),
                usage: Usage::default(),
            },
            StreamEvent::MessageStop,
        ]
    }

    /// Convenience: provider that always returns a single end-turn text reply.
    pub fn always_text(reply: impl Into<String>) -> Self {
        Self::new(vec![Self::text_turn(&reply.into(), StopReason::EndTurn)])
    }

    /// Convenience: tool call round followed by a text round.
    pub fn tool_then_text(
        request_id: &str,
        tool_name: &str,
        input_json: &str,
        final_text: &str,
    ) -> Self {
        Self::new(vec![
            Self::tool_use_turn("", request_id, tool_name, input_json),
            Self::text_turn(final_text, StopReason::EndTurn),
        ])
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted-mock"
    }

    async fn stream(&self, req: CompletionRequest) -> anyhow::Result<EventStream> {
        *self.last_request.lock().unwrap() = Some(req.clone());
        self.requests.lock().unwrap().push(req);
        let events = {
            let mut scripts = self.scripts.lock().unwrap();
            if scripts.is_empty() {
                // Default fallback when all scripts are consumed.
                Self::text_turn("[no more scripts]", StopReason::EndTurn)
            } else {
                scripts.remove(0)
            }
        };
        let wrapped: Vec<anyhow::Result<StreamEvent>> = events.into_iter().map(Ok).collect();
        Ok(Box::pin(stream::iter(wrapped)))
    }
}

/// Provider whose stream always fails, for error-path tests.
pub struct FailingProvider;

#[async_trait]
impl Provider for FailingProvider {
    fn name(&self) -> &str {
        "failing-mock"
    }

    async fn stream(&self, _req: CompletionRequest) -> anyhow::Result<EventStream> {
        anyhow::bail!("connection refused")
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use futures::StreamExt;

    use super::*;
    use crate::ids::MessageId;
    use crate::message::Message;

    fn req() -> CompletionRequest {
        CompletionRequest {
            model: "m".into(),
            system: "sys".into(),
            messages: vec![Message::user(MessageId(0), "hi")],
            tools: vec![],
        }
    }

    #[tokio::test]
    async fn always_text_emits_full_envelope() {
        let p = ScriptedProvider::always_text("hello");
        let mut s = p.stream(req()).await.unwrap();
        let mut events = Vec::new();
        while let Some(e) = s.next().await {
            events.push(e.unwrap());
        }
        assert!(matches!(
            events.first(),
            Some(StreamEvent::ContentBlockStart { index: 0, .. })
        ));
        assert!(matches!(events.last(), Some(StreamEvent::MessageStop)));
        assert!(events.iter().any(|e| matches!(
            e,
            StreamEvent::MessageDelta {
                stop_reason: Some(StopReason::EndTurn),
                ..
            }
        )));
    }

    #[tokio::test]
    async fn tool_then_text_pops_scripts_in_order() {
        let p = ScriptedProvider::tool_then_text("tr-1", "get_file", r#"{"filePath":"a"}"#, "done");
        let first: Vec<_> = p
            .stream(req())
            .await
            .unwrap()
            .map(Result::unwrap)
            .collect()
            .await;
        assert!(first.iter().any(|e| matches!(
            e,
            StreamEvent::ContentBlockStart {
                block: BlockStart::ToolUse { name, .. },
                ..
            } if name == "get_file"
        )));
        let second: Vec<_> = p
            .stream(req())
            .await
            .unwrap()
            .map(Result::unwrap)
            .collect()
            .await;
        assert!(second.iter().any(|e| matches!(
            e,
            StreamEvent::ContentBlockDelta {
                delta: BlockDelta::TextDelta { text },
                ..
            } if text == "done"
        )));
    }

    #[tokio::test]
    async fn last_request_is_captured() {
        let p = ScriptedProvider::always_text("x");
        let _ = p.stream(req()).await.unwrap();
        let last = p.last_request.lock().unwrap();
        assert_eq!(last.as_ref().unwrap().system, "sys");
    }

    #[tokio::test]
    async fn exhausted_scripts_fall_back() {
        let p = ScriptedProvider::new(vec![]);
        let events: Vec<_> = p
            .stream(req())
            .await
            .unwrap()
            .map(Result::unwrap)
            .collect()
            .await;
        assert!(events.iter().any(|e| matches!(
            e,
            StreamEvent::ContentBlockDelta {
                delta: BlockDelta::TextDelta { text },
                ..
            } if text.contains("no more scripts")
        )));
    }
}
