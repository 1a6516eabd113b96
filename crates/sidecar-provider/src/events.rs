// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The unified streaming envelope.  Wire adapters for concrete providers
//! translate their formats into this shape; the thread decodes only this.

use serde::{Deserialize, Serialize};

use crate::ids::ToolRequestId;

/// Opening of a content block at a stream index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BlockStart {
    Text {
        #[serde(default)]
        text: String,
    },
    Thinking {
        #[serde(default)]
        thinking: String,
    },
    ToolUse {
        id: ToolRequestId,
        name: String,
    },
}

/// Incremental payload for an open content block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BlockDelta {
    TextDelta { text: String },
    ThinkingDelta { thinking: String },
    /// A fragment of the JSON-encoded tool input.  Accumulated until the
    /// block stops, then parsed as a whole.
    InputJsonDelta { partial_json: String },
}

/// Provider-reported termination of a streaming turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    ToolUse,
    MaxTokens,
    StopSequence,
    Aborted,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// One event of the unified stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    ContentBlockStart {
        index: usize,
        block: BlockStart,
    },
    ContentBlockDelta {
        index: usize,
        delta: BlockDelta,
    },
    ContentBlockStop {
        index: usize,
    },
    MessageDelta {
        stop_reason: Option<StopReason>,
        #[serde(default)]
        usage: Usage,
    },
    MessageStop,
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_event_serialization_is_snake_case_tagged() {
        let ev = StreamEvent::ContentBlockDelta {
            index: 2,
            delta: BlockDelta::InputJsonDelta {
                partial_json: "{\"f".into(),
            },
        };
        let json = serde_json::to_string(&ev).unwrap();
        assert!(json.contains("content_block_delta"), "{json}");
        assert!(json.contains("input_json_delta"), "{json}");
        let back: StreamEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ev);
    }

    #[test]
    fn stop_reason_round_trips() {
        for r in [
            StopReason::EndTurn,
            StopReason::ToolUse,
            StopReason::MaxTokens,
            StopReason::StopSequence,
            StopReason::Aborted,
        ] {
            let json = serde_json::to_string(&r).unwrap();
            let back: StopReason = serde_json::from_str(&json).unwrap();
            assert_eq!(back, r);
        }
    }
}
