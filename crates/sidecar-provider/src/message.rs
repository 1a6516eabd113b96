// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use serde::{Deserialize, Serialize};

use crate::ids::{MessageId, ToolRequestId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One typed segment of a message, in order of arrival.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Part {
    Text {
        text: String,
    },
    /// Provider chain-of-thought.  Preserved for replay, stripped by
    /// compaction.
    Thinking {
        text: String,
    },
    ToolUse {
        request_id: ToolRequestId,
        name: String,
        input: serde_json::Value,
    },
    ToolResult(ToolResultBlock),
    /// Adornment appended to user messages (context listings and the like).
    /// Stripped by compaction.
    SystemReminder {
        text: String,
    },
    Image {
        mime: String,
        #[serde(with = "serde_bytes_b64")]
        data: Vec<u8>,
    },
    Document {
        mime: String,
        #[serde(with = "serde_bytes_b64")]
        data: Vec<u8>,
        title: Option<String>,
    },
}

/// The result of one tool invocation, matched to its `ToolUse` by request id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResultBlock {
    pub request_id: ToolRequestId,
    pub content: Vec<ResultContent>,
    pub is_error: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResultContent {
    Text {
        text: String,
    },
    Document {
        mime: String,
        #[serde(with = "serde_bytes_b64")]
        data: Vec<u8>,
        title: Option<String>,
    },
}

impl ToolResultBlock {
    pub fn ok(request_id: ToolRequestId, text: impl Into<String>) -> Self {
        Self {
            request_id,
            content: vec![ResultContent::Text { text: text.into() }],
            is_error: false,
        }
    }

    pub fn err(request_id: ToolRequestId, msg: impl Into<String>) -> Self {
        Self {
            request_id,
            content: vec![ResultContent::Text { text: msg.into() }],
            is_error: true,
        }
    }

    pub fn with_content(request_id: ToolRequestId, content: Vec<ResultContent>) -> Self {
        Self {
            request_id,
            content,
            is_error: false,
        }
    }

    /// Concatenation of all text content.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|c| match c {
                ResultContent::Text { text } => Some(text.as_str()),
                ResultContent::Document { .. } => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// One message in a thread: an ordered sequence of typed parts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub role: Role,
    pub parts: Vec<Part>,
}

impl Message {
    pub fn user(id: MessageId, text: impl Into<String>) -> Self {
        Self {
            id,
            role: Role::User,
            parts: vec![Part::Text { text: text.into() }],
        }
    }

    pub fn assistant(id: MessageId) -> Self {
        Self {
            id,
            role: Role::Assistant,
            parts: Vec::new(),
        }
    }

    pub fn with_parts(id: MessageId, role: Role, parts: Vec<Part>) -> Self {
        Self { id, role, parts }
    }

    /// Concatenated text parts (thinking and tool traffic excluded).
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                Part::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }

    pub fn tool_uses(&self) -> impl Iterator<Item = (&ToolRequestId, &str)> {
        self.parts.iter().filter_map(|p| match p {
            Part::ToolUse {
                request_id, name, ..
            } => Some((request_id, name.as_str())),
            _ => None,
        })
    }

    /// Strip parts that compaction removes: system reminders from user
    /// messages, thinking from assistant messages.
    pub fn stripped_for_compaction(&self) -> Message {
        let parts = self
            .parts
            .iter()
            .filter(|p| match (self.role, p) {
                (Role::User, Part::SystemReminder { .. }) => false,
                (Role::Assistant, Part::Thinking { .. }) => false,
                _ => true,
            })
            .cloned()
            .collect();
        Message {
            id: self.id,
            role: self.role,
            parts,
        }
    }
}

/// Base64 wire encoding for binary part payloads.
mod serde_bytes_b64 {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(data: &[u8], ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(&STANDARD.encode(data))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(de)?;
        STANDARD.decode(s.as_bytes()).map_err(serde::de::Error::custom)
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
