// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Editor-facing primitives: typed buffer positions, the [`Editor`] trait
//! consumed by the view engine and tools, the language-server bridge
//! interface, and an in-memory mock for tests.

mod buffer;
mod mock;
mod pos;

pub use buffer::{
    BufferId, Diagnostic, DiagnosticSeverity, Editor, ExtmarkId, ExtmarkOptions, LspBridge,
    NullLspBridge,
};
pub use mock::{MockEditor, MockExtmark};
pub use pos::{ByteIdx, Pos, PosCol1, StringIdx};
