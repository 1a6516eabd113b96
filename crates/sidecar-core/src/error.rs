// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use thiserror::Error;

/// Error taxonomy of the core.  Tools never raise these up the stack
/// (they capture failures into error tool results), so the variants mostly
/// classify how a failure is surfaced and logged.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Validation failure in tool input or command syntax; surfaced as a
    /// tool `done(error)` with a user-readable message.
    #[error("invalid input: {0}")]
    UserInput(String),

    /// The user rejected a prompt or policy forbids the action.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// File not found, buffer invalid, command not found, timeout, signal.
    #[error("environment error: {0}")]
    Environment(String),

    /// Transport or decoding failure from the LLM; the thread records it
    /// and transitions to `errored` but remains inspectable.
    #[error("provider error: {0}")]
    Provider(String),

    /// Should not happen; the affected subtree is replaced wholesale and
    /// the app keeps running.
    #[error("internal invariant violated: {0}")]
    InternalInvariant(String),
}
