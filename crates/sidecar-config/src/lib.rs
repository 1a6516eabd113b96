// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Configuration surface consumed by the sidecar core: profiles, command
//! allow/deny rules, read auto-allow globs, skills paths, MCP descriptors.

mod loader;
mod schema;

pub use loader::load;
pub use schema::{CommandConfig, Config, ProfileConfig, ThreadType};
