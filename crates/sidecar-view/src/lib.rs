// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Incremental template-literal view engine.  A view function produces an
//! immutable VDOM ([`Node`]); [`mount`] renders it into a buffer range and
//! [`update`] reconciles subsequent renders with minimal buffer mutations,
//! remapping positions through an accumulated row/column drift.

mod bindings;
mod mount;
mod node;
mod reconcile;
mod scheduler;

pub use bindings::binding_at;
pub use mount::{mount, unmount, MountedContent, MountedNode, MountedView};
pub use node::{Action, Bindings, Content, IntoNode, Key, Node, TemplateKey};
pub use reconcile::{apply_edit, remap_pos, remap_range, update, AccumulatedEdit};
pub use scheduler::RenderScheduler;
