// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::sync::Arc;

use sidecar_editor::ExtmarkOptions;

/// Identity of the template literal that produced a node.  Two `Template`
/// nodes are shape-compatible iff their keys are identical and their child
/// counts match.  Keys are interned per call site by [`crate::template_key!`].
pub type TemplateKey = &'static str;

/// A key press as reported by the host editor, e.g. `"t"` or `"<CR>"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Key(pub String);

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key(s.to_string())
    }
}

/// Callback invoked when a bound key fires inside a node's range.  The
/// closure captures a dispatch handle; invoking it enqueues a message, it
/// never mutates model state directly.
#[derive(Clone)]
pub struct Action(Arc<dyn Fn() + Send + Sync>);

impl Action {
    pub fn new(f: impl Fn() + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    pub fn invoke(&self) {
        (self.0)()
    }
}

impl std::fmt::Debug for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Action(..)")
    }
}

pub type Bindings = HashMap<Key, Action>;

/// Structural content of a VDOM node.
#[derive(Debug, Clone)]
pub enum Content {
    Text(String),
    Template {
        key: TemplateKey,
        children: Vec<Node>,
    },
    /// Homogeneous, dynamically sized sequence.  Shape-compatible only with
    /// another array.
    Array(Vec<Node>),
}

/// One node of the virtual document tree.  Immutable per render.
#[derive(Debug, Clone, Default)]
pub struct Node {
    pub content: Content,
    pub bindings: Option<Bindings>,
    pub extmark: Option<ExtmarkOptions>,
}

impl Default for Content {
    fn default() -> Self {
        Content::Text(String::new())
    }
}

impl Node {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: Content::Text(text.into()),
            bindings: None,
            extmark: None,
        }
    }

    pub fn empty() -> Self {
        Self::text("")
    }

    pub fn template(key: TemplateKey, children: Vec<Node>) -> Self {
        Self {
            content: Content::Template { key, children },
            bindings: None,
            extmark: None,
        }
    }

    pub fn array(children: Vec<Node>) -> Self {
        Self {
            content: Content::Array(children),
            bindings: None,
            extmark: None,
        }
    }

    pub fn with_binding(mut self, key: impl Into<Key>, action: Action) -> Self {
        self.bindings
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), action);
        self
    }

    pub fn with_extmark(mut self, opts: ExtmarkOptions) -> Self {
        self.extmark = Some(opts);
        self
    }

    /// Concatenated text of the subtree in document order.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        self.write_text(&mut out);
        out
    }

    fn write_text(&self, out: &mut String) {
        match &self.content {
            Content::Text(t) => out.push_str(t),
            Content::Template { children, .. } | Content::Array(children) => {
                for c in children {
                    c.write_text(out);
                }
            }
        }
    }
}

/// Conversion of interpolated values into VDOM children: strings become
/// `Text` nodes, node sequences become `Array` nodes.
pub trait IntoNode {
    fn into_node(self) -> Node;
}

impl IntoNode for Node {
    fn into_node(self) -> Node {
        self
    }
}

impl IntoNode for String {
    fn into_node(self) -> Node {
        Node::text(self)
    }
}

impl IntoNode for &str {
    fn into_node(self) -> Node {
        Node::text(self)
    }
}

impl IntoNode for Vec<Node> {
    fn into_node(self) -> Node {
        Node::array(self)
    }
}

/// A stable key for the current source location.
#[macro_export]
macro_rules! template_key {
    () => {
        concat!(file!(), ":", line!(), ":", column!())
    };
}

/// Template-literal view constructor.  Literal chunks stay adjacent `Text`
/// children; interpolated values may be strings, nodes, or node sequences.
/// The resulting `Template` node is tagged with a key that is referentially
/// stable across re-invocations of the same call site.
///
/// ```ignore
/// let v = template!["Hello, ", name, "!\n", items];
/// ```
#[macro_export]
macro_rules! template {
    ($($part:expr),* $(,)?) => {
        $crate::Node::template(
            $crate::template_key!(),
            vec![$($crate::IntoNode::into_node($part)),*],
        )
    };
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
