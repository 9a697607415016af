//! Collapsible tree projection over an arbitrary JSON document.
//!
//! Expand/collapse state lives in [`TreeState`], keyed by [`NodePath`]. The
//! document itself is never modified, and only rows that are currently visible
//! are materialized, so a collapsed subtree costs nothing to render.

use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

/// Containers at depth 0 and 1 start expanded.
pub const DEFAULT_EXPANDED_DEPTH: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

/// Stable address of a node: the property names/indices from the root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct NodePath(Vec<PathSegment>);

impl NodePath {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn child(&self, segment: PathSegment) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment);
        Self(segments)
    }

    pub fn key(&self, key: impl Into<String>) -> Self {
        self.child(PathSegment::Key(key.into()))
    }

    pub fn index(&self, idx: usize) -> Self {
        self.child(PathSegment::Index(idx))
    }

    pub fn parent(&self) -> Option<Self> {
        if self.0.is_empty() {
            return None;
        }
        Some(Self(self.0[..self.0.len() - 1].to_vec()))
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.0
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("$")?;
        for segment in &self.0 {
            match segment {
                PathSegment::Key(key) => write!(f, ".{key}")?,
                PathSegment::Index(idx) => write!(f, "[{idx}]")?,
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarKind {
    String,
    Number,
    Boolean,
    Null,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    Object,
    Array,
}

impl ContainerKind {
    pub fn badge(self, len: usize) -> String {
        match self {
            ContainerKind::Object => format!("{{{len}}}"),
            ContainerKind::Array => format!("[{len}]"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RowNode {
    Scalar {
        kind: ScalarKind,
        display: String,
    },
    Container {
        kind: ContainerKind,
        len: usize,
        expanded: bool,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct TreeRow {
    pub path: NodePath,
    pub key: String,
    pub node: RowNode,
}

impl TreeRow {
    pub fn depth(&self) -> usize {
        self.path.depth()
    }

    /// Empty containers and scalars have nothing to toggle.
    pub fn is_toggleable(&self) -> bool {
        matches!(self.node, RowNode::Container { len, .. } if len > 0)
    }
}

/// Per-path visibility overrides. Paths without an override use the depth
/// default, so descendants keep their own state across ancestor toggles.
#[derive(Debug, Clone, Default)]
pub struct TreeState {
    overrides: HashMap<NodePath, bool>,
}

impl TreeState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn default_expanded(depth: usize) -> bool {
        depth < DEFAULT_EXPANDED_DEPTH
    }

    pub fn is_expanded(&self, path: &NodePath) -> bool {
        self.overrides
            .get(path)
            .copied()
            .unwrap_or_else(|| Self::default_expanded(path.depth()))
    }

    pub fn set_expanded(&mut self, path: &NodePath, expanded: bool) {
        if expanded == Self::default_expanded(path.depth()) {
            self.overrides.remove(path);
        } else {
            self.overrides.insert(path.clone(), expanded);
        }
    }

    /// Flips one node and returns its new visibility.
    pub fn toggle(&mut self, path: &NodePath) -> bool {
        let next = !self.is_expanded(path);
        self.set_expanded(path, next);
        next
    }
}

pub fn lookup<'a>(root: &'a Value, path: &NodePath) -> Option<&'a Value> {
    path.segments()
        .iter()
        .try_fold(root, |node, segment| match (node, segment) {
            (Value::Object(map), PathSegment::Key(key)) => map.get(key),
            (Value::Array(items), PathSegment::Index(idx)) => items.get(*idx),
            _ => None,
        })
}

/// String form used by the copy action: strings unquoted, everything else as
/// JSON text.
pub fn copy_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn scalar_kind(value: &Value) -> Option<ScalarKind> {
    match value {
        Value::String(_) => Some(ScalarKind::String),
        Value::Number(_) => Some(ScalarKind::Number),
        Value::Bool(_) => Some(ScalarKind::Boolean),
        Value::Null => Some(ScalarKind::Null),
        Value::Object(_) | Value::Array(_) => None,
    }
}

/// Flattens the visible part of `root` into display rows, depth-first.
pub fn visible_rows(root_key: &str, root: &Value, state: &TreeState) -> Vec<TreeRow> {
    let mut rows = Vec::new();
    push_rows(root_key.to_string(), root, NodePath::root(), state, &mut rows);
    rows
}

fn push_rows(
    key: String,
    value: &Value,
    path: NodePath,
    state: &TreeState,
    rows: &mut Vec<TreeRow>,
) {
    if let Some(kind) = scalar_kind(value) {
        rows.push(TreeRow {
            path,
            key,
            node: RowNode::Scalar {
                kind,
                // Serialized form keeps quotes and escapes control characters.
                display: value.to_string(),
            },
        });
        return;
    }

    let (kind, len) = match value {
        Value::Object(map) => (ContainerKind::Object, map.len()),
        Value::Array(items) => (ContainerKind::Array, items.len()),
        _ => return,
    };
    let expanded = len > 0 && state.is_expanded(&path);
    rows.push(TreeRow {
        path: path.clone(),
        key,
        node: RowNode::Container {
            kind,
            len,
            expanded,
        },
    });
    if !expanded {
        return;
    }
    match value {
        Value::Object(map) => {
            for (child_key, child) in map {
                let child_path = path.key(child_key.as_str());
                push_rows(child_key.clone(), child, child_path, state, rows);
            }
        }
        Value::Array(items) => {
            for (idx, child) in items.iter().enumerate() {
                push_rows(idx.to_string(), child, path.index(idx), state, rows);
            }
        }
        _ => {}
    }
}

/// One explorer display session: owns the document, its visibility state and
/// the selection cursor. Dropping it discards the document.
#[derive(Debug, Clone)]
pub struct TreeExplorer {
    root_key: String,
    document: Value,
    state: TreeState,
    rows: Vec<TreeRow>,
    selected: usize,
}

impl TreeExplorer {
    pub fn new(root_key: impl Into<String>, document: Value) -> Self {
        let mut explorer = Self {
            root_key: root_key.into(),
            document,
            state: TreeState::new(),
            rows: Vec::new(),
            selected: 0,
        };
        explorer.recalc_rows();
        explorer
    }

    pub fn root_key(&self) -> &str {
        &self.root_key
    }

    pub fn document(&self) -> &Value {
        &self.document
    }

    pub fn state(&self) -> &TreeState {
        &self.state
    }

    pub fn rows(&self) -> &[TreeRow] {
        &self.rows
    }

    pub fn selected(&self) -> usize {
        self.selected
    }

    pub fn selected_row(&self) -> Option<&TreeRow> {
        self.rows.get(self.selected)
    }

    pub fn move_selection(&mut self, delta: isize) {
        if self.rows.is_empty() {
            self.selected = 0;
            return;
        }
        let max = self.rows.len() - 1;
        let next = self.selected as isize + delta;
        self.selected = next.clamp(0, max as isize) as usize;
    }

    pub fn select_first(&mut self) {
        self.selected = 0;
    }

    pub fn select_last(&mut self) {
        self.selected = self.rows.len().saturating_sub(1);
    }

    /// Toggles the node at `path`. Returns `false` for scalars, empty
    /// containers and unknown paths.
    pub fn toggle(&mut self, path: &NodePath) -> bool {
        let toggleable = match lookup(&self.document, path) {
            Some(Value::Object(map)) => !map.is_empty(),
            Some(Value::Array(items)) => !items.is_empty(),
            _ => false,
        };
        if !toggleable {
            return false;
        }
        self.state.toggle(path);
        self.recalc_rows();
        true
    }

    pub fn toggle_selected(&mut self) -> bool {
        match self.selected_row().map(|row| row.path.clone()) {
            Some(path) => self.toggle(&path),
            None => false,
        }
    }

    pub fn expand_selected(&mut self) -> bool {
        match self.selected_row() {
            Some(row) if row.is_toggleable() && !self.state.is_expanded(&row.path) => {
                let path = row.path.clone();
                self.toggle(&path)
            }
            _ => false,
        }
    }

    /// Collapses the selected container, or moves to the parent row when the
    /// selection is a leaf or already collapsed.
    pub fn collapse_selected(&mut self) -> bool {
        let Some(row) = self.selected_row() else {
            return false;
        };
        let path = row.path.clone();
        if row.is_toggleable() && self.state.is_expanded(&path) {
            return self.toggle(&path);
        }
        if let Some(parent) = path.parent() {
            if let Some(idx) = self.rows.iter().position(|row| row.path == parent) {
                self.selected = idx;
            }
        }
        false
    }

    pub fn selected_copy_text(&self) -> Option<String> {
        let row = self.selected_row()?;
        match row.node {
            RowNode::Scalar { .. } => lookup(&self.document, &row.path).map(copy_text),
            RowNode::Container { .. } => None,
        }
    }

    fn recalc_rows(&mut self) {
        let anchor = self.selected_row().map(|row| row.path.clone());
        self.rows = visible_rows(&self.root_key, &self.document, &self.state);
        self.selected = anchor
            .and_then(|path| self.rows.iter().position(|row| row.path == path))
            .unwrap_or_else(|| self.selected.min(self.rows.len().saturating_sub(1)));
    }
}
