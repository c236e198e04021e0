//! Tree node types
//!
//! A node's `id` is its `path` by construction. Both are recomputed by the
//! mutation engine whenever a node's ancestry changes.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Whether a node can hold children
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    File,
    Directory,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKind::File => write!(f, "file"),
            NodeKind::Directory => write!(f, "directory"),
        }
    }
}

/// Descriptive nesting level of a node in the knowledge hierarchy
///
/// Levels never influence mutation semantics; they only drive the
/// draggable flag and the level given to newly created children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeLevel {
    Root,
    Collection,
    Module,
    Unit,
    #[default]
    Other,
}

impl NodeLevel {
    /// Level assigned to a node created directly under a node of this level
    pub fn child_level(self) -> NodeLevel {
        match self {
            NodeLevel::Root => NodeLevel::Collection,
            NodeLevel::Collection => NodeLevel::Module,
            NodeLevel::Module => NodeLevel::Unit,
            NodeLevel::Unit | NodeLevel::Other => NodeLevel::Other,
        }
    }
}

/// Totals of everything below a node
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DescendantCounts {
    pub files: usize,
    pub directories: usize,
}

impl DescendantCounts {
    pub fn total(&self) -> usize {
        self.files + self.directories
    }
}

/// A node in the knowledge tree
///
/// `Clone`, `PartialEq` and `Drop` walk the subtree with an explicit stack
/// instead of recursing through `children`.
#[derive(Debug, Eq, Serialize, Deserialize)]
pub struct TreeNode {
    /// Lookup key, equal to `path`
    #[serde(default)]
    pub id: String,
    pub name: String,
    /// Slash-joined ancestry plus name
    #[serde(default)]
    pub path: String,
    pub kind: NodeKind,
    #[serde(default)]
    pub level: NodeLevel,
    /// Present only for directories
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<TreeNode>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl TreeNode {
    /// Create a file node. Path and id are filled in when the node joins a tree.
    pub fn file(name: impl Into<String>, level: NodeLevel) -> Self {
        Self {
            id: String::new(),
            name: name.into(),
            path: String::new(),
            kind: NodeKind::File,
            level,
            children: None,
            content: None,
        }
    }

    /// Create a directory node with the given children
    pub fn directory(name: impl Into<String>, level: NodeLevel, children: Vec<TreeNode>) -> Self {
        Self {
            id: String::new(),
            name: name.into(),
            path: String::new(),
            kind: NodeKind::Directory,
            level,
            children: Some(children),
            content: None,
        }
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn is_directory(&self) -> bool {
        self.kind == NodeKind::Directory
    }

    /// Everything except the hierarchy root may be dragged
    pub fn is_draggable(&self) -> bool {
        self.level != NodeLevel::Root
    }

    /// Only directories accept drops
    pub fn is_droppable(&self) -> bool {
        self.kind == NodeKind::Directory
    }

    pub fn children(&self) -> &[TreeNode] {
        self.children.as_deref().unwrap_or(&[])
    }

    /// Count files and directories below this node
    pub fn descendant_counts(&self) -> DescendantCounts {
        let mut counts = DescendantCounts::default();
        let mut stack: Vec<&TreeNode> = self.children().iter().collect();
        while let Some(node) = stack.pop() {
            match node.kind {
                NodeKind::File => counts.files += 1,
                NodeKind::Directory => counts.directories += 1,
            }
            stack.extend(node.children());
        }
        counts
    }

    /// Copy of this node alone; directories get an empty child list
    fn shallow_copy(&self) -> Self {
        Self {
            id: self.id.clone(),
            name: self.name.clone(),
            path: self.path.clone(),
            kind: self.kind,
            level: self.level,
            children: self.children.as_ref().map(|_| Vec::new()),
            content: self.content.clone(),
        }
    }

    fn same_fields(&self, other: &Self) -> bool {
        self.id == other.id
            && self.name == other.name
            && self.path == other.path
            && self.kind == other.kind
            && self.level == other.level
            && self.content == other.content
    }
}

impl Clone for TreeNode {
    fn clone(&self) -> Self {
        let mut copies: Vec<(TreeNode, Option<usize>)> = Vec::new();
        let mut stack: Vec<(&TreeNode, Option<usize>)> = vec![(self, None)];
        while let Some((node, parent)) = stack.pop() {
            let index = copies.len();
            copies.push((node.shallow_copy(), parent));
            stack.extend(node.children().iter().rev().map(|c| (c, Some(index))));
        }

        // Pre-order puts every descendant after its ancestors, so popping
        // from the back completes a node before it is handed to its parent.
        // Siblings arrive last-first and are flipped once complete.
        let mut root = None;
        while let Some((mut node, parent)) = copies.pop() {
            if let Some(children) = node.children.as_mut() {
                children.reverse();
            }
            match parent.and_then(|p| copies.get_mut(p)) {
                Some((parent, _)) => parent.children.get_or_insert_with(Vec::new).push(node),
                None => root = Some(node),
            }
        }
        root.unwrap_or_else(|| self.shallow_copy())
    }
}

impl PartialEq for TreeNode {
    fn eq(&self, other: &Self) -> bool {
        let mut stack: Vec<(&TreeNode, &TreeNode)> = vec![(self, other)];
        while let Some((a, b)) = stack.pop() {
            if !a.same_fields(b) {
                return false;
            }
            match (&a.children, &b.children) {
                (None, None) => {}
                (Some(left), Some(right)) if left.len() == right.len() => {
                    stack.extend(left.iter().zip(right.iter()));
                }
                _ => return false,
            }
        }
        true
    }
}

impl Drop for TreeNode {
    fn drop(&mut self) {
        let Some(mut pending) = self.children.take() else {
            return;
        };
        while let Some(mut node) = pending.pop() {
            if let Some(children) = node.children.take() {
                pending.extend(children);
            }
        }
    }
}
