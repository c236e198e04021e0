//! Read-only queries over a knowledge tree
//!
//! A [`Tree`] is a rooted forest of [`TreeNode`]s. Every traversal here walks
//! an explicit stack, so arbitrarily deep trees never exhaust the call stack.
//! Lookups rely on ids being unique; with duplicates the first node in
//! pre-order wins.

use serde::{Deserialize, Serialize};

use crate::error::{TreeSyncError, TreeSyncResult, ValidationError};
use crate::types::{NodeKind, NodeLevel, TreeNode};

/// Join a parent path and a name. The root parent is the empty path.
pub fn join_path(parent_path: &str, name: &str) -> String {
    if parent_path.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", parent_path, name)
    }
}

/// An immutable-by-convention knowledge tree value
///
/// Mutations never edit a tree in place; they clone it and return the new
/// value. `Clone` is a deep structural copy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tree {
    roots: Vec<TreeNode>,
}

impl Tree {
    /// Build a tree, deriving every `path` and `id` from the node names
    pub fn new(mut roots: Vec<TreeNode>) -> Self {
        for root in roots.iter_mut() {
            rebase_paths(root, "");
        }
        Self { roots }
    }

    /// Parse a JSON array of nodes. Missing or stale paths are recomputed.
    pub fn from_json(json: &str) -> TreeSyncResult<Self> {
        let roots: Vec<TreeNode> = serde_json::from_str(json)?;
        Ok(Self::new(roots))
    }

    /// Parse a snapshot written by [`Tree::to_snapshot`], keeping paths
    /// exactly as stored
    pub fn from_snapshot(json: &str) -> TreeSyncResult<Self> {
        let entries: Vec<SnapshotEntry> = serde_json::from_str(json)?;
        let mut roots = Vec::new();
        let mut open: Vec<TreeNode> = Vec::new();
        for entry in entries {
            if entry.depth > open.len() {
                return Err(TreeSyncError::Serialization(format!(
                    "snapshot entry {} at depth {} has no parent",
                    entry.path, entry.depth
                )));
            }
            close_to(&mut open, &mut roots, entry.depth);
            open.push(entry.into_node());
        }
        close_to(&mut open, &mut roots, 0);
        Ok(Self { roots })
    }

    /// Serialize as a flat pre-order list of nodes tagged with their depth
    ///
    /// Nesting depth of the JSON stays constant however deep the tree is.
    pub fn to_snapshot(&self) -> TreeSyncResult<String> {
        let mut entries = Vec::new();
        let mut stack: Vec<(&TreeNode, usize)> = self.roots.iter().rev().map(|n| (n, 0)).collect();
        while let Some((node, depth)) = stack.pop() {
            entries.push(SnapshotEntry::of(node, depth));
            stack.extend(node.children().iter().rev().map(|c| (c, depth + 1)));
        }
        Ok(serde_json::to_string(&entries)?)
    }

    pub fn roots(&self) -> &[TreeNode] {
        &self.roots
    }

    /// Number of nodes in the whole forest
    pub fn len(&self) -> usize {
        self.flatten().len()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.find_by_id(id).is_some()
    }

    /// Depth-first search by id
    pub fn find_by_id(&self, id: &str) -> Option<&TreeNode> {
        let mut stack: Vec<&TreeNode> = self.roots.iter().rev().collect();
        while let Some(node) = stack.pop() {
            if node.id == id {
                return Some(node);
            }
            stack.extend(node.children().iter().rev());
        }
        None
    }

    /// The directory directly containing `child_id`, or `None` for roots and
    /// unknown ids
    pub fn find_parent(&self, child_id: &str) -> Option<&TreeNode> {
        let mut stack: Vec<&TreeNode> = self.roots.iter().rev().collect();
        while let Some(node) = stack.pop() {
            if node.children().iter().any(|c| c.id == child_id) {
                return Some(node);
            }
            stack.extend(node.children().iter().rev());
        }
        None
    }

    /// Every node in pre-order
    pub fn flatten(&self) -> Vec<&TreeNode> {
        let mut out = Vec::new();
        let mut stack: Vec<&TreeNode> = self.roots.iter().rev().collect();
        while let Some(node) = stack.pop() {
            out.push(node);
            stack.extend(node.children().iter().rev());
        }
        out
    }

    /// True if `candidate` is `ancestor` or lies anywhere beneath it
    pub fn is_within(&self, ancestor: &str, candidate: &str) -> bool {
        let Some(start) = self.find_by_id(ancestor) else {
            return false;
        };
        let mut stack = vec![start];
        while let Some(node) = stack.pop() {
            if node.id == candidate {
                return true;
            }
            stack.extend(node.children());
        }
        false
    }

    pub(crate) fn find_by_id_mut(&mut self, id: &str) -> Option<&mut TreeNode> {
        let mut stack: Vec<&mut TreeNode> = self.roots.iter_mut().rev().collect();
        while let Some(node) = stack.pop() {
            if node.id == id {
                return Some(node);
            }
            if let Some(children) = node.children.as_mut() {
                stack.extend(children.iter_mut().rev());
            }
        }
        None
    }

    /// Path a child of `parent` hangs from; the root list resolves to ""
    pub(crate) fn parent_path(&self, parent: Option<&str>) -> TreeSyncResult<String> {
        match parent {
            None => Ok(String::new()),
            Some(id) => {
                let node = self
                    .find_by_id(id)
                    .ok_or_else(|| TreeSyncError::NodeNotFound(id.to_string()))?;
                if !node.is_directory() {
                    return Err(ValidationError::NotADirectory(id.to_string()).into());
                }
                Ok(node.path.clone())
            }
        }
    }

    /// Child list of `parent`, or the root list when `parent` is `None`
    pub(crate) fn children_mut(
        &mut self,
        parent: Option<&str>,
    ) -> TreeSyncResult<&mut Vec<TreeNode>> {
        match parent {
            None => Ok(&mut self.roots),
            Some(id) => {
                let node = self
                    .find_by_id_mut(id)
                    .ok_or_else(|| TreeSyncError::NodeNotFound(id.to_string()))?;
                if !node.is_directory() {
                    return Err(ValidationError::NotADirectory(id.to_string()).into());
                }
                Ok(node.children.get_or_insert_with(Vec::new))
            }
        }
    }

    /// Detach every subtree whose root matches `pred`, at any depth
    ///
    /// Descent stops at a detached node, so its descendants travel with it.
    pub(crate) fn take_where<F>(&mut self, pred: F) -> Vec<TreeNode>
    where
        F: Fn(&TreeNode) -> bool,
    {
        let mut taken = Vec::new();
        let mut stack: Vec<&mut Vec<TreeNode>> = vec![&mut self.roots];
        while let Some(list) = stack.pop() {
            let (removed, kept): (Vec<_>, Vec<_>) =
                std::mem::take(list).into_iter().partition(|n| pred(n));
            *list = kept;
            taken.extend(removed);
            for node in list.iter_mut() {
                if let Some(children) = node.children.as_mut() {
                    stack.push(children);
                }
            }
        }
        taken
    }
}

impl From<Vec<TreeNode>> for Tree {
    fn from(roots: Vec<TreeNode>) -> Self {
        Tree::new(roots)
    }
}

/// One node of a saved tree; `id` is restored from `path`
#[derive(Serialize, Deserialize)]
struct SnapshotEntry {
    depth: usize,
    name: String,
    path: String,
    kind: NodeKind,
    #[serde(default)]
    level: NodeLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content: Option<String>,
}

impl SnapshotEntry {
    fn of(node: &TreeNode, depth: usize) -> Self {
        Self {
            depth,
            name: node.name.clone(),
            path: node.path.clone(),
            kind: node.kind,
            level: node.level,
            content: node.content.clone(),
        }
    }

    fn into_node(self) -> TreeNode {
        let mut node = match self.kind {
            NodeKind::Directory => TreeNode::directory(self.name, self.level, Vec::new()),
            NodeKind::File => TreeNode::file(self.name, self.level),
        };
        node.id = self.path.clone();
        node.path = self.path;
        node.content = self.content;
        node
    }
}

/// Pop open nodes until `depth` remain, attaching each to the one below it
fn close_to(open: &mut Vec<TreeNode>, roots: &mut Vec<TreeNode>, depth: usize) {
    while open.len() > depth {
        let Some(node) = open.pop() else {
            break;
        };
        match open.last_mut() {
            Some(parent) => parent.children.get_or_insert_with(Vec::new).push(node),
            None => roots.push(node),
        }
    }
}

/// Recompute `path` and `id` for `node` and everything below it
pub(crate) fn rebase_paths(node: &mut TreeNode, parent_path: &str) {
    let mut stack: Vec<(&mut TreeNode, String)> = vec![(node, parent_path.to_string())];
    while let Some((node, parent)) = stack.pop() {
        node.path = join_path(&parent, &node.name);
        node.id = node.path.clone();
        let path = node.path.clone();
        if node.is_directory() {
            node.children.get_or_insert_with(Vec::new);
        }
        if let Some(children) = node.children.as_mut() {
            for child in children.iter_mut() {
                stack.push((child, path.clone()));
            }
        }
    }
}
